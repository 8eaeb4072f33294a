//! Screen rasterizer: turns a vt100 screen into a styled RGBA frame.
//!
//! Layout from the outside in: margin, window (rounded by `BorderRadius`),
//! optional window bar, padding, then the cell grid.

use crate::command::WindowBar;
use crate::settings::Style;
use crate::theme::Rgb;
use anyhow::{Context, Result, anyhow};
use fontdue::{Font, FontSettings};
use image::{ImageFormat, Rgba, RgbaImage};
use std::collections::HashMap;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

const MONOSPACE_FALLBACKS: &[&str] = &[
    "DejaVu Sans Mono",
    "Liberation Mono",
    "Noto Sans Mono",
    "Ubuntu Mono",
    "Menlo",
    "Consolas",
    "Courier New",
];

const BAR_DOTS: [Rgb; 3] = [
    Rgb::new(0xff, 0x5f, 0x58),
    Rgb::new(0xff, 0xbd, 0x2e),
    Rgb::new(0x18, 0xc1, 0x32),
];

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

struct GlyphBitmap {
    xmin: i32,
    ymin: i32,
    width: usize,
    height: usize,
    bitmap: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct CellMetrics {
    width: u32,
    height: u32,
    baseline: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Rect {
    x: u32,
    y: u32,
    w: u32,
    h: u32,
}

/// Where things land on the canvas for one style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Layout {
    window: Rect,
    bar_height: u32,
    origin: (u32, u32),
    cols: u16,
    rows: u16,
}

pub struct Rasterizer {
    style: Style,
    font: Option<Font>,
    cell: CellMetrics,
    layout: Layout,
    glyph_cache: HashMap<char, GlyphBitmap>,
}

impl Rasterizer {
    /// Build a rasterizer, resolving `FontFamily` against the system fonts.
    pub fn new(style: Style) -> Self {
        let font = load_font(&style.font_family);
        Self::with_font(style, font)
    }

    fn with_font(style: Style, font: Option<Font>) -> Self {
        let cell = cell_metrics(font.as_ref(), &style);
        let layout = compute_layout(&style, cell);
        Self {
            style,
            font,
            cell,
            layout,
            glyph_cache: HashMap::new(),
        }
    }

    /// Switch to a new style. Returns true when the grid dimensions changed.
    pub fn set_style(&mut self, style: Style) -> bool {
        if style == self.style {
            return false;
        }
        if style.font_family != self.style.font_family {
            self.font = load_font(&style.font_family);
        }
        if style.font_family != self.style.font_family || style.font_size != self.style.font_size {
            self.glyph_cache.clear();
        }
        let before = self.grid();
        self.cell = cell_metrics(self.font.as_ref(), &style);
        self.layout = compute_layout(&style, self.cell);
        self.style = style;
        before != self.grid()
    }

    /// Grid size as `(rows, cols)`.
    pub fn grid(&self) -> (u16, u16) {
        (self.layout.rows, self.layout.cols)
    }

    /// Draw `screen`. `cursor_on` is the current blink phase.
    pub fn render(&mut self, screen: &vt100::Screen, cursor_on: bool) -> RgbaImage {
        let style = self.style.clone();
        let theme = &style.theme;
        let outer = match style.margin_fill {
            Some(fill) => opaque(fill),
            None if style.margin > 0 => opaque(theme.background),
            None => TRANSPARENT,
        };
        let mut image = RgbaImage::from_pixel(style.width.max(1), style.height.max(1), outer);
        let window = self.layout.window;
        let radius = style.border_radius;
        fill_clipped(&mut image, window, radius, window, opaque(theme.background));
        if self.layout.bar_height > 0 {
            let bar = Rect {
                h: self.layout.bar_height,
                ..window
            };
            let bar_color = theme.background.mix(theme.foreground, 0.08);
            fill_clipped(&mut image, window, radius, bar, opaque(bar_color));
            draw_bar_dots(&mut image, bar, style.window_bar);
        }

        let (rows, cols) = screen.size();
        let rows = rows.min(self.layout.rows);
        let cols = cols.min(self.layout.cols);
        for row in 0..rows {
            for col in 0..cols {
                let Some(cell) = screen.cell(row, col) else {
                    continue;
                };
                if cell.is_wide_continuation() {
                    continue;
                }
                let mut fg = resolve(theme, cell.fgcolor(), theme.foreground, cell.bold());
                let mut bg = resolve(theme, cell.bgcolor(), theme.background, false);
                if cell.inverse() {
                    std::mem::swap(&mut fg, &mut bg);
                }
                let (x, y) = self.cell_origin(row, col);
                let span = if cell.is_wide() { 2 } else { 1 };
                if bg != theme.background {
                    fill_rect(&mut image, x, y, self.cell.width * span, self.cell.height, bg);
                }
                if let Some(ch) = cell.contents().chars().next() {
                    self.draw_glyph(&mut image, x, y, ch, fg, cell.bold());
                }
            }
        }

        if cursor_on && !screen.hide_cursor() {
            let (row, col) = screen.cursor_position();
            if row < rows && col < cols {
                let (x, y) = self.cell_origin(row, col);
                fill_rect(&mut image, x, y, self.cell.width, self.cell.height, theme.cursor);
                let under = screen
                    .cell(row, col)
                    .and_then(|cell| cell.contents().chars().next());
                if let Some(ch) = under {
                    self.draw_glyph(&mut image, x, y, ch, theme.background, false);
                }
            }
        }
        image
    }

    fn cell_origin(&self, row: u16, col: u16) -> (u32, u32) {
        let (x0, y0) = self.layout.origin;
        (
            x0 + u32::from(col) * self.cell.width,
            y0 + u32::from(row) * self.cell.height,
        )
    }

    fn draw_glyph(&mut self, image: &mut RgbaImage, x: u32, y: u32, ch: char, color: Rgb, bold: bool) {
        if ch.is_whitespace() {
            return;
        }
        let Some(font) = &self.font else {
            // No font: a block in the middle of the cell keeps text shapes readable.
            let w = self.cell.width * 3 / 5;
            let h = self.cell.height / 2;
            fill_rect(
                image,
                x + (self.cell.width - w) / 2,
                y + (self.cell.height - h) / 2,
                w,
                h,
                color,
            );
            return;
        };
        let size = self.style.font_size;
        let glyph = self.glyph_cache.entry(ch).or_insert_with(|| {
            let (metrics, bitmap) = font.rasterize(ch, size);
            GlyphBitmap {
                xmin: metrics.xmin,
                ymin: metrics.ymin,
                width: metrics.width,
                height: metrics.height,
                bitmap,
            }
        });
        let gx = x as i32 + glyph.xmin;
        let gy = y as i32 + self.cell.baseline - (glyph.height as i32 + glyph.ymin);
        blend_glyph(image, gx, gy, glyph, color);
        if bold {
            blend_glyph(image, gx + 1, gy, glyph, color);
        }
    }
}

/// Encode a frame as PNG.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .context("failed to encode PNG")?;
    Ok(bytes)
}

fn opaque(color: Rgb) -> Rgba<u8> {
    Rgba([color.r, color.g, color.b, 255])
}

fn resolve(theme: &crate::theme::Theme, color: vt100::Color, default: Rgb, bold: bool) -> Rgb {
    match color {
        vt100::Color::Default => default,
        // Bold basic colors render in their bright variant.
        vt100::Color::Idx(i) if bold && i < 8 => theme.indexed(i + 8),
        vt100::Color::Idx(i) => theme.indexed(i),
        vt100::Color::Rgb(r, g, b) => Rgb::new(r, g, b),
    }
}

fn cell_metrics(font: Option<&Font>, style: &Style) -> CellMetrics {
    let px = style.font_size.max(1.0);
    let line_height = style.line_height.max(0.1);
    let Some(font) = font else {
        let height = (px * 1.2 * line_height).ceil().max(1.0) as u32;
        return CellMetrics {
            width: (px * 0.6 + style.letter_spacing).ceil().max(1.0) as u32,
            height,
            baseline: (height as f32 * 0.8).round() as i32,
        };
    };
    let advance = font.metrics('M', px).advance_width;
    let (ascent, descent) = font
        .horizontal_line_metrics(px)
        .map(|m| (m.ascent, m.descent))
        .unwrap_or((px * 0.8, -px * 0.2));
    let natural = ascent - descent;
    let height = (natural * line_height).ceil().max(1.0) as u32;
    CellMetrics {
        width: (advance + style.letter_spacing).ceil().max(1.0) as u32,
        height,
        baseline: ((height as f32 - natural) / 2.0 + ascent).round() as i32,
    }
}

fn compute_layout(style: &Style, cell: CellMetrics) -> Layout {
    let margin = style.margin.min(style.width / 2).min(style.height / 2);
    let window = Rect {
        x: margin,
        y: margin,
        w: style.width - 2 * margin,
        h: style.height - 2 * margin,
    };
    let bar_height = match style.window_bar {
        WindowBar::None => 0,
        _ => style.window_bar_size.min(window.h),
    };
    let inner_w = window.w.saturating_sub(2 * style.padding);
    let inner_h = window.h.saturating_sub(bar_height + 2 * style.padding);
    let fit = |space: u32, unit: u32| (space / unit).clamp(1, u32::from(u16::MAX)) as u16;
    Layout {
        window,
        bar_height,
        origin: (window.x + style.padding, window.y + bar_height + style.padding),
        cols: fit(inner_w, cell.width),
        rows: fit(inner_h, cell.height),
    }
}

fn fill_rect(image: &mut RgbaImage, x: u32, y: u32, w: u32, h: u32, color: Rgb) {
    let (width, height) = image.dimensions();
    for py in y..(y + h).min(height) {
        for px in x..(x + w).min(width) {
            image.put_pixel(px, py, opaque(color));
        }
    }
}

/// Fill `area`, keeping only the pixels inside `shape` with rounded corners.
fn fill_clipped(image: &mut RgbaImage, shape: Rect, radius: u32, area: Rect, color: Rgba<u8>) {
    let (width, height) = image.dimensions();
    let r = radius.min(shape.w / 2).min(shape.h / 2) as f32;
    for py in area.y..(area.y + area.h).min(height) {
        for px in area.x..(area.x + area.w).min(width) {
            if r > 0.0 && outside_corner(shape, r, px, py) {
                continue;
            }
            image.put_pixel(px, py, color);
        }
    }
}

fn outside_corner(shape: Rect, r: f32, px: u32, py: u32) -> bool {
    let (x, y) = (px as f32 + 0.5, py as f32 + 0.5);
    let left = shape.x as f32 + r;
    let right = (shape.x + shape.w) as f32 - r;
    let top = shape.y as f32 + r;
    let bottom = (shape.y + shape.h) as f32 - r;
    let cx = if x < left {
        left
    } else if x > right {
        right
    } else {
        return false;
    };
    let cy = if y < top {
        top
    } else if y > bottom {
        bottom
    } else {
        return false;
    };
    (x - cx).powi(2) + (y - cy).powi(2) > r * r
}

fn draw_bar_dots(image: &mut RgbaImage, bar: Rect, kind: WindowBar) {
    let (right, ring) = match kind {
        WindowBar::None => return,
        WindowBar::Colorful => (false, false),
        WindowBar::ColorfulRight => (true, false),
        WindowBar::Rings => (false, true),
        WindowBar::RingsRight => (true, true),
    };
    let radius = (bar.h as f32 * 0.2).max(2.0);
    let step = radius * 3.2;
    let cy = bar.y as f32 + bar.h as f32 / 2.0;
    let first = bar.h as f32 / 2.0;
    for (i, color) in BAR_DOTS.iter().enumerate() {
        let cx = if right {
            (bar.x + bar.w) as f32 - first - step * (2 - i) as f32
        } else {
            bar.x as f32 + first + step * i as f32
        };
        draw_circle(image, cx, cy, radius, *color, ring);
    }
}

fn draw_circle(image: &mut RgbaImage, cx: f32, cy: f32, radius: f32, color: Rgb, ring: bool) {
    let (width, height) = image.dimensions();
    let x0 = (cx - radius - 1.0).max(0.0) as u32;
    let y0 = (cy - radius - 1.0).max(0.0) as u32;
    let x1 = ((cx + radius + 1.0) as u32).min(width);
    let y1 = ((cy + radius + 1.0) as u32).min(height);
    for py in y0..y1 {
        for px in x0..x1 {
            let d = ((px as f32 + 0.5 - cx).powi(2) + (py as f32 + 0.5 - cy).powi(2)).sqrt();
            let coverage = if ring {
                (1.0 - ((d - (radius - 0.75)).abs() - 0.75)).clamp(0.0, 1.0)
            } else {
                (radius + 0.5 - d).clamp(0.0, 1.0)
            };
            blend_pixel(image, px, py, color, (coverage * 255.0) as u8);
        }
    }
}

fn blend_glyph(image: &mut RgbaImage, x: i32, y: i32, glyph: &GlyphBitmap, color: Rgb) {
    let (width, height) = image.dimensions();
    for row in 0..glyph.height {
        let py = y + row as i32;
        if py < 0 || py >= height as i32 {
            continue;
        }
        for col in 0..glyph.width {
            let px = x + col as i32;
            if px < 0 || px >= width as i32 {
                continue;
            }
            let mask = glyph.bitmap[row * glyph.width + col];
            blend_pixel(image, px as u32, py as u32, color, mask);
        }
    }
}

fn blend_pixel(image: &mut RgbaImage, x: u32, y: u32, color: Rgb, alpha: u8) {
    if alpha == 0 {
        return;
    }
    let alpha = u16::from(alpha);
    let inv_alpha = 255 - alpha;
    let dst = image.get_pixel_mut(x, y);
    for (channel, src) in [color.r, color.g, color.b].into_iter().enumerate() {
        let d = u16::from(dst.0[channel]);
        dst.0[channel] = ((u16::from(src) * alpha + d * inv_alpha + 127) / 255) as u8;
    }
    dst.0[3] = dst.0[3].max(alpha as u8);
}

/// Resolve a comma-separated `FontFamily` to the first loadable font.
///
/// Each entry is either a font file path or a family name searched for in
/// the usual system font directories.
fn load_font(families: &str) -> Option<Font> {
    for family in families.split(',').map(str::trim).filter(|f| !f.is_empty()) {
        let candidates = if Path::new(family).is_file() {
            vec![PathBuf::from(family)]
        } else {
            find_font_files(family)
        };
        for path in candidates {
            match read_font(&path) {
                Ok(font) => {
                    log::debug!("using font {}", path.display());
                    return Some(font);
                }
                Err(err) => log::debug!("skipping font: {err:#}"),
            }
        }
    }
    log::warn!("no usable font found for FontFamily {families:?}, drawing placeholder glyphs");
    None
}

fn read_font(path: &Path) -> Result<Font> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read font file {}", path.display()))?;
    Font::from_bytes(bytes, FontSettings::default())
        .map_err(|error| anyhow!("failed to parse font {}: {error}", path.display()))
}

fn font_dirs() -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = [
        "/usr/share/fonts",
        "/usr/local/share/fonts",
        "/Library/Fonts",
        "/System/Library/Fonts",
        "C:\\Windows\\Fonts",
    ]
    .iter()
    .map(PathBuf::from)
    .collect();
    if let Some(home) = std::env::var_os("HOME").map(PathBuf::from) {
        dirs.push(home.join(".local/share/fonts"));
        dirs.push(home.join(".fonts"));
        dirs.push(home.join("Library/Fonts"));
    }
    dirs
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn collect_fonts(dir: &Path, depth: usize, out: &mut Vec<PathBuf>) {
    if depth > 4 {
        return;
    }
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_fonts(&path, depth + 1, out);
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("ttf") || e.eq_ignore_ascii_case("otf"))
        {
            out.push(path);
        }
    }
}

/// Font files matching `family`, best match first.
fn find_font_files(family: &str) -> Vec<PathBuf> {
    let wanted: Vec<String> = if family.eq_ignore_ascii_case("monospace") {
        MONOSPACE_FALLBACKS.iter().map(|f| normalize(f)).collect()
    } else {
        vec![normalize(family)]
    };
    let mut files = Vec::new();
    for dir in font_dirs() {
        collect_fonts(&dir, 0, &mut files);
    }
    let mut ranked: Vec<(usize, u8, PathBuf)> = files
        .into_iter()
        .filter_map(|path| {
            let stem = normalize(path.file_stem()?.to_str()?);
            let (index, name) = wanted
                .iter()
                .enumerate()
                .find(|(_, name)| stem.starts_with(name.as_str()))?;
            let rest = &stem[name.len()..];
            let rank = match rest {
                "" | "regular" => 0,
                _ if ["bold", "italic", "oblique", "light", "thin"]
                    .iter()
                    .any(|w| rest.contains(w)) =>
                {
                    2
                }
                _ => 1,
            };
            Some((index, rank, path))
        })
        .collect();
    ranked.sort();
    ranked.into_iter().map(|(_, _, path)| path).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(style: Style) -> Rasterizer {
        Rasterizer::with_font(style, None)
    }

    fn screen(rows: u16, cols: u16, input: &[u8]) -> vt100::Screen {
        let mut parser = vt100::Parser::new(rows, cols, 0);
        parser.process(input);
        parser.screen().clone()
    }

    #[test]
    fn test_grid_from_default_style() {
        // 1080x480 inner area with 14x27 placeholder cells.
        let r = plain(Style::default());
        assert_eq!(r.grid(), (17, 77));
    }

    #[test]
    fn test_window_bar_and_margin_shrink_grid() {
        let mut style = Style::default();
        style.window_bar = WindowBar::Colorful;
        style.margin = 20;
        let r = plain(style);
        let (rows, cols) = r.grid();
        assert!(rows < 17);
        assert!(cols < 77);
    }

    #[test]
    fn test_set_style_reports_grid_change() {
        let mut r = plain(Style::default());
        let mut style = Style::default();
        style.cursor_blink = false;
        assert!(!r.set_style(style.clone()));
        style.width = 600;
        assert!(r.set_style(style));
    }

    #[test]
    fn test_render_dimensions_and_background() {
        let mut r = plain(Style::default());
        let (rows, cols) = r.grid();
        let image = r.render(&screen(rows, cols, b""), false);
        assert_eq!(image.dimensions(), (1200, 600));
        let bg = Style::default().theme.background;
        assert_eq!(*image.get_pixel(5, 5), opaque(bg));
    }

    #[test]
    fn test_margin_fill_and_rounded_corners() {
        let mut style = Style::default();
        style.margin = 20;
        style.margin_fill = Some(Rgb::new(255, 0, 0));
        style.border_radius = 16;
        let mut r = plain(style.clone());
        let (rows, cols) = r.grid();
        let image = r.render(&screen(rows, cols, b""), false);
        assert_eq!(*image.get_pixel(2, 2), Rgba([255, 0, 0, 255]));
        // Window corner is cut away, its center is not.
        assert_eq!(*image.get_pixel(20, 20), Rgba([255, 0, 0, 255]));
        assert_eq!(*image.get_pixel(600, 300), opaque(style.theme.background));
    }

    #[test]
    fn test_cell_background_color() {
        let mut r = plain(Style::default());
        let (rows, cols) = r.grid();
        let image = r.render(&screen(rows, cols, b"\x1b[41m \x1b[0m"), false);
        let red = Style::default().theme.ansi[1];
        assert_eq!(*image.get_pixel(61, 61), opaque(red));
    }

    #[test]
    fn test_cursor_drawn_only_when_on() {
        let mut r = plain(Style::default());
        let (rows, cols) = r.grid();
        let s = screen(rows, cols, b"");
        let cursor = Style::default().theme.cursor;
        assert_eq!(*r.render(&s, true).get_pixel(61, 61), opaque(cursor));
        assert_ne!(*r.render(&s, false).get_pixel(61, 61), opaque(cursor));
    }

    #[test]
    fn test_encode_png_signature() {
        let image = RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 255]));
        let bytes = encode_png(&image).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("JetBrains Mono"), "jetbrainsmono");
        assert_eq!(normalize("DejaVuSansMono-Bold"), "dejavusansmonobold");
    }
}
