use ab_glyph::{point, Font, FontArc, Glyph, GlyphId, PxScale, ScaleFont};
use image::{Rgb, RgbImage};

/// Ink extent of a line, relative to its top-left pen origin.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TextBounds {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl TextBounds {
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    fn union(self, other: TextBounds) -> TextBounds {
        TextBounds {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }
}

/// Scale for an em size in pixels.
fn scale_for(font: &FontArc, size: f32) -> PxScale {
    font.pt_to_px_scale(size).unwrap_or(PxScale::from(size))
}

/// Glyphs of one line whose top (ascender line) starts at `(x, y)`.
fn layout_line(font: &FontArc, size: f32, text: &str, x: f32, y: f32) -> Vec<Glyph> {
    let scale = scale_for(font, size);
    let scaled = font.as_scaled(scale);
    let baseline = y + scaled.ascent();

    let mut caret = x;
    let mut previous: Option<GlyphId> = None;
    let mut glyphs = Vec::with_capacity(text.len());
    for ch in text.chars() {
        let id = scaled.glyph_id(ch);
        if let Some(prev) = previous {
            caret += scaled.kern(prev, id);
        }
        glyphs.push(id.with_scale_and_position(scale, point(caret, baseline)));
        caret += scaled.h_advance(id);
        previous = Some(id);
    }
    glyphs
}

/// Ink bounds of `text` at `size`; all zero when nothing is drawn.
pub fn measure(font: &FontArc, size: f32, text: &str) -> TextBounds {
    layout_line(font, size, text, 0.0, 0.0)
        .into_iter()
        .filter_map(|glyph| font.outline_glyph(glyph))
        .map(|outlined| {
            let rect = outlined.px_bounds();
            TextBounds {
                left: rect.min.x,
                top: rect.min.y,
                right: rect.max.x,
                bottom: rect.max.y,
            }
        })
        .reduce(TextBounds::union)
        .unwrap_or_default()
}

fn blend(pixel: &mut Rgb<u8>, color: Rgb<u8>, coverage: f32) {
    let alpha = coverage.clamp(0.0, 1.0);
    for (channel, target) in pixel.0.iter_mut().zip(color.0) {
        let mixed = f32::from(*channel) * (1.0 - alpha) + f32::from(target) * alpha;
        *channel = mixed.round() as u8;
    }
}

/// Draw one line with its pen origin (top-left) at `(x, y)`. Pixels outside the canvas are clipped.
pub fn draw_text(
    canvas: &mut RgbImage,
    font: &FontArc,
    size: f32,
    x: f32,
    y: f32,
    text: &str,
    color: Rgb<u8>,
) {
    let (width, height) = canvas.dimensions();
    for glyph in layout_line(font, size, text, x, y) {
        let Some(outlined) = font.outline_glyph(glyph) else {
            continue;
        };
        let rect = outlined.px_bounds();
        outlined.draw(|gx, gy, coverage| {
            let px = rect.min.x as i64 + i64::from(gx);
            let py = rect.min.y as i64 + i64::from(gy);
            if px < 0 || py < 0 || px >= i64::from(width) || py >= i64::from(height) {
                return;
            }
            blend(canvas.get_pixel_mut(px as u32, py as u32), color, coverage);
        });
    }
}
