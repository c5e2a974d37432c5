use image::{Rgb, RgbImage};

use super::assets::{FontBook, FontFace};
use super::fit::fit_font_size;
use super::text::{draw_text, measure};

/// Space between the parts of a price group.
pub const GROUP_GAP: f32 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Right,
}

/// Text auto-sized into a box.
#[derive(Debug, Clone, Copy)]
pub struct TextSlot {
    pub font: FontFace,
    pub color: Rgb<u8>,
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
    pub align: Align,
}

pub const fn slot(
    font: FontFace,
    color: Rgb<u8>,
    (x1, y1): (i32, i32),
    (x2, y2): (i32, i32),
    align: Align,
) -> TextSlot {
    TextSlot {
        font,
        color,
        x1,
        y1,
        x2,
        y2,
        align,
    }
}

/// Fixed-size part of a price group, `dy` below the group's top line.
#[derive(Debug, Clone, Copy)]
pub struct Part {
    pub font: FontFace,
    pub size: f32,
    pub color: Rgb<u8>,
    pub dy: i32,
}

pub const fn part(font: FontFace, size: f32, color: Rgb<u8>, dy: i32) -> Part {
    Part {
        font,
        size,
        color,
        dy,
    }
}

/// Value, unit and caption centred together as one unit.
#[derive(Debug, Clone, Copy)]
pub struct PriceGroup {
    pub value: Part,
    pub unit: Part,
    pub suffix: Part,
    pub suffix_text: &'static str,
    pub x_origin: i32,
    /// Right edge of the container; the canvas width when `None`.
    pub x_end: Option<i32>,
    pub y_origin: i32,
}

/// Horizontal start of `width` inside `[x1, x2)`.
pub fn aligned_x(align: Align, x1: f32, x2: f32, width: f32) -> f32 {
    match align {
        Align::Left => x1,
        Align::Center => x1 + ((x2 - x1) - width) / 2.0,
        Align::Right => x2 - width,
    }
}

/// Fit `text` into the slot and draw it, vertically centred on its ink box.
pub fn place_text(canvas: &mut RgbImage, fonts: &FontBook, slot: &TextSlot, text: &str) {
    if text.is_empty() {
        return;
    }
    let box_w = slot.x2 - slot.x1;
    let box_h = slot.y2 - slot.y1;
    if box_w <= 0 || box_h <= 0 {
        tracing::warn!(text, "Skipping text with an empty box");
        return;
    }

    let font = fonts.get(slot.font);
    let size = fit_font_size(box_w as u32, box_h as u32, |size| {
        let bounds = measure(font, size as f32, text);
        (bounds.width(), bounds.height())
    }) as f32;

    let bounds = measure(font, size, text);
    let x = aligned_x(slot.align, slot.x1 as f32, slot.x2 as f32, bounds.width()) - bounds.left;
    let y = slot.y1 as f32 + (box_h as f32 - bounds.height()) / 2.0 - bounds.top;
    draw_text(canvas, font, size, x, y, text, slot.color);
}

/// Total width of a group from its part widths; empty parts take no gap.
pub fn group_width(value_w: f32, unit_w: Option<f32>, suffix_w: Option<f32>) -> f32 {
    value_w
        + unit_w.map_or(0.0, |w| GROUP_GAP + w)
        + suffix_w.map_or(0.0, |w| GROUP_GAP + w)
}

/// Draw `value` followed by `unit` and the group's caption. Nothing is drawn without a value.
pub fn place_price_group(
    canvas: &mut RgbImage,
    fonts: &FontBook,
    group: &PriceGroup,
    value: &str,
    unit: &str,
) {
    if value.is_empty() {
        return;
    }

    let width_of = |part: &Part, text: &str| {
        (!text.is_empty()).then(|| measure(fonts.get(part.font), part.size, text).width())
    };
    let value_w = measure(fonts.get(group.value.font), group.value.size, value).width();
    let unit_w = width_of(&group.unit, unit);
    let suffix_w = width_of(&group.suffix, group.suffix_text);

    let x_end = group.x_end.unwrap_or(canvas.width() as i32) as f32;
    let total = group_width(value_w, unit_w, suffix_w);
    let start_x = aligned_x(Align::Center, group.x_origin as f32, x_end, total);
    let top = group.y_origin as f32;

    let v = &group.value;
    draw_text(canvas, fonts.get(v.font), v.size, start_x, top + v.dy as f32, value, v.color);
    let mut x = start_x + value_w;

    for (part, text, width) in [
        (&group.unit, unit, unit_w),
        (&group.suffix, group.suffix_text, suffix_w),
    ] {
        if let Some(width) = width {
            x += GROUP_GAP;
            draw_text(
                canvas,
                fonts.get(part.font),
                part.size,
                x,
                top + part.dy as f32,
                text,
                part.color,
            );
            x += width;
        }
    }
}
