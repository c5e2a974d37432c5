use image::{Rgb, RgbImage};

use super::assets::{FontBook, FontFace};
use super::format::{discount, format_datetime, format_price};
use super::layout::{part, place_price_group, place_text, slot, Align, PriceGroup, TextSlot};
use crate::models::item::ItemSpec;

const NOTO_BLACK: FontFace = FontFace::NotoSansBlack;
const NOTO_BOLD: FontFace = FontFace::NotoSansBold;
const PUBLIC_SANS: FontFace = FontFace::PublicSansBold;
const REDDIT: FontFace = FontFace::RedditSansExtraBold;
const SHIPPORI: FontFace = FontFace::ShipporiMinchoBold;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

const YEN: &str = "円";
const REGULAR_SUFFIX: &str = "のところ";
const DISCOUNT_SUFFIX: &str = "OFF";
const SALE_SUFFIX: &str = "税込";

/// Known template designs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    A,
    B,
    C,
    D,
    E,
    F,
}

impl TemplateKind {
    pub fn from_base(base: &str) -> Option<Self> {
        match base {
            "A" => Some(TemplateKind::A),
            "B" => Some(TemplateKind::B),
            "C" => Some(TemplateKind::C),
            "D" => Some(TemplateKind::D),
            "E" => Some(TemplateKind::E),
            "F" => Some(TemplateKind::F),
            _ => None,
        }
    }

    pub fn layout(self) -> &'static TemplateLayout {
        match self {
            TemplateKind::A => &LAYOUT_A,
            TemplateKind::B => &LAYOUT_B,
            TemplateKind::C => &LAYOUT_C,
            TemplateKind::D => &LAYOUT_D,
            TemplateKind::E => &LAYOUT_E,
            TemplateKind::F => &LAYOUT_F,
        }
    }
}

/// How a template shows the discount.
#[derive(Debug, Clone, Copy)]
pub enum DiscountStyle {
    /// Amount, unit and `OFF` as a price group.
    Group(PriceGroup),
    /// One fitted text such as `20%OFF`.
    Badge(TextSlot),
}

#[derive(Debug, Clone, Copy)]
pub struct TemplateLayout {
    pub start: TextSlot,
    pub end: TextSlot,
    pub message: TextSlot,
    pub price_label: TextSlot,
    pub regular: PriceGroup,
    pub discount: DiscountStyle,
    pub sale: PriceGroup,
}

/// Secondary start/end dates in the footer band of variant designs.
pub const SECONDARY_START: TextSlot = slot(NOTO_BLACK, WHITE, (35, 1250), (475, 1319), Align::Right);
pub const SECONDARY_END: TextSlot = slot(NOTO_BLACK, WHITE, (535, 1250), (975, 1319), Align::Left);

impl TemplateLayout {
    pub fn draw(&self, canvas: &mut RgbImage, fonts: &FontBook, spec: &ItemSpec) {
        place_text(canvas, fonts, &self.start, &format_datetime(&spec.start_date));
        place_text(canvas, fonts, &self.end, &format_datetime(&spec.end_date));
        place_text(canvas, fonts, &self.message, &spec.sale_text);
        place_text(canvas, fonts, &self.price_label, &spec.price_label);

        place_price_group(canvas, fonts, &self.regular, &format_price(&spec.regular_price), YEN);

        let discount = discount(&spec.regular_price, &spec.sale_price, spec.discount_mode);
        match (&self.discount, discount) {
            (DiscountStyle::Group(group), Some(d)) => {
                place_price_group(canvas, fonts, group, &d.amount, d.unit.symbol())
            }
            (DiscountStyle::Badge(badge), Some(d)) => {
                place_text(canvas, fonts, badge, &format!("{d}{DISCOUNT_SUFFIX}"))
            }
            (_, None) => {}
        }

        place_price_group(canvas, fonts, &self.sale, &format_price(&spec.sale_price), YEN);
    }
}

pub fn draw_secondary_dates(canvas: &mut RgbImage, fonts: &FontBook, spec: &ItemSpec) {
    if let Some(dates) = &spec.secondary_dates {
        place_text(canvas, fonts, &SECONDARY_START, &format_datetime(&dates.start));
        place_text(canvas, fonts, &SECONDARY_END, &format_datetime(&dates.end));
    }
}

const fn group(
    font: FontFace,
    unit_font: FontFace,
    color: Rgb<u8>,
    sizes: (f32, f32, f32),
    (unit_dy, suffix_dy): (i32, i32),
    suffix_text: &'static str,
    (x_origin, x_end, y_origin): (i32, Option<i32>, i32),
) -> PriceGroup {
    PriceGroup {
        value: part(font, sizes.0, color, 0),
        unit: part(unit_font, sizes.1, color, unit_dy),
        suffix: part(unit_font, sizes.2, color, suffix_dy),
        suffix_text,
        x_origin,
        x_end,
        y_origin,
    }
}

/// Full canvas width, top at `y`.
const fn across(y: i32) -> (i32, Option<i32>, i32) {
    (0, None, y)
}

const A_RED: Rgb<u8> = Rgb([189, 41, 39]);
#[rustfmt::skip]
static LAYOUT_A: TemplateLayout = TemplateLayout {
    start: slot(NOTO_BLACK, BLACK, (270, 80), (771, 125), Align::Center),
    end: slot(NOTO_BLACK, BLACK, (270, 190), (771, 235), Align::Center),
    message: slot(NOTO_BLACK, A_RED, (30, 280), (770, 370), Align::Center),
    price_label: slot(NOTO_BOLD, WHITE, (65, 410), (805, 450), Align::Left),
    regular: group(PUBLIC_SANS, NOTO_BLACK, WHITE, (60.0, 30.0, 25.0), (20, 25), REGULAR_SUFFIX, (330, Some(740), 395)),
    discount: DiscountStyle::Group(group(PUBLIC_SANS, NOTO_BLACK, BLACK, (85.0, 50.0, 30.0), (20, 45), DISCOUNT_SUFFIX, across(485))),
    sale: group(PUBLIC_SANS, NOTO_BLACK, A_RED, (160.0, 50.0, 20.0), (90, 70), SALE_SUFFIX, across(620)),
};

const B_YELLOW: Rgb<u8> = Rgb([255, 239, 0]);
const B_RED: Rgb<u8> = Rgb([215, 0, 0]);
#[rustfmt::skip]
static LAYOUT_B: TemplateLayout = TemplateLayout {
    start: slot(NOTO_BLACK, B_RED, (25, 162), (465, 231), Align::Right),
    end: slot(NOTO_BLACK, B_RED, (555, 162), (995, 231), Align::Left),
    message: slot(NOTO_BLACK, B_RED, (107, 38), (894, 148), Align::Center),
    price_label: slot(NOTO_BLACK, WHITE, (0, 310), (1000, 360), Align::Center),
    regular: group(REDDIT, NOTO_BLACK, WHITE, (130.0, 70.0, 50.0), (35, 65), REGULAR_SUFFIX, across(370)),
    discount: DiscountStyle::Group(group(REDDIT, NOTO_BLACK, B_RED, (95.0, 60.0, 40.0), (20, 45), DISCOUNT_SUFFIX, across(540))),
    sale: group(REDDIT, NOTO_BLACK, B_YELLOW, (230.0, 70.0, 30.0), (130, 100), SALE_SUFFIX, across(660)),
};

const C_GOLD: Rgb<u8> = Rgb([235, 210, 150]);
const C_RED: Rgb<u8> = Rgb([150, 0, 0]);
#[rustfmt::skip]
static LAYOUT_C: TemplateLayout = TemplateLayout {
    start: slot(SHIPPORI, WHITE, (25, 187), (465, 252), Align::Right),
    end: slot(SHIPPORI, WHITE, (530, 187), (960, 252), Align::Left),
    message: slot(SHIPPORI, WHITE, (107, 38), (894, 170), Align::Center),
    price_label: slot(SHIPPORI, WHITE, (0, 310), (1000, 360), Align::Center),
    regular: group(SHIPPORI, SHIPPORI, WHITE, (130.0, 70.0, 50.0), (65, 95), REGULAR_SUFFIX, across(360)),
    discount: DiscountStyle::Group(group(SHIPPORI, SHIPPORI, C_RED, (95.0, 60.0, 40.0), (40, 65), DISCOUNT_SUFFIX, across(530))),
    sale: group(SHIPPORI, SHIPPORI, C_GOLD, (200.0, 70.0, 30.0), (145, 115), SALE_SUFFIX, across(650)),
};

const D_BROWN: Rgb<u8> = Rgb([90, 70, 50]);
const D_RED: Rgb<u8> = Rgb([215, 0, 0]);
#[rustfmt::skip]
static LAYOUT_D: TemplateLayout = TemplateLayout {
    start: slot(NOTO_BLACK, WHITE, (25, 187), (465, 252), Align::Right),
    end: slot(NOTO_BLACK, WHITE, (530, 187), (960, 252), Align::Left),
    message: slot(NOTO_BLACK, WHITE, (107, 38), (894, 170), Align::Center),
    price_label: slot(NOTO_BLACK, D_BROWN, (0, 315), (1000, 370), Align::Center),
    regular: group(PUBLIC_SANS, NOTO_BLACK, D_BROWN, (130.0, 70.0, 50.0), (35, 60), REGULAR_SUFFIX, across(380)),
    discount: DiscountStyle::Group(group(PUBLIC_SANS, NOTO_BLACK, WHITE, (85.0, 50.0, 30.0), (15, 40), DISCOUNT_SUFFIX, across(550))),
    sale: group(PUBLIC_SANS, NOTO_BLACK, D_RED, (200.0, 70.0, 30.0), (95, 65), SALE_SUFFIX, across(700)),
};

const E_SILVER: Rgb<u8> = Rgb([204, 204, 204]);
const E_GOLD: Rgb<u8> = Rgb([235, 210, 150]);
#[rustfmt::skip]
static LAYOUT_E: TemplateLayout = TemplateLayout {
    start: slot(SHIPPORI, BLACK, (25, 200), (465, 265), Align::Right),
    end: slot(SHIPPORI, BLACK, (530, 200), (960, 265), Align::Left),
    message: slot(SHIPPORI, BLACK, (107, 38), (894, 170), Align::Center),
    price_label: slot(SHIPPORI, E_SILVER, (0, 325), (1000, 385), Align::Center),
    regular: group(SHIPPORI, SHIPPORI, E_SILVER, (130.0, 70.0, 50.0), (65, 95), REGULAR_SUFFIX, across(360)),
    discount: DiscountStyle::Badge(slot(SHIPPORI, E_GOLD, (645, 620), (965, 670), Align::Center)),
    sale: group(SHIPPORI, SHIPPORI, E_GOLD, (200.0, 70.0, 30.0), (145, 115), SALE_SUFFIX, across(650)),
};

const F_CHARCOAL: Rgb<u8> = Rgb([93, 95, 96]);
const F_GOLD: Rgb<u8> = Rgb([210, 172, 67]);
#[rustfmt::skip]
static LAYOUT_F: TemplateLayout = TemplateLayout {
    start: slot(SHIPPORI, F_GOLD, (25, 187), (465, 252), Align::Right),
    end: slot(SHIPPORI, F_GOLD, (530, 187), (960, 252), Align::Left),
    message: slot(SHIPPORI, F_GOLD, (107, 38), (894, 170), Align::Center),
    price_label: slot(SHIPPORI, F_CHARCOAL, (0, 320), (1000, 370), Align::Center),
    regular: group(SHIPPORI, SHIPPORI, F_CHARCOAL, (130.0, 70.0, 50.0), (65, 95), REGULAR_SUFFIX, across(360)),
    discount: DiscountStyle::Group(group(SHIPPORI, SHIPPORI, WHITE, (95.0, 60.0, 40.0), (40, 65), DISCOUNT_SUFFIX, across(530))),
    sale: group(SHIPPORI, SHIPPORI, F_GOLD, (200.0, 70.0, 30.0), (145, 115), SALE_SUFFIX, across(650)),
};
