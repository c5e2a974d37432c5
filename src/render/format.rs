use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};
use std::fmt;

use crate::models::item::DiscountMode;

/// Exact decimal: `mantissa / 10^scale`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Decimal {
    mantissa: i128,
    scale: u32,
}

impl Decimal {
    /// Plain decimal notation, optional sign and fraction. No separators or exponents.
    fn parse(raw: &str) -> Option<Self> {
        let s = raw.trim();
        let (negative, digits) = match s.as_bytes().first()? {
            b'-' => (true, &s[1..]),
            b'+' => (false, &s[1..]),
            _ => (false, s),
        };
        let (int_part, frac_part) = match digits.split_once('.') {
            Some((i, f)) => (i, f),
            None => (digits, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return None;
        }
        if int_part.len() + frac_part.len() > 30 {
            return None;
        }

        let mut mantissa: i128 = 0;
        for b in int_part.bytes().chain(frac_part.bytes()) {
            mantissa = mantissa * 10 + i128::from(b - b'0');
        }
        Some(Self {
            mantissa: if negative { -mantissa } else { mantissa },
            scale: frac_part.len() as u32,
        })
    }

    /// `None` when the mantissa does not fit at the wider scale.
    fn rescale(self, scale: u32) -> Option<i128> {
        10i128
            .checked_pow(scale - self.scale)
            .and_then(|factor| self.mantissa.checked_mul(factor))
    }

    /// Both mantissas at a common scale, and that scale.
    fn aligned(a: Self, b: Self) -> Option<(i128, i128, u32)> {
        let scale = a.scale.max(b.scale);
        Some((a.rescale(scale)?, b.rescale(scale)?, scale))
    }

    fn round_half_up(self) -> i128 {
        div_round_half_up(self.mantissa, 10i128.pow(self.scale))
    }
}

/// `n / d` rounded to the nearest integer, ties away from zero. `d > 0`.
fn div_round_half_up(n: i128, d: i128) -> i128 {
    let q = n.abs() / d;
    let r = n.abs() % d;
    let rounded = if r >= d - r { q + 1 } else { q };
    if n < 0 {
        -rounded
    } else {
        rounded
    }
}

fn group_thousands(value: i128) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Round to a whole amount and group thousands; unparseable text is returned as is.
pub fn format_price(raw: &str) -> String {
    match Decimal::parse(raw) {
        Some(value) => group_thousands(value.round_half_up()),
        None => raw.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscountUnit {
    Percent,
    Yen,
}

impl DiscountUnit {
    pub fn symbol(self) -> &'static str {
        match self {
            DiscountUnit::Percent => "%",
            DiscountUnit::Yen => "円",
        }
    }
}

/// A displayable discount, e.g. `20` + `%` or `1,200` + `円`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discount {
    pub amount: String,
    pub unit: DiscountUnit,
}

impl fmt::Display for Discount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.unit.symbol())
    }
}

/// Discount of `sale` against `regular`, `None` unless the sale price is actually
/// lower and the amounts can be compared exactly.
pub fn discount(regular: &str, sale: &str, mode: DiscountMode) -> Option<Discount> {
    let regular = Decimal::parse(regular)?;
    let sale = Decimal::parse(sale)?;
    let (regular, sale, scale) = Decimal::aligned(regular, sale)?;

    if regular <= 0 || regular <= sale {
        return None;
    }
    let difference = regular.checked_sub(sale)?;

    Some(match mode {
        DiscountMode::Yen => Discount {
            amount: group_thousands(div_round_half_up(difference, 10i128.checked_pow(scale)?)),
            unit: DiscountUnit::Yen,
        },
        DiscountMode::Percent => Discount {
            amount: div_round_half_up(difference.checked_mul(100)?, regular).to_string(),
            unit: DiscountUnit::Percent,
        },
    })
}

/// Text form used where the discount is one string, e.g. `20%` or `200円`; empty when none.
pub fn discount_display(regular: &str, sale: &str, mode: DiscountMode) -> String {
    discount(regular, sale, mode)
        .map(|d| d.to_string())
        .unwrap_or_default()
}

/// `3月1日10:00` style; unparseable input is returned as is.
pub fn format_datetime(raw: &str) -> String {
    let s = raw.trim();
    if s.is_empty() {
        return String::new();
    }
    match parse_datetime(s) {
        Some(dt) => format!(
            "{}月{}日{}:{:02}",
            dt.month(),
            dt.day(),
            dt.hour(),
            dt.minute()
        ),
        None => raw.to_string(),
    }
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    const FORMATS: [&str; 6] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S%.f%:z",
        "%Y-%m-%d %H:%M:%S%.f%:z",
    ];
    for format in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt);
        }
        if let Ok(dt) = DateTime::parse_from_str(s, format) {
            return Some(dt.naive_local());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
