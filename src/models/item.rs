use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// One product row as submitted by the producer.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ItemSpecInput {
    /// Row identifier assigned by the producer, stable across re-submission.
    #[garde(length(min = 1, max = 64))]
    pub id: String,

    /// Becomes the artifact file name, so it must be a single path segment.
    #[garde(length(min = 1, max = 128), custom(file_stem))]
    pub product_code: String,

    /// Empty selects template A.
    #[garde(length(max = 64))]
    #[serde(default)]
    pub template: String,

    #[garde(length(max = 32))]
    pub start_date: String,

    #[garde(length(max = 32))]
    pub end_date: String,

    #[garde(length(max = 64))]
    pub price_type: String,

    #[garde(inner(length(max = 64)))]
    pub custom_price_type: Option<String>,

    #[garde(length(max = 32))]
    pub regular_price: String,

    #[garde(length(max = 32))]
    pub sale_price: String,

    #[garde(inner(length(chars, max = 12)))]
    pub sale_text: Option<String>,

    #[garde(skip)]
    pub discount_type: Option<DiscountMode>,

    #[garde(inner(length(max = 32)))]
    pub mobile_start_date: Option<String>,

    #[garde(inner(length(max = 32)))]
    pub mobile_end_date: Option<String>,
}

fn file_stem(value: &str, _ctx: &()) -> garde::Result {
    if value.contains(['/', '\\']) || value.contains("..") {
        return Err(garde::Error::new("must not contain path separators or '..'"));
    }
    if value.chars().any(char::is_control) {
        return Err(garde::Error::new("must not contain control characters"));
    }
    Ok(())
}

/// How the discount is expressed on the rendered image.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, EnumString, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DiscountMode {
    #[default]
    Percent,
    Yen,
}

/// Template identity decided once at ingestion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TemplateRef {
    /// Normalised base key, e.g. `"B"`.
    pub base: String,
    /// The row carries a secondary date range and prefers the variant asset.
    pub variant: bool,
}

impl TemplateRef {
    /// Normalise a producer template name (`テンプレートB`, `template_B`, `B-2`, `b`).
    pub fn parse(raw: &str, variant: bool) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self {
                base: "A".to_string(),
                variant,
            };
        }
        let without_prefix = trimmed
            .strip_prefix("テンプレート")
            .or_else(|| trimmed.strip_prefix("template_"))
            .or_else(|| trimmed.strip_prefix("template"))
            .unwrap_or(trimmed);
        let base = without_prefix
            .split('-')
            .next()
            .unwrap_or_default()
            .trim()
            .to_uppercase();

        Self { base, variant }
    }
}

/// Secondary (mobile campaign) date range shown by variant templates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

/// Stored rendering input for one item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemSpec {
    pub id: String,
    pub product_code: String,
    pub template: TemplateRef,
    pub start_date: String,
    pub end_date: String,
    /// Caption printed above the regular price.
    pub price_label: String,
    pub regular_price: String,
    pub sale_price: String,
    pub sale_text: String,
    pub discount_mode: DiscountMode,
    pub secondary_dates: Option<DateRange>,
}

impl ItemSpec {
    /// Name of the artifact produced for this item.
    pub fn output_filename(&self) -> String {
        format!("{}.jpg", self.product_code)
    }
}

impl From<ItemSpecInput> for ItemSpec {
    fn from(input: ItemSpecInput) -> Self {
        let secondary_dates = match (input.mobile_start_date, input.mobile_end_date) {
            (Some(start), Some(end)) if !start.is_empty() && !end.is_empty() => {
                Some(DateRange { start, end })
            }
            _ => None,
        };

        let price_label = if input.price_type == "custom" {
            input.custom_price_type.unwrap_or_default()
        } else {
            input.price_type
        };

        Self {
            template: TemplateRef::parse(&input.template, secondary_dates.is_some()),
            id: input.id,
            product_code: input.product_code,
            start_date: input.start_date,
            end_date: input.end_date,
            price_label,
            regular_price: input.regular_price,
            sale_price: input.sale_price,
            sale_text: input.sale_text.unwrap_or_default(),
            discount_mode: input.discount_type.unwrap_or_default(),
            secondary_dates,
        }
    }
}
