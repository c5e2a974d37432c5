//! Producer submissions used across the integration tests.
#![allow(dead_code)]

use promo_pipeline::models::item::{DiscountMode, ItemSpecInput};

/// One row as the spreadsheet front-end would send it.
pub fn item(id: &str, template: &str) -> ItemSpecInput {
    ItemSpecInput {
        id: id.to_string(),
        product_code: format!("sku-{id}"),
        template: template.to_string(),
        start_date: "2025-03-01T10:00".to_string(),
        end_date: "2025-03-07T23:59".to_string(),
        price_type: "当店通常価格".to_string(),
        custom_price_type: None,
        regular_price: "3980".to_string(),
        sale_price: "2980".to_string(),
        sale_text: Some("週末限定".to_string()),
        discount_type: Some(DiscountMode::Percent),
        mobile_start_date: None,
        mobile_end_date: None,
    }
}

/// Row with a mobile campaign window, which prefers the `-2` asset.
pub fn variant_item(id: &str, template: &str) -> ItemSpecInput {
    ItemSpecInput {
        mobile_start_date: Some("2025-03-02T00:00".to_string()),
        mobile_end_date: Some("2025-03-03T23:59".to_string()),
        ..item(id, template)
    }
}

/// Rows 1 and 2 on template A, row 3 on template B.
pub fn mixed_batch() -> Vec<ItemSpecInput> {
    vec![
        item("1", "テンプレートA"),
        item("2", "テンプレートA"),
        item("3", "テンプレートB"),
    ]
}
