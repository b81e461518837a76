//! Listing filters: price band, minimum rating and sort order.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;
use crate::domain::aggregates::Product;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: Decimal,
    pub max: Decimal,
}

impl PriceRange {
    /// Parses labels like `"₹100 - ₹500"` or `"1,000 - 5,000"`.
    pub fn parse(label: &str) -> Option<Self> {
        let (min, max) = label.split_once(" - ")?;
        let number = |s: &str| {
            let digits: String = s.chars().filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-').collect();
            Decimal::from_str(&digits).ok()
        };
        let (min, max) = (number(min)?, number(max)?);
        (min <= max).then_some(Self { min, max })
    }

    pub fn contains(&self, price: Decimal) -> bool { price >= self.min && price <= self.max }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortOrder {
    #[default]
    Default,
    LowToHigh,
    HighToLow,
    AvgReview,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingFilter {
    pub price_range: Option<PriceRange>,
    pub min_rating: Option<f64>,
    pub sort: SortOrder,
}

impl ListingFilter {
    pub fn apply(&self, products: &[Product]) -> Vec<Product> {
        let mut out: Vec<Product> = products
            .iter()
            .filter(|p| self.price_range.map_or(true, |r| r.contains(p.price())))
            .filter(|p| self.min_rating.map_or(true, |min| p.rating() >= min))
            .cloned()
            .collect();
        // Stable sorts, so ties keep feed order.
        match self.sort {
            SortOrder::Default => {}
            SortOrder::LowToHigh => out.sort_by(|a, b| a.price().cmp(&b.price())),
            SortOrder::HighToLow => out.sort_by(|a, b| b.price().cmp(&a.price())),
            SortOrder::AvgReview => out.sort_by(|a, b| b.rating().total_cmp(&a.rating())),
        }
        out
    }
}

/// Distinct categories in first-seen order.
pub fn categories(products: &[Product]) -> Vec<String> {
    let mut seen = HashSet::new();
    products.iter().map(|p| p.category().to_string()).filter(|c| seen.insert(c.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ingest;
    use serde_json::json;

    fn products() -> Vec<Product> {
        ingest(vec![
            json!({ "id": 1, "title": "A", "category": "phones", "price": 500, "rating": 4.2 }),
            json!({ "id": 2, "title": "B", "category": "laptops", "price": 1500, "rating": 4.8 }),
            json!({ "id": 3, "title": "C", "category": "phones", "price": 90, "rating": 3.1 }),
        ])
    }

    fn titles(products: &[Product]) -> Vec<&str> { products.iter().map(Product::title).collect() }

    #[test]
    fn test_price_range_parse() {
        let range = PriceRange::parse("₹100 - ₹1,000").unwrap();
        assert_eq!(range.min, Decimal::new(100, 0));
        assert_eq!(range.max, Decimal::new(1000, 0));
        assert!(PriceRange::parse("cheap").is_none());
        assert!(PriceRange::parse("500 - 100").is_none());
    }

    #[test]
    fn test_filters_and_sorts() {
        let all = products();
        let filter = ListingFilter { price_range: PriceRange::parse("100 - 2000"), min_rating: None, sort: SortOrder::HighToLow };
        assert_eq!(titles(&filter.apply(&all)), ["B", "A"]);

        let filter = ListingFilter { price_range: None, min_rating: Some(4.0), sort: SortOrder::LowToHigh };
        assert_eq!(titles(&filter.apply(&all)), ["A", "B"]);

        let filter = ListingFilter { sort: SortOrder::AvgReview, ..ListingFilter::default() };
        assert_eq!(titles(&filter.apply(&all)), ["B", "A", "C"]);
    }

    #[test]
    fn test_categories_unique_in_order() {
        assert_eq!(categories(&products()), ["phones", "laptops"]);
    }
}
