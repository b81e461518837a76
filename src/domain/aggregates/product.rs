//! Product Aggregate
//!
//! Catalog records arrive untyped from the public catalog API. They are checked once here,
//! at the ingestion boundary, and everything downstream works with [`Product`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire shape of one catalog record.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogRecord {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub price: Decimal,
    #[serde(default)]
    pub discount_percentage: f64,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub stock: u32,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    id: u64,
    title: String,
    description: String,
    category: String,
    price: Decimal,
    discount_percentage: f64,
    rating: f64,
    stock: u32,
    brand: Option<String>,
    thumbnail: String,
    images: Vec<String>,
}

/// Denormalized catalog fields copied into cart entries and orders.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSnapshot {
    #[serde(default)]
    pub id: u64,
    pub title: String,
    pub price: Decimal,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub discount_percentage: f64,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub stock: u32,
}

impl Product {
    pub fn title(&self) -> &str { &self.title }
    pub fn category(&self) -> &str { &self.category }
    pub fn price(&self) -> Decimal { self.price }
    pub fn rating(&self) -> f64 { self.rating }

    pub fn snapshot(&self) -> ProductSnapshot {
        ProductSnapshot {
            id: self.id,
            title: self.title.clone(),
            price: self.price,
            description: self.description.clone(),
            category: self.category.clone(),
            brand: self.brand.clone(),
            thumbnail: self.thumbnail.clone(),
            images: self.images.clone(),
            discount_percentage: self.discount_percentage,
            rating: self.rating,
            stock: self.stock,
        }
    }
}

impl TryFrom<CatalogRecord> for Product {
    type Error = ProductError;

    fn try_from(record: CatalogRecord) -> Result<Self, Self::Error> {
        let title = record.title.trim().to_string();
        if title.is_empty() { return Err(ProductError::MissingTitle { id: record.id }); }
        if record.price.is_sign_negative() { return Err(ProductError::NegativePrice { id: record.id }); }
        if !(0.0..=5.0).contains(&record.rating) {
            return Err(ProductError::RatingOutOfRange { id: record.id, rating: record.rating });
        }
        if !(0.0..=100.0).contains(&record.discount_percentage) {
            return Err(ProductError::DiscountOutOfRange { id: record.id, discount: record.discount_percentage });
        }
        Ok(Self {
            id: record.id,
            title,
            description: record.description,
            category: record.category,
            price: record.price,
            discount_percentage: record.discount_percentage,
            rating: record.rating,
            stock: record.stock,
            brand: record.brand.filter(|b| !b.trim().is_empty()),
            thumbnail: record.thumbnail,
            images: record.images,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProductError {
    #[error("product {id} has no title")]
    MissingTitle { id: u64 },
    #[error("product {id} has a negative price")]
    NegativePrice { id: u64 },
    #[error("product {id} has rating {rating} outside 0..=5")]
    RatingOutOfRange { id: u64, rating: f64 },
    #[error("product {id} has discount {discount} outside 0..=100")]
    DiscountOutOfRange { id: u64, discount: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(json: serde_json::Value) -> CatalogRecord { serde_json::from_value(json).unwrap() }

    #[test]
    fn test_product_from_record() {
        let p = Product::try_from(record(serde_json::json!({
            "id": 1, "title": " iPhone 9 ", "description": "An apple mobile", "category": "smartphones",
            "price": 549, "discountPercentage": 12.96, "rating": 4.69, "stock": 94, "brand": "Apple",
            "thumbnail": "https://cdn/1/thumbnail.jpg", "images": ["https://cdn/1/1.jpg"]
        })))
        .unwrap();
        assert_eq!(p.title(), "iPhone 9");
        assert_eq!(p.price(), Decimal::new(549, 0));
        let snap = p.snapshot();
        assert_eq!(snap.brand.as_deref(), Some("Apple"));
        assert_eq!(snap.images.len(), 1);
    }

    #[test]
    fn test_invalid_records_rejected() {
        let no_title = record(serde_json::json!({ "id": 2, "title": "  ", "price": 10 }));
        assert_eq!(Product::try_from(no_title), Err(ProductError::MissingTitle { id: 2 }));
        let bad_rating = record(serde_json::json!({ "id": 3, "title": "X", "price": 10, "rating": 7.5 }));
        assert!(matches!(Product::try_from(bad_rating), Err(ProductError::RatingOutOfRange { .. })));
        let negative = record(serde_json::json!({ "id": 4, "title": "Y", "price": -1 }));
        assert_eq!(Product::try_from(negative), Err(ProductError::NegativePrice { id: 4 }));
    }
}
