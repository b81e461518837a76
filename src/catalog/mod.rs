//! Public product catalog.
//!
//! Read-only HTTP access to the product feed. Records are validated once on the way in; a record
//! that fails validation is dropped with a warning instead of failing the whole listing.

pub mod filter;

pub use filter::{categories, ListingFilter, PriceRange, SortOrder};

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{instrument, warn};
use crate::domain::aggregates::{CatalogRecord, Product};
use crate::store::RetryPolicy;

/// Searches shorter than this many characters are not sent.
pub const MIN_SEARCH_LEN: usize = 3;
const LISTING_LIMIT: u32 = 100;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("catalog returned HTTP {0}")]
    Status(reqwest::StatusCode),
}

#[derive(Debug, Deserialize)]
struct ProductsEnvelope {
    #[serde(default)]
    products: Vec<serde_json::Value>,
}

#[derive(Clone)]
pub struct CatalogClient {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl CatalogClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration, retry: RetryPolicy) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url: base_url.into().trim_end_matches('/').to_string(), retry })
    }

    #[instrument(skip(self))]
    pub async fn all_products(&self) -> Result<Vec<Product>, CatalogError> {
        let limit = LISTING_LIMIT.to_string();
        self.fetch_listing("/products", &[("limit", limit.as_str())]).await
    }

    #[instrument(skip(self))]
    pub async fn by_category(&self, category: &str) -> Result<Vec<Product>, CatalogError> {
        self.fetch_listing(&category_path(category), &[]).await
    }

    /// Keyword search passthrough. Short terms return nothing without a request.
    #[instrument(skip(self))]
    pub async fn search(&self, term: &str) -> Result<Vec<Product>, CatalogError> {
        let term = term.trim();
        if term.chars().count() < MIN_SEARCH_LEN { return Ok(Vec::new()); }
        self.fetch_listing("/products/search", &[("q", term)]).await
    }

    /// Product detail pages are addressed by title.
    #[instrument(skip(self))]
    pub async fn by_title(&self, title: &str) -> Result<Option<Product>, CatalogError> {
        Ok(self.all_products().await?.into_iter().find(|p| p.title() == title))
    }

    fn request(&self, path: &str, query: &[(&str, &str)]) -> reqwest::RequestBuilder {
        self.client.get(format!("{}{path}", self.base_url)).query(query)
    }

    async fn fetch_listing(&self, path: &str, query: &[(&str, &str)]) -> Result<Vec<Product>, CatalogError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.get_envelope(path, query).await {
                Ok(envelope) => return Ok(ingest(envelope.products)),
                Err(e) if attempt < self.retry.attempts() && is_transient(&e) => {
                    warn!(path, attempt, error = %e, "catalog request failed, retrying");
                    tokio::time::sleep(self.retry.backoff(attempt)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_envelope(&self, path: &str, query: &[(&str, &str)]) -> Result<ProductsEnvelope, CatalogError> {
        let response = self.request(path, query).send().await?;
        let status = response.status();
        if !status.is_success() { return Err(CatalogError::Status(status)); }
        Ok(response.json::<ProductsEnvelope>().await?)
    }
}

fn is_transient(error: &CatalogError) -> bool {
    match error {
        CatalogError::Http(e) => e.is_timeout() || e.is_connect(),
        CatalogError::Status(status) => status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS,
    }
}

/// Converts raw records into products, dropping the ones that do not hold up.
pub fn ingest(records: Vec<serde_json::Value>) -> Vec<Product> {
    let total = records.len();
    let products: Vec<Product> = records
        .into_iter()
        .filter_map(|raw| {
            let record = match serde_json::from_value::<CatalogRecord>(raw) {
                Ok(record) => record,
                Err(e) => {
                    warn!(error = %e, "dropping malformed catalog record");
                    return None;
                }
            };
            Product::try_from(record).map_err(|e| warn!(error = %e, "dropping invalid catalog record")).ok()
        })
        .collect();
    if products.len() < total {
        tracing::debug!(kept = products.len(), total, "catalog listing filtered");
    }
    products
}

fn category_path(category: &str) -> String {
    format!("/products/category/{}", urlencoding::encode(category))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ingest_drops_bad_records() {
        let products = ingest(vec![
            json!({ "id": 1, "title": "Phone", "price": 549, "rating": 4.5 }),
            json!({ "id": 2, "title": "", "price": 10 }),
            json!({ "id": "three", "title": "Broken" }),
            json!({ "id": 4, "title": "Laptop", "price": 1249.5, "rating": 4.1 }),
        ]);
        let titles: Vec<&str> = products.iter().map(Product::title).collect();
        assert_eq!(titles, ["Phone", "Laptop"]);
    }

    fn client() -> CatalogClient {
        CatalogClient::new("http://127.0.0.1:9/", Duration::from_millis(50), RetryPolicy::default()).unwrap()
    }

    #[test]
    fn test_search_term_is_one_query_parameter() {
        let request = client().request("/products/search", &[("q", "mens shirt & tie #2")]).build().unwrap();
        assert_eq!(request.url().path(), "/products/search");
        let pairs: Vec<(String, String)> = request.url().query_pairs().into_owned().collect();
        assert_eq!(pairs, [("q".to_string(), "mens shirt & tie #2".to_string())]);
    }

    #[test]
    fn test_category_is_one_path_segment() {
        let request = client().request(&category_path("home decoration/lamps"), &[]).build().unwrap();
        assert_eq!(request.url().path(), "/products/category/home%20decoration%2Flamps");
        assert_eq!(request.url().query(), None);
    }

    #[tokio::test]
    async fn short_search_terms_skip_the_request() {
        assert!(client().search(" ab ").await.unwrap().is_empty());
    }
}
