//! Storefront Client
//!
//! Client-side core of a storefront: guest and account carts, the sign-in cart merge,
//! order buckets (active, cancelled, returned), shipping addresses and checkout, kept in sync
//! with a per-account remote document store and browser-style local storage.
//!
//! ## Features
//! - Guest cart persisted locally, merged into the account cart on sign-in
//! - Versioned document writes with conflict retry
//! - Atomic order bucket transitions
//! - Catalog browsing with price/rating filters and search passthrough
//! - Delivery location by postal code or coordinates
//! - Local JSON gateway for a presentation layer

pub mod api;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod local;
pub mod location;
pub mod services;
pub mod store;
pub mod storefront;

pub use config::Config;
pub use storefront::{Storefront, StorefrontView};

use thiserror::Error;
use crate::domain::aggregates::{AddressError, CartError, OrderError};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum StorefrontError {
    #[error("sign in to continue")]
    NotAuthenticated,

    #[error("no saved address at position {0}")]
    AddressNotFound(usize),

    #[error("product {0:?} not found")]
    ProductNotFound(String),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error(transparent)]
    Store(#[from] store::StoreError),

    #[error(transparent)]
    LocalStorage(#[from] local::LocalStorageError),

    #[error(transparent)]
    Catalog(#[from] catalog::CatalogError),

    #[error(transparent)]
    Location(#[from] location::LocationError),

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

impl StorefrontError {
    /// A remote write lost a version race; re-reading and retrying may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_conflict())
    }
}

pub type Result<T> = std::result::Result<T, StorefrontError>;
