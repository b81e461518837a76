//! Aggregates module
pub mod product;
pub mod cart;
pub mod order;
pub mod address;
pub mod session;

pub use product::{CatalogRecord, Product, ProductError, ProductSnapshot};
pub use cart::{Cart, CartEntry, CartError, CartTotals, MergeOutcome};
pub use order::{plan_transition, Bucket, Order, OrderBuckets, OrderError, PaymentMethod, Transition};
pub use address::{Address, AddressError};
pub use session::{Identity, ProfileDetails, UserSession};
