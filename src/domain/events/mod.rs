//! Domain events
//!
//! Raised by the storefront state containers and drained by the presentation layer, which
//! re-renders whatever the event touches.

use serde::Serialize;
use crate::domain::aggregates::Bucket;
use crate::domain::value_objects::UniqueNumber;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent {
    Cart(CartEvent),
    Order(OrderEvent),
    Session(SessionEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CartEvent {
    ItemAdded { title: String, quantity: u32 },
    ItemRemoved { title: String },
    QuantityChanged { title: String, quantity: u32 },
    Merged { combined: usize, appended: usize, total_quantity: u64 },
    MergeFailed { reason: String },
    Cleared,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { unique_number: UniqueNumber },
    Moved { unique_number: UniqueNumber, to: Bucket },
    Refreshed { active: usize, cancelled: usize, returned: usize },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SignedIn { email: String },
    SignedOut,
}
