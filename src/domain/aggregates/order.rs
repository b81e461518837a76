//! Order Aggregate
//!
//! An order lives in exactly one of three buckets: active, cancelled or returned. Each bucket is
//! its own remote document, so [`OrderBuckets`] is the in-memory mirror of all three and owns the
//! rules for moving an order between them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;
use crate::domain::aggregates::address::Address;
use crate::domain::aggregates::cart::CartEntry;
use crate::domain::aggregates::product::ProductSnapshot;
use crate::domain::value_objects::{Money, Quantity, UniqueNumber};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub unique_number: UniqueNumber,
    #[serde(flatten)]
    pub product: ProductSnapshot,
    pub quantity: Quantity,
    pub address: Address,
    pub payment_method: PaymentMethod,
    pub date: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[serde(rename = "Credit/Debit Card")]
    Card,
    #[serde(rename = "Upi Apps")]
    Upi,
    #[serde(rename = "EMI")]
    Emi,
    #[serde(rename = "cash on Delivery")]
    CashOnDelivery,
}

impl Order {
    pub fn from_entry(entry: &CartEntry, address: Address, payment_method: PaymentMethod, date: DateTime<Utc>) -> Self {
        Self {
            unique_number: UniqueNumber::generate(),
            product: entry.product.clone(),
            quantity: entry.quantity,
            address,
            payment_method,
            date,
        }
    }

    pub fn title(&self) -> &str { &self.product.title }
    pub fn total(&self, currency: &str) -> Money { Money::new(self.product.price, currency).multiply(self.quantity) }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket { Active, Cancelled, Returned }

impl Bucket {
    pub const ALL: [Bucket; 3] = [Bucket::Active, Bucket::Cancelled, Bucket::Returned];

    pub fn is_terminal(&self) -> bool { !matches!(self, Bucket::Active) }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self { Self::Active => "active", Self::Cancelled => "cancelled", Self::Returned => "returned" })
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct OrderBuckets {
    active: Vec<Order>,
    cancelled: Vec<Order>,
    returned: Vec<Order>,
}

impl OrderBuckets {
    pub fn new(active: Vec<Order>, cancelled: Vec<Order>, returned: Vec<Order>) -> Self { Self { active, cancelled, returned } }

    pub fn get(&self, bucket: Bucket) -> &[Order] {
        match bucket { Bucket::Active => &self.active, Bucket::Cancelled => &self.cancelled, Bucket::Returned => &self.returned }
    }

    pub fn replace(&mut self, bucket: Bucket, orders: Vec<Order>) { *self.slot(bucket) = orders; }

    /// Storage order reversed, most recent first.
    pub fn newest_first(&self, bucket: Bucket) -> Vec<Order> { self.get(bucket).iter().rev().cloned().collect() }

    pub fn counts(&self) -> [usize; 3] { [self.active.len(), self.cancelled.len(), self.returned.len()] }

    pub fn is_empty(&self) -> bool { self.counts().iter().all(|c| *c == 0) }

    /// Every bucket currently holding `unique`.
    pub fn locate(&self, unique: &UniqueNumber) -> Vec<Bucket> {
        Bucket::ALL.into_iter().filter(|b| self.get(*b).iter().any(|o| &o.unique_number == unique)).collect()
    }

    /// Moves an active order into a terminal bucket.
    pub fn move_to(&mut self, unique: &UniqueNumber, target: Bucket) -> Result<(), OrderError> {
        if self.locate(unique).is_empty() { return Err(OrderError::NotFound(unique.clone())); }
        let plan = plan_transition(&self.active, self.get(target), unique, target)?;
        self.active = plan.active;
        *self.slot(target) = plan.target;
        Ok(())
    }

    /// Restores bucket exclusivity after a partially applied transition: a terminal bucket wins
    /// over active, cancelled wins over returned, and repeats inside one bucket collapse.
    /// Returns the unique numbers that were repaired.
    pub fn normalize(&mut self) -> Vec<UniqueNumber> {
        let mut seen = HashSet::new();
        let mut repaired = Vec::new();
        for bucket in [Bucket::Cancelled, Bucket::Returned, Bucket::Active] {
            self.slot(bucket).retain(|o| {
                let first = seen.insert(o.unique_number.clone());
                if !first { repaired.push(o.unique_number.clone()); }
                first
            });
        }
        repaired
    }

    fn slot(&mut self, bucket: Bucket) -> &mut Vec<Order> {
        match bucket { Bucket::Active => &mut self.active, Bucket::Cancelled => &mut self.cancelled, Bucket::Returned => &mut self.returned }
    }
}

/// Result of checking a transition against the stored bucket contents.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    /// Active bucket with the order removed.
    pub active: Vec<Order>,
    /// Target bucket with the order appended, unless it was already there.
    pub target: Vec<Order>,
}

/// Computes the new contents of the active and target buckets for moving `unique` into `target`.
///
/// A transition that already landed in the target is accepted again; any leftover copy in active
/// is dropped so a retry finishes the move instead of duplicating it.
pub fn plan_transition(active: &[Order], target: &[Order], unique: &UniqueNumber, bucket: Bucket) -> Result<Transition, OrderError> {
    if !bucket.is_terminal() { return Err(OrderError::InvalidTarget(bucket)); }
    let in_active = active.iter().find(|o| &o.unique_number == unique);
    let in_target = target.iter().any(|o| &o.unique_number == unique);
    let mut new_target = target.to_vec();
    match (in_active, in_target) {
        (None, false) => return Err(OrderError::NotActive(unique.clone())),
        (Some(order), false) => new_target.push(order.clone()),
        _ => {}
    }
    Ok(Transition {
        active: active.iter().filter(|o| &o.unique_number != unique).cloned().collect(),
        target: new_target,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("order {0} not found")]
    NotFound(UniqueNumber),
    #[error("order {0} is not an active order")]
    NotActive(UniqueNumber),
    #[error("orders cannot be moved into the {0} bucket")]
    InvalidTarget(Bucket),
    #[error("nothing to order")]
    NoItems,
    #[error("select a shipping address first")]
    NoAddress,
    #[error("select a payment method first")]
    NoPaymentMethod,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::aggregates::address::tests::valid_address;
    use crate::domain::aggregates::cart::tests::entry;

    pub(crate) fn order(unique: &str) -> Order {
        let mut order = Order::from_entry(&entry(unique, 100, 1), valid_address(), PaymentMethod::CashOnDelivery, Utc::now());
        order.unique_number = UniqueNumber::from(unique);
        order
    }

    #[test]
    fn test_cancel_moves_exactly_once() {
        let mut buckets = OrderBuckets::new(vec![order("X"), order("Y")], vec![], vec![]);
        buckets.move_to(&"X".into(), Bucket::Cancelled).unwrap();
        assert_eq!(buckets.locate(&"X".into()), vec![Bucket::Cancelled]);
        assert_eq!(buckets.counts(), [1, 1, 0]);
    }

    #[test]
    fn test_terminal_orders_cannot_move_again() {
        let mut buckets = OrderBuckets::new(vec![], vec![order("X")], vec![]);
        assert_eq!(buckets.move_to(&"X".into(), Bucket::Returned), Err(OrderError::NotActive("X".into())));
        assert_eq!(buckets.move_to(&"X".into(), Bucket::Active), Err(OrderError::InvalidTarget(Bucket::Active)));
        assert_eq!(buckets.move_to(&"nope".into(), Bucket::Cancelled), Err(OrderError::NotFound("nope".into())));
    }

    #[test]
    fn test_plan_finishes_half_applied_move() {
        let plan = plan_transition(&[order("X")], &[order("X")], &"X".into(), Bucket::Returned).unwrap();
        assert!(plan.active.is_empty());
        assert_eq!(plan.target.len(), 1);
    }

    #[test]
    fn test_normalize_prefers_terminal_bucket() {
        let mut buckets = OrderBuckets::new(vec![order("X"), order("Y")], vec![order("X")], vec![order("Z"), order("Z")]);
        let repaired = buckets.normalize();
        assert_eq!(repaired.len(), 2);
        assert_eq!(buckets.locate(&"X".into()), vec![Bucket::Cancelled]);
        assert_eq!(buckets.counts(), [1, 1, 1]);
    }

    #[test]
    fn test_newest_first_reverses_storage_order() {
        let buckets = OrderBuckets::new(vec![order("old"), order("new")], vec![], vec![]);
        let titles: Vec<String> = buckets.newest_first(Bucket::Active).iter().map(|o| o.unique_number.to_string()).collect();
        assert_eq!(titles, ["new", "old"]);
    }

    #[test]
    fn test_order_wire_shape() {
        let json = serde_json::to_value(order("X")).unwrap();
        assert_eq!(json["uniqueNumber"], "X");
        assert_eq!(json["paymentMethod"], "cash on Delivery");
        assert_eq!(json["title"], "X");
        assert_eq!(json["address"]["country"], "India");
        let back: Order = serde_json::from_value(json).unwrap();
        assert_eq!(back.unique_number.as_str(), "X");
    }
}
