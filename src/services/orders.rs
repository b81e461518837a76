//! Order buckets in the document store.
//!
//! Active, cancelled and returned orders are three documents. A transition rewrites the target
//! and the active document in one batch, so an order can never be seen in both or in neither.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use crate::domain::aggregates::{
    plan_transition, Address, Bucket, CartEntry, Order, OrderBuckets, OrderError, PaymentMethod, UserSession,
};
use crate::domain::value_objects::UniqueNumber;
use crate::services::{account_path, retry_on_conflict};
use crate::store::{read_array, Collection, DocumentPath, DocumentStore, RetryPolicy, WriteBatch};
use crate::Result;

pub fn bucket_collection(bucket: Bucket) -> Collection {
    match bucket {
        Bucket::Active => Collection::Orders,
        Bucket::Cancelled => Collection::CancelOrders,
        Bucket::Returned => Collection::ReturnOrders,
    }
}

/// What a checkout orders.
#[derive(Clone, Copy, Debug)]
pub enum OrderSource<'a> {
    /// Everything in the account cart, which is emptied in the same write.
    Cart,
    /// A single product picked with "Buy Now"; the cart is left alone.
    BuyNow(&'a CartEntry),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Placement {
    pub placed: Vec<Order>,
    pub active: Vec<Order>,
    pub cart_cleared: bool,
}

#[derive(Clone)]
pub struct OrderBook {
    store: Arc<dyn DocumentStore>,
    retry: RetryPolicy,
}

/// Buckets as read, with the document version each one was read at.
struct Versioned {
    buckets: OrderBuckets,
    versions: [u64; 3],
}

impl Versioned {
    fn version(&self, bucket: Bucket) -> u64 {
        self.versions[Bucket::ALL.iter().position(|b| *b == bucket).unwrap_or(0)]
    }
}

impl OrderBook {
    pub fn new(store: Arc<dyn DocumentStore>, retry: RetryPolicy) -> Self { Self { store, retry } }

    /// Fetches all three buckets. Missing documents are empty buckets.
    ///
    /// An order left in more than one bucket by an older client is shown only in its terminal
    /// bucket.
    #[instrument(skip(self, session), fields(email = %session.email))]
    pub async fn refresh_all(&self, session: &UserSession) -> Result<OrderBuckets> {
        let mut buckets = self.read_all(session).await?.buckets;
        for unique in buckets.normalize() {
            warn!(%unique, "order stored in more than one bucket, keeping one copy");
        }
        let [active, cancelled, returned] = buckets.counts();
        info!(active, cancelled, returned, "orders refreshed");
        Ok(buckets)
    }

    #[instrument(skip(self, session), fields(email = %session.email, unique = %unique))]
    pub async fn cancel(&self, session: &UserSession, unique: &UniqueNumber) -> Result<OrderBuckets> {
        self.transition(session, unique, Bucket::Cancelled).await
    }

    #[instrument(skip(self, session), fields(email = %session.email, unique = %unique))]
    pub async fn return_order(&self, session: &UserSession, unique: &UniqueNumber) -> Result<OrderBuckets> {
        self.transition(session, unique, Bucket::Returned).await
    }

    /// Appends one active order per entry. Ordering from the cart also empties the cart
    /// document in the same batch.
    #[instrument(skip(self, session, source, address), fields(email = %session.email))]
    pub async fn place(
        &self,
        session: &UserSession,
        source: OrderSource<'_>,
        address: &Address,
        method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> Result<Placement> {
        let active_path = &account_path(session, Collection::Orders);
        let cart_path = &account_path(session, Collection::Cart);
        let placement = retry_on_conflict(&self.retry, "orders.place", move || async move {
            let (mut active, active_version) = read_array::<Order>(self.store.as_ref(), active_path).await?;
            let (entries, cart_version) = match source {
                OrderSource::Cart => read_array::<CartEntry>(self.store.as_ref(), cart_path).await?,
                OrderSource::BuyNow(entry) => (vec![entry.clone()], 0),
            };
            if entries.is_empty() { return Err(OrderError::NoItems.into()); }

            let placed: Vec<Order> = entries.iter().map(|e| Order::from_entry(e, address.clone(), method, now)).collect();
            active.extend(placed.iter().cloned());
            let mut batch = WriteBatch::new().put_array(active_path.clone(), &active, active_version)?;
            let cart_cleared = matches!(source, OrderSource::Cart);
            if cart_cleared {
                batch = batch.put_array(cart_path.clone(), &[] as &[CartEntry], cart_version)?;
            }
            self.store.commit(batch).await?;
            Ok(Placement { placed, active, cart_cleared })
        })
        .await?;
        info!(count = placement.placed.len(), "orders placed");
        Ok(placement)
    }

    async fn transition(&self, session: &UserSession, unique: &UniqueNumber, target: Bucket) -> Result<OrderBuckets> {
        let active_path = &account_path(session, Collection::Orders);
        let target_path = &account_path(session, bucket_collection(target));
        retry_on_conflict(&self.retry, "orders.transition", move || async move {
            let read = self.read_all(session).await?;
            let mut buckets = read.buckets.clone();
            if buckets.locate(unique).is_empty() {
                return Err(OrderError::NotFound(unique.clone()).into());
            }
            let stored_active = buckets.get(Bucket::Active).len();
            let stored_target = buckets.get(target).len();
            buckets.normalize();

            let plan = plan_transition(buckets.get(Bucket::Active), buckets.get(target), unique, target)?;
            if plan.active.len() != stored_active || plan.target.len() != stored_target {
                let batch = WriteBatch::new()
                    .put_array(target_path.clone(), &plan.target, read.version(target))?
                    .put_array(active_path.clone(), &plan.active, read.version(Bucket::Active))?;
                self.store.commit(batch).await?;
            }
            buckets.replace(Bucket::Active, plan.active);
            buckets.replace(target, plan.target);
            Ok(buckets)
        })
        .await
    }

    async fn read_all(&self, session: &UserSession) -> Result<Versioned> {
        let store = self.store.as_ref();
        let path = |bucket: Bucket| -> DocumentPath { account_path(session, bucket_collection(bucket)) };
        let (active, cancelled, returned) = (path(Bucket::Active), path(Bucket::Cancelled), path(Bucket::Returned));
        let ((active, va), (cancelled, vc), (returned, vr)) = tokio::try_join!(
            read_array::<Order>(store, &active),
            read_array::<Order>(store, &cancelled),
            read_array::<Order>(store, &returned),
        )?;
        Ok(Versioned { buckets: OrderBuckets::new(active, cancelled, returned), versions: [va, vc, vr] })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::address::tests::valid_address;
    use crate::domain::aggregates::cart::tests::entry;
    use crate::domain::aggregates::order::tests::order;
    use crate::store::MemoryStore;
    use crate::StorefrontError;
    use serde_json::json;

    fn session() -> UserSession {
        UserSession { id: "uid-1".into(), name: None, email: "shopper@example.com".into(), image: None, is_authenticated: true }
    }

    fn book(store: Arc<MemoryStore>) -> OrderBook {
        OrderBook::new(store, RetryPolicy { max_attempts: 4, base_backoff_ms: 1 })
    }

    async fn seed(store: &MemoryStore, bucket: Bucket, orders: &[Order]) {
        let collection = bucket_collection(bucket);
        let mut doc = serde_json::Map::new();
        doc.insert(collection.array_field().unwrap().to_string(), serde_json::to_value(orders).unwrap());
        store.write_behind(&account_path(&session(), collection), doc.into()).await;
    }

    #[tokio::test]
    async fn missing_documents_are_empty_buckets() {
        let buckets = book(Arc::new(MemoryStore::new())).refresh_all(&session()).await.unwrap();
        assert!(buckets.is_empty());
    }

    #[tokio::test]
    async fn cancel_moves_order_in_one_write() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, Bucket::Active, &[order("X"), order("Y")]).await;
        let orders = book(store.clone());

        let buckets = orders.cancel(&session(), &"X".into()).await.unwrap();

        assert_eq!(buckets.locate(&"X".into()), vec![Bucket::Cancelled]);
        assert_eq!(store.commit_count(), 1);
        let stored = orders.refresh_all(&session()).await.unwrap();
        assert_eq!(stored, buckets);
        assert_eq!(stored.counts(), [1, 1, 0]);
    }

    #[tokio::test]
    async fn failed_transition_leaves_documents_unchanged() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, Bucket::Active, &[order("X")]).await;
        let orders = book(store.clone());
        let before = orders.refresh_all(&session()).await.unwrap();

        store.fail_next_commits(1);
        assert!(orders.return_order(&session(), &"X".into()).await.is_err());

        assert_eq!(orders.refresh_all(&session()).await.unwrap(), before);
    }

    #[tokio::test]
    async fn half_applied_move_is_finished_not_duplicated() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, Bucket::Active, &[order("X")]).await;
        seed(&store, Bucket::Cancelled, &[order("X")]).await;
        let orders = book(store.clone());

        let buckets = orders.cancel(&session(), &"X".into()).await.unwrap();

        assert_eq!(buckets.counts(), [0, 1, 0]);
        assert_eq!(orders.refresh_all(&session()).await.unwrap().counts(), [0, 1, 0]);
    }

    #[tokio::test]
    async fn terminal_and_unknown_orders_are_rejected() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, Bucket::Cancelled, &[order("X")]).await;
        let orders = book(store.clone());

        let err = orders.return_order(&session(), &"X".into()).await.unwrap_err();
        assert!(matches!(err, StorefrontError::Order(OrderError::NotActive(_))));
        let err = orders.cancel(&session(), &"missing".into()).await.unwrap_err();
        assert!(matches!(err, StorefrontError::Order(OrderError::NotFound(_))));
        assert_eq!(store.commit_count(), 0);
    }

    #[tokio::test]
    async fn transition_survives_concurrent_order_placement() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, Bucket::Active, &[order("X")]).await;
        let orders = book(store.clone());
        store.interleave_before_next_commit(account_path(&session(), Collection::Orders), json!({ "orders": [order("X"), order("New")] })).await;

        let buckets = orders.cancel(&session(), &"X".into()).await.unwrap();

        assert_eq!(buckets.get(Bucket::Active).len(), 1);
        assert_eq!(buckets.get(Bucket::Active)[0].unique_number.as_str(), "New");
        assert_eq!(buckets.get(Bucket::Cancelled).len(), 1);
    }

    #[tokio::test]
    async fn placing_from_cart_empties_it() {
        let store = Arc::new(MemoryStore::new());
        let cart_path = account_path(&session(), Collection::Cart);
        store.write_behind(&cart_path, json!({ "cart": [entry("A", 10, 2), entry("B", 5, 1)] })).await;
        let orders = book(store.clone());

        let placement = orders.place(&session(), OrderSource::Cart, &valid_address(), PaymentMethod::Upi, Utc::now()).await.unwrap();

        assert_eq!(placement.placed.len(), 2);
        assert!(placement.cart_cleared);
        assert_ne!(placement.placed[0].unique_number, placement.placed[1].unique_number);
        let (cart, _) = read_array::<CartEntry>(store.as_ref(), &cart_path).await.unwrap();
        assert!(cart.is_empty());
        assert_eq!(orders.refresh_all(&session()).await.unwrap().counts(), [2, 0, 0]);
    }

    #[tokio::test]
    async fn buy_now_leaves_cart_alone() {
        let store = Arc::new(MemoryStore::new());
        let cart_path = account_path(&session(), Collection::Cart);
        store.write_behind(&cart_path, json!({ "cart": [entry("A", 10, 2)] })).await;
        let orders = book(store.clone());
        let pick = entry("Z", 99, 1);

        let placement = orders.place(&session(), OrderSource::BuyNow(&pick), &valid_address(), PaymentMethod::Card, Utc::now()).await.unwrap();

        assert_eq!(placement.active.len(), 1);
        assert_eq!(placement.placed[0].title(), "Z");
        let (cart, _) = read_array::<CartEntry>(store.as_ref(), &cart_path).await.unwrap();
        assert_eq!(cart.len(), 1);
    }

    #[tokio::test]
    async fn empty_cart_cannot_be_ordered() {
        let orders = book(Arc::new(MemoryStore::new()));
        let err = orders.place(&session(), OrderSource::Cart, &valid_address(), PaymentMethod::Emi, Utc::now()).await.unwrap_err();
        assert!(matches!(err, StorefrontError::Order(OrderError::NoItems)));
    }
}
