//! Account cart synchronisation, including the sign-in merge of the guest cart.

use std::sync::Arc;
use tracing::{debug, instrument};
use crate::domain::aggregates::{Cart, CartEntry, CartError, MergeOutcome, UserSession};
use crate::services::{account_path, retry_on_conflict};
use crate::store::{read_array, Collection, DocumentStore, RetryPolicy, WriteBatch};
use crate::Result;

#[derive(Clone)]
pub struct CartSync {
    store: Arc<dyn DocumentStore>,
    retry: RetryPolicy,
    currency: String,
}

impl CartSync {
    pub fn new(store: Arc<dyn DocumentStore>, retry: RetryPolicy, currency: &str) -> Self {
        Self { store, retry, currency: currency.to_string() }
    }

    /// Current account cart; an account without a cart document has an empty cart.
    #[instrument(skip(self, session), fields(email = %session.email))]
    pub async fn fetch(&self, session: &UserSession) -> Result<Cart> {
        let (entries, _) = read_array::<CartEntry>(self.store.as_ref(), &account_path(session, Collection::Cart)).await?;
        Ok(Cart::from_entries(entries, &self.currency))
    }

    /// Folds the guest cart into the account cart and writes the full list back.
    ///
    /// The guest cart is left alone; the caller clears it once this returns `Ok`.
    #[instrument(skip(self, session, local), fields(email = %session.email, local_items = local.len()))]
    pub async fn merge_local(&self, session: &UserSession, local: &Cart) -> Result<(Cart, MergeOutcome)> {
        if local.is_empty() {
            return Ok((self.fetch(session).await?, MergeOutcome::default()));
        }
        let (cart, outcome) = self.update(session, "cart.merge", |cart| Ok(cart.merge_from(local))).await?;
        debug!(combined = outcome.combined, appended = outcome.appended, "guest cart merged");
        Ok((cart, outcome))
    }

    #[instrument(skip(self, session, entry), fields(email = %session.email, title = entry.title()))]
    pub async fn add(&self, session: &UserSession, entry: &CartEntry) -> Result<Cart> {
        self.apply(session, "cart.add", |cart| {
            cart.add_or_update(entry.clone());
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, session), fields(email = %session.email))]
    pub async fn set_quantity(&self, session: &UserSession, title: &str, quantity: i64) -> Result<Cart> {
        self.apply(session, "cart.set_quantity", |cart| cart.set_quantity(title, quantity)).await
    }

    #[instrument(skip(self, session), fields(email = %session.email))]
    pub async fn increase(&self, session: &UserSession, title: &str) -> Result<Cart> {
        self.apply(session, "cart.increase", |cart| cart.increase(title)).await
    }

    #[instrument(skip(self, session), fields(email = %session.email))]
    pub async fn decrease(&self, session: &UserSession, title: &str) -> Result<Cart> {
        self.apply(session, "cart.decrease", |cart| cart.decrease(title)).await
    }

    #[instrument(skip(self, session), fields(email = %session.email))]
    pub async fn remove(&self, session: &UserSession, title: &str) -> Result<Cart> {
        self.apply(session, "cart.remove", |cart| cart.remove(title)).await
    }

    #[instrument(skip(self, session), fields(email = %session.email))]
    pub async fn clear(&self, session: &UserSession) -> Result<Cart> {
        self.apply(session, "cart.clear", |cart| {
            cart.clear();
            Ok(())
        })
        .await
    }

    async fn apply<F>(&self, session: &UserSession, operation: &'static str, change: F) -> Result<Cart>
    where
        F: Fn(&mut Cart) -> std::result::Result<(), CartError>,
    {
        Ok(self.update(session, operation, change).await?.0)
    }

    /// Versioned read-modify-write of the cart document.
    async fn update<T, F>(&self, session: &UserSession, operation: &'static str, change: F) -> Result<(Cart, T)>
    where
        F: Fn(&mut Cart) -> std::result::Result<T, CartError>,
    {
        let path = &account_path(session, Collection::Cart);
        let change = &change;
        retry_on_conflict(&self.retry, operation, move || async move {
            let (entries, version) = read_array::<CartEntry>(self.store.as_ref(), path).await?;
            let mut cart = Cart::from_entries(entries, &self.currency);
            let output = change(&mut cart)?;
            let batch = WriteBatch::new().put_array(path.clone(), cart.entries(), version)?;
            self.store.commit(batch).await?;
            Ok((cart, output))
        })
        .await
    }
}
