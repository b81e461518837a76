//! Storefront state containers.
//!
//! [`Storefront`] holds everything a signed-in or guest visitor sees: the session, the guest
//! cart (persisted to local storage), the account cart, order buckets, saved addresses and
//! checkout selections. Cart operations go to the guest cart or the account cart depending on
//! whether a session exists; the two are only ever combined by the sign-in merge.

use chrono::Utc;
use serde::Serialize;
use std::mem;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use crate::config::Config;
use crate::domain::aggregates::{
    Address, Bucket, Cart, CartEntry, CartTotals, Identity, MergeOutcome, Order, OrderBuckets, OrderError,
    PaymentMethod, UserSession,
};
use crate::domain::events::{CartEvent, DomainEvent, OrderEvent, SessionEvent};
use crate::domain::value_objects::UniqueNumber;
use crate::local::{self, DeliveryLocation, LocalStorage, PersistedState};
use crate::services::{AddressBook, CartSync, OrderBook, OrderSource, Profile};
use crate::store::DocumentStore;
use crate::{Result, StorefrontError};

/// Read-only view handed to the presentation layer.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorefrontView {
    pub session: Option<UserSession>,
    pub cart: Vec<CartEntry>,
    pub totals: CartTotals,
    pub order_counts: OrderCounts,
    pub buy_now_product: Option<CartEntry>,
    pub selected_address: Option<Address>,
    pub payment_method: Option<PaymentMethod>,
    pub location: Option<DeliveryLocation>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OrderCounts {
    pub active: usize,
    pub cancelled: usize,
    pub returned: usize,
}

pub struct Storefront {
    local_storage: Arc<dyn LocalStorage>,
    carts: CartSync,
    orders: OrderBook,
    addresses: AddressBook,
    profile: Profile,
    currency: String,
    session: Option<UserSession>,
    local_cart: Cart,
    remote_cart: Cart,
    buckets: OrderBuckets,
    saved_addresses: Vec<Address>,
    selected_address: Option<usize>,
    payment_method: Option<PaymentMethod>,
    buy_now: Option<CartEntry>,
    location: Option<DeliveryLocation>,
    events: Vec<DomainEvent>,
}

impl Storefront {
    pub fn new(store: Arc<dyn DocumentStore>, local_storage: Arc<dyn LocalStorage>, config: &Config) -> Self {
        let currency = config.currency.as_str();
        Self {
            local_storage,
            carts: CartSync::new(store.clone(), config.retry.clone(), currency),
            orders: OrderBook::new(store.clone(), config.retry.clone()),
            addresses: AddressBook::new(store.clone(), config.retry.clone()),
            profile: Profile::new(store),
            currency: currency.to_string(),
            session: None,
            local_cart: Cart::new(currency),
            remote_cart: Cart::new(currency),
            buckets: OrderBuckets::default(),
            saved_addresses: Vec::new(),
            selected_address: None,
            payment_method: None,
            buy_now: None,
            location: None,
            events: Vec::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Session
    // -------------------------------------------------------------------------

    /// Rehydrates persisted state. A persisted session has its account state fetched again.
    #[instrument(skip(self))]
    pub async fn restore(&mut self) -> Result<()> {
        let state = local::load_state(self.local_storage.as_ref())?;
        self.local_cart = Cart::from_entries(state.products, &self.currency);
        self.location = local::load_location(self.local_storage.as_ref())?;
        self.session = state.user_info.filter(|s| s.is_authenticated);
        if let Some(session) = self.session.clone() {
            self.buy_now = state.buy_now_product;
            self.remote_cart = self.carts.fetch(&session).await?;
            self.refresh_account(&session).await?;
        }
        info!(guest_items = self.local_cart.len(), signed_in = self.session.is_some(), "state restored");
        Ok(())
    }

    /// Starts a session for a verified identity and folds the guest cart into the account cart.
    ///
    /// When the merge fails the session stays open and the guest cart is kept, in memory and in
    /// local storage; [`Storefront::retry_merge`] tries again.
    #[instrument(skip(self, identity), fields(email = %identity.email))]
    pub async fn sign_in(&mut self, identity: &Identity) -> Result<MergeOutcome> {
        let session = UserSession::from_identity(identity);
        self.profile.ensure_details(&session, identity, Utc::now()).await?;
        self.session = Some(session.clone());
        self.events.push(DomainEvent::Session(SessionEvent::SignedIn { email: session.email.clone() }));
        self.persist()?;
        self.refresh_account(&session).await?;
        self.merge_local_cart(&session).await
    }

    pub async fn retry_merge(&mut self) -> Result<MergeOutcome> {
        let session = self.require_session()?;
        self.merge_local_cart(&session).await
    }

    /// Ends the session. The guest cart is untouched.
    pub fn sign_out(&mut self) -> Result<()> {
        self.session = None;
        self.remote_cart = Cart::new(&self.currency);
        self.buckets = OrderBuckets::default();
        self.saved_addresses.clear();
        self.selected_address = None;
        self.payment_method = None;
        self.buy_now = None;
        self.events.push(DomainEvent::Session(SessionEvent::SignedOut));
        self.persist()
    }

    pub fn session(&self) -> Option<&UserSession> { self.session.as_ref() }

    /// Guest items leave local storage before the merge write, so they are folded in at most
    /// once. A failed merge puts them back and shows the stored account cart.
    async fn merge_local_cart(&mut self, session: &UserSession) -> Result<MergeOutcome> {
        self.persist_products(&[])?;
        let merged = self.carts.merge_local(session, &self.local_cart).await;
        match merged {
            Ok((cart, outcome)) => {
                self.remote_cart = cart;
                self.local_cart.clear();
                self.events.push(DomainEvent::Cart(CartEvent::Merged {
                    combined: outcome.combined,
                    appended: outcome.appended,
                    total_quantity: self.remote_cart.totals().quantity,
                }));
                Ok(outcome)
            }
            Err(e) => {
                warn!(error = %e, kept = self.local_cart.len(), "cart merge failed, guest cart kept");
                if let Err(persist_err) = self.persist() {
                    warn!(error = %persist_err, "guest cart could not be written back to local storage");
                }
                match self.carts.fetch(session).await {
                    Ok(cart) => self.remote_cart = cart,
                    Err(fetch_err) => warn!(error = %fetch_err, "account cart could not be fetched"),
                }
                self.events.push(DomainEvent::Cart(CartEvent::MergeFailed { reason: e.to_string() }));
                Err(e)
            }
        }
    }

    async fn refresh_account(&mut self, session: &UserSession) -> Result<()> {
        let (buckets, addresses) = tokio::try_join!(self.orders.refresh_all(session), self.addresses.fetch(session))?;
        self.buckets = buckets;
        self.saved_addresses = addresses;
        self.selected_address = self.selected_address.filter(|i| *i < self.saved_addresses.len());
        self.push_refreshed();
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Cart
    // -------------------------------------------------------------------------

    pub async fn add_to_cart(&mut self, entry: CartEntry) -> Result<()> {
        let (title, quantity) = (entry.title().to_string(), entry.quantity.get());
        match self.session.clone() {
            Some(session) => self.remote_cart = self.carts.add(&session, &entry).await?,
            None => {
                self.local_cart.add_or_update(entry);
                self.persist()?;
            }
        }
        self.events.push(DomainEvent::Cart(CartEvent::ItemAdded { title, quantity }));
        Ok(())
    }

    pub async fn remove_from_cart(&mut self, title: &str) -> Result<()> {
        match self.session.clone() {
            Some(session) => self.remote_cart = self.carts.remove(&session, title).await?,
            None => {
                self.local_cart.remove(title)?;
                self.persist()?;
            }
        }
        self.events.push(DomainEvent::Cart(CartEvent::ItemRemoved { title: title.to_string() }));
        Ok(())
    }

    /// Sets an absolute quantity; values below one become one.
    pub async fn set_quantity(&mut self, title: &str, quantity: i64) -> Result<()> {
        match self.session.clone() {
            Some(session) => self.remote_cart = self.carts.set_quantity(&session, title, quantity).await?,
            None => {
                self.local_cart.set_quantity(title, quantity)?;
                self.persist()?;
            }
        }
        self.push_quantity_changed(title);
        Ok(())
    }

    pub async fn increase_quantity(&mut self, title: &str) -> Result<()> {
        match self.session.clone() {
            Some(session) => self.remote_cart = self.carts.increase(&session, title).await?,
            None => {
                self.local_cart.increase(title)?;
                self.persist()?;
            }
        }
        self.push_quantity_changed(title);
        Ok(())
    }

    pub async fn decrease_quantity(&mut self, title: &str) -> Result<()> {
        match self.session.clone() {
            Some(session) => self.remote_cart = self.carts.decrease(&session, title).await?,
            None => {
                self.local_cart.decrease(title)?;
                self.persist()?;
            }
        }
        self.push_quantity_changed(title);
        Ok(())
    }

    /// Cart the visitor is working with: the guest cart, or the account cart once signed in.
    pub fn cart(&self) -> &Cart {
        if self.session.is_some() { &self.remote_cart } else { &self.local_cart }
    }

    pub fn totals(&self) -> CartTotals { self.cart().totals().clone() }

    // -------------------------------------------------------------------------
    // Checkout
    // -------------------------------------------------------------------------

    pub fn buy_now(&mut self, entry: CartEntry) -> Result<()> {
        self.require_session()?;
        self.buy_now = Some(entry);
        self.persist()
    }

    pub fn reset_buy_now(&mut self) -> Result<()> {
        self.buy_now = None;
        self.persist()
    }

    pub fn addresses(&self) -> &[Address] { &self.saved_addresses }

    #[instrument(skip(self, address))]
    pub async fn save_address(&mut self, address: &Address) -> Result<()> {
        let session = self.require_session()?;
        self.saved_addresses = self.addresses.save(&session, address).await?;
        Ok(())
    }

    pub fn select_address(&mut self, index: usize) -> Result<()> {
        if index >= self.saved_addresses.len() { return Err(StorefrontError::AddressNotFound(index)); }
        self.selected_address = Some(index);
        Ok(())
    }

    pub fn select_payment(&mut self, method: PaymentMethod) { self.payment_method = Some(method); }

    /// Orders the buy-now product when one is picked, the account cart otherwise.
    #[instrument(skip(self))]
    pub async fn checkout(&mut self) -> Result<Vec<Order>> {
        let session = self.require_session()?;
        let address = self
            .selected_address
            .and_then(|i| self.saved_addresses.get(i))
            .cloned()
            .ok_or(OrderError::NoAddress)?;
        let method = self.payment_method.ok_or(OrderError::NoPaymentMethod)?;
        let source = self.buy_now.as_ref().map_or(OrderSource::Cart, OrderSource::BuyNow);

        let placement = self.orders.place(&session, source, &address, method, Utc::now()).await?;

        self.buckets.replace(Bucket::Active, placement.active);
        if placement.cart_cleared {
            self.remote_cart = Cart::new(&self.currency);
            self.events.push(DomainEvent::Cart(CartEvent::Cleared));
        } else {
            self.buy_now = None;
            self.persist()?;
        }
        for order in &placement.placed {
            self.events.push(DomainEvent::Order(OrderEvent::Placed { unique_number: order.unique_number.clone() }));
        }
        Ok(placement.placed)
    }

    // -------------------------------------------------------------------------
    // Orders
    // -------------------------------------------------------------------------

    pub async fn cancel_order(&mut self, unique: &UniqueNumber) -> Result<()> {
        self.move_order(unique, Bucket::Cancelled).await
    }

    pub async fn return_order(&mut self, unique: &UniqueNumber) -> Result<()> {
        self.move_order(unique, Bucket::Returned).await
    }

    pub async fn refresh_orders(&mut self) -> Result<()> {
        let session = self.require_session()?;
        self.buckets = self.orders.refresh_all(&session).await?;
        self.push_refreshed();
        Ok(())
    }

    /// Orders in `bucket`, most recent first. Empty for guests.
    pub fn orders(&self, bucket: Bucket) -> Vec<Order> { self.buckets.newest_first(bucket) }

    async fn move_order(&mut self, unique: &UniqueNumber, target: Bucket) -> Result<()> {
        let session = self.require_session()?;
        self.buckets = match target {
            Bucket::Cancelled => self.orders.cancel(&session, unique).await?,
            Bucket::Returned => self.orders.return_order(&session, unique).await?,
            Bucket::Active => return Err(OrderError::InvalidTarget(Bucket::Active).into()),
        };
        self.events.push(DomainEvent::Order(OrderEvent::Moved { unique_number: unique.clone(), to: target }));
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Location
    // -------------------------------------------------------------------------

    pub fn location(&self) -> Option<&DeliveryLocation> { self.location.as_ref() }

    pub fn set_location(&mut self, location: DeliveryLocation) -> Result<()> {
        local::save_location(self.local_storage.as_ref(), &location)?;
        self.location = Some(location);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // View
    // -------------------------------------------------------------------------

    pub fn snapshot(&self) -> StorefrontView {
        let [active, cancelled, returned] = self.buckets.counts();
        StorefrontView {
            session: self.session.clone(),
            cart: self.cart().entries().to_vec(),
            totals: self.totals(),
            order_counts: OrderCounts { active, cancelled, returned },
            buy_now_product: self.buy_now.clone(),
            selected_address: self.selected_address.and_then(|i| self.saved_addresses.get(i)).cloned(),
            payment_method: self.payment_method,
            location: self.location.clone(),
        }
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { mem::take(&mut self.events) }

    fn require_session(&self) -> Result<UserSession> {
        self.session.clone().ok_or(StorefrontError::NotAuthenticated)
    }

    fn persist(&self) -> Result<()> {
        self.persist_products(self.local_cart.entries())
    }

    fn persist_products(&self, products: &[CartEntry]) -> Result<()> {
        let state = PersistedState {
            products: products.to_vec(),
            user_info: self.session.clone(),
            buy_now_product: self.buy_now.clone(),
            ..PersistedState::default()
        };
        local::save_state(self.local_storage.as_ref(), &state)?;
        Ok(())
    }

    fn push_quantity_changed(&mut self, title: &str) {
        let quantity = self.cart().get(title).map_or(0, |e| e.quantity.get());
        self.events.push(DomainEvent::Cart(CartEvent::QuantityChanged { title: title.to_string(), quantity }));
    }

    fn push_refreshed(&mut self) {
        let [active, cancelled, returned] = self.buckets.counts();
        self.events.push(DomainEvent::Order(OrderEvent::Refreshed { active, cancelled, returned }));
    }
}
