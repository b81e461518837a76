//! Local JSON gateway.
//!
//! Exposes the storefront to a presentation layer running in the same browser session. All
//! handlers share one [`Storefront`] behind a mutex, so requests are applied one at a time in
//! arrival order.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;
use crate::catalog::{categories, CatalogClient, ListingFilter, PriceRange, SortOrder};
use crate::domain::aggregates::{
    Address, AddressError, Bucket, CartEntry, CartError, CartTotals, Identity, Order, OrderError, PaymentMethod, Product,
};
use crate::domain::events::DomainEvent;
use crate::domain::value_objects::UniqueNumber;
use crate::local::DeliveryLocation;
use crate::location::{LocationClient, LocationError};
use crate::storefront::{Storefront, StorefrontView};
use crate::StorefrontError;

#[derive(Clone)]
pub struct AppState {
    pub storefront: Arc<Mutex<Storefront>>,
    pub catalog: CatalogClient,
    pub locations: LocationClient,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(json!({"status": "healthy", "service": "storefront-client"})) }))
        .route("/api/v1/products", get(list_products))
        .route("/api/v1/products/:title", get(get_product))
        .route("/api/v1/categories", get(list_categories))
        .route("/api/v1/search", get(search))
        .route("/api/v1/location", get(get_location))
        .route("/api/v1/location/nearby", post(locate_nearby))
        .route("/api/v1/location/:pincode", get(locate_pincode))
        .route("/api/v1/session", post(sign_in).delete(sign_out))
        .route("/api/v1/state", get(view))
        .route("/api/v1/cart", get(get_cart).post(add_to_cart))
        .route("/api/v1/cart/:title", put(update_quantity).delete(remove_from_cart))
        .route("/api/v1/buy-now", post(buy_now).delete(reset_buy_now))
        .route("/api/v1/addresses", get(list_addresses).post(save_address))
        .route("/api/v1/checkout/address", put(select_address))
        .route("/api/v1/checkout/payment", put(select_payment))
        .route("/api/v1/checkout", post(checkout))
        .route("/api/v1/orders", get(list_orders))
        .route("/api/v1/orders/refresh", post(refresh_orders))
        .route("/api/v1/orders/:unique/cancel", post(cancel_order))
        .route("/api/v1/orders/:unique/return", post(return_order))
        .route("/api/v1/events", get(drain_events))
        .with_state(state)
}

// =============================================================================
// Errors
// =============================================================================

pub struct ApiError(StorefrontError);

impl<E: Into<StorefrontError>> From<E> for ApiError {
    fn from(error: E) -> Self { Self(error.into()) }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            StorefrontError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            StorefrontError::Address(_) => StatusCode::UNPROCESSABLE_ENTITY,
            StorefrontError::AddressNotFound(_) | StorefrontError::ProductNotFound(_) => StatusCode::NOT_FOUND,
            StorefrontError::Cart(CartError::ItemNotFound(_)) => StatusCode::NOT_FOUND,
            StorefrontError::Order(e) => match e {
                OrderError::NotFound(_) => StatusCode::NOT_FOUND,
                OrderError::NotActive(_) | OrderError::InvalidTarget(_) => StatusCode::CONFLICT,
                OrderError::NoItems | OrderError::NoAddress | OrderError::NoPaymentMethod => StatusCode::UNPROCESSABLE_ENTITY,
            },
            StorefrontError::Location(e) => match e {
                LocationError::Pincode(_) => StatusCode::UNPROCESSABLE_ENTITY,
                LocationError::NotFound => StatusCode::NOT_FOUND,
                LocationError::Disabled => StatusCode::SERVICE_UNAVAILABLE,
                LocationError::Http(_) | LocationError::Status(_) => StatusCode::BAD_GATEWAY,
            },
            StorefrontError::Store(e) if e.is_conflict() => StatusCode::CONFLICT,
            StorefrontError::Store(_) | StorefrontError::Catalog(_) => StatusCode::BAD_GATEWAY,
            StorefrontError::LocalStorage(_) | StorefrontError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = match &self.0 {
            StorefrontError::Address(AddressError::Invalid(fields)) => json!({ "error": self.0.to_string(), "fields": fields }),
            _ => json!({ "error": self.0.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// Catalog
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ProductParams {
    pub category: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_rating: Option<f64>,
    pub sort: Option<SortOrder>,
}

impl ProductParams {
    fn filter(&self) -> ListingFilter {
        let bound = |v: Option<f64>, fallback: Decimal| v.and_then(|v| Decimal::try_from(v).ok()).unwrap_or(fallback);
        let price_range = (self.min_price.is_some() || self.max_price.is_some())
            .then(|| PriceRange { min: bound(self.min_price, Decimal::ZERO), max: bound(self.max_price, Decimal::MAX) });
        ListingFilter { price_range, min_rating: self.min_rating, sort: self.sort.unwrap_or_default() }
    }
}

async fn list_products(State(s): State<AppState>, Query(p): Query<ProductParams>) -> ApiResult<Json<Vec<Product>>> {
    let products = match p.category.as_deref() {
        Some(category) => s.catalog.by_category(category).await?,
        None => s.catalog.all_products().await?,
    };
    Ok(Json(p.filter().apply(&products)))
}

async fn get_product(State(s): State<AppState>, Path(title): Path<String>) -> ApiResult<Json<Product>> {
    s.catalog.by_title(&title).await?.map(Json).ok_or(ApiError(StorefrontError::ProductNotFound(title)))
}

async fn list_categories(State(s): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(categories(&s.catalog.all_products().await?)))
}

#[derive(Debug, Deserialize)] pub struct SearchParams { pub q: String }

async fn search(State(s): State<AppState>, Query(p): Query<SearchParams>) -> ApiResult<Json<Vec<Product>>> {
    Ok(Json(s.catalog.search(&p.q).await?))
}

// =============================================================================
// Location
// =============================================================================

async fn get_location(State(s): State<AppState>) -> Json<Option<DeliveryLocation>> {
    Json(s.storefront.lock().await.location().cloned())
}

async fn locate_pincode(State(s): State<AppState>, Path(pincode): Path<String>) -> ApiResult<Json<DeliveryLocation>> {
    let location = s.locations.lookup_pincode(&pincode).await?;
    s.storefront.lock().await.set_location(location.clone())?;
    Ok(Json(location))
}

#[derive(Debug, Deserialize)] pub struct Coordinates { pub lat: f64, pub lng: f64 }

async fn locate_nearby(State(s): State<AppState>, Json(c): Json<Coordinates>) -> ApiResult<Json<DeliveryLocation>> {
    let location = s.locations.nearby(c.lat, c.lng).await?;
    s.storefront.lock().await.set_location(location.clone())?;
    Ok(Json(location))
}

// =============================================================================
// Session
// =============================================================================

async fn sign_in(State(s): State<AppState>, Json(identity): Json<Identity>) -> ApiResult<Json<StorefrontView>> {
    let mut shop = s.storefront.lock().await;
    shop.sign_in(&identity).await?;
    Ok(Json(shop.snapshot()))
}

async fn sign_out(State(s): State<AppState>) -> ApiResult<StatusCode> {
    s.storefront.lock().await.sign_out()?;
    Ok(StatusCode::NO_CONTENT)
}

async fn view(State(s): State<AppState>) -> Json<StorefrontView> {
    Json(s.storefront.lock().await.snapshot())
}

async fn drain_events(State(s): State<AppState>) -> Json<Vec<DomainEvent>> {
    Json(s.storefront.lock().await.take_events())
}

// =============================================================================
// Cart
// =============================================================================

#[derive(Debug, Serialize)] pub struct CartView { pub items: Vec<CartEntry>, pub totals: CartTotals }

fn cart_view(shop: &Storefront) -> Json<CartView> {
    Json(CartView { items: shop.cart().entries().to_vec(), totals: shop.totals() })
}

async fn get_cart(State(s): State<AppState>) -> Json<CartView> {
    cart_view(&*s.storefront.lock().await)
}

async fn add_to_cart(State(s): State<AppState>, Json(entry): Json<CartEntry>) -> ApiResult<Json<CartView>> {
    let mut shop = s.storefront.lock().await;
    shop.add_to_cart(entry).await?;
    Ok(cart_view(&shop))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum QuantityUpdate { Set { quantity: i64 }, Increase, Decrease }

async fn update_quantity(State(s): State<AppState>, Path(title): Path<String>, Json(update): Json<QuantityUpdate>) -> ApiResult<Json<CartView>> {
    let mut shop = s.storefront.lock().await;
    match update {
        QuantityUpdate::Set { quantity } => shop.set_quantity(&title, quantity).await?,
        QuantityUpdate::Increase => shop.increase_quantity(&title).await?,
        QuantityUpdate::Decrease => shop.decrease_quantity(&title).await?,
    }
    Ok(cart_view(&shop))
}

async fn remove_from_cart(State(s): State<AppState>, Path(title): Path<String>) -> ApiResult<Json<CartView>> {
    let mut shop = s.storefront.lock().await;
    shop.remove_from_cart(&title).await?;
    Ok(cart_view(&shop))
}

// =============================================================================
// Checkout
// =============================================================================

async fn buy_now(State(s): State<AppState>, Json(entry): Json<CartEntry>) -> ApiResult<Json<StorefrontView>> {
    let mut shop = s.storefront.lock().await;
    shop.buy_now(entry)?;
    Ok(Json(shop.snapshot()))
}

async fn reset_buy_now(State(s): State<AppState>) -> ApiResult<StatusCode> {
    s.storefront.lock().await.reset_buy_now()?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_addresses(State(s): State<AppState>) -> ApiResult<Json<Vec<Address>>> {
    let shop = s.storefront.lock().await;
    if shop.session().is_none() { return Err(ApiError(StorefrontError::NotAuthenticated)); }
    Ok(Json(shop.addresses().to_vec()))
}

async fn save_address(State(s): State<AppState>, Json(address): Json<Address>) -> ApiResult<(StatusCode, Json<Vec<Address>>)> {
    let mut shop = s.storefront.lock().await;
    shop.save_address(&address).await?;
    Ok((StatusCode::CREATED, Json(shop.addresses().to_vec())))
}

#[derive(Debug, Deserialize)] pub struct AddressChoice { pub index: usize }
#[derive(Debug, Deserialize)] pub struct PaymentChoice { pub method: PaymentMethod }

async fn select_address(State(s): State<AppState>, Json(c): Json<AddressChoice>) -> ApiResult<Json<StorefrontView>> {
    let mut shop = s.storefront.lock().await;
    shop.select_address(c.index)?;
    Ok(Json(shop.snapshot()))
}

async fn select_payment(State(s): State<AppState>, Json(c): Json<PaymentChoice>) -> Json<StorefrontView> {
    let mut shop = s.storefront.lock().await;
    shop.select_payment(c.method);
    Json(shop.snapshot())
}

async fn checkout(State(s): State<AppState>) -> ApiResult<(StatusCode, Json<Vec<Order>>)> {
    let placed = s.storefront.lock().await.checkout().await?;
    Ok((StatusCode::CREATED, Json(placed)))
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Debug, Serialize)] pub struct OrdersView { pub active: Vec<Order>, pub cancelled: Vec<Order>, pub returned: Vec<Order> }

fn orders_view(shop: &Storefront) -> ApiResult<Json<OrdersView>> {
    if shop.session().is_none() { return Err(ApiError(StorefrontError::NotAuthenticated)); }
    Ok(Json(OrdersView {
        active: shop.orders(Bucket::Active),
        cancelled: shop.orders(Bucket::Cancelled),
        returned: shop.orders(Bucket::Returned),
    }))
}

async fn list_orders(State(s): State<AppState>) -> ApiResult<Json<OrdersView>> {
    orders_view(&*s.storefront.lock().await)
}

async fn refresh_orders(State(s): State<AppState>) -> ApiResult<Json<OrdersView>> {
    let mut shop = s.storefront.lock().await;
    shop.refresh_orders().await?;
    orders_view(&shop)
}

async fn cancel_order(State(s): State<AppState>, Path(unique): Path<String>) -> ApiResult<Json<OrdersView>> {
    let mut shop = s.storefront.lock().await;
    shop.cancel_order(&UniqueNumber::from(unique)).await?;
    orders_view(&shop)
}

async fn return_order(State(s): State<AppState>, Path(unique): Path<String>) -> ApiResult<Json<OrdersView>> {
    let mut shop = s.storefront.lock().await;
    shop.return_order(&UniqueNumber::from(unique)).await?;
    orders_view(&shop)
}
