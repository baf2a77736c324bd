//! HTTP route handlers for the storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health        - Liveness check
//! GET  /site          - Brand, currency and contact link for page chrome
//!
//! # Catalog
//! GET  /catalog       - Filtered product list + filter options (JSON)
//!
//! # Cart
//! GET  /cart          - Cart view (items, total, count)
//! POST /cart/add      - Add one unit of a sku (returns badge)
//! POST /cart/update   - Step quantity at an index by ±1
//! POST /cart/remove   - Remove the line at an index
//! GET  /cart/count    - Cart count badge
//!
//! # Checkout
//! POST /checkout      - Validate, sign, return the payment handoff page
//! ```

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod site;

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/add", post(cart::add))
        .route("/update", post(cart::update))
        .route("/remove", post(cart::remove))
        .route("/count", get(cart::count))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/site", get(site::info))
        .route("/catalog", get(catalog::index))
        .nest("/cart", cart_routes())
        .route("/checkout", post(checkout::create))
}
