//! Cart route handlers.
//!
//! All mutation is read-modify-write within one handler invocation; nothing
//! awaits between the session read and the corresponding write, so a
//! mutation can never interleave with itself mid-operation. Stale indexes
//! (a row kept on screen after another tab removed it) are guarded by
//! re-reading the current cart immediately before mutating.

use axum::{Form, Json, extract::State};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use crate::cart::{self, Badge, Cart};
use crate::error::{AppError, Result};
use crate::state::AppState;

/// Cart line display data.
#[derive(Debug, Serialize)]
pub struct LineItemView {
    pub sku: String,
    pub title: String,
    pub qty: i64,
    pub each: String,
    pub line_total: String,
}

/// Cart display data.
#[derive(Debug, Serialize)]
pub struct CartView {
    pub items: Vec<LineItemView>,
    pub total: String,
    pub total_cents: i64,
    pub count: i64,
}

impl From<&Cart> for CartView {
    fn from(cart: &Cart) -> Self {
        Self {
            items: cart
                .items()
                .iter()
                .map(|item| LineItemView {
                    sku: item.sku.to_string(),
                    title: item.title.clone(),
                    qty: item.qty,
                    each: item.price_cents.display_rands(),
                    line_total: item.line_total().display_rands(),
                })
                .collect(),
            total: cart.total().display_rands(),
            total_cents: cart.total().cents(),
            count: cart.item_count(),
        }
    }
}

/// Add to cart form data.
#[derive(Debug, Deserialize)]
pub struct AddToCartForm {
    pub sku: String,
}

/// Update cart form data. `sku` is an optional echo of the row the client
/// believes it is adjusting, cross-checked against the current cart.
#[derive(Debug, Deserialize)]
pub struct UpdateCartForm {
    pub index: usize,
    pub delta: i64,
    #[serde(default)]
    pub sku: Option<String>,
}

/// Remove from cart form data.
#[derive(Debug, Deserialize)]
pub struct RemoveFromCartForm {
    pub index: usize,
}

/// Display the cart.
#[instrument(skip(session))]
pub async fn show(session: Session) -> Json<CartView> {
    let cart = cart::read_cart(&session).await;
    Json(CartView::from(&cart))
}

/// Add one unit of a catalog sku to the cart.
///
/// The product is resolved from the loaded catalog; unknown skus are 404
/// and entries without a marking memo are refused.
#[instrument(skip(state, session))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<AddToCartForm>,
) -> Result<Json<Badge>> {
    let catalog = state.catalog().catalog().await?;
    let product = catalog
        .find(&form.sku)
        .ok_or_else(|| AppError::NotFound(format!("sku {}", form.sku)))?;
    if !product.has_memo {
        return Err(AppError::BadRequest(
            "This pack is missing its memo and cannot be ordered yet.".to_string(),
        ));
    }

    let mut cart = cart::read_cart(&session).await;
    cart.add(
        product.sku.clone(),
        product.title.clone(),
        product.price_cents,
    );
    cart::write_cart(&session, &cart).await;

    Ok(Json(Badge::for_cart(&cart)))
}

/// Step a line's quantity by ±1 (decrements floor at 1).
#[instrument(skip(session))]
pub async fn update(session: Session, Form(form): Form<UpdateCartForm>) -> Result<Json<CartView>> {
    if form.delta != 1 && form.delta != -1 {
        return Err(AppError::BadRequest("delta must be 1 or -1".to_string()));
    }

    // Re-read right before mutating; the client's index may be stale.
    let mut cart = cart::read_cart(&session).await;
    let stale = form.sku.as_deref().is_some_and(|sku| {
        cart.items()
            .get(form.index)
            .is_none_or(|item| item.sku.as_str() != sku)
    });

    if !stale && cart.adjust_qty(form.index, form.delta) {
        cart::write_cart(&session, &cart).await;
    }

    Ok(Json(CartView::from(&cart)))
}

/// Remove the line at an index; out-of-range indexes are a no-op refresh.
#[instrument(skip(session))]
pub async fn remove(session: Session, Form(form): Form<RemoveFromCartForm>) -> Json<CartView> {
    let mut cart = cart::read_cart(&session).await;
    if cart.remove(form.index).is_some() {
        cart::write_cart(&session, &cart).await;
    }
    Json(CartView::from(&cart))
}

/// Cart count badge.
#[instrument(skip(session))]
pub async fn count(session: Session) -> Json<Badge> {
    let cart = cart::read_cart(&session).await;
    Json(Badge::for_cart(&cart))
}
