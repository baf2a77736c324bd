//! Checkout route handler.

use axum::{Form, extract::State, response::Html};
use tower_sessions::Session;
use tracing::instrument;

use crate::cart;
use crate::checkout::CheckoutForm;
use crate::error::Result;
use crate::state::AppState;

/// Run a checkout attempt.
///
/// The session id scopes the orchestrator's double-submit guard to this
/// visitor. On success the response is the payment-handoff page: a hidden
/// form targeting the PayFast process endpoint that submits itself on load.
/// On any failure the orchestrator reports through
/// [`crate::error::AppError`] and the cart is left untouched.
#[instrument(skip(state, session, form))]
pub async fn create(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<CheckoutForm>,
) -> Result<Html<String>> {
    let cart = cart::read_cart(&session).await;
    // Reading the cart loads the session, so an existing visitor has an id
    // here; a fresh cookie-less request fails EmptyCart validation anyway.
    let visitor = session.id().map(|id| id.to_string()).unwrap_or_default();
    let handoff = state.checkout().begin(&visitor, &cart, &form).await?;
    Ok(Html(handoff.form_html()))
}
