//! Unified error handling with Sentry integration.
//!
//! Route handlers return `Result<T, AppError>`. Upstream failures (catalog
//! provider, signing authority) are captured to Sentry and answered with a
//! generic retry message; validation failures carry their own user-facing
//! text. No error here is fatal - every failure path leaves the storefront
//! interactive.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::catalog::CatalogError;
use crate::checkout::CheckoutError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Catalog load failed.
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Checkout attempt failed.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether this error reflects an upstream/internal fault worth
    /// capturing, as opposed to user input.
    const fn is_server_fault(&self) -> bool {
        match self {
            Self::Catalog(_) | Self::Internal(_) => true,
            Self::Checkout(err) => matches!(
                err,
                CheckoutError::Bridge(_)
                    | CheckoutError::SignatureRejected
                    | CheckoutError::MalformedReply(_)
            ),
            Self::NotFound(_) | Self::BadRequest(_) => false,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.is_server_fault() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let status = match &self {
            Self::Catalog(_) => StatusCode::BAD_GATEWAY,
            Self::Checkout(err) => match err {
                CheckoutError::Busy => StatusCode::CONFLICT,
                CheckoutError::TermsNotAccepted
                | CheckoutError::EmptyCart
                | CheckoutError::OneItemAtATime
                | CheckoutError::BelowMinimum
                | CheckoutError::Email(_) => StatusCode::UNPROCESSABLE_ENTITY,
                CheckoutError::Bridge(_)
                | CheckoutError::SignatureRejected
                | CheckoutError::MalformedReply(_) => StatusCode::BAD_GATEWAY,
            },
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Upstream detail stays out of client responses
        let message = match &self {
            Self::Catalog(_) => "Could not load the catalog. Please try again.".to_string(),
            Self::Checkout(err) => match err {
                CheckoutError::Bridge(_)
                | CheckoutError::SignatureRejected
                | CheckoutError::MalformedReply(_) => {
                    "Could not start PayFast checkout. Please try again.".to_string()
                }
                other => other.to_string(),
            },
            Self::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        (status, message).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;
