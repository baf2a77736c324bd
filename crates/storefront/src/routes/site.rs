//! Site metadata for page chrome: brand, currency and contact link.

use axum::{Json, extract::State};
use serde::Serialize;

use crate::state::AppState;

/// Static per-deployment display data.
#[derive(Debug, Serialize)]
pub struct SiteInfo {
    pub brand: String,
    pub currency: String,
    /// `wa.me` contact link when a WhatsApp number is configured.
    pub whatsapp_link: Option<String>,
}

pub async fn info(State(state): State<AppState>) -> Json<SiteInfo> {
    let config = state.config();
    Json(SiteInfo {
        brand: config.brand.clone(),
        currency: config.currency.clone(),
        whatsapp_link: config
            .whatsapp_number
            .as_ref()
            .map(|number| format!("https://wa.me/{number}")),
    })
}
