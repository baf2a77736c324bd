//! Application state shared across handlers.

use std::sync::Arc;

use crate::bridge::Bridge;
use crate::catalog::{CatalogService, CatalogSource};
use crate::checkout::CheckoutOrchestrator;
use crate::config::StorefrontConfig;

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`; holds the configuration, the load-once
/// catalog service and the checkout orchestrator, which share one bridge.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    catalog: CatalogService,
    checkout: CheckoutOrchestrator,
}

impl AppState {
    /// Create the application state from configuration.
    #[must_use]
    pub fn new(config: StorefrontConfig) -> Self {
        let bridge = Bridge::new();

        let source = config.catalog.static_url.as_ref().map_or_else(
            || CatalogSource::Bridged {
                endpoint: config.catalog.catalog_endpoint(),
            },
            |url| CatalogSource::Direct { url: url.clone() },
        );

        let catalog = CatalogService::new(bridge.clone(), source);
        let checkout = CheckoutOrchestrator::new(bridge, &config);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                catalog,
                checkout,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the catalog service.
    #[must_use]
    pub fn catalog(&self) -> &CatalogService {
        &self.inner.catalog
    }

    /// Get a reference to the checkout orchestrator.
    #[must_use]
    pub fn checkout(&self) -> &CheckoutOrchestrator {
        &self.inner.checkout
    }
}
