//! Catalog query engine.
//!
//! The product collection is fetched exactly once per process, either through
//! the cross-origin bridge (`?action=catalog` JSONP) or as a direct HTTP GET
//! of a static JSON resource. `Loaded` is terminal for the process lifetime;
//! a failed load is remembered as `LoadFailed` and surfaces a user-visible
//! message, and the next request retries.
//!
//! Remote payloads are duck-typed in the source system; here they are parsed
//! against an explicit schema at the boundary and anything malformed is a
//! transport-class error.

mod filter;

pub use filter::{FilterOptions, FilterState, apply_filter};

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use studyhub_core::{Price, Sku};

use crate::bridge::{Bridge, BridgeError};

/// Errors that can occur while loading the catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Bridged fetch failed (transport, timeout or malformed JSONP).
    #[error("bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// Direct HTTP fetch failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The payload did not match the catalog schema.
    #[error("malformed catalog payload: {0}")]
    Malformed(String),
}

/// A purchasable catalog entry. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub sku: Sku,
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "stringly")]
    pub grade: String,
    #[serde(default, deserialize_with = "stringly")]
    pub subject: String,
    #[serde(default, deserialize_with = "stringly")]
    pub year: String,
    #[serde(default, deserialize_with = "stringly")]
    pub term: String,
    #[serde(default)]
    pub price_cents: Price,
    /// Entries without a marking memo are listed but not purchasable.
    #[serde(default = "default_true")]
    pub has_memo: bool,
}

const fn default_true() -> bool {
    true
}

/// Accept strings, numbers or null for descriptive fields; sheet-backed
/// catalogs are loose about which they emit.
fn stringly<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Boundary schema: the provider replies with either a `products` or a
/// `bundles` key holding the product array.
#[derive(Debug, Deserialize)]
struct CatalogResponse {
    #[serde(default)]
    products: Option<Vec<Product>>,
    #[serde(default)]
    bundles: Option<Vec<Product>>,
}

impl CatalogResponse {
    fn into_products(self) -> Result<Vec<Product>, CatalogError> {
        self.products.or(self.bundles).ok_or_else(|| {
            CatalogError::Malformed("neither 'products' nor 'bundles' present".to_string())
        })
    }
}

/// The loaded catalog: immutable product list plus derived filter options.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    products: Vec<Product>,
    options: FilterOptions,
}

impl Catalog {
    #[must_use]
    pub fn from_products(products: Vec<Product>) -> Self {
        let options = FilterOptions::derive(&products);
        Self { products, options }
    }

    #[must_use]
    pub fn products(&self) -> &[Product] {
        &self.products
    }

    #[must_use]
    pub const fn options(&self) -> &FilterOptions {
        &self.options
    }

    /// Look up a product by sku.
    #[must_use]
    pub fn find(&self, sku: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.sku.as_str() == sku)
    }
}

/// Where the catalog comes from.
#[derive(Debug, Clone)]
pub enum CatalogSource {
    /// JSONP fetch through the bridge.
    Bridged { endpoint: String },
    /// Plain HTTP GET of a static JSON resource.
    Direct { url: String },
}

/// Load state. `Loaded` is terminal for the process lifetime; a failed
/// load is remembered so the retry can be logged as such.
enum CatalogState {
    Unloaded,
    Loaded(Arc<Catalog>),
    LoadFailed,
}

/// Load-once catalog holder.
#[derive(Clone)]
pub struct CatalogService {
    inner: Arc<CatalogServiceInner>,
}

struct CatalogServiceInner {
    bridge: Bridge,
    http: reqwest::Client,
    source: CatalogSource,
    state: RwLock<CatalogState>,
}

impl CatalogService {
    #[must_use]
    pub fn new(bridge: Bridge, source: CatalogSource) -> Self {
        Self {
            inner: Arc::new(CatalogServiceInner {
                bridge,
                http: reqwest::Client::new(),
                source,
                state: RwLock::new(CatalogState::Unloaded),
            }),
        }
    }

    /// The loaded catalog, fetching it on first use.
    ///
    /// Concurrent callers during the initial load are serialized behind the
    /// write lock; all of them observe the single fetch's outcome.
    ///
    /// # Errors
    ///
    /// Returns the load failure; the state is left as `LoadFailed` and a
    /// later call retries.
    #[instrument(skip(self))]
    pub async fn catalog(&self) -> Result<Arc<Catalog>, CatalogError> {
        if let CatalogState::Loaded(catalog) = &*self.inner.state.read().await {
            return Ok(catalog.clone());
        }

        let mut state = self.inner.state.write().await;
        // Another caller may have finished the load while we waited.
        if let CatalogState::Loaded(catalog) = &*state {
            return Ok(catalog.clone());
        }
        if matches!(*state, CatalogState::LoadFailed) {
            info!("retrying catalog load after earlier failure");
        }

        match self.fetch().await {
            Ok(catalog) => {
                let catalog = Arc::new(catalog);
                info!(products = catalog.products().len(), "catalog loaded");
                *state = CatalogState::Loaded(catalog.clone());
                Ok(catalog)
            }
            Err(e) => {
                warn!(error = %e, "catalog load failed");
                *state = CatalogState::LoadFailed;
                Err(e)
            }
        }
    }

    async fn fetch(&self) -> Result<Catalog, CatalogError> {
        let response: CatalogResponse = match &self.inner.source {
            CatalogSource::Bridged { endpoint } => {
                let payload = self.inner.bridge.call(endpoint, &[]).await?;
                serde_json::from_value(payload)
                    .map_err(|e| CatalogError::Malformed(e.to_string()))?
            }
            CatalogSource::Direct { url } => self
                .inner
                .http
                .get(url)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?,
        };

        Ok(Catalog::from_products(response.into_products()?))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_products_key() {
        let response: CatalogResponse = serde_json::from_value(serde_json::json!({
            "products": [
                {"sku": "GR12-MATH-T1", "title": "Maths Pack", "grade": 12,
                 "subject": "Mathematics", "price_cents": 3000}
            ]
        }))
        .unwrap();
        let products = response.into_products().unwrap();
        assert_eq!(products.len(), 1);
        let p = products.first().unwrap();
        assert_eq!(p.grade, "12");
        assert_eq!(p.price_cents.cents(), 3000);
        assert!(p.has_memo, "has_memo defaults to true");
    }

    #[test]
    fn parses_bundles_key() {
        let response: CatalogResponse = serde_json::from_value(serde_json::json!({
            "bundles": [
                {"sku": "B1", "title": "Bundle", "term": "T1", "has_memo": false}
            ]
        }))
        .unwrap();
        let products = response.into_products().unwrap();
        assert!(!products.first().unwrap().has_memo);
    }

    #[test]
    fn rejects_payload_without_collection_key() {
        let response: CatalogResponse =
            serde_json::from_value(serde_json::json!({"status": "ok"})).unwrap();
        assert!(matches!(
            response.into_products(),
            Err(CatalogError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn failed_load_is_retried_on_the_next_request() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        // First request gets a 500, second gets the catalog.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 1024];

            let (mut stream, _) = listener.accept().await.unwrap();
            let _ = stream.read(&mut buf).await;
            stream
                .write_all(b"HTTP/1.1 500 Internal Server Error\r\ncontent-length: 0\r\n\r\n")
                .await
                .unwrap();
            drop(stream);

            let (mut stream, _) = listener.accept().await.unwrap();
            let _ = stream.read(&mut buf).await;
            let body = r#"{"products":[{"sku":"A","title":"Pack","price_cents":1000}]}"#;
            let reply = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(reply.as_bytes()).await.unwrap();
        });

        let service = CatalogService::new(
            Bridge::new(),
            CatalogSource::Direct {
                url: format!("http://{addr}/catalog.json"),
            },
        );

        assert!(service.catalog().await.is_err(), "first load fails");
        let catalog = service.catalog().await.expect("second load succeeds");
        assert_eq!(catalog.products().len(), 1);
    }

    #[test]
    fn find_is_by_exact_sku() {
        let catalog = Catalog::from_products(vec![Product {
            sku: Sku::new("GR12-MATH-T1"),
            title: "Maths Pack".to_string(),
            grade: "12".to_string(),
            subject: "Mathematics".to_string(),
            year: "2024".to_string(),
            term: "1".to_string(),
            price_cents: Price::from_cents(3000),
            has_memo: true,
        }]);
        assert!(catalog.find("GR12-MATH-T1").is_some());
        assert!(catalog.find("gr12-math-t1").is_none());
    }
}
