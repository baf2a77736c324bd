//! Cross-origin bridge to the catalog/signing web app.
//!
//! The remote web app speaks JSONP: every request carries a generated
//! `callback` token and the reply is the token invoked over a JSON payload,
//! `cb_xyz({...});`. The bridge owns the request/response correlation table:
//! a token is registered before dispatch and deregistered exactly once on
//! every outcome (reply, transport failure or timeout), before the caller's
//! continuation resumes. A reply wrapped in any callback name other than the
//! registered one is rejected.
//!
//! The bridge performs no retries; retry policy belongs to the caller.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::Rng;
use rand::distr::Alphanumeric;
use thiserror::Error;
use url::Url;

/// Fixed reply deadline for one bridged call.
const BRIDGE_TIMEOUT: Duration = Duration::from_secs(15);

/// Length of the random part of a correlation token.
const TOKEN_LENGTH: usize = 12;

/// Errors produced by one bridged call.
///
/// Timeouts and malformed replies are both surfaced to the user as transport
/// failures; the distinction is kept for logging.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// No reply arrived within the deadline.
    #[error("no reply from the remote endpoint within {}s", BRIDGE_TIMEOUT.as_secs())]
    Timeout,

    /// The HTTP request itself failed.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The endpoint URL could not be parsed or extended.
    #[error("invalid endpoint URL: {0}")]
    Endpoint(#[from] url::ParseError),

    /// The reply did not invoke the registered callback with valid JSON.
    #[error("malformed reply: {0}")]
    MalformedReply(String),
}

/// JSONP request bridge with an owned correlation-token registry.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    client: reqwest::Client,
    timeout: Duration,
    pending: Mutex<HashSet<String>>,
}

impl Bridge {
    /// Create a bridge with the standard 15-second deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeout(BRIDGE_TIMEOUT)
    }

    /// Create a bridge with a custom deadline (tests use short ones).
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                client: reqwest::Client::new(),
                timeout,
                pending: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Perform one bridged request and await its single reply.
    ///
    /// `params` are appended to the endpoint's query string, followed by the
    /// generated `callback` token.
    ///
    /// # Errors
    ///
    /// Exactly one of: the parsed JSON payload on a correlated reply,
    /// [`BridgeError::Transport`] on request failure,
    /// [`BridgeError::Timeout`] when the deadline elapses, or
    /// [`BridgeError::MalformedReply`] when the body is not the registered
    /// callback wrapping valid JSON.
    pub async fn call(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<serde_json::Value, BridgeError> {
        let token = self.register();
        let result = self.dispatch(endpoint, params, &token).await;
        // Single deregistration point covers all three outcomes.
        self.pending().remove(&token);
        result
    }

    async fn dispatch(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
        token: &str,
    ) -> Result<serde_json::Value, BridgeError> {
        let mut url = Url::parse(endpoint)?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in params {
                query.append_pair(key, value);
            }
            query.append_pair("callback", token);
        }

        tracing::debug!(%token, host = url.host_str().unwrap_or(""), "bridge request");

        let request = async {
            let response = self.inner.client.get(url).send().await?;
            let response = response.error_for_status()?;
            response.text().await
        };

        let body = tokio::time::timeout(self.inner.timeout, request)
            .await
            .map_err(|_| BridgeError::Timeout)??;

        parse_jsonp(&body, token)
    }

    /// Register a fresh correlation token in the pending table.
    fn register(&self) -> String {
        let mut pending = self.pending();
        loop {
            let token = callback_token();
            if pending.insert(token.clone()) {
                return token;
            }
        }
    }

    fn pending(&self) -> MutexGuard<'_, HashSet<String>> {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn pending_count(&self) -> usize {
        self.pending().len()
    }
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate a correlation token, `cb_` plus random alphanumerics.
fn callback_token() -> String {
    let suffix: String = rand::rng()
        .sample_iter(Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect();
    format!("cb_{}", suffix.to_lowercase())
}

/// Parse a JSONP body, requiring the registered callback name.
fn parse_jsonp(body: &str, token: &str) -> Result<serde_json::Value, BridgeError> {
    let rest = body
        .trim()
        .strip_prefix(token)
        .ok_or_else(|| {
            BridgeError::MalformedReply("reply does not invoke the registered callback".to_string())
        })?
        .trim_start();

    let rest = rest.strip_prefix('(').ok_or_else(|| {
        BridgeError::MalformedReply("reply is not a callback invocation".to_string())
    })?;

    let rest = rest.trim_end();
    let rest = rest.strip_suffix(';').unwrap_or(rest).trim_end();
    let inner = rest.strip_suffix(')').ok_or_else(|| {
        BridgeError::MalformedReply("unterminated callback invocation".to_string())
    })?;

    serde_json::from_str(inner).map_err(|e| BridgeError::MalformedReply(e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_unique_and_prefixed() {
        let a = callback_token();
        let b = callback_token();
        assert!(a.starts_with("cb_"));
        assert_eq!(a.len(), 3 + TOKEN_LENGTH);
        assert_ne!(a, b);
    }

    #[test]
    fn parses_wrapped_payload() {
        let value = parse_jsonp("cb_abc({\"ok\":true});", "cb_abc").unwrap();
        assert_eq!(value["ok"], serde_json::json!(true));
    }

    #[test]
    fn tolerates_whitespace_and_missing_semicolon() {
        let value = parse_jsonp("  cb_abc ( {\"n\": 3} ) ", "cb_abc").unwrap();
        assert_eq!(value["n"], serde_json::json!(3));
    }

    #[test]
    fn rejects_foreign_callback_name() {
        let err = parse_jsonp("cb_other({\"ok\":true});", "cb_abc").unwrap_err();
        assert!(matches!(err, BridgeError::MalformedReply(_)));
    }

    #[test]
    fn rejects_bare_json() {
        let err = parse_jsonp("{\"ok\":true}", "cb_abc").unwrap_err();
        assert!(matches!(err, BridgeError::MalformedReply(_)));
    }

    #[test]
    fn rejects_invalid_inner_json() {
        let err = parse_jsonp("cb_abc(not json)", "cb_abc").unwrap_err();
        assert!(matches!(err, BridgeError::MalformedReply(_)));
    }

    #[tokio::test]
    async fn times_out_and_cleans_up_when_no_reply_arrives() {
        // A listener that accepts the connection but never responds.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            // Hold the socket open past the bridge deadline.
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });

        let bridge = Bridge::with_timeout(Duration::from_millis(200));
        let result = bridge.call(&format!("http://{addr}/exec"), &[]).await;

        assert!(matches!(result, Err(BridgeError::Timeout)));
        assert_eq!(bridge.pending_count(), 0, "token must be deregistered");
        server.abort();
    }

    #[tokio::test]
    async fn transport_error_cleans_up() {
        // Nothing listens on this port (bound then dropped).
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let bridge = Bridge::with_timeout(Duration::from_secs(2));
        let result = bridge.call(&format!("http://{addr}/exec"), &[]).await;

        assert!(matches!(result, Err(BridgeError::Transport(_))));
        assert_eq!(bridge.pending_count(), 0);
    }
}
