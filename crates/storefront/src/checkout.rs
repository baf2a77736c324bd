//! Checkout orchestration: validate, sign, hand off.
//!
//! One checkout attempt walks validate -> request signature -> redirect;
//! every failure path ends the attempt with the cart untouched. The
//! orchestrator keeps a per-visitor in-flight set so a double submit from
//! the same visitor while their signature request is outstanding is
//! rejected instead of opening a parallel attempt. Distinct visitors never
//! contend with each other.
//!
//! Cardinality policy: exactly one distinct sku per checkout. The fulfillment
//! backend resolves a single product per payment notification, which is also
//! why `m_payment_id` and `item_name` both carry the sku.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use studyhub_core::{Email, EmailError, PaymentId, Price};

use crate::bridge::{Bridge, BridgeError};
use crate::cart::Cart;
use crate::config::{PayfastConfig, StorefrontConfig};

/// Minimum order total.
pub const MIN_ORDER: Price = Price::from_cents(5000);

/// Errors that end a checkout attempt. All of them return the orchestrator
/// to idle and leave the cart as it was.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// This visitor already has a signature request outstanding.
    #[error("a checkout is already in progress")]
    Busy,

    /// Terms of sale were not acknowledged.
    #[error("please accept the terms & conditions to continue")]
    TermsNotAccepted,

    /// Nothing to charge.
    #[error("your cart is empty")]
    EmptyCart,

    /// More than one distinct sku in the cart.
    #[error("please checkout one item at a time")]
    OneItemAtATime,

    /// Total below the minimum order threshold.
    #[error("minimum order is R50")]
    BelowMinimum,

    /// Buyer email failed validation.
    #[error("invalid email address: {0}")]
    Email(#[from] EmailError),

    /// The signing request could not be completed.
    #[error("signing request failed: {0}")]
    Bridge(#[from] BridgeError),

    /// The signer replied `ok: false`.
    #[error("the signing authority rejected the request")]
    SignatureRejected,

    /// The signer's reply did not match the expected schema.
    #[error("malformed signing reply: {0}")]
    MalformedReply(String),
}

/// Buyer input accompanying a checkout submission.
#[derive(Debug, Default, Deserialize)]
pub struct CheckoutForm {
    #[serde(default)]
    pub email: String,
    /// Optional contact number in local or international format.
    #[serde(default)]
    pub phone: String,
    /// Terms-of-sale acknowledgement.
    #[serde(default)]
    pub agree: bool,
}

/// The derived per-attempt request sent to the signing authority. Never
/// stored; rebuilt fresh on every attempt.
#[derive(Debug)]
struct CheckoutRequest {
    amount: String,
    item_name: String,
    payment_id: PaymentId,
    email_address: Email,
    name_first: String,
    name_last: String,
    cell_number: Option<String>,
    return_url: String,
    cancel_url: String,
    notify_url: String,
}

impl CheckoutRequest {
    fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("amount", self.amount.clone()),
            ("item_name", self.item_name.clone()),
            ("m_payment_id", self.payment_id.to_string()),
            ("email_address", self.email_address.to_string()),
            ("name_first", self.name_first.clone()),
            ("name_last", self.name_last.clone()),
            ("return_url", self.return_url.clone()),
            ("cancel_url", self.cancel_url.clone()),
            ("notify_url", self.notify_url.clone()),
        ];
        if let Some(cell) = &self.cell_number {
            params.push(("cell_number", cell.clone()));
        }
        params
    }
}

/// The signing authority's reply schema.
#[derive(Debug, Deserialize)]
struct SignedPayload {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    params: BTreeMap<String, String>,
    #[serde(default)]
    signature: Option<String>,
}

/// Everything needed for the irreversible redirect handoff: the process
/// endpoint and the full hidden-field set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentHandoff {
    pub process_url: String,
    pub fields: Vec<(String, String)>,
}

impl PaymentHandoff {
    /// Render the auto-submitting hidden POST form.
    ///
    /// Submission navigates away to the payment processor; no storefront
    /// code runs afterwards in that browsing context.
    #[must_use]
    pub fn form_html(&self) -> String {
        let mut html = String::from(
            "<!doctype html>\n<html>\n<head><meta charset=\"utf-8\">\
             <title>Redirecting to PayFast…</title></head>\n\
             <body onload=\"document.forms[0].submit()\">\n",
        );
        html.push_str(&format!(
            "<form method=\"post\" action=\"{}\">\n",
            escape_attr(&self.process_url)
        ));
        for (name, value) in &self.fields {
            html.push_str(&format!(
                "  <input type=\"hidden\" name=\"{}\" value=\"{}\">\n",
                escape_attr(name),
                escape_attr(value)
            ));
        }
        html.push_str(
            "  <noscript><button type=\"submit\">Continue to payment</button></noscript>\n\
             </form>\n</body>\n</html>\n",
        );
        html
    }
}

/// The checkout state machine.
#[derive(Clone)]
pub struct CheckoutOrchestrator {
    inner: Arc<OrchestratorInner>,
}

struct OrchestratorInner {
    bridge: Bridge,
    payfast: PayfastConfig,
    sign_endpoint: String,
    brand: String,
    /// Visitors with a checkout attempt outstanding, keyed by session id.
    /// At most one attempt per visitor.
    in_flight: Mutex<HashSet<String>>,
}

/// Releases the visitor's in-flight slot when the attempt ends, whichever
/// way it ends.
struct InFlight<'a> {
    registry: &'a Mutex<HashSet<String>>,
    visitor: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        lock(self.registry).remove(&self.visitor);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CheckoutOrchestrator {
    #[must_use]
    pub fn new(bridge: Bridge, config: &StorefrontConfig) -> Self {
        Self {
            inner: Arc::new(OrchestratorInner {
                bridge,
                payfast: config.payfast.clone(),
                sign_endpoint: config.catalog.sign_endpoint(),
                brand: config.brand.clone(),
                in_flight: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Run one checkout attempt end to end for one visitor.
    ///
    /// `visitor` is the session id; it scopes the double-submit guard so
    /// concurrent checkouts from different visitors proceed independently.
    ///
    /// # Errors
    ///
    /// [`CheckoutError::Busy`] when this visitor already has an attempt
    /// outstanding, a validation variant when a precondition fails (no
    /// network call is made), and bridge/signature variants when the signing
    /// leg fails. The cart is never mutated here.
    #[instrument(skip_all)]
    pub async fn begin(
        &self,
        visitor: &str,
        cart: &Cart,
        form: &CheckoutForm,
    ) -> Result<PaymentHandoff, CheckoutError> {
        let _in_flight = self.acquire(visitor)?;

        let request = self.validate(cart, form)?;
        info!(payment_id = %request.payment_id, amount = %request.amount, "requesting signature");

        let payload = self.request_signature(&request).await?;
        Ok(self.handoff(payload))
    }

    /// Mark the visitor in flight, or reject their re-entry.
    fn acquire(&self, visitor: &str) -> Result<InFlight<'_>, CheckoutError> {
        let mut in_flight = lock(&self.inner.in_flight);
        if !in_flight.insert(visitor.to_string()) {
            return Err(CheckoutError::Busy);
        }
        Ok(InFlight {
            registry: &self.inner.in_flight,
            visitor: visitor.to_string(),
        })
    }

    /// Precondition chain, checked in order, short-circuiting.
    fn validate(&self, cart: &Cart, form: &CheckoutForm) -> Result<CheckoutRequest, CheckoutError> {
        if !form.agree {
            return Err(CheckoutError::TermsNotAccepted);
        }
        let item = cart.items().first().ok_or(CheckoutError::EmptyCart)?;
        if cart.len() != 1 {
            return Err(CheckoutError::OneItemAtATime);
        }
        let total = cart.total();
        if total < MIN_ORDER {
            return Err(CheckoutError::BelowMinimum);
        }
        let email_address = Email::parse(&form.email)?;

        let payfast = &self.inner.payfast;
        Ok(CheckoutRequest {
            amount: total.amount_string(),
            // The fulfillment backend resolves the sku from item_name.
            item_name: item.sku.to_string(),
            payment_id: PaymentId::new(item.sku.as_str()),
            email_address,
            name_first: "Buyer".to_string(),
            name_last: self.inner.brand.clone(),
            cell_number: normalize_dial(&form.phone, &payfast.dial_prefix),
            return_url: payfast.return_url.clone(),
            cancel_url: payfast.cancel_url.clone(),
            notify_url: payfast.notify_url.clone(),
        })
    }

    async fn request_signature(
        &self,
        request: &CheckoutRequest,
    ) -> Result<SignedPayload, CheckoutError> {
        let params = request.to_params();
        let payload = self
            .inner
            .bridge
            .call(&self.inner.sign_endpoint, &params)
            .await?;

        let payload: SignedPayload = serde_json::from_value(payload)
            .map_err(|e| CheckoutError::MalformedReply(e.to_string()))?;

        if !payload.ok {
            warn!("signer replied ok=false");
            return Err(CheckoutError::SignatureRejected);
        }
        if payload.signature.is_none() {
            return Err(CheckoutError::MalformedReply(
                "ok reply without signature".to_string(),
            ));
        }
        Ok(payload)
    }

    /// Merge signer params and signature into the final field set.
    ///
    /// Locally configured merchant credentials only fill gaps; the signer's
    /// params are authoritative since the signature covers them.
    fn handoff(&self, payload: SignedPayload) -> PaymentHandoff {
        let payfast = &self.inner.payfast;
        let mut merged = BTreeMap::new();
        if let Some(merchant_id) = &payfast.merchant_id {
            merged.insert("merchant_id".to_string(), merchant_id.clone());
        }
        if let Some(merchant_key) = payfast.merchant_key_value() {
            merged.insert("merchant_key".to_string(), merchant_key);
        }
        merged.extend(payload.params);

        let mut fields: Vec<(String, String)> = merged.into_iter().collect();
        if let Some(signature) = payload.signature {
            fields.push(("signature".to_string(), signature));
        }

        PaymentHandoff {
            process_url: payfast.mode.process_url().to_string(),
            fields,
        }
    }
}

/// Normalize a contact number to international dialing form: strip
/// everything but digits, replace a leading local 0 with the configured
/// prefix. Empty input is no number.
fn normalize_dial(raw: &str, prefix: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    Some(match digits.strip_prefix('0') {
        Some(rest) => format!("{prefix}{rest}"),
        None => digits,
    })
}

/// Minimal HTML attribute escaping for the handoff form.
fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::{CatalogConfig, PayfastMode};
    use studyhub_core::Sku;

    fn test_config() -> StorefrontConfig {
        StorefrontConfig {
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            base_url: "http://localhost:3000".to_string(),
            brand: "StudyHub".to_string(),
            currency: "ZAR".to_string(),
            whatsapp_number: None,
            catalog: CatalogConfig {
                webapp_base: "http://127.0.0.1:1/exec".to_string(),
                static_url: None,
            },
            payfast: PayfastConfig {
                mode: PayfastMode::Sandbox,
                merchant_id: None,
                merchant_key: None,
                return_url: "http://localhost:3000/cart?status=success".to_string(),
                cancel_url: "http://localhost:3000/cart?status=cancel".to_string(),
                notify_url: "http://127.0.0.1:1/exec".to_string(),
                dial_prefix: "27".to_string(),
            },
            sentry_dsn: None,
        }
    }

    fn orchestrator() -> CheckoutOrchestrator {
        CheckoutOrchestrator::new(Bridge::new(), &test_config())
    }

    fn single_item_cart(price_cents: i64, qty: i64) -> Cart {
        let mut cart = Cart::default();
        cart.add(
            Sku::new("M1"),
            "Maths Pack".to_string(),
            Price::from_cents(price_cents),
        );
        for _ in 1..qty {
            cart.adjust_qty(0, 1);
        }
        cart
    }

    fn agreed_form() -> CheckoutForm {
        CheckoutForm {
            email: "buyer@example.com".to_string(),
            phone: String::new(),
            agree: true,
        }
    }

    #[test]
    fn validation_order_short_circuits() {
        let orch = orchestrator();

        // Terms come first even with an empty cart.
        let err = orch
            .validate(&Cart::default(), &CheckoutForm::default())
            .unwrap_err();
        assert!(matches!(err, CheckoutError::TermsNotAccepted));

        let err = orch.validate(&Cart::default(), &agreed_form()).unwrap_err();
        assert!(matches!(err, CheckoutError::EmptyCart));

        let mut two_skus = single_item_cart(6000, 1);
        two_skus.add(Sku::new("S1"), "Science".to_string(), Price::from_cents(6000));
        let err = orch.validate(&two_skus, &agreed_form()).unwrap_err();
        assert!(matches!(err, CheckoutError::OneItemAtATime));

        let err = orch
            .validate(&single_item_cart(2000, 2), &agreed_form())
            .unwrap_err();
        assert!(matches!(err, CheckoutError::BelowMinimum));

        let bad_email = CheckoutForm {
            email: "nope".to_string(),
            ..agreed_form()
        };
        let err = orch
            .validate(&single_item_cart(3000, 2), &bad_email)
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Email(_)));
    }

    #[test]
    fn request_uses_sku_for_payment_id_and_amount_from_cents() {
        let orch = orchestrator();
        // 2 x 3000c = 6000c = R60.00, above the R50 minimum.
        let request = orch
            .validate(&single_item_cart(3000, 2), &agreed_form())
            .unwrap();

        assert_eq!(request.amount, "60.00");
        assert_eq!(request.item_name, "M1");
        assert_eq!(request.payment_id.as_str(), "M1");
        assert_eq!(request.name_first, "Buyer");
        assert_eq!(request.name_last, "StudyHub");
    }

    #[test]
    fn minimum_is_checked_against_the_line_total() {
        let orch = orchestrator();
        // Exactly R50 passes.
        assert!(orch.validate(&single_item_cart(5000, 1), &agreed_form()).is_ok());
        assert!(orch.validate(&single_item_cart(2500, 2), &agreed_form()).is_ok());
    }

    #[test]
    fn dial_normalization() {
        assert_eq!(
            normalize_dial("071 681 6131", "27"),
            Some("27716816131".to_string())
        );
        assert_eq!(
            normalize_dial("+27 71 681 6131", "27"),
            Some("27716816131".to_string())
        );
        assert_eq!(normalize_dial("  ", "27"), None);
        assert_eq!(normalize_dial("no digits", "27"), None);
    }

    #[test]
    fn rejected_signature_reports_and_keeps_no_fields() {
        let payload: SignedPayload =
            serde_json::from_value(serde_json::json!({"ok": false})).unwrap();
        assert!(!payload.ok);
    }

    #[test]
    fn handoff_merges_params_and_signature_last() {
        let orch = orchestrator();
        let payload: SignedPayload = serde_json::from_value(serde_json::json!({
            "ok": true,
            "params": {
                "merchant_id": "10000100",
                "amount": "60.00",
                "item_name": "M1"
            },
            "signature": "f1a2b3"
        }))
        .unwrap();

        let handoff = orch.handoff(payload);
        assert_eq!(
            handoff.process_url,
            "https://sandbox.payfast.co.za/eng/process"
        );
        let last = handoff.fields.last().unwrap();
        assert_eq!(last, &("signature".to_string(), "f1a2b3".to_string()));
        assert!(
            handoff
                .fields
                .iter()
                .any(|(k, v)| k == "merchant_id" && v == "10000100")
        );
    }

    #[test]
    fn form_html_escapes_values_and_autosubmits() {
        let handoff = PaymentHandoff {
            process_url: "https://sandbox.payfast.co.za/eng/process".to_string(),
            fields: vec![("item_name".to_string(), "Maths \"Pack\" <1>".to_string())],
        };
        let html = handoff.form_html();
        assert!(html.contains("method=\"post\""));
        assert!(html.contains("document.forms[0].submit()"));
        assert!(html.contains("Maths &quot;Pack&quot; &lt;1&gt;"));
        assert!(!html.contains("<1>"));
    }

    #[tokio::test]
    async fn second_attempt_from_the_same_visitor_is_busy() {
        let orch = orchestrator();
        let _guard = orch.acquire("visitor-a").unwrap();
        let err = orch
            .begin("visitor-a", &single_item_cart(3000, 2), &agreed_form())
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Busy));
    }

    #[test]
    fn distinct_visitors_do_not_contend() {
        let orch = orchestrator();
        let _a = orch.acquire("visitor-a").unwrap();
        assert!(
            orch.acquire("visitor-b").is_ok(),
            "another visitor's attempt must not be blocked"
        );
    }

    #[tokio::test]
    async fn visitor_slot_is_released_after_failure() {
        let orch = orchestrator();
        // Validation failure: no network touched, slot released.
        let _ = orch.begin("visitor-a", &Cart::default(), &agreed_form()).await;
        assert!(orch.acquire("visitor-a").is_ok(), "visitor is idle again");
    }
}
