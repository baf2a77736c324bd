//! Persistent cart store.
//!
//! The cart is one serialized value in the visitor's session: a single
//! canonical key-value slot, plus legacy keys that are read (never written)
//! for carts persisted by earlier site versions. Reads never fail - absence
//! or corruption of the slot yields an empty cart, because the storefront
//! must stay usable even when the stored blob is garbage.
//!
//! Every mutating route re-renders the badge (total item count, hidden at
//! zero) from the written cart.

use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use studyhub_core::{Price, Sku};

/// Canonical session key holding the serialized cart.
pub const CART_KEY: &str = "cart";

/// Legacy keys from earlier site versions, read-only, first valid value
/// wins.
pub const LEGACY_CART_KEYS: &[&str] = &["studyhub_cart"];

/// One product/quantity pair in the cart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineItem {
    pub sku: Sku,
    pub title: String,
    pub price_cents: Price,
    #[serde(default = "default_qty")]
    pub qty: i64,
}

const fn default_qty() -> i64 {
    1
}

impl LineItem {
    /// `price * qty` in exact integer cents.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.price_cents * self.qty
    }
}

/// Ordered line-item sequence; insertion order preserved, at most one item
/// per sku.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Cart {
    items: Vec<LineItem>,
}

impl Cart {
    #[must_use]
    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Add one unit of a sku: existing line increments, new sku appends with
    /// quantity 1.
    pub fn add(&mut self, sku: Sku, title: String, price_cents: Price) {
        if let Some(item) = self.items.iter_mut().find(|i| i.sku == sku) {
            item.qty += 1;
        } else {
            self.items.push(LineItem {
                sku,
                title,
                price_cents,
                qty: 1,
            });
        }
    }

    /// Step the quantity at `index` by `delta`, flooring at 1. Out-of-range
    /// indexes (stale after a concurrent removal) are a no-op.
    ///
    /// Returns whether a line was changed.
    pub fn adjust_qty(&mut self, index: usize, delta: i64) -> bool {
        match self.items.get_mut(index) {
            Some(item) => {
                item.qty = (item.qty + delta).max(1);
                true
            }
            None => false,
        }
    }

    /// Remove the line at `index`; out-of-range is a no-op.
    pub fn remove(&mut self, index: usize) -> Option<LineItem> {
        (index < self.items.len()).then(|| self.items.remove(index))
    }

    /// Exact integer-cents total over all lines.
    #[must_use]
    pub fn total(&self) -> Price {
        self.items.iter().map(LineItem::line_total).sum()
    }

    /// Sum of quantities, for the badge.
    #[must_use]
    pub fn item_count(&self) -> i64 {
        self.items.iter().map(|i| i.qty).sum()
    }
}

/// Badge state for the cart-count indicator.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Badge {
    pub count: i64,
    pub visible: bool,
}

impl Badge {
    #[must_use]
    pub fn for_cart(cart: &Cart) -> Self {
        let count = cart.item_count();
        Self {
            count,
            visible: count > 0,
        }
    }
}

// =============================================================================
// Session-backed store
// =============================================================================

/// Read the cart from the session: canonical key first, then legacy keys.
///
/// Never fails; a missing or undecodable slot is an empty cart.
pub async fn read_cart(session: &Session) -> Cart {
    for key in std::iter::once(CART_KEY).chain(LEGACY_CART_KEYS.iter().copied()) {
        match session.get::<Cart>(key).await {
            Ok(Some(cart)) => return cart,
            Ok(None) => {}
            Err(e) => {
                tracing::debug!(key, error = %e, "unreadable cart slot, trying next");
            }
        }
    }
    Cart::default()
}

/// Write the cart to the canonical key. Write failures are logged and
/// swallowed; the next read falls back to an empty cart.
pub async fn write_cart(session: &Session, cart: &Cart) {
    if let Err(e) = session.insert(CART_KEY, cart).await {
        tracing::warn!(error = %e, "failed to persist cart");
    }
}
