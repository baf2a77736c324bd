//! Newtype keys for type-safe catalog and payment references.
//!
//! Use the `define_key!` macro to create string-keyed wrappers that prevent
//! accidentally mixing keys from different entity types.

/// Macro to define a type-safe string key wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `Display`
/// - Conversion methods: `new()`, `as_str()`, `into_inner()`
/// - `From<String>` and `From<&str>` implementations
///
/// # Example
///
/// ```rust
/// # use studyhub_core::define_key;
/// define_key!(Sku);
/// define_key!(PaymentId);
///
/// let sku = Sku::new("GR12-MATH-T1");
/// let payment = PaymentId::new(sku.as_str());
///
/// // These are different types, so this won't compile:
/// // let _: Sku = payment;
/// ```
#[macro_export]
macro_rules! define_key {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new key from anything string-like.
            pub fn new(key: impl Into<String>) -> Self {
                Self(key.into())
            }

            /// Get the underlying string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the key and return the underlying `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(key: String) -> Self {
                Self(key)
            }
        }

        impl From<&str> for $name {
            fn from(key: &str) -> Self {
                Self(key.to_owned())
            }
        }
    };
}

// Standard entity keys.
define_key!(Sku);
define_key!(PaymentId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sku_round_trips_through_serde() {
        let sku = Sku::new("GR10-PHSC-2023");
        let json = serde_json::to_string(&sku).expect("serialize");
        assert_eq!(json, "\"GR10-PHSC-2023\"");
        let back: Sku = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, sku);
    }

    #[test]
    fn display_is_transparent() {
        assert_eq!(PaymentId::new("GR12-MATH-T1").to_string(), "GR12-MATH-T1");
    }
}
