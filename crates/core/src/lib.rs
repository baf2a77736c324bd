//! StudyHub Core - Shared types library.
//!
//! Common types used by the storefront:
//!
//! - [`types`] - Newtype wrappers for catalog keys, minor-unit prices and
//!   buyer email addresses
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients. Currency
//! amounts are carried as integer minor units (cents); conversion to a
//! decimal major-unit string happens only at a formatting boundary.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
