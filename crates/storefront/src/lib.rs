//! StudyHub storefront library.
//!
//! Serves the storefront as a library so the router can be exercised from
//! integration tests.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod bridge;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
