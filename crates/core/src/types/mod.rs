//! Core type definitions.

pub mod email;
pub mod id;
pub mod price;

pub use email::{Email, EmailError};
pub use id::{PaymentId, Sku};
pub use price::Price;
