//! HTTP route handlers, one module per service.

pub mod health;
pub mod metrics;
pub mod orders;
pub mod payment;
pub mod stock;
pub mod users;
