//! Choreographed checkout saga.
//!
//! A checkout moves through the services by message, with no central
//! coordinator:
//! 1. [`OrderGateway`] publishes `PAY` to `PAYMENT` and waits on its own
//!    outcome topic
//! 2. [`PaymentWorker`] debits the user's credit and publishes `STOCK`
//! 3. [`StockWorker`] reserves the items and reports the outcome
//!
//! When the stock step fails it restores the items it reserved and sends
//! `PAY_REVERT` so the payment step refunds the debit.

pub mod error;
pub mod gateway;
pub mod payment;
pub mod registry;
pub mod services;
pub mod state;
pub mod stock;

pub use error::{ErrorClass, Result, SagaError};
pub use gateway::OrderGateway;
pub use payment::PaymentWorker;
pub use registry::{CorrelationRegistry, SagaContext};
pub use services::{
    CatalogError, CreditError, HttpCatalog, HttpUserCredit, PriceLookup, StoreCatalog,
    StoreUserCredit, UserCredit,
};
pub use state::SagaState;
pub use stock::StockWorker;
