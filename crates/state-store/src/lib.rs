//! Persistence for the redi-shop services.
//!
//! One [`StateStore`] capability with two interchangeable backends: an
//! in-memory key-value store and a PostgreSQL store. Both provide the
//! conditional "subtract only if the result stays non-negative" updates the
//! checkout saga relies on.

pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStateStore;
pub use model::{Order, Payment, PaymentStatus, StockItem, User};
pub use postgres::PostgresStateStore;
pub use store::{OrderStore, PaymentStore, StateStore, StockStore, UserStore};
