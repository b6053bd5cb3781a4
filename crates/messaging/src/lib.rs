//! Saga messaging for the redi-shop services.
//!
//! - [`Envelope`]: the `instance#token#kind#payload` frame and its codec
//! - [`Topic`]: `ORDER.<instance>`, `PAYMENT` and `STOCK`
//! - [`MessageBus`]: pub/sub transport, with in-process and Redis backends

pub mod bus;
pub mod envelope;
pub mod error;
pub mod memory;
pub mod redis_pubsub;

pub use bus::{MessageBus, Subscription};
pub use envelope::{Envelope, MessageKind, OrderSnapshot, Outcome, Topic};
pub use error::{BusError, EnvelopeError, Result};
pub use memory::InMemoryBus;
pub use redis_pubsub::RedisBus;
