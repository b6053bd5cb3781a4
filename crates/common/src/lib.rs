//! Shared identifiers and wire encodings used by every redi-shop service.

pub mod items;
pub mod types;

pub use items::{ItemListError, ItemPrices};
pub use types::{ItemId, OrderId, UserId};
