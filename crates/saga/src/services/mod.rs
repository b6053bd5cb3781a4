//! Capabilities the saga reaches in other services, with co-located and
//! HTTP implementations.

pub mod catalog;
pub mod credit;

pub use catalog::{CatalogError, HttpCatalog, PriceLookup, StoreCatalog};
pub use credit::{CreditError, HttpUserCredit, StoreUserCredit, UserCredit};
