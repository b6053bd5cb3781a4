//! Item price lookup used when adding items to an order.

use async_trait::async_trait;
use common::ItemId;
use reqwest::StatusCode;
use serde::Deserialize;
use state_store::StockStore;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("unknown item: {0}")]
    UnknownItem(ItemId),

    #[error("stock service unavailable: {0}")]
    Unavailable(String),
}

/// Looks up the current unit price of an item.
#[async_trait]
pub trait PriceLookup: Send + Sync {
    async fn price(&self, item_id: &ItemId) -> Result<i64, CatalogError>;
}

/// Price lookup backed by a co-located state store.
#[derive(Debug, Clone)]
pub struct StoreCatalog<S> {
    store: S,
}

impl<S: StockStore> StoreCatalog<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: StockStore> PriceLookup for StoreCatalog<S> {
    async fn price(&self, item_id: &ItemId) -> Result<i64, CatalogError> {
        match self.store.find_item(item_id).await {
            Ok(item) => Ok(item.price),
            Err(e) if e.is_not_found() => Err(CatalogError::UnknownItem(item_id.clone())),
            Err(e) => Err(CatalogError::Unavailable(e.to_string())),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FindItemResponse {
    price: i64,
}

/// Price lookup that calls `GET /stock/find/{item_id}` on the stock service.
#[derive(Debug, Clone)]
pub struct HttpCatalog {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCatalog {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PriceLookup for HttpCatalog {
    async fn price(&self, item_id: &ItemId) -> Result<i64, CatalogError> {
        let url = format!("{}/stock/find/{item_id}", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CatalogError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::OK => {
                let body: FindItemResponse = response
                    .json()
                    .await
                    .map_err(|e| CatalogError::Unavailable(e.to_string()))?;
                Ok(body.price)
            }
            StatusCode::NOT_FOUND => Err(CatalogError::UnknownItem(item_id.clone())),
            status => Err(CatalogError::Unavailable(format!("{url} returned {status}"))),
        }
    }
}
