//! Persisted records.

use common::{ItemId, ItemPrices, OrderId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// A user account and its credit balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub credit: i64,
}

/// A stock item. The price is fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockItem {
    pub id: ItemId,
    pub price: i64,
    pub quantity: i64,
}

/// An order and the items placed in it.
///
/// `cost` always equals the sum of the recorded item prices; the item
/// mutators below are the only way the mapping changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub items: ItemPrices,
    pub cost: i64,
    pub paid: bool,
}

impl Order {
    /// Creates an empty, unpaid order.
    pub fn new(id: OrderId, user_id: UserId) -> Self {
        Self {
            id,
            user_id,
            items: ItemPrices::new(),
            cost: 0,
            paid: false,
        }
    }

    /// Records `item` at `price`. Re-adding an item replaces its price.
    ///
    /// Fails with `OutOfRange`, leaving the order untouched, when the new
    /// cost would overflow.
    pub fn add_item(&mut self, item: ItemId, price: i64) -> Result<(), StoreError> {
        let mut items = self.items.clone();
        items.insert(item, price);
        let cost = items
            .total()
            .ok_or_else(|| StoreError::out_of_range("order", &self.id))?;

        self.items = items;
        self.cost = cost;
        Ok(())
    }

    /// Removes `item`, returning the price it was recorded at.
    pub fn remove_item(&mut self, item: &ItemId) -> Option<i64> {
        let price = self.items.remove(item)?;
        self.cost -= price;
        Some(price)
    }
}

/// Lifecycle of a payment. `Paid` may move to `Cancelled`, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Paid,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Paid => "paid",
            PaymentStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paid" => Ok(PaymentStatus::Paid),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            other => Err(StoreError::Corrupt(format!(
                "unknown payment status {other:?}"
            ))),
        }
    }
}

/// The payment recorded for an order. An order without a payment record is
/// in the "unset" state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub order_id: OrderId,
    pub amount: i64,
    pub status: PaymentStatus,
}

impl Payment {
    pub fn is_paid(&self) -> bool {
        self.status == PaymentStatus::Paid
    }
}
