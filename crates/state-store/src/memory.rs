use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{ItemId, OrderId, UserId};
use tokio::sync::RwLock;

use crate::{
    Order, Payment, PaymentStatus, Result, StockItem, StoreError, User,
    store::{OrderStore, PaymentStore, StockStore, UserStore},
};

/// In-memory key-value state store.
///
/// Each record kind lives in its own map. Read-modify-write operations run
/// under that map's write lock, which serialises every update to a key and
/// gives the conditional subtractions their no-lost-update guarantee.
#[derive(Clone, Default)]
pub struct InMemoryStateStore {
    users: Arc<RwLock<HashMap<UserId, User>>>,
    stock: Arc<RwLock<HashMap<ItemId, StockItem>>>,
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
    payments: Arc<RwLock<HashMap<OrderId, Payment>>>,
}

impl InMemoryStateStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a user. Intended for seeding.
    pub async fn put_user(&self, user: User) {
        self.users.write().await.insert(user.id.clone(), user);
    }

    /// Inserts or replaces a stock item. Intended for seeding.
    pub async fn put_item(&self, item: StockItem) {
        self.stock.write().await.insert(item.id.clone(), item);
    }

    /// Inserts or replaces an order. Intended for seeding.
    pub async fn put_order(&self, order: Order) {
        self.orders.write().await.insert(order.id.clone(), order);
    }

    /// Returns the number of payment records.
    pub async fn payment_count(&self) -> usize {
        self.payments.read().await.len()
    }
}

#[async_trait]
impl UserStore for InMemoryStateStore {
    async fn create_user(&self) -> Result<User> {
        let user = User {
            id: UserId::generate(),
            credit: 0,
        };
        self.users.write().await.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn find_user(&self, user_id: &UserId) -> Result<User> {
        self.users
            .read()
            .await
            .get(user_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("user", user_id))
    }

    async fn remove_user(&self, user_id: &UserId) -> Result<()> {
        self.users
            .write()
            .await
            .remove(user_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("user", user_id))
    }

    async fn subtract_credit(&self, user_id: &UserId, amount: i64) -> Result<User> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(user_id)
            .ok_or_else(|| StoreError::not_found("user", user_id))?;

        let remaining = user
            .credit
            .checked_sub(amount)
            .ok_or_else(|| StoreError::out_of_range("user", user_id))?;
        if remaining < 0 {
            return Err(StoreError::InsufficientCredit {
                user_id: user_id.to_string(),
                available: user.credit,
                requested: amount,
            });
        }

        user.credit = remaining;
        Ok(user.clone())
    }

    async fn add_credit(&self, user_id: &UserId, amount: i64) -> Result<User> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(user_id)
            .ok_or_else(|| StoreError::not_found("user", user_id))?;
        user.credit = user
            .credit
            .checked_add(amount)
            .ok_or_else(|| StoreError::out_of_range("user", user_id))?;
        Ok(user.clone())
    }
}

#[async_trait]
impl StockStore for InMemoryStateStore {
    async fn create_item(&self, price: i64) -> Result<StockItem> {
        let item = StockItem {
            id: ItemId::generate(),
            price,
            quantity: 0,
        };
        self.stock.write().await.insert(item.id.clone(), item.clone());
        Ok(item)
    }

    async fn find_item(&self, item_id: &ItemId) -> Result<StockItem> {
        self.stock
            .read()
            .await
            .get(item_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("stock item", item_id))
    }

    async fn subtract_stock(&self, item_id: &ItemId, amount: i64) -> Result<StockItem> {
        let mut stock = self.stock.write().await;
        let item = stock
            .get_mut(item_id)
            .ok_or_else(|| StoreError::not_found("stock item", item_id))?;

        let remaining = item
            .quantity
            .checked_sub(amount)
            .ok_or_else(|| StoreError::out_of_range("stock item", item_id))?;
        if remaining < 0 {
            return Err(StoreError::InsufficientStock {
                item_id: item_id.to_string(),
                available: item.quantity,
                requested: amount,
            });
        }

        item.quantity = remaining;
        Ok(item.clone())
    }

    async fn add_stock(&self, item_id: &ItemId, amount: i64) -> Result<StockItem> {
        let mut stock = self.stock.write().await;
        let item = stock
            .get_mut(item_id)
            .ok_or_else(|| StoreError::not_found("stock item", item_id))?;
        item.quantity = item
            .quantity
            .checked_add(amount)
            .ok_or_else(|| StoreError::out_of_range("stock item", item_id))?;
        Ok(item.clone())
    }
}

#[async_trait]
impl OrderStore for InMemoryStateStore {
    async fn create_order(&self, user_id: &UserId) -> Result<Order> {
        let order = Order::new(OrderId::generate(), user_id.clone());
        self.orders
            .write()
            .await
            .insert(order.id.clone(), order.clone());
        Ok(order)
    }

    async fn find_order(&self, order_id: &OrderId) -> Result<Order> {
        self.orders
            .read()
            .await
            .get(order_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("order", order_id))
    }

    async fn remove_order(&self, order_id: &OrderId) -> Result<()> {
        self.orders
            .write()
            .await
            .remove(order_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("order", order_id))
    }

    async fn add_item(&self, order_id: &OrderId, item_id: ItemId, price: i64) -> Result<Order> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| StoreError::not_found("order", order_id))?;
        order.add_item(item_id, price)?;
        Ok(order.clone())
    }

    async fn remove_item(&self, order_id: &OrderId, item_id: &ItemId) -> Result<Order> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| StoreError::not_found("order", order_id))?;
        order.remove_item(item_id);
        Ok(order.clone())
    }

    async fn mark_paid(&self, order_id: &OrderId) -> Result<()> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| StoreError::not_found("order", order_id))?;
        order.paid = true;
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for InMemoryStateStore {
    async fn find_payment(&self, order_id: &OrderId) -> Result<Option<Payment>> {
        Ok(self.payments.read().await.get(order_id).cloned())
    }

    async fn claim_payment(&self, order_id: &OrderId, amount: i64) -> Result<Option<Payment>> {
        let mut payments = self.payments.write().await;
        if payments.get(order_id).is_some_and(Payment::is_paid) {
            return Err(StoreError::InvalidTransition {
                order_id: order_id.to_string(),
                reason: "payment already paid".to_string(),
            });
        }

        let payment = Payment {
            order_id: order_id.clone(),
            amount,
            status: PaymentStatus::Paid,
        };
        Ok(payments.insert(order_id.clone(), payment))
    }

    async fn release_payment(&self, order_id: &OrderId, previous: Option<Payment>) -> Result<()> {
        let mut payments = self.payments.write().await;
        match previous {
            Some(payment) => payments.insert(order_id.clone(), payment),
            None => payments.remove(order_id),
        };
        Ok(())
    }

    async fn cancel_payment(&self, order_id: &OrderId) -> Result<Payment> {
        let mut payments = self.payments.write().await;
        let payment = payments
            .get_mut(order_id)
            .ok_or_else(|| StoreError::not_found("payment", order_id))?;

        if payment.status == PaymentStatus::Cancelled {
            return Err(StoreError::InvalidTransition {
                order_id: order_id.to_string(),
                reason: "payment already cancelled".to_string(),
            });
        }

        payment.status = PaymentStatus::Cancelled;
        Ok(payment.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn stocked_item(store: &InMemoryStateStore, quantity: i64) -> StockItem {
        let item = store.create_item(10).await.unwrap();
        store.add_stock(&item.id, quantity).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_find_user() {
        let store = InMemoryStateStore::new();
        let user = store.create_user().await.unwrap();
        assert_eq!(user.credit, 0);

        let found = store.find_user(&user.id).await.unwrap();
        assert_eq!(found, user);
    }

    #[tokio::test]
    async fn test_missing_records_are_not_found() {
        let store = InMemoryStateStore::new();
        assert!(store.find_user(&UserId::new("x")).await.unwrap_err().is_not_found());
        assert!(store.find_item(&ItemId::new("x")).await.unwrap_err().is_not_found());
        assert!(store.find_order(&OrderId::new("x")).await.unwrap_err().is_not_found());
        assert!(store.remove_user(&UserId::new("x")).await.unwrap_err().is_not_found());
        assert!(store.find_payment(&OrderId::new("x")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_credit_cannot_go_negative() {
        let store = InMemoryStateStore::new();
        let user = store.create_user().await.unwrap();
        store.add_credit(&user.id, 20).await.unwrap();

        let after = store.subtract_credit(&user.id, 15).await.unwrap();
        assert_eq!(after.credit, 5);

        let err = store.subtract_credit(&user.id, 6).await.unwrap_err();
        assert!(matches!(err, StoreError::InsufficientCredit { available: 5, .. }));
        assert!(err.is_rule_violation());
        assert_eq!(store.find_user(&user.id).await.unwrap().credit, 5);
    }

    #[tokio::test]
    async fn test_stock_cannot_go_negative() {
        let store = InMemoryStateStore::new();
        let item = stocked_item(&store, 1).await;

        store.subtract_stock(&item.id, 1).await.unwrap();
        let err = store.subtract_stock(&item.id, 1).await.unwrap_err();
        assert!(matches!(err, StoreError::InsufficientStock { .. }));
        assert_eq!(store.find_item(&item.id).await.unwrap().quantity, 0);
    }

    #[tokio::test]
    async fn test_concurrent_subtractions_succeed_exactly_min_times() {
        let store = InMemoryStateStore::new();
        let item = stocked_item(&store, 5).await;

        let mut handles = Vec::new();
        for _ in 0..12 {
            let store = store.clone();
            let id = item.id.clone();
            handles.push(tokio::spawn(
                async move { store.subtract_stock(&id, 1).await },
            ));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                succeeded += 1;
            }
        }

        assert_eq!(succeeded, 5);
        assert_eq!(store.find_item(&item.id).await.unwrap().quantity, 0);
    }

    #[tokio::test]
    async fn test_order_items_keep_cost_consistent() {
        let store = InMemoryStateStore::new();
        let order = store.create_order(&UserId::new("u1")).await.unwrap();

        let order = store
            .add_item(&order.id, ItemId::new("i1"), 10)
            .await
            .unwrap();
        let order = store
            .add_item(&order.id, ItemId::new("i2"), 5)
            .await
            .unwrap();
        assert_eq!(order.cost, 15);

        let order = store
            .remove_item(&order.id, &ItemId::new("i1"))
            .await
            .unwrap();
        assert_eq!(order.cost, 5);
        assert_eq!(Some(order.cost), order.items.total());

        let stored = store.find_order(&order.id).await.unwrap();
        assert_eq!(stored, order);
    }

    #[tokio::test]
    async fn test_mark_paid() {
        let store = InMemoryStateStore::new();
        let order = store.create_order(&UserId::new("u1")).await.unwrap();
        store.mark_paid(&order.id).await.unwrap();
        assert!(store.find_order(&order.id).await.unwrap().paid);
    }

    #[tokio::test]
    async fn test_payment_lifecycle() {
        let store = InMemoryStateStore::new();
        let order_id = OrderId::new("o1");

        assert_eq!(store.claim_payment(&order_id, 15).await.unwrap(), None);
        assert_eq!(store.payment_count().await, 1);

        let cancelled = store.cancel_payment(&order_id).await.unwrap();
        assert_eq!(cancelled.status, PaymentStatus::Cancelled);
        assert_eq!(cancelled.amount, 15);

        let err = store.cancel_payment(&order_id).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_additions_that_overflow_are_rejected() {
        let store = InMemoryStateStore::new();
        let item = stocked_item(&store, i64::MAX).await;

        let err = store.add_stock(&item.id, 1).await.unwrap_err();
        assert!(matches!(err, StoreError::OutOfRange { .. }));
        assert!(err.is_rule_violation());
        assert_eq!(store.find_item(&item.id).await.unwrap().quantity, i64::MAX);

        let user = store.create_user().await.unwrap();
        store.add_credit(&user.id, i64::MAX).await.unwrap();
        let err = store.add_credit(&user.id, 1).await.unwrap_err();
        assert!(err.is_rule_violation());
        assert_eq!(store.find_user(&user.id).await.unwrap().credit, i64::MAX);

        let order = store.create_order(&user.id).await.unwrap();
        store
            .add_item(&order.id, ItemId::new("i1"), i64::MAX)
            .await
            .unwrap();
        let err = store
            .add_item(&order.id, ItemId::new("i2"), 1)
            .await
            .unwrap_err();
        assert!(err.is_rule_violation());
        assert_eq!(store.find_order(&order.id).await.unwrap().cost, i64::MAX);
    }

    #[tokio::test]
    async fn test_subtraction_that_underflows_is_rejected() {
        let store = InMemoryStateStore::new();
        let user = store.create_user().await.unwrap();
        store.add_credit(&user.id, 5).await.unwrap();

        // A negative amount reaching the store must not wrap past i64::MAX.
        let err = store.subtract_credit(&user.id, i64::MIN).await.unwrap_err();
        assert!(matches!(err, StoreError::OutOfRange { .. }));
        assert_eq!(store.find_user(&user.id).await.unwrap().credit, 5);
    }

    #[tokio::test]
    async fn test_payment_claim_is_exclusive() {
        let store = InMemoryStateStore::new();
        let order_id = OrderId::new("o1");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let order_id = order_id.clone();
            handles.push(tokio::spawn(async move {
                store.claim_payment(&order_id, 10).await
            }));
        }

        let mut claimed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => claimed += 1,
                Err(e) => assert!(matches!(e, StoreError::InvalidTransition { .. })),
            }
        }
        assert_eq!(claimed, 1);
        assert_eq!(store.payment_count().await, 1);
    }

    #[tokio::test]
    async fn test_release_restores_previous_payment() {
        let store = InMemoryStateStore::new();
        let order_id = OrderId::new("o1");

        let previous = store.claim_payment(&order_id, 10).await.unwrap();
        store.release_payment(&order_id, previous).await.unwrap();
        assert!(store.find_payment(&order_id).await.unwrap().is_none());

        store.claim_payment(&order_id, 10).await.unwrap();
        let cancelled = store.cancel_payment(&order_id).await.unwrap();

        let previous = store.claim_payment(&order_id, 20).await.unwrap();
        assert_eq!(previous, Some(cancelled.clone()));
        store.release_payment(&order_id, previous).await.unwrap();
        assert_eq!(store.find_payment(&order_id).await.unwrap(), Some(cancelled));
    }

    #[tokio::test]
    async fn test_cancel_without_payment_is_not_found() {
        let store = InMemoryStateStore::new();
        let err = store.cancel_payment(&OrderId::new("o1")).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
