use async_trait::async_trait;
use common::{ItemId, OrderId, UserId};

use crate::{Order, Payment, Result, StockItem, User};

/// Persistence for user accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Creates a user with zero credit.
    async fn create_user(&self) -> Result<User>;

    /// Loads a user, failing with `NotFound` if absent.
    async fn find_user(&self, user_id: &UserId) -> Result<User>;

    /// Deletes a user, failing with `NotFound` if absent.
    async fn remove_user(&self, user_id: &UserId) -> Result<()>;

    /// Subtracts `amount` from the user's credit.
    ///
    /// The balance is checked before the update while holding the record, so
    /// concurrent callers cannot drive it below zero. Fails with
    /// `InsufficientCredit` when the balance is too low.
    async fn subtract_credit(&self, user_id: &UserId, amount: i64) -> Result<User>;

    /// Adds `amount` to the user's credit.
    async fn add_credit(&self, user_id: &UserId, amount: i64) -> Result<User>;
}

/// Persistence for stock items.
#[async_trait]
pub trait StockStore: Send + Sync {
    /// Creates an item at `price` with no stock.
    async fn create_item(&self, price: i64) -> Result<StockItem>;

    /// Loads an item, failing with `NotFound` if absent.
    async fn find_item(&self, item_id: &ItemId) -> Result<StockItem>;

    /// Subtracts `amount` units, only if the result stays non-negative.
    ///
    /// Concurrent subtractions on the same item never lose updates: with an
    /// initial quantity `S` and `K` concurrent single-unit subtractions,
    /// exactly `min(S, K)` succeed.
    async fn subtract_stock(&self, item_id: &ItemId, amount: i64) -> Result<StockItem>;

    /// Adds `amount` units.
    async fn add_stock(&self, item_id: &ItemId, amount: i64) -> Result<StockItem>;
}

/// Persistence for orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Creates an empty order for `user_id`.
    async fn create_order(&self, user_id: &UserId) -> Result<Order>;

    /// Loads an order, failing with `NotFound` if absent.
    async fn find_order(&self, order_id: &OrderId) -> Result<Order>;

    /// Deletes an order, failing with `NotFound` if absent.
    async fn remove_order(&self, order_id: &OrderId) -> Result<()>;

    /// Records `item_id` at `price` and recomputes the order cost atomically.
    async fn add_item(&self, order_id: &OrderId, item_id: ItemId, price: i64) -> Result<Order>;

    /// Removes `item_id` and recomputes the order cost atomically. Removing an
    /// item that is not in the order is a no-op.
    async fn remove_item(&self, order_id: &OrderId, item_id: &ItemId) -> Result<Order>;

    /// Marks the order as paid.
    async fn mark_paid(&self, order_id: &OrderId) -> Result<()>;
}

/// Persistence for payments.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Loads the payment for an order, `None` if the order was never paid.
    async fn find_payment(&self, order_id: &OrderId) -> Result<Option<Payment>>;

    /// Atomically claims the order's payment as paid with `amount`.
    ///
    /// At most one concurrent caller wins; the rest fail with
    /// `InvalidTransition` while a paid payment exists. Returns the record the
    /// claim replaced, which [`release_payment`](Self::release_payment)
    /// restores.
    async fn claim_payment(&self, order_id: &OrderId, amount: i64) -> Result<Option<Payment>>;

    /// Undoes a claim, putting back `previous` or removing the record when
    /// there was none.
    async fn release_payment(&self, order_id: &OrderId, previous: Option<Payment>) -> Result<()>;

    /// Moves the order's payment from paid to cancelled.
    ///
    /// Fails with `NotFound` when no payment exists and `InvalidTransition`
    /// when it is already cancelled.
    async fn cancel_payment(&self, order_id: &OrderId) -> Result<Payment>;
}

/// The full persistence capability of a redi-shop deployment.
///
/// Both backends implement every record store; a service only touches the
/// part it owns.
pub trait StateStore:
    UserStore + StockStore + OrderStore + PaymentStore + Clone + 'static
{
}

impl<T> StateStore for T where
    T: UserStore + StockStore + OrderStore + PaymentStore + Clone + 'static
{
}
