use async_trait::async_trait;
use common::{ItemId, ItemPrices, OrderId, UserId};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{
    Order, Payment, PaymentStatus, Result, StockItem, StoreError, User,
    store::{OrderStore, PaymentStore, StockStore, UserStore},
};

/// SQLSTATE raised when arithmetic leaves the range of a column type.
const NUMERIC_VALUE_OUT_OF_RANGE: &str = "22003";

/// PostgreSQL-backed state store.
///
/// Conditional updates run inside a transaction: stock subtraction applies
/// the update and then checks the post-condition, credit subtraction locks
/// the row and checks the balance first. Either way a failed check rolls the
/// transaction back.
#[derive(Clone)]
pub struct PostgresStateStore {
    pool: PgPool,
}

impl PostgresStateStore {
    /// Creates a new PostgreSQL state store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_user(row: PgRow) -> Result<User> {
        Ok(User {
            id: UserId::new(row.try_get::<String, _>("id")?),
            credit: row.try_get("credit")?,
        })
    }

    fn row_to_item(row: PgRow) -> Result<StockItem> {
        Ok(StockItem {
            id: ItemId::new(row.try_get::<String, _>("id")?),
            price: row.try_get("price")?,
            quantity: row.try_get("quantity")?,
        })
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let items: String = row.try_get("items")?;
        let items: ItemPrices = items
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("order items: {e}")))?;

        Ok(Order {
            id: OrderId::new(row.try_get::<String, _>("id")?),
            user_id: UserId::new(row.try_get::<String, _>("user_id")?),
            items,
            cost: row.try_get("cost")?,
            paid: row.try_get("paid")?,
        })
    }

    fn row_to_payment(row: PgRow) -> Result<Payment> {
        let status: String = row.try_get("status")?;
        Ok(Payment {
            order_id: OrderId::new(row.try_get::<String, _>("order_id")?),
            amount: row.try_get("amount")?,
            status: status.parse()?,
        })
    }

    /// Maps an out-of-range failure of an update on `entity` to
    /// `OutOfRange`, and anything else to `Database`.
    fn classify(err: sqlx::Error, entity: &'static str, id: impl ToString) -> StoreError {
        let out_of_range = err
            .as_database_error()
            .and_then(|db| db.code())
            .is_some_and(|code| code == NUMERIC_VALUE_OUT_OF_RANGE);
        if !out_of_range {
            return err.into();
        }

        let id = id.to_string();
        tracing::warn!(entity, %id, "update rejected: value out of range");
        StoreError::out_of_range(entity, id)
    }

    /// Loads an order under a row lock, applies `f`, and writes items and
    /// cost back in the same transaction.
    async fn update_order<F>(&self, order_id: &OrderId, f: F) -> Result<Order>
    where
        F: FnOnce(&mut Order) -> Result<()> + Send,
    {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT id, user_id, items, cost, paid FROM orders WHERE id = $1 FOR UPDATE",
        )
        .bind(order_id.as_str())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::not_found("order", order_id))?;

        let mut order = Self::row_to_order(row)?;
        f(&mut order)?;

        sqlx::query("UPDATE orders SET items = $2, cost = $3 WHERE id = $1")
            .bind(order_id.as_str())
            .bind(order.items.to_string())
            .bind(order.cost)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(order)
    }
}

#[async_trait]
impl UserStore for PostgresStateStore {
    async fn create_user(&self) -> Result<User> {
        let row = sqlx::query("INSERT INTO users (id, credit) VALUES ($1, 0) RETURNING id, credit")
            .bind(UserId::generate().as_str())
            .fetch_one(&self.pool)
            .await?;
        Self::row_to_user(row)
    }

    async fn find_user(&self, user_id: &UserId) -> Result<User> {
        let row = sqlx::query("SELECT id, credit FROM users WHERE id = $1")
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("user", user_id))?;
        Self::row_to_user(row)
    }

    async fn remove_user(&self, user_id: &UserId) -> Result<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("user", user_id));
        }
        Ok(())
    }

    async fn subtract_credit(&self, user_id: &UserId, amount: i64) -> Result<User> {
        let mut tx = self.pool.begin().await?;

        let credit = sqlx::query_scalar::<_, i64>("SELECT credit FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id.as_str())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::not_found("user", user_id))?;

        let remaining = credit
            .checked_sub(amount)
            .ok_or_else(|| StoreError::out_of_range("user", user_id))?;
        if remaining < 0 {
            return Err(StoreError::InsufficientCredit {
                user_id: user_id.to_string(),
                available: credit,
                requested: amount,
            });
        }

        let row = sqlx::query(
            "UPDATE users SET credit = credit - $2 WHERE id = $1 RETURNING id, credit",
        )
        .bind(user_id.as_str())
        .bind(amount)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Self::row_to_user(row)
    }

    async fn add_credit(&self, user_id: &UserId, amount: i64) -> Result<User> {
        let row = sqlx::query(
            "UPDATE users SET credit = credit + $2 WHERE id = $1 RETURNING id, credit",
        )
        .bind(user_id.as_str())
        .bind(amount)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Self::classify(e, "user", user_id))?
        .ok_or_else(|| StoreError::not_found("user", user_id))?;
        Self::row_to_user(row)
    }
}

#[async_trait]
impl StockStore for PostgresStateStore {
    async fn create_item(&self, price: i64) -> Result<StockItem> {
        let row = sqlx::query(
            "INSERT INTO stock (id, price, quantity) VALUES ($1, $2, 0) RETURNING id, price, quantity",
        )
        .bind(ItemId::generate().as_str())
        .bind(price)
        .fetch_one(&self.pool)
        .await?;
        Self::row_to_item(row)
    }

    async fn find_item(&self, item_id: &ItemId) -> Result<StockItem> {
        let row = sqlx::query("SELECT id, price, quantity FROM stock WHERE id = $1")
            .bind(item_id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("stock item", item_id))?;
        Self::row_to_item(row)
    }

    async fn subtract_stock(&self, item_id: &ItemId, amount: i64) -> Result<StockItem> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "UPDATE stock SET quantity = quantity - $2 WHERE id = $1 RETURNING id, price, quantity",
        )
        .bind(item_id.as_str())
        .bind(amount)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| Self::classify(e, "stock item", item_id))?
        .ok_or_else(|| StoreError::not_found("stock item", item_id))?;

        let item = Self::row_to_item(row)?;

        // Post-condition: the update must not have taken the stock below zero.
        if item.quantity < 0 {
            tx.rollback().await?;
            tracing::debug!(%item_id, requested = amount, "stock subtraction rolled back");
            return Err(StoreError::InsufficientStock {
                item_id: item_id.to_string(),
                available: item.quantity + amount,
                requested: amount,
            });
        }

        tx.commit().await?;
        Ok(item)
    }

    async fn add_stock(&self, item_id: &ItemId, amount: i64) -> Result<StockItem> {
        let row = sqlx::query(
            "UPDATE stock SET quantity = quantity + $2 WHERE id = $1 RETURNING id, price, quantity",
        )
        .bind(item_id.as_str())
        .bind(amount)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Self::classify(e, "stock item", item_id))?
        .ok_or_else(|| StoreError::not_found("stock item", item_id))?;
        Self::row_to_item(row)
    }
}

#[async_trait]
impl OrderStore for PostgresStateStore {
    async fn create_order(&self, user_id: &UserId) -> Result<Order> {
        let row = sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, items, cost, paid)
            VALUES ($1, $2, '[]', 0, FALSE)
            RETURNING id, user_id, items, cost, paid
            "#,
        )
        .bind(OrderId::generate().as_str())
        .bind(user_id.as_str())
        .fetch_one(&self.pool)
        .await?;
        Self::row_to_order(row)
    }

    async fn find_order(&self, order_id: &OrderId) -> Result<Order> {
        let row = sqlx::query("SELECT id, user_id, items, cost, paid FROM orders WHERE id = $1")
            .bind(order_id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("order", order_id))?;
        Self::row_to_order(row)
    }

    async fn remove_order(&self, order_id: &OrderId) -> Result<()> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(order_id.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("order", order_id));
        }
        Ok(())
    }

    async fn add_item(&self, order_id: &OrderId, item_id: ItemId, price: i64) -> Result<Order> {
        self.update_order(order_id, move |order| order.add_item(item_id, price))
            .await
    }

    async fn remove_item(&self, order_id: &OrderId, item_id: &ItemId) -> Result<Order> {
        self.update_order(order_id, |order| {
            order.remove_item(item_id);
            Ok(())
        })
        .await
    }

    async fn mark_paid(&self, order_id: &OrderId) -> Result<()> {
        let result = sqlx::query("UPDATE orders SET paid = TRUE WHERE id = $1")
            .bind(order_id.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("order", order_id));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for PostgresStateStore {
    async fn find_payment(&self, order_id: &OrderId) -> Result<Option<Payment>> {
        sqlx::query("SELECT order_id, amount, status FROM payments WHERE order_id = $1")
            .bind(order_id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_payment)
            .transpose()
    }

    async fn claim_payment(&self, order_id: &OrderId, amount: i64) -> Result<Option<Payment>> {
        let mut tx = self.pool.begin().await?;

        let previous = sqlx::query(
            "SELECT order_id, amount, status FROM payments WHERE order_id = $1 FOR UPDATE",
        )
        .bind(order_id.as_str())
        .fetch_optional(&mut *tx)
        .await?
        .map(Self::row_to_payment)
        .transpose()?;

        // With no row to lock, a concurrent insert is caught by the conflict
        // clause: it waits for the other claim and then skips the update.
        let claimed = sqlx::query(
            r#"
            INSERT INTO payments (order_id, amount, status)
            VALUES ($1, $2, $3)
            ON CONFLICT (order_id) DO UPDATE SET amount = EXCLUDED.amount, status = EXCLUDED.status
            WHERE payments.status <> EXCLUDED.status
            RETURNING order_id
            "#,
        )
        .bind(order_id.as_str())
        .bind(amount)
        .bind(PaymentStatus::Paid.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        if claimed.is_none() {
            tx.rollback().await?;
            return Err(StoreError::InvalidTransition {
                order_id: order_id.to_string(),
                reason: "payment already paid".to_string(),
            });
        }

        tx.commit().await?;
        Ok(previous)
    }

    async fn release_payment(&self, order_id: &OrderId, previous: Option<Payment>) -> Result<()> {
        match previous {
            Some(payment) => {
                sqlx::query("UPDATE payments SET amount = $2, status = $3 WHERE order_id = $1")
                    .bind(order_id.as_str())
                    .bind(payment.amount)
                    .bind(payment.status.as_str())
                    .execute(&self.pool)
                    .await?;
            }
            None => {
                sqlx::query("DELETE FROM payments WHERE order_id = $1")
                    .bind(order_id.as_str())
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }

    async fn cancel_payment(&self, order_id: &OrderId) -> Result<Payment> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT order_id, amount, status FROM payments WHERE order_id = $1 FOR UPDATE",
        )
        .bind(order_id.as_str())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::not_found("payment", order_id))?;

        let mut payment = Self::row_to_payment(row)?;
        if payment.status == PaymentStatus::Cancelled {
            return Err(StoreError::InvalidTransition {
                order_id: order_id.to_string(),
                reason: "payment already cancelled".to_string(),
            });
        }

        sqlx::query("UPDATE payments SET status = $2 WHERE order_id = $1")
            .bind(order_id.as_str())
            .bind(PaymentStatus::Cancelled.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        payment.status = PaymentStatus::Cancelled;
        Ok(payment)
    }
}
