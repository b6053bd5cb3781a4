//! User credit capability used by the payment worker.

use async_trait::async_trait;
use common::UserId;
use reqwest::StatusCode;
use state_store::UserStore;
use thiserror::Error;

/// Errors from the user credit capability.
#[derive(Debug, Error)]
pub enum CreditError {
    /// The user service refused the change: unknown user or insufficient
    /// credit.
    #[error("credit change rejected: {0}")]
    Rejected(String),

    /// The user service could not be reached or failed internally.
    #[error("user service unavailable: {0}")]
    Unavailable(String),
}

impl CreditError {
    pub fn is_rejection(&self) -> bool {
        matches!(self, CreditError::Rejected(_))
    }
}

/// Debits and refunds user credit.
#[async_trait]
pub trait UserCredit: Send + Sync {
    /// Subtracts `amount`, refusing to take the balance below zero.
    async fn subtract(&self, user_id: &UserId, amount: i64) -> Result<(), CreditError>;

    /// Adds `amount` back to the balance.
    async fn add(&self, user_id: &UserId, amount: i64) -> Result<(), CreditError>;
}

/// Credit capability backed by a co-located state store.
#[derive(Debug, Clone)]
pub struct StoreUserCredit<S> {
    store: S,
}

impl<S: UserStore> StoreUserCredit<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

fn classify(e: state_store::StoreError) -> CreditError {
    if e.is_not_found() || e.is_rule_violation() {
        CreditError::Rejected(e.to_string())
    } else {
        CreditError::Unavailable(e.to_string())
    }
}

#[async_trait]
impl<S: UserStore> UserCredit for StoreUserCredit<S> {
    async fn subtract(&self, user_id: &UserId, amount: i64) -> Result<(), CreditError> {
        self.store
            .subtract_credit(user_id, amount)
            .await
            .map(|_| ())
            .map_err(classify)
    }

    async fn add(&self, user_id: &UserId, amount: i64) -> Result<(), CreditError> {
        self.store
            .add_credit(user_id, amount)
            .await
            .map(|_| ())
            .map_err(classify)
    }
}

/// Credit capability that calls the user service over HTTP.
///
/// `200` is success, `500` means the service is unavailable, and any other
/// status is a rejection.
#[derive(Debug, Clone)]
pub struct HttpUserCredit {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUserCredit {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn post(&self, action: &str, user_id: &UserId, amount: i64) -> Result<(), CreditError> {
        let url = format!("{}/users/credit/{action}/{user_id}/{amount}", self.base_url);
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| CreditError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::INTERNAL_SERVER_ERROR => Err(CreditError::Unavailable(format!(
                "{url} returned {}",
                response.status()
            ))),
            status => Err(CreditError::Rejected(format!("{url} returned {status}"))),
        }
    }
}

#[async_trait]
impl UserCredit for HttpUserCredit {
    async fn subtract(&self, user_id: &UserId, amount: i64) -> Result<(), CreditError> {
        self.post("subtract", user_id, amount).await
    }

    async fn add(&self, user_id: &UserId, amount: i64) -> Result<(), CreditError> {
        self.post("add", user_id, amount).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use state_store::{InMemoryStateStore, User};

    #[tokio::test]
    async fn test_store_credit_subtract_and_add() {
        let store = InMemoryStateStore::new();
        let user_id = UserId::new("u1");
        store
            .put_user(User {
                id: user_id.clone(),
                credit: 20,
            })
            .await;

        let credit = StoreUserCredit::new(store.clone());
        credit.subtract(&user_id, 15).await.unwrap();
        credit.add(&user_id, 3).await.unwrap();

        assert_eq!(store.find_user(&user_id).await.unwrap().credit, 8);
    }

    #[tokio::test]
    async fn test_store_credit_rejections() {
        let store = InMemoryStateStore::new();
        let user_id = UserId::new("u1");
        store
            .put_user(User {
                id: user_id.clone(),
                credit: 10,
            })
            .await;

        let credit = StoreUserCredit::new(store);
        assert!(credit.subtract(&user_id, 11).await.unwrap_err().is_rejection());
        assert!(
            credit
                .subtract(&UserId::new("ghost"), 1)
                .await
                .unwrap_err()
                .is_rejection()
        );
    }

    #[tokio::test]
    async fn test_http_credit_unreachable_is_unavailable() {
        let credit = HttpUserCredit::new(reqwest::Client::new(), "http://127.0.0.1:1/");
        let err = credit.subtract(&UserId::new("u1"), 1).await.unwrap_err();
        assert!(matches!(err, CreditError::Unavailable(_)));
    }
}
