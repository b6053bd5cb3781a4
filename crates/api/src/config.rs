//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },

    #[error("{var} is required {reason}")]
    Missing {
        var: &'static str,
        reason: &'static str,
    },
}

/// Which redi-shop service this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    User,
    Order,
    Stock,
    Payment,
    /// Every service in one process.
    All,
}

impl ServiceKind {
    /// Returns true if this process serves `service`.
    pub fn runs(&self, service: ServiceKind) -> bool {
        *self == ServiceKind::All || *self == service
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::User => "user",
            ServiceKind::Order => "order",
            ServiceKind::Stock => "stock",
            ServiceKind::Payment => "payment",
            ServiceKind::All => "all",
        }
    }
}

impl FromStr for ServiceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(ServiceKind::User),
            "order" => Ok(ServiceKind::Order),
            "stock" => Ok(ServiceKind::Stock),
            "payment" => Ok(ServiceKind::Payment),
            "all" => Ok(ServiceKind::All),
            _ => Err(ConfigError::Invalid {
                var: "SERVICE",
                value: s.to_string(),
            }),
        }
    }
}

/// Storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Memory,
    Postgres,
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Backend::Memory),
            "postgres" => Ok(Backend::Postgres),
            _ => Err(ConfigError::Invalid {
                var: "BACKEND",
                value: s.to_string(),
            }),
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `8000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `SERVICE`: `user`, `order`, `stock`, `payment` or `all` (default: `all`)
/// - `BACKEND`: `memory` or `postgres` (default: `memory`)
/// - `DATABASE_URL`: required for the postgres backend
/// - `REDIS_URL`: message bus; required unless `SERVICE=all`
/// - `INSTANCE_ID`: gateway outcome topic suffix (default: random)
/// - `CHECKOUT_TIMEOUT_MS`: checkout deadline (default: `5000`)
/// - `USER_URL` / `STOCK_URL`: peer services when not co-located
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub service: ServiceKind,
    pub backend: Backend,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub instance_id: String,
    pub checkout_timeout: Duration,
    pub user_url: Option<String>,
    pub stock_url: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Loads configuration through `lookup`, which returns a variable's value
    /// if it is set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let port = match var("PORT") {
            Some(p) => p.parse().map_err(|_| ConfigError::Invalid {
                var: "PORT",
                value: p,
            })?,
            None => defaults.port,
        };
        let checkout_timeout = match var("CHECKOUT_TIMEOUT_MS") {
            Some(ms) => Duration::from_millis(ms.parse().map_err(|_| ConfigError::Invalid {
                var: "CHECKOUT_TIMEOUT_MS",
                value: ms,
            })?),
            None => defaults.checkout_timeout,
        };

        let config = Self {
            host: var("HOST").unwrap_or(defaults.host),
            port,
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            service: var("SERVICE")
                .map(|s| s.parse())
                .transpose()?
                .unwrap_or(defaults.service),
            backend: var("BACKEND")
                .map(|s| s.parse())
                .transpose()?
                .unwrap_or(defaults.backend),
            database_url: var("DATABASE_URL"),
            redis_url: var("REDIS_URL"),
            instance_id: var("INSTANCE_ID").unwrap_or(defaults.instance_id),
            checkout_timeout,
            user_url: var("USER_URL"),
            stock_url: var("STOCK_URL"),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.backend == Backend::Postgres && self.database_url.is_none() {
            return Err(ConfigError::Missing {
                var: "DATABASE_URL",
                reason: "for the postgres backend",
            });
        }
        if self.service != ServiceKind::All && self.redis_url.is_none() {
            return Err(ConfigError::Missing {
                var: "REDIS_URL",
                reason: "when services run in separate processes",
            });
        }
        if self.service == ServiceKind::Payment && self.user_url.is_none() {
            return Err(ConfigError::Missing {
                var: "USER_URL",
                reason: "by the payment service",
            });
        }
        if self.service == ServiceKind::Order && self.stock_url.is_none() {
            return Err(ConfigError::Missing {
                var: "STOCK_URL",
                reason: "by the order service",
            });
        }
        if self.instance_id.contains('#') {
            return Err(ConfigError::Invalid {
                var: "INSTANCE_ID",
                value: self.instance_id.clone(),
            });
        }
        Ok(())
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            log_level: "info".to_string(),
            service: ServiceKind::All,
            backend: Backend::Memory,
            database_url: None,
            redis_url: None,
            instance_id: uuid::Uuid::new_v4().simple().to_string(),
            checkout_timeout: Duration::from_millis(5000),
            user_url: None,
            stock_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = load(&[]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.service, ServiceKind::All);
        assert_eq!(config.backend, Backend::Memory);
        assert_eq!(config.checkout_timeout, Duration::from_secs(5));
        assert!(!config.instance_id.is_empty());
    }

    #[test]
    fn test_addr_formatting() {
        let config = load(&[("HOST", "127.0.0.1"), ("PORT", "8080")]).unwrap();
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_split_deployment() {
        let config = load(&[
            ("SERVICE", "payment"),
            ("BACKEND", "postgres"),
            ("DATABASE_URL", "postgres://localhost/shop"),
            ("REDIS_URL", "redis://localhost"),
            ("USER_URL", "http://user:8000"),
            ("INSTANCE_ID", "pay-1"),
            ("CHECKOUT_TIMEOUT_MS", "250"),
        ])
        .unwrap();
        assert_eq!(config.service, ServiceKind::Payment);
        assert_eq!(config.backend, Backend::Postgres);
        assert_eq!(config.instance_id, "pay-1");
        assert_eq!(config.checkout_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_missing_requirements() {
        assert!(matches!(
            load(&[("BACKEND", "postgres")]),
            Err(ConfigError::Missing { var: "DATABASE_URL", .. })
        ));
        assert!(matches!(
            load(&[("SERVICE", "stock")]),
            Err(ConfigError::Missing { var: "REDIS_URL", .. })
        ));
        assert!(matches!(
            load(&[("SERVICE", "order"), ("REDIS_URL", "redis://localhost")]),
            Err(ConfigError::Missing { var: "STOCK_URL", .. })
        ));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            load(&[("SERVICE", "shipping")]),
            Err(ConfigError::Invalid { var: "SERVICE", .. })
        ));
        assert!(matches!(
            load(&[("PORT", "http")]),
            Err(ConfigError::Invalid { var: "PORT", .. })
        ));
        assert!(matches!(
            load(&[("INSTANCE_ID", "a#b")]),
            Err(ConfigError::Invalid { var: "INSTANCE_ID", .. })
        ));
    }

    #[test]
    fn test_service_selection() {
        assert!(ServiceKind::All.runs(ServiceKind::Stock));
        assert!(ServiceKind::Stock.runs(ServiceKind::Stock));
        assert!(!ServiceKind::Stock.runs(ServiceKind::Order));
    }
}
