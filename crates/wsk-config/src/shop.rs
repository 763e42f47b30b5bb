use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Effective shop configuration.
///
/// ```yaml
/// shop:
///   owner_user_id: 1
/// ledger:
///   revenue_category: services
/// database:
///   url_env: WSK_DATABASE_URL
///   max_connections: 5
/// logging:
///   filter: info
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShopConfig {
    pub shop: ShopSection,
    pub ledger: LedgerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShopSection {
    /// User stamped as owner on ledger entries this process writes.
    pub owner_user_id: i64,
}

impl Default for ShopSection {
    fn default() -> Self {
        ShopSection { owner_user_id: 1 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    /// Category of payment entries created by reconciliation.
    pub revenue_category: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            revenue_category: "services".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Name of the environment variable holding the connection URL.
    pub url_env: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            url_env: "WSK_DATABASE_URL".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when RUST_LOG is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            filter: "info".to_string(),
        }
    }
}

impl ShopConfig {
    pub fn validate(&self) -> Result<()> {
        if self.shop.owner_user_id <= 0 {
            bail!(
                "CONFIG_INVALID shop.owner_user_id must be > 0, got {}",
                self.shop.owner_user_id
            );
        }
        if self.ledger.revenue_category.trim().is_empty() {
            bail!("CONFIG_INVALID ledger.revenue_category must not be empty");
        }
        if self.database.url_env.trim().is_empty() {
            bail!("CONFIG_INVALID database.url_env must not be empty");
        }
        if self.database.max_connections == 0 {
            bail!("CONFIG_INVALID database.max_connections must be > 0");
        }
        Ok(())
    }
}
