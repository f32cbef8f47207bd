//! Configuration management for the server.

use std::env;
use std::str::FromStr;

/// Which backend holds the authoritative store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreKind {
    #[default]
    Postgres,
    /// Process-local tables, lost on restart.
    Memory,
}

impl FromStr for StoreKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "postgres" => Ok(StoreKind::Postgres),
            "memory" => Ok(StoreKind::Memory),
            _ => Err(ConfigError::InvalidValue("STORE")),
        }
    }
}

/// How a product `create` is recognized as a duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProductDedup {
    /// Same id, same name, or same non-empty barcode. First writer wins.
    #[default]
    NameOrBarcode,
    /// Same id only.
    IdOnly,
}

impl FromStr for ProductDedup {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name-or-barcode" => Ok(ProductDedup::NameOrBarcode),
            "id-only" => Ok(ProductDedup::IdOnly),
            _ => Err(ConfigError::InvalidValue("PRODUCT_DEDUP")),
        }
    }
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// PostgreSQL connection URL, required for [`StoreKind::Postgres`]
    pub database_url: Option<String>,
    /// When set, requests without a bearer token are rejected
    pub auth_secret: Option<String>,
    pub store: StoreKind,
    pub product_dedup: ProductDedup,
    /// Document store endpoint for reports; uploads are disabled without it
    pub document_upload_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            database_url: None,
            auth_secret: None,
            store: StoreKind::Memory,
            product_dedup: ProductDedup::default(),
            document_upload_url: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());

        let port = lookup("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let store = match lookup("STORE") {
            Some(value) => value.parse()?,
            None => StoreKind::Postgres,
        };

        let database_url = lookup("DATABASE_URL").filter(|url| !url.is_empty());
        if store == StoreKind::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingDatabaseUrl);
        }

        let product_dedup = match lookup("PRODUCT_DEDUP") {
            Some(value) => value.parse()?,
            None => ProductDedup::default(),
        };

        Ok(Self {
            host,
            port,
            database_url,
            auth_secret: lookup("AUTH_SECRET").filter(|s| !s.is_empty()),
            store,
            product_dedup,
            document_upload_url: lookup("DOCUMENT_UPLOAD_URL").filter(|s| !s.is_empty()),
        })
    }

    pub fn with_auth_secret(mut self, secret: impl Into<String>) -> Self {
        self.auth_secret = Some(secret.into());
        self
    }

    pub fn with_product_dedup(mut self, dedup: ProductDedup) -> Self {
        self.product_dedup = dedup;
        self
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("DATABASE_URL environment variable is required")]
    MissingDatabaseUrl,

    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("Invalid {0} value")]
    InvalidValue(&'static str),
}
