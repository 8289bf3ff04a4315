//! ClickHouse connection descriptor.
//!
//! The descriptor is owned by the workflow and handed to the transfer
//! service by value for every call.

use crate::error::ChBridgeError;
use crate::security::Credential;

/// Default ClickHouse native port.
pub const DEFAULT_PORT: u16 = 9000;

/// Connection parameters for the ClickHouse side of a transfer.
///
/// # Security
/// The credential is held in a zeroizing container; `Display` omits both
/// user and credential and `Debug` redacts the credential.
///
/// # Example
/// ```rust
/// use chbridge_core::connection::ConnectionDescriptor;
///
/// let descriptor = ConnectionDescriptor::new("clickhouse.internal")
///     .with_port(8443)
///     .with_user("analyst")
///     .with_secure_channel(true);
///
/// assert!(descriptor.validate().is_ok());
/// assert_eq!(descriptor.to_string(), "clickhouse.internal:8443 (tls)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    /// Server host name
    pub host: String,
    /// Server port
    pub port: u16,
    /// Selected database; `None` means the server default
    pub database: Option<String>,
    /// User name
    pub user: String,
    /// Password or JWT token
    pub credential: Credential,
    /// Whether to connect over TLS
    pub secure: bool,
}

impl Default for ConnectionDescriptor {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            database: None,
            user: "default".to_string(),
            credential: Credential::default(),
            secure: false,
        }
    }
}

impl std::fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.normalized_host(), self.port)?;
        if let Some(database) = &self.database {
            write!(f, "/{database}")?;
        }
        if self.secure {
            write!(f, " (tls)")?;
        }
        // Intentionally omit user and never include the credential
        Ok(())
    }
}

/// Normalizes a database selection: blank strings mean "no database".
pub fn normalize_database(database: Option<String>) -> Option<String> {
    database
        .map(|db| db.trim().to_string())
        .filter(|db| !db.is_empty())
}

impl ConnectionDescriptor {
    /// Creates a descriptor for `host` with the remaining fields defaulted.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    /// Builder method to set the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Builder method to set the database.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = normalize_database(Some(database.into()));
        self
    }

    /// Builder method to set the user.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Builder method to set the credential.
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = credential;
        self
    }

    /// Builder method to toggle TLS.
    pub fn with_secure_channel(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Validates that the descriptor is complete enough for a discovery call.
    ///
    /// # Errors
    /// Returns a configuration error if host or user is blank or the port
    /// is zero.
    pub fn validate(&self) -> crate::Result<()> {
        if self.normalized_host().is_empty() {
            return Err(ChBridgeError::configuration("host cannot be empty"));
        }

        if self.user.trim().is_empty() {
            return Err(ChBridgeError::configuration("user cannot be empty"));
        }

        if self.port == 0 {
            return Err(ChBridgeError::configuration(
                "port must be between 1 and 65535",
            ));
        }

        Ok(())
    }

    /// Host with any pasted scheme prefix and embedded `:port` removed.
    ///
    /// Operators often paste a full URL such as
    /// `https://abc.clickhouse.cloud:8443`; only the host part is usable.
    pub fn normalized_host(&self) -> &str {
        let host = self.host.trim();
        let host = host.split_once("://").map_or(host, |(_, rest)| rest);
        let host = host.split_once('/').map_or(host, |(authority, _)| authority);
        host.split_once(':').map_or(host, |(name, _)| name)
    }
}
