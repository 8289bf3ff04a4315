//! Secret credential container with automatic memory zeroing.
//!
//! # Security
//! - The secret is stored in a `Zeroizing<String>` and wiped on drop
//! - `Debug` never prints the secret and there is no `Display`
//! - The only read access is [`Credential::expose`], reserved for transports

use zeroize::{Zeroize, Zeroizing};

/// Password or JWT token used to authenticate against ClickHouse.
///
/// # Example
///
/// ```rust
/// use chbridge_core::security::Credential;
///
/// let token = Credential::new("s3cret".to_string());
/// assert!(!token.is_empty());
/// assert_eq!(format!("{token:?}"), "Credential(****)");
/// // Memory is zeroed when `token` is dropped
/// ```
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential {
    secret: Zeroizing<String>,
}

impl Credential {
    /// Takes ownership of a secret string.
    pub fn new(secret: String) -> Self {
        Self {
            secret: Zeroizing::new(secret),
        }
    }

    /// Returns true when no secret was supplied.
    pub fn is_empty(&self) -> bool {
        self.secret.is_empty()
    }

    /// Reads the secret for inclusion in an outgoing request body.
    ///
    /// # Security
    /// Callers must not log, format, or persist the returned value.
    pub fn expose(&self) -> &str {
        &self.secret
    }

    /// Wipes the secret in place.
    pub fn clear(&mut self) {
        self.secret.zeroize();
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            f.write_str("Credential(<empty>)")
        } else {
            f.write_str("Credential(****)")
        }
    }
}

impl From<String> for Credential {
    fn from(secret: String) -> Self {
        Self::new(secret)
    }
}
