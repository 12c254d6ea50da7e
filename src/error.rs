//! Error taxonomy shared by the vault and the rotation engine.
//!
//! Only failures that abort the calling operation live here. Non-fatal
//! conditions (schedule fallbacks, hook and notification failures) are
//! returned as values by the modules that produce them.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VaultError {
    /// The persisted vault could not be decrypted or parsed.
    #[error("vault store is unreadable: {0}")]
    StoreAccess(String),

    /// The persisted vault could not be rewritten.
    #[error("vault store write failed: {0}")]
    StoreWrite(String),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("invalid rotation policy: {0}")]
    InvalidPolicy(String),

    /// Operator writes into the engine's own namespace.
    #[error("project '{0}' is reserved")]
    ReservedNamespace(String),

    #[error("cipher error: {0}")]
    Cipher(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VaultError {
    pub fn policy_not_found(id: &str) -> Self {
        VaultError::NotFound {
            kind: "rotation policy",
            id: id.to_string(),
        }
    }
}

pub type VaultResult<T> = std::result::Result<T, VaultError>;
