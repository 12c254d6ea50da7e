//! Encrypted project/category/key secret storage.

pub mod backend;
pub mod cipher;
pub mod entry;
pub mod store;

pub use backend::{FileBackend, MemoryBackend, VaultBackend};
pub use cipher::{ChaChaCipher, EncryptionKey, VaultCipher};
pub use entry::{meta_keys, SecretAddress, SecretEntry, VaultDocument, Versioning};
pub use store::{SecretStore, SecretSummary, SecretWrite};
