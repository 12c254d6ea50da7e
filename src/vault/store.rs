//! The secret store: an encrypted, versioned document behind one writer.
//!
//! Every mutation runs inside [`SecretStore::mutate`]: take the writer lock,
//! load and decrypt the full document, apply the change, re-encrypt and
//! rewrite the full document. Nothing is cached between calls, so the
//! persisted blob is always the source of truth and a write is durable only
//! once the backend accepted the complete rewrite.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::backend::VaultBackend;
use super::cipher::VaultCipher;
use super::entry::{meta_keys, SecretAddress, SecretEntry, VaultDocument, Versioning};
use crate::error::VaultError;

/// Optional attributes applied alongside a value write. `None` keeps what the
/// existing entry has.
#[derive(Debug, Clone, Default)]
pub struct SecretWrite {
    pub description: Option<String>,
    pub tags: Option<BTreeSet<String>>,
    pub expires: Option<DateTime<Utc>>,
    /// Merged into the existing meta map.
    pub meta: BTreeMap<String, String>,
}

impl SecretWrite {
    pub fn with_meta(mut self, key: &str, value: impl Into<String>) -> Self {
        self.meta.insert(key.to_string(), value.into());
        self
    }
}

/// Listing row: address plus non-secret attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct SecretSummary {
    pub address: SecretAddress,
    pub description: String,
    pub tags: BTreeSet<String>,
    pub version: u64,
    pub last_updated: DateTime<Utc>,
    pub expires: Option<DateTime<Utc>>,
}

pub struct SecretStore {
    backend: Arc<dyn VaultBackend>,
    cipher: Arc<dyn VaultCipher>,
    writer: Mutex<()>,
}

impl SecretStore {
    pub fn new(backend: Arc<dyn VaultBackend>, cipher: Arc<dyn VaultCipher>) -> Self {
        Self {
            backend,
            cipher,
            writer: Mutex::new(()),
        }
    }

    pub fn cipher(&self) -> &Arc<dyn VaultCipher> {
        &self.cipher
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub async fn get(&self, address: &SecretAddress) -> Result<Option<SecretEntry>, VaultError> {
        let doc = self.load().await?;
        let entry = doc.entry(address).cloned();
        if let Some(entry) = &entry {
            if entry.is_expired(Utc::now()) {
                warn!(secret = %address, "secret has passed its expiry");
            }
        }
        Ok(entry)
    }

    /// Decrypt the current value of an entry.
    pub fn reveal(&self, entry: &SecretEntry) -> Result<Zeroizing<String>, VaultError> {
        self.cipher.open_text(&entry.value)
    }

    pub async fn list_projects(&self) -> Result<Vec<String>, VaultError> {
        Ok(self.load().await?.projects.into_keys().collect())
    }

    pub async fn list_entries(
        &self,
        project: &str,
        category: Option<&str>,
    ) -> Result<Vec<(SecretAddress, SecretEntry)>, VaultError> {
        let doc = self.load().await?;
        Ok(doc
            .entries(project, category)
            .into_iter()
            .map(|(address, entry)| (address, entry.clone()))
            .collect())
    }

    pub async fn list_secrets(
        &self,
        project: &str,
        category: Option<&str>,
    ) -> Result<Vec<SecretSummary>, VaultError> {
        Ok(self
            .list_entries(project, category)
            .await?
            .into_iter()
            .map(|(address, entry)| SecretSummary {
                address,
                description: entry.description,
                tags: entry.tags,
                version: entry.version,
                last_updated: entry.last_updated,
                expires: entry.expires,
            })
            .collect())
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Create or overwrite the entry at `address`.
    ///
    /// On an existing key the version is bumped and, when `versioning` is
    /// enabled, the replaced value is archived within the retention bound.
    pub async fn put(
        &self,
        address: &SecretAddress,
        entry: SecretEntry,
        versioning: Versioning,
    ) -> Result<SecretEntry, VaultError> {
        self.mutate(|doc| Ok(Self::put_in(doc, address, entry, versioning, Utc::now())))
            .await
    }

    /// Seal `plaintext` and write it as the new value at `address`,
    /// merging the attributes in `write` with the existing entry.
    pub async fn set_secret(
        &self,
        address: &SecretAddress,
        plaintext: &str,
        write: SecretWrite,
        versioning: Versioning,
    ) -> Result<SecretEntry, VaultError> {
        let sealed = self.cipher.seal_text(plaintext)?;
        let stored = self
            .mutate(|doc| {
                let now = Utc::now();
                let mut entry = match doc.entry(address) {
                    Some(existing) => {
                        let mut next = existing.clone();
                        next.value = sealed;
                        next
                    }
                    None => SecretEntry::new(sealed, now),
                };
                if let Some(description) = write.description {
                    entry.description = description;
                }
                if let Some(tags) = write.tags {
                    entry.tags = tags;
                }
                if write.expires.is_some() {
                    entry.expires = write.expires;
                }
                entry.meta.extend(write.meta);
                Ok(Self::put_in(doc, address, entry, versioning, now))
            })
            .await?;

        debug!(
            secret = %address,
            version = stored.version,
            source = stored.meta_value(meta_keys::SOURCE).unwrap_or("unknown"),
            "secret written"
        );
        Ok(stored)
    }

    /// Remove the entry at `address`. Returns whether it existed.
    pub async fn delete(&self, address: &SecretAddress) -> Result<bool, VaultError> {
        let existed = self
            .mutate(|doc| Ok(doc.remove(address).is_some()))
            .await?;
        if existed {
            info!(secret = %address, "secret deleted");
        }
        Ok(existed)
    }

    /// Create an empty project. Returns false when it already existed.
    pub async fn create_project(&self, name: &str) -> Result<bool, VaultError> {
        let created = self
            .mutate(|doc| {
                if doc.projects.contains_key(name) {
                    return Ok(false);
                }
                doc.projects.insert(name.to_string(), Default::default());
                Ok(true)
            })
            .await?;
        if created {
            info!(project = name, "project created");
        }
        Ok(created)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn put_in(
        doc: &mut VaultDocument,
        address: &SecretAddress,
        entry: SecretEntry,
        versioning: Versioning,
        now: DateTime<Utc>,
    ) -> SecretEntry {
        let category = doc.category_mut(&address.project, &address.category);
        let stored = match category.remove(&address.key) {
            Some(previous) => entry.supersede(previous, versioning, now),
            None => entry.into_first_version(now),
        };
        category.insert(address.key.clone(), stored.clone());
        stored
    }

    /// Load → modify → persist under the writer lock.
    async fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut VaultDocument) -> Result<T, VaultError>,
    ) -> Result<T, VaultError> {
        let _writer = self.writer.lock().await;
        let mut doc = self.load().await?;
        let out = apply(&mut doc)?;
        self.persist(&doc).await?;
        Ok(out)
    }

    async fn load(&self) -> Result<VaultDocument, VaultError> {
        let Some(blob) = self.backend.load().await? else {
            return Ok(VaultDocument::default());
        };
        let plaintext = Zeroizing::new(
            self.cipher
                .decrypt(&blob)
                .map_err(|e| VaultError::StoreAccess(format!("cannot decrypt vault: {e}")))?,
        );
        serde_json::from_slice(&plaintext)
            .map_err(|e| VaultError::StoreAccess(format!("vault document is malformed: {e}")))
    }

    async fn persist(&self, doc: &VaultDocument) -> Result<(), VaultError> {
        let plaintext = Zeroizing::new(serde_json::to_vec(doc)?);
        let blob = self
            .cipher
            .encrypt(&plaintext)
            .map_err(|e| VaultError::StoreWrite(format!("cannot encrypt vault: {e}")))?;
        self.backend.store(&blob).await
    }
}
