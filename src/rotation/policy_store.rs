//! Policy persistence on top of the secret store.
//!
//! Each policy is one sealed vault entry under
//! `__system / rotation_policies / <policyId>` whose value is the JSON record.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::policy::{PolicyDefaults, PolicyDraft, RotationPolicy};
use super::schedule::next_rotation;
use crate::error::VaultError;
use crate::vault::{meta_keys, SecretAddress, SecretEntry, SecretStore, SecretWrite, Versioning};

/// Reserved project holding engine records.
pub const SYSTEM_PROJECT: &str = "__system";
/// Category of [`SYSTEM_PROJECT`] holding rotation policies.
pub const POLICY_CATEGORY: &str = "rotation_policies";

#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Create or update a policy.
    ///
    /// With `policy_id`, that record is updated or `NotFound` is returned.
    /// Without it, a policy governing the same (project, category,
    /// secretName) is updated in place, otherwise a new one is created.
    /// `nextRotationDate` is recomputed on every save.
    async fn save(
        &self,
        draft: PolicyDraft,
        policy_id: Option<&str>,
    ) -> Result<RotationPolicy, VaultError>;

    async fn get(&self, policy_id: &str) -> Result<Option<RotationPolicy>, VaultError>;

    async fn list(&self) -> Result<Vec<RotationPolicy>, VaultError>;

    async fn delete(&self, policy_id: &str) -> Result<bool, VaultError>;

    /// Persist schedule state after a rotation attempt made at `attempted_at`.
    /// `last_rotation` of `None` leaves the recorded last rotation untouched.
    /// `nextRotationDate` is recomputed from the stored record, so interval
    /// edits made while the attempt ran are honoured.
    async fn record_attempt(
        &self,
        policy_id: &str,
        last_rotation: Option<DateTime<Utc>>,
        attempted_at: DateTime<Utc>,
    ) -> Result<RotationPolicy, VaultError>;
}

pub struct VaultPolicyStore {
    secrets: Arc<SecretStore>,
    defaults: PolicyDefaults,
    writer: Mutex<()>,
}

impl VaultPolicyStore {
    pub fn new(secrets: Arc<SecretStore>, defaults: PolicyDefaults) -> Self {
        Self {
            secrets,
            defaults,
            writer: Mutex::new(()),
        }
    }

    fn address(policy_id: &str) -> SecretAddress {
        SecretAddress::new(SYSTEM_PROJECT, POLICY_CATEGORY, policy_id)
    }

    fn new_policy_id() -> String {
        format!("rp_{}", uuid::Uuid::new_v4().simple())
    }

    async fn read(&self, policy_id: &str) -> Result<Option<RotationPolicy>, VaultError> {
        let Some(entry) = self.secrets.get(&Self::address(policy_id)).await? else {
            return Ok(None);
        };
        Ok(Some(self.decode(policy_id, &entry)?))
    }

    fn decode(&self, policy_id: &str, entry: &SecretEntry) -> Result<RotationPolicy, VaultError> {
        let json = self.secrets.reveal(entry)?;
        serde_json::from_str(&json).map_err(|e| {
            VaultError::StoreAccess(format!("rotation policy '{policy_id}' is unreadable: {e}"))
        })
    }

    async fn read_all(&self) -> Result<Vec<RotationPolicy>, VaultError> {
        let entries = self
            .secrets
            .list_entries(SYSTEM_PROJECT, Some(POLICY_CATEGORY))
            .await?;
        entries
            .iter()
            .map(|(address, entry)| self.decode(&address.key, entry))
            .collect()
    }

    async fn write(&self, policy: &RotationPolicy) -> Result<(), VaultError> {
        let json = serde_json::to_string(policy)?;
        let write = SecretWrite {
            description: Some(format!("rotation policy for {}", policy.secret_address())),
            ..Default::default()
        }
        .with_meta(meta_keys::SOURCE, "policy");
        self.secrets
            .set_secret(&Self::address(&policy.policy_id), &json, write, Versioning::disabled())
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PolicyStore for VaultPolicyStore {
    async fn save(
        &self,
        draft: PolicyDraft,
        policy_id: Option<&str>,
    ) -> Result<RotationPolicy, VaultError> {
        let _writer = self.writer.lock().await;
        let now = Utc::now();

        let existing = match policy_id {
            Some(id) => Some(
                self.read(id)
                    .await?
                    .ok_or_else(|| VaultError::policy_not_found(id))?,
            ),
            None => match draft.identity() {
                Some((project, category, secret_name)) => self
                    .read_all()
                    .await?
                    .into_iter()
                    .find(|p| p.governs(project, category, secret_name)),
                None => None,
            },
        };

        let created = existing.is_none();
        let mut policy = match existing {
            Some(current) => {
                let mut updated = draft.apply_to(current);
                updated.updated_at = now;
                updated
            }
            None => draft.into_policy(Self::new_policy_id(), &self.defaults, now)?,
        };
        if !policy.rotation_interval.is_custom() {
            policy.custom_rotation_cron = None;
        }
        policy.validate()?;

        reschedule(&mut policy, now);

        self.write(&policy).await?;
        info!(
            policy_id = %policy.policy_id,
            secret = %policy.secret_address(),
            created,
            next_rotation = %policy.next_rotation_date,
            "rotation policy saved"
        );
        Ok(policy)
    }

    async fn get(&self, policy_id: &str) -> Result<Option<RotationPolicy>, VaultError> {
        self.read(policy_id).await
    }

    async fn list(&self) -> Result<Vec<RotationPolicy>, VaultError> {
        self.read_all().await
    }

    async fn delete(&self, policy_id: &str) -> Result<bool, VaultError> {
        let _writer = self.writer.lock().await;
        let existed = self.secrets.delete(&Self::address(policy_id)).await?;
        if existed {
            info!(policy_id, "rotation policy deleted");
        }
        Ok(existed)
    }

    async fn record_attempt(
        &self,
        policy_id: &str,
        last_rotation: Option<DateTime<Utc>>,
        attempted_at: DateTime<Utc>,
    ) -> Result<RotationPolicy, VaultError> {
        let _writer = self.writer.lock().await;
        let mut policy = self
            .read(policy_id)
            .await?
            .ok_or_else(|| VaultError::policy_not_found(policy_id))?;
        if last_rotation.is_some() {
            policy.last_rotation_date = last_rotation;
        }
        // A failed attempt counts from the attempt, not the old rotation.
        let base = last_rotation.unwrap_or(attempted_at);
        let outcome = next_rotation(
            &policy.rotation_interval,
            policy.custom_rotation_cron.as_deref(),
            Some(base),
            attempted_at,
        );
        if let Some(warning) = &outcome.warning {
            warn!(policy_id, %warning, "rotation schedule fallback");
        }
        policy.next_rotation_date = outcome.next;
        self.write(&policy).await?;
        debug!(policy_id, next_rotation = %policy.next_rotation_date, "rotation schedule updated");
        Ok(policy)
    }
}

/// Recompute `nextRotationDate` from the policy's own schedule inputs.
fn reschedule(policy: &mut RotationPolicy, now: DateTime<Utc>) {
    let outcome = next_rotation(
        &policy.rotation_interval,
        policy.custom_rotation_cron.as_deref(),
        policy.last_rotation_date,
        now,
    );
    if let Some(warning) = &outcome.warning {
        warn!(policy_id = %policy.policy_id, %warning, "rotation schedule fallback");
    }
    policy.next_rotation_date = outcome.next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rotation::policy::RotationInterval;
    use crate::vault::{ChaChaCipher, EncryptionKey, MemoryBackend};
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn store() -> VaultPolicyStore {
        let secrets = SecretStore::new(
            Arc::new(MemoryBackend::new()),
            Arc::new(ChaChaCipher::new(EncryptionKey::from_bytes([9; 32]))),
        );
        VaultPolicyStore::new(Arc::new(secrets), PolicyDefaults::default())
    }

    #[tokio::test]
    async fn create_applies_defaults_and_schedules() {
        let store = store();
        let before = Utc::now();
        let policy = store
            .save(PolicyDraft::for_secret("billing", "stripe", "api_key"), None)
            .await
            .unwrap();

        assert!(policy.policy_id.starts_with("rp_"));
        assert!(policy.is_enabled);
        assert!(policy.versioning_enabled);
        assert_eq!(policy.max_versions_to_keep, 5);
        assert_eq!(policy.rotation_interval, RotationInterval::parse("30d"));
        assert!(policy.next_rotation_date >= before + Duration::days(30));
    }

    #[tokio::test]
    async fn upsert_by_secret_is_idempotent() {
        let store = store();
        let first = store
            .save(PolicyDraft::for_secret("p", "c", "s"), None)
            .await
            .unwrap();
        let second = store
            .save(
                PolicyDraft {
                    rotation_interval: Some(RotationInterval::parse("7d")),
                    ..PolicyDraft::for_secret("p", "c", "s")
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(second.policy_id, first.policy_id);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.rotation_interval, RotationInterval::parse("7d"));
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let store = store();
        let saved = store
            .save(PolicyDraft::for_secret("p", "c", "s"), None)
            .await
            .unwrap();
        let loaded = store.get(&saved.policy_id).await.unwrap().unwrap();
        assert_eq!(loaded, saved);
    }

    #[tokio::test]
    async fn explicit_unknown_id_is_not_found() {
        let store = store();
        let err = store
            .save(PolicyDraft::default(), Some("rp_missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::NotFound { .. }));
    }

    #[tokio::test]
    async fn create_without_identity_is_invalid() {
        let err = store().save(PolicyDraft::default(), None).await.unwrap_err();
        assert!(matches!(err, VaultError::InvalidPolicy(_)));
    }

    #[tokio::test]
    async fn custom_cron_cleared_for_duration_intervals() {
        let store = store();
        let policy = store
            .save(
                PolicyDraft {
                    custom_rotation_cron: Some("0 0 * * *".into()),
                    ..PolicyDraft::for_secret("p", "c", "s")
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(policy.custom_rotation_cron, None);
    }

    #[tokio::test]
    async fn concurrent_upserts_do_not_duplicate() {
        let store = Arc::new(store());
        let saves = (0..8).map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .save(PolicyDraft::for_secret("p", "c", "s"), None)
                    .await
                    .unwrap()
            })
        });
        futures::future::join_all(saves).await;
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn record_attempt_keeps_last_rotation_when_none() {
        let store = store();
        let policy = store
            .save(PolicyDraft::for_secret("p", "c", "s"), None)
            .await
            .unwrap();
        let last = Utc::now() - Duration::days(3);
        let rotated = store
            .record_attempt(&policy.policy_id, Some(last), last)
            .await
            .unwrap();
        assert_eq!(rotated.next_rotation_date, last + Duration::days(30));

        let failed_at = Utc::now();
        let updated = store
            .record_attempt(&policy.policy_id, None, failed_at)
            .await
            .unwrap();
        assert_eq!(updated.last_rotation_date, Some(last));
        assert_eq!(updated.next_rotation_date, failed_at + Duration::days(30));
    }

    #[tokio::test]
    async fn record_attempt_uses_the_stored_interval() {
        let store = store();
        let policy = store
            .save(PolicyDraft::for_secret("p", "c", "s"), None)
            .await
            .unwrap();
        // Interval edited while an attempt is running.
        store
            .save(
                PolicyDraft {
                    rotation_interval: Some(RotationInterval::parse("7d")),
                    ..PolicyDraft::default()
                },
                Some(&policy.policy_id),
            )
            .await
            .unwrap();

        let completed = Utc::now();
        let updated = store
            .record_attempt(&policy.policy_id, Some(completed), completed)
            .await
            .unwrap();
        assert_eq!(updated.rotation_interval, RotationInterval::parse("7d"));
        assert_eq!(updated.next_rotation_date, completed + Duration::days(7));
    }

    #[tokio::test]
    async fn unreadable_record_is_an_error_not_a_gap() {
        let secrets = Arc::new(SecretStore::new(
            Arc::new(MemoryBackend::new()),
            Arc::new(ChaChaCipher::new(EncryptionKey::from_bytes([9; 32]))),
        ));
        let store = VaultPolicyStore::new(Arc::clone(&secrets), PolicyDefaults::default());
        let policy = store
            .save(PolicyDraft::for_secret("p", "c", "s"), None)
            .await
            .unwrap();

        let mut record = serde_json::to_value(&policy).unwrap();
        record.as_object_mut().unwrap().remove("nextRotationDate");
        secrets
            .set_secret(
                &VaultPolicyStore::address(&policy.policy_id),
                &record.to_string(),
                SecretWrite::default(),
                Versioning::disabled(),
            )
            .await
            .unwrap();

        assert!(matches!(store.get(&policy.policy_id).await, Err(VaultError::StoreAccess(_))));
        assert!(matches!(store.list().await, Err(VaultError::StoreAccess(_))));
        assert!(store
            .save(PolicyDraft::for_secret("p", "c", "s"), None)
            .await
            .is_err());
        let records = secrets
            .list_entries(SYSTEM_PROJECT, Some(POLICY_CATEGORY))
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_only_the_policy() {
        let store = store();
        let policy = store
            .save(PolicyDraft::for_secret("p", "c", "s"), None)
            .await
            .unwrap();
        assert!(store.delete(&policy.policy_id).await.unwrap());
        assert!(!store.delete(&policy.policy_id).await.unwrap());
        assert!(store.get(&policy.policy_id).await.unwrap().is_none());
    }
}
