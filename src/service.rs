//! Operator-facing operations over the vault and the rotation engine.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::config::Config;
use crate::error::{VaultError, VaultResult};
use crate::rotation::{
    HookRunner, Notifier, PolicyDraft, PolicyStore, RotationExecutor, RotationPolicy,
    RotationReport, Scheduler, SchedulerSettings, ValueGenerator, VaultPolicyStore,
    SYSTEM_PROJECT,
};
use crate::sources::{CommandTaskRunner, SourceRegistry};
use crate::vault::cipher::{generate_salt, SALT_LEN};
use crate::vault::{
    meta_keys, ChaChaCipher, EncryptionKey, FileBackend, SecretAddress, SecretEntry, SecretStore,
    SecretSummary, SecretWrite, VaultBackend, VaultCipher, Versioning,
};

pub struct VaultService {
    secrets: Arc<SecretStore>,
    policies: Arc<dyn PolicyStore>,
    executor: Arc<RotationExecutor>,
    default_versioning: Versioning,
    scheduler_settings: SchedulerSettings,
}

impl VaultService {
    /// Open the file-backed vault described by `config`, deriving the key
    /// from the master key environment variable and the persisted salt.
    pub fn open(config: &Config) -> Result<Self> {
        let env_name = &config.vault.master_key_env;
        let master_key = Zeroizing::new(std::env::var(env_name).with_context(|| {
            format!("Master key environment variable '{env_name}' is not set")
        })?);

        let vault_path = config.vault_path();
        let salt = load_or_create_salt(&config.salt_path(), vault_path.exists())?;
        let key = EncryptionKey::derive(&master_key, &salt).context("Cannot derive vault key")?;

        info!(vault = %vault_path.display(), "opening vault");
        Ok(Self::with_backend(
            config,
            Arc::new(FileBackend::new(vault_path)),
            Arc::new(ChaChaCipher::new(key)),
        ))
    }

    /// Wire every component over the given backend and cipher.
    pub fn with_backend(
        config: &Config,
        backend: Arc<dyn VaultBackend>,
        cipher: Arc<dyn VaultCipher>,
    ) -> Self {
        let secrets = Arc::new(SecretStore::new(backend, cipher));
        let policies: Arc<dyn PolicyStore> = Arc::new(VaultPolicyStore::new(
            Arc::clone(&secrets),
            config.policy_defaults(),
        ));

        let tasks = Arc::new(CommandTaskRunner::new(config.tasks.cwd.clone()));
        let generator = ValueGenerator::new(
            SourceRegistry::with_builtin(config.tasks.cwd.clone()),
            tasks.clone(),
            Duration::from_secs(config.tasks.timeout_secs),
        );
        let hooks = HookRunner::new(tasks, config.hook_settings());
        let notifier = Notifier::with_default_sinks(
            config.hooks.signing_secret.clone(),
            Duration::from_secs(config.notifications.timeout_secs),
        );
        let executor = Arc::new(RotationExecutor::new(
            Arc::clone(&policies),
            Arc::clone(&secrets),
            generator,
            hooks,
            Arc::new(notifier),
        ));

        let default_versioning = if config.rotation.versioning_enabled {
            Versioning::retain(config.rotation.max_versions_to_keep)
        } else {
            Versioning::disabled()
        };

        Self {
            secrets,
            policies,
            executor,
            default_versioning,
            scheduler_settings: config.scheduler_settings(),
        }
    }

    pub fn executor(&self) -> &Arc<RotationExecutor> {
        &self.executor
    }

    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(Arc::clone(&self.executor), self.scheduler_settings.clone())
    }

    // ------------------------------------------------------------------
    // Policies
    // ------------------------------------------------------------------

    pub async fn save_policy(
        &self,
        draft: PolicyDraft,
        policy_id: Option<&str>,
    ) -> VaultResult<RotationPolicy> {
        if draft.project.as_deref() == Some(SYSTEM_PROJECT) {
            return Err(VaultError::ReservedNamespace(SYSTEM_PROJECT.to_string()));
        }
        self.policies.save(draft, policy_id).await
    }

    pub async fn get_policy(&self, policy_id: &str) -> VaultResult<Option<RotationPolicy>> {
        self.policies.get(policy_id).await
    }

    pub async fn list_policies(&self) -> VaultResult<Vec<RotationPolicy>> {
        self.policies.list().await
    }

    /// Delete a policy. The governed secret is left alone.
    pub async fn delete_policy(&self, policy_id: &str) -> VaultResult<bool> {
        self.policies.delete(policy_id).await
    }

    pub async fn rotate_now(&self, policy_id: &str) -> RotationReport {
        self.executor.rotate(policy_id).await
    }

    // ------------------------------------------------------------------
    // Secrets
    // ------------------------------------------------------------------

    pub async fn get_secret(&self, address: &SecretAddress) -> VaultResult<Option<SecretEntry>> {
        reject_reserved(&address.project)?;
        self.secrets.get(address).await
    }

    pub async fn reveal_secret(
        &self,
        address: &SecretAddress,
    ) -> VaultResult<Option<Zeroizing<String>>> {
        reject_reserved(&address.project)?;
        match self.secrets.get(address).await? {
            Some(entry) => Ok(Some(self.secrets.reveal(&entry)?)),
            None => Ok(None),
        }
    }

    /// Manual write. Uses the versioning settings of the policy governing
    /// the secret when there is one, otherwise the configured defaults.
    pub async fn set_secret(
        &self,
        address: &SecretAddress,
        value: &str,
        write: SecretWrite,
    ) -> VaultResult<SecretEntry> {
        reject_reserved(&address.project)?;
        let versioning = self
            .governing_policies(address)
            .await?
            .first()
            .map(RotationPolicy::versioning)
            .unwrap_or(self.default_versioning);
        let write = if write.meta.contains_key(meta_keys::SOURCE) {
            write
        } else {
            write.with_meta(meta_keys::SOURCE, "manual")
        };
        self.secrets.set_secret(address, value, write, versioning).await
    }

    /// Delete a secret. Policies pointing at it are kept; they are logged so
    /// the operator can clean them up.
    pub async fn delete_secret(&self, address: &SecretAddress) -> VaultResult<bool> {
        reject_reserved(&address.project)?;
        let deleted = self.secrets.delete(address).await?;
        if deleted {
            let orphaned: Vec<String> = self
                .governing_policies(address)
                .await?
                .into_iter()
                .map(|p| p.policy_id)
                .collect();
            if !orphaned.is_empty() {
                warn!(
                    secret = %address,
                    policies = ?orphaned,
                    "deleted secret is still referenced by rotation policies"
                );
            }
        }
        Ok(deleted)
    }

    pub async fn list_secrets(
        &self,
        project: &str,
        category: Option<&str>,
    ) -> VaultResult<Vec<SecretSummary>> {
        reject_reserved(project)?;
        self.secrets.list_secrets(project, category).await
    }

    pub async fn create_project(&self, name: &str) -> VaultResult<bool> {
        reject_reserved(name)?;
        self.secrets.create_project(name).await
    }

    /// Operator projects; the engine's reserved project is hidden.
    pub async fn list_projects(&self) -> VaultResult<Vec<String>> {
        Ok(self
            .secrets
            .list_projects()
            .await?
            .into_iter()
            .filter(|p| p != SYSTEM_PROJECT)
            .collect())
    }

    async fn governing_policies(&self, address: &SecretAddress) -> VaultResult<Vec<RotationPolicy>> {
        Ok(self
            .policies
            .list()
            .await?
            .into_iter()
            .filter(|p| p.governs(&address.project, &address.category, &address.key))
            .collect())
    }
}

fn reject_reserved(project: &str) -> VaultResult<()> {
    if project == SYSTEM_PROJECT {
        return Err(VaultError::ReservedNamespace(project.to_string()));
    }
    Ok(())
}

/// Read the key-derivation salt, creating it for a brand-new vault.
fn load_or_create_salt(path: &Path, vault_exists: bool) -> Result<Vec<u8>> {
    match std::fs::read(path) {
        Ok(salt) if salt.len() == SALT_LEN => Ok(salt),
        Ok(salt) => bail!(
            "Salt file '{}' is {} bytes, expected {SALT_LEN}",
            path.display(),
            salt.len()
        ),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if vault_exists {
                bail!(
                    "Salt file '{}' is missing but the vault exists; it cannot be decrypted",
                    path.display()
                );
            }
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Cannot create '{}'", dir.display()))?;
            }
            let salt = generate_salt();
            std::fs::write(path, salt)
                .with_context(|| format!("Cannot write salt file '{}'", path.display()))?;
            info!(path = %path.display(), "created vault salt");
            Ok(salt.to_vec())
        }
        Err(e) => Err(e).with_context(|| format!("Cannot read salt file '{}'", path.display())),
    }
}
