//! File-backed vault and scheduler flows through the service layer.

use chrono::{Duration, TimeZone, Utc};
use tempfile::TempDir;

use vaultkeeper::config::Config;
use vaultkeeper::error::VaultError;
use vaultkeeper::rotation::{PolicyDraft, RotationInterval, RotationStatus};
use vaultkeeper::service::VaultService;
use vaultkeeper::vault::{meta_keys, SecretAddress, SecretWrite};

/// Config rooted at a temp dir whose master key lives in `key_env`.
fn config_in(dir: &TempDir, key_env: &str) -> Config {
    let mut config = Config {
        state_dir: dir.path().to_path_buf(),
        ..Config::default()
    };
    config.vault.master_key_env = key_env.to_string();
    config
}

#[tokio::test]
async fn values_survive_reopen_and_stay_sealed_on_disk() {
    let dir = TempDir::new().unwrap();
    let key_env = "VAULTKEEPER_TEST_KEY_REOPEN";
    std::env::set_var(key_env, "correct horse battery staple");
    let config = config_in(&dir, key_env);
    let address = SecretAddress::new("billing", "db", "password");

    {
        let service = VaultService::open(&config).unwrap();
        service
            .set_secret(
                &address,
                "hunter2-but-longer",
                SecretWrite {
                    description: Some("primary database".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    let raw = std::fs::read(config.vault_path()).unwrap();
    let plaintext = b"hunter2-but-longer";
    assert!(!raw.is_empty());
    assert!(!raw.windows(plaintext.len()).any(|w| w == plaintext));
    assert!(!raw.windows(b"primary database".len()).any(|w| w == b"primary database"));
    assert!(config.salt_path().exists());

    let reopened = VaultService::open(&config).unwrap();
    let entry = reopened.get_secret(&address).await.unwrap().unwrap();
    assert_eq!(entry.description, "primary database");
    assert_eq!(entry.meta_value(meta_keys::SOURCE), Some("manual"));
    assert_eq!(
        reopened.reveal_secret(&address).await.unwrap().unwrap().as_str(),
        "hunter2-but-longer"
    );
}

#[tokio::test]
async fn wrong_master_key_cannot_reveal() {
    let dir = TempDir::new().unwrap();
    let key_env = "VAULTKEEPER_TEST_KEY_WRONG";
    std::env::set_var(key_env, "first key");
    let config = config_in(&dir, key_env);
    let address = SecretAddress::new("app", "api", "token");

    VaultService::open(&config)
        .unwrap()
        .set_secret(&address, "t0ken", SecretWrite::default())
        .await
        .unwrap();

    std::env::set_var(key_env, "second key");
    let service = VaultService::open(&config).unwrap();
    assert!(matches!(
        service.reveal_secret(&address).await,
        Err(VaultError::StoreAccess(_))
    ));
    assert!(service.list_projects().await.is_err());
}

#[tokio::test]
async fn missing_master_key_is_reported() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir, "VAULTKEEPER_TEST_KEY_UNSET");
    let err = VaultService::open(&config).err().unwrap();
    assert!(err.to_string().contains("VAULTKEEPER_TEST_KEY_UNSET"));
}

#[tokio::test]
async fn scheduler_rotates_overdue_policies_and_advances_schedule() {
    let dir = TempDir::new().unwrap();
    let key_env = "VAULTKEEPER_TEST_KEY_SCHEDULER";
    std::env::set_var(key_env, "scheduler key");
    let config = config_in(&dir, key_env);
    let service = VaultService::open(&config).unwrap();

    let overdue = service
        .save_policy(
            PolicyDraft {
                rotation_interval: Some(RotationInterval::parse("7d")),
                last_rotation_date: Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()),
                max_versions_to_keep: Some(2),
                ..PolicyDraft::for_secret("billing", "stripe", "webhook_secret")
            },
            None,
        )
        .await
        .unwrap();
    let fresh = service
        .save_policy(PolicyDraft::for_secret("billing", "stripe", "api_key"), None)
        .await
        .unwrap();
    let disabled = service
        .save_policy(
            PolicyDraft {
                is_enabled: Some(false),
                last_rotation_date: Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()),
                ..PolicyDraft::for_secret("billing", "stripe", "legacy")
            },
            None,
        )
        .await
        .unwrap();

    let scheduler = service.scheduler();
    let due: Vec<String> = scheduler
        .due_policies(Utc::now())
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.policy_id)
        .collect();
    assert_eq!(due, vec![overdue.policy_id.clone()]);

    let tick = scheduler.tick().await.unwrap();
    assert_eq!(tick.dispatched, vec![overdue.policy_id.clone()]);
    let reports = tick.join().await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status, RotationStatus::Succeeded);

    let entry = service
        .get_secret(&SecretAddress::new("billing", "stripe", "webhook_secret"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.version, 1);
    assert_eq!(entry.meta_value(meta_keys::ROTATION_POLICY_ID), Some(overdue.policy_id.as_str()));

    let stored = service.get_policy(&overdue.policy_id).await.unwrap().unwrap();
    let last = stored.last_rotation_date.unwrap();
    assert!(last > Utc::now() - Duration::minutes(1));
    assert_eq!(stored.next_rotation_date, last + Duration::days(7));

    // Nothing is due any more.
    let second = scheduler.tick().await.unwrap();
    assert!(second.dispatched.is_empty());
    assert!(service.get_policy(&fresh.policy_id).await.unwrap().unwrap().last_rotation_date.is_none());
    assert!(service
        .get_secret(&SecretAddress::new("billing", "stripe", "legacy"))
        .await
        .unwrap()
        .is_none());
    assert!(!service.get_policy(&disabled.policy_id).await.unwrap().unwrap().is_enabled);
}
