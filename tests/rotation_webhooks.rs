//! Rotation hooks and notifications delivered over HTTP.

use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use vaultkeeper::config::Config;
use vaultkeeper::rotation::hooks::{compute_signature, SIGNATURE_HEADER};
use vaultkeeper::rotation::policy::{
    ChannelKind, HookAction, HookConfig, HookTiming, NotificationChannel, NotificationConfig,
};
use vaultkeeper::rotation::{PolicyDraft, RotationFailure, RotationStatus};
use vaultkeeper::service::VaultService;
use vaultkeeper::vault::{ChaChaCipher, EncryptionKey, MemoryBackend, SecretAddress};

const SIGNING_SECRET: &str = "whsec_test";

fn service() -> VaultService {
    let mut config = Config::default();
    config.hooks.signing_secret = Some(SIGNING_SECRET.to_string());
    VaultService::with_backend(
        &config,
        Arc::new(MemoryBackend::new()),
        Arc::new(ChaChaCipher::new(EncryptionKey::from_bytes([9; 32]))),
    )
}

fn webhook(timing: HookTiming, url: String, required: bool) -> HookConfig {
    HookConfig {
        timing,
        action: HookAction::Webhook,
        target: url,
        timeout_seconds: Some(5),
        payload: Some(json!({ "service": "billing-api" })),
        required,
    }
}

fn notify_to(url: String) -> NotificationConfig {
    NotificationConfig {
        channels: vec![NotificationChannel {
            kind: ChannelKind::Webhook,
            target: url,
        }],
        notify_on_success: true,
        notify_on_failure: true,
        notify_before_rotation_days: None,
    }
}

fn requests_to<'a>(requests: &'a [Request], route: &str) -> Vec<&'a Request> {
    requests.iter().filter(|r| r.url.path() == route).collect()
}

fn assert_signed(request: &Request) {
    let body = String::from_utf8(request.body.clone()).unwrap();
    let header = request
        .headers
        .get(SIGNATURE_HEADER)
        .expect("signature header")
        .to_str()
        .unwrap();
    assert_eq!(header, format!("sha256={}", compute_signature(SIGNING_SECRET, &body)));
}

#[tokio::test]
async fn hooks_and_notifications_are_signed_and_never_carry_the_value() {
    let server = MockServer::start().await;
    for route in ["/pre", "/post", "/notify"] {
        Mock::given(method("POST"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
    }

    let service = service();
    let policy = service
        .save_policy(
            PolicyDraft {
                hooks: Some(vec![
                    webhook(HookTiming::Pre, format!("{}/pre", server.uri()), true),
                    webhook(HookTiming::Post, format!("{}/post", server.uri()), false),
                ]),
                notifications: Some(vec![notify_to(format!("{}/notify", server.uri()))]),
                ..PolicyDraft::for_secret("billing", "stripe", "api_key")
            },
            None,
        )
        .await
        .unwrap();

    let report = service.rotate_now(&policy.policy_id).await;
    assert_eq!(report.status, RotationStatus::Succeeded);
    assert_eq!(report.hooks.len(), 2);
    assert!(report.notifications.iter().all(|n| n.error.is_none()));

    let value = service
        .reveal_secret(&SecretAddress::new("billing", "stripe", "api_key"))
        .await
        .unwrap()
        .unwrap();
    let requests = server.received_requests().await.unwrap();

    let pre = requests_to(&requests, "/pre");
    let body: Value = serde_json::from_slice(&pre[0].body).unwrap();
    assert_eq!(body["event"], "rotation.pre");
    assert_eq!(body["policyId"], policy.policy_id.as_str());
    assert_eq!(body["secretName"], "api_key");
    assert_eq!(body["payload"]["service"], "billing-api");

    let post: Value = serde_json::from_slice(&requests_to(&requests, "/post")[0].body).unwrap();
    assert_eq!(post["event"], "rotation.post");

    let notify: Value =
        serde_json::from_slice(&requests_to(&requests, "/notify")[0].body).unwrap();
    assert_eq!(notify["event"], "rotation.succeeded");

    for request in &requests {
        assert_signed(request);
        let body = String::from_utf8(request.body.clone()).unwrap();
        assert!(!body.contains(value.as_str()));
    }
}

#[tokio::test]
async fn failing_required_pre_hook_blocks_the_write_and_reports_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/pre"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/notify"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let service = service();
    let address = SecretAddress::new("billing", "stripe", "api_key");
    service
        .set_secret(&address, "original", Default::default())
        .await
        .unwrap();
    let policy = service
        .save_policy(
            PolicyDraft {
                hooks: Some(vec![webhook(
                    HookTiming::Pre,
                    format!("{}/pre", server.uri()),
                    true,
                )]),
                notifications: Some(vec![notify_to(format!("{}/notify", server.uri()))]),
                ..PolicyDraft::for_secret("billing", "stripe", "api_key")
            },
            None,
        )
        .await
        .unwrap();

    let report = service.rotate_now(&policy.policy_id).await;
    assert_eq!(report.status, RotationStatus::Failed);
    assert!(!report.value_written);
    assert!(matches!(
        report.failure,
        Some(RotationFailure::RequiredHook { timing: HookTiming::Pre, .. })
    ));
    assert_eq!(
        service.reveal_secret(&address).await.unwrap().unwrap().as_str(),
        "original"
    );

    let requests = server.received_requests().await.unwrap();
    let notify: Value =
        serde_json::from_slice(&requests_to(&requests, "/notify")[0].body).unwrap();
    assert_eq!(notify["event"], "rotation.failed");
    assert!(notify["detail"].as_str().unwrap().contains("/pre"));

    let stored = service.get_policy(&policy.policy_id).await.unwrap().unwrap();
    assert_eq!(stored.last_rotation_date, None);
    assert!(stored.next_rotation_date > policy.next_rotation_date - chrono::Duration::days(1));
}

#[tokio::test]
async fn notification_delivery_failure_does_not_fail_the_rotation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/notify"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let service = service();
    let policy = service
        .save_policy(
            PolicyDraft {
                notifications: Some(vec![notify_to(format!("{}/notify", server.uri()))]),
                ..PolicyDraft::for_secret("billing", "db", "password")
            },
            None,
        )
        .await
        .unwrap();

    let report = service.rotate_now(&policy.policy_id).await;
    assert_eq!(report.status, RotationStatus::Succeeded);
    assert_eq!(report.notifications.len(), 1);
    assert!(report.notifications[0].error.is_some());
}
