//! Pre/post rotation hooks.
//!
//! Hooks of one timing run concurrently, bounded by a semaphore, each under
//! its own timeout. Results come back over an mpsc channel and are returned
//! in declaration order; a hook failure is a value, never an `Err`.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, warn};

use super::policy::{HookAction, HookConfig, HookTiming, RotationPolicy};
use crate::sources::{TaskError, TaskRequest, TaskRunner};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying `sha256=<hex>` when a signing secret is configured.
pub const SIGNATURE_HEADER: &str = "X-Vaultkeeper-Signature";

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_CONCURRENT: usize = 4;

#[derive(Debug, Clone)]
pub struct HookSettings {
    pub default_timeout: Duration,
    pub max_concurrent: usize,
    pub signing_secret: Option<String>,
}

impl Default for HookSettings {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            signing_secret: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookResult {
    Ok,
    Failed(String),
    TimedOut(Duration),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HookOutcome {
    /// Position of the hook in the policy's `hooks` list.
    pub index: usize,
    pub timing: HookTiming,
    pub action: HookAction,
    pub target: String,
    pub required: bool,
    pub result: HookResult,
}

impl HookOutcome {
    pub fn succeeded(&self) -> bool {
        self.result == HookResult::Ok
    }

    /// A required hook that did not succeed.
    pub fn is_blocking(&self) -> bool {
        self.required && !self.succeeded()
    }
}

/// JSON body POSTed to webhook hooks and handed to delegated hook tasks.
/// Never carries the secret value.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookEvent {
    pub event: String,
    pub policy_id: String,
    pub project: String,
    pub category: String,
    pub secret_name: String,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

#[derive(Clone)]
pub struct HookRunner {
    client: reqwest::Client,
    tasks: Arc<dyn TaskRunner>,
    limit: Arc<Semaphore>,
    default_timeout: Duration,
    signing_secret: Option<Arc<str>>,
}

impl HookRunner {
    pub fn new(tasks: Arc<dyn TaskRunner>, settings: HookSettings) -> Self {
        Self {
            client: http_client(),
            tasks,
            limit: Arc::new(Semaphore::new(settings.max_concurrent.max(1))),
            default_timeout: settings.default_timeout,
            signing_secret: settings.signing_secret.map(Arc::from),
        }
    }

    /// Run every hook of `timing` declared on `policy`.
    pub async fn run(&self, timing: HookTiming, policy: &RotationPolicy) -> Vec<HookOutcome> {
        let hooks: Vec<(usize, HookConfig)> = policy
            .hooks
            .iter()
            .enumerate()
            .filter(|(_, hook)| hook.timing == timing)
            .map(|(index, hook)| (index, hook.clone()))
            .collect();
        if hooks.is_empty() {
            return Vec::new();
        }

        let (tx, mut rx) = mpsc::channel(hooks.len());
        for (index, hook) in hooks {
            let runner = self.clone();
            let tx = tx.clone();
            let event = self.event(timing, policy, hook.payload.clone());
            tokio::spawn(async move {
                let result = match runner.limit.clone().acquire_owned().await {
                    Ok(_permit) => runner.invoke(&hook, &event).await,
                    Err(_) => HookResult::Failed("hook runner is shut down".into()),
                };
                let _ = tx
                    .send(HookOutcome {
                        index,
                        timing,
                        action: hook.action,
                        target: hook.target,
                        required: hook.required,
                        result,
                    })
                    .await;
            });
        }
        drop(tx);

        let mut outcomes = Vec::new();
        while let Some(outcome) = rx.recv().await {
            match &outcome.result {
                HookResult::Ok => debug!(
                    policy_id = %policy.policy_id,
                    %timing,
                    target = %outcome.target,
                    "hook succeeded"
                ),
                HookResult::Failed(reason) => warn!(
                    policy_id = %policy.policy_id,
                    %timing,
                    target = %outcome.target,
                    required = outcome.required,
                    %reason,
                    "hook failed"
                ),
                HookResult::TimedOut(after) => warn!(
                    policy_id = %policy.policy_id,
                    %timing,
                    target = %outcome.target,
                    required = outcome.required,
                    timeout_secs = after.as_secs(),
                    "hook timed out"
                ),
            }
            outcomes.push(outcome);
        }
        outcomes.sort_by_key(|o| o.index);
        outcomes
    }

    fn event(
        &self,
        timing: HookTiming,
        policy: &RotationPolicy,
        payload: Option<serde_json::Value>,
    ) -> HookEvent {
        HookEvent {
            event: format!("rotation.{timing}"),
            policy_id: policy.policy_id.clone(),
            project: policy.project.clone(),
            category: policy.category.clone(),
            secret_name: policy.secret_name.clone(),
            timestamp: Utc::now(),
            payload: payload.unwrap_or(serde_json::Value::Null),
        }
    }

    async fn invoke(&self, hook: &HookConfig, event: &HookEvent) -> HookResult {
        let timeout = hook
            .timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);

        let call = async {
            match hook.action {
                HookAction::Webhook => match self.post_webhook(&hook.target, event).await {
                    Ok(()) => HookResult::Ok,
                    Err(reason) => HookResult::Failed(reason),
                },
                HookAction::DelegatedTask => self.run_task(&hook.target, event, timeout).await,
            }
        };
        tokio::time::timeout(timeout, call)
            .await
            .unwrap_or(HookResult::TimedOut(timeout))
    }

    async fn post_webhook(&self, url: &str, event: &HookEvent) -> Result<(), String> {
        let body = serde_json::to_string(event).map_err(|e| e.to_string())?;
        post_signed(&self.client, url, body, self.signing_secret.as_deref()).await
    }

    async fn run_task(&self, task: &str, event: &HookEvent, timeout: Duration) -> HookResult {
        let context = match serde_json::to_value(event) {
            Ok(context) => context,
            Err(e) => return HookResult::Failed(e.to_string()),
        };
        let request = TaskRequest {
            task: task.to_string(),
            args: Vec::new(),
            context,
            timeout,
        };
        match self.tasks.run(request).await {
            Ok(_) => HookResult::Ok,
            Err(TaskError::TimedOut { timeout, .. }) => HookResult::TimedOut(timeout),
            Err(e) => HookResult::Failed(e.to_string()),
        }
    }
}

// ============================================================================
// HTTP helpers (shared with webhook notifications)
// ============================================================================

pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(concat!("vaultkeeper/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_default()
}

/// POST a JSON body, signing it when `signing_secret` is set. Non-2xx
/// responses are failures.
pub(crate) async fn post_signed(
    client: &reqwest::Client,
    url: &str,
    body: String,
    signing_secret: Option<&str>,
) -> Result<(), String> {
    let mut request = client
        .post(url)
        .header(reqwest::header::CONTENT_TYPE, "application/json");
    if let Some(secret) = signing_secret {
        request = request.header(
            SIGNATURE_HEADER,
            format!("sha256={}", compute_signature(secret, &body)),
        );
    }
    let response = request.body(body).send().await.map_err(|e| e.to_string())?;
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(format!("{url} answered {status}"))
    }
}

/// HMAC-SHA256 hex digest of `body`.
pub fn compute_signature(secret: &str, body: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}
