//! Rotation outcome and reminder notifications.
//!
//! Delivery is best effort: failures are logged and reported back, never
//! propagated.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::hooks::{http_client, post_signed};
use super::policy::{ChannelKind, NotificationChannel, NotificationConfig, RotationPolicy};

const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RotationEvent {
    #[serde(rename = "rotation.succeeded")]
    Succeeded,
    #[serde(rename = "rotation.failed")]
    Failed,
    #[serde(rename = "rotation.upcoming")]
    Upcoming,
}

impl RotationEvent {
    fn wanted_by(self, config: &NotificationConfig) -> bool {
        match self {
            Self::Succeeded => config.notify_on_success,
            Self::Failed => config.notify_on_failure,
            Self::Upcoming => config.notify_before_rotation_days.is_some(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationMessage {
    pub event: RotationEvent,
    pub policy_id: String,
    pub project: String,
    pub category: String,
    pub secret_name: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl NotificationMessage {
    pub fn for_policy(event: RotationEvent, policy: &RotationPolicy, detail: Option<String>) -> Self {
        Self {
            event,
            policy_id: policy.policy_id.clone(),
            project: policy.project.clone(),
            category: policy.category.clone(),
            secret_name: policy.secret_name.clone(),
            timestamp: Utc::now(),
            detail,
        }
    }
}

/// Transport for one channel type.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, target: &str, message: &NotificationMessage) -> Result<(), String>;
}

/// POSTs the message as JSON to the channel target.
pub struct WebhookSink {
    client: reqwest::Client,
    signing_secret: Option<String>,
}

impl WebhookSink {
    pub fn new(signing_secret: Option<String>) -> Self {
        Self {
            client: http_client(),
            signing_secret,
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn deliver(&self, target: &str, message: &NotificationMessage) -> Result<(), String> {
        let body = serde_json::to_string(message).map_err(|e| e.to_string())?;
        post_signed(&self.client, target, body, self.signing_secret.as_deref()).await
    }
}

/// Emits the message through `tracing`.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, target: &str, message: &NotificationMessage) -> Result<(), String> {
        info!(
            channel = target,
            event = ?message.event,
            policy_id = %message.policy_id,
            secret = %format!("{}/{}/{}", message.project, message.category, message.secret_name),
            detail = message.detail.as_deref().unwrap_or(""),
            "rotation notification"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub channel: ChannelKind,
    pub target: String,
    pub error: Option<String>,
}

pub struct Notifier {
    sinks: HashMap<ChannelKind, Arc<dyn NotificationSink>>,
    timeout: Duration,
}

impl Notifier {
    /// Notifier without sinks; every channel reports a delivery failure.
    pub fn new(timeout: Duration) -> Self {
        Self {
            sinks: HashMap::new(),
            timeout,
        }
    }

    /// Webhook and log sinks registered.
    pub fn with_default_sinks(signing_secret: Option<String>, timeout: Duration) -> Self {
        let mut notifier = Self::new(timeout);
        notifier.register(ChannelKind::Webhook, Arc::new(WebhookSink::new(signing_secret)));
        notifier.register(ChannelKind::Log, Arc::new(LogSink));
        notifier
    }

    pub fn register(&mut self, kind: ChannelKind, sink: Arc<dyn NotificationSink>) {
        self.sinks.insert(kind, sink);
    }

    /// Deliver `message` on every channel of every notification config of
    /// `policy` that asks for this kind of event.
    pub async fn dispatch(
        &self,
        policy: &RotationPolicy,
        message: &NotificationMessage,
    ) -> Vec<DeliveryOutcome> {
        let channels: Vec<&NotificationChannel> = policy
            .notifications
            .iter()
            .filter(|config| message.event.wanted_by(config))
            .flat_map(|config| &config.channels)
            .collect();

        let deliveries = channels.into_iter().map(|channel| async move {
            let error = self.deliver(channel, message).await.err();
            if let Some(reason) = &error {
                warn!(
                    policy_id = %policy.policy_id,
                    channel = %channel.kind,
                    target = %channel.target,
                    %reason,
                    "notification delivery failed"
                );
            }
            DeliveryOutcome {
                channel: channel.kind,
                target: channel.target.clone(),
                error,
            }
        });
        futures::future::join_all(deliveries).await
    }

    async fn deliver(
        &self,
        channel: &NotificationChannel,
        message: &NotificationMessage,
    ) -> Result<(), String> {
        let sink = self
            .sinks
            .get(&channel.kind)
            .ok_or_else(|| format!("no sink registered for {} channels", channel.kind))?;
        tokio::time::timeout(self.timeout, sink.deliver(&channel.target, message))
            .await
            .map_err(|_| format!("timed out after {}s", self.timeout.as_secs()))?
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::with_default_sinks(None, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }
}
