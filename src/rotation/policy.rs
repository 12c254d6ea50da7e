//! Rotation policy records and their wire format.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::VaultError;
use crate::vault::{SecretAddress, Versioning};

// ============================================================================
// Rotation interval
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalUnit {
    Day,
    Week,
    Month,
    Year,
}

impl IntervalUnit {
    fn parse(unit: &str) -> Option<Self> {
        match unit {
            "d" | "D" => return Some(Self::Day),
            "w" | "W" => return Some(Self::Week),
            "m" | "M" => return Some(Self::Month),
            "y" | "Y" => return Some(Self::Year),
            _ => {}
        }
        match unit.to_ascii_lowercase().as_str() {
            "day" | "days" => Some(Self::Day),
            "week" | "weeks" => Some(Self::Week),
            "mo" | "month" | "months" => Some(Self::Month),
            "year" | "years" => Some(Self::Year),
            _ => None,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Self::Day => "d",
            Self::Week => "w",
            Self::Month => "M",
            Self::Year => "y",
        }
    }
}

/// Named cadences accepted in place of a duration string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl Cadence {
    pub fn as_duration(self) -> (u32, IntervalUnit) {
        match self {
            Self::Daily => (1, IntervalUnit::Day),
            Self::Weekly => (1, IntervalUnit::Week),
            Self::Monthly => (1, IntervalUnit::Month),
            Self::Quarterly => (3, IntervalUnit::Month),
            Self::Yearly => (1, IntervalUnit::Year),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Yearly => "yearly",
        }
    }
}

/// `rotationInterval` as stored: a cadence name, `<N><unit>`, or `custom`.
///
/// Strings that fit none of these are kept verbatim in `Unparsed` so the
/// record still loads; the schedule calculator applies its fallback to them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RotationInterval {
    Cadence(Cadence),
    Every { count: u32, unit: IntervalUnit },
    Custom,
    Unparsed(String),
}

static DURATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([0-9]+)\s*([A-Za-z]+)\s*$").expect("valid interval regex"));

impl RotationInterval {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "custom" => return Self::Custom,
            "daily" => return Self::Cadence(Cadence::Daily),
            "weekly" => return Self::Cadence(Cadence::Weekly),
            "monthly" => return Self::Cadence(Cadence::Monthly),
            "quarterly" => return Self::Cadence(Cadence::Quarterly),
            "yearly" | "annually" => return Self::Cadence(Cadence::Yearly),
            _ => {}
        }

        let parsed = DURATION_RE.captures(trimmed).and_then(|caps| {
            let count = caps[1].parse::<u32>().ok().filter(|n| *n > 0)?;
            let unit = IntervalUnit::parse(&caps[2])?;
            Some(Self::Every { count, unit })
        });
        parsed.unwrap_or_else(|| Self::Unparsed(raw.to_string()))
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom)
    }
}

impl From<String> for RotationInterval {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<RotationInterval> for String {
    fn from(interval: RotationInterval) -> Self {
        interval.to_string()
    }
}

impl fmt::Display for RotationInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cadence(cadence) => f.write_str(cadence.name()),
            Self::Every { count, unit } => write!(f, "{count}{}", unit.suffix()),
            Self::Custom => f.write_str("custom"),
            Self::Unparsed(raw) => f.write_str(raw),
        }
    }
}

// ============================================================================
// Regeneration strategy
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Charset {
    #[default]
    Alphanumeric,
    Hex,
    Base64url,
    Symbols,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorParams {
    #[serde(default = "default_length")]
    pub length: usize,
    #[serde(default)]
    pub charset: Charset,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

impl Default for GeneratorParams {
    fn default() -> Self {
        Self {
            length: default_length(),
            charset: Charset::default(),
            prefix: None,
        }
    }
}

/// Value fetched from a named external system (see [`crate::sources`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalParams {
    pub system: String,
    pub reference: String,
}

/// Value produced by a delegated task; its trimmed output is the new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskParams {
    pub task: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

/// How a rotation obtains its new value. Wire form is `{kind, parameters}`.
///
/// Kinds this build does not know, or known kinds with unreadable
/// parameters, load as `Unsupported` and fail at rotation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawStrategy", into = "RawStrategy")]
pub enum RegenerationStrategy {
    Internal(GeneratorParams),
    External(ExternalParams),
    DelegatedTask(TaskParams),
    Unsupported {
        kind: String,
        parameters: serde_json::Value,
        reason: String,
    },
}

impl RegenerationStrategy {
    pub fn kind(&self) -> &str {
        match self {
            Self::Internal(_) => KIND_INTERNAL,
            Self::External(_) => KIND_EXTERNAL,
            Self::DelegatedTask(_) => KIND_DELEGATED,
            Self::Unsupported { kind, .. } => kind,
        }
    }
}

impl Default for RegenerationStrategy {
    fn default() -> Self {
        Self::Internal(GeneratorParams::default())
    }
}

const KIND_INTERNAL: &str = "internal";
const KIND_EXTERNAL: &str = "external";
const KIND_DELEGATED: &str = "delegated-task";

#[derive(Serialize, Deserialize)]
struct RawStrategy {
    kind: String,
    #[serde(default)]
    parameters: serde_json::Value,
}

impl From<RawStrategy> for RegenerationStrategy {
    fn from(raw: RawStrategy) -> Self {
        let params = if raw.parameters.is_null() {
            serde_json::Value::Object(Default::default())
        } else {
            raw.parameters.clone()
        };
        let parsed = match raw.kind.as_str() {
            KIND_INTERNAL => serde_json::from_value(params).map(Self::Internal),
            KIND_EXTERNAL => serde_json::from_value(params).map(Self::External),
            KIND_DELEGATED => serde_json::from_value(params).map(Self::DelegatedTask),
            other => {
                return Self::Unsupported {
                    kind: other.to_string(),
                    parameters: raw.parameters,
                    reason: format!("unknown regeneration strategy kind '{other}'"),
                }
            }
        };
        parsed.unwrap_or_else(|e| Self::Unsupported {
            reason: format!("invalid parameters for '{}': {e}", raw.kind),
            kind: raw.kind,
            parameters: raw.parameters,
        })
    }
}

impl From<RegenerationStrategy> for RawStrategy {
    fn from(strategy: RegenerationStrategy) -> Self {
        let kind = strategy.kind().to_string();
        let parameters = match strategy {
            RegenerationStrategy::Internal(p) => serde_json::to_value(p),
            RegenerationStrategy::External(p) => serde_json::to_value(p),
            RegenerationStrategy::DelegatedTask(p) => serde_json::to_value(p),
            RegenerationStrategy::Unsupported { parameters, .. } => Ok(parameters),
        }
        .unwrap_or_default();
        Self { kind, parameters }
    }
}

// ============================================================================
// Hooks and notifications
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookTiming {
    Pre,
    Post,
}

impl fmt::Display for HookTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pre => "pre",
            Self::Post => "post",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookAction {
    /// POST to an HTTP endpoint.
    Webhook,
    /// Run through the configured task runner.
    DelegatedTask,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookConfig {
    pub timing: HookTiming,
    pub action: HookAction,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// A failing required pre-hook aborts the rotation before the write.
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Webhook,
    Log,
    Email,
    Slack,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Webhook => "webhook",
            Self::Log => "log",
            Self::Email => "email",
            Self::Slack => "slack",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationChannel {
    #[serde(rename = "type")]
    pub kind: ChannelKind,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationConfig {
    #[serde(default)]
    pub channels: Vec<NotificationChannel>,
    #[serde(default = "default_true")]
    pub notify_on_success: bool,
    #[serde(default = "default_true")]
    pub notify_on_failure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify_before_rotation_days: Option<u32>,
}

// ============================================================================
// RotationPolicy
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationPolicy {
    pub policy_id: String,
    pub secret_name: String,
    pub project: String,
    pub category: String,
    pub is_enabled: bool,
    pub rotation_interval: RotationInterval,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_rotation_cron: Option<String>,
    pub regeneration_strategy: RegenerationStrategy,
    pub versioning_enabled: bool,
    pub max_versions_to_keep: usize,
    #[serde(default)]
    pub notifications: Vec<NotificationConfig>,
    #[serde(default)]
    pub hooks: Vec<HookConfig>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_rotation_date: Option<DateTime<Utc>>,
    pub next_rotation_date: DateTime<Utc>,
}

impl RotationPolicy {
    pub fn secret_address(&self) -> SecretAddress {
        SecretAddress::new(&self.project, &self.category, &self.secret_name)
    }

    pub fn governs(&self, project: &str, category: &str, secret_name: &str) -> bool {
        self.project == project && self.category == category && self.secret_name == secret_name
    }

    pub fn versioning(&self) -> Versioning {
        if self.versioning_enabled {
            Versioning::retain(self.max_versions_to_keep)
        } else {
            Versioning::disabled()
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_enabled && self.next_rotation_date <= now
    }

    pub fn validate(&self) -> Result<(), VaultError> {
        for (field, value) in [
            ("project", &self.project),
            ("category", &self.category),
            ("secretName", &self.secret_name),
        ] {
            if value.trim().is_empty() {
                return Err(VaultError::InvalidPolicy(format!("{field} must not be empty")));
            }
        }
        for hook in &self.hooks {
            if hook.target.trim().is_empty() {
                return Err(VaultError::InvalidPolicy(format!(
                    "{} hook has an empty target",
                    hook.timing
                )));
            }
            if hook.action == HookAction::Webhook && url::Url::parse(&hook.target).is_err() {
                return Err(VaultError::InvalidPolicy(format!(
                    "webhook hook target '{}' is not a URL",
                    hook.target
                )));
            }
        }
        for channel in self.notifications.iter().flat_map(|n| &n.channels) {
            if channel.target.trim().is_empty() {
                return Err(VaultError::InvalidPolicy(format!(
                    "{} notification channel has an empty target",
                    channel.kind
                )));
            }
        }
        Ok(())
    }
}

/// Settings used for fields a draft leaves unset when creating a policy.
#[derive(Debug, Clone)]
pub struct PolicyDefaults {
    pub rotation_interval: RotationInterval,
    pub versioning_enabled: bool,
    pub max_versions_to_keep: usize,
    pub created_by: String,
}

impl Default for PolicyDefaults {
    fn default() -> Self {
        Self {
            rotation_interval: RotationInterval::Every {
                count: 30,
                unit: IntervalUnit::Day,
            },
            versioning_enabled: true,
            max_versions_to_keep: 5,
            created_by: "vaultkeeper".to_string(),
        }
    }
}

/// Partial policy accepted by create-or-update. Unset fields keep the
/// existing value on update and take [`PolicyDefaults`] on create.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDraft {
    pub secret_name: Option<String>,
    pub project: Option<String>,
    pub category: Option<String>,
    pub is_enabled: Option<bool>,
    pub rotation_interval: Option<RotationInterval>,
    pub custom_rotation_cron: Option<String>,
    pub regeneration_strategy: Option<RegenerationStrategy>,
    pub versioning_enabled: Option<bool>,
    pub max_versions_to_keep: Option<usize>,
    pub notifications: Option<Vec<NotificationConfig>>,
    pub hooks: Option<Vec<HookConfig>>,
    pub created_by: Option<String>,
    pub last_rotation_date: Option<DateTime<Utc>>,
}

impl PolicyDraft {
    pub fn for_secret(
        project: impl Into<String>,
        category: impl Into<String>,
        secret_name: impl Into<String>,
    ) -> Self {
        Self {
            project: Some(project.into()),
            category: Some(category.into()),
            secret_name: Some(secret_name.into()),
            ..Default::default()
        }
    }

    /// The (project, category, secretName) triple, when fully specified.
    pub fn identity(&self) -> Option<(&str, &str, &str)> {
        Some((
            self.project.as_deref()?,
            self.category.as_deref()?,
            self.secret_name.as_deref()?,
        ))
    }

    /// Overlay the draft onto an existing policy. Id and creation metadata
    /// are never touched.
    pub fn apply_to(self, mut policy: RotationPolicy) -> RotationPolicy {
        if let Some(v) = self.secret_name {
            policy.secret_name = v;
        }
        if let Some(v) = self.project {
            policy.project = v;
        }
        if let Some(v) = self.category {
            policy.category = v;
        }
        if let Some(v) = self.is_enabled {
            policy.is_enabled = v;
        }
        if let Some(v) = self.rotation_interval {
            policy.rotation_interval = v;
        }
        if self.custom_rotation_cron.is_some() {
            policy.custom_rotation_cron = self.custom_rotation_cron;
        }
        if let Some(v) = self.regeneration_strategy {
            policy.regeneration_strategy = v;
        }
        if let Some(v) = self.versioning_enabled {
            policy.versioning_enabled = v;
        }
        if let Some(v) = self.max_versions_to_keep {
            policy.max_versions_to_keep = v;
        }
        if let Some(v) = self.notifications {
            policy.notifications = v;
        }
        if let Some(v) = self.hooks {
            policy.hooks = v;
        }
        if self.last_rotation_date.is_some() {
            policy.last_rotation_date = self.last_rotation_date;
        }
        policy
    }

    /// Build a brand-new policy. `next_rotation_date` is a placeholder until
    /// the store computes it.
    pub fn into_policy(
        self,
        policy_id: String,
        defaults: &PolicyDefaults,
        now: DateTime<Utc>,
    ) -> Result<RotationPolicy, VaultError> {
        let missing = |field: &str| {
            VaultError::InvalidPolicy(format!("{field} is required to create a rotation policy"))
        };
        Ok(RotationPolicy {
            policy_id,
            secret_name: self.secret_name.ok_or_else(|| missing("secretName"))?,
            project: self.project.ok_or_else(|| missing("project"))?,
            category: self.category.ok_or_else(|| missing("category"))?,
            is_enabled: self.is_enabled.unwrap_or(true),
            rotation_interval: self
                .rotation_interval
                .unwrap_or_else(|| defaults.rotation_interval.clone()),
            custom_rotation_cron: self.custom_rotation_cron,
            regeneration_strategy: self.regeneration_strategy.unwrap_or_default(),
            versioning_enabled: self.versioning_enabled.unwrap_or(defaults.versioning_enabled),
            max_versions_to_keep: self
                .max_versions_to_keep
                .unwrap_or(defaults.max_versions_to_keep),
            notifications: self.notifications.unwrap_or_default(),
            hooks: self.hooks.unwrap_or_default(),
            created_by: self
                .created_by
                .unwrap_or_else(|| defaults.created_by.clone()),
            created_at: now,
            updated_at: now,
            last_rotation_date: self.last_rotation_date,
            next_rotation_date: now,
        })
    }
}

fn default_length() -> usize {
    32
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn interval_parsing() {
        assert_eq!(
            RotationInterval::parse("30d"),
            RotationInterval::Every { count: 30, unit: IntervalUnit::Day }
        );
        assert_eq!(
            RotationInterval::parse("2 weeks"),
            RotationInterval::Every { count: 2, unit: IntervalUnit::Week }
        );
        assert_eq!(
            RotationInterval::parse("6M"),
            RotationInterval::Every { count: 6, unit: IntervalUnit::Month }
        );
        assert_eq!(
            RotationInterval::parse("1Y"),
            RotationInterval::Every { count: 1, unit: IntervalUnit::Year }
        );
        assert_eq!(RotationInterval::parse("Quarterly"), RotationInterval::Cadence(Cadence::Quarterly));
        assert_eq!(RotationInterval::parse("custom"), RotationInterval::Custom);
    }

    #[test]
    fn unparseable_intervals_are_preserved() {
        for raw in ["xd", "0d", "12 fortnights", "", "99999999999d"] {
            assert_eq!(RotationInterval::parse(raw), RotationInterval::Unparsed(raw.to_string()));
        }
        let json = serde_json::to_value(RotationInterval::parse("soonish")).unwrap();
        assert_eq!(json, json!("soonish"));
    }

    #[test]
    fn interval_serializes_canonically() {
        let json = serde_json::to_value(RotationInterval::parse("30 days")).unwrap();
        assert_eq!(json, json!("30d"));
        let back: RotationInterval = serde_json::from_value(json!("monthly")).unwrap();
        assert_eq!(back.to_string(), "monthly");
    }

    #[test]
    fn strategy_wire_format_is_kind_and_parameters() {
        let strategy = RegenerationStrategy::Internal(GeneratorParams {
            length: 48,
            charset: Charset::Hex,
            prefix: Some("sk_".into()),
        });
        let json = serde_json::to_value(&strategy).unwrap();
        assert_eq!(
            json,
            json!({"kind": "internal", "parameters": {"length": 48, "charset": "hex", "prefix": "sk_"}})
        );
        let back: RegenerationStrategy = serde_json::from_value(json).unwrap();
        assert_eq!(back, strategy);
    }

    #[test]
    fn internal_strategy_without_parameters_uses_defaults() {
        let strategy: RegenerationStrategy = serde_json::from_value(json!({"kind": "internal"})).unwrap();
        assert_eq!(strategy, RegenerationStrategy::Internal(GeneratorParams::default()));
    }

    #[test]
    fn unknown_strategy_kind_is_kept_as_unsupported() {
        let raw = json!({"kind": "quantum", "parameters": {"qubits": 4}});
        let strategy: RegenerationStrategy = serde_json::from_value(raw.clone()).unwrap();
        assert!(matches!(&strategy, RegenerationStrategy::Unsupported { kind, .. } if kind == "quantum"));
        assert_eq!(serde_json::to_value(&strategy).unwrap(), raw);
    }

    #[test]
    fn known_kind_with_bad_parameters_is_unsupported() {
        let strategy: RegenerationStrategy =
            serde_json::from_value(json!({"kind": "external", "parameters": {"system": 3}})).unwrap();
        match strategy {
            RegenerationStrategy::Unsupported { kind, reason, .. } => {
                assert_eq!(kind, "external");
                assert!(reason.contains("invalid parameters"));
            }
            other => panic!("expected unsupported, got {other:?}"),
        }
    }

    #[test]
    fn hook_and_notification_wire_names() {
        let hook: HookConfig = serde_json::from_value(json!({
            "timing": "pre",
            "action": "delegated-task",
            "target": "drain-connections",
            "timeoutSeconds": 5
        }))
        .unwrap();
        assert_eq!(hook.action, HookAction::DelegatedTask);
        assert!(!hook.required);

        let notification: NotificationConfig = serde_json::from_value(json!({
            "channels": [{"type": "slack", "target": "#ops"}],
            "notifyOnSuccess": false,
            "notifyBeforeRotationDays": 3
        }))
        .unwrap();
        assert_eq!(notification.channels[0].kind, ChannelKind::Slack);
        assert!(!notification.notify_on_success);
        assert!(notification.notify_on_failure);
        assert_eq!(notification.notify_before_rotation_days, Some(3));
    }

    #[test]
    fn draft_requires_identity_on_create() {
        let err = PolicyDraft {
            project: Some("p".into()),
            ..Default::default()
        }
        .into_policy("id".into(), &PolicyDefaults::default(), Utc::now())
        .unwrap_err();
        assert!(err.to_string().contains("secretName"));
    }

    #[test]
    fn draft_overlay_keeps_identity_fields() {
        let now = Utc::now();
        let policy = PolicyDraft::for_secret("p", "c", "s")
            .into_policy("rp_1".into(), &PolicyDefaults::default(), now)
            .unwrap();
        let updated = PolicyDraft {
            is_enabled: Some(false),
            ..Default::default()
        }
        .apply_to(policy.clone());

        assert_eq!(updated.policy_id, "rp_1");
        assert_eq!(updated.created_at, policy.created_at);
        assert!(!updated.is_enabled);
        assert_eq!(updated.rotation_interval, RotationInterval::parse("30d"));
    }

    #[test]
    fn validate_rejects_bad_webhook_target() {
        let mut policy = PolicyDraft::for_secret("p", "c", "s")
            .into_policy("rp_1".into(), &PolicyDefaults::default(), Utc::now())
            .unwrap();
        policy.hooks.push(HookConfig {
            timing: HookTiming::Post,
            action: HookAction::Webhook,
            target: "not a url".into(),
            timeout_seconds: None,
            payload: None,
            required: false,
        });
        assert!(matches!(policy.validate(), Err(VaultError::InvalidPolicy(_))));
    }
}
