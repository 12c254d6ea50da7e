//! One rotation, end to end.
//!
//! `Pending → Generating → PreHooks → Writing → PostHooks → Notifying → Done`.
//! A failure after the policy is loaded skips the remaining work stages but
//! still notifies and reschedules. A policy that is missing or disabled
//! produces a failed report with no side effects.

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::generator::ValueGenerator;
use super::hooks::{HookOutcome, HookRunner};
use super::notify::{DeliveryOutcome, NotificationMessage, Notifier, RotationEvent};
use super::policy::{HookTiming, RotationPolicy};
use super::policy_store::PolicyStore;
use crate::vault::{meta_keys, SecretStore, SecretWrite};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationStage {
    Pending,
    Generating,
    PreHooks,
    Writing,
    PostHooks,
    Notifying,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationStatus {
    Succeeded,
    Failed,
    /// Another rotation of the same policy held the claim.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RotationFailure {
    #[error("rotation policy '{0}' not found")]
    PolicyNotFound(String),

    #[error("rotation policy '{0}' is disabled")]
    PolicyDisabled(String),

    #[error("policy store unavailable: {0}")]
    PolicyStore(String),

    #[error("value generation failed: {0}")]
    Regeneration(String),

    #[error("required {timing} hook '{target}' did not succeed")]
    RequiredHook { timing: HookTiming, target: String },

    #[error("secret write failed: {0}")]
    Write(String),
}

#[derive(Debug, Clone)]
pub struct RotationReport {
    pub policy_id: String,
    pub status: RotationStatus,
    pub failure: Option<RotationFailure>,
    /// Whether the new value reached the vault. A failed report with
    /// `value_written` means the rotation was partially applied.
    pub value_written: bool,
    /// Entry version after the write.
    pub version: Option<u64>,
    pub hooks: Vec<HookOutcome>,
    pub notifications: Vec<DeliveryOutcome>,
    pub stages: Vec<RotationStage>,
    /// Persisted `nextRotationDate`, when the schedule update went through.
    pub next_rotation: Option<DateTime<Utc>>,
}

impl RotationReport {
    fn new(policy_id: &str) -> Self {
        Self {
            policy_id: policy_id.to_string(),
            status: RotationStatus::Failed,
            failure: None,
            value_written: false,
            version: None,
            hooks: Vec::new(),
            notifications: Vec::new(),
            stages: vec![RotationStage::Pending],
            next_rotation: None,
        }
    }

    fn skipped(policy_id: &str) -> Self {
        Self {
            status: RotationStatus::Skipped,
            stages: Vec::new(),
            ..Self::new(policy_id)
        }
    }

    fn enter(&mut self, stage: RotationStage) {
        self.stages.push(stage);
    }

    fn rejected(mut self, failure: RotationFailure) -> Self {
        self.failure = Some(failure);
        self.enter(RotationStage::Done);
        self
    }

    pub fn succeeded(&self) -> bool {
        self.status == RotationStatus::Succeeded
    }
}

/// Exclusive right to rotate one policy. Released on drop.
pub struct RotationClaim {
    policy_id: String,
    in_flight: Arc<DashSet<String>>,
}

impl RotationClaim {
    pub fn policy_id(&self) -> &str {
        &self.policy_id
    }
}

impl Drop for RotationClaim {
    fn drop(&mut self) {
        self.in_flight.remove(&self.policy_id);
    }
}

pub struct RotationExecutor {
    policies: Arc<dyn PolicyStore>,
    secrets: Arc<SecretStore>,
    generator: ValueGenerator,
    hooks: HookRunner,
    notifier: Arc<Notifier>,
    in_flight: Arc<DashSet<String>>,
}

impl RotationExecutor {
    pub fn new(
        policies: Arc<dyn PolicyStore>,
        secrets: Arc<SecretStore>,
        generator: ValueGenerator,
        hooks: HookRunner,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            policies,
            secrets,
            generator,
            hooks,
            notifier,
            in_flight: Arc::new(DashSet::new()),
        }
    }

    pub fn policies(&self) -> &Arc<dyn PolicyStore> {
        &self.policies
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    /// Claim `policy_id`, or `None` when a rotation of it is in flight.
    pub fn try_claim(&self, policy_id: &str) -> Option<RotationClaim> {
        if !self.in_flight.insert(policy_id.to_string()) {
            return None;
        }
        Some(RotationClaim {
            policy_id: policy_id.to_string(),
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    pub fn is_in_flight(&self, policy_id: &str) -> bool {
        self.in_flight.contains(policy_id)
    }

    /// Rotate now. Returns a `Skipped` report if the policy is already
    /// being rotated.
    pub async fn rotate(&self, policy_id: &str) -> RotationReport {
        match self.try_claim(policy_id) {
            Some(claim) => self.rotate_claimed(&claim).await,
            None => {
                info!(policy_id, "rotation already in progress, skipping");
                RotationReport::skipped(policy_id)
            }
        }
    }

    /// Rotate under a claim obtained from [`RotationExecutor::try_claim`].
    pub async fn rotate_claimed(&self, claim: &RotationClaim) -> RotationReport {
        let policy_id = claim.policy_id();
        let mut report = RotationReport::new(policy_id);

        let policy = match self.policies.get(policy_id).await {
            Ok(Some(policy)) if policy.is_enabled => policy,
            Ok(Some(_)) => {
                info!(policy_id, "rotation policy is disabled, nothing to do");
                return report.rejected(RotationFailure::PolicyDisabled(policy_id.to_string()));
            }
            Ok(None) => {
                warn!(policy_id, "rotation requested for unknown policy");
                return report.rejected(RotationFailure::PolicyNotFound(policy_id.to_string()));
            }
            Err(e) => {
                warn!(policy_id, error = %e, "cannot load rotation policy");
                return report.rejected(RotationFailure::PolicyStore(e.to_string()));
            }
        };

        info!(
            policy_id,
            secret = %policy.secret_address(),
            strategy = policy.regeneration_strategy.kind(),
            "rotation started"
        );
        let failure = self.apply(&policy, &mut report).await;
        report.failure = failure;

        report.enter(RotationStage::Notifying);
        let message = match &report.failure {
            None => NotificationMessage::for_policy(RotationEvent::Succeeded, &policy, None),
            Some(failure) => NotificationMessage::for_policy(
                RotationEvent::Failed,
                &policy,
                Some(failure.to_string()),
            ),
        };
        report.notifications = self.notifier.dispatch(&policy, &message).await;

        self.reschedule(&policy, &mut report).await;
        report.status = if report.failure.is_none() {
            RotationStatus::Succeeded
        } else {
            RotationStatus::Failed
        };
        report.enter(RotationStage::Done);

        match &report.failure {
            None => info!(
                policy_id,
                version = report.version,
                next_rotation = ?report.next_rotation,
                "rotation succeeded"
            ),
            Some(failure) => warn!(
                policy_id,
                value_written = report.value_written,
                next_rotation = ?report.next_rotation,
                %failure,
                "rotation failed"
            ),
        }
        report
    }

    /// Generate, pre-hooks, write, post-hooks. Returns the first failure.
    async fn apply(
        &self,
        policy: &RotationPolicy,
        report: &mut RotationReport,
    ) -> Option<RotationFailure> {
        report.enter(RotationStage::Generating);
        let value = match self.generator.generate(policy).await {
            Ok(value) => value,
            Err(e) => return Some(RotationFailure::Regeneration(e.to_string())),
        };

        report.enter(RotationStage::PreHooks);
        if let Some(failure) = self.run_hooks(HookTiming::Pre, policy, report).await {
            return Some(failure);
        }

        report.enter(RotationStage::Writing);
        let write = SecretWrite::default()
            .with_meta(meta_keys::ROTATION_POLICY_ID, &policy.policy_id)
            .with_meta(meta_keys::SOURCE, "rotation");
        match self
            .secrets
            .set_secret(&policy.secret_address(), &value, write, policy.versioning())
            .await
        {
            Ok(entry) => {
                report.value_written = true;
                report.version = Some(entry.version);
            }
            Err(e) => return Some(RotationFailure::Write(e.to_string())),
        }
        drop(value);

        report.enter(RotationStage::PostHooks);
        self.run_hooks(HookTiming::Post, policy, report).await
    }

    async fn run_hooks(
        &self,
        timing: HookTiming,
        policy: &RotationPolicy,
        report: &mut RotationReport,
    ) -> Option<RotationFailure> {
        let outcomes = self.hooks.run(timing, policy).await;
        let blocking = outcomes
            .iter()
            .find(|o| o.is_blocking())
            .map(|o| RotationFailure::RequiredHook {
                timing,
                target: o.target.clone(),
            });
        report.hooks.extend(outcomes);
        blocking
    }

    /// Persist schedule state. A written value moves `lastRotationDate` to
    /// now; otherwise it is kept and the next attempt counts from now. The
    /// next date comes from the stored policy, not the copy loaded at start.
    async fn reschedule(&self, policy: &RotationPolicy, report: &mut RotationReport) {
        let completed = Utc::now();
        let last_rotation = report.value_written.then_some(completed);

        match self
            .policies
            .record_attempt(&policy.policy_id, last_rotation, completed)
            .await
        {
            Ok(updated) => {
                debug!(policy_id = %policy.policy_id, next = %updated.next_rotation_date, "schedule persisted");
                report.next_rotation = Some(updated.next_rotation_date);
            }
            Err(e) => warn!(
                policy_id = %policy.policy_id,
                error = %e,
                "cannot persist rotation schedule"
            ),
        }
    }
}
