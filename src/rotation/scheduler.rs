//! Periodic dispatch of due rotations and upcoming-rotation reminders.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::executor::{RotationExecutor, RotationReport};
use super::notify::{NotificationMessage, RotationEvent};
use super::policy::RotationPolicy;
use crate::error::VaultError;

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub tick_interval: Duration,
    pub max_concurrent_rotations: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            max_concurrent_rotations: 4,
        }
    }
}

/// What one tick did.
#[derive(Debug, Default)]
pub struct TickReport {
    pub dispatched: Vec<String>,
    /// Due at listing time but not dispatched: in flight, or no longer due
    /// once claimed.
    pub skipped: Vec<String>,
    /// Policies an upcoming-rotation reminder was queued for.
    pub reminders: Vec<String>,
    pub handles: Vec<JoinHandle<RotationReport>>,
    /// Background delivery of this tick's reminders.
    pub reminder_delivery: Option<JoinHandle<()>>,
}

impl TickReport {
    /// Wait for every rotation dispatched by this tick, and for its
    /// reminder deliveries.
    pub async fn join(self) -> Vec<RotationReport> {
        let mut reports = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(e) => warn!(error = %e, "rotation task aborted"),
            }
        }
        if let Some(delivery) = self.reminder_delivery {
            if let Err(e) = delivery.await {
                warn!(error = %e, "reminder delivery aborted");
            }
        }
        reports
    }
}

pub struct Scheduler {
    executor: Arc<RotationExecutor>,
    settings: SchedulerSettings,
    limit: Arc<Semaphore>,
    /// (policy id, nextRotationDate) pairs already reminded about.
    reminded: Mutex<HashSet<(String, DateTime<Utc>)>>,
}

impl Scheduler {
    pub fn new(executor: Arc<RotationExecutor>, settings: SchedulerSettings) -> Self {
        let limit = Arc::new(Semaphore::new(settings.max_concurrent_rotations.max(1)));
        Self {
            executor,
            settings,
            limit,
            reminded: Mutex::new(HashSet::new()),
        }
    }

    /// Enabled policies whose `nextRotationDate` is at or before `now`.
    pub async fn due_policies(&self, now: DateTime<Utc>) -> Result<Vec<RotationPolicy>, VaultError> {
        let mut due: Vec<RotationPolicy> = self
            .executor
            .policies()
            .list()
            .await?
            .into_iter()
            .filter(|p| p.is_due(now))
            .collect();
        due.sort_by_key(|p| p.next_rotation_date);
        Ok(due)
    }

    /// One scheduling pass: dispatch every due policy that is not already
    /// in flight, then queue reminders. Neither waits on rotation or
    /// notification I/O.
    pub async fn tick(&self) -> Result<TickReport, VaultError> {
        let now = Utc::now();
        let policies = self.executor.policies().list().await?;

        let mut report = self.dispatch_due(&policies, now).await;
        let (reminders, delivery) = self.queue_reminders(&policies, now);
        report.reminders = reminders;
        report.reminder_delivery = delivery;

        if !report.dispatched.is_empty() || !report.skipped.is_empty() {
            info!(
                dispatched = report.dispatched.len(),
                skipped = report.skipped.len(),
                "scheduler tick"
            );
        }
        Ok(report)
    }

    /// Tick every `tick_interval` until `cancel` fires. Rotations already
    /// dispatched keep running to completion.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            tick_secs = self.settings.tick_interval.as_secs(),
            max_concurrent = self.settings.max_concurrent_rotations,
            "rotation scheduler started"
        );
        let mut interval = tokio::time::interval(self.settings.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        warn!(error = %e, "scheduler tick failed");
                    }
                }
            }
        }
        info!("rotation scheduler stopped");
    }

    /// Claim and spawn the due policies of a listing. Each claimed policy is
    /// re-read so a rotation that finished after the listing is not repeated.
    async fn dispatch_due(&self, policies: &[RotationPolicy], now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();
        let mut due: Vec<&RotationPolicy> = policies.iter().filter(|p| p.is_due(now)).collect();
        due.sort_by_key(|p| p.next_rotation_date);

        for policy in due {
            let Some(claim) = self.executor.try_claim(&policy.policy_id) else {
                debug!(policy_id = %policy.policy_id, "rotation in flight, skipping");
                report.skipped.push(policy.policy_id.clone());
                continue;
            };
            match self.executor.policies().get(&policy.policy_id).await {
                Ok(Some(current)) if current.is_due(now) => {}
                Ok(_) => {
                    debug!(policy_id = %policy.policy_id, "no longer due, skipping");
                    report.skipped.push(policy.policy_id.clone());
                    continue;
                }
                Err(e) => {
                    warn!(policy_id = %policy.policy_id, error = %e, "cannot re-read rotation policy");
                    report.skipped.push(policy.policy_id.clone());
                    continue;
                }
            }

            let executor = Arc::clone(&self.executor);
            let limit = Arc::clone(&self.limit);
            report.dispatched.push(policy.policy_id.clone());
            report.handles.push(tokio::spawn(async move {
                let _permit = limit.acquire_owned().await.ok();
                executor.rotate_claimed(&claim).await
            }));
        }
        report
    }

    /// Pick the policies owed a reminder and deliver them in the background.
    fn queue_reminders(
        &self,
        policies: &[RotationPolicy],
        now: DateTime<Utc>,
    ) -> (Vec<String>, Option<JoinHandle<()>>) {
        let mut owed = Vec::new();
        {
            let mut reminded = self.reminded.lock();
            for policy in policies.iter().filter(|p| p.is_enabled) {
                let Some(days) = policy
                    .notifications
                    .iter()
                    .filter_map(|n| n.notify_before_rotation_days)
                    .max()
                else {
                    continue;
                };
                let window_end = ChronoDuration::try_days(i64::from(days))
                    .and_then(|d| now.checked_add_signed(d))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                if policy.next_rotation_date <= now || policy.next_rotation_date > window_end {
                    continue;
                }
                if reminded.insert((policy.policy_id.clone(), policy.next_rotation_date)) {
                    owed.push(policy.clone());
                }
            }
            // Forget reminders for dates that are already past.
            reminded.retain(|(_, date)| *date > now);
        }
        if owed.is_empty() {
            return (Vec::new(), None);
        }

        let ids = owed.iter().map(|p| p.policy_id.clone()).collect();
        let notifier = Arc::clone(self.executor.notifier());
        let delivery = tokio::spawn(async move {
            let sends = owed.iter().map(|policy| {
                let notifier = Arc::clone(&notifier);
                async move {
                    let message = NotificationMessage::for_policy(
                        RotationEvent::Upcoming,
                        policy,
                        Some(format!("rotation due at {}", policy.next_rotation_date.to_rfc3339())),
                    );
                    notifier.dispatch(policy, &message).await;
                    debug!(policy_id = %policy.policy_id, "upcoming rotation reminder sent");
                }
            });
            join_all(sends).await;
        });
        (ids, Some(delivery))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rotation::generator::ValueGenerator;
    use crate::rotation::hooks::{HookRunner, HookSettings};
    use crate::rotation::notify::{NotificationSink, Notifier};
    use crate::rotation::policy::{
        ChannelKind, NotificationChannel, NotificationConfig, PolicyDefaults, PolicyDraft,
    };
    use crate::rotation::policy_store::{PolicyStore, VaultPolicyStore};
    use crate::sources::{CommandTaskRunner, SourceRegistry};
    use crate::vault::{ChaChaCipher, EncryptionKey, MemoryBackend, SecretStore};
    use async_trait::async_trait;

    #[derive(Default)]
    struct Counter {
        events: Mutex<Vec<RotationEvent>>,
    }

    #[async_trait]
    impl NotificationSink for Counter {
        async fn deliver(&self, _target: &str, message: &NotificationMessage) -> Result<(), String> {
            self.events.lock().push(message.event);
            Ok(())
        }
    }

    /// Holds every delivery until the test opens it.
    struct Gate {
        open: Semaphore,
        delivered: Mutex<Vec<String>>,
    }

    impl Gate {
        fn closed() -> Self {
            Self {
                open: Semaphore::new(0),
                delivered: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl NotificationSink for Gate {
        async fn deliver(&self, _target: &str, message: &NotificationMessage) -> Result<(), String> {
            let _permit = self.open.acquire().await.map_err(|e| e.to_string())?;
            self.delivered.lock().push(message.policy_id.clone());
            Ok(())
        }
    }

    fn scheduler(counter: Arc<Counter>) -> (Scheduler, Arc<VaultPolicyStore>) {
        scheduler_with_sink(counter)
    }

    fn scheduler_with_sink(sink: Arc<dyn NotificationSink>) -> (Scheduler, Arc<VaultPolicyStore>) {
        let secrets = Arc::new(SecretStore::new(
            Arc::new(MemoryBackend::new()),
            Arc::new(ChaChaCipher::new(EncryptionKey::from_bytes([3; 32]))),
        ));
        let policies = Arc::new(VaultPolicyStore::new(secrets.clone(), PolicyDefaults::default()));
        let tasks = Arc::new(CommandTaskRunner::new(None));
        let mut notifier = Notifier::new(Duration::from_secs(1));
        notifier.register(ChannelKind::Log, sink);
        let executor = RotationExecutor::new(
            policies.clone(),
            secrets,
            ValueGenerator::new(SourceRegistry::new(), tasks.clone(), Duration::from_secs(5)),
            HookRunner::new(tasks, HookSettings::default()),
            Arc::new(notifier),
        );
        (
            Scheduler::new(Arc::new(executor), SchedulerSettings::default()),
            policies,
        )
    }

    async fn overdue(policies: &VaultPolicyStore, name: &str, enabled: bool) -> RotationPolicy {
        let policy = policies
            .save(
                PolicyDraft {
                    is_enabled: Some(enabled),
                    ..PolicyDraft::for_secret("p", "c", name)
                },
                None,
            )
            .await
            .unwrap();
        // A 30-day interval attempted 31 days ago is one day overdue.
        let attempted = Utc::now() - ChronoDuration::days(31);
        policies
            .record_attempt(&policy.policy_id, None, attempted)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn disabled_policies_are_never_due() {
        let (scheduler, policies) = scheduler(Arc::default());
        let enabled = overdue(&policies, "a", true).await;
        overdue(&policies, "b", false).await;
        policies
            .save(PolicyDraft::for_secret("p", "c", "later"), None)
            .await
            .unwrap();

        let due = scheduler.due_policies(Utc::now()).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].policy_id, enabled.policy_id);
    }

    #[tokio::test]
    async fn tick_dispatches_due_and_skips_in_flight() {
        let (scheduler, policies) = scheduler(Arc::default());
        let a = overdue(&policies, "a", true).await;
        let b = overdue(&policies, "b", true).await;

        let held = scheduler.executor.try_claim(&b.policy_id).unwrap();
        let report = scheduler.tick().await.unwrap();
        assert_eq!(report.dispatched, vec![a.policy_id.clone()]);
        assert_eq!(report.skipped, vec![b.policy_id.clone()]);

        let reports = report.join().await;
        assert!(reports[0].succeeded());
        drop(held);

        let after = scheduler.due_policies(Utc::now()).await.unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].policy_id, b.policy_id);
    }

    async fn upcoming(policies: &VaultPolicyStore, name: &str) -> RotationPolicy {
        let policy = policies
            .save(
                PolicyDraft {
                    notifications: Some(vec![NotificationConfig {
                        channels: vec![NotificationChannel {
                            kind: ChannelKind::Log,
                            target: "ops".into(),
                        }],
                        notify_on_success: true,
                        notify_on_failure: true,
                        notify_before_rotation_days: Some(3),
                    }]),
                    ..PolicyDraft::for_secret("p", "c", name)
                },
                None,
            )
            .await
            .unwrap();
        // Due in two days on the default 30-day interval.
        policies
            .record_attempt(&policy.policy_id, None, Utc::now() - ChronoDuration::days(28))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn reminders_are_sent_once_per_date() {
        let counter = Arc::new(Counter::default());
        let (scheduler, policies) = scheduler(counter.clone());
        let policy = upcoming(&policies, "s").await;

        let first = scheduler.tick().await.unwrap();
        assert_eq!(first.reminders, vec![policy.policy_id.clone()]);
        first.join().await;
        let second = scheduler.tick().await.unwrap();
        assert!(second.reminders.is_empty());
        assert!(second.reminder_delivery.is_none());
        assert_eq!(counter.events.lock().as_slice(), &[RotationEvent::Upcoming]);
    }

    #[tokio::test]
    async fn slow_reminders_do_not_hold_up_dispatch() {
        let gate = Arc::new(Gate::closed());
        let (scheduler, policies) = scheduler_with_sink(gate.clone());
        let soon_a = upcoming(&policies, "a").await;
        let soon_b = upcoming(&policies, "b").await;
        let due = overdue(&policies, "due", true).await;

        let report = tokio::time::timeout(Duration::from_millis(500), scheduler.tick())
            .await
            .expect("tick waited on reminder delivery")
            .unwrap();
        assert_eq!(report.dispatched, vec![due.policy_id.clone()]);
        let mut reminded = report.reminders.clone();
        reminded.sort();
        let mut expected = vec![soon_a.policy_id.clone(), soon_b.policy_id.clone()];
        expected.sort();
        assert_eq!(reminded, expected);
        assert!(gate.delivered.lock().is_empty());

        gate.open.add_permits(8);
        let reports = report.join().await;
        assert!(reports[0].succeeded());
        let mut delivered = gate.delivered.lock().clone();
        delivered.sort();
        assert_eq!(delivered, expected);
    }

    #[tokio::test]
    async fn stale_listing_does_not_rotate_twice() {
        let (scheduler, policies) = scheduler(Arc::default());
        let policy = overdue(&policies, "a", true).await;
        let listing = policies.list().await.unwrap();

        // A manual rotation lands between the listing and the claim.
        assert!(scheduler.executor.rotate(&policy.policy_id).await.succeeded());

        let report = scheduler.dispatch_due(&listing, Utc::now()).await;
        assert!(report.dispatched.is_empty());
        assert_eq!(report.skipped, vec![policy.policy_id.clone()]);
        assert!(!scheduler.executor.is_in_flight(&policy.policy_id));
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let (scheduler, _) = scheduler(Arc::default());
        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            stopper.cancel();
        });
        tokio::time::timeout(Duration::from_secs(5), scheduler.run(cancel))
            .await
            .unwrap();
    }
}
