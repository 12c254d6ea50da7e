//! Rotation-policy engine.
//!
//! * [`policy`] / [`policy_store`] - policy records and their persistence
//! * [`schedule`] - next-rotation computation
//! * [`executor`] - one rotation: generate, hooks, write, notify, reschedule
//! * [`scheduler`] - periodic dispatch of due policies

pub mod executor;
pub mod generator;
pub mod hooks;
pub mod notify;
pub mod policy;
pub mod policy_store;
pub mod schedule;
pub mod scheduler;

pub use executor::{RotationClaim, RotationExecutor, RotationFailure, RotationReport, RotationStage, RotationStatus};
pub use generator::{RegenerationError, ValueGenerator};
pub use hooks::{HookOutcome, HookResult, HookRunner, HookSettings};
pub use notify::{NotificationMessage, NotificationSink, Notifier, RotationEvent};
pub use policy::{
    HookAction, HookConfig, HookTiming, NotificationConfig, PolicyDefaults, PolicyDraft,
    RegenerationStrategy, RotationInterval, RotationPolicy,
};
pub use policy_store::{PolicyStore, VaultPolicyStore, POLICY_CATEGORY, SYSTEM_PROJECT};
pub use schedule::{next_rotation, ScheduleOutcome, ScheduleWarning};
pub use scheduler::{Scheduler, SchedulerSettings, TickReport};
