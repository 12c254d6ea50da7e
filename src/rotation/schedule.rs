//! Next-rotation computation.
//!
//! Pure functions only: no I/O, no clock reads, no mutation of inputs.

use chrono::{DateTime, Duration, Months, Utc};
use std::fmt;

use super::policy::{IntervalUnit, RotationInterval};

const FALLBACK_DAYS: i64 = 30;
const CUSTOM_WITHOUT_EXPRESSION_DAYS: i64 = 90;
const CUSTOM_RECHECK_HOURS: i64 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleWarning {
    /// The interval string could not be read; the 30-day fallback applied.
    UnparseableInterval { raw: String },
    /// A custom expression is stored but never evaluated; next check in an hour.
    CustomScheduleNotEvaluated { expression: String },
    /// `custom` interval without an expression; the 90-day fallback applied.
    MissingCustomSchedule,
}

impl fmt::Display for ScheduleWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnparseableInterval { raw } => write!(
                f,
                "rotation interval '{raw}' is not understood, using {FALLBACK_DAYS} days"
            ),
            Self::CustomScheduleNotEvaluated { expression } => write!(
                f,
                "custom schedule '{expression}' is not evaluated, re-checking in {CUSTOM_RECHECK_HOURS} hour"
            ),
            Self::MissingCustomSchedule => write!(
                f,
                "custom interval without a schedule expression, using {CUSTOM_WITHOUT_EXPRESSION_DAYS} days"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleOutcome {
    pub next: DateTime<Utc>,
    pub warning: Option<ScheduleWarning>,
}

impl ScheduleOutcome {
    fn exact(next: DateTime<Utc>) -> Self {
        Self { next, warning: None }
    }

    fn fallback(next: DateTime<Utc>, warning: ScheduleWarning) -> Self {
        Self {
            next,
            warning: Some(warning),
        }
    }
}

/// Compute when a policy should rotate next.
///
/// The base is `last_rotation` when present, otherwise `now`. Month and year
/// steps are calendar steps clamped to the end of the target month.
pub fn next_rotation(
    interval: &RotationInterval,
    custom_schedule: Option<&str>,
    last_rotation: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> ScheduleOutcome {
    let base = last_rotation.unwrap_or(now);

    let (count, unit) = match interval {
        RotationInterval::Cadence(cadence) => cadence.as_duration(),
        RotationInterval::Every { count, unit } => (*count, *unit),
        RotationInterval::Custom => {
            return match custom_schedule.map(str::trim).filter(|e| !e.is_empty()) {
                Some(expression) => ScheduleOutcome::fallback(
                    shift(base, Duration::hours(CUSTOM_RECHECK_HOURS)),
                    ScheduleWarning::CustomScheduleNotEvaluated {
                        expression: expression.to_string(),
                    },
                ),
                None => ScheduleOutcome::fallback(
                    shift(base, Duration::days(CUSTOM_WITHOUT_EXPRESSION_DAYS)),
                    ScheduleWarning::MissingCustomSchedule,
                ),
            };
        }
        RotationInterval::Unparsed(raw) => {
            return unparseable(base, raw.clone());
        }
    };

    match advance(base, count, unit) {
        Some(next) => ScheduleOutcome::exact(next),
        None => unparseable(base, interval.to_string()),
    }
}

fn unparseable(base: DateTime<Utc>, raw: String) -> ScheduleOutcome {
    ScheduleOutcome::fallback(
        shift(base, Duration::days(FALLBACK_DAYS)),
        ScheduleWarning::UnparseableInterval { raw },
    )
}

/// `base + step`, saturating at the largest representable instant.
fn shift(base: DateTime<Utc>, step: Duration) -> DateTime<Utc> {
    base.checked_add_signed(step).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn advance(base: DateTime<Utc>, count: u32, unit: IntervalUnit) -> Option<DateTime<Utc>> {
    match unit {
        IntervalUnit::Day => base.checked_add_signed(Duration::try_days(i64::from(count))?),
        IntervalUnit::Week => base.checked_add_signed(Duration::try_weeks(i64::from(count))?),
        IntervalUnit::Month => base.checked_add_months(Months::new(count)),
        IntervalUnit::Year => base.checked_add_months(Months::new(count.checked_mul(12)?)),
    }
}
