use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    error::{SessionAction, TransitionError},
    guidance::{recovery_window, type_config},
    types::{ChecklistItem, ExerciseType, Intensity, PhaseKind},
};

const MS_PER_MINUTE: i64 = 60_000;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PreChecklist {
    pub bg_checked: bool,
    pub carbs_considered: bool,
    pub basal_adjusted: bool,
}

impl PreChecklist {
    pub fn get(&self, item: ChecklistItem) -> bool {
        match item {
            ChecklistItem::BgChecked => self.bg_checked,
            ChecklistItem::CarbsConsidered => self.carbs_considered,
            ChecklistItem::BasalAdjusted => self.basal_adjusted,
        }
    }

    /// Flips `item` and returns its new value.
    pub fn toggle(&mut self, item: ChecklistItem) -> bool {
        let slot = match item {
            ChecklistItem::BgChecked => &mut self.bg_checked,
            ChecklistItem::CarbsConsidered => &mut self.carbs_considered,
            ChecklistItem::BasalAdjusted => &mut self.basal_adjusted,
        };
        *slot = !*slot;
        *slot
    }

    pub fn completed_count(&self) -> usize {
        ChecklistItem::ALL
            .iter()
            .filter(|item| self.get(**item))
            .count()
    }
}

/// Phase of a live session. Timestamps live inside the variants so that
/// `exercise_started_at` exists only once exercise has begun and
/// `recovery_ends_at` only during recovery.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "phase", rename_all = "camelCase")]
pub enum SessionPhase {
    Pre,
    #[serde(rename_all = "camelCase")]
    Active { exercise_started_at: DateTime<Utc> },
    #[serde(rename_all = "camelCase")]
    Recovery {
        exercise_started_at: DateTime<Utc>,
        recovery_ends_at: DateTime<Utc>,
    },
}

impl SessionPhase {
    pub fn kind(&self) -> PhaseKind {
        match self {
            SessionPhase::Pre => PhaseKind::Pre,
            SessionPhase::Active { .. } => PhaseKind::Active,
            SessionPhase::Recovery { .. } => PhaseKind::Recovery,
        }
    }

    pub fn exercise_started_at(&self) -> Option<DateTime<Utc>> {
        match self {
            SessionPhase::Pre => None,
            SessionPhase::Active {
                exercise_started_at,
            }
            | SessionPhase::Recovery {
                exercise_started_at,
                ..
            } => Some(*exercise_started_at),
        }
    }

    pub fn recovery_ends_at(&self) -> Option<DateTime<Utc>> {
        match self {
            SessionPhase::Recovery {
                recovery_ends_at, ..
            } => Some(*recovery_ends_at),
            _ => None,
        }
    }
}

/// What a single tick observed or changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Unchanged,
    /// The mid-session check is eligible and has not been dismissed.
    MidCheckDue,
    EnteredRecovery { recovery_ends_at: DateTime<Utc> },
    /// The recovery window is over; the session should be terminated.
    RecoveryElapsed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseSession {
    pub id: String,
    pub name: String,
    pub exercise_type: ExerciseType,
    pub intensity: Intensity,
    pub duration_minutes: u32,
    #[serde(flatten)]
    pub phase: SessionPhase,
    pub pre_checklist: PreChecklist,
    pub mid_check_done: bool,
    pub created_at: DateTime<Utc>,
}

impl ExerciseSession {
    pub fn new(
        exercise_type: ExerciseType,
        intensity: Intensity,
        duration_minutes: u32,
        name: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, TransitionError> {
        if duration_minutes == 0 {
            return Err(TransitionError::InvalidDuration);
        }

        let name = name
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| default_name(exercise_type, intensity));

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            name,
            exercise_type,
            intensity,
            duration_minutes,
            phase: SessionPhase::Pre,
            pre_checklist: PreChecklist::default(),
            mid_check_done: false,
            created_at,
        })
    }

    pub fn phase_kind(&self) -> PhaseKind {
        self.phase.kind()
    }

    pub fn planned_ms(&self) -> i64 {
        i64::from(self.duration_minutes) * MS_PER_MINUTE
    }

    /// Elapsed milliseconds at which the mid-session check becomes eligible.
    pub fn mid_check_threshold_ms(&self) -> i64 {
        self.planned_ms() * i64::from(type_config(self.exercise_type).mid_check_percent) / 100
    }

    /// Milliseconds since exercise began. Only defined while active.
    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> Option<i64> {
        match self.phase {
            SessionPhase::Active {
                exercise_started_at,
            } => Some((now - exercise_started_at).num_milliseconds().max(0)),
            _ => None,
        }
    }

    /// Milliseconds left in the recovery window; negative once it is over.
    pub fn recovery_remaining_ms(&self, now: DateTime<Utc>) -> Option<i64> {
        self.phase
            .recovery_ends_at()
            .map(|ends_at| (ends_at - now).num_milliseconds())
    }

    pub fn progress_percent(&self, now: DateTime<Utc>) -> Option<f64> {
        self.elapsed_ms(now)
            .map(|elapsed| super::format::progress_percent(elapsed, self.planned_ms()))
    }

    pub fn is_mid_check_due(&self, now: DateTime<Utc>) -> bool {
        if self.mid_check_done {
            return false;
        }
        self.elapsed_ms(now)
            .map(|elapsed| elapsed >= self.mid_check_threshold_ms())
            .unwrap_or(false)
    }

    pub fn toggle_checklist_item(&mut self, item: ChecklistItem) -> Result<bool, TransitionError> {
        self.require(PhaseKind::Pre, SessionAction::ToggleChecklist)?;
        Ok(self.pre_checklist.toggle(item))
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.require(PhaseKind::Pre, SessionAction::Start)?;
        self.phase = SessionPhase::Active {
            exercise_started_at: now,
        };
        Ok(())
    }

    pub fn dismiss_mid_check(&mut self) -> Result<(), TransitionError> {
        self.require(PhaseKind::Active, SessionAction::DismissMidCheck)?;
        self.mid_check_done = true;
        Ok(())
    }

    /// Moves an active session into recovery. Returns the end of the recovery window.
    pub fn finish(&mut self, now: DateTime<Utc>) -> Result<DateTime<Utc>, TransitionError> {
        let exercise_started_at = match self.phase {
            SessionPhase::Active {
                exercise_started_at,
            } => exercise_started_at,
            other => {
                return Err(TransitionError::InvalidTransition {
                    action: SessionAction::Finish,
                    phase: other.kind(),
                })
            }
        };

        let recovery_ends_at = now + recovery_window(self.exercise_type, self.intensity);
        self.phase = SessionPhase::Recovery {
            exercise_started_at,
            recovery_ends_at,
        };
        Ok(recovery_ends_at)
    }

    /// Checks that the session may be ended manually (recovery only).
    pub fn ensure_can_end(&self) -> Result<(), TransitionError> {
        self.require(PhaseKind::Recovery, SessionAction::End)
    }

    /// Checks that the session may be discarded without an outcome (pre only).
    pub fn ensure_can_cancel(&self) -> Result<(), TransitionError> {
        self.require(PhaseKind::Pre, SessionAction::Cancel)
    }

    /// Re-evaluates time-driven transitions at `now`.
    pub fn tick(&mut self, now: DateTime<Utc>) -> TickOutcome {
        match self.phase {
            SessionPhase::Pre => TickOutcome::Unchanged,
            SessionPhase::Active {
                exercise_started_at,
            } => {
                // Recovery starts at the planned end even when the tick arrives late.
                let planned_end = exercise_started_at + Duration::milliseconds(self.planned_ms());
                if now >= planned_end {
                    match self.finish(planned_end) {
                        Ok(recovery_ends_at) => TickOutcome::EnteredRecovery { recovery_ends_at },
                        Err(_) => TickOutcome::Unchanged,
                    }
                } else if self.is_mid_check_due(now) {
                    TickOutcome::MidCheckDue
                } else {
                    TickOutcome::Unchanged
                }
            }
            SessionPhase::Recovery {
                recovery_ends_at, ..
            } => {
                if now >= recovery_ends_at {
                    TickOutcome::RecoveryElapsed
                } else {
                    TickOutcome::Unchanged
                }
            }
        }
    }

    fn require(&self, expected: PhaseKind, action: SessionAction) -> Result<(), TransitionError> {
        let phase = self.phase_kind();
        if phase == expected {
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition { action, phase })
        }
    }
}

fn default_name(exercise_type: ExerciseType, intensity: Intensity) -> String {
    let label = exercise_type.label();
    let mut chars = label.chars();
    let capitalized = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => String::new(),
    };
    format!("{} {}", intensity_adjective(intensity), capitalized)
}

fn intensity_adjective(intensity: Intensity) -> &'static str {
    match intensity {
        Intensity::Light => "Light",
        Intensity::Moderate => "Moderate",
        Intensity::Intense => "Intense",
    }
}
