use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{
    format::{format_elapsed, format_remaining},
    guidance::{evening_advisory, pre_exercise_tips, type_config},
    state::ExerciseSession,
    types::{ChecklistItem, PhaseKind},
};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistRow {
    pub item: ChecklistItem,
    pub label: &'static str,
    pub checked: bool,
}

/// Everything a front end needs to render the current session at one instant.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session: ExerciseSession,
    pub phase: PhaseKind,
    pub checklist: Vec<ChecklistRow>,
    pub tips: Vec<String>,
    pub elapsed_ms: Option<i64>,
    pub elapsed_label: Option<String>,
    pub progress_percent: Option<f64>,
    pub mid_check_due: bool,
    pub mid_check_message: Option<&'static str>,
    pub active_reminder: Option<&'static str>,
    pub recovery_remaining_ms: Option<i64>,
    pub recovery_remaining_label: Option<String>,
    pub recovery_message: Option<&'static str>,
    pub delayed_warning: Option<&'static str>,
    pub advisories: Vec<&'static str>,
}

#[derive(Debug, Clone, Copy)]
pub struct ViewContext {
    pub now: DateTime<Utc>,
    /// Wall-clock hour in the user's local time zone.
    pub local_hour: u32,
    pub evening_hour: u32,
    pub is_pump: bool,
}

impl SessionView {
    pub fn build(session: &ExerciseSession, ctx: ViewContext) -> Self {
        let config = type_config(session.exercise_type);
        let phase = session.phase_kind();

        let checklist = ChecklistItem::ALL
            .iter()
            .map(|item| ChecklistRow {
                item: *item,
                label: config.checklist.label(*item, ctx.is_pump),
                checked: session.pre_checklist.get(*item),
            })
            .collect();

        let tips = if phase == PhaseKind::Pre {
            pre_exercise_tips(session.exercise_type, ctx.is_pump, session.duration_minutes)
        } else {
            Vec::new()
        };

        let elapsed_ms = session.elapsed_ms(ctx.now);
        let mid_check_due = session.is_mid_check_due(ctx.now);
        let recovery_remaining_ms = session.recovery_remaining_ms(ctx.now);

        let in_active = phase == PhaseKind::Active;
        let in_recovery = phase == PhaseKind::Recovery;

        let mut advisories = Vec::new();
        if in_recovery {
            if let Some(advisory) = evening_advisory(ctx.local_hour, ctx.evening_hour) {
                advisories.push(advisory);
            }
        }

        Self {
            session: session.clone(),
            phase,
            checklist,
            tips,
            elapsed_ms,
            elapsed_label: elapsed_ms.map(format_elapsed),
            progress_percent: session.progress_percent(ctx.now),
            mid_check_due,
            mid_check_message: mid_check_due.then_some(config.mid_check_message),
            active_reminder: config.active_reminder.filter(|_| in_active),
            recovery_remaining_ms,
            recovery_remaining_label: recovery_remaining_ms.map(format_remaining),
            recovery_message: in_recovery.then_some(config.recovery_message),
            delayed_warning: config.delayed_warning.filter(|_| in_recovery),
            advisories,
        }
    }
}
