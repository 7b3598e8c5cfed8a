//! Post-session outcome records and the per-type aggregates built from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::exercise::{BgResponse, BgSeverity, ExerciseSession, ExerciseType, Intensity};

/// User-supplied answers from the outcome dialog.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeInput {
    pub bg_response: Option<BgResponse>,
    pub bg_severity: Option<BgSeverity>,
    pub felt_hypo: bool,
    pub notes: Option<String>,
}

/// Write-once record of how a finished session went.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseOutcome {
    pub id: String,
    pub session_id: String,
    pub exercise_type: ExerciseType,
    pub intensity: Intensity,
    pub duration_minutes: u32,
    pub bg_response: Option<BgResponse>,
    pub bg_severity: Option<BgSeverity>,
    pub felt_hypo: bool,
    pub notes: Option<String>,
    pub ended_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
}

impl ExerciseOutcome {
    pub fn from_session(
        session: &ExerciseSession,
        input: OutcomeInput,
        ended_at: DateTime<Utc>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        // Severity only describes a movement; a stable or unknown response has none.
        let bg_severity = match input.bg_response {
            Some(BgResponse::Dropped) | Some(BgResponse::Rose) => input.bg_severity,
            Some(BgResponse::Stable) | None => None,
        };
        let notes = input
            .notes
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session.id.clone(),
            exercise_type: session.exercise_type,
            intensity: session.intensity,
            duration_minutes: session.duration_minutes,
            bg_response: input.bg_response,
            bg_severity,
            felt_hypo: input.felt_hypo,
            notes,
            ended_at,
            recorded_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExercisePattern {
    pub total_sessions: u32,
    pub dropped_count: u32,
    pub rose_count: u32,
    pub stable_count: u32,
    pub hypo_count: u32,
    /// Most frequent response; ties lean toward `dropped`, then `rose`.
    pub avg_pattern: Option<BgResponse>,
}

impl ExercisePattern {
    pub fn from_counts(
        total_sessions: u32,
        dropped_count: u32,
        rose_count: u32,
        stable_count: u32,
        hypo_count: u32,
    ) -> Self {
        let ranked = [
            (BgResponse::Dropped, dropped_count),
            (BgResponse::Rose, rose_count),
            (BgResponse::Stable, stable_count),
        ];
        let avg_pattern = ranked
            .iter()
            .filter(|(_, count)| *count > 0)
            .fold(None::<(BgResponse, u32)>, |best, &(response, count)| match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((response, count)),
            })
            .map(|(response, _)| response);

        Self {
            total_sessions,
            dropped_count,
            rose_count,
            stable_count,
            hypo_count,
            avg_pattern,
        }
    }

    pub fn from_outcomes<'a, I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = &'a ExerciseOutcome>,
    {
        let (mut total, mut dropped, mut rose, mut stable, mut hypo) = (0, 0, 0, 0, 0);
        for outcome in outcomes {
            total += 1;
            match outcome.bg_response {
                Some(BgResponse::Dropped) => dropped += 1,
                Some(BgResponse::Rose) => rose += 1,
                Some(BgResponse::Stable) => stable += 1,
                None => {}
            }
            if outcome.felt_hypo {
                hypo += 1;
            }
        }
        Self::from_counts(total, dropped, rose, stable, hypo)
    }
}
