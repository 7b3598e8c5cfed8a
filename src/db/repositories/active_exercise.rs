use anyhow::{bail, Result};
use chrono::Utc;
use rusqlite::{params, Row, Transaction};

use crate::{
    db::{
        connection::Database,
        helpers::{parse_datetime, parse_enum, parse_optional_datetime, to_u32},
    },
    exercise::{ExerciseSession, PhaseKind, PreChecklist, SessionPhase},
};

const SELECT_ACTIVE: &str =
    "SELECT id, name, exercise_type, intensity, duration_minutes, phase, exercise_started_at,
            recovery_ends_at, bg_checked, carbs_considered, basal_adjusted, mid_check_done, created_at
     FROM active_exercise
     WHERE slot = 1";

fn row_to_session(row: &Row) -> Result<ExerciseSession> {
    let exercise_type: String = row.get("exercise_type")?;
    let intensity: String = row.get("intensity")?;
    let duration_minutes: i64 = row.get("duration_minutes")?;
    let phase: String = row.get("phase")?;
    let exercise_started_at: Option<String> = row.get("exercise_started_at")?;
    let recovery_ends_at: Option<String> = row.get("recovery_ends_at")?;
    let created_at: String = row.get("created_at")?;

    let phase = match (
        parse_enum::<PhaseKind>(&phase, "phase")?,
        parse_optional_datetime(exercise_started_at, "exercise_started_at")?,
        parse_optional_datetime(recovery_ends_at, "recovery_ends_at")?,
    ) {
        (PhaseKind::Pre, None, None) => SessionPhase::Pre,
        (PhaseKind::Active, Some(exercise_started_at), None) => SessionPhase::Active {
            exercise_started_at,
        },
        (PhaseKind::Recovery, Some(exercise_started_at), Some(recovery_ends_at)) => {
            SessionPhase::Recovery {
                exercise_started_at,
                recovery_ends_at,
            }
        }
        (kind, started, ends) => bail!(
            "active_exercise row has inconsistent timestamps for {kind} phase \
             (started: {}, recovery ends: {})",
            started.is_some(),
            ends.is_some()
        ),
    };

    Ok(ExerciseSession {
        id: row.get("id")?,
        name: row.get("name")?,
        exercise_type: parse_enum(&exercise_type, "exercise_type")?,
        intensity: parse_enum(&intensity, "intensity")?,
        duration_minutes: to_u32(duration_minutes, "duration_minutes")?,
        phase,
        pre_checklist: PreChecklist {
            bg_checked: row.get("bg_checked")?,
            carbs_considered: row.get("carbs_considered")?,
            basal_adjusted: row.get("basal_adjusted")?,
        },
        mid_check_done: row.get("mid_check_done")?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

fn select_active(tx: &Transaction<'_>) -> Result<Option<ExerciseSession>> {
    let mut stmt = tx.prepare(SELECT_ACTIVE)?;
    let mut rows = stmt.query([])?;
    let session = match rows.next()? {
        Some(row) => Some(row_to_session(row)?),
        None => None,
    };
    Ok(session)
}

impl Database {
    pub async fn load_active_exercise(&self) -> Result<Option<ExerciseSession>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(SELECT_ACTIVE)?;
            let mut rows = stmt.query([])?;
            let session = match rows.next()? {
                Some(row) => Some(row_to_session(row)?),
                None => None,
            };
            Ok(session)
        })
        .await
    }

    pub async fn store_active_exercise(&self, session: &ExerciseSession) -> Result<()> {
        let record = session.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO active_exercise (
                     slot, id, name, exercise_type, intensity, duration_minutes, phase,
                     exercise_started_at, recovery_ends_at, bg_checked, carbs_considered,
                     basal_adjusted, mid_check_done, created_at, updated_at)
                 VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    record.id,
                    record.name,
                    record.exercise_type.as_str(),
                    record.intensity.as_str(),
                    i64::from(record.duration_minutes),
                    record.phase.kind().as_str(),
                    record.phase.exercise_started_at().map(|dt| dt.to_rfc3339()),
                    record.phase.recovery_ends_at().map(|dt| dt.to_rfc3339()),
                    record.pre_checklist.bg_checked,
                    record.pre_checklist.carbs_considered,
                    record.pre_checklist.basal_adjusted,
                    record.mid_check_done,
                    record.created_at.to_rfc3339(),
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Removes the active session and returns it, in one transaction, but only
    /// while the slot still holds `session_id`.
    pub async fn take_active_exercise(&self, session_id: &str) -> Result<Option<ExerciseSession>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let session = select_active(&tx)?.filter(|session| session.id == session_id);
            if session.is_some() {
                tx.execute(
                    "DELETE FROM active_exercise WHERE slot = 1 AND id = ?1",
                    params![session_id],
                )?;
            }
            tx.commit()?;
            Ok(session)
        })
        .await
    }
}
