use anyhow::Result;
use rusqlite::{params, Row};

use crate::{
    db::{
        connection::Database,
        helpers::{parse_datetime, parse_enum, parse_optional_enum, to_u32},
    },
    exercise::{ExerciseType, Intensity},
    models::{ExerciseOutcome, ExercisePattern},
};

fn row_to_outcome(row: &Row) -> Result<ExerciseOutcome> {
    let exercise_type: String = row.get("exercise_type")?;
    let intensity: String = row.get("intensity")?;
    let duration_minutes: i64 = row.get("duration_minutes")?;
    let bg_response: Option<String> = row.get("bg_response")?;
    let bg_severity: Option<String> = row.get("bg_severity")?;
    let ended_at: String = row.get("ended_at")?;
    let recorded_at: String = row.get("recorded_at")?;

    Ok(ExerciseOutcome {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        exercise_type: parse_enum(&exercise_type, "exercise_type")?,
        intensity: parse_enum(&intensity, "intensity")?,
        duration_minutes: to_u32(duration_minutes, "duration_minutes")?,
        bg_response: parse_optional_enum(bg_response, "bg_response")?,
        bg_severity: parse_optional_enum(bg_severity, "bg_severity")?,
        felt_hypo: row.get("felt_hypo")?,
        notes: row.get("notes")?,
        ended_at: parse_datetime(&ended_at, "ended_at")?,
        recorded_at: parse_datetime(&recorded_at, "recorded_at")?,
    })
}

impl Database {
    pub async fn insert_outcome(&self, outcome: &ExerciseOutcome) -> Result<()> {
        let record = outcome.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO exercise_outcomes (
                     id, session_id, exercise_type, intensity, duration_minutes,
                     bg_response, bg_severity, felt_hypo, notes, ended_at, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    record.id,
                    record.session_id,
                    record.exercise_type.as_str(),
                    record.intensity.as_str(),
                    i64::from(record.duration_minutes),
                    record.bg_response.map(|value| value.as_str()),
                    record.bg_severity.map(|value| value.as_str()),
                    record.felt_hypo,
                    record.notes,
                    record.ended_at.to_rfc3339(),
                    record.recorded_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn list_outcomes(&self, limit: usize) -> Result<Vec<ExerciseOutcome>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, exercise_type, intensity, duration_minutes, bg_response,
                        bg_severity, felt_hypo, notes, ended_at, recorded_at
                 FROM exercise_outcomes
                 ORDER BY recorded_at DESC, rowid DESC
                 LIMIT ?1",
            )?;

            let mut rows = stmt.query(params![limit])?;
            let mut outcomes = Vec::new();
            while let Some(row) = rows.next()? {
                outcomes.push(row_to_outcome(row)?);
            }

            Ok(outcomes)
        })
        .await
    }

    pub async fn outcome_pattern(
        &self,
        exercise_type: ExerciseType,
        intensity: Intensity,
    ) -> Result<ExercisePattern> {
        self.execute(move |conn| {
            let counts = conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(CASE WHEN bg_response = 'dropped' THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN bg_response = 'rose' THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN bg_response = 'stable' THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(felt_hypo), 0)
                 FROM exercise_outcomes
                 WHERE exercise_type = ?1 AND intensity = ?2",
                params![exercise_type.as_str(), intensity.as_str()],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )?;

            let (total, dropped, rose, stable, hypo) = counts;
            Ok(ExercisePattern::from_counts(
                to_u32(total, "total_sessions")?,
                to_u32(dropped, "dropped_count")?,
                to_u32(rose, "rose_count")?,
                to_u32(stable, "stable_count")?,
                to_u32(hypo, "hypo_count")?,
            ))
        })
        .await
    }
}
