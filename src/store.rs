//! Durable storage contract for the active session and outcome history.

use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    exercise::{EndedSession, ExerciseSession, ExerciseType, Intensity, PreChecklist},
    models::{ExerciseOutcome, ExercisePattern, Profile},
};

/// Partial update of the active session record.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveExerciseUpdate {
    pub pre_checklist: Option<PreChecklist>,
    pub mid_check_done: Option<bool>,
}

impl ActiveExerciseUpdate {
    pub fn apply_to(&self, session: &mut ExerciseSession) {
        if let Some(checklist) = self.pre_checklist {
            session.pre_checklist = checklist;
        }
        if let Some(done) = self.mid_check_done {
            session.mid_check_done = done;
        }
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get_active_exercise(&self) -> Result<Option<ExerciseSession>>;

    /// Creates or replaces the single active session slot.
    async fn save_active_exercise(&self, session: &ExerciseSession) -> Result<()>;

    /// Clears the active slot if it still holds `session_id` and returns what it held.
    /// Returns `None` when the slot is empty or holds a different session.
    async fn end_exercise_session(&self, session_id: &str) -> Result<Option<ExerciseSession>>;

    /// Keeps the snapshot of an ended session until its outcome is recorded or dismissed.
    /// A later save replaces it.
    async fn save_pending_outcome(&self, ended: &EndedSession) -> Result<()>;

    async fn get_pending_outcome(&self) -> Result<Option<EndedSession>>;

    async fn clear_pending_outcome(&self) -> Result<Option<EndedSession>>;

    async fn add_exercise_outcome(&self, outcome: &ExerciseOutcome) -> Result<()>;

    /// Most recent first.
    async fn list_exercise_outcomes(&self, limit: usize) -> Result<Vec<ExerciseOutcome>>;

    async fn get_exercise_patterns(
        &self,
        exercise_type: ExerciseType,
        intensity: Intensity,
    ) -> Result<ExercisePattern>;

    async fn get_profile(&self) -> Result<Option<Profile>>;

    async fn save_profile(&self, profile: &Profile) -> Result<()>;

    /// The active session, only if it is still `session_id`.
    async fn get_active_exercise_by_id(&self, session_id: &str) -> Result<Option<ExerciseSession>> {
        Ok(self
            .get_active_exercise()
            .await?
            .filter(|session| session.id == session_id))
    }

    async fn start_exercise_phase(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ExerciseSession>> {
        let Some(mut session) = self.get_active_exercise_by_id(session_id).await? else {
            return Ok(None);
        };
        session.start(now)?;
        self.save_active_exercise(&session).await?;
        Ok(Some(session))
    }

    async fn finish_exercise_phase(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ExerciseSession>> {
        let Some(mut session) = self.get_active_exercise_by_id(session_id).await? else {
            return Ok(None);
        };
        session.finish(now)?;
        self.save_active_exercise(&session).await?;
        Ok(Some(session))
    }

    async fn update_active_exercise(
        &self,
        session_id: &str,
        update: ActiveExerciseUpdate,
    ) -> Result<Option<ExerciseSession>> {
        let Some(mut session) = self.get_active_exercise_by_id(session_id).await? else {
            return Ok(None);
        };
        update.apply_to(&mut session);
        self.save_active_exercise(&session).await?;
        Ok(Some(session))
    }
}

#[derive(Debug, Default)]
struct MemoryData {
    active: Option<ExerciseSession>,
    pending: Option<EndedSession>,
    outcomes: Vec<ExerciseOutcome>,
    profile: Option<Profile>,
}

/// Process-local store with no persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<MemoryData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(profile: Profile) -> Self {
        let store = Self::default();
        store.lock().profile = Some(profile);
        store
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryData> {
        self.data
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get_active_exercise(&self) -> Result<Option<ExerciseSession>> {
        Ok(self.lock().active.clone())
    }

    async fn save_active_exercise(&self, session: &ExerciseSession) -> Result<()> {
        self.lock().active = Some(session.clone());
        Ok(())
    }

    async fn end_exercise_session(&self, session_id: &str) -> Result<Option<ExerciseSession>> {
        let mut data = self.lock();
        if data
            .active
            .as_ref()
            .is_some_and(|session| session.id == session_id)
        {
            Ok(data.active.take())
        } else {
            Ok(None)
        }
    }

    async fn save_pending_outcome(&self, ended: &EndedSession) -> Result<()> {
        self.lock().pending = Some(ended.clone());
        Ok(())
    }

    async fn get_pending_outcome(&self) -> Result<Option<EndedSession>> {
        Ok(self.lock().pending.clone())
    }

    async fn clear_pending_outcome(&self) -> Result<Option<EndedSession>> {
        Ok(self.lock().pending.take())
    }

    async fn add_exercise_outcome(&self, outcome: &ExerciseOutcome) -> Result<()> {
        self.lock().outcomes.push(outcome.clone());
        Ok(())
    }

    async fn list_exercise_outcomes(&self, limit: usize) -> Result<Vec<ExerciseOutcome>> {
        Ok(self
            .lock()
            .outcomes
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_exercise_patterns(
        &self,
        exercise_type: ExerciseType,
        intensity: Intensity,
    ) -> Result<ExercisePattern> {
        let data = self.lock();
        Ok(ExercisePattern::from_outcomes(data.outcomes.iter().filter(
            |outcome| outcome.exercise_type == exercise_type && outcome.intensity == intensity,
        )))
    }

    async fn get_profile(&self) -> Result<Option<Profile>> {
        Ok(self.lock().profile.clone())
    }

    async fn save_profile(&self, profile: &Profile) -> Result<()> {
        self.lock().profile = Some(profile.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exercise::{BgResponse, PhaseKind};
    use crate::models::OutcomeInput;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 10, 0, 0).unwrap()
    }

    fn new_session() -> ExerciseSession {
        ExerciseSession::new(ExerciseType::Cardio, Intensity::Moderate, 30, None, t0()).unwrap()
    }

    #[tokio::test]
    async fn test_save_replaces_active_slot() {
        let store = MemoryStore::new();
        let first = new_session();
        let second = new_session();
        store.save_active_exercise(&first).await.unwrap();
        store.save_active_exercise(&second).await.unwrap();
        assert_eq!(
            store.get_active_exercise().await.unwrap().unwrap().id,
            second.id
        );
    }

    #[tokio::test]
    async fn test_end_returns_snapshot_once() {
        let store = MemoryStore::new();
        let session = new_session();
        store.save_active_exercise(&session).await.unwrap();
        assert_eq!(
            store.end_exercise_session(&session.id).await.unwrap(),
            Some(session.clone())
        );
        assert_eq!(store.end_exercise_session(&session.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_end_leaves_a_different_session_alone() {
        let store = MemoryStore::new();
        let stale = new_session();
        let current = new_session();
        store.save_active_exercise(&current).await.unwrap();

        assert_eq!(store.end_exercise_session(&stale.id).await.unwrap(), None);
        assert!(store.start_exercise_phase(&stale.id, t0()).await.unwrap().is_none());
        assert_eq!(
            store.get_active_exercise().await.unwrap().map(|session| session.id),
            Some(current.id)
        );
    }

    #[tokio::test]
    async fn test_phase_helpers_apply_transitions() {
        let store = MemoryStore::new();
        let session = new_session();
        assert!(store.start_exercise_phase(&session.id, t0()).await.unwrap().is_none());

        store.save_active_exercise(&session).await.unwrap();
        let started = store
            .start_exercise_phase(&session.id, t0())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(started.phase_kind(), PhaseKind::Active);

        let updated = store
            .update_active_exercise(
                &session.id,
                ActiveExerciseUpdate {
                    mid_check_done: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert!(updated.mid_check_done);

        let finished = store
            .finish_exercise_phase(&session.id, t0() + Duration::minutes(30))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(finished.phase_kind(), PhaseKind::Recovery);
        assert!(store
            .finish_exercise_phase(&session.id, t0() + Duration::minutes(31))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_patterns_filter_by_type_and_intensity() {
        let store = MemoryStore::new();
        let session = new_session();
        for response in [BgResponse::Dropped, BgResponse::Dropped, BgResponse::Stable] {
            let outcome = ExerciseOutcome::from_session(
                &session,
                OutcomeInput {
                    bg_response: Some(response),
                    ..Default::default()
                },
                t0(),
                t0(),
            );
            store.add_exercise_outcome(&outcome).await.unwrap();
        }

        let pattern = store
            .get_exercise_patterns(ExerciseType::Cardio, Intensity::Moderate)
            .await
            .unwrap();
        assert_eq!(pattern.total_sessions, 3);
        assert_eq!(pattern.dropped_count, 2);
        assert_eq!(pattern.avg_pattern, Some(BgResponse::Dropped));

        let other = store
            .get_exercise_patterns(ExerciseType::Cardio, Intensity::Intense)
            .await
            .unwrap();
        assert_eq!(other.total_sessions, 0);
        assert_eq!(store.list_exercise_outcomes(2).await.unwrap().len(), 2);
    }
}
