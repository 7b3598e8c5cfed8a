use anyhow::Result;
use async_trait::async_trait;

use crate::{
    exercise::{EndedSession, ExerciseSession, ExerciseType, Intensity},
    models::{ExerciseOutcome, ExercisePattern, Profile},
    store::SessionStore,
};

use super::connection::Database;

#[async_trait]
impl SessionStore for Database {
    async fn get_active_exercise(&self) -> Result<Option<ExerciseSession>> {
        self.load_active_exercise().await
    }

    async fn save_active_exercise(&self, session: &ExerciseSession) -> Result<()> {
        self.store_active_exercise(session).await
    }

    async fn end_exercise_session(&self, session_id: &str) -> Result<Option<ExerciseSession>> {
        self.take_active_exercise(session_id).await
    }

    async fn save_pending_outcome(&self, ended: &EndedSession) -> Result<()> {
        self.store_pending_outcome(ended).await
    }

    async fn get_pending_outcome(&self) -> Result<Option<EndedSession>> {
        self.load_pending_outcome().await
    }

    async fn clear_pending_outcome(&self) -> Result<Option<EndedSession>> {
        self.take_pending_outcome().await
    }

    async fn add_exercise_outcome(&self, outcome: &ExerciseOutcome) -> Result<()> {
        self.insert_outcome(outcome).await
    }

    async fn list_exercise_outcomes(&self, limit: usize) -> Result<Vec<ExerciseOutcome>> {
        self.list_outcomes(limit).await
    }

    async fn get_exercise_patterns(
        &self,
        exercise_type: ExerciseType,
        intensity: Intensity,
    ) -> Result<ExercisePattern> {
        self.outcome_pattern(exercise_type, intensity).await
    }

    async fn get_profile(&self) -> Result<Option<Profile>> {
        self.load_profile().await
    }

    async fn save_profile(&self, profile: &Profile) -> Result<()> {
        self.store_profile(profile).await
    }
}
