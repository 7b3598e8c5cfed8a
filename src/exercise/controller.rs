use std::{sync::Arc, time::Duration};

use anyhow::Result;
use chrono::{DateTime, Local, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    models::{is_pump, ExerciseOutcome, ExercisePattern, OutcomeInput},
    store::{ActiveExerciseUpdate, SessionStore},
};

use super::{
    clock::{Clock, SystemClock},
    error::TransitionError,
    guidance::{type_config, DEFAULT_EVENING_HOUR},
    state::{ExerciseSession, PreChecklist, TickOutcome},
    types::{ChecklistItem, ExerciseType, Intensity, PhaseKind},
    view::{SessionView, ViewContext},
};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum EndReason {
    /// The recovery window ran out on its own.
    RecoveryElapsed,
    /// The user ended or skipped recovery.
    Manual,
}

/// Snapshot handed to outcome capture, identical for every way a session can end.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EndedSession {
    pub session: ExerciseSession,
    pub ended_at: DateTime<Utc>,
    pub reason: EndReason,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum SessionEvent {
    StateChanged {
        session: Option<ExerciseSession>,
    },
    Heartbeat {
        session: ExerciseSession,
        elapsed_ms: Option<i64>,
        recovery_remaining_ms: Option<i64>,
    },
    MidCheckDue {
        session_id: String,
        message: &'static str,
    },
    RecoveryStarted {
        session_id: String,
        recovery_ends_at: DateTime<Utc>,
    },
    SessionEnded {
        ended: EndedSession,
    },
    SessionCancelled {
        session_id: String,
    },
}

/// Result of one controller tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickEffect {
    NoSession,
    Unchanged,
    /// First tick at which the mid-check became eligible.
    MidCheckPrompted,
    RecoveryStarted { recovery_ends_at: DateTime<Utc> },
    Ended(EndedSession),
}

#[derive(Debug, Clone, Copy)]
pub struct ControllerOptions {
    pub tick_interval: Duration,
    pub heartbeat_every_ticks: u32,
    pub evening_hour: u32,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            heartbeat_every_ticks: 1,
            evening_hour: DEFAULT_EVENING_HOUR,
        }
    }
}

#[derive(Debug, Default)]
struct ControllerState {
    session: Option<ExerciseSession>,
    /// Set once the mid-check event has fired for the current session.
    mid_check_prompted: bool,
}

impl ControllerState {
    fn active(&self) -> Result<ExerciseSession, TransitionError> {
        self.session.clone().ok_or(TransitionError::NoActiveSession)
    }

    fn forget(&mut self) {
        self.session = None;
        self.mid_check_prompted = false;
    }
}

struct Ticker {
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

#[derive(Clone)]
pub struct ExerciseSessionController {
    state: Arc<Mutex<ControllerState>>,
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<SessionEvent>,
    ticker: Arc<Mutex<Option<Ticker>>>,
    options: ControllerOptions,
}

impl ExerciseSessionController {
    pub fn new(
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        options: ControllerOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(ControllerState::default())),
            store,
            clock,
            events,
            ticker: Arc::new(Mutex::new(None)),
            options,
        }
    }

    pub fn with_system_clock(store: Arc<dyn SessionStore>, options: ControllerOptions) -> Self {
        Self::new(store, Arc::new(SystemClock), options)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Reloads the active session from the store, picking up changes made elsewhere.
    pub async fn refresh(&self) -> Result<Option<ExerciseSession>> {
        let mut guard = self.state.lock().await;
        let stored = self.store.get_active_exercise().await?;

        let same_session = match (&guard.session, &stored) {
            (Some(current), Some(next)) => current.id == next.id,
            _ => false,
        };
        if !same_session {
            guard.mid_check_prompted = stored
                .as_ref()
                .map(|session| session.mid_check_done)
                .unwrap_or(false);
        }
        guard.session = stored.clone();
        Ok(stored)
    }

    pub async fn current_session(&self) -> Option<ExerciseSession> {
        self.state.lock().await.session.clone()
    }

    pub async fn create(
        &self,
        exercise_type: ExerciseType,
        intensity: Intensity,
        duration_minutes: u32,
        name: Option<String>,
    ) -> Result<ExerciseSession> {
        let session = ExerciseSession::new(
            exercise_type,
            intensity,
            duration_minutes,
            name,
            self.clock.now(),
        )?;

        {
            let mut guard = self.state.lock().await;
            if let Some(previous) = guard.session.as_ref() {
                log_warn!(
                    "replacing active exercise session {} ({}) with a new one",
                    previous.id,
                    previous.phase_kind()
                );
            }
            self.store.save_active_exercise(&session).await?;
            guard.session = Some(session.clone());
            guard.mid_check_prompted = false;
        }

        log_info!(
            "created {} {} session {} for {} min",
            intensity,
            exercise_type,
            session.id,
            duration_minutes
        );
        self.emit_state_changed(Some(session.clone()));
        Ok(session)
    }

    pub async fn toggle_checklist_item(&self, item: ChecklistItem) -> Result<PreChecklist> {
        let session = {
            let mut guard = self.state.lock().await;
            let mut session = guard.active()?;
            session.toggle_checklist_item(item)?;
            let update = ActiveExerciseUpdate {
                pre_checklist: Some(session.pre_checklist),
                ..Default::default()
            };
            let stored = self
                .store
                .update_active_exercise(&session.id, update)
                .await?;
            Self::settle(&mut guard, &session.id, stored)?
        };

        self.emit_state_changed(Some(session.clone()));
        Ok(session.pre_checklist)
    }

    pub async fn start(&self) -> Result<ExerciseSession> {
        let now = self.clock.now();
        let session = {
            let mut guard = self.state.lock().await;
            let session_id = guard.active()?.id;
            let stored = self.store.start_exercise_phase(&session_id, now).await?;
            Self::settle(&mut guard, &session_id, stored)?
        };

        log_info!("exercise session {} started", session.id);
        self.emit_state_changed(Some(session.clone()));
        Ok(session)
    }

    pub async fn dismiss_mid_check(&self) -> Result<ExerciseSession> {
        let session = {
            let mut guard = self.state.lock().await;
            let mut session = guard.active()?;
            session.dismiss_mid_check()?;
            let update = ActiveExerciseUpdate {
                mid_check_done: Some(true),
                ..Default::default()
            };
            let stored = self
                .store
                .update_active_exercise(&session.id, update)
                .await?;
            let session = Self::settle(&mut guard, &session.id, stored)?;
            guard.mid_check_prompted = true;
            session
        };

        self.emit_state_changed(Some(session.clone()));
        Ok(session)
    }

    /// Ends the active phase early and opens the recovery window.
    pub async fn finish(&self) -> Result<ExerciseSession> {
        let now = self.clock.now();
        let session = {
            let mut guard = self.state.lock().await;
            let session_id = guard.active()?.id;
            let stored = self.store.finish_exercise_phase(&session_id, now).await?;
            Self::settle(&mut guard, &session_id, stored)?
        };

        if let Some(recovery_ends_at) = session.phase.recovery_ends_at() {
            log_info!(
                "exercise session {} finished early; recovery until {}",
                session.id,
                recovery_ends_at
            );
            self.emit(SessionEvent::RecoveryStarted {
                session_id: session.id.clone(),
                recovery_ends_at,
            });
        }
        self.emit_state_changed(Some(session.clone()));
        Ok(session)
    }

    /// Ends recovery now. The returned snapshot is kept for outcome capture.
    pub async fn end(&self) -> Result<EndedSession> {
        let mut guard = self.state.lock().await;
        guard.active()?.ensure_can_end()?;
        let ended_at = self.clock.now();
        let ended = self
            .terminate(&mut guard, EndReason::Manual, ended_at)
            .await?
            .ok_or(TransitionError::NoActiveSession)?;
        Ok(ended)
    }

    /// Same as [`Self::end`]; skipping recovery has no separate effect.
    pub async fn skip(&self) -> Result<EndedSession> {
        self.end().await
    }

    /// Discards a session that never started. No outcome is offered.
    pub async fn cancel(&self) -> Result<ExerciseSession> {
        let session = {
            let mut guard = self.state.lock().await;
            let session = guard.active()?;
            session.ensure_can_cancel()?;
            let removed = self.store.end_exercise_session(&session.id).await?;
            Self::settle(&mut guard, &session.id, removed)?;
            guard.forget();
            session
        };

        log_info!("exercise session {} cancelled before start", session.id);
        self.emit(SessionEvent::SessionCancelled {
            session_id: session.id.clone(),
        });
        self.emit_state_changed(None);
        Ok(session)
    }

    /// Evaluates time-driven transitions against the clock.
    pub async fn tick(&self) -> Result<TickEffect> {
        let now = self.clock.now();
        let mut guard = self.state.lock().await;

        // Checked under the lock so a terminal transition can only fire once.
        let Some(mut session) = guard.session.clone() else {
            return Ok(TickEffect::NoSession);
        };

        match session.tick(now) {
            TickOutcome::Unchanged => Ok(TickEffect::Unchanged),
            TickOutcome::MidCheckDue => {
                if guard.mid_check_prompted {
                    return Ok(TickEffect::Unchanged);
                }
                guard.mid_check_prompted = true;
                log_info!("mid-session check due for {}", session.id);
                self.emit(SessionEvent::MidCheckDue {
                    session_id: session.id.clone(),
                    message: type_config(session.exercise_type).mid_check_message,
                });
                Ok(TickEffect::MidCheckPrompted)
            }
            TickOutcome::EnteredRecovery { recovery_ends_at } => {
                let Some(stored) = self.store.get_active_exercise_by_id(&session.id).await? else {
                    log_warn!(
                        "exercise session {} was ended elsewhere; dropping it",
                        session.id
                    );
                    guard.forget();
                    return Ok(TickEffect::NoSession);
                };

                if stored.phase_kind() != PhaseKind::Active {
                    // Another instance already moved it on; follow the stored copy.
                    let effect = match stored.phase.recovery_ends_at() {
                        Some(recovery_ends_at) => TickEffect::RecoveryStarted { recovery_ends_at },
                        None => TickEffect::Unchanged,
                    };
                    guard.session = Some(stored.clone());
                    drop(guard);
                    self.emit_state_changed(Some(stored));
                    return Ok(effect);
                }

                session.mid_check_done = stored.mid_check_done;
                session.pre_checklist = stored.pre_checklist;
                self.store.save_active_exercise(&session).await?;
                guard.session = Some(session.clone());
                drop(guard);

                log_info!(
                    "exercise session {} reached its planned duration; recovery until {}",
                    session.id,
                    recovery_ends_at
                );
                self.emit(SessionEvent::RecoveryStarted {
                    session_id: session.id.clone(),
                    recovery_ends_at,
                });
                self.emit_state_changed(Some(session));
                Ok(TickEffect::RecoveryStarted { recovery_ends_at })
            }
            TickOutcome::RecoveryElapsed => {
                let ended_at = session.phase.recovery_ends_at().unwrap_or(now);
                match self
                    .terminate(&mut guard, EndReason::RecoveryElapsed, ended_at)
                    .await?
                {
                    Some(ended) => Ok(TickEffect::Ended(ended)),
                    None => Ok(TickEffect::NoSession),
                }
            }
        }
    }

    /// Applies every time-driven transition that came due while nothing was
    /// ticking, e.g. between two short-lived processes.
    pub async fn catch_up(&self) -> Result<Vec<TickEffect>> {
        let mut effects = Vec::new();
        loop {
            let effect = self.tick().await?;
            let more = matches!(effect, TickEffect::RecoveryStarted { .. });
            effects.push(effect);
            if !more {
                return Ok(effects);
            }
        }
    }

    pub async fn pending_outcome(&self) -> Result<Option<EndedSession>> {
        self.store.get_pending_outcome().await
    }

    /// Closes the outcome dialog without writing anything.
    pub async fn discard_pending_outcome(&self) -> Result<Option<EndedSession>> {
        let _guard = self.state.lock().await;
        self.store.clear_pending_outcome().await
    }

    /// Writes an outcome for the session that ended last. Returns `None` when
    /// there is nothing awaiting capture.
    pub async fn record_outcome(&self, input: OutcomeInput) -> Result<Option<ExerciseOutcome>> {
        let _guard = self.state.lock().await;
        let Some(ended) = self.store.get_pending_outcome().await? else {
            log_info!("no ended session awaiting an outcome; skipping write");
            return Ok(None);
        };

        let outcome =
            ExerciseOutcome::from_session(&ended.session, input, ended.ended_at, self.clock.now());
        self.store.add_exercise_outcome(&outcome).await?;
        self.store.clear_pending_outcome().await?;

        log_info!(
            "recorded outcome {} for session {}",
            outcome.id,
            outcome.session_id
        );
        Ok(Some(outcome))
    }

    pub async fn patterns(
        &self,
        exercise_type: ExerciseType,
        intensity: Intensity,
    ) -> Result<ExercisePattern> {
        self.store
            .get_exercise_patterns(exercise_type, intensity)
            .await
    }

    pub async fn view(&self) -> Result<Option<SessionView>> {
        let Some(session) = self.current_session().await else {
            return Ok(None);
        };

        let profile = match self.store.get_profile().await {
            Ok(profile) => profile,
            Err(err) => {
                log_warn!("failed to load profile, assuming injections: {err:#}");
                None
            }
        };

        let now = self.clock.now();
        let ctx = ViewContext {
            now,
            local_hour: now.with_timezone(&Local).hour(),
            evening_hour: self.options.evening_hour,
            is_pump: is_pump(profile.as_ref()),
        };
        Ok(Some(SessionView::build(&session, ctx)))
    }

    /// Starts the recurring tick task. Replaces any ticker already running.
    pub async fn spawn_ticker(&self) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(previous) = ticker_guard.take() {
            previous.cancel_token.cancel();
            previous.handle.abort();
        }

        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();
        let controller = self.clone();

        let handle = tokio::spawn(async move {
            let mut interval = time::interval(controller.options.tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let heartbeat_every = controller.options.heartbeat_every_ticks.max(1);
            let mut ticks: u32 = 0;

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = token.cancelled() => {
                        log_info!("exercise ticker cancelled");
                        break;
                    }
                }

                match controller.tick().await {
                    Ok(TickEffect::NoSession) | Ok(TickEffect::Ended(_)) => break,
                    Ok(_) => {}
                    Err(err) => log_error!("exercise tick failed: {err:#}"),
                }

                ticks = ticks.wrapping_add(1);
                if ticks % heartbeat_every == 0 {
                    controller.emit_heartbeat().await;
                }
            }
        });

        *ticker_guard = Some(Ticker {
            handle,
            cancel_token,
        });
    }

    /// Stops the tick task and waits for it to exit.
    pub async fn stop_ticker(&self) {
        let ticker = self.ticker.lock().await.take();
        if let Some(ticker) = ticker {
            ticker.cancel_token.cancel();
            if let Err(err) = ticker.handle.await {
                if !err.is_cancelled() {
                    log_error!("exercise ticker exited abnormally: {err}");
                }
            }
        }
    }

    /// Resolves once the ticker exits on its own (session over) or is stopped.
    pub async fn wait_for_ticker(&self) {
        let ticker = self.ticker.lock().await.take();
        if let Some(ticker) = ticker {
            let _ = ticker.handle.await;
        }
    }

    /// Adopts what the store returned for `session_id`. `None` means another
    /// instance ended or replaced the session, so the local copy is dropped.
    fn settle(
        guard: &mut ControllerState,
        session_id: &str,
        stored: Option<ExerciseSession>,
    ) -> Result<ExerciseSession, TransitionError> {
        match stored {
            Some(session) => {
                guard.session = Some(session.clone());
                Ok(session)
            }
            None => {
                log_warn!("exercise session {session_id} is no longer in the store");
                guard.forget();
                Err(TransitionError::NoActiveSession)
            }
        }
    }

    /// Clears the session from memory and the store in one step and keeps the
    /// snapshot for outcome capture. Returns `None` without side effects when
    /// the store no longer holds this session.
    async fn terminate(
        &self,
        guard: &mut ControllerState,
        reason: EndReason,
        ended_at: DateTime<Utc>,
    ) -> Result<Option<EndedSession>> {
        let Some(session_id) = guard.session.as_ref().map(|session| session.id.clone()) else {
            return Ok(None);
        };

        let Some(session) = self.store.end_exercise_session(&session_id).await? else {
            log_warn!("exercise session {session_id} was already ended elsewhere");
            guard.forget();
            return Ok(None);
        };

        let ended = EndedSession {
            session,
            ended_at,
            reason,
        };
        guard.forget();
        self.store.save_pending_outcome(&ended).await?;

        log_info!(
            "exercise session {} ended ({:?})",
            ended.session.id,
            reason
        );
        self.emit(SessionEvent::SessionEnded {
            ended: ended.clone(),
        });
        self.emit_state_changed(None);
        Ok(Some(ended))
    }

    async fn emit_heartbeat(&self) {
        let now = self.clock.now();
        let Some(session) = self.current_session().await else {
            return;
        };
        self.emit(SessionEvent::Heartbeat {
            elapsed_ms: session.elapsed_ms(now),
            recovery_remaining_ms: session.recovery_remaining_ms(now),
            session,
        });
    }

    fn emit_state_changed(&self, session: Option<ExerciseSession>) {
        self.emit(SessionEvent::StateChanged { session });
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        exercise::{BgResponse, BgSeverity, ManualClock},
        models::{InsulinDeliveryMethod, Profile},
        store::MemoryStore,
    };
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 20, 8, 0, 0).unwrap()
    }

    fn setup() -> (ExerciseSessionController, Arc<ManualClock>, Arc<MemoryStore>) {
        let clock = Arc::new(ManualClock::new(t0()));
        let store = Arc::new(MemoryStore::new());
        let controller =
            ExerciseSessionController::new(store.clone(), clock.clone(), ControllerOptions::default());
        (controller, clock, store)
    }

    #[tokio::test]
    async fn test_hiit_scenario_end_to_end() {
        let (controller, clock, store) = setup();
        controller
            .create(ExerciseType::Hiit, Intensity::Intense, 30, None)
            .await
            .unwrap();
        controller.start().await.unwrap();

        clock.advance(ChronoDuration::minutes(11));
        assert_eq!(controller.tick().await.unwrap(), TickEffect::Unchanged);

        clock.advance(ChronoDuration::minutes(1));
        assert_eq!(controller.tick().await.unwrap(), TickEffect::MidCheckPrompted);
        assert_eq!(controller.tick().await.unwrap(), TickEffect::Unchanged);

        let dismissed = controller.dismiss_mid_check().await.unwrap();
        assert!(dismissed.mid_check_done);

        clock.set(t0() + ChronoDuration::minutes(30));
        let effect = controller.tick().await.unwrap();
        let expected_end = t0()
            + ChronoDuration::minutes(30)
            + crate::exercise::recovery_window(ExerciseType::Hiit, Intensity::Intense);
        assert_eq!(
            effect,
            TickEffect::RecoveryStarted {
                recovery_ends_at: expected_end
            }
        );

        let stored = store.get_active_exercise().await.unwrap().unwrap();
        assert_eq!(stored.phase_kind(), PhaseKind::Recovery);
        assert_eq!(stored.phase.recovery_ends_at(), Some(expected_end));
    }

    #[tokio::test]
    async fn test_recovery_expiry_fires_once() {
        let (controller, clock, store) = setup();
        controller
            .create(ExerciseType::Walking, Intensity::Light, 20, None)
            .await
            .unwrap();
        controller.start().await.unwrap();
        clock.advance(ChronoDuration::minutes(5));
        let finished = controller.finish().await.unwrap();
        let ends_at = finished.phase.recovery_ends_at().unwrap();

        clock.set(ends_at);
        let effect = controller.tick().await.unwrap();
        let TickEffect::Ended(ended) = effect else {
            panic!("expected session to end, got {effect:?}");
        };
        assert_eq!(ended.reason, EndReason::RecoveryElapsed);
        assert_eq!(ended.session.id, finished.id);

        assert_eq!(controller.tick().await.unwrap(), TickEffect::NoSession);
        assert!(store.get_active_exercise().await.unwrap().is_none());
        assert_eq!(controller.pending_outcome().await.unwrap(), Some(ended));
    }

    #[tokio::test]
    async fn test_manual_end_and_skip_share_snapshot_shape() {
        let (controller, clock, _store) = setup();
        for use_skip in [false, true] {
            controller
                .create(ExerciseType::Strength, Intensity::Moderate, 45, None)
                .await
                .unwrap();
            controller.start().await.unwrap();
            clock.advance(ChronoDuration::minutes(45));
            controller.tick().await.unwrap();

            let ended = if use_skip {
                controller.skip().await.unwrap()
            } else {
                controller.end().await.unwrap()
            };
            assert_eq!(ended.reason, EndReason::Manual);
            assert_eq!(ended.session.phase_kind(), PhaseKind::Recovery);
            assert!(controller.current_session().await.is_none());
        }
    }

    #[tokio::test]
    async fn test_cancel_in_pre_writes_no_outcome() {
        let (controller, _clock, store) = setup();
        controller
            .create(ExerciseType::Yoga, Intensity::Light, 30, None)
            .await
            .unwrap();
        controller.cancel().await.unwrap();

        assert!(store.get_active_exercise().await.unwrap().is_none());
        assert!(controller.pending_outcome().await.unwrap().is_none());
        assert_eq!(
            controller
                .record_outcome(OutcomeInput::default())
                .await
                .unwrap(),
            None
        );
        assert!(store.list_exercise_outcomes(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_after_start_is_rejected() {
        let (controller, _clock, _store) = setup();
        controller
            .create(ExerciseType::Cardio, Intensity::Light, 30, None)
            .await
            .unwrap();
        controller.start().await.unwrap();
        let err = controller.cancel().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TransitionError>(),
            Some(TransitionError::InvalidTransition {
                phase: PhaseKind::Active,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_operations_without_session_fail() {
        let (controller, _clock, _store) = setup();
        let err = controller.start().await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<TransitionError>(),
            Some(&TransitionError::NoActiveSession)
        );
        assert!(controller.end().await.is_err());
        assert_eq!(controller.tick().await.unwrap(), TickEffect::NoSession);
    }

    #[tokio::test]
    async fn test_record_outcome_consumes_pending_session() {
        let (controller, clock, store) = setup();
        controller
            .create(ExerciseType::Cardio, Intensity::Moderate, 30, None)
            .await
            .unwrap();
        controller.start().await.unwrap();
        clock.advance(ChronoDuration::minutes(30));
        controller.tick().await.unwrap();
        controller.end().await.unwrap();

        let outcome = controller
            .record_outcome(OutcomeInput {
                bg_response: Some(BgResponse::Dropped),
                bg_severity: Some(BgSeverity::ALot),
                felt_hypo: true,
                notes: None,
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.duration_minutes, 30);
        assert_eq!(outcome.bg_severity, Some(BgSeverity::ALot));

        assert_eq!(
            controller
                .record_outcome(OutcomeInput::default())
                .await
                .unwrap(),
            None
        );

        let pattern = controller
            .patterns(ExerciseType::Cardio, Intensity::Moderate)
            .await
            .unwrap();
        assert_eq!(pattern.total_sessions, 1);
        assert_eq!(pattern.hypo_count, 1);
        assert_eq!(store.list_exercise_outcomes(5).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_replaces_existing_session() {
        let (controller, _clock, store) = setup();
        let first = controller
            .create(ExerciseType::Cardio, Intensity::Moderate, 30, None)
            .await
            .unwrap();
        let second = controller
            .create(ExerciseType::Swimming, Intensity::Light, 20, Some("Pool".into()))
            .await
            .unwrap();
        assert_ne!(first.id, second.id);
        let stored = store.get_active_exercise().await.unwrap().unwrap();
        assert_eq!(stored.id, second.id);
        assert_eq!(stored.name, "Pool");
    }

    #[tokio::test]
    async fn test_view_uses_profile_delivery_method() {
        let clock = Arc::new(ManualClock::new(t0()));
        let store = Arc::new(MemoryStore::with_profile(Profile {
            display_name: None,
            insulin_delivery_method: InsulinDeliveryMethod::Pump,
        }));
        let controller =
            ExerciseSessionController::new(store, clock, ControllerOptions::default());
        controller
            .create(ExerciseType::Cardio, Intensity::Moderate, 30, None)
            .await
            .unwrap();

        let view = controller.view().await.unwrap().unwrap();
        let basal = view
            .checklist
            .iter()
            .find(|row| row.item == ChecklistItem::BasalAdjusted)
            .unwrap();
        assert_eq!(
            basal.label,
            type_config(ExerciseType::Cardio).checklist.basal_adjusted_pump
        );
    }

    #[tokio::test]
    async fn test_refresh_picks_up_external_changes() {
        let (controller, clock, store) = setup();
        assert!(controller.refresh().await.unwrap().is_none());

        let session =
            ExerciseSession::new(ExerciseType::Sports, Intensity::Intense, 90, None, clock.now())
                .unwrap();
        store.save_active_exercise(&session).await.unwrap();
        let loaded = controller.refresh().await.unwrap().unwrap();
        assert_eq!(loaded.id, session.id);
        assert_eq!(controller.current_session().await, Some(session));
    }

    #[tokio::test]
    async fn test_events_are_broadcast() {
        let (controller, clock, _store) = setup();
        let mut events = controller.subscribe();
        controller
            .create(ExerciseType::Cardio, Intensity::Moderate, 10, None)
            .await
            .unwrap();
        controller.start().await.unwrap();
        clock.advance(ChronoDuration::minutes(5));
        controller.tick().await.unwrap();

        let mut saw_mid_check = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, SessionEvent::MidCheckDue { .. }) {
                saw_mid_check = true;
            }
        }
        assert!(saw_mid_check);
    }

    #[tokio::test]
    async fn test_ticker_stops_when_session_ends() {
        let (controller, clock, _store) = setup();
        controller
            .create(ExerciseType::Yoga, Intensity::Light, 10, None)
            .await
            .unwrap();
        controller.start().await.unwrap();
        clock.advance(ChronoDuration::minutes(10));
        controller.tick().await.unwrap();
        clock.advance(ChronoDuration::hours(2));

        controller.spawn_ticker().await;
        controller.wait_for_ticker().await;

        assert!(controller.current_session().await.is_none());
        assert_eq!(
            controller
                .pending_outcome()
                .await
                .unwrap()
                .map(|ended| ended.reason),
            Some(EndReason::RecoveryElapsed)
        );
    }

    fn shared_pair() -> (
        ExerciseSessionController,
        ExerciseSessionController,
        Arc<ManualClock>,
        Arc<MemoryStore>,
    ) {
        let clock = Arc::new(ManualClock::new(t0()));
        let store = Arc::new(MemoryStore::new());
        let first =
            ExerciseSessionController::new(store.clone(), clock.clone(), ControllerOptions::default());
        let second =
            ExerciseSessionController::new(store.clone(), clock.clone(), ControllerOptions::default());
        (first, second, clock, store)
    }

    #[tokio::test]
    async fn test_expiry_after_end_elsewhere_does_not_fire_twice() {
        let (watcher, other, clock, store) = shared_pair();
        watcher
            .create(ExerciseType::Walking, Intensity::Light, 20, None)
            .await
            .unwrap();
        watcher.start().await.unwrap();
        clock.advance(ChronoDuration::minutes(20));
        watcher.tick().await.unwrap();

        other.refresh().await.unwrap();
        let ended = other.end().await.unwrap();
        other.discard_pending_outcome().await.unwrap();

        let mut events = watcher.subscribe();
        clock.advance(ChronoDuration::hours(2));
        assert_eq!(watcher.tick().await.unwrap(), TickEffect::NoSession);
        assert!(watcher.current_session().await.is_none());
        assert!(store.get_pending_outcome().await.unwrap().is_none());
        assert!(events.try_recv().is_err());
        assert_eq!(ended.reason, EndReason::Manual);
    }

    #[tokio::test]
    async fn test_expiry_does_not_clear_a_newer_session() {
        let (watcher, other, clock, store) = shared_pair();
        watcher
            .create(ExerciseType::Yoga, Intensity::Light, 10, None)
            .await
            .unwrap();
        watcher.start().await.unwrap();
        clock.advance(ChronoDuration::minutes(10));
        watcher.tick().await.unwrap();

        let newer = other
            .create(ExerciseType::Cardio, Intensity::Moderate, 30, None)
            .await
            .unwrap();

        clock.advance(ChronoDuration::hours(1));
        assert_eq!(watcher.tick().await.unwrap(), TickEffect::NoSession);
        assert_eq!(
            store.get_active_exercise().await.unwrap().map(|session| session.id),
            Some(newer.id)
        );
        assert!(store.get_pending_outcome().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_active_copy_cannot_resurrect_ended_session() {
        let (watcher, other, clock, store) = shared_pair();
        watcher
            .create(ExerciseType::Strength, Intensity::Moderate, 30, None)
            .await
            .unwrap();
        watcher.start().await.unwrap();

        other.refresh().await.unwrap();
        clock.advance(ChronoDuration::minutes(5));
        other.finish().await.unwrap();
        other.end().await.unwrap();

        clock.advance(ChronoDuration::minutes(30));
        assert_eq!(watcher.tick().await.unwrap(), TickEffect::NoSession);
        assert!(store.get_active_exercise().await.unwrap().is_none());

        let err = watcher.start().await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<TransitionError>(),
            Some(&TransitionError::NoActiveSession)
        );
    }

    #[tokio::test]
    async fn test_catch_up_runs_every_overdue_transition() {
        let (controller, clock, store) = setup();
        controller
            .create(ExerciseType::Cardio, Intensity::Light, 30, None)
            .await
            .unwrap();
        controller.start().await.unwrap();

        clock.advance(ChronoDuration::minutes(45));
        let effects = controller.catch_up().await.unwrap();
        let expected_end = t0() + ChronoDuration::minutes(30 + 60);
        assert_eq!(
            effects,
            vec![
                TickEffect::RecoveryStarted {
                    recovery_ends_at: expected_end
                },
                TickEffect::Unchanged
            ]
        );

        clock.advance(ChronoDuration::hours(3));
        let effects = controller.catch_up().await.unwrap();
        let Some(TickEffect::Ended(ended)) = effects.last() else {
            panic!("expected the session to end, got {effects:?}");
        };
        assert_eq!(ended.reason, EndReason::RecoveryElapsed);
        assert_eq!(ended.ended_at, expected_end);
        assert_eq!(store.get_pending_outcome().await.unwrap(), Some(ended.clone()));
    }

    #[tokio::test]
    async fn test_outcome_can_be_recorded_by_a_later_controller() {
        let (first, clock, store) = setup();
        first
            .create(ExerciseType::Swimming, Intensity::Light, 20, None)
            .await
            .unwrap();
        first.start().await.unwrap();
        clock.advance(ChronoDuration::hours(3));
        first.catch_up().await.unwrap();
        drop(first);

        let later =
            ExerciseSessionController::new(store.clone(), clock.clone(), ControllerOptions::default());
        let outcome = later
            .record_outcome(OutcomeInput {
                bg_response: Some(BgResponse::Stable),
                ..Default::default()
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.exercise_type, ExerciseType::Swimming);
        assert!(later.pending_outcome().await.unwrap().is_none());
    }

    #[test]
    fn test_default_heartbeat_refreshes_every_second() {
        let options = ControllerOptions::default();
        assert_eq!(options.heartbeat_every_ticks, 1);
        assert_eq!(options.tick_interval, Duration::from_secs(1));
    }
}
