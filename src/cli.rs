use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use tokio::{sync::broadcast::error::RecvError, time};

use crate::{
    exercise::{
        pattern_summary, BgResponse, BgSeverity, ChecklistItem, EndReason, ExerciseType,
        Intensity, SessionEvent, TickEffect, TransitionError,
    },
    models::{InsulinDeliveryMethod, OutcomeInput},
    AppState,
};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// How often `watch` re-reads the store to notice changes made by other processes.
const STORE_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Parser)]
#[command(
    name = "diabeaters",
    version,
    about = "Exercise sessions with Type 1 diabetes guidance"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Plan a new session. Replaces any session that is already active.
    Create {
        #[arg(long = "type", value_name = "TYPE")]
        exercise_type: ExerciseType,
        #[arg(long, default_value = "moderate")]
        intensity: Intensity,
        #[arg(long)]
        minutes: u32,
        #[arg(long)]
        name: Option<String>,
    },
    /// Flip a pre-exercise checklist item.
    Toggle { item: ChecklistItem },
    /// Begin exercising.
    Start,
    /// Stop exercising early and enter recovery.
    Finish,
    /// End recovery now, optionally recording how it went.
    End(OutcomeArgs),
    /// Skip the rest of recovery. Same effect as `end`.
    Skip(OutcomeArgs),
    /// Record how the last ended session went.
    Outcome(OutcomeArgs),
    /// Drop a session that has not started yet.
    Cancel,
    /// Acknowledge the mid-session check.
    DismissMidCheck,
    /// Show the current session with guidance.
    Status,
    /// Follow the active session, printing events until it ends.
    Watch,
    /// Summarize past outcomes for one exercise type and intensity.
    Patterns {
        #[arg(long = "type", value_name = "TYPE")]
        exercise_type: ExerciseType,
        #[arg(long, default_value = "moderate")]
        intensity: Intensity,
    },
    /// List recorded outcomes, newest first.
    History {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Show or update the profile.
    Profile {
        #[arg(long)]
        method: Option<InsulinDeliveryMethod>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Show or update local settings. Takes effect on the next run.
    Settings {
        #[arg(long, value_parser = clap::value_parser!(u32).range(0..24))]
        evening_hour: Option<u32>,
        #[arg(long)]
        tick_ms: Option<u64>,
    },
}

#[derive(Debug, Clone, Default, Args)]
pub struct OutcomeArgs {
    #[arg(long)]
    pub response: Option<BgResponse>,
    #[arg(long)]
    pub severity: Option<BgSeverity>,
    #[arg(long)]
    pub felt_hypo: bool,
    #[arg(long)]
    pub notes: Option<String>,
}

impl OutcomeArgs {
    fn is_empty(&self) -> bool {
        self.response.is_none()
            && self.severity.is_none()
            && !self.felt_hypo
            && self.notes.is_none()
    }
}

impl From<OutcomeArgs> for OutcomeInput {
    fn from(args: OutcomeArgs) -> Self {
        Self {
            bg_response: args.response,
            bg_severity: args.severity,
            felt_hypo: args.felt_hypo,
            notes: args.notes,
        }
    }
}

/// Brings the session up to date with the clock, then runs `command`.
pub async fn dispatch(command: Command, state: &AppState) -> Result<Value> {
    let controller = &state.controller;
    controller.refresh().await?;
    for effect in controller.catch_up().await? {
        if let TickEffect::Ended(ended) = effect {
            log_info!(
                "session {} ended when its recovery window ran out; record how it went with `diabeaters outcome`",
                ended.session.id
            );
        }
    }
    execute(command, state).await
}

async fn execute(command: Command, state: &AppState) -> Result<Value> {
    let controller = &state.controller;

    let value = match command {
        Command::Create {
            exercise_type,
            intensity,
            minutes,
            name,
        } => json!(controller.create(exercise_type, intensity, minutes, name).await?),
        Command::Toggle { item } => json!(controller.toggle_checklist_item(item).await?),
        Command::Start => json!(controller.start().await?),
        Command::Finish => json!(controller.finish().await?),
        Command::End(outcome) => end_session(state, outcome, false).await?,
        Command::Skip(outcome) => end_session(state, outcome, true).await?,
        Command::Outcome(outcome) => {
            let recorded = controller.record_outcome(outcome.into()).await?;
            if recorded.is_none() {
                log_info!("no ended session is waiting for an outcome");
            }
            json!(recorded)
        }
        Command::Cancel => json!(controller.cancel().await?),
        Command::DismissMidCheck => json!(controller.dismiss_mid_check().await?),
        Command::Status => match controller.view().await? {
            Some(view) => json!(view),
            None => {
                log_info!("no active exercise session");
                Value::Null
            }
        },
        Command::Watch => {
            watch(state).await?;
            Value::Null
        }
        Command::Patterns {
            exercise_type,
            intensity,
        } => {
            let pattern = controller.patterns(exercise_type, intensity).await?;
            json!({
                "pattern": pattern,
                "summary": pattern_summary(exercise_type, &pattern),
            })
        }
        Command::History { limit } => {
            json!(controller.store().list_exercise_outcomes(limit).await?)
        }
        Command::Profile { method, name } => update_profile(state, method, name).await?,
        Command::Settings {
            evening_hour,
            tick_ms,
        } => {
            let mut settings = state.settings.get();
            if evening_hour.is_none() && tick_ms.is_none() {
                return Ok(json!(settings));
            }
            if let Some(hour) = evening_hour {
                settings.evening_snack_hour = hour;
            }
            if let Some(tick_ms) = tick_ms {
                settings.tick_interval_ms = tick_ms;
            }
            state.settings.update(settings)?;
            log_info!("settings saved");
            json!(settings)
        }
    };

    Ok(value)
}

async fn end_session(state: &AppState, outcome: OutcomeArgs, skip: bool) -> Result<Value> {
    let controller = &state.controller;
    let result = if skip {
        controller.skip().await
    } else {
        controller.end().await
    };

    let ended = match result {
        Ok(ended) => ended,
        Err(err) => {
            let no_session = matches!(
                err.downcast_ref::<TransitionError>(),
                Some(TransitionError::NoActiveSession)
            );
            // The recovery window may have run out before this command started.
            match controller.pending_outcome().await? {
                Some(ended) if no_session && ended.reason == EndReason::RecoveryElapsed => {
                    log_info!("session {} had already ended on its own", ended.session.id);
                    ended
                }
                _ => return Err(err),
            }
        }
    };

    let recorded = if outcome.is_empty() {
        controller.discard_pending_outcome().await?;
        None
    } else {
        controller.record_outcome(outcome.into()).await?
    };

    Ok(json!({ "ended": ended, "outcome": recorded }))
}

async fn update_profile(
    state: &AppState,
    method: Option<InsulinDeliveryMethod>,
    name: Option<String>,
) -> Result<Value> {
    let store = state.controller.store();
    let mut profile = store.get_profile().await?.unwrap_or_default();

    if method.is_none() && name.is_none() {
        return Ok(json!(profile));
    }
    if let Some(method) = method {
        profile.insulin_delivery_method = method;
    }
    if let Some(name) = name {
        profile.display_name = Some(name).filter(|value| !value.trim().is_empty());
    }

    store.save_profile(&profile).await?;
    log_info!(
        "profile updated ({})",
        profile.insulin_delivery_method.as_str()
    );
    Ok(json!(profile))
}

async fn watch(state: &AppState) -> Result<()> {
    let controller = &state.controller;
    if controller.current_session().await.is_none() {
        bail!("no active exercise session to watch");
    }

    let mut events = controller.subscribe();
    controller.spawn_ticker().await;

    let mut poll = time::interval(STORE_POLL_INTERVAL);
    poll.tick().await;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let finished = matches!(
                        event,
                        SessionEvent::SessionEnded { .. } | SessionEvent::SessionCancelled { .. }
                    );
                    println!("{}", serde_json::to_string(&event)?);
                    if let SessionEvent::SessionEnded { ended } = &event {
                        if ended.reason == EndReason::RecoveryElapsed {
                            log_info!("record how it went with `diabeaters outcome`");
                        }
                    }
                    if finished {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    log_warn!("watch fell behind; skipped {skipped} events");
                }
                Err(RecvError::Closed) => break,
            },
            _ = poll.tick() => {
                if controller.refresh().await?.is_none() {
                    log_info!("active session was cleared elsewhere");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log_info!("interrupted; leaving the session as it is");
                break;
            }
        }
    }

    controller.stop_ticker().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        exercise::{
            recovery_window, ControllerOptions, ExerciseSessionController, ManualClock,
        },
        settings::SettingsStore,
        store::{MemoryStore, SessionStore},
    };
    use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0).unwrap()
    }

    /// Fresh state per call, like a new process sharing the same store.
    fn invocation(store: &Arc<MemoryStore>, clock: &Arc<ManualClock>, dir: &TempDir) -> AppState {
        AppState {
            controller: ExerciseSessionController::new(
                store.clone(),
                clock.clone(),
                ControllerOptions::default(),
            ),
            settings: SettingsStore::new(dir.path().join("settings.json")).unwrap(),
        }
    }

    async fn run_started_session(
        store: &Arc<MemoryStore>,
        clock: &Arc<ManualClock>,
        dir: &TempDir,
        exercise_type: ExerciseType,
        intensity: Intensity,
        minutes: u32,
    ) {
        let create = Command::Create {
            exercise_type,
            intensity,
            minutes,
            name: None,
        };
        dispatch(create, &invocation(store, clock, dir)).await.unwrap();
        dispatch(Command::Start, &invocation(store, clock, dir))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_status_after_planned_duration_reports_recovery() {
        let dir = tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(t0()));
        run_started_session(&store, &clock, &dir, ExerciseType::Cardio, Intensity::Moderate, 30)
            .await;

        clock.advance(ChronoDuration::minutes(90));
        let view = dispatch(Command::Status, &invocation(&store, &clock, &dir))
            .await
            .unwrap();

        let expected_end = t0()
            + ChronoDuration::minutes(30)
            + recovery_window(ExerciseType::Cardio, Intensity::Moderate);
        assert_eq!(view["phase"], "recovery");
        assert_eq!(view["session"]["recoveryEndsAt"], json!(expected_end));
        assert!(view["recoveryRemainingMs"].is_i64());

        let finish = dispatch(Command::Finish, &invocation(&store, &clock, &dir)).await;
        assert!(finish.is_err());
        let stored = store.get_active_exercise().await.unwrap().unwrap();
        assert_eq!(stored.phase.recovery_ends_at(), Some(expected_end));
    }

    #[tokio::test]
    async fn test_end_after_expiry_keeps_automatic_reason() {
        let dir = tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(t0()));
        run_started_session(&store, &clock, &dir, ExerciseType::Walking, Intensity::Light, 20)
            .await;

        clock.advance(ChronoDuration::hours(3));
        let args = OutcomeArgs {
            response: Some(BgResponse::Stable),
            ..Default::default()
        };
        let value = dispatch(Command::End(args), &invocation(&store, &clock, &dir))
            .await
            .unwrap();

        assert_eq!(value["ended"]["reason"], "recoveryElapsed");
        assert_eq!(value["outcome"]["bgResponse"], "stable");
        assert!(store.get_pending_outcome().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_outcome_command_records_expired_session_later() {
        let dir = tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(t0()));
        run_started_session(&store, &clock, &dir, ExerciseType::Hiit, Intensity::Intense, 30)
            .await;

        clock.advance(ChronoDuration::hours(8));
        let status = dispatch(Command::Status, &invocation(&store, &clock, &dir))
            .await
            .unwrap();
        assert!(status.is_null());

        let args = OutcomeArgs {
            response: Some(BgResponse::Dropped),
            severity: Some(BgSeverity::ALittle),
            felt_hypo: true,
            notes: None,
        };
        let recorded = dispatch(Command::Outcome(args), &invocation(&store, &clock, &dir))
            .await
            .unwrap();
        assert_eq!(recorded["exerciseType"], "hiit");
        assert_eq!(recorded["bgSeverity"], "a_little");

        let again = dispatch(
            Command::Outcome(OutcomeArgs::default()),
            &invocation(&store, &clock, &dir),
        )
        .await
        .unwrap();
        assert!(again.is_null());
        assert_eq!(store.list_exercise_outcomes(5).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_end_before_recovery_still_fails() {
        let dir = tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(t0()));
        run_started_session(&store, &clock, &dir, ExerciseType::Yoga, Intensity::Light, 30)
            .await;

        let err = dispatch(
            Command::End(OutcomeArgs::default()),
            &invocation(&store, &clock, &dir),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TransitionError>(),
            Some(TransitionError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_create_parses_enums() {
        let cli = Cli::try_parse_from([
            "diabeaters",
            "create",
            "--type",
            "hiit",
            "--intensity",
            "intense",
            "--minutes",
            "30",
        ])
        .unwrap();
        match cli.command {
            Command::Create {
                exercise_type,
                intensity,
                minutes,
                name,
            } => {
                assert_eq!(exercise_type, ExerciseType::Hiit);
                assert_eq!(intensity, Intensity::Intense);
                assert_eq!(minutes, 30);
                assert_eq!(name, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_end_accepts_outcome_flags() {
        let cli = Cli::try_parse_from([
            "diabeaters",
            "end",
            "--response",
            "dropped",
            "--severity",
            "a_lot",
            "--felt-hypo",
        ])
        .unwrap();
        let Command::End(args) = cli.command else {
            panic!("expected end");
        };
        assert!(!args.is_empty());
        let input = OutcomeInput::from(args);
        assert_eq!(input.bg_response, Some(BgResponse::Dropped));
        assert_eq!(input.bg_severity, Some(BgSeverity::ALot));
        assert!(input.felt_hypo);
    }

    #[test]
    fn test_unknown_exercise_type_is_rejected() {
        let parsed =
            Cli::try_parse_from(["diabeaters", "create", "--type", "skydiving", "--minutes", "5"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_settings_rejects_out_of_range_hour() {
        assert!(Cli::try_parse_from(["diabeaters", "settings", "--evening-hour", "24"]).is_err());
        assert!(Cli::try_parse_from(["diabeaters", "settings", "--evening-hour", "21"]).is_ok());
    }

    #[test]
    fn test_skip_without_flags_has_empty_outcome() {
        let cli = Cli::try_parse_from(["diabeaters", "skip"]).unwrap();
        let Command::Skip(args) = cli.command else {
            panic!("expected skip");
        };
        assert!(args.is_empty());
    }
}
