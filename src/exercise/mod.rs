pub mod clock;
pub mod controller;
pub mod error;
pub mod format;
pub mod guidance;
pub mod state;
pub mod types;
pub mod view;

pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::{
    ControllerOptions, EndReason, EndedSession, ExerciseSessionController, SessionEvent,
    TickEffect,
};
pub use error::{ParseEnumError, SessionAction, TransitionError};
pub use format::{format_elapsed, format_remaining, pattern_summary};
pub use guidance::{pre_exercise_tips, recovery_window, type_config, TypeConfig};
pub use state::{ExerciseSession, PreChecklist, SessionPhase, TickOutcome};
pub use types::{BgResponse, BgSeverity, ChecklistItem, ExerciseType, Intensity, PhaseKind};
pub use view::{ChecklistRow, SessionView, ViewContext};
