mod outcome;
mod profile;

pub use outcome::{ExerciseOutcome, ExercisePattern, OutcomeInput};
pub use profile::{is_pump, InsulinDeliveryMethod, Profile};
