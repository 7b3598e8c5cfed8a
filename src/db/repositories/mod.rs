mod active_exercise;
mod outcomes;
mod pending_outcome;
mod profile;
