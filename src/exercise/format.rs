use crate::models::ExercisePattern;

use super::types::{BgResponse, ExerciseType};

/// `H:MM:SS` from one hour up, `M:SS` below.
pub fn format_elapsed(ms: i64) -> String {
    let total_secs = ms.max(0) / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

/// Whole minutes, rounded up so a partial minute still reads as time left.
pub fn format_remaining(ms: i64) -> String {
    if ms <= 0 {
        return "0 min".to_string();
    }

    let minutes = (ms + 59_999) / 60_000;
    if minutes < 60 {
        return format!("{minutes} min");
    }

    let hours = minutes / 60;
    let rest = minutes % 60;
    if rest == 0 {
        format!("{hours}h")
    } else {
        format!("{hours}h {rest}m")
    }
}

pub fn progress_percent(elapsed_ms: i64, planned_ms: i64) -> f64 {
    if planned_ms <= 0 {
        return 100.0;
    }
    let pct = elapsed_ms.max(0) as f64 / planned_ms as f64 * 100.0;
    pct.min(100.0)
}

const MIN_SESSIONS_FOR_SUMMARY: u32 = 2;

/// One-line history summary, e.g. "Your BG usually drops during cardio (3 of 4 sessions)."
pub fn pattern_summary(exercise_type: ExerciseType, pattern: &ExercisePattern) -> Option<String> {
    if pattern.total_sessions < MIN_SESSIONS_FOR_SUMMARY {
        return None;
    }

    let trend = pattern.avg_pattern?;
    let (verb, count) = match trend {
        BgResponse::Dropped => ("drops", pattern.dropped_count),
        BgResponse::Rose => ("rises", pattern.rose_count),
        BgResponse::Stable => ("stays steady", pattern.stable_count),
    };

    let mut summary = format!(
        "Your BG usually {verb} during {} ({count} of {} sessions).",
        exercise_type.label(),
        pattern.total_sessions
    );
    if pattern.hypo_count > 0 {
        let noun = if pattern.hypo_count == 1 { "time" } else { "times" };
        summary.push_str(&format!(" You felt low {} {noun}.", pattern.hypo_count));
    }
    Some(summary)
}
