//! Static per-exercise-type guidance: checklist labels, mid-session and
//! recovery messages, recovery windows, and pre-exercise tips.

use chrono::Duration;

use super::types::{ChecklistItem, ExerciseType, Intensity};

pub const DEFAULT_EVENING_HOUR: u32 = 18;

pub const EVENING_SNACK_ADVISORY: &str =
    "It's evening: consider a bedtime snack with protein and slow carbs, and check your BG before sleep.";

#[derive(Debug, Clone, Copy)]
pub struct ChecklistLabels {
    pub bg_checked: &'static str,
    pub carbs_considered: &'static str,
    pub basal_adjusted_pump: &'static str,
    pub basal_adjusted_injections: &'static str,
}

impl ChecklistLabels {
    pub fn label(&self, item: ChecklistItem, is_pump: bool) -> &'static str {
        match item {
            ChecklistItem::BgChecked => self.bg_checked,
            ChecklistItem::CarbsConsidered => self.carbs_considered,
            ChecklistItem::BasalAdjusted if is_pump => self.basal_adjusted_pump,
            ChecklistItem::BasalAdjusted => self.basal_adjusted_injections,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TypeConfig {
    pub checklist: ChecklistLabels,
    pub mid_check_message: &'static str,
    /// Share of the planned duration, in percent, after which the mid-check fires.
    pub mid_check_percent: u32,
    pub recovery_message: &'static str,
    pub delayed_warning: Option<&'static str>,
    pub active_reminder: Option<&'static str>,
    /// Recovery window in minutes, indexed light / moderate / intense.
    pub recovery_minutes: [u32; 3],
}

impl TypeConfig {
    pub fn mid_check_timing(&self) -> f64 {
        f64::from(self.mid_check_percent) / 100.0
    }
}

static CARDIO: TypeConfig = TypeConfig {
    checklist: ChecklistLabels {
        bg_checked: "BG checked (aim for 126-180 mg/dL before starting)",
        carbs_considered: "Fast carbs on hand (15-30g)",
        basal_adjusted_pump: "Temp basal set (-50% starting 60-90 min before)",
        basal_adjusted_injections: "Meal bolus reduced if eating within 2 hours",
    },
    mid_check_message: "Halfway there. Any shakiness, sweating or dizziness? If in doubt, stop and check your BG.",
    mid_check_percent: 50,
    recovery_message: "Cardio keeps pulling glucose into your muscles for hours. Check your BG now and again in an hour.",
    delayed_warning: Some("Delayed lows are common 6-12 hours after cardio. Consider a lower overnight basal or a bedtime snack."),
    active_reminder: Some("Sip water and keep fast carbs within reach. BG tends to fall steadily during cardio."),
    recovery_minutes: [60, 120, 240],
};

static STRENGTH: TypeConfig = TypeConfig {
    checklist: ChecklistLabels {
        bg_checked: "BG checked (aim for 100-180 mg/dL before starting)",
        carbs_considered: "Carbs considered (often fewer needed for lifting)",
        basal_adjusted_pump: "Basal left as-is or reduced slightly (-10 to -20%)",
        basal_adjusted_injections: "Long-acting dose reviewed (usually unchanged)",
    },
    mid_check_message: "Mid-session check: heavy lifting can push BG up at first. How are you feeling?",
    mid_check_percent: 50,
    recovery_message: "A post-workout rise is normal after lifting. Avoid a large correction right away and recheck in an hour.",
    delayed_warning: Some("Muscle repair can lower BG overnight after strength training. Check before bed."),
    active_reminder: Some("Adrenaline from heavy sets can raise BG temporarily. Don't over-correct mid-workout."),
    recovery_minutes: [60, 120, 180],
};

static HIIT: TypeConfig = TypeConfig {
    checklist: ChecklistLabels {
        bg_checked: "BG checked (aim for 126-180 mg/dL before starting)",
        carbs_considered: "Fast carbs on hand for after the intervals",
        basal_adjusted_pump: "Temp basal considered (HIIT can raise BG first)",
        basal_adjusted_injections: "Correction plan ready for a post-HIIT spike",
    },
    mid_check_message: "Quick check between intervals: sprints can raise BG now and drop it later. Any low symptoms?",
    mid_check_percent: 40,
    recovery_message: "HIIT often spikes BG right after, then drops it later. Correct cautiously, if at all.",
    delayed_warning: Some("Delayed lows are likely up to 24 hours after HIIT. Check overnight and consider reducing basal."),
    active_reminder: Some("Expect a possible rise during sprints. Keep fast carbs nearby for the drop that can follow."),
    recovery_minutes: [120, 240, 360],
};

static YOGA: TypeConfig = TypeConfig {
    checklist: ChecklistLabels {
        bg_checked: "BG checked (aim for 100-180 mg/dL before starting)",
        carbs_considered: "Snack nearby in case of a gentle drop",
        basal_adjusted_pump: "Basal left as-is for gentle practice",
        basal_adjusted_injections: "No insulin changes needed for gentle practice",
    },
    mid_check_message: "Pause for a moment: how are you feeling? Inversions can mask low symptoms.",
    mid_check_percent: 50,
    recovery_message: "Yoga usually has a mild effect on BG. A quick check now is enough.",
    delayed_warning: None,
    active_reminder: None,
    recovery_minutes: [30, 60, 60],
};

static WALKING: TypeConfig = TypeConfig {
    checklist: ChecklistLabels {
        bg_checked: "BG checked (aim for 100-180 mg/dL before starting)",
        carbs_considered: "A few glucose tabs in your pocket",
        basal_adjusted_pump: "Basal left as-is for a short walk",
        basal_adjusted_injections: "No insulin changes needed for a short walk",
    },
    mid_check_message: "Halfway through your walk. Feeling okay?",
    mid_check_percent: 50,
    recovery_message: "Walking gently lowers BG. Check when you get back.",
    delayed_warning: None,
    active_reminder: None,
    recovery_minutes: [30, 60, 90],
};

static SPORTS: TypeConfig = TypeConfig {
    checklist: ChecklistLabels {
        bg_checked: "BG checked (aim for 126-180 mg/dL before the game)",
        carbs_considered: "Sports drink or fast carbs on the sideline",
        basal_adjusted_pump: "Temp basal set or pump disconnected for play",
        basal_adjusted_injections: "Pre-game bolus reduced",
    },
    mid_check_message: "Half-time check: competition adrenaline can hide a falling BG. Check if you can.",
    mid_check_percent: 50,
    recovery_message: "Team sports mix sprints and endurance. Check your BG now and eat a recovery snack.",
    delayed_warning: Some("Lows can show up hours after a long game. Check before bed and consider a snack."),
    active_reminder: Some("Use breaks in play to sip carbs. Adrenaline may mask low symptoms."),
    recovery_minutes: [60, 120, 240],
};

static SWIMMING: TypeConfig = TypeConfig {
    checklist: ChecklistLabels {
        bg_checked: "BG checked (aim for 126-180 mg/dL before getting in)",
        carbs_considered: "Fast carbs at the poolside",
        basal_adjusted_pump: "Pump disconnected or temp basal set (max 60-90 min off)",
        basal_adjusted_injections: "Meal bolus reduced before swimming",
    },
    mid_check_message: "Take a break at the wall: lows are harder to notice in water. How do you feel?",
    mid_check_percent: 40,
    recovery_message: "Swimming works many muscles at once. Check your BG now and reconnect your pump if you disconnected.",
    delayed_warning: Some("Cold water and full-body effort raise the chance of a delayed low. Check again in a few hours."),
    active_reminder: Some("Tell a lifeguard or buddy you have T1D. Get out and check if you feel off."),
    recovery_minutes: [60, 180, 240],
};

pub fn type_config(exercise_type: ExerciseType) -> &'static TypeConfig {
    match exercise_type {
        ExerciseType::Cardio => &CARDIO,
        ExerciseType::Strength => &STRENGTH,
        ExerciseType::Hiit => &HIIT,
        ExerciseType::Yoga => &YOGA,
        ExerciseType::Walking => &WALKING,
        ExerciseType::Sports => &SPORTS,
        ExerciseType::Swimming => &SWIMMING,
    }
}

pub fn recovery_window(exercise_type: ExerciseType, intensity: Intensity) -> Duration {
    let minutes = type_config(exercise_type).recovery_minutes[intensity_index(intensity)];
    Duration::minutes(i64::from(minutes))
}

fn intensity_index(intensity: Intensity) -> usize {
    match intensity {
        Intensity::Light => 0,
        Intensity::Moderate => 1,
        Intensity::Intense => 2,
    }
}

/// Bedtime-snack reminder shown during recovery once the local hour reaches `evening_hour`.
pub fn evening_advisory(local_hour: u32, evening_hour: u32) -> Option<&'static str> {
    (local_hour >= evening_hour).then_some(EVENING_SNACK_ADVISORY)
}

pub fn pre_exercise_tips(
    exercise_type: ExerciseType,
    is_pump: bool,
    duration_minutes: u32,
) -> Vec<String> {
    let tips: Vec<&str> = match exercise_type {
        ExerciseType::Cardio => cardio_tips(is_pump, duration_minutes),
        ExerciseType::Strength => strength_tips(is_pump),
        ExerciseType::Hiit => hiit_tips(is_pump),
        ExerciseType::Yoga => yoga_tips(is_pump),
        ExerciseType::Walking => walking_tips(is_pump, duration_minutes),
        ExerciseType::Sports => sports_tips(is_pump),
        ExerciseType::Swimming => swimming_tips(is_pump),
    };
    tips.into_iter().map(str::to_string).collect()
}

fn cardio_tips(is_pump: bool, duration_minutes: u32) -> Vec<&'static str> {
    let mut tips = vec!["Cardio usually lowers BG steadily. Start above 126 mg/dL if you can."];
    if is_pump {
        tips.push("Set a temp basal of -50% about 60-90 minutes before you start.");
    } else {
        tips.push("If you ate recently, reduce that meal bolus by 25-50%.");
        tips.push("Avoid injecting rapid insulin into the legs right before running or cycling.");
    }
    if duration_minutes >= 60 {
        tips.push("For sessions over an hour, plan 15-30g of carbs every 30-45 minutes while moving.");
    }
    tips.push("Keep fast-acting carbs within reach the whole time.");
    tips
}

fn strength_tips(is_pump: bool) -> Vec<&'static str> {
    let mut tips = vec![
        "Heavy lifting can raise BG during the session because of adrenaline.",
        "Rest periods between sets are a good time for a quick BG check.",
    ];
    if is_pump {
        tips.push("A small basal reduction (10-20%) is usually enough, or none at all.");
    } else {
        tips.push("Usually no insulin change is needed, but watch for a drop afterwards.");
    }
    tips
}

fn hiit_tips(is_pump: bool) -> Vec<&'static str> {
    let mut tips = vec![
        "HIIT can spike BG during the intervals and drop it hours later.",
        "Don't chase a post-workout high with a full correction.",
    ];
    if is_pump {
        tips.push("Consider keeping basal unchanged during HIIT and reducing it afterwards.");
    } else {
        tips.push("If you correct a post-HIIT high, use about half your usual correction.");
    }
    tips.push("Check your BG before bed on HIIT days.");
    tips
}

fn yoga_tips(is_pump: bool) -> Vec<&'static str> {
    let mut tips = vec!["Gentle yoga usually has a small effect on BG."];
    if is_pump {
        tips.push("Check that your infusion site isn't pressed during floor poses.");
    }
    tips.push("Hot or power yoga behaves more like cardio. Plan accordingly.");
    tips
}

fn walking_tips(is_pump: bool, duration_minutes: u32) -> Vec<&'static str> {
    let mut tips = vec!["A walk after a meal is a gentle way to blunt a post-meal rise."];
    if is_pump && duration_minutes >= 60 {
        tips.push("For long walks, a temp basal of -20 to -30% can help.");
    } else if !is_pump && duration_minutes >= 60 {
        tips.push("For long walks, bring an extra snack in case BG drifts down.");
    }
    tips.push("Carry glucose tabs even on short walks.");
    tips
}

fn sports_tips(is_pump: bool) -> Vec<&'static str> {
    let mut tips = vec![
        "Games mix sprints and steady effort, so BG can move either way.",
        "Let a coach or teammate know where your fast carbs are.",
    ];
    if is_pump {
        tips.push("For contact sports, disconnect or protect your pump and set a reminder to reconnect.");
    } else {
        tips.push("Reduce the pre-game meal bolus by around 25%.");
    }
    tips
}

fn swimming_tips(is_pump: bool) -> Vec<&'static str> {
    let mut tips = vec![
        "Low symptoms are harder to notice in water. Swim with a buddy.",
        "Keep fast carbs at the edge of the pool.",
    ];
    if is_pump {
        tips.push("If you disconnect, don't stay off the pump for more than 60-90 minutes without a plan.");
    } else {
        tips.push("Consider a small carb snack before getting in if BG is under 126 mg/dL.");
    }
    tips
}
