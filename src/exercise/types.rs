use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::error::ParseEnumError;

/// Declares a fieldless enum that round-trips through a stable snake_case string,
/// used for storage columns and command-line arguments.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($text => Ok($name::$variant),)+
                    other => Err(ParseEnumError::new($kind, other)),
                }
            }
        }
    };
}

string_enum! {
    ExerciseType, "exercise type" {
        Cardio => "cardio",
        Strength => "strength",
        Hiit => "hiit",
        Yoga => "yoga",
        Walking => "walking",
        Sports => "sports",
        Swimming => "swimming",
    }
}

impl ExerciseType {
    /// Human-facing name used inside guidance sentences.
    pub fn label(&self) -> &'static str {
        match self {
            ExerciseType::Cardio => "cardio",
            ExerciseType::Strength => "strength training",
            ExerciseType::Hiit => "HIIT",
            ExerciseType::Yoga => "yoga",
            ExerciseType::Walking => "walking",
            ExerciseType::Sports => "sports",
            ExerciseType::Swimming => "swimming",
        }
    }
}

string_enum! {
    Intensity, "intensity" {
        Light => "light",
        Moderate => "moderate",
        Intense => "intense",
    }
}

string_enum! {
    /// Discriminant of [`super::SessionPhase`], used for storage and error reporting.
    PhaseKind, "phase" {
        Pre => "pre",
        Active => "active",
        Recovery => "recovery",
    }
}

string_enum! {
    ChecklistItem, "checklist item" {
        BgChecked => "bg_checked",
        CarbsConsidered => "carbs_considered",
        BasalAdjusted => "basal_adjusted",
    }
}

string_enum! {
    /// How blood glucose moved across a finished session.
    BgResponse, "bg response" {
        Dropped => "dropped",
        Stable => "stable",
        Rose => "rose",
    }
}

string_enum! {
    BgSeverity, "bg severity" {
        ALittle => "a_little",
        ALot => "a_lot",
    }
}
