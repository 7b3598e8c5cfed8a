use serde::{Deserialize, Serialize};

use crate::exercise::ParseEnumError;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InsulinDeliveryMethod {
    Pump,
    #[default]
    Injections,
}

impl InsulinDeliveryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsulinDeliveryMethod::Pump => "pump",
            InsulinDeliveryMethod::Injections => "injections",
        }
    }
}

impl std::str::FromStr for InsulinDeliveryMethod {
    type Err = ParseEnumError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pump" => Ok(InsulinDeliveryMethod::Pump),
            "injections" | "mdi" => Ok(InsulinDeliveryMethod::Injections),
            other => Err(ParseEnumError::new("insulin delivery method", other)),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub display_name: Option<String>,
    pub insulin_delivery_method: InsulinDeliveryMethod,
}

impl Profile {
    pub fn is_pump(&self) -> bool {
        self.insulin_delivery_method == InsulinDeliveryMethod::Pump
    }
}

/// A missing profile is treated as an injection user.
pub fn is_pump(profile: Option<&Profile>) -> bool {
    profile.map(Profile::is_pump).unwrap_or(false)
}
