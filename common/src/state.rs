use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::climate::ControlError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Off,
    Heating,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Heating => "heating",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ControlError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "heating" => Ok(Self::Heating),
            _ => Err(ControlError::InvalidMode(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClimateState {
    pub mode: Mode,
    pub target_temperature: f64,
    pub hw_target_temp: i32,

    pub inside_temp: f64,
    pub outside_temp: f64,

    pub last_active: Option<DateTime<Utc>>,

    pub consumption_heating: f64,

    // Wh, negative when heat is owed to the building.
    #[serde(rename = "heat_loss")]
    pub heat_loss_balance: f64,
}
