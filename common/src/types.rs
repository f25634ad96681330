use serde::{Deserialize, Serialize};

use crate::state::Mode;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stat {
    pub usage_heating: f64,
    pub current_heat_loss: f64,
    pub runtime: u32,
    pub hwc_demand: String,
    pub heating_end_time: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoilerReadings {
    pub flow_temp: f64,
    pub return_temp: f64,
    pub modulation_temp: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BoilerStatus {
    pub name: String,
    pub model: String,
    pub firmware: String,
    pub connected: bool,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClimateSnapshot {
    pub mode: Mode,
    pub target_temperature: f64,
    pub hw_target_temp: i32,

    pub outside_temp: f64,
    pub inside_temp: f64,
    pub heat_loss_balance: f64,

    pub flow_temp: f64,
    pub return_temp: f64,
    pub desired_flow_temp: i32,
    pub power: i32,

    pub gas_active: bool,
    pub pump_active: bool,
    pub consumption_heating: f64,

    pub boiler: BoilerStatus,
    pub stat: Stat,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SetRequest {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub target_temperature: Option<f64>,
    #[serde(default)]
    pub hw_target_temp: Option<i32>,
}
