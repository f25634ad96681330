use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use crate::{
    config::ClimateConfig,
    heat_loss::{self, LossInputs},
    state::{ClimateState, Mode},
    types::{BoilerReadings, BoilerStatus, ClimateSnapshot, SetRequest, Stat},
};

pub const DEFAULT_DESIRED_FLOW_TEMP: i32 = 55;
pub const MAX_FORCED_MINUTES: u32 = 24 * 60;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControlError {
    #[error("invalid mode '{0}', expected 'off' or 'heating'")]
    InvalidMode(String),
    #[error("target temperature must be a positive number, got {0}")]
    InvalidTarget(f64),
    #[error("hot water target must be positive, got {0}")]
    InvalidHotWaterTarget(i32),
    #[error("invalid temperature value '{0}'")]
    InvalidTemperature(String),
    #[error("cycle duration must be 1 to 1440 minutes, got '{0}'")]
    InvalidDuration(String),
}

pub fn is_hwc_demand_active(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "on" | "yes" | "1" | "true"
    )
}

pub fn parse_temperature(raw: &str) -> Result<f64, ControlError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| ControlError::InvalidTemperature(raw.to_string()))
}

pub fn parse_duration_minutes(raw: &str) -> Result<u32, ControlError> {
    raw.trim()
        .parse::<u32>()
        .ok()
        .filter(|minutes| (1..=MAX_FORCED_MINUTES).contains(minutes))
        .ok_or_else(|| ControlError::InvalidDuration(raw.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleRequest {
    pub minutes: u32,
    pub loss_w: f64,
}

#[derive(Debug, Clone)]
pub struct ClimateEngine {
    pub config: ClimateConfig,
    state: ClimateState,
    stat: Stat,
    boiler: BoilerReadings,
    link: BoilerStatus,
    desired_flow_temp: i32,
}

impl ClimateEngine {
    pub fn new(mut config: ClimateConfig, state: ClimateState) -> Self {
        config.sanitize();
        let mut engine = Self {
            config,
            state,
            stat: Stat::default(),
            boiler: BoilerReadings::default(),
            link: BoilerStatus::default(),
            desired_flow_temp: DEFAULT_DESIRED_FLOW_TEMP,
        };
        engine.state.heat_loss_balance = engine.capped(engine.state.heat_loss_balance);
        engine
    }

    pub fn state(&self) -> &ClimateState {
        &self.state
    }

    pub fn stat(&self) -> &Stat {
        &self.stat
    }

    pub fn mode(&self) -> Mode {
        self.state.mode
    }

    pub fn heat_loss_balance(&self) -> f64 {
        self.state.heat_loss_balance
    }

    pub fn desired_flow_temp(&self) -> i32 {
        self.desired_flow_temp
    }

    pub fn set_mode(&mut self, mode: Mode) -> bool {
        if self.state.mode == mode {
            return false;
        }
        self.state.mode = mode;
        true
    }

    pub fn set_target_temperature(&mut self, temp: f64) -> Result<bool, ControlError> {
        if !temp.is_finite() || temp <= 0.0 {
            return Err(ControlError::InvalidTarget(temp));
        }
        if (self.state.target_temperature - temp).abs() <= f64::EPSILON {
            return Ok(false);
        }
        self.state.target_temperature = temp;
        Ok(true)
    }

    pub fn set_hot_water_target(&mut self, temp: i32) -> Result<bool, ControlError> {
        if temp <= 0 {
            return Err(ControlError::InvalidHotWaterTarget(temp));
        }
        if self.state.hw_target_temp == temp {
            return Ok(false);
        }
        self.state.hw_target_temp = temp;
        Ok(true)
    }

    pub fn set_inside_temp(&mut self, temp: f64) -> Result<(), ControlError> {
        if !temp.is_finite() {
            return Err(ControlError::InvalidTemperature(temp.to_string()));
        }
        self.state.inside_temp = temp;
        Ok(())
    }

    pub fn set_outside_temp(&mut self, temp: f64) -> Result<(), ControlError> {
        if !temp.is_finite() {
            return Err(ControlError::InvalidTemperature(temp.to_string()));
        }
        self.state.outside_temp = temp;
        Ok(())
    }

    pub fn apply_set_request(&mut self, request: &SetRequest) -> Result<bool, ControlError> {
        let mode = match request.mode.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(raw.parse::<Mode>()?),
            _ => None,
        };
        // Non-positive values mean "not set".
        let target = request
            .target_temperature
            .filter(|temp| temp.is_finite() && *temp > 0.0);
        let hw_target = request.hw_target_temp.filter(|temp| *temp > 0);

        let mut changed = false;
        if let Some(mode) = mode {
            changed |= self.set_mode(mode);
        }
        if let Some(temp) = target {
            changed |= self.set_target_temperature(temp)?;
        }
        if let Some(temp) = hw_target {
            changed |= self.set_hot_water_target(temp)?;
        }
        Ok(changed)
    }

    pub fn update_boiler(&mut self, readings: BoilerReadings) {
        self.boiler = readings;
        self.desired_flow_temp =
            heat_loss::flow_temp_for_min_power(readings.flow_temp, readings.return_temp);
    }

    pub fn boiler(&self) -> BoilerReadings {
        self.boiler
    }

    pub fn set_boiler_name(&mut self, name: &str) {
        self.link.name = name.to_string();
    }

    pub fn record_boiler_poll(&mut self, error: Option<String>) {
        self.link.connected = error.is_none();
        self.link.error = error.unwrap_or_default();
    }

    pub fn loss_inputs(&self) -> LossInputs {
        LossInputs {
            outside_temp: self.state.outside_temp,
            target_temp: self.state.target_temperature,
            inside_temp: self.state.inside_temp,
            loss3: self.config.loss3,
            loss7: self.config.loss7,
            adjustment_rate: self.config.adjustment_rate,
        }
    }

    pub fn current_loss_w(&self) -> f64 {
        heat_loss::instantaneous_loss_w(&self.loss_inputs())
    }

    pub fn planned_runtime(&self) -> u32 {
        heat_loss::runtime_minutes(self.current_loss_w(), &self.config)
    }

    pub fn accrue_consumption(&mut self, firing: bool, tick_minutes: f64) {
        if firing {
            self.state.consumption_heating +=
                heat_loss::consumption_kwh(self.config.power_w, tick_minutes);
        }
    }

    pub fn apply_loss(&mut self, tick_minutes: f64) -> Option<CycleRequest> {
        if self.state.mode != Mode::Heating {
            return None;
        }

        let loss_w = self.current_loss_w();
        let balance =
            self.state.heat_loss_balance - heat_loss::loss_per_minute(loss_w) * tick_minutes;
        self.state.heat_loss_balance = self.capped(balance);

        if self.state.heat_loss_balance < 0.0 {
            Some(CycleRequest {
                minutes: heat_loss::runtime_minutes(loss_w, &self.config),
                loss_w,
            })
        } else {
            None
        }
    }

    pub fn credit_cycle(&mut self, minutes: u32, now: DateTime<Utc>) {
        let credited = self.state.heat_loss_balance
            + heat_loss::cycle_energy_wh(self.config.power_w, minutes);
        self.state.heat_loss_balance = self.capped(credited);
        self.state.last_active = Some(now);
    }

    pub fn reconcile_downtime(&mut self, now: DateTime<Utc>) -> Option<f64> {
        if self.state.mode != Mode::Heating {
            return None;
        }
        let last = self.state.last_active?;

        let minutes = (now - last).num_seconds().max(0) as f64 / 60.0;
        let balance =
            self.state.heat_loss_balance - heat_loss::loss_per_minute(self.current_loss_w()) * minutes;
        self.state.heat_loss_balance = if balance < 0.0 {
            self.config.restart_owed_balance_wh
        } else {
            self.capped(balance)
        };
        Some(minutes)
    }

    pub fn refresh_stat(&mut self, hwc_demand: &str, heating_end: Option<DateTime<Utc>>) {
        let loss_w = self.current_loss_w();
        self.stat = Stat {
            usage_heating: self.state.consumption_heating,
            current_heat_loss: loss_w,
            runtime: heat_loss::runtime_minutes(loss_w, &self.config),
            hwc_demand: hwc_demand.to_string(),
            heating_end_time: format_end_time(heating_end),
        };
    }

    pub fn keep_alive_value(&self) -> String {
        format!(
            "0;{};{};-;-;0;0;0;-;0;0;0",
            self.desired_flow_temp, self.state.hw_target_temp
        )
    }

    pub fn snapshot(&self, firing: bool, heating_end: Option<DateTime<Utc>>) -> ClimateSnapshot {
        let mut stat = self.stat.clone();
        stat.heating_end_time = format_end_time(heating_end);
        stat.usage_heating = self.state.consumption_heating;

        ClimateSnapshot {
            mode: self.state.mode,
            target_temperature: self.state.target_temperature,
            hw_target_temp: self.state.hw_target_temp,
            outside_temp: self.state.outside_temp,
            inside_temp: self.state.inside_temp,
            heat_loss_balance: self.state.heat_loss_balance,
            flow_temp: self.boiler.flow_temp,
            return_temp: self.boiler.return_temp,
            desired_flow_temp: self.desired_flow_temp,
            power: self.boiler.modulation_temp,
            gas_active: firing,
            pump_active: firing,
            consumption_heating: self.state.consumption_heating,
            boiler: self.link.clone(),
            stat,
        }
    }

    fn capped(&self, balance: f64) -> f64 {
        balance.min(self.config.balance_cap_wh)
    }
}

fn format_end_time(end: Option<DateTime<Utc>>) -> String {
    end.map(|end| end.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}
