use crate::config::ClimateConfig;

pub const BASE_TEMP: f64 = 20.0;

const MAX_FLOW_TEMP: f64 = 50.0;
const MIN_FLOW_TEMP: f64 = 30.0;
const FLOW_RETURN_DIFF: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossInputs {
    pub outside_temp: f64,
    pub target_temp: f64,
    pub inside_temp: f64,
    pub loss3: i32,
    pub loss7: i32,
    pub adjustment_rate: f64,
}

pub fn effective_outside_temp(inputs: &LossInputs) -> f64 {
    let setback = BASE_TEMP - inputs.target_temp;
    let error = inputs.target_temp - inputs.inside_temp;
    inputs.outside_temp + setback - error * inputs.adjustment_rate
}

// Not clamped: a negative result is a net gain.
pub fn instantaneous_loss_w(inputs: &LossInputs) -> f64 {
    let effective = effective_outside_temp(inputs);
    let loss3 = f64::from(inputs.loss3);
    let loss7 = f64::from(inputs.loss7);
    (loss3 - loss7) / 10.0 * (7.0 - effective) + loss7
}

pub fn loss_per_minute(loss_w: f64) -> f64 {
    loss_w / 60.0
}

pub fn runtime_minutes(loss_w: f64, config: &ClimateConfig) -> u32 {
    let min = config.min_runtime_min;
    let max = config.max_runtime_min.max(min);
    if loss_w.is_nan() {
        return min;
    }

    let span = config.runtime_high_loss_w - config.runtime_low_loss_w;
    let minutes = f64::from(min) + (loss_w - config.runtime_low_loss_w) * f64::from(max - min) / span;
    minutes.floor().clamp(f64::from(min), f64::from(max)) as u32
}

pub fn cycle_energy_wh(power_w: u32, minutes: u32) -> f64 {
    f64::from(power_w) * f64::from(minutes) / 60.0
}

pub fn consumption_kwh(power_w: u32, tick_minutes: f64) -> f64 {
    f64::from(power_w) * tick_minutes / 60.0 / 1000.0
}

pub fn flow_temp_for_min_power(flow_temp: f64, return_temp: f64) -> i32 {
    let mut calculated = return_temp + FLOW_RETURN_DIFF;
    if flow_temp < calculated {
        calculated = flow_temp + 2.0;
    }
    calculated.clamp(MIN_FLOW_TEMP, MAX_FLOW_TEMP).trunc() as i32
}
