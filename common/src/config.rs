use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClimateConfig {
    // watts
    pub power_w: u32,
    pub loss3: i32,
    pub loss7: i32,
    pub adjustment_rate: f64,
    pub balance_cap_wh: f64,
    pub min_runtime_min: u32,
    pub max_runtime_min: u32,
    pub runtime_low_loss_w: f64,
    pub runtime_high_loss_w: f64,
    pub restart_owed_balance_wh: f64,
}

impl Default for ClimateConfig {
    fn default() -> Self {
        Self {
            power_w: 5_000,
            loss3: 3_000,
            loss7: 1_000,
            adjustment_rate: 3.0,
            balance_cap_wh: 1_500.0,
            min_runtime_min: 15,
            max_runtime_min: 30,
            runtime_low_loss_w: 1_200.0,
            runtime_high_loss_w: 3_200.0,
            restart_owed_balance_wh: -1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimingConfig {
    pub tick_interval_ms: u64,
    pub cycle_check_interval_ms: u64,
    pub hwc_extension_ms: u64,
    pub save_debounce_ms: u64,
    pub boiler_poll_interval_ms: u64,
    pub state_publish_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 60_000,
            cycle_check_interval_ms: 60_000,
            hwc_extension_ms: 60_000,
            save_debounce_ms: 120_000,
            boiler_poll_interval_ms: 60_000,
            state_publish_interval_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EbusConfig {
    pub host: String,
    pub port: u16,
    pub circuit: String,
    pub boiler_name: String,
}

impl Default for EbusConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8888,
            circuit: "BAI".to_string(),
            boiler_name: "Glow Worm Ultimate 3 35C".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1883,
            user: String::new(),
            pass: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RelayConfig {
    pub gpio: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub climate: ClimateConfig,
    pub timing: TimingConfig,
    pub ebus: EbusConfig,
    pub mqtt: MqttConfig,
    pub relay: RelayConfig,
    pub http_port: u16,
    pub state_path: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            climate: ClimateConfig::default(),
            timing: TimingConfig::default(),
            ebus: EbusConfig::default(),
            mqtt: MqttConfig::default(),
            relay: RelayConfig::default(),
            http_port: 1080,
            state_path: "climate.data".to_string(),
        }
    }
}

impl ClimateConfig {
    pub fn sanitize(&mut self) {
        let defaults = Self::default();

        if !self.adjustment_rate.is_finite() || self.adjustment_rate < 0.0 {
            self.adjustment_rate = defaults.adjustment_rate;
        }
        if !self.balance_cap_wh.is_finite() || self.balance_cap_wh <= 0.0 {
            self.balance_cap_wh = defaults.balance_cap_wh;
        }
        if self.min_runtime_min == 0 {
            self.min_runtime_min = defaults.min_runtime_min;
        }
        if self.max_runtime_min < self.min_runtime_min {
            self.max_runtime_min = self.min_runtime_min;
        }
        if !(self.runtime_high_loss_w > self.runtime_low_loss_w) {
            self.runtime_low_loss_w = defaults.runtime_low_loss_w;
            self.runtime_high_loss_w = defaults.runtime_high_loss_w;
        }
        if !self.restart_owed_balance_wh.is_finite() || self.restart_owed_balance_wh >= 0.0 {
            self.restart_owed_balance_wh = defaults.restart_owed_balance_wh;
        }
    }
}

impl TimingConfig {
    pub fn sanitize(&mut self) {
        let defaults = Self::default();
        for (value, fallback) in [
            (&mut self.tick_interval_ms, defaults.tick_interval_ms),
            (&mut self.cycle_check_interval_ms, defaults.cycle_check_interval_ms),
            (&mut self.hwc_extension_ms, defaults.hwc_extension_ms),
            (&mut self.boiler_poll_interval_ms, defaults.boiler_poll_interval_ms),
            (&mut self.state_publish_interval_ms, defaults.state_publish_interval_ms),
        ] {
            if *value == 0 {
                *value = fallback;
            }
        }
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.climate.sanitize();
        self.timing.sanitize();
        if self.state_path.trim().is_empty() {
            self.state_path = Self::default().state_path;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn partial_json_fills_defaults() {
        let raw = r#"{ "climate": { "power_w": 24000, "loss3": 4200 }, "http_port": 9000 }"#;
        let config: RuntimeConfig = serde_json::from_str(raw).unwrap();

        assert_eq!(config.climate.power_w, 24_000);
        assert_eq!(config.climate.loss3, 4_200);
        assert_eq!(config.climate.loss7, 1_000);
        assert_eq!(config.climate.adjustment_rate, 3.0);
        assert_eq!(config.http_port, 9_000);
        assert_eq!(config.timing, TimingConfig::default());
        assert_eq!(config.ebus, EbusConfig::default());
    }

    #[test]
    fn sanitize_repairs_runtime_limits() {
        let mut config = ClimateConfig {
            min_runtime_min: 20,
            max_runtime_min: 10,
            adjustment_rate: f64::NAN,
            runtime_low_loss_w: 3_000.0,
            runtime_high_loss_w: 1_000.0,
            ..ClimateConfig::default()
        };
        config.sanitize();

        assert_eq!(config.min_runtime_min, 20);
        assert_eq!(config.max_runtime_min, 20);
        assert_eq!(config.adjustment_rate, 3.0);
        assert_eq!(config.runtime_low_loss_w, 1_200.0);
        assert_eq!(config.runtime_high_loss_w, 3_200.0);
    }

    #[test]
    fn sanitize_replaces_zero_periods() {
        let mut timing = TimingConfig {
            tick_interval_ms: 0,
            save_debounce_ms: 0,
            ..TimingConfig::default()
        };
        timing.sanitize();

        assert_eq!(timing.tick_interval_ms, 60_000);
        // A zero debounce is a valid "write on next scheduler turn".
        assert_eq!(timing.save_debounce_ms, 0);
    }
}
