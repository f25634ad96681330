pub mod climate;
pub mod config;
pub mod heat_loss;
pub mod state;
pub mod topics;
pub mod types;

pub use climate::{is_hwc_demand_active, ClimateEngine, ControlError, CycleRequest};
pub use config::{ClimateConfig, EbusConfig, MqttConfig, RelayConfig, RuntimeConfig, TimingConfig};
pub use state::{ClimateState, Mode};
pub use topics::*;
pub use types::{BoilerReadings, BoilerStatus, ClimateSnapshot, SetRequest, Stat};
