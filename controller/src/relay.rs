use std::{
    path::PathBuf,
    sync::atomic::{AtomicBool, Ordering},
};

use thiserror::Error;
use tracing::info;

use climate_common::RelayConfig;

#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("relay write to {path} failed: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub trait Actuator: Send + Sync + 'static {
    fn set(&self, on: bool) -> Result<(), ActuatorError>;
}

#[derive(Debug)]
pub struct GpioRelay {
    value_path: PathBuf,
}

impl GpioRelay {
    pub fn new(line: u32) -> Self {
        Self {
            value_path: PathBuf::from(format!("/sys/class/gpio/gpio{line}/value")),
        }
    }

    #[cfg(test)]
    fn at(value_path: PathBuf) -> Self {
        Self { value_path }
    }
}

impl Actuator for GpioRelay {
    fn set(&self, on: bool) -> Result<(), ActuatorError> {
        let level = if on { "1" } else { "0" };
        std::fs::write(&self.value_path, level).map_err(|source| ActuatorError::Write {
            path: self.value_path.display().to_string(),
            source,
        })
    }
}

#[derive(Debug, Default)]
pub struct LogRelay {
    on: AtomicBool,
}

impl LogRelay {
    #[cfg(test)]
    pub fn is_on(&self) -> bool {
        self.on.load(Ordering::Relaxed)
    }
}

impl Actuator for LogRelay {
    fn set(&self, on: bool) -> Result<(), ActuatorError> {
        self.on.store(on, Ordering::Relaxed);
        info!("relay {}", if on { "on" } else { "off" });
        Ok(())
    }
}

impl Actuator for Box<dyn Actuator> {
    fn set(&self, on: bool) -> Result<(), ActuatorError> {
        (**self).set(on)
    }
}

pub fn from_config(config: &RelayConfig) -> Box<dyn Actuator> {
    match config.gpio {
        Some(line) => {
            info!("driving boiler relay on gpio {line}");
            Box::new(GpioRelay::new(line))
        }
        None => {
            info!("no relay gpio configured, relay commands are logged only");
            Box::new(LogRelay::default())
        }
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::{Arc, Mutex};

    use super::{Actuator, ActuatorError};

    #[derive(Debug, Clone, Default)]
    pub struct RecordingRelay {
        commands: Arc<Mutex<Vec<bool>>>,
    }

    impl RecordingRelay {
        pub fn commands(&self) -> Vec<bool> {
            self.commands.lock().unwrap().clone()
        }
    }

    impl Actuator for RecordingRelay {
        fn set(&self, on: bool) -> Result<(), ActuatorError> {
            self.commands.lock().unwrap().push(on);
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    pub struct FailingRelay;

    impl Actuator for FailingRelay {
        fn set(&self, _on: bool) -> Result<(), ActuatorError> {
            Err(ActuatorError::Write {
                path: "/sys/class/gpio/gpio6/value".to_string(),
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            })
        }
    }
}
