use std::{sync::Arc, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use climate_common::{is_hwc_demand_active, TimingConfig};

use crate::relay::Actuator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Active { ends_at: Instant },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleChange {
    Started { ends_at: Instant },
    Extended { ends_at: Instant },
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleTiming {
    pub check_interval: Duration,
    pub hwc_extension: Duration,
}

impl Default for CycleTiming {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            hwc_extension: Duration::from_secs(60),
        }
    }
}

impl From<&TimingConfig> for CycleTiming {
    fn from(timing: &TimingConfig) -> Self {
        Self {
            check_interval: Duration::from_millis(timing.cycle_check_interval_ms),
            hwc_extension: Duration::from_millis(timing.hwc_extension_ms),
        }
    }
}

struct Cycle {
    state: CycleState,
    supervisor: Option<JoinHandle<()>>,
}

struct Shared<A> {
    cycle: Mutex<Cycle>,
    relay: A,
    hwc_demand: watch::Receiver<String>,
    timing: CycleTiming,
}

pub struct CycleScheduler<A> {
    shared: Arc<Shared<A>>,
}

impl<A> Clone for CycleScheduler<A> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<A: Actuator> CycleScheduler<A> {
    pub fn new(relay: A, hwc_demand: watch::Receiver<String>, timing: CycleTiming) -> Self {
        Self {
            shared: Arc::new(Shared {
                cycle: Mutex::new(Cycle {
                    state: CycleState::Idle,
                    supervisor: None,
                }),
                relay,
                hwc_demand,
                timing,
            }),
        }
    }

    pub async fn request_cycle(&self, minutes: u32) -> CycleChange {
        if minutes == 0 {
            return CycleChange::Ignored;
        }
        let length = Duration::from_secs(u64::from(minutes) * 60);

        let mut cycle = self.shared.cycle.lock().await;
        match cycle.state {
            CycleState::Active { ends_at } => {
                let ends_at = ends_at.checked_add(length).unwrap_or(ends_at);
                cycle.state = CycleState::Active { ends_at };
                info!("extended heating cycle by {minutes} min");
                CycleChange::Extended { ends_at }
            }
            CycleState::Idle => {
                let ends_at = Instant::now() + length;
                cycle.state = CycleState::Active { ends_at };
                self.shared.switch(true);
                cycle.supervisor = Some(tokio::spawn(supervise(Arc::clone(&self.shared))));
                info!("started heating cycle for {minutes} min");
                CycleChange::Started { ends_at }
            }
        }
    }

    pub async fn stop(&self) {
        let mut cycle = self.shared.cycle.lock().await;
        if let Some(supervisor) = cycle.supervisor.take() {
            supervisor.abort();
        }
        if cycle.state != CycleState::Idle {
            info!("heating cycle stopped");
        }
        cycle.state = CycleState::Idle;
        self.shared.switch(false);
    }

    pub async fn state(&self) -> CycleState {
        self.shared.cycle.lock().await.state
    }

    pub async fn is_active(&self) -> bool {
        matches!(self.state().await, CycleState::Active { .. })
    }

    pub async fn ends_at(&self) -> Option<Instant> {
        match self.state().await {
            CycleState::Active { ends_at } => Some(ends_at),
            CycleState::Idle => None,
        }
    }

    pub async fn ends_at_utc(&self) -> Option<DateTime<Utc>> {
        let ends_at = self.ends_at().await?;
        let remaining = ends_at.saturating_duration_since(Instant::now());
        let now = Utc::now();
        let end = TimeDelta::from_std(remaining)
            .ok()
            .and_then(|remaining| now.checked_add_signed(remaining))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Some(end)
    }

    #[cfg(test)]
    async fn supervise_once(&self) -> bool {
        self.shared.check().await
    }
}

impl<A: Actuator> Shared<A> {
    fn switch(&self, on: bool) {
        if let Err(err) = self.relay.set(on) {
            warn!("relay switch {} failed: {err}", if on { "on" } else { "off" });
        }
    }

    async fn check(&self) -> bool {
        let mut cycle = self.cycle.lock().await;
        let CycleState::Active { mut ends_at } = cycle.state else {
            return false;
        };

        if is_hwc_demand_active(self.hwc_demand.borrow().as_str()) {
            ends_at = ends_at.checked_add(self.timing.hwc_extension).unwrap_or(ends_at);
            debug!("hot water demand, cycle extended");
        }

        if Instant::now() >= ends_at {
            cycle.state = CycleState::Idle;
            // The supervisor running this check is about to return.
            cycle.supervisor = None;
            self.switch(false);
            info!("heating cycle finished");
            return false;
        }

        cycle.state = CycleState::Active { ends_at };
        true
    }
}

async fn supervise<A: Actuator>(shared: Arc<Shared<A>>) {
    let period = shared.timing.check_interval;
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if !shared.check().await {
            break;
        }
    }
}
