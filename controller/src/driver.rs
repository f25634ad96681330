use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::{
    sync::{watch, Mutex},
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use climate_common::ClimateEngine;

use crate::{
    cycler::{CycleChange, CycleScheduler},
    ebus::BusLink,
    relay::Actuator,
    store::StateStore,
};

pub struct TickDriver<A, B> {
    engine: Arc<Mutex<ClimateEngine>>,
    scheduler: CycleScheduler<A>,
    bus: B,
    store: StateStore,
    hwc_demand: watch::Receiver<String>,
    period: Duration,
}

impl<A: Actuator, B: BusLink> TickDriver<A, B> {
    pub fn new(
        engine: Arc<Mutex<ClimateEngine>>,
        scheduler: CycleScheduler<A>,
        bus: B,
        store: StateStore,
        hwc_demand: watch::Receiver<String>,
        period: Duration,
    ) -> Self {
        Self {
            engine,
            scheduler,
            bus,
            store,
            hwc_demand,
            period,
        }
    }

    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        self.start().await;

        let mut ticker = time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        info!("tick driver stopped");
                        return;
                    }
                }
            }
        }
    }

    pub async fn start(&self) {
        {
            let mut engine = self.engine.lock().await;
            if let Some(minutes) = engine.reconcile_downtime(Utc::now()) {
                info!(
                    "charged {minutes:.0} min of downtime, heat loss balance {:.1} Wh",
                    engine.heat_loss_balance()
                );
            }
        }
        self.apply_loss().await;
        self.refresh_stat().await;
        self.persist().await;
    }

    pub async fn tick(&self) {
        // Accrual reads the relay state before a new cycle can change it.
        let firing = self.scheduler.is_active().await;
        self.engine
            .lock()
            .await
            .accrue_consumption(firing, self.tick_minutes());

        self.apply_loss().await;
        self.send_keep_alive().await;
        self.refresh_stat().await;
        self.persist().await;
    }

    fn tick_minutes(&self) -> f64 {
        self.period.as_secs_f64() / 60.0
    }

    async fn apply_loss(&self) {
        let request = {
            let mut engine = self.engine.lock().await;
            let request = engine.apply_loss(self.tick_minutes());
            debug!(
                "heat loss balance {:.1} Wh at {:.1}°C outside",
                engine.heat_loss_balance(),
                engine.state().outside_temp
            );
            request
        };
        let Some(request) = request else {
            return;
        };

        let change = self.scheduler.request_cycle(request.minutes).await;
        if let CycleChange::Started { ends_at } | CycleChange::Extended { ends_at } = change {
            debug!(
                "cycle now ends in {}s",
                ends_at.saturating_duration_since(Instant::now()).as_secs()
            );
        }

        let mut engine = self.engine.lock().await;
        engine.credit_cycle(request.minutes, Utc::now());
        info!(
            "heat loss {:.0} W, ran {} min cycle, new balance {:.1} Wh",
            request.loss_w,
            request.minutes,
            engine.heat_loss_balance()
        );
    }

    async fn send_keep_alive(&self) {
        let value = self.engine.lock().await.keep_alive_value();
        if let Err(err) = self.bus.send_keep_alive(&value).await {
            warn!("boiler keep-alive failed: {err}");
        }
    }

    async fn refresh_stat(&self) {
        let heating_end = self.scheduler.ends_at_utc().await;
        let demand = self.hwc_demand.borrow().clone();
        self.engine.lock().await.refresh_stat(&demand, heating_end);
    }

    async fn persist(&self) {
        let state = self.engine.lock().await.state().clone();
        self.store.save(state).await;
    }
}
