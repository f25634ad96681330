use std::{collections::HashMap, io::ErrorKind, net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::Serialize;
use tokio::{
    net::TcpListener,
    sync::{watch, Mutex},
};
use tracing::{debug, info, warn};

use climate_common::{
    climate::{parse_duration_minutes, parse_temperature},
    ClimateEngine, ClimateSnapshot, ClimateState, Mode, RuntimeConfig, SetRequest,
    TOPIC_CMD_MODE, TOPIC_CMD_TARGET, TOPIC_CONTROLLER_STATE, TOPIC_SENSOR_HWC_DEMAND,
    TOPIC_SENSOR_INSIDE_TEMP, TOPIC_SENSOR_OUTSIDE_TEMP,
};

use crate::{
    cycler::{CycleScheduler, CycleTiming},
    driver::TickDriver,
    ebus::EbusClient,
    relay::{self, Actuator},
    store::StateStore,
};

const MAX_MQTT_PAYLOAD_BYTES: usize = 512;
const FORCED_CYCLE_MINUTES: u32 = 10;

type Scheduler = CycleScheduler<Box<dyn Actuator>>;

#[derive(Clone)]
struct AppState {
    engine: Arc<Mutex<ClimateEngine>>,
    scheduler: Scheduler,
    store: StateStore,
    hwc_demand: Arc<watch::Sender<String>>,
    mqtt: AsyncClient,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Default, PartialEq)]
struct SensorOverride {
    inside_temp: Option<f64>,
    outside_temp: Option<f64>,
    force_heating: Option<bool>,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = std::env::var("CLIMATE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./climate.json"));
    let mut runtime = load_runtime_config(&config_path).await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from {}: {err:#}", config_path.display());
        RuntimeConfig::default()
    });
    apply_env_overrides(&mut runtime, |key| std::env::var(key).ok());
    runtime.sanitize();

    let timing = runtime.timing.clone();
    let store = StateStore::new(
        &runtime.state_path,
        Duration::from_millis(timing.save_debounce_ms),
    );
    let state = store.load().await.unwrap_or_else(|err| {
        warn!("starting from a fresh climate state: {err}");
        ClimateState::default()
    });
    info!(
        "loaded climate state: mode {}, target {:.1}°C, balance {:.1} Wh",
        state.mode, state.target_temperature, state.heat_loss_balance
    );

    let mut engine = ClimateEngine::new(runtime.climate.clone(), state);
    engine.set_boiler_name(&runtime.ebus.boiler_name);
    let engine = Arc::new(Mutex::new(engine));
    let (hwc_tx, hwc_rx) = watch::channel(String::new());
    let scheduler = CycleScheduler::new(
        relay::from_config(&runtime.relay),
        hwc_rx.clone(),
        CycleTiming::from(&timing),
    );
    let ebus = EbusClient::new(&runtime.ebus);

    let mut mqtt_options =
        MqttOptions::new("climate-controller", runtime.mqtt.host.clone(), runtime.mqtt.port);
    if !runtime.mqtt.user.is_empty() {
        mqtt_options.set_credentials(runtime.mqtt.user.clone(), runtime.mqtt.pass.clone());
    }
    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);

    let app_state = AppState {
        engine: Arc::clone(&engine),
        scheduler: scheduler.clone(),
        store: store.clone(),
        hwc_demand: Arc::new(hwc_tx),
        mqtt,
    };

    subscribe_topics(&app_state.mqtt).await?;
    spawn_mqtt_loop(app_state.clone(), eventloop);
    spawn_state_publish_loop(
        app_state.clone(),
        Duration::from_millis(timing.state_publish_interval_ms),
    );
    spawn_boiler_poll_loop(
        app_state.clone(),
        ebus.clone(),
        Duration::from_millis(timing.boiler_poll_interval_ms),
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    let driver = TickDriver::new(
        Arc::clone(&engine),
        scheduler.clone(),
        ebus,
        store.clone(),
        hwc_rx,
        Duration::from_millis(timing.tick_interval_ms),
    );
    let driver_task = tokio::spawn(driver.run(stop_rx));

    let app = router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], runtime.http_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("climate controller listening on http://{addr}");
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    info!("shutting down");
    let _ = stop_tx.send(true);
    if let Err(err) = driver_task.await {
        warn!("tick driver ended abnormally: {err}");
    }
    wind_down(&engine, &scheduler, &store).await;

    served.context("controller server failed")?;
    Ok(())
}

fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/set", post(handle_set))
        .route("/api/override", post(handle_override))
        .route("/api/force_heating", post(handle_force_heating))
        .route("/api/stop", post(handle_stop))
        .route("/api/check", get(handle_ping))
        .route("/api/ping", get(handle_ping))
        .with_state(app_state)
}

async fn wind_down<A: Actuator>(
    engine: &Mutex<ClimateEngine>,
    scheduler: &CycleScheduler<A>,
    store: &StateStore,
) {
    scheduler.stop().await;

    let state = engine.lock().await.state().clone();
    store.save(state).await;
    if let Err(err) = store.flush().await {
        warn!("failed to flush climate state to {}: {err}", store.path().display());
    }
}

async fn load_runtime_config(path: &std::path::Path) -> anyhow::Result<RuntimeConfig> {
    match tokio::fs::read(path).await {
        Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
        Err(err) => Err(err.into()),
    }
}

fn apply_env_overrides(runtime: &mut RuntimeConfig, lookup: impl Fn(&str) -> Option<String>) {
    let port = |key: &str| lookup(key).and_then(|value| value.parse::<u16>().ok());

    if let Some(host) = lookup("EBUS_HOST") {
        runtime.ebus.host = host;
    }
    if let Some(value) = port("EBUS_PORT") {
        runtime.ebus.port = value;
    }
    if let Some(host) = lookup("MQTT_HOST") {
        runtime.mqtt.host = host;
    }
    if let Some(value) = port("MQTT_PORT") {
        runtime.mqtt.port = value;
    }
    if let Some(user) = lookup("MQTT_USER") {
        runtime.mqtt.user = user;
    }
    if let Some(pass) = lookup("MQTT_PASS") {
        runtime.mqtt.pass = pass;
    }
    if let Some(value) = port("CLIMATE_HTTP_PORT") {
        runtime.http_port = value;
    }
    if let Some(path) = lookup("CLIMATE_STATE_PATH") {
        runtime.state_path = path;
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
}

async fn subscribe_topics(mqtt: &AsyncClient) -> anyhow::Result<()> {
    let topics = [
        TOPIC_SENSOR_INSIDE_TEMP,
        TOPIC_SENSOR_OUTSIDE_TEMP,
        TOPIC_SENSOR_HWC_DEMAND,
        TOPIC_CMD_MODE,
        TOPIC_CMD_TARGET,
    ];

    for topic in topics {
        mqtt.subscribe(topic, QoS::AtMostOnce).await?;
    }
    Ok(())
}

fn spawn_mqtt_loop(app_state: AppState, mut eventloop: rumqttc::EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if let Err(err) =
                        handle_mqtt_message(&app_state, message.topic, message.payload.to_vec())
                            .await
                    {
                        warn!("mqtt message handling error: {err:#}");
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

fn spawn_state_publish_loop(app_state: AppState, period: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;

            let payload = serde_json::to_vec(&snapshot(&app_state).await);
            match payload {
                Ok(body) => {
                    if let Err(err) = app_state
                        .mqtt
                        .publish(TOPIC_CONTROLLER_STATE, QoS::AtLeastOnce, true, body)
                        .await
                    {
                        warn!("controller state publish failed: {err}");
                    }
                }
                Err(err) => warn!("controller state serialization failed: {err}"),
            }
        }
    });
}

fn spawn_boiler_poll_loop(app_state: AppState, ebus: EbusClient, period: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;

            let previous = app_state.engine.lock().await.boiler();
            let (readings, failure) = ebus.read_boiler(previous).await;
            let desired = {
                let mut engine = app_state.engine.lock().await;
                engine.update_boiler(readings);
                engine.record_boiler_poll(failure.map(|err| err.to_string()));
                engine.desired_flow_temp()
            };
            debug!(
                "boiler flow {:.1}°C, return {:.1}°C, modulation {}, desired flow {desired}°C",
                readings.flow_temp, readings.return_temp, readings.modulation_temp
            );
        }
    });
}

async fn handle_mqtt_message(
    app_state: &AppState,
    topic: String,
    payload: Vec<u8>,
) -> anyhow::Result<()> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return Ok(());
    }

    let message = String::from_utf8(payload).context("non utf8 mqtt payload")?;
    let message = message.trim();

    match topic.as_str() {
        TOPIC_SENSOR_INSIDE_TEMP => {
            let temp = parse_temperature(message)?;
            app_state.engine.lock().await.set_inside_temp(temp)?;
            persist(app_state).await;
        }
        TOPIC_SENSOR_OUTSIDE_TEMP => {
            let temp = parse_temperature(message)?;
            app_state.engine.lock().await.set_outside_temp(temp)?;
            persist(app_state).await;
        }
        TOPIC_SENSOR_HWC_DEMAND => {
            app_state.hwc_demand.send_replace(message.to_string());
        }
        TOPIC_CMD_MODE => {
            let mode = message.parse::<Mode>()?;
            let changed = app_state.engine.lock().await.set_mode(mode);
            if changed {
                info!("mode set to {mode} over mqtt");
                persist(app_state).await;
            }
        }
        TOPIC_CMD_TARGET => {
            let temp = parse_temperature(message)?;
            let changed = app_state.engine.lock().await.set_target_temperature(temp)?;
            if changed {
                persist(app_state).await;
            }
        }
        _ => debug!("ignoring mqtt message on {topic}"),
    }
    Ok(())
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(snapshot(&state).await)
}

async fn handle_set(
    State(state): State<AppState>,
    Json(request): Json<SetRequest>,
) -> impl IntoResponse {
    let result = state.engine.lock().await.apply_set_request(&request);
    match result {
        Ok(true) => persist(&state).await,
        Ok(false) => {}
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    }

    handle_get_status(State(state)).await.into_response()
}

async fn handle_override(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let sensor_override = match parse_override(&params) {
        Ok(sensor_override) => sensor_override,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, &message),
    };

    {
        let mut engine = state.engine.lock().await;
        let applied = sensor_override
            .inside_temp
            .map_or(Ok(()), |temp| engine.set_inside_temp(temp))
            .and_then(|()| {
                sensor_override
                    .outside_temp
                    .map_or(Ok(()), |temp| engine.set_outside_temp(temp))
            });
        if let Err(err) = applied {
            return error_response(StatusCode::BAD_REQUEST, &err.to_string());
        }
    }
    if sensor_override.inside_temp.is_some() || sensor_override.outside_temp.is_some() {
        persist(&state).await;
    }

    match sensor_override.force_heating {
        Some(true) => {
            let change = state.scheduler.request_cycle(FORCED_CYCLE_MINUTES).await;
            info!("forced {FORCED_CYCLE_MINUTES} min cycle via override: {change:?}");
        }
        Some(false) => {
            state.scheduler.stop().await;
            info!("heating stopped via override");
        }
        None => {}
    }

    handle_get_status(State(state)).await.into_response()
}

async fn handle_force_heating(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("duration") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'duration' parameter");
    };
    let minutes = match parse_duration_minutes(value) {
        Ok(minutes) => minutes,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };

    let change = state.scheduler.request_cycle(minutes).await;
    info!("forced {minutes} min cycle: {change:?}");
    handle_get_status(State(state)).await.into_response()
}

async fn handle_stop(State(state): State<AppState>) -> impl IntoResponse {
    state.scheduler.stop().await;
    info!("heating stopped via api");
    handle_get_status(State(state)).await.into_response()
}

async fn handle_ping() -> &'static str {
    "OK"
}

async fn snapshot(state: &AppState) -> ClimateSnapshot {
    let heating_end = state.scheduler.ends_at_utc().await;
    state
        .engine
        .lock()
        .await
        .snapshot(heating_end.is_some(), heating_end)
}

async fn persist(state: &AppState) {
    let current = state.engine.lock().await.state().clone();
    state.store.save(current).await;
}

fn parse_override(params: &HashMap<String, String>) -> Result<SensorOverride, String> {
    let temperature = |key: &str| {
        params
            .get(key)
            .map(|raw| parse_temperature(raw).map_err(|err| format!("{key}: {err}")))
            .transpose()
    };

    let force_heating = match params.get("force_heating").map(|raw| raw.trim()) {
        None => None,
        Some("1") => Some(true),
        Some("0") => Some(false),
        Some(other) => return Err(format!("force_heating must be 0 or 1, got '{other}'")),
    };

    Ok(SensorOverride {
        inside_temp: temperature("inside_temp")?,
        outside_temp: temperature("outside_temp")?,
        force_heating,
    })
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{self, Body},
        http::Request,
    };
    use climate_common::ClimateConfig;
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    use crate::relay::testing::RecordingRelay;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    fn app_state(dir: &std::path::Path) -> (AppState, RecordingRelay) {
        let relay = RecordingRelay::default();
        let (hwc_tx, hwc_rx) = watch::channel(String::new());
        let boxed: Box<dyn Actuator> = Box::new(relay.clone());
        let scheduler = CycleScheduler::new(boxed, hwc_rx, CycleTiming::default());
        let mut engine = ClimateEngine::new(ClimateConfig::default(), ClimateState::default());
        engine.set_boiler_name("Glow Worm Ultimate 3 35C");
        let (mqtt, _eventloop) =
            AsyncClient::new(MqttOptions::new("climate-test", "localhost", 1883), 10);

        let state = AppState {
            engine: Arc::new(Mutex::new(engine)),
            scheduler,
            store: StateStore::new(dir.join("climate.data"), Duration::from_secs(120)),
            hwc_demand: Arc::new(hwc_tx),
            mqtt,
        };
        (state, relay)
    }

    async fn send(
        state: &AppState,
        method: &str,
        uri: &str,
        json: Option<&str>,
    ) -> (StatusCode, String) {
        let mut request = Request::builder().method(method).uri(uri);
        let payload = match json {
            Some(json) => {
                request = request.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = router(state.clone())
            .oneshot(request.body(payload).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn force_heating_rejects_bad_durations() {
        let dir = tempfile::tempdir().unwrap();
        let (state, relay) = app_state(dir.path());

        for uri in [
            "/api/force_heating",
            "/api/force_heating?duration=0",
            "/api/force_heating?duration=soon",
            "/api/force_heating?duration=4294967295",
        ] {
            let (status, _) = send(&state, "POST", uri, None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        }
        assert!(relay.commands().is_empty());
        assert!(!state.scheduler.is_active().await);
    }

    #[tokio::test]
    async fn force_heating_starts_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let (state, relay) = app_state(dir.path());

        let (status, body) = send(&state, "POST", "/api/force_heating?duration=15", None).await;

        assert_eq!(status, StatusCode::OK);
        let snapshot: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(snapshot["gas_active"], true);
        assert_ne!(snapshot["stat"]["heating_end_time"], "");
        assert_eq!(relay.commands(), vec![true]);
    }

    #[tokio::test]
    async fn set_rejects_unknown_mode_and_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _relay) = app_state(dir.path());

        let (status, body) = send(
            &state,
            "POST",
            "/api/set",
            Some(r#"{"mode": "turbo", "target_temperature": 22.5}"#),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("invalid mode"));
        let engine = state.engine.lock().await;
        assert_eq!(engine.mode(), Mode::Off);
        assert_eq!(engine.state().target_temperature, 0.0);
    }

    #[tokio::test]
    async fn set_applies_fields() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _relay) = app_state(dir.path());

        let (status, body) = send(
            &state,
            "POST",
            "/api/set",
            Some(r#"{"mode": "heating", "target_temperature": 21.0, "hw_target_temp": 0}"#),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let snapshot: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(snapshot["mode"], "heating");
        assert_eq!(snapshot["target_temperature"], 21.0);
        assert_eq!(snapshot["hw_target_temp"], 0);
    }

    #[tokio::test]
    async fn override_force_flag_starts_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let (state, relay) = app_state(dir.path());

        let (status, _) = send(
            &state,
            "POST",
            "/api/override?inside_temp=18.5&force_heating=1",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(state.scheduler.is_active().await);
        assert_eq!(state.engine.lock().await.state().inside_temp, 18.5);

        let (status, _) = send(&state, "POST", "/api/override?force_heating=0", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!state.scheduler.is_active().await);
        assert_eq!(relay.commands(), vec![true, false]);
    }

    #[tokio::test]
    async fn override_rejects_unparsable_temperature() {
        let dir = tempfile::tempdir().unwrap();
        let (state, relay) = app_state(dir.path());

        let (status, _) = send(
            &state,
            "POST",
            "/api/override?outside_temp=cold&force_heating=1",
            None,
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(relay.commands().is_empty());
    }

    #[tokio::test]
    async fn status_reports_boiler_and_health_routes_answer() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _relay) = app_state(dir.path());

        let (status, body) = send(&state, "GET", "/api/status", None).await;
        assert_eq!(status, StatusCode::OK);
        let snapshot: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(snapshot["boiler"]["name"], "Glow Worm Ultimate 3 35C");
        assert_eq!(snapshot["boiler"]["connected"], false);

        for uri in ["/api/ping", "/api/check"] {
            assert_eq!(
                send(&state, "GET", uri, None).await,
                (StatusCode::OK, "OK".to_string())
            );
        }
    }

    #[tokio::test]
    async fn wind_down_switches_off_and_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let (state, relay) = app_state(dir.path());
        state.scheduler.request_cycle(20).await;
        state.engine.lock().await.set_mode(Mode::Heating);

        wind_down(&state.engine, &state.scheduler, &state.store).await;

        assert!(!state.scheduler.is_active().await);
        assert_eq!(relay.commands(), vec![true, false]);
        let saved = state.store.load().await.unwrap();
        assert_eq!(saved.mode, Mode::Heating);
    }

    #[test]
    fn override_parses_all_fields() {
        let parsed = parse_override(&params(&[
            ("inside_temp", "19.5"),
            ("outside_temp", "-4"),
            ("force_heating", "1"),
        ]))
        .unwrap();

        assert_eq!(
            parsed,
            SensorOverride {
                inside_temp: Some(19.5),
                outside_temp: Some(-4.0),
                force_heating: Some(true),
            }
        );
    }

    #[test]
    fn override_fields_are_optional() {
        assert_eq!(parse_override(&params(&[])).unwrap(), SensorOverride::default());
        assert_eq!(
            parse_override(&params(&[("force_heating", "0")])).unwrap().force_heating,
            Some(false)
        );
    }

    #[test]
    fn override_rejects_bad_values() {
        let err = parse_override(&params(&[("inside_temp", "warm")])).unwrap_err();
        assert!(err.starts_with("inside_temp:"));

        assert!(parse_override(&params(&[("outside_temp", "NaN")])).is_err());
        assert!(parse_override(&params(&[("force_heating", "yes")])).is_err());
    }

    #[test]
    fn env_overrides_replace_config_values() {
        let env = params(&[
            ("EBUS_HOST", "boiler.local"),
            ("EBUS_PORT", "8889"),
            ("MQTT_HOST", "broker"),
            ("MQTT_USER", "climate"),
            ("CLIMATE_HTTP_PORT", "9090"),
            ("CLIMATE_STATE_PATH", "/var/lib/climate/climate.data"),
        ]);
        let mut runtime = RuntimeConfig::default();

        apply_env_overrides(&mut runtime, |key| env.get(key).cloned());

        assert_eq!(runtime.ebus.host, "boiler.local");
        assert_eq!(runtime.ebus.port, 8889);
        assert_eq!(runtime.mqtt.host, "broker");
        assert_eq!(runtime.mqtt.user, "climate");
        assert_eq!(runtime.mqtt.port, RuntimeConfig::default().mqtt.port);
        assert_eq!(runtime.http_port, 9090);
        assert_eq!(runtime.state_path, "/var/lib/climate/climate.data");
    }

    #[test]
    fn unparsable_env_ports_are_ignored() {
        let env = params(&[("MQTT_PORT", "not-a-port"), ("CLIMATE_HTTP_PORT", "70000")]);
        let mut runtime = RuntimeConfig::default();

        apply_env_overrides(&mut runtime, |key| env.get(key).cloned());

        assert_eq!(runtime.mqtt.port, 1883);
        assert_eq!(runtime.http_port, 1080);
    }

    #[tokio::test]
    async fn missing_config_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = load_runtime_config(&dir.path().join("climate.json"))
            .await
            .unwrap();
        assert_eq!(runtime.http_port, 1080);
    }

    #[tokio::test]
    async fn config_file_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("climate.json");
        std::fs::write(&path, br#"{ "relay": { "gpio": 17 }, "ebus": { "circuit": "BAI00" } }"#)
            .unwrap();

        let runtime = load_runtime_config(&path).await.unwrap();
        assert_eq!(runtime.relay.gpio, Some(17));
        assert_eq!(runtime.ebus.circuit, "BAI00");
    }
}
