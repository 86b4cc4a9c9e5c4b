use std::{
    io::ErrorKind,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::Serialize;
use tokio::{net::TcpListener, time::MissedTickBehavior};
use tracing::{info, warn};

use shelly_sync_common::{
    MqttConfig, RuntimeConfig, TOPIC_CMD_SYNC, TOPIC_CONTROLLER_SCHEDULE_STATE,
    TOPIC_CONTROLLER_STATE,
};

use crate::{
    booking::{BookingSource, DeviceBookingSource, HttpBookingSource},
    device::RelayDevice,
    driver::{SyncDriver, SyncHandle},
    shelly::ShellyRpcClient,
    simulator::SimulatedDevice,
};

const MAX_MQTT_PAYLOAD_BYTES: usize = 64;

#[derive(Clone)]
struct AppState {
    sync: SyncHandle,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::var("SHELLY_SYNC_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./shelly-sync.json"));
    let mut config = load_runtime_config(&config_path).await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from {}: {err:#}", config_path.display());
        RuntimeConfig::default()
    });
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config.sanitize();

    if config.booking.api_key.is_empty() {
        warn!("no booking api key configured; fetches will be rejected upstream");
    }

    let device: Arc<dyn RelayDevice> = if config.device.simulate {
        info!("using simulated relay");
        Arc::new(SimulatedDevice::new())
    } else {
        info!(url = %config.device.url, "using relay");
        Arc::new(ShellyRpcClient::new(&config.device.url, config.device.switch_id)?)
    };

    let source: Arc<dyn BookingSource> = if config.device.fetch_via_device {
        Arc::new(DeviceBookingSource::new(
            device.clone(),
            config.booking.clone(),
        ))
    } else {
        Arc::new(HttpBookingSource::new(config.booking.clone())?)
    };

    let sync = SyncHandle::new(SyncDriver::new(&config, device, source));
    let app_state = AppState { sync };

    spawn_sync_loop(
        app_state.clone(),
        Duration::from_millis(config.polling.interval_ms),
    );

    if let Some(mqtt_config) = config.mqtt.clone() {
        let (mqtt, eventloop) = AsyncClient::new(mqtt_options(&mqtt_config), 16);
        mqtt.subscribe(TOPIC_CMD_SYNC, QoS::AtMostOnce)
            .await
            .context("failed to subscribe to sync command topic")?;
        spawn_mqtt_loop(app_state.clone(), eventloop);
        spawn_state_publish_loop(
            app_state.clone(),
            mqtt,
            Duration::from_millis(mqtt_config.publish_interval_ms),
        );
    }

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/schedule", get(handle_get_schedule))
        .route("/api/sync", post(handle_post_sync))
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!(
        timezone = %config.timezone,
        interval_ms = config.polling.interval_ms,
        "controller listening on http://{addr}"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// First tick fires immediately, which is the startup sync.
fn spawn_sync_loop(app_state: AppState, period: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            app_state.sync.run_cycle().await;
        }
    });
}

fn mqtt_options(config: &MqttConfig) -> MqttOptions {
    let mut options = MqttOptions::new("shelly-sync-controller", config.host.clone(), config.port);
    options.set_keep_alive(Duration::from_secs(30));
    if !config.user.is_empty() {
        options.set_credentials(config.user.clone(), config.pass.clone());
    }
    options
}

fn spawn_mqtt_loop(app_state: AppState, mut eventloop: rumqttc::EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    handle_mqtt_message(&app_state, &message.topic, &message.payload).await;
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

async fn handle_mqtt_message(app_state: &AppState, topic: &str, payload: &[u8]) {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return;
    }

    if topic != TOPIC_CMD_SYNC {
        return;
    }

    let command = String::from_utf8_lossy(payload).trim().to_ascii_lowercase();
    if command != "now" {
        warn!("ignoring unknown sync command {command:?}");
        return;
    }

    // The event loop must keep polling while the cycle runs.
    let sync = app_state.sync.clone();
    tokio::spawn(async move {
        match sync.try_run_cycle().await {
            Some(outcome) => info!(outcome = outcome.as_str(), "sync requested over mqtt"),
            None => info!("sync requested over mqtt while a cycle is running, skipped"),
        }
    });
}

fn spawn_state_publish_loop(app_state: AppState, mqtt: AsyncClient, period: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;

            let view = app_state.sync.view();
            let payloads = [
                (TOPIC_CONTROLLER_STATE, serde_json::to_vec(&view.status)),
                (
                    TOPIC_CONTROLLER_SCHEDULE_STATE,
                    serde_json::to_vec(&view.schedule),
                ),
            ];

            for (topic, payload) in payloads {
                match payload {
                    Ok(body) => {
                        if let Err(err) = mqtt.publish(topic, QoS::AtLeastOnce, true, body).await
                        {
                            warn!("{topic} publish failed: {err}");
                        }
                    }
                    Err(err) => warn!("{topic} serialization failed: {err}"),
                }
            }
        }
    });
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.sync.view().status)
}

async fn handle_get_schedule(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.sync.view().schedule)
}

async fn handle_post_sync(State(state): State<AppState>) -> impl IntoResponse {
    if state.sync.try_run_cycle().await.is_none() {
        return error_response(StatusCode::CONFLICT, "Sync already in progress");
    }
    handle_get_status(State(state)).await.into_response()
}

async fn load_runtime_config(path: &Path) -> anyhow::Result<RuntimeConfig> {
    match tokio::fs::read(path).await {
        Ok(raw) => serde_json::from_slice::<RuntimeConfig>(&raw)
            .with_context(|| format!("invalid config file {}", path.display())),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
        Err(err) => Err(err.into()),
    }
}

fn apply_env_overrides(config: &mut RuntimeConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(key) = var("KIINTEISTODATA_API_KEY") {
        config.booking.api_key = key;
    }
    if let Some(url) = var("SHELLY_URL") {
        config.device.url = url;
    }
    if let Some(simulate) = var("SHELLY_SIMULATE") {
        config.device.simulate = simulate == "1" || simulate.eq_ignore_ascii_case("true");
    }
    if let Some(port) = var("CONTROLLER_HTTP_PORT").and_then(|value| value.parse::<u16>().ok()) {
        config.http_port = port;
    }

    if let Some(host) = var("MQTT_HOST") {
        config.mqtt.get_or_insert_with(MqttConfig::default).host = host;
    }
    if let Some(mqtt) = config.mqtt.as_mut() {
        if let Some(port) = var("MQTT_PORT").and_then(|value| value.parse::<u16>().ok()) {
            mqtt.port = port;
        }
        if let Some(user) = var("MQTT_USER") {
            mqtt.user = user;
        }
        if let Some(pass) = var("MQTT_PASS") {
            mqtt.pass = pass;
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
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
    use std::collections::HashMap;

    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate, Utc};
    use tokio::sync::Notify;

    use super::*;
    use crate::booking::BookingError;

    /// Holds every fetch until released.
    #[derive(Default)]
    struct HeldSource {
        release: Notify,
    }

    #[async_trait]
    impl BookingSource for HeldSource {
        async fn fetch(&self, _: NaiveDate, _: NaiveDate) -> Result<String, BookingError> {
            self.release.notified().await;
            Ok(r#"{"timings": []}"#.to_string())
        }
    }

    #[tokio::test]
    async fn mqtt_sync_command_does_not_block_event_loop() {
        let mut config = RuntimeConfig::default();
        config.timezone = "UTC".to_string();
        let source = Arc::new(HeldSource::default());
        let driver = SyncDriver::new(&config, Arc::new(SimulatedDevice::new()), source.clone())
            .with_clock(Arc::new(|| {
                DateTime::parse_from_rfc3339("2026-10-21T11:00:00Z")
                    .unwrap()
                    .with_timezone(&Utc)
            }));
        let app_state = AppState {
            sync: SyncHandle::new(driver),
        };

        tokio::time::timeout(
            Duration::from_secs(1),
            handle_mqtt_message(&app_state, TOPIC_CMD_SYNC, b"now"),
        )
        .await
        .expect("handler waited for the cycle");
        assert_eq!(app_state.sync.view().status.cycle_count, 0);

        source.release.notify_one();
        tokio::time::timeout(Duration::from_secs(1), async {
            while app_state.sync.view().status.cycle_count == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("spawned cycle never finished");
    }

    #[test]
    fn env_overrides_secrets_and_endpoints() {
        let env: HashMap<&str, &str> = [
            ("KIINTEISTODATA_API_KEY", "k-123"),
            ("SHELLY_URL", "http://10.0.0.7"),
            ("SHELLY_SIMULATE", "true"),
            ("CONTROLLER_HTTP_PORT", "9090"),
            ("MQTT_HOST", "broker.local"),
            ("MQTT_PORT", "not-a-port"),
        ]
        .into_iter()
        .collect();
        let mut config = RuntimeConfig::default();

        apply_env_overrides(&mut config, |key| env.get(key).map(|value| value.to_string()));

        assert_eq!(config.booking.api_key, "k-123");
        assert_eq!(config.device.url, "http://10.0.0.7");
        assert!(config.device.simulate);
        assert_eq!(config.http_port, 9090);
        let mqtt = config.mqtt.unwrap();
        assert_eq!(mqtt.host, "broker.local");
        assert_eq!(mqtt.port, 1883);
    }

    #[test]
    fn mqtt_stays_disabled_without_host() {
        let mut config = RuntimeConfig::default();
        apply_env_overrides(&mut config, |key| {
            (key == "MQTT_USER").then(|| "user".to_string())
        });
        assert!(config.mqtt.is_none());
    }

    #[tokio::test]
    async fn missing_config_file_yields_defaults() {
        let path = std::env::temp_dir().join("shelly-sync-missing/none.json");
        let config = load_runtime_config(&path).await.unwrap();
        assert_eq!(config, RuntimeConfig::default());
    }

    #[tokio::test]
    async fn reads_config_file() {
        let path = std::env::temp_dir().join(format!(
            "shelly-sync-config-{}.json",
            std::process::id()
        ));
        tokio::fs::write(
            &path,
            r#"{"booking": {"property_id": "p1", "days_ahead": 3}, "device": {"simulate": true}}"#,
        )
        .await
        .unwrap();

        let config = load_runtime_config(&path).await.unwrap();
        let _ = tokio::fs::remove_file(&path).await;

        assert_eq!(config.booking.property_id, "p1");
        assert_eq!(config.booking.days_ahead, 3);
        assert!(config.device.simulate);
    }
}
