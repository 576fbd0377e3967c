//! MQTT link: sensor feed in, analysis summary and heartbeat out.
//!
//! The event loop task owns the connection and reconnects on its own. It
//! only ever touches the sensor cache through [`SensorCache::update`].

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::{
    analysis::knowledge,
    config::MqttConfig,
    models::{AnalysisResult, DaysToHarvest, Plant},
    sensors::{SensorCache, SensorUpdate},
};

// ---

const CLIENT_ID: &str = "ecogarden-monitor";
const KEEP_ALIVE: Duration = Duration::from_secs(60);
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(300);

/// Retained summary published after each analysis run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishSummary {
    pub plant_count: usize,
    pub overall_health: u8,
    /// Age of the oldest planting.
    pub days_since_planted: Option<i64>,
    pub next_harvest: String,
    pub alerts: Vec<String>,
}

impl PublishSummary {
    pub fn from_result(result: &AnalysisResult, plants: &[Plant], today: NaiveDate) -> Self {
        // ---
        PublishSummary {
            plant_count: plants.len(),
            overall_health: result.report.overall_health.unwrap_or(0),
            days_since_planted: plants
                .iter()
                .map(|p| knowledge::plant_age(p.planted_date, today))
                .max(),
            next_harvest: next_harvest(result),
            alerts: result.report.alerts.clone(),
        }
    }
}

/// The plant closest to harvest, e.g. `Basil (~12 days)` or `Mint (ready now!)`.
fn next_harvest(result: &AnalysisResult) -> String {
    // ---
    let mut best: Option<(f64, String)> = None;
    for plant in &result.report.plants {
        let Some(estimate) = plant.days_to_harvest.as_ref() else {
            continue;
        };
        let Some(days) = estimate.as_days() else {
            continue;
        };
        if best.as_ref().is_some_and(|(min, _)| days >= *min) {
            continue;
        }
        let label = match estimate {
            DaysToHarvest::Days(d) => format!("{} (~{} days)", plant.name, d.trunc() as i64),
            DaysToHarvest::Text(_) => format!("{} (ready now!)", plant.name),
        };
        best = Some((days, label));
    }
    best.map(|(_, label)| label)
        .unwrap_or_else(|| "unknown".to_string())
}

#[derive(Debug, Serialize)]
struct Heartbeat {
    status: &'static str,
    timestamp: i64,
}

fn heartbeat_payload(unix_secs: i64) -> Vec<u8> {
    serde_json::to_vec(&Heartbeat {
        status: "online",
        timestamp: unix_secs,
    })
    .unwrap_or_default()
}

/// Where analysis summaries go.
#[async_trait]
pub trait AnalysisPublisher: Send + Sync {
    /// Summaries are only offered while connected.
    fn is_connected(&self) -> bool {
        true
    }

    async fn publish_summary(&self, summary: &PublishSummary) -> Result<()>;
}

/// Handle to the running MQTT connection.
#[derive(Clone)]
pub struct MqttLink {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    publish_topic: String,
}

impl MqttLink {
    /// Spawn the event loop and heartbeat tasks. Must run inside a tokio runtime.
    pub fn start(config: &MqttConfig, sensors: Arc<SensorCache>) -> Self {
        // ---
        let mut options = MqttOptions::new(CLIENT_ID, &config.broker, config.port);
        options.set_keep_alive(KEEP_ALIVE);
        let (client, eventloop) = AsyncClient::new(options, 16);

        let link = MqttLink {
            client: client.clone(),
            connected: Arc::new(AtomicBool::new(false)),
            publish_topic: config.publish_topic.clone(),
        };

        tokio::spawn(run_event_loop(
            eventloop,
            client,
            config.sensor_topic.clone(),
            sensors,
            Arc::clone(&link.connected),
        ));
        tokio::spawn(link.clone().run_heartbeat());

        info!(broker = %config.broker, port = config.port, "MQTT link started");
        link
    }

    async fn run_heartbeat(self) {
        // ---
        let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if !self.is_connected() {
                continue;
            }
            let topic = format!("{}/heartbeat", self.publish_topic);
            let payload = heartbeat_payload(Utc::now().timestamp());
            if let Err(e) = self.client.publish(topic, QoS::AtMostOnce, false, payload).await {
                debug!(error = %e, "Heartbeat publish failed");
            }
        }
    }
}

#[async_trait]
impl AnalysisPublisher for MqttLink {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    async fn publish_summary(&self, summary: &PublishSummary) -> Result<()> {
        // ---
        let payload = serde_json::to_vec(summary)?;
        self.client
            .publish(&self.publish_topic, QoS::AtLeastOnce, true, payload)
            .await?;
        info!(topic = %self.publish_topic, "Published analysis summary");
        Ok(())
    }
}

/// Drive the connection forever, feeding sensor payloads into the cache.
async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    sensor_topic: String,
    sensors: Arc<SensorCache>,
    connected: Arc<AtomicBool>,
) {
    // ---
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                connected.store(true, Ordering::Relaxed);
                info!("Connected to MQTT broker");
                match client.try_subscribe(sensor_topic.as_str(), QoS::AtMostOnce) {
                    Ok(()) => info!(topic = %sensor_topic, "Subscribed to sensor feed"),
                    Err(e) => error!(topic = %sensor_topic, error = %e, "Subscribe failed"),
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                if !apply_sensor_payload(&sensors, &publish.payload) {
                    debug!(topic = %publish.topic, "Ignoring non-JSON sensor payload");
                }
            }
            Ok(_) => {}
            Err(e) => {
                if connected.swap(false, Ordering::Relaxed) {
                    warn!(error = %e, "MQTT connection lost, will reconnect");
                } else {
                    debug!(error = %e, "MQTT connection attempt failed");
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

/// Merge one raw payload into the cache. `false` if it was not a JSON object.
pub fn apply_sensor_payload(sensors: &SensorCache, payload: &[u8]) -> bool {
    // ---
    match SensorUpdate::from_payload(payload) {
        Some(update) => {
            sensors.update(update);
            true
        }
        None => false,
    }
}
