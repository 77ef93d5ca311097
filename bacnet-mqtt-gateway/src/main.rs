mod bacnet;
mod config;
mod mqtt;

use axum::{response::Html, routing::get, Router};
use bacnet::BacnetEngine;
use bacnet_client_core::PropertyValue;
use bacnet_rs::object::ObjectType;
use config::GatewayConfig;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    info!("Starting BACnet-MQTT Gateway...");

    let cfg = GatewayConfig::default();

    let bacnet = Arc::new(BacnetEngine::new(cfg.bacnet.clone())?);
    let mqtt = mqtt::MqttService::new(cfg.mqtt.clone()).await?;

    // Device registry: device-id -> "has a Home Assistant discovery entry"
    let known_devices: Arc<RwLock<HashMap<u32, ()>>> = Arc::new(RwLock::new(HashMap::new()));

    // Discovery task: periodically broadcasts Who-Is and announces any newly
    // found device over MQTT discovery.
    let discover_bacnet = bacnet.clone();
    let discover_mqtt = mqtt.clone();
    let discover_devices = known_devices.clone();
    let mqtt_prefix = cfg.mqtt.discovery_prefix.clone();
    let poll_interval = std::time::Duration::from_secs(cfg.bacnet.poll_interval_secs);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(poll_interval);
        loop {
            interval.tick().await;
            for device in discover_bacnet.discover().await {
                let mut devices = discover_devices.write().await;
                if devices.insert(device.device_id, ()).is_some() {
                    continue;
                }
                drop(devices);

                tracing::info!(device_id = device.device_id, max_apdu = device.max_apdu, "discovered BACnet device");

                let unique_id = format!("bacnet_{}", device.device_id);
                let payload = mqtt::HaDiscoveryPayload {
                    name: format!("BACnet Device {}", device.device_id),
                    state_topic: format!("{}/sensor/{}/state", mqtt_prefix, unique_id),
                    command_topic: None,
                    unique_id: unique_id.clone(),
                    device: mqtt::HaDevice {
                        identifiers: vec![unique_id.clone()],
                        name: format!("BACnet Device {}", device.device_id),
                        manufacturer: "Unknown".to_string(),
                        model: "Generic BACnet Device".to_string(),
                    },
                };

                discover_mqtt.publish_discovery("sensor", &unique_id, &payload).await;
                discover_mqtt.publish_state(&payload.state_topic, "online").await;
            }
        }
    });

    // Poll task: reads Present_Value off Analog Input 0 for every known
    // device and republishes it as MQTT state.
    let poll_bacnet = bacnet.clone();
    let poll_devices = known_devices.clone();
    let poll_mqtt = mqtt.clone();
    let poll_prefix = cfg.mqtt.discovery_prefix.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(poll_interval);
        loop {
            interval.tick().await;
            let device_ids: Vec<u32> = poll_devices.read().await.keys().copied().collect();
            for device_id in device_ids {
                tracing::debug!(device_id, "polling Analog Input 0 Present_Value");
                match poll_bacnet.read_present_value(device_id, ObjectType::AnalogInput, 0).await {
                    Some(PropertyValue::Real(value)) => {
                        let unique_id = format!("bacnet_{device_id}");
                        let state_topic = format!("{poll_prefix}/sensor/{unique_id}/state");
                        poll_mqtt.publish_state(&state_topic, &value.to_string()).await;
                    }
                    Some(other) => {
                        tracing::debug!(device_id, value = ?other, "Present_Value was not a Real");
                    }
                    None => {
                        tracing::debug!(device_id, "no response polling Present_Value");
                    }
                }
            }
        }
    });

    let app = Router::new().route("/", get(serve_ui));

    let addr = SocketAddr::from(([0, 0, 0, 0], 8123));
    info!("Web UI listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn serve_ui() -> Html<&'static str> {
    Html("<html><body><h1>BACnet-MQTT Gateway</h1><p>Gateway configuration will be generated here.</p></body></html>")
}
