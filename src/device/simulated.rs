//! In-process stand-in for the board.

use super::DeviceBackend;
use crate::channel::CommandExchange;
use crate::config::{DeviceConfig, SimulationConfig};
use crate::error::{DeviceResult, ErrorKind};
use crate::monitor::{EventCallback, EventMonitor};
use crate::protocol::{Command, Response, GET_STATUS, MAX_BRIGHTNESS, READ_RFID, SET_LIGHT};
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

pub const MOCK_FIRMWARE_VERSION: &str = "1.0.0-mock";

const SIMULATED_PORT: &str = "simulated";

/// Answers commands the way the firmware would, without any I/O.
pub struct SimulatedBoard {
    connected: AtomicBool,
    latency: Duration,
    event_probability: f64,
    tags: Vec<String>,
    next_tag: AtomicUsize,
    rng: Mutex<StdRng>,
    light: Mutex<Option<(String, u8)>>,
    booted_at: Mutex<Option<Instant>>,
}

impl SimulatedBoard {
    pub fn new(config: &SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let probability = if config.event_probability.is_nan() {
            0.0
        } else {
            config.event_probability.clamp(0.0, 1.0)
        };

        Self {
            connected: AtomicBool::new(false),
            latency: config.latency(),
            event_probability: probability,
            tags: config.tags.clone(),
            next_tag: AtomicUsize::new(0),
            rng: Mutex::new(rng),
            light: Mutex::new(None),
            booted_at: Mutex::new(None),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn set_connected(&self, connected: bool) {
        *self.booted_at.lock() = connected.then(Instant::now);
        self.connected.store(connected, Ordering::Release);
    }

    /// Last colour and brightness set.
    pub fn light(&self) -> Option<(String, u8)> {
        self.light.lock().clone()
    }

    fn uptime(&self) -> f64 {
        self.booted_at
            .lock()
            .map(|at| at.elapsed().as_secs_f64())
            .unwrap_or_default()
    }

    fn maybe_tag(&self) -> Option<String> {
        if self.tags.is_empty() || !self.rng.lock().gen_bool(self.event_probability) {
            return None;
        }
        let index = self.next_tag.fetch_add(1, Ordering::Relaxed) % self.tags.len();
        Some(self.tags[index].clone())
    }

    fn answer(&self, command: &Command) -> Response {
        match command.name() {
            GET_STATUS => Response::ok(Some(object(json!({
                "firmware_version": MOCK_FIRMWARE_VERSION,
                "uptime": self.uptime(),
                "rfid_enabled": true,
                "lights_enabled": true,
            })))),
            SET_LIGHT => {
                let color = command
                    .param("color")
                    .and_then(Value::as_str)
                    .unwrap_or("white")
                    .to_string();
                let brightness = command
                    .param("brightness")
                    .and_then(Value::as_u64)
                    .map_or(MAX_BRIGHTNESS, |b| b.min(MAX_BRIGHTNESS as u64) as u8);
                debug!("Simulated light: {} at {}", color, brightness);
                *self.light.lock() = Some((color, brightness));
                Response::ok(None)
            }
            READ_RFID => {
                let tag = self.maybe_tag();
                if let Some(ref tag) = tag {
                    debug!("Simulated RFID detection: {}", tag);
                }
                Response::ok(Some(object(json!({ "rfid": tag }))))
            }
            other => Response::error(ErrorKind::DeviceError, format!("Unknown command: {other}")),
        }
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[async_trait]
impl CommandExchange for SimulatedBoard {
    async fn send(&self, command: Command) -> Response {
        if !self.is_connected() {
            return Response::not_connected();
        }
        tokio::time::sleep(self.latency).await;
        // May have been disconnected while "on the wire".
        if !self.is_connected() {
            return Response::not_connected();
        }
        self.answer(&command)
    }
}

/// Backend that never touches hardware.
pub struct SimulatedDevice {
    board: Arc<SimulatedBoard>,
    connect_delay: Duration,
    monitor: EventMonitor,
}

impl SimulatedDevice {
    pub fn new(simulation: &SimulationConfig, poll_interval: Duration) -> Self {
        Self {
            board: Arc::new(SimulatedBoard::new(simulation)),
            connect_delay: simulation.connect_delay(),
            monitor: EventMonitor::new(poll_interval),
        }
    }

    pub fn from_config(simulation: &SimulationConfig, device: &DeviceConfig) -> Self {
        Self::new(simulation, device.poll_interval())
    }

    pub fn board(&self) -> &Arc<SimulatedBoard> {
        &self.board
    }
}

#[async_trait]
impl DeviceBackend for SimulatedDevice {
    async fn connect(&mut self) -> DeviceResult<()> {
        if self.board.is_connected() {
            return Ok(());
        }
        info!("Connecting to simulated Pico");
        tokio::time::sleep(self.connect_delay).await;
        self.board.set_connected(true);
        info!("Simulated Pico connected");
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.monitor.stop().await;
        if self.board.is_connected() {
            self.board.set_connected(false);
            info!("Simulated Pico disconnected");
        }
    }

    async fn send(&self, command: Command) -> Response {
        self.board.send(command).await
    }

    fn start_monitoring(&mut self, callback: EventCallback) -> bool {
        if !self.board.is_connected() {
            return false;
        }
        let exchange: Arc<dyn CommandExchange> = self.board.clone();
        self.monitor.start(exchange, callback)
    }

    async fn stop_monitoring(&mut self) {
        self.monitor.stop().await;
    }

    fn is_connected(&self) -> bool {
        self.board.is_connected()
    }

    fn is_monitoring(&self) -> bool {
        self.monitor.is_running()
    }

    fn is_simulated(&self) -> bool {
        true
    }

    fn port_name(&self) -> Option<String> {
        self.board.is_connected().then(|| SIMULATED_PORT.to_string())
    }
}
