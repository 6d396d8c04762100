//! The public device interface with live/simulated substitution.

use super::indicator::{IndicatorState, IDLE_COLOR};
use super::{DeviceBackend, SimulatedDevice};
use crate::config::Config;
use crate::error::{DeviceError, DeviceResult};
use crate::monitor::EventCallback;
use crate::protocol::{Command, Response, StatusReport};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, warn};

/// Brightness of each step of the startup sweep.
pub const STARTUP_BRIGHTNESS: u8 = 50;
/// Brightness of the idle colour shown once the sweep ends.
pub const IDLE_BRIGHTNESS: u8 = 30;

/// Snapshot of what the facade knows about the board.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceStatus {
    pub connected: bool,
    pub initialized: bool,
    pub using_simulated: bool,
    pub monitoring: bool,
    pub port: Option<String>,
    pub firmware_version: Option<String>,
    pub uptime_secs: Option<f64>,
    pub rfid_enabled: bool,
    pub lights_enabled: bool,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub error_count: u64,
    pub light: Option<String>,
}

impl DeviceStatus {
    fn apply_report(&mut self, report: &StatusReport) {
        self.firmware_version = Some(report.firmware_version.clone());
        self.uptime_secs = Some(report.uptime);
        self.rfid_enabled = report.rfid_enabled;
        self.lights_enabled = report.lights_enabled;
        self.last_heartbeat = Some(Utc::now());
    }
}

/// Entry point for callers: connects to the board (or its simulation),
/// issues semantic commands and runs RFID monitoring.
pub struct DeviceFacade {
    config: Config,
    backend: Box<dyn DeviceBackend>,
    fell_back: bool,
    status: Mutex<DeviceStatus>,
}

impl DeviceFacade {
    /// Pick the backend for `config`: simulated when hardware support is
    /// compiled out or simulation is requested, live otherwise.
    pub fn new(config: Config) -> Self {
        let backend = default_backend(&config);
        Self::with_backend(config, backend)
    }

    pub fn with_backend(config: Config, backend: Box<dyn DeviceBackend>) -> Self {
        let status = DeviceStatus {
            using_simulated: backend.is_simulated(),
            ..DeviceStatus::default()
        };
        Self {
            config,
            backend,
            fell_back: false,
            status: Mutex::new(status),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_simulated(&self) -> bool {
        self.backend.is_simulated()
    }

    pub fn is_connected(&self) -> bool {
        self.backend.is_connected()
    }

    /// Connect and initialise the board. A live backend that fails is
    /// replaced by the simulated one, once per facade. Returns whether a
    /// backend ended up connected.
    pub async fn connect(&mut self) -> bool {
        if self.backend.is_connected() {
            return true;
        }

        let err = match self.initialize().await {
            Ok(()) => return true,
            Err(e) => e,
        };

        if self.backend.is_simulated() || self.fell_back {
            error!("Failed to connect: {}", err);
            self.status.lock().error_count += 1;
            return false;
        }

        warn!("Live device unavailable ({}), using simulated device", err);
        self.backend.disconnect().await;
        self.backend = Box::new(SimulatedDevice::from_config(
            &self.config.simulation,
            &self.config.device,
        ));
        self.fell_back = true;
        self.status.lock().using_simulated = true;

        match self.initialize().await {
            Ok(()) => true,
            Err(e) => {
                error!("Simulated device failed to connect: {}", e);
                false
            }
        }
    }

    /// Backend connect, status handshake, then the startup sweep.
    async fn initialize(&mut self) -> DeviceResult<()> {
        self.backend.connect().await?;

        let report = match self.backend.send(Command::get_status()).await.status_report() {
            Ok(report) => report,
            Err(e) => {
                self.backend.disconnect().await;
                return Err(DeviceError::connect_failed(format!("Status handshake failed: {e}")));
            }
        };

        info!(
            "Connected to Pico on {} (firmware {}, uptime {:.1}s)",
            self.backend.port_name().as_deref().unwrap_or("<unknown>"),
            report.firmware_version,
            report.uptime
        );

        {
            let mut status = self.status.lock();
            status.apply_report(&report);
            status.initialized = true;
            status.using_simulated = self.backend.is_simulated();
        }

        let indicator = &self.config.indicator;
        if indicator.enabled && indicator.startup_sequence && report.lights_enabled {
            self.startup_sequence().await;
        }
        Ok(())
    }

    async fn startup_sequence(&self) {
        debug!("Running startup light sequence");
        let step = self.config.indicator.startup_step();
        for color in &self.config.indicator.startup_colors {
            self.set_light(color, STARTUP_BRIGHTNESS).await;
            tokio::time::sleep(step).await;
        }
        self.set_light(IDLE_COLOR, IDLE_BRIGHTNESS).await;
    }

    /// Stop monitoring, then close the connection.
    pub async fn disconnect(&mut self) {
        self.backend.stop_monitoring().await;
        self.backend.disconnect().await;
        self.status.lock().initialized = false;
        info!("Disconnected from Pico");
    }

    /// Send a raw command. Error responses count towards `error_count`.
    pub async fn send(&self, command: Command) -> Response {
        let name = command.name().to_string();
        let response = self.backend.send(command).await;
        if !response.is_ok() {
            debug!(
                "{} failed: {}",
                name,
                response.message().unwrap_or("unknown error")
            );
            self.status.lock().error_count += 1;
        }
        response
    }

    pub async fn set_light(&self, color: &str, brightness: u8) -> Response {
        let response = self.send(Command::set_light(color, brightness)).await;
        if response.is_ok() {
            self.status.lock().light = Some(color.to_string());
        }
        response
    }

    /// Light the colour configured for a named state (`reading`,
    /// `processing`, `success`, `error`, `idle`, `off`).
    pub async fn set_indicator(&self, state: &str, intensity: u8) -> Response {
        if !self.config.indicator.enabled {
            debug!("Indicators disabled, ignoring {}", state);
            return Response::ok(None);
        }
        let state = IndicatorState::from(state);
        if let IndicatorState::Unknown(ref name) = state {
            debug!("Unknown indicator state {}, using default colour", name);
        }
        let color = state.color(&self.config.indicator).to_string();
        self.set_light(&color, intensity).await
    }

    /// Query `get_status` and fold the answer into `status()`.
    pub async fn refresh_status(&self) -> Response {
        let response = self.send(Command::get_status()).await;
        match response.status_report() {
            Ok(report) => self.status.lock().apply_report(&report),
            Err(e) => debug!("Status refresh failed: {}", e),
        }
        response
    }

    /// Begin background RFID polling. `false` if RFID is disabled, the
    /// device is not connected or monitoring is already running.
    pub fn start_monitoring(&mut self, callback: EventCallback) -> bool {
        if !self.config.device.rfid_enabled {
            warn!("RFID disabled in configuration, not monitoring");
            return false;
        }
        if !self.backend.is_connected() {
            warn!("Cannot start monitoring: not connected");
            return false;
        }
        self.backend.start_monitoring(callback)
    }

    pub async fn stop_monitoring(&mut self) {
        self.backend.stop_monitoring().await;
    }

    pub fn status(&self) -> DeviceStatus {
        let mut status = self.status.lock().clone();
        status.connected = self.backend.is_connected();
        status.monitoring = self.backend.is_monitoring();
        status.using_simulated = self.backend.is_simulated();
        status.port = self.backend.port_name();
        status
    }
}

impl std::fmt::Debug for DeviceFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceFacade")
            .field("simulated", &self.backend.is_simulated())
            .field("connected", &self.backend.is_connected())
            .field("fell_back", &self.fell_back)
            .finish()
    }
}

#[cfg(feature = "hardware")]
fn default_backend(config: &Config) -> Box<dyn DeviceBackend> {
    if config.simulation.enabled {
        info!("Simulation requested, using simulated device");
        return Box::new(SimulatedDevice::from_config(&config.simulation, &config.device));
    }
    Box::new(super::LiveDevice::from_config(config))
}

#[cfg(not(feature = "hardware"))]
fn default_backend(config: &Config) -> Box<dyn DeviceBackend> {
    info!("Built without hardware support, using simulated device");
    Box::new(SimulatedDevice::from_config(&config.simulation, &config.device))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::LiveDevice;
    use crate::error::ErrorKind;
    use crate::port::{MockConnector, MockTransport, PortResolver, StaticPortLister};
    use std::sync::Arc;

    fn config() -> Config {
        let mut config = Config::default();
        config.device.port = "MOCK0".into();
        config.device.boot_delay_secs = 0.0;
        config.device.command_timeout_secs = 0.2;
        config.indicator.startup_sequence = false;
        config.simulation.connect_delay_ms = 0;
        config.simulation.latency_ms = 0;
        config
    }

    fn live(config: &Config, mock: MockTransport) -> Box<dyn DeviceBackend> {
        let resolver = PortResolver::new(
            Some(config.device.port.clone()),
            vec![],
            vec![],
            Box::new(StaticPortLister::default()),
        );
        Box::new(LiveDevice::with_parts(
            resolver,
            Arc::new(MockConnector::new(mock)),
            &config.device,
        ))
    }

    #[tokio::test]
    async fn test_connect_populates_status() {
        let config = config();
        let mock = MockTransport::pico("MOCK0");
        let mut facade = DeviceFacade::with_backend(config.clone(), live(&config, mock));

        assert!(facade.connect().await);
        let status = facade.status();
        assert!(status.connected && status.initialized);
        assert!(!status.using_simulated);
        assert_eq!(status.firmware_version.as_deref(), Some("2.1.0"));
        assert_eq!(status.port.as_deref(), Some("MOCK0"));
        assert!(status.last_heartbeat.is_some());
    }

    #[tokio::test]
    async fn test_failed_handshake_falls_back() {
        let config = config();
        let mock = MockTransport::new("MOCK0").with_responder(|_| Some("garbage".into()));
        let mut facade = DeviceFacade::with_backend(config.clone(), live(&config, mock.clone()));

        assert!(facade.connect().await);
        assert!(facade.is_simulated());
        assert!(!mock.is_open());
        assert_eq!(
            facade.status().firmware_version.as_deref(),
            Some(crate::device::MOCK_FIRMWARE_VERSION)
        );
    }

    #[tokio::test]
    async fn test_indicator_mapping_and_disabled_noop() {
        let config = config();
        let mock = MockTransport::pico("MOCK0");
        let mut facade = DeviceFacade::with_backend(config.clone(), live(&config, mock.clone()));
        facade.connect().await;

        assert!(facade.set_indicator("success", 80).await.is_ok());
        assert_eq!(mock.light(), Some(("green".to_string(), 80)));
        assert_eq!(facade.status().light.as_deref(), Some("green"));

        let mut disabled = config.clone();
        disabled.indicator.enabled = false;
        let quiet = MockTransport::pico("MOCK0");
        let mut facade = DeviceFacade::with_backend(disabled.clone(), live(&disabled, quiet.clone()));
        facade.connect().await;
        let writes = quiet.write_count();
        assert!(facade.set_indicator("error", 100).await.is_ok());
        assert_eq!(quiet.write_count(), writes);
    }

    #[tokio::test]
    async fn test_error_responses_are_counted() {
        let config = config();
        let mock = MockTransport::pico("MOCK0");
        let mut facade = DeviceFacade::with_backend(config.clone(), live(&config, mock));
        facade.connect().await;

        let response = facade.send(Command::new("self_destruct")).await;
        assert_eq!(response.error_kind(), Some(ErrorKind::DeviceError));
        assert_eq!(facade.status().error_count, 1);
    }

    #[tokio::test]
    async fn test_monitoring_refused_when_rfid_disabled() {
        let mut config = config();
        config.device.rfid_enabled = false;
        let mock = MockTransport::pico("MOCK0");
        let mut facade = DeviceFacade::with_backend(config.clone(), live(&config, mock));
        facade.connect().await;

        assert!(!facade.start_monitoring(crate::monitor::callback(|_| Ok(()))));
        assert!(!facade.status().monitoring);
    }

    #[tokio::test]
    async fn test_unvalidated_timings_do_not_panic() {
        for bad in [1e20, f64::NAN, -1.0] {
            let mut config = config();
            config.simulation.enabled = true;
            config.device.poll_interval_secs = bad;
            config.device.command_timeout_secs = bad;
            let mut facade = DeviceFacade::new(config);

            assert!(facade.connect().await);
            assert!(facade.refresh_status().await.is_ok());
            facade.disconnect().await;
        }
    }

    #[tokio::test]
    async fn test_monitoring_refused_when_disconnected() {
        let config = config();
        let mut facade =
            DeviceFacade::with_backend(config.clone(), live(&config, MockTransport::pico("MOCK0")));
        assert!(!facade.start_monitoring(crate::monitor::callback(|_| Ok(()))));
    }
}
