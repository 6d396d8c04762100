//! Backend for a board on a real serial port.

use super::DeviceBackend;
use crate::channel::{CommandChannel, CommandExchange};
use crate::config::DeviceConfig;
use crate::error::{DeviceError, DeviceResult};
use crate::monitor::{EventCallback, EventMonitor};
use crate::port::{Connector, LinkSettings, PortResolver};
use crate::protocol::{Command, Response};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Resolves a port, opens it through a `Connector` and serves commands over
/// a `CommandChannel`.
pub struct LiveDevice {
    resolver: Arc<PortResolver>,
    connector: Arc<dyn Connector>,
    link: LinkSettings,
    boot_delay: Duration,
    channel: Arc<CommandChannel>,
    monitor: EventMonitor,
}

impl LiveDevice {
    pub fn with_parts(
        resolver: PortResolver,
        connector: Arc<dyn Connector>,
        device: &DeviceConfig,
    ) -> Self {
        Self {
            resolver: Arc::new(resolver),
            connector,
            link: device.link_settings(),
            boot_delay: device.boot_delay(),
            channel: Arc::new(CommandChannel::new(device.command_timeout())),
            monitor: EventMonitor::new(device.poll_interval()),
        }
    }

    /// Live backend on the system's serial ports.
    #[cfg(feature = "hardware")]
    pub fn from_config(config: &crate::config::Config) -> Self {
        let resolver = PortResolver::from_config(
            &config.device.port,
            &config.discovery,
            crate::port::system_lister(),
        );
        Self::with_parts(resolver, Arc::new(crate::port::SerialConnector), &config.device)
    }

    pub fn channel(&self) -> &Arc<CommandChannel> {
        &self.channel
    }
}

#[async_trait]
impl DeviceBackend for LiveDevice {
    async fn connect(&mut self) -> DeviceResult<()> {
        if self.channel.is_open() {
            return Ok(());
        }

        let resolver = Arc::clone(&self.resolver);
        let port = tokio::task::spawn_blocking(move || resolver.resolve())
            .await
            .map_err(|e| DeviceError::connect_failed(format!("Port resolution aborted: {e}")))??;

        info!("Connecting to Pico on {} at {} baud", port, self.link.baud_rate);
        let connector = Arc::clone(&self.connector);
        let settings = self.link.clone();
        let name = port.clone();
        let transport = tokio::task::spawn_blocking(move || connector.open(&name, &settings))
            .await
            .map_err(|e| DeviceError::connect_failed(format!("Open aborted: {e}")))?
            .map_err(|e| DeviceError::connect_failed(format!("Cannot open {port}: {e}")))?;

        self.channel.attach(transport).await;

        if !self.boot_delay.is_zero() {
            debug!("Waiting {:?} for the board to boot", self.boot_delay);
            tokio::time::sleep(self.boot_delay).await;
        }
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.monitor.stop().await;
        if let Err(e) = self.channel.detach().await {
            warn!("Error closing port: {}", e);
        }
    }

    async fn send(&self, command: Command) -> Response {
        self.channel.send(command).await
    }

    fn start_monitoring(&mut self, callback: EventCallback) -> bool {
        if !self.channel.is_open() {
            return false;
        }
        let exchange: Arc<dyn CommandExchange> = self.channel.clone();
        self.monitor.start(exchange, callback)
    }

    async fn stop_monitoring(&mut self) {
        self.monitor.stop().await;
    }

    fn is_connected(&self) -> bool {
        self.channel.is_open()
    }

    fn is_monitoring(&self) -> bool {
        self.monitor.is_running()
    }

    fn is_simulated(&self) -> bool {
        false
    }

    fn port_name(&self) -> Option<String> {
        self.channel.port_name()
    }
}
