//! Device layer: the backend capability interface and its implementations.
//!
//! `DeviceFacade` is the entry point. It drives one `DeviceBackend`, either a
//! `LiveDevice` talking to the board over serial or a `SimulatedDevice`, and
//! swaps the live one for the simulated one at most once when it cannot
//! connect.

mod facade;
pub mod indicator;
mod live;
mod simulated;

pub use facade::{DeviceFacade, DeviceStatus, IDLE_BRIGHTNESS, STARTUP_BRIGHTNESS};
pub use indicator::IndicatorState;
pub use live::LiveDevice;
pub use simulated::{SimulatedBoard, SimulatedDevice, MOCK_FIRMWARE_VERSION};

use crate::error::DeviceResult;
use crate::monitor::EventCallback;
use crate::protocol::{Command, Response};
use async_trait::async_trait;

/// Operations every backend supports, live or simulated.
#[async_trait]
pub trait DeviceBackend: Send + Sync {
    /// Bring the backend up. Already connected is success.
    async fn connect(&mut self) -> DeviceResult<()>;

    /// Stop monitoring, then release the connection. Safe to call twice.
    async fn disconnect(&mut self);

    /// One command exchange; failures come back as error responses.
    async fn send(&self, command: Command) -> Response;

    /// Start background tag polling. `false` if not connected or a session
    /// is already running.
    fn start_monitoring(&mut self, callback: EventCallback) -> bool;

    /// Stop polling and wait for the poll task to exit.
    async fn stop_monitoring(&mut self);

    fn is_connected(&self) -> bool;

    fn is_monitoring(&self) -> bool;

    fn is_simulated(&self) -> bool;

    fn port_name(&self) -> Option<String>;
}
