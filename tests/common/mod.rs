//! Shared test utilities for pico-link integration tests.
//!
//! This module provides common test infrastructure including:
//! - Configurations with zeroed delays, suited to mock transports
//! - Live backends wired to a `MockTransport`
//! - Callback recorders and event-log assertions

#![allow(dead_code)]

use parking_lot::Mutex;
use pico_link::config::Config;
use pico_link::device::DeviceBackend;
use pico_link::port::{
    MockConnector, MockTransport, PortDescriptor, PortError, PortLister, StaticPortLister,
    TransportEvent,
};
use pico_link::{callback, EventCallback, LiveDevice, PortResolver};
use std::sync::Arc;
use std::time::Duration;

pub const MOCK_PORT: &str = "MOCK0";

/// Config pointing at `MOCK0` with no boot delay, a short command timeout
/// and no startup sweep.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.device.port = MOCK_PORT.to_string();
    config.device.boot_delay_secs = 0.0;
    config.device.command_timeout_secs = 0.3;
    config.device.poll_interval_secs = 0.02;
    config.indicator.startup_sequence = false;
    config.simulation.connect_delay_ms = 0;
    config.simulation.latency_ms = 0;
    config.simulation.seed = Some(42);
    config
}

/// A resolver that always picks the configured port.
pub fn fixed_resolver(config: &Config) -> PortResolver {
    PortResolver::new(
        Some(config.device.port.clone()),
        vec![],
        vec![],
        Box::new(StaticPortLister::default()),
    )
}

/// A live backend whose connector hands out clones of `mock`.
pub fn live_backend(config: &Config, mock: &MockTransport) -> Box<dyn DeviceBackend> {
    Box::new(LiveDevice::with_parts(
        fixed_resolver(config),
        Arc::new(MockConnector::new(mock.clone())),
        &config.device,
    ))
}

/// A live backend that can never open its port.
pub fn unreachable_backend(config: &Config) -> Box<dyn DeviceBackend> {
    Box::new(LiveDevice::with_parts(
        fixed_resolver(config),
        Arc::new(MockConnector::failing()),
        &config.device,
    ))
}

/// Callback that records every tag it receives.
pub fn recorder() -> (EventCallback, Arc<Mutex<Vec<String>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let cb = callback(move |tag| {
        sink.lock().push(tag.to_string());
        Ok(())
    });
    (cb, seen)
}

/// Lister whose enumeration always fails.
pub struct FailingLister;

impl PortLister for FailingLister {
    fn list_ports(&self) -> Result<Vec<PortDescriptor>, PortError> {
        Err(PortError::config("enumeration unavailable"))
    }
}

/// Assert that every write is answered by a read before the next write.
pub fn assert_exchanges_do_not_interleave(events: &[TransportEvent]) {
    let mut awaiting_reply = false;
    for (i, event) in events.iter().enumerate() {
        match event {
            TransportEvent::Write { line, .. } => {
                assert!(
                    !awaiting_reply,
                    "write #{i} ({}) started before the previous reply arrived",
                    line.trim_end()
                );
                awaiting_reply = true;
            }
            TransportEvent::Read { line: Some(_), .. } => awaiting_reply = false,
            TransportEvent::Read { line: None, .. } => {}
        }
    }
}

/// Give background tasks a moment of real time.
pub async fn settle(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
