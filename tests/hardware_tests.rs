//! Tests against a real board.
//!
//! Run with: `PICO_LINK_TEST_PORT=/dev/ttyACM0 cargo test --features hardware-tests`
//! Skipped (passing trivially) when the variable is not set.

#![cfg(feature = "hardware-tests")]

use pico_link::config::Config;
use pico_link::port::{SerialConnector, StaticPortLister};
use pico_link::{Command, DeviceFacade, LiveDevice, PortResolver};
use std::sync::Arc;

fn test_port() -> Option<String> {
    std::env::var("PICO_LINK_TEST_PORT").ok()
}

fn live_facade(port: &str) -> DeviceFacade {
    let mut config = Config::default();
    config.device.port = port.to_string();
    config.indicator.startup_sequence = false;
    let resolver = PortResolver::new(
        Some(port.to_string()),
        vec![],
        vec![],
        Box::new(StaticPortLister::default()),
    );
    let backend = LiveDevice::with_parts(resolver, Arc::new(SerialConnector), &config.device);
    DeviceFacade::with_backend(config, Box::new(backend))
}

#[tokio::test]
async fn test_real_board_handshake() {
    let Some(port) = test_port() else {
        eprintln!("PICO_LINK_TEST_PORT not set, skipping");
        return;
    };

    let mut facade = live_facade(&port);
    assert!(facade.connect().await);
    assert!(!facade.is_simulated(), "fell back to simulation on {port}");

    let status = facade.status();
    assert!(status.firmware_version.is_some());
    assert!(facade.send(Command::read_rfid()).await.is_ok());
    assert!(facade.set_indicator("idle", 30).await.is_ok());

    facade.disconnect().await;
}
