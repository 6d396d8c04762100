//! End-to-end tests for `DeviceFacade` over mock and simulated backends.

mod common;

use common::{
    assert_exchanges_do_not_interleave, live_backend, recorder, settle, test_config,
    unreachable_backend,
};
use pico_link::device::{
    DeviceBackend, SimulatedDevice, IDLE_BRIGHTNESS, MOCK_FIRMWARE_VERSION, STARTUP_BRIGHTNESS,
};
use pico_link::port::MockTransport;
use pico_link::{callback, DeviceFacade};
use pretty_assertions::assert_eq;
use std::time::Duration;

#[tokio::test]
async fn test_live_connect_failure_falls_back_to_simulation() {
    // Arrange: a live backend whose port can never be opened
    let config = test_config();
    let mut facade = DeviceFacade::with_backend(config.clone(), unreachable_backend(&config));
    assert!(!facade.is_simulated());

    // Act
    let connected = facade.connect().await;

    // Assert: the simulated board took over and answers commands
    assert!(connected);
    let status = facade.status();
    assert!(status.connected);
    assert!(status.using_simulated);
    assert!(status.initialized);
    assert_eq!(status.firmware_version.as_deref(), Some(MOCK_FIRMWARE_VERSION));
    assert!(facade.set_indicator("success", 60).await.is_ok());
}

#[tokio::test]
async fn test_fallback_happens_only_once() {
    let config = test_config();
    let mut facade = DeviceFacade::with_backend(config.clone(), unreachable_backend(&config));
    assert!(facade.connect().await);

    facade.disconnect().await;
    assert!(!facade.status().connected);

    // Reconnecting stays on the simulated board
    assert!(facade.connect().await);
    assert!(facade.is_simulated());
}

#[tokio::test]
async fn test_startup_sequence_order_and_spacing() {
    // Arrange
    let mut config = test_config();
    config.indicator.startup_sequence = true;
    config.indicator.startup_step_ms = 40;
    let mock = MockTransport::pico("MOCK0");
    let mut facade = DeviceFacade::with_backend(config.clone(), live_backend(&config, &mock));

    // Act
    assert!(facade.connect().await);

    // Assert: handshake, the five colours at 50, then idle at 30
    let requests = mock.written_requests();
    let commands: Vec<&str> = requests
        .iter()
        .map(|(req, _)| req["command"].as_str().unwrap_or_default())
        .collect();
    assert_eq!(commands[0], "get_status");

    let lights: Vec<(String, u64)> = requests
        .iter()
        .filter(|(req, _)| req["command"] == "set_light")
        .map(|(req, _)| {
            (
                req["color"].as_str().unwrap_or_default().to_string(),
                req["brightness"].as_u64().unwrap_or_default(),
            )
        })
        .collect();
    let step = u64::from(STARTUP_BRIGHTNESS);
    assert_eq!(
        lights,
        vec![
            ("red".to_string(), step),
            ("yellow".to_string(), step),
            ("green".to_string(), step),
            ("blue".to_string(), step),
            ("purple".to_string(), step),
            ("dim_blue".to_string(), u64::from(IDLE_BRIGHTNESS)),
        ]
    );

    let times: Vec<_> = requests
        .iter()
        .filter(|(req, _)| req["command"] == "set_light")
        .map(|(_, at)| *at)
        .collect();
    for pair in times.windows(2) {
        let gap = pair[1].duration_since(pair[0]);
        assert!(gap >= Duration::from_millis(40), "steps {gap:?} apart");
        assert!(gap < Duration::from_millis(40 + 100), "steps {gap:?} apart");
    }
    assert_eq!(mock.light(), Some(("dim_blue".to_string(), 30)));
}

#[tokio::test]
async fn test_startup_sequence_skipped_when_indicators_disabled() {
    let mut config = test_config();
    config.indicator.startup_sequence = true;
    config.indicator.enabled = false;
    let mock = MockTransport::pico("MOCK0");
    let mut facade = DeviceFacade::with_backend(config.clone(), live_backend(&config, &mock));

    assert!(facade.connect().await);
    assert_eq!(mock.write_count(), 1);
}

#[tokio::test]
async fn test_no_writes_after_stop_monitoring() {
    // Arrange: polling every 20ms
    let config = test_config();
    let mock = MockTransport::pico("MOCK0");
    let mut facade = DeviceFacade::with_backend(config.clone(), live_backend(&config, &mock));
    assert!(facade.connect().await);

    let (cb, _) = recorder();
    assert!(facade.start_monitoring(cb));
    settle(120).await;

    // Act
    facade.stop_monitoring().await;
    let writes_at_stop = mock.write_count();
    settle(150).await;

    // Assert: several poll intervals later, nothing new hit the wire
    assert!(writes_at_stop > 2);
    assert_eq!(mock.write_count(), writes_at_stop);
    assert!(!facade.status().monitoring);
    assert!(facade.status().connected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_monitor_and_commands_share_the_line() {
    // Arrange
    let config = test_config();
    let mock = MockTransport::pico("MOCK0");
    let mut facade = DeviceFacade::with_backend(config.clone(), live_backend(&config, &mock));
    assert!(facade.connect().await);
    let (cb, seen) = recorder();
    assert!(facade.start_monitoring(cb));

    // Act: indicator commands while the monitor polls
    mock.present_tag("04A1B2C3");
    for state in ["reading", "processing", "success", "idle"] {
        assert!(facade.set_indicator(state, 70).await.is_ok());
        settle(15).await;
    }
    settle(60).await;
    facade.disconnect().await;

    // Assert
    assert_eq!(*seen.lock(), vec!["04A1B2C3".to_string()]);
    assert_exchanges_do_not_interleave(&mock.events());
    assert!(!mock.is_open());
}

#[tokio::test]
async fn test_disconnect_stops_monitor_before_closing() {
    let config = test_config();
    let mock = MockTransport::pico("MOCK0");
    let mut facade = DeviceFacade::with_backend(config.clone(), live_backend(&config, &mock));
    assert!(facade.connect().await);
    let (cb, _) = recorder();
    assert!(facade.start_monitoring(cb));
    settle(50).await;

    facade.disconnect().await;
    let writes = mock.write_count();
    settle(80).await;

    let status = facade.status();
    assert!(!status.connected && !status.monitoring);
    assert_eq!(mock.write_count(), writes);
    assert_eq!(mock.close_count(), 1);
}

#[tokio::test]
async fn test_fatal_link_error_marks_device_disconnected() {
    let config = test_config();
    let mock = MockTransport::pico("MOCK0");
    let mut facade = DeviceFacade::with_backend(config.clone(), live_backend(&config, &mock));
    assert!(facade.connect().await);

    mock.fail_reads(std::io::ErrorKind::BrokenPipe);
    let response = facade.refresh_status().await;

    assert!(!response.is_ok());
    let status = facade.status();
    assert!(!status.connected);
    assert_eq!(status.error_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_simulated_end_to_end() {
    // Arrange: a simulated board that reports a tag on every poll
    let mut config = test_config();
    config.simulation.event_probability = 1.0;
    config.simulation.latency_ms = 100;
    config.simulation.connect_delay_ms = 500;
    config.device.poll_interval_secs = 0.5;
    config.indicator.startup_sequence = true;
    let backend: Box<dyn DeviceBackend> = Box::new(SimulatedDevice::from_config(
        &config.simulation,
        &config.device,
    ));
    let mut facade = DeviceFacade::with_backend(config, backend);

    // Act
    assert!(facade.connect().await);
    let (cb, seen) = recorder();
    assert!(facade.start_monitoring(cb));
    tokio::time::sleep(Duration::from_millis(1300)).await;
    facade.disconnect().await;

    // Assert: tags cycle through the default list in order
    let seen = seen.lock().clone();
    assert!(seen.len() >= 2, "saw {seen:?}");
    assert_eq!(seen[0], "123456789012");
    assert_eq!(seen[1], "987654321098");

    let status = facade.status();
    assert!(status.using_simulated);
    assert!(!status.connected);
    assert_eq!(status.light.as_deref(), Some("dim_blue"));
    assert_eq!(status.error_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_simulated_board_with_default_event_rate() {
    // Arrange: simulation forced on, default 20% event probability
    let mut config = test_config();
    config.simulation.enabled = true;
    config.device.poll_interval_secs = 0.5;
    let candidates = config.simulation.tags.clone();
    let mut facade = DeviceFacade::new(config);

    // Act
    assert!(facade.connect().await);
    assert!(facade.is_simulated());
    assert!(facade.set_indicator("success", 100).await.is_ok());
    let (cb, seen) = recorder();
    assert!(facade.start_monitoring(cb));
    tokio::time::sleep(Duration::from_millis(2600)).await;
    facade.disconnect().await;

    // Assert: at most one event per poll, each from the configured tags
    let seen = seen.lock().clone();
    assert!(seen.len() <= 6, "saw {seen:?}");
    assert!(seen.iter().all(|tag| candidates.contains(tag)), "saw {seen:?}");
    assert_eq!(
        candidates,
        vec!["123456789012", "987654321098", "111222333444", "555666777888"]
    );
    assert_eq!(facade.status().error_count, 0);
}

#[tokio::test]
async fn test_callback_failures_are_contained() {
    let mut config = test_config();
    config.simulation.event_probability = 1.0;
    config.simulation.enabled = true;
    let mut facade = DeviceFacade::new(config);
    assert!(facade.connect().await);

    let cb = callback(|_| Err("downstream unavailable".into()));
    assert!(facade.start_monitoring(cb));
    settle(100).await;

    assert!(facade.status().monitoring);
    facade.disconnect().await;
}
