//! In-memory transport for tests and demos.
//!
//! `MockTransport` records every write and read, answers writes either from a
//! built-in emulation of the Pico firmware or from a custom responder, and can
//! inject latency and I/O failures. Clones share state, so a test can keep a
//! handle for inspection after handing a boxed clone to the channel.

use super::error::PortError;
use super::traits::{Connector, LinkSettings, Transport};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Computes the reply (if any) for a written request line. A reply holding
/// several `\n`-separated lines is queued as several lines.
pub type Responder = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// One observed transport operation.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A full write, including its terminator.
    Write { line: String, at: Instant },
    /// A completed line read; `None` if the read timed out.
    Read { line: Option<String>, at: Instant },
}

/// Firmware emulation state.
#[derive(Debug, Default)]
struct Firmware {
    pending_tags: VecDeque<String>,
    light: Option<(String, u8)>,
}

struct MockState {
    open: bool,
    read_queue: VecDeque<String>,
    events: Vec<TransportEvent>,
    responder: Option<Responder>,
    firmware: Option<Firmware>,
    reply_delay: Duration,
    read_failure: Option<std::io::ErrorKind>,
    close_count: usize,
    discard_count: usize,
}

/// Mock transport implementation for testing.
///
/// # Example
/// ```
/// use pico_link::port::{MockTransport, Transport};
/// use std::time::Duration;
///
/// let mut port = MockTransport::pico("MOCK0");
/// port.write_all(b"{\"command\":\"read_rfid\"}\n").unwrap();
/// let reply = port.read_line(Duration::from_millis(10)).unwrap();
/// assert_eq!(reply.as_deref(), Some(r#"{"data":{"rfid":null},"status":"ok"}"#));
/// ```
#[derive(Clone)]
pub struct MockTransport {
    name: String,
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// A silent transport: writes are logged, nothing is ever answered.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockState {
                open: true,
                read_queue: VecDeque::new(),
                events: Vec::new(),
                responder: None,
                firmware: None,
                reply_delay: Duration::ZERO,
                read_failure: None,
                close_count: 0,
                discard_count: 0,
            })),
        }
    }

    /// A transport that answers like healthy Pico firmware.
    pub fn pico(name: impl Into<String>) -> Self {
        let port = Self::new(name);
        port.state.lock().firmware = Some(Firmware::default());
        port
    }

    /// Answer writes with a custom responder instead of the firmware emulation.
    pub fn with_responder<F>(self, responder: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        {
            let mut state = self.state.lock();
            state.responder = Some(Arc::new(responder));
            state.firmware = None;
        }
        self
    }

    /// Queue a raw line to be returned by the next read.
    pub fn enqueue_line(&self, line: impl Into<String>) {
        self.state.lock().read_queue.push_back(line.into());
    }

    /// Make the emulated firmware report `tag` on its next `read_rfid`.
    pub fn present_tag(&self, tag: impl Into<String>) {
        if let Some(fw) = self.state.lock().firmware.as_mut() {
            fw.pending_tags.push_back(tag.into());
        }
    }

    /// Delay every reply by `delay`. Replies slower than the read timeout are
    /// reported as timeouts.
    pub fn set_reply_delay(&self, delay: Duration) {
        self.state.lock().reply_delay = delay;
    }

    /// Make every subsequent read fail with an I/O error of `kind`.
    pub fn fail_reads(&self, kind: std::io::ErrorKind) {
        self.state.lock().read_failure = Some(kind);
    }

    /// Last colour/brightness the emulated firmware received.
    pub fn light(&self) -> Option<(String, u8)> {
        self.state.lock().firmware.as_ref().and_then(|fw| fw.light.clone())
    }

    /// All recorded events in order.
    pub fn events(&self) -> Vec<TransportEvent> {
        self.state.lock().events.clone()
    }

    /// Every line written, terminators included.
    pub fn written_lines(&self) -> Vec<String> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|e| match e {
                TransportEvent::Write { line, .. } => Some(line.clone()),
                TransportEvent::Read { .. } => None,
            })
            .collect()
    }

    /// Written requests decoded as JSON, with their write time.
    pub fn written_requests(&self) -> Vec<(Value, Instant)> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|e| match e {
                TransportEvent::Write { line, at } => {
                    serde_json::from_str(line.trim_end()).ok().map(|v| (v, *at))
                }
                TransportEvent::Read { .. } => None,
            })
            .collect()
    }

    pub fn write_count(&self) -> usize {
        self.written_lines().len()
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    pub fn close_count(&self) -> usize {
        self.state.lock().close_count
    }

    pub fn discard_count(&self) -> usize {
        self.state.lock().discard_count
    }
}

/// Reply of the emulated firmware to one request line.
fn firmware_reply(fw: &mut Firmware, request: &str) -> String {
    let parsed: Value = match serde_json::from_str(request) {
        Ok(v) => v,
        Err(_) => return json!({"status": "error", "message": "Invalid JSON"}).to_string(),
    };

    let reply = match parsed.get("command").and_then(Value::as_str) {
        Some("get_status") => json!({
            "status": "ok",
            "data": {
                "firmware_version": "2.1.0",
                "uptime": 42.5,
                "rfid_enabled": true,
                "lights_enabled": true,
            }
        }),
        Some("set_light") => {
            let color = parsed.get("color").and_then(Value::as_str).unwrap_or("off");
            let brightness = parsed.get("brightness").and_then(Value::as_u64).unwrap_or(100);
            fw.light = Some((color.to_string(), brightness.min(100) as u8));
            json!({"status": "ok"})
        }
        Some("read_rfid") => json!({
            "status": "ok",
            "data": { "rfid": fw.pending_tags.pop_front() }
        }),
        Some(other) => json!({"status": "error", "message": format!("Unknown command: {other}")}),
        None => json!({"status": "error", "message": "Missing command"}),
    };
    reply.to_string()
}

impl Transport for MockTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), PortError> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(PortError::NotOpen);
        }

        let line = String::from_utf8_lossy(data).into_owned();
        state.events.push(TransportEvent::Write {
            line: line.clone(),
            at: Instant::now(),
        });

        let request = line.trim_end();
        let reply = if let Some(responder) = state.responder.clone() {
            responder(request)
        } else {
            state.firmware.as_mut().map(|fw| firmware_reply(fw, request))
        };
        if let Some(reply) = reply {
            state
                .read_queue
                .extend(reply.split('\n').map(str::to_string));
        }
        Ok(())
    }

    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>, PortError> {
        let (line, delay) = {
            let mut state = self.state.lock();
            if !state.open {
                return Err(PortError::NotOpen);
            }
            if let Some(kind) = state.read_failure {
                return Err(PortError::Io(std::io::Error::new(kind, "injected read failure")));
            }
            (state.read_queue.pop_front(), state.reply_delay)
        };

        let line = match line {
            Some(line) if delay <= timeout => {
                std::thread::sleep(delay);
                Some(line)
            }
            Some(line) => {
                std::thread::sleep(timeout);
                self.state.lock().read_queue.push_front(line);
                None
            }
            None => {
                std::thread::sleep(timeout);
                None
            }
        };

        self.state.lock().events.push(TransportEvent::Read {
            line: line.clone(),
            at: Instant::now(),
        });
        Ok(line)
    }

    fn discard_input(&mut self) -> Result<(), PortError> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(PortError::NotOpen);
        }
        state.read_queue.clear();
        state.discard_count += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), PortError> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(PortError::NotOpen);
        }
        state.open = false;
        state.close_count += 1;
        Ok(())
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockTransport")
            .field("name", &self.name)
            .field("open", &state.open)
            .field("queued_lines", &state.read_queue.len())
            .finish()
    }
}

/// Connector handing out clones of one `MockTransport`, or failing.
#[derive(Clone)]
pub struct MockConnector {
    transport: Option<MockTransport>,
    opened: Arc<Mutex<Vec<(String, LinkSettings)>>>,
}

impl MockConnector {
    /// Every `open` reopens `transport` and returns a clone of it.
    pub fn new(transport: MockTransport) -> Self {
        Self {
            transport: Some(transport),
            opened: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every `open` fails as if the device was unplugged.
    pub fn failing() -> Self {
        Self {
            transport: None,
            opened: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Port names and settings of every open attempt.
    pub fn open_attempts(&self) -> Vec<(String, LinkSettings)> {
        self.opened.lock().clone()
    }
}

impl Connector for MockConnector {
    fn open(&self, port_name: &str, settings: &LinkSettings) -> Result<Box<dyn Transport>, PortError> {
        self.opened.lock().push((port_name.to_string(), settings.clone()));
        match self.transport {
            Some(ref transport) => {
                transport.state.lock().open = true;
                Ok(Box::new(transport.clone()))
            }
            None => Err(PortError::not_found(port_name)),
        }
    }
}
