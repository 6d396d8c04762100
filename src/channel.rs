//! Single-flight request/response channel over a blocking transport.
//!
//! The serial line is half-duplex: two writers could interleave bytes or one
//! caller could consume another's reply. `CommandChannel` holds an async
//! exchange lock for the whole write-then-read, so "send one command, get its
//! reply" holds for every caller, including the background monitor.
//!
//! Blocking I/O runs on Tokio's blocking pool via `spawn_blocking`, the same
//! way the port layer wraps sync ports for async callers.

use crate::error::ErrorKind;
use crate::port::{PortError, Transport};
use crate::protocol::{Command, Response};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Extra time the async side waits for a blocking exchange beyond the command
/// timeout before giving up on the worker.
const WORKER_GRACE: Duration = Duration::from_millis(250);

type TransportSlot = Arc<Mutex<Option<Box<dyn Transport>>>>;

/// Anything that can run one command exchange. Implemented by the live
/// channel and by the simulated board, so the monitor can poll either.
#[async_trait]
pub trait CommandExchange: Send + Sync {
    async fn send(&self, command: Command) -> Response;
}

/// Serializes command exchanges over one transport.
pub struct CommandChannel {
    transport: TransportSlot,
    exchange: tokio::sync::Mutex<()>,
    open: AtomicBool,
    port_name: Mutex<Option<String>>,
    command_timeout: Duration,
}

impl CommandChannel {
    /// A channel with no transport attached; every send returns
    /// `NotConnected` until `attach` is called.
    pub fn new(command_timeout: Duration) -> Self {
        Self {
            transport: Arc::new(Mutex::new(None)),
            exchange: tokio::sync::Mutex::new(()),
            open: AtomicBool::new(false),
            port_name: Mutex::new(None),
            command_timeout,
        }
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Name of the attached port, if any.
    pub fn port_name(&self) -> Option<String> {
        self.port_name.lock().clone()
    }

    /// Install an open transport. Waits for any in-flight exchange first.
    pub async fn attach(&self, transport: Box<dyn Transport>) {
        let _guard = self.exchange.lock().await;
        let name = transport.name().to_string();
        let previous = self.transport.lock().replace(transport);
        if let Some(mut previous) = previous {
            warn!("Replacing still-attached transport {}", previous.name());
            let _ = previous.close();
        }
        *self.port_name.lock() = Some(name);
        self.open.store(true, Ordering::Release);
    }

    /// Detach and close the transport. Waits for any in-flight exchange, so a
    /// close never cuts an exchange in half.
    pub async fn detach(&self) -> Result<(), PortError> {
        let _guard = self.exchange.lock().await;
        self.teardown().await
    }

    /// Run one exchange. Never returns `Err`: every failure is an error
    /// `Response` with its `ErrorKind`.
    pub async fn send(&self, command: Command) -> Response {
        if !self.is_open() {
            debug!("Dropping {}: not connected", command.name());
            return Response::not_connected();
        }

        let _guard = self.exchange.lock().await;
        if !self.is_open() {
            return Response::not_connected();
        }

        let line = match command.encode() {
            Ok(line) => line,
            Err(e) => {
                return Response::error(
                    ErrorKind::ProtocolError,
                    format!("Cannot encode {}: {e}", command.name()),
                )
            }
        };
        debug!("-> {}", line.trim_end());

        let slot = Arc::clone(&self.transport);
        let timeout = self.command_timeout;
        let worker = tokio::task::spawn_blocking(move || exchange_blocking(&slot, &line, timeout));

        let outcome = match tokio::time::timeout(timeout + WORKER_GRACE, worker).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_err)) => {
                error!("Exchange worker for {} failed: {}", command.name(), join_err);
                return Response::error(ErrorKind::Transport, join_err.to_string());
            }
            Err(_) => {
                warn!("Command timeout: {} (worker unresponsive)", command.name());
                return timeout_response(&command, timeout);
            }
        };

        match outcome {
            Ok(Some(reply)) => {
                debug!("<- {}", reply);
                let response = Response::decode(&reply);
                if response.error_kind() == Some(ErrorKind::ProtocolError) {
                    warn!("Invalid reply to {}: {}", command.name(), reply);
                }
                response
            }
            Ok(None) => {
                warn!("Command timeout: {}", command.name());
                timeout_response(&command, timeout)
            }
            Err(PortError::NotOpen) => {
                self.open.store(false, Ordering::Release);
                Response::not_connected()
            }
            Err(PortError::Timeout(_)) => timeout_response(&command, timeout),
            Err(PortError::Encoding(e)) => {
                warn!("Undecodable reply to {}: {}", command.name(), e);
                Response::error(ErrorKind::ProtocolError, e.to_string())
            }
            Err(e) if e.is_fatal() => {
                error!("Transport failed during {}, closing: {}", command.name(), e);
                if let Err(close_err) = self.teardown().await {
                    debug!("Close after failure also failed: {}", close_err);
                }
                Response::error(ErrorKind::Transport, e.to_string())
            }
            Err(e) => {
                warn!("Command error: {}: {}", command.name(), e);
                Response::error(ErrorKind::Transport, e.to_string())
            }
        }
    }

    /// Take the transport out of its slot and close it on the blocking pool.
    /// Caller must hold the exchange lock.
    async fn teardown(&self) -> Result<(), PortError> {
        self.open.store(false, Ordering::Release);
        let name = self.port_name.lock().take();
        let slot = Arc::clone(&self.transport);

        let closed = tokio::task::spawn_blocking(move || match slot.lock().take() {
            Some(mut transport) => transport.close().map(|_| true),
            None => Ok(false),
        })
        .await
        .map_err(|e| PortError::Io(std::io::Error::other(e)))??;

        if closed {
            info!("Closed port {}", name.as_deref().unwrap_or("<unnamed>"));
        }
        Ok(())
    }
}

#[async_trait]
impl CommandExchange for CommandChannel {
    async fn send(&self, command: Command) -> Response {
        CommandChannel::send(self, command).await
    }
}

impl std::fmt::Debug for CommandChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandChannel")
            .field("port", &self.port_name())
            .field("open", &self.is_open())
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}

fn timeout_response(command: &Command, timeout: Duration) -> Response {
    Response::error(
        ErrorKind::Timeout,
        format!("No reply to {} within {:?}", command.name(), timeout),
    )
}

/// Write one request and wait for its reply line. Blank lines are skipped;
/// `Ok(None)` means the deadline passed without a reply.
fn exchange_blocking(
    slot: &Mutex<Option<Box<dyn Transport>>>,
    line: &str,
    timeout: Duration,
) -> Result<Option<String>, PortError> {
    let mut guard = slot.lock();
    let port = guard.as_mut().ok_or(PortError::NotOpen)?;

    port.discard_input()?;
    port.write_all(line.as_bytes())?;

    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(None);
        }
        match port.read_line(remaining)? {
            Some(reply) if reply.trim().is_empty() => continue,
            other => return Ok(other),
        }
    }
}
