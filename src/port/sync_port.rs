//! Serial transport backed by the `serialport` crate.
//!
//! Only compiled with the `hardware` feature.

use super::error::PortError;
use super::traits::{Connector, LinkSettings, PortDescriptor, PortLister, Transport};
use std::io::{Read, Write};
use std::time::{Duration, Instant};

/// Pause after a read that returned nothing without blocking.
const EMPTY_READ_BACKOFF: Duration = Duration::from_millis(10);

/// How long to sleep after an empty read, never past `deadline`.
fn empty_read_backoff(deadline: Instant, now: Instant) -> Duration {
    deadline.saturating_duration_since(now).min(EMPTY_READ_BACKOFF)
}

/// Blocking serial connection with an internal line buffer.
pub struct SerialTransport {
    /// The underlying port; `None` once closed.
    port: Option<Box<dyn serialport::SerialPort>>,
    /// Port name/path for identification.
    name: String,
    /// Bytes read past the last returned line.
    pending: Vec<u8>,
}

impl SerialTransport {
    /// Open a serial port as 8N1 without flow control.
    ///
    /// # Example
    /// ```no_run
    /// use pico_link::port::{LinkSettings, SerialTransport};
    ///
    /// let port = SerialTransport::open("/dev/ttyACM0", &LinkSettings::default())?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open(port_name: &str, settings: &LinkSettings) -> Result<Self, PortError> {
        let port = serialport::new(port_name, settings.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .flow_control(serialport::FlowControl::None)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(settings.read_timeout)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => PortError::not_found(port_name),
                serialport::ErrorKind::InvalidInput => PortError::config(e.to_string()),
                _ => PortError::Serial(e),
            })?;

        Ok(Self {
            port: Some(port),
            name: port_name.to_string(),
            pending: Vec::new(),
        })
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn serialport::SerialPort>, PortError> {
        self.port.as_mut().ok_or(PortError::NotOpen)
    }

    /// Split the first complete line off the pending buffer.
    fn take_line(&mut self) -> Result<Option<String>, PortError> {
        match memchr::memchr(b'\n', &self.pending) {
            Some(pos) => {
                let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                Ok(Some(String::from_utf8(line)?))
            }
            None => Ok(None),
        }
    }
}

impl Transport for SerialTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), PortError> {
        let port = self.port_mut()?;
        port.write_all(data)?;
        port.flush()?;
        Ok(())
    }

    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>, PortError> {
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; 256];

        loop {
            if let Some(line) = self.take_line()? {
                return Ok(Some(line));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }

            match self.port_mut()?.read(&mut chunk) {
                // Some drivers return immediately with no data
                Ok(0) => std::thread::sleep(empty_read_backoff(deadline, Instant::now())),
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) => {
                    let err = PortError::Io(e);
                    if err.is_fatal() {
                        return Err(err);
                    }
                    std::thread::sleep(empty_read_backoff(deadline, Instant::now()));
                }
            }
        }
    }

    fn discard_input(&mut self) -> Result<(), PortError> {
        self.pending.clear();
        self.port_mut()?
            .clear(serialport::ClearBuffer::Input)
            .map_err(PortError::Serial)
    }

    fn close(&mut self) -> Result<(), PortError> {
        // Dropping the handle closes the OS file descriptor.
        self.port.take().map(drop).ok_or(PortError::NotOpen)
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("name", &self.name)
            .field("open", &self.port.is_some())
            .field("baud_rate", &self.port.as_ref().and_then(|p| p.baud_rate().ok()))
            .finish()
    }
}

/// Opens `SerialTransport`s.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialConnector;

impl Connector for SerialConnector {
    fn open(&self, port_name: &str, settings: &LinkSettings) -> Result<Box<dyn Transport>, PortError> {
        Ok(Box::new(SerialTransport::open(port_name, settings)?))
    }
}

/// Enumerates system ports through `serialport::available_ports`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPortLister;

impl PortLister for SystemPortLister {
    fn list_ports(&self) -> Result<Vec<PortDescriptor>, PortError> {
        let ports = serialport::available_ports()?;
        Ok(ports
            .into_iter()
            .map(|info| {
                let description = describe(&info.port_type);
                PortDescriptor::new(info.port_name, description)
            })
            .collect())
    }
}

/// Human-readable description: product, manufacturer and `VID:PID` for USB
/// devices, the port type otherwise.
fn describe(port_type: &serialport::SerialPortType) -> String {
    match port_type {
        serialport::SerialPortType::UsbPort(usb) => {
            let mut parts = Vec::new();
            if let Some(ref product) = usb.product {
                parts.push(product.clone());
            }
            if let Some(ref manufacturer) = usb.manufacturer {
                parts.push(manufacturer.clone());
            }
            parts.push(format!("{:04X}:{:04X}", usb.vid, usb.pid));
            parts.join(" - ")
        }
        serialport::SerialPortType::BluetoothPort => "Bluetooth".to_string(),
        serialport::SerialPortType::PciPort => "PCI".to_string(),
        serialport::SerialPortType::Unknown => "Unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_read_backoff_is_bounded_by_deadline() {
        let now = Instant::now();
        assert_eq!(empty_read_backoff(now + Duration::from_secs(1), now), EMPTY_READ_BACKOFF);
        assert_eq!(
            empty_read_backoff(now + Duration::from_millis(3), now),
            Duration::from_millis(3)
        );
        assert_eq!(empty_read_backoff(now, now + Duration::from_millis(5)), Duration::ZERO);
        assert!(!EMPTY_READ_BACKOFF.is_zero());
    }

    #[test]
    fn test_port_not_found_error() {
        let result = SerialTransport::open("/dev/nonexistent_port_12345", &LinkSettings::default());

        match result {
            Err(PortError::NotFound(name)) => assert!(name.contains("nonexistent")),
            Err(PortError::Serial(_)) | Err(PortError::Io(_)) => {
                // Some platforms report a generic I/O error instead of NoDevice.
            }
            other => panic!("Expected NotFound error, got: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_usb_description_includes_vid_pid() {
        let usb = serialport::UsbPortInfo {
            vid: 0x2E8A,
            pid: 0x0005,
            serial_number: None,
            manufacturer: Some("Raspberry Pi".to_string()),
            product: Some("Board CDC".to_string()),
        };
        let text = describe(&serialport::SerialPortType::UsbPort(usb));
        assert_eq!(text, "Board CDC - Raspberry Pi - 2E8A:0005");
    }
}
