//! Port abstraction layer for serial communication.
//!
//! Provides the blocking `Transport` trait with a real serial implementation
//! (behind the `hardware` feature) and an in-memory mock, plus port discovery.

pub mod error;
pub mod mock;
pub mod resolver;
pub mod traits;

#[cfg(feature = "hardware")]
pub mod sync_port;

pub use error::PortError;
pub use mock::{MockConnector, MockTransport, TransportEvent};
pub use resolver::{default_fallback_ports, PortResolver};
pub use traits::*;

#[cfg(feature = "hardware")]
pub use sync_port::{SerialConnector, SerialTransport, SystemPortLister};

/// The lister matching this build: the OS enumeration with hardware support,
/// an empty list without it.
pub fn system_lister() -> Box<dyn PortLister> {
    #[cfg(feature = "hardware")]
    {
        Box::new(SystemPortLister)
    }

    #[cfg(not(feature = "hardware"))]
    {
        Box::new(StaticPortLister::default())
    }
}
