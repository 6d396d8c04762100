//! Port discovery for the Pico board.
//!
//! Resolution order, first match wins:
//! 1. an explicitly configured port, returned without checking it exists;
//! 2. the first enumerated port whose description contains a known
//!    identifier (case-insensitive);
//! 3. the first existing entry of the fallback list, with wildcard entries
//!    expanded against the filesystem;
//! 4. otherwise `PortNotFound`.

use super::traits::PortLister;
use crate::config::DiscoveryConfig;
use crate::error::DeviceError;
use std::path::Path;
use tracing::{debug, info, warn};

/// Conventional device paths for a USB CDC board on this platform.
pub fn default_fallback_ports() -> Vec<String> {
    if cfg!(target_os = "macos") {
        vec!["/dev/cu.usbmodem*".into(), "/dev/tty.usbmodem*".into()]
    } else if cfg!(target_os = "linux") {
        vec![
            "/dev/ttyACM0".into(),
            "/dev/ttyUSB0".into(),
            "/dev/ttyACM*".into(),
            "/dev/ttyUSB*".into(),
        ]
    } else {
        // COM port numbers are not predictable enough to guess.
        vec![]
    }
}

/// Decides which serial port to open.
pub struct PortResolver {
    explicit: Option<String>,
    identifiers: Vec<String>,
    fallbacks: Vec<String>,
    lister: Box<dyn PortLister>,
}

impl PortResolver {
    pub fn new(
        explicit: Option<String>,
        identifiers: Vec<String>,
        fallbacks: Vec<String>,
        lister: Box<dyn PortLister>,
    ) -> Self {
        Self {
            explicit: explicit.filter(|p| !p.trim().is_empty()),
            identifiers,
            fallbacks,
            lister,
        }
    }

    /// Build a resolver from the `[device]` port and the `[discovery]` section.
    pub fn from_config(port: &str, discovery: &DiscoveryConfig, lister: Box<dyn PortLister>) -> Self {
        Self::new(
            Some(port.to_string()),
            discovery.identifiers.clone(),
            discovery.fallback_ports.clone(),
            lister,
        )
    }

    /// Resolve the port to open.
    pub fn resolve(&self) -> Result<String, DeviceError> {
        if let Some(ref port) = self.explicit {
            debug!("Using configured port {}", port);
            return Ok(port.clone());
        }

        if let Some(port) = self.match_descriptor() {
            return Ok(port);
        }

        if let Some(port) = self.first_fallback() {
            info!("Using fallback port {}", port);
            return Ok(port);
        }

        Err(DeviceError::port_not_found(
            "no configured port, no matching descriptor and no fallback candidate present",
        ))
    }

    fn match_descriptor(&self) -> Option<String> {
        let ports = match self.lister.list_ports() {
            Ok(ports) => ports,
            Err(e) => {
                warn!("Port enumeration failed, trying fallbacks: {}", e);
                return None;
            }
        };

        let needles: Vec<String> = self.identifiers.iter().map(|s| s.to_lowercase()).collect();
        let found = ports.into_iter().find(|port| {
            let description = port.description.to_lowercase();
            needles.iter().any(|needle| description.contains(needle.as_str()))
        })?;

        info!("Found Pico on {} ({})", found.port_name, found.description);
        Some(found.port_name)
    }

    fn first_fallback(&self) -> Option<String> {
        self.fallbacks.iter().find_map(|candidate| {
            if is_wildcard(candidate) {
                expand(candidate).into_iter().next()
            } else if Path::new(candidate).exists() {
                Some(candidate.clone())
            } else {
                None
            }
        })
    }
}

impl std::fmt::Debug for PortResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortResolver")
            .field("explicit", &self.explicit)
            .field("identifiers", &self.identifiers)
            .field("fallbacks", &self.fallbacks)
            .finish()
    }
}

fn is_wildcard(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Expand a glob pattern, sorted so the result is stable across calls.
fn expand(pattern: &str) -> Vec<String> {
    let mut matches: Vec<String> = glob::glob(pattern)
        .map(|paths| {
            paths
                .filter_map(Result::ok)
                .map(|p| p.to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    matches.sort();
    matches
}
