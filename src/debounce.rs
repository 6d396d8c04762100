//! Suppress repeated reads of the same tag.
//!
//! A tag held against the reader is reported on every poll. `Debouncer`
//! passes the first read through and drops repeats of the same tag until the
//! window has passed since the last accepted read.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    last: Option<(String, Instant)>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// `true` if `tag` should be handled now.
    pub fn accept(&mut self, tag: &str) -> bool {
        self.accept_at(tag, Instant::now())
    }

    /// As `accept`, with an explicit clock reading.
    pub fn accept_at(&mut self, tag: &str, now: Instant) -> bool {
        if let Some((ref last_tag, at)) = self.last {
            if last_tag == tag && now.saturating_duration_since(at) < self.window {
                return false;
            }
        }
        self.last = Some((tag.to_string(), now));
        true
    }

    /// Forget the last accepted tag.
    pub fn reset(&mut self) {
        self.last = None;
    }
}
