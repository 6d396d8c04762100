//! Background RFID polling.
//!
//! `EventMonitor` owns at most one monitoring session: a Tokio task that
//! repeatedly sends `read_rfid` through a `CommandExchange` and hands each
//! detected tag to a callback. Cancellation is cooperative; `stop` waits for
//! the task to exit so no poll can be in flight once it returns.

use crate::channel::CommandExchange;
use crate::protocol::Command;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Error type callbacks may return; it is logged, never propagated.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Receives each detected tag id. Runs inline in the polling loop, so a slow
/// callback delays the next poll.
pub type EventCallback = Arc<dyn Fn(&str) -> Result<(), CallbackError> + Send + Sync>;

/// Wrap a closure as an `EventCallback`.
pub fn callback<F>(f: F) -> EventCallback
where
    F: Fn(&str) -> Result<(), CallbackError> + Send + Sync + 'static,
{
    Arc::new(f)
}

struct MonitoringSession {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Polls for tags in the background.
pub struct EventMonitor {
    poll_interval: Duration,
    session: Option<MonitoringSession>,
}

impl EventMonitor {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            session: None,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn is_running(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| !session.task.is_finished())
    }

    /// Start polling `exchange`. Returns `false` (and does nothing) if a
    /// session is already running.
    pub fn start(&mut self, exchange: Arc<dyn CommandExchange>, callback: EventCallback) -> bool {
        if self.is_running() {
            warn!("RFID monitoring already running, ignoring start request");
            return false;
        }

        let (cancel, cancelled) = watch::channel(false);
        let task = tokio::spawn(monitoring_loop(
            exchange,
            callback,
            self.poll_interval,
            cancelled,
        ));
        self.session = Some(MonitoringSession { cancel, task });
        info!("RFID monitoring started (poll every {:?})", self.poll_interval);
        true
    }

    /// Cancel the session and wait for its task to finish.
    pub async fn stop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        let _ = session.cancel.send(true);
        if let Err(e) = session.task.await {
            error!("Monitoring task ended abnormally: {}", e);
        }
        info!("RFID monitoring stopped");
    }
}

impl Drop for EventMonitor {
    fn drop(&mut self) {
        // Can't join here; the loop exits at its next iteration boundary.
        if let Some(session) = self.session.take() {
            let _ = session.cancel.send(true);
        }
    }
}

impl std::fmt::Debug for EventMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventMonitor")
            .field("poll_interval", &self.poll_interval)
            .field("running", &self.is_running())
            .finish()
    }
}

async fn monitoring_loop(
    exchange: Arc<dyn CommandExchange>,
    callback: EventCallback,
    poll_interval: Duration,
    mut cancelled: watch::Receiver<bool>,
) {
    let mut failure_streak: u32 = 0;

    while !*cancelled.borrow() {
        let response = exchange.send(Command::read_rfid()).await;

        if response.is_ok() {
            if failure_streak > 0 {
                info!("RFID polling recovered after {} failed polls", failure_streak);
            }
            failure_streak = 0;
            if let Some(tag) = response.rfid() {
                dispatch(&callback, tag);
            }
        } else {
            failure_streak += 1;
            let message = response.message().unwrap_or("unknown error");
            if failure_streak == 1 {
                warn!("RFID poll failed: {}", message);
            } else {
                debug!("RFID poll failed ({} in a row): {}", failure_streak, message);
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {}
            changed = cancelled.changed() => {
                if changed.is_err() {
                    // Owner went away without stopping us.
                    break;
                }
            }
        }
    }

    debug!("Monitoring loop exited");
}

/// Run the callback, containing both returned errors and panics.
fn dispatch(callback: &EventCallback, tag: &str) {
    debug!("RFID detected: {}", tag);
    match std::panic::catch_unwind(AssertUnwindSafe(|| callback(tag))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("RFID callback error for {}: {}", tag, e),
        Err(_) => error!("RFID callback panicked for {}", tag),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::protocol::Response;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays scripted responses, then answers "no tag" forever.
    #[derive(Default)]
    struct ScriptedExchange {
        replies: Mutex<VecDeque<Response>>,
        calls: AtomicUsize,
    }

    impl ScriptedExchange {
        fn with(replies: Vec<Response>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CommandExchange for ScriptedExchange {
        async fn send(&self, command: Command) -> Response {
            assert_eq!(command.name(), "read_rfid");
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| Response::decode(r#"{"status":"ok","data":{"rfid":null}}"#))
        }
    }

    fn tag(id: &str) -> Response {
        Response::decode(&format!(r#"{{"status":"ok","data":{{"rfid":"{id}"}}}}"#))
    }

    fn recorder() -> (EventCallback, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let cb = callback(move |tag| {
            sink.lock().push(tag.to_string());
            Ok(())
        });
        (cb, seen)
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatches_detected_tags_only() {
        let exchange = ScriptedExchange::with(vec![
            tag("AAA"),
            Response::error(ErrorKind::Timeout, "Timeout"),
            tag("BBB"),
        ]);
        let (cb, seen) = recorder();

        let mut monitor = EventMonitor::new(Duration::from_millis(100));
        assert!(monitor.start(exchange.clone(), cb));
        tokio::time::sleep(Duration::from_millis(550)).await;
        monitor.stop().await;

        assert_eq!(*seen.lock(), vec!["AAA".to_string(), "BBB".to_string()]);
        assert!(exchange.calls() >= 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_is_rejected() {
        let exchange = ScriptedExchange::with(vec![]);
        let (cb, _) = recorder();

        let mut monitor = EventMonitor::new(Duration::from_millis(100));
        assert!(monitor.start(exchange.clone(), cb.clone()));
        assert!(!monitor.start(exchange.clone(), cb.clone()));
        monitor.stop().await;

        assert!(!monitor.is_running());
        assert!(monitor.start(exchange, cb));
        monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_callback_does_not_end_loop() {
        let exchange = ScriptedExchange::with(vec![tag("1"), tag("2"), tag("3")]);
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let cb = callback(move |tag| {
            counter.fetch_add(1, Ordering::SeqCst);
            match tag {
                "1" => Err("printer jammed".into()),
                "2" => panic!("callback bug"),
                _ => Ok(()),
            }
        });

        let mut monitor = EventMonitor::new(Duration::from_millis(50));
        monitor.start(exchange, cb);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(monitor.is_running());
        monitor.stop().await;

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_polls_after_stop() {
        let exchange = ScriptedExchange::with(vec![]);
        let (cb, _) = recorder();

        let mut monitor = EventMonitor::new(Duration::from_millis(100));
        monitor.start(exchange.clone(), cb);
        tokio::time::sleep(Duration::from_millis(250)).await;
        monitor.stop().await;

        let after_stop = exchange.calls();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(exchange.calls(), after_stop);
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let mut monitor = EventMonitor::new(Duration::from_millis(100));
        monitor.stop().await;
        assert!(!monitor.is_running());
    }
}
