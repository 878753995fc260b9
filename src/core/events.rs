//! Session events and their listener list

use std::sync::{Arc, Mutex};

use tracing::warn;

/// Session events
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Text decoded from the child's stdout
    OutputReceived(String),
    /// Text decoded from the child's stderr
    ErrorReceived(String),
    /// A line was accepted for the child's stdin
    InputEchoed(String),
    /// The child of run `run` is gone and both output streams are drained.
    /// `code` is None when it was killed or nothing was running.
    Exited { run: u64, code: Option<i32> },
}

type Listener = Box<dyn FnMut(&SessionEvent) + Send>;

/// Fan-out of session events to every subscriber.
///
/// Emission is serialized: producers on different threads never run listeners
/// concurrently. Listeners must not subscribe from inside a callback.
#[derive(Clone, Default)]
pub struct EventSink {
    listeners: Arc<Mutex<Vec<Listener>>>,
}

impl EventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F)
    where
        F: FnMut(&SessionEvent) + Send + 'static,
    {
        match self.listeners.lock() {
            Ok(mut listeners) => listeners.push(Box::new(listener)),
            Err(poisoned) => poisoned.into_inner().push(Box::new(listener)),
        }
    }

    pub fn emit(&self, event: SessionEvent) {
        let mut listeners = match self.listeners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("event listener panicked earlier, continuing");
                poisoned.into_inner()
            }
        };
        for listener in listeners.iter_mut() {
            listener(&event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().map(|l| l.len()).unwrap_or(0)
    }
}
