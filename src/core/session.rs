//! Session management
//!
//! Owns one child process at a time: starts it, pumps its output, serializes writes to its
//! stdin and reports when it is gone.

use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::events::{EventSink, SessionEvent};
use super::process::{ChildProcess, ProcessSpawner, SpawnError, SpawnSpec, StdProcessSpawner};
use super::pump::{StreamKind, StreamPump};

/// How often the monitor polls for exit once both streams are closed
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("{0} is still running")]
    AlreadyRunning(String),

    #[error(transparent)]
    Spawn(#[from] SpawnError),

    #[error("Failed to start {0} thread: {1}")]
    Thread(&'static str, #[source] std::io::Error),
}

/// Line terminator written after every input line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    Lf,
    CrLf,
}

impl LineEnding {
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }
}

impl Default for LineEnding {
    fn default() -> Self {
        if cfg!(windows) {
            LineEnding::CrLf
        } else {
            LineEnding::Lf
        }
    }
}

impl fmt::Display for LineEnding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;
type SharedChild = Arc<Mutex<Box<dyn ChildProcess>>>;

/// The currently (or most recently) running child
struct LiveProcess {
    name: String,
    run: u64,
    pid: Option<u32>,
    stdin: SharedWriter,
    child: SharedChild,
    monitor: Option<JoinHandle<()>>,
}

/// A child process session
pub struct ProcessSession {
    spawner: Arc<dyn ProcessSpawner>,
    events: EventSink,
    line_ending: LineEnding,
    /// Running flag
    running: Arc<AtomicBool>,
    /// Id of the last run that started, 0 before the first
    run: u64,
    live: Option<LiveProcess>,
}

impl Default for ProcessSession {
    fn default() -> Self {
        Self::new(Arc::new(StdProcessSpawner))
    }
}

impl ProcessSession {
    pub fn new(spawner: Arc<dyn ProcessSpawner>) -> Self {
        Self {
            spawner,
            events: EventSink::new(),
            line_ending: LineEnding::default(),
            running: Arc::new(AtomicBool::new(false)),
            run: 0,
            live: None,
        }
    }

    pub fn with_line_ending(mut self, line_ending: LineEnding) -> Self {
        self.line_ending = line_ending;
        self
    }

    pub fn set_line_ending(&mut self, line_ending: LineEnding) {
        self.line_ending = line_ending;
    }

    /// Register a listener for every session event
    pub fn subscribe<F>(&self, listener: F)
    where
        F: FnMut(&SessionEvent) + Send + 'static,
    {
        self.events.subscribe(listener);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Name of the current or last process
    pub fn process_name(&self) -> Option<&str> {
        self.live.as_ref().map(|l| l.name.as_str())
    }

    /// Id of the current or last run. `Exited` events carry the id of the run they end.
    pub fn current_run(&self) -> u64 {
        self.run
    }

    /// Launch a child and return its run id. Rejected while another one is still running.
    pub fn start(&mut self, spec: &SpawnSpec) -> Result<u64, SessionError> {
        if self.is_running() {
            let name = self.process_name().unwrap_or_default().to_string();
            warn!("refusing to start {}: {} is still running", spec.program, name);
            return Err(SessionError::AlreadyRunning(name));
        }

        // The previous monitor has already emitted Exited; reap its thread
        if let Some(mut previous) = self.live.take() {
            if let Some(monitor) = previous.monitor.take() {
                let _ = monitor.join();
            }
        }

        let spawned = self.spawner.spawn(spec)?;
        self.run += 1;
        let run = self.run;
        let pid = spawned.child.id();
        info!("started {} {} (run {}, pid {:?})", spec.program, spec.display_args(), run, pid);

        let child: SharedChild = Arc::new(Mutex::new(spawned.child));
        let stdin: SharedWriter = Arc::new(Mutex::new(spawned.stdin));
        self.running.store(true, Ordering::SeqCst);

        let pumps = [
            StreamPump::new(StreamKind::Stdout, spawned.stdout),
            StreamPump::new(StreamKind::Stderr, spawned.stderr),
        ];
        let mut handles = Vec::with_capacity(pumps.len());
        for pump in pumps {
            match pump.spawn(self.events.clone()) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    self.abort_start(&child, handles);
                    return Err(SessionError::Thread("pump", e));
                }
            }
        }

        let monitor = {
            let child = child.clone();
            let running = self.running.clone();
            let events = self.events.clone();
            let name = spec.program.clone();
            thread::Builder::new()
                .name("process-monitor".to_string())
                .spawn(move || monitor_exit(&name, run, handles, &child, &running, &events))
        };
        let monitor = match monitor {
            Ok(handle) => handle,
            Err(e) => {
                self.abort_start(&child, Vec::new());
                return Err(SessionError::Thread("monitor", e));
            }
        };

        self.live = Some(LiveProcess {
            name: spec.program.clone(),
            run,
            pid,
            stdin,
            child,
            monitor: Some(monitor),
        });
        Ok(run)
    }

    fn abort_start(&self, child: &SharedChild, pumps: Vec<JoinHandle<()>>) {
        if let Err(e) = lock(child).kill() {
            warn!("failed to kill half-started child: {}", e);
        }
        for pump in pumps {
            let _ = pump.join();
        }
        self.running.store(false, Ordering::SeqCst);
    }

    /// Send one line to the child, terminated with the configured line ending.
    ///
    /// Returns false when nothing is running or the write failed; neither is an error
    /// because both legitimately race with the child exiting.
    pub fn write_input(&self, text: &str) -> bool {
        let line = strip_line_ending(text);
        let mut payload = Vec::with_capacity(line.len() + 2);
        payload.extend_from_slice(line.as_bytes());
        payload.extend_from_slice(self.line_ending.as_str().as_bytes());

        if !self.write_bytes(&payload) {
            return false;
        }
        self.events.emit(SessionEvent::InputEchoed(line.to_string()));
        true
    }

    /// Send raw bytes (control characters, escape sequences) with no terminator
    pub fn write_raw(&self, data: &[u8]) -> bool {
        debug_assert!(!data.is_empty(), "raw write with no bytes");
        self.write_bytes(data)
    }

    fn write_bytes(&self, data: &[u8]) -> bool {
        let live = match &self.live {
            Some(live) if self.is_running() => live,
            _ => {
                debug!("dropping {} bytes of input: no process running", data.len());
                return false;
            }
        };

        let mut writer = lock(&live.stdin);
        match writer.write_all(data).and_then(|_| writer.flush()) {
            Ok(()) => true,
            Err(e) => {
                warn!("write to {} failed: {}", live.name, e);
                false
            }
        }
    }

    /// Ask the child to terminate. Never blocks; `Exited` follows.
    ///
    /// With nothing running a synthetic `Exited` (no code, id of the last run) is emitted
    /// right away so that anyone waiting for shutdown is always released.
    pub fn stop(&self) {
        match &self.live {
            Some(live) if self.is_running() => {
                info!("stopping {} (run {}, pid {:?})", live.name, live.run, live.pid);
                if let Err(e) = lock(&live.child).kill() {
                    warn!("failed to kill {} (pid {:?}): {}", live.name, live.pid, e);
                }
            }
            _ => {
                debug!("stop requested with no process running");
                self.events.emit(SessionEvent::Exited {
                    run: self.run,
                    code: None,
                });
            }
        }
    }
}

impl Drop for ProcessSession {
    fn drop(&mut self) {
        if let Some(mut live) = self.live.take() {
            if self.running.load(Ordering::SeqCst) {
                let _ = lock(&live.child).kill();
            }
            if let Some(monitor) = live.monitor.take() {
                let _ = monitor.join();
            }
        }
    }
}

/// Wait for both pumps to drain, then for the child, then report exit
fn monitor_exit(
    name: &str,
    run: u64,
    pumps: Vec<JoinHandle<()>>,
    child: &SharedChild,
    running: &AtomicBool,
    events: &EventSink,
) {
    for pump in pumps {
        if pump.join().is_err() {
            warn!("output pump for {} panicked", name);
        }
    }

    let code = loop {
        match lock(child).try_wait() {
            Ok(Some(code)) => break code,
            Ok(None) => thread::sleep(WAIT_POLL_INTERVAL),
            Err(e) => {
                warn!("waiting for {} failed: {}", name, e);
                break None;
            }
        }
    };

    info!("{} (run {}) exited with {:?}", name, run, code);
    running.store(false, Ordering::SeqCst);
    events.emit(SessionEvent::Exited { run, code });
}

fn strip_line_ending(text: &str) -> &str {
    text.strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .unwrap_or(text)
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
