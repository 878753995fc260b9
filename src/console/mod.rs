//! The embeddable console.
//!
//! [`Console`] ties a [`ConsoleBuffer`], an [`InputRouter`] and a [`ProcessSession`]
//! together. It lives on one thread (the one that owns the rendering surface). Pumps and
//! the exit monitor run elsewhere and only ever talk to it through a channel, which the
//! owner drains with [`Console::process_events`] or [`Console::wait_events`].
//!
//! ```text
//! keys ──> InputRouter ──> ConsoleBuffer (edit)
//!                     └──> ProcessSession ──> child stdin
//! child stdout/stderr ──> pumps ──> channel ──> process_events ──> ConsoleBuffer (append)
//! ```

pub mod buffer;

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace};

use crate::config::{ConfigError, ConsoleConfig};
use crate::core::{ProcessSession, ProcessSpawner, SessionError, SessionEvent, SpawnSpec, StdProcessSpawner};
use crate::ui::keymapper::KeyInput;
use crate::ui::router::{InputRouter, Route, RouteContext};

pub use buffer::{ColorTag, ConsoleBuffer, EditOp, Span};

/// What `handle_key` did with a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Sent to the child as a keyboard command
    Forwarded,
    /// Swallowed
    Suppressed,
    /// Pending line sent to the child
    Submitted(String),
    /// Buffer edited or caret moved (false if nothing changed)
    Edited(bool),
    /// Not handled; the host may act on it
    Passed,
}

type TextListener = Box<dyn FnMut(&str)>;

/// A console bound to at most one child process at a time
pub struct Console {
    show_diagnostics: bool,
    input_enabled: bool,
    buffer: ConsoleBuffer,
    router: InputRouter,
    session: ProcessSession,
    events: Receiver<SessionEvent>,
    read_only: bool,
    /// Run whose exit makes the console read-only again
    current_run: Option<u64>,
    /// Runs whose `Exited` has not been applied yet, with their program names
    pending_exits: Vec<(u64, String)>,
    output_listeners: Vec<TextListener>,
    input_listeners: Vec<TextListener>,
}

impl Console {
    pub fn new(config: &ConsoleConfig) -> Result<Self, ConfigError> {
        Self::with_spawner(config, Arc::new(StdProcessSpawner))
    }

    pub fn with_spawner(config: &ConsoleConfig, spawner: Arc<dyn ProcessSpawner>) -> Result<Self, ConfigError> {
        let router = InputRouter::new(config.keymap()?, config.forward_keyboard_commands);
        let session = ProcessSession::new(spawner).with_line_ending(config.line_ending);

        let (tx, rx) = mpsc::channel();
        session.subscribe(move |event| {
            if tx.send(event.clone()).is_err() {
                trace!("console is gone, dropping {:?}", event);
            }
        });

        Ok(Self {
            show_diagnostics: config.show_diagnostics,
            input_enabled: config.input_enabled,
            buffer: ConsoleBuffer::new(),
            router,
            session,
            events: rx,
            read_only: true,
            current_run: None,
            pending_exits: Vec::new(),
            output_listeners: Vec::new(),
            input_listeners: Vec::new(),
        })
    }

    pub fn buffer(&self) -> &ConsoleBuffer {
        &self.buffer
    }

    /// For the host to mirror caret and selection from its widget
    pub fn buffer_mut(&mut self) -> &mut ConsoleBuffer {
        &mut self.buffer
    }

    pub fn session(&self) -> &ProcessSession {
        &self.session
    }

    pub fn is_process_running(&self) -> bool {
        self.session.is_running()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn show_diagnostics(&self) -> bool {
        self.show_diagnostics
    }

    pub fn set_show_diagnostics(&mut self, enabled: bool) {
        self.show_diagnostics = enabled;
    }

    pub fn is_input_enabled(&self) -> bool {
        self.input_enabled
    }

    /// Takes effect immediately when a process is running
    pub fn set_input_enabled(&mut self, enabled: bool) {
        self.input_enabled = enabled;
        if self.is_process_running() {
            self.read_only = !enabled;
        }
    }

    pub fn set_forward_keyboard_commands(&mut self, enabled: bool) {
        self.router.set_forward_keyboard_commands(enabled);
    }

    /// Called with every chunk the child writes, stdout or stderr
    pub fn on_output<F: FnMut(&str) + 'static>(&mut self, listener: F) {
        self.output_listeners.push(Box::new(listener));
    }

    /// Called with every line accepted for the child's stdin
    pub fn on_input<F: FnMut(&str) + 'static>(&mut self, listener: F) {
        self.input_listeners.push(Box::new(listener));
    }

    /// Start a process. Rejected while one is still running.
    pub fn start_process(&mut self, spec: &SpawnSpec) -> Result<(), SessionError> {
        // Earlier runs' exits go in before this run's first line
        self.process_events();
        if self.is_process_running() {
            let name = self.session.process_name().unwrap_or_default().to_string();
            return Err(SessionError::AlreadyRunning(name));
        }

        if self.show_diagnostics {
            let mut line = format!("Preparing to run {}", spec.program);
            if !spec.args.is_empty() {
                line.push_str(&format!(" with arguments {}", spec.display_args()));
            }
            line.push_str(".\n");
            self.buffer.push(&line, ColorTag::Diagnostic);
        }

        let run = self.session.start(spec)?;
        self.pending_exits.push((run, spec.program.clone()));
        self.current_run = Some(run);
        if self.input_enabled {
            self.read_only = false;
        }
        Ok(())
    }

    /// Ask the process to stop. `Exited` arrives through the event channel.
    pub fn stop_process(&self) {
        self.session.stop();
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Send a line to the process, optionally showing it in the buffer first
    pub fn write_input(&mut self, text: &str, echo: bool) -> bool {
        if echo {
            self.buffer.push(text, ColorTag::Input);
        }
        if !self.session.write_input(text) {
            return false;
        }
        let line = text
            .strip_suffix("\r\n")
            .or_else(|| text.strip_suffix('\n'))
            .unwrap_or(text);
        self.buffer.set_last_echoed(line);
        true
    }

    pub fn handle_key(&mut self, input: &KeyInput) -> KeyOutcome {
        let ctx = RouteContext {
            boundary: self.buffer.boundary(),
            caret: self.buffer.selection_start(),
            process_running: self.is_process_running(),
            editable: !self.read_only,
        };

        match self.router.route(input, &ctx) {
            Route::Forward(bytes) => {
                debug!("forwarding {:?} as {} bytes", input.key, bytes.len());
                self.session.write_raw(&bytes);
                KeyOutcome::Forwarded
            }
            Route::Suppress => KeyOutcome::Suppressed,
            Route::Submit => KeyOutcome::Submitted(self.submit_line()),
            Route::Edit(op) => KeyOutcome::Edited(self.buffer.edit(op)),
            Route::Pass => KeyOutcome::Passed,
        }
    }

    /// Send `[boundary, caret)`, end the line in the buffer and freeze it
    fn submit_line(&mut self) -> String {
        let line = self.buffer.pending_input().to_string();
        self.buffer.edit(EditOp::MoveEnd);
        self.buffer.edit(EditOp::Insert("\n".to_string()));
        self.buffer.commit_input();

        // Already on screen from typing, so no echo
        self.write_input(&line, false);
        line
    }

    /// Apply every queued session event without blocking. Returns how many were handled.
    pub fn process_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            self.apply(event);
            handled += 1;
        }
        handled
    }

    /// Block up to `timeout` for the next event, then drain the rest
    pub fn wait_events(&mut self, timeout: Duration) -> usize {
        match self.events.recv_timeout(timeout) {
            Ok(event) => {
                self.apply(event);
                1 + self.process_events()
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => 0,
        }
    }

    fn apply(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::OutputReceived(text) => self.receive_output(&text, ColorTag::Output),
            SessionEvent::ErrorReceived(text) => self.receive_output(&text, ColorTag::Error),
            SessionEvent::InputEchoed(text) => {
                for listener in &mut self.input_listeners {
                    listener(&text);
                }
            }
            SessionEvent::Exited { run, code } => {
                if let Some(pos) = self.pending_exits.iter().position(|(r, _)| *r == run) {
                    let (_, name) = self.pending_exits.remove(pos);
                    info!("{} exited ({:?})", name, code);
                    if self.show_diagnostics {
                        self.buffer.push(&format!("\n{} exited.", name), ColorTag::Diagnostic);
                    }
                }
                // A late exit of an earlier run must not lock the current one
                if self.current_run == Some(run) {
                    self.current_run = None;
                    self.read_only = true;
                }
            }
        }
    }

    fn receive_output(&mut self, text: &str, tag: ColorTag) {
        if !self.buffer.append(text, tag) {
            trace!("suppressed echo of {:?}", text);
        }
        for listener in &mut self.output_listeners {
            listener(text);
        }
    }
}
