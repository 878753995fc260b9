//! Output stream pumps
//!
//! One pump per child output stream. Each runs a blocking read loop on its own thread and
//! turns decoded chunks into session events. A pump never decides that the process exited;
//! it just stops at end of stream.

use std::io::{self, ErrorKind, Read};
use std::thread::{self, JoinHandle};

use tracing::{debug, trace, warn};

use super::decode::StreamDecoder;
use super::events::{EventSink, SessionEvent};

const READ_BUFFER_SIZE: usize = 4096;

/// Which stream a pump drains
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    pub fn name(self) -> &'static str {
        match self {
            StreamKind::Stdout => "stdout",
            StreamKind::Stderr => "stderr",
        }
    }

    fn event(self, text: String) -> SessionEvent {
        match self {
            StreamKind::Stdout => SessionEvent::OutputReceived(text),
            StreamKind::Stderr => SessionEvent::ErrorReceived(text),
        }
    }
}

/// Drains one output stream into events
pub struct StreamPump {
    kind: StreamKind,
    reader: Box<dyn Read + Send>,
    decoder: StreamDecoder,
}

impl StreamPump {
    pub fn new(kind: StreamKind, reader: Box<dyn Read + Send>) -> Self {
        Self {
            kind,
            reader,
            decoder: StreamDecoder::new(),
        }
    }

    /// Start the read loop on a dedicated thread
    pub fn spawn(self, sink: EventSink) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("pump-{}", self.kind.name()))
            .spawn(move || self.run(&sink))
    }

    /// Blocking read loop. Returns at end of stream or on a read error.
    pub fn run(mut self, sink: &EventSink) {
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];

        loop {
            match self.reader.read(&mut buffer) {
                Ok(0) => {
                    debug!("{} reached end of stream", self.kind.name());
                    break;
                }
                Ok(n) => {
                    let text = self.decoder.decode(&buffer[..n]);
                    trace!("{} read {} bytes", self.kind.name(), n);
                    if !text.is_empty() {
                        sink.emit(self.kind.event(text));
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("{} read failed: {}", self.kind.name(), e);
                    break;
                }
            }
        }

        let rest = self.decoder.finish();
        if !rest.is_empty() {
            sink.emit(self.kind.event(rest));
        }
    }
}
