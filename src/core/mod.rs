//! Child process plumbing.
//!
//! This module contains everything that runs off the console's owning thread:
//!
//! - **process**: Spawner collaborator trait and its `std::process` implementation
//! - **pump**: One blocking reader thread per output stream
//! - **decode**: UTF-8 carry-over and line ending normalization for pump reads
//! - **events**: Session events and the listener list they fan out through
//! - **session**: High-level session combining spawner, pumps, stdin writer and exit monitor
//!
//! # Architecture
//!
//! ```text
//! ProcessSession
//! ├── ChildProcess (try_wait / kill)
//! ├── stdin writer (one lock, every write goes through it)
//! ├── StreamPump stdout ─┐
//! ├── StreamPump stderr ─┼─> EventSink ─> listeners
//! └── exit monitor ──────┘   (joins pumps, then waits, then Exited)
//! ```

pub mod decode;
pub mod events;
pub mod process;
pub mod pump;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use events::SessionEvent;
pub use process::{ProcessSpawner, SpawnError, SpawnSpec, StdProcessSpawner};
pub use session::{LineEnding, ProcessSession, SessionError};
