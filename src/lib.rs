//! pipeconsole - an editable console bound to a child process.
//!
//! Output from the child's stdout and stderr is appended to a [`console::ConsoleBuffer`];
//! the text after the last output is a line editor whose Enter key sends the line to the
//! child's stdin. Keys that would touch output already printed are refused.
//!
//! ```no_run
//! use pipeconsole::config::ConsoleConfig;
//! use pipeconsole::console::Console;
//! use pipeconsole::core::SpawnSpec;
//! use std::time::Duration;
//!
//! let mut console = Console::new(&ConsoleConfig::default())?;
//! console.start_process(&SpawnSpec::new("python").arg("-i"))?;
//! console.write_input("print(6 * 7)", true);
//! console.wait_events(Duration::from_millis(500));
//! println!("{}", console.buffer().text());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod console;
pub mod core;
pub mod ui;
