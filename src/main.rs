//! pipeconsole - run a line-oriented program inside an editable console
//!
//! The child's stdout and stderr stream into a scrolling buffer. Everything already
//! printed is read-only; the text after it is a line editor whose Enter sends the line
//! to the child's stdin.
//!
//! # Quick Start
//!
//! ```text
//! pipeconsole                    # Default shell
//! pipeconsole -d python -i       # Python REPL with start/exit diagnostics
//! pipeconsole -k sh              # Forward Ctrl+C and Tab to the child
//! ```
//!
//! # Keys
//!
//! | Key | Action |
//! |-----|--------|
//! | Enter | Send the pending line |
//! | PageUp/PageDown | Scroll |
//! | F5 | Restart the program after it exited |
//! | Ctrl+Q | Stop the program and quit |

use std::env;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use pipeconsole::config::{config_dir, ConsoleConfig};
use pipeconsole::console::{Console, KeyOutcome};
use pipeconsole::core::{LineEnding, SpawnSpec};
use pipeconsole::ui::{KeyInput, Renderer};

/// Command line options
#[derive(Debug, Default)]
struct Options {
    diagnostics: bool,
    forward_keys: bool,
    no_input: bool,
    line_ending: Option<LineEnding>,
    /// Program followed by its arguments
    command: Vec<String>,
}

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How long Ctrl+Q waits for the child to go away
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

fn print_version() {
    eprintln!("pipeconsole {}", VERSION);
}

fn print_help() {
    eprintln!("pipeconsole {} - Editable console for line-oriented programs", VERSION);
    eprintln!();
    eprintln!("Usage: pipeconsole [OPTIONS] [PROGRAM [ARGS...]]");
    eprintln!();
    eprintln!("Without PROGRAM the default shell is started.");
    eprintln!("Everything after PROGRAM is passed to it unchanged.");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -d, --diagnostics     Show start and exit lines in the console");
    eprintln!("  -k, --keys            Forward keyboard commands (Ctrl+C, Tab) to the program");
    eprintln!("      --no-input        Show output only, no typing");
    eprintln!("      --crlf            End input lines with CRLF");
    eprintln!("      --lf              End input lines with LF");
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Keys:");
    eprintln!("  Enter                 Send the pending line");
    eprintln!("  PageUp/PageDown       Scroll");
    eprintln!("  F5                    Restart the program after it exited");
    eprintln!("  Ctrl+Q                Stop the program and quit");
    eprintln!();
    eprintln!("Configuration: ~/.pipeconsole/config.toml");
    eprintln!("Log level: PIPECONSOLE_LOG (default: info)");
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut options = Options::default();
    let mut i = 0;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                print_version();
                std::process::exit(0);
            }
            "-d" | "--diagnostics" => options.diagnostics = true,
            "-k" | "--keys" => options.forward_keys = true,
            "--no-input" => options.no_input = true,
            "--crlf" => options.line_ending = Some(LineEnding::CrLf),
            "--lf" => options.line_ending = Some(LineEnding::Lf),
            "--" => {
                options.command = args[i + 1..].to_vec();
                break;
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown argument: {}. Use -h for help.", arg));
            }
            _ => {
                options.command = args[i..].to_vec();
                break;
            }
        }
        i += 1;
    }

    Ok(options)
}

fn default_shell() -> String {
    if cfg!(windows) {
        env::var("COMSPEC").unwrap_or_else(|_| "cmd.exe".to_string())
    } else {
        env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
    }
}

impl Options {
    fn spawn_spec(&self) -> SpawnSpec {
        match self.command.split_first() {
            Some((program, args)) => SpawnSpec::new(program.clone()).args(args.iter().cloned()),
            None => SpawnSpec::new(default_shell()),
        }
    }

    /// Command line flags override the config file
    fn apply(&self, config: &mut ConsoleConfig) {
        if self.diagnostics {
            config.show_diagnostics = true;
        }
        if self.forward_keys {
            config.forward_keyboard_commands = true;
        }
        if self.no_input {
            config.input_enabled = false;
        }
        if let Some(line_ending) = self.line_ending {
            config.line_ending = line_ending;
        }
    }
}

fn init_logging() {
    let log_path = config_dir()
        .map(|dir| dir.join("pipeconsole.log"))
        .unwrap_or_else(|| PathBuf::from("pipeconsole.log"));

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let filter = EnvFilter::try_from_env("PIPECONSOLE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .try_init();
    }
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let options = match parse_args(&args) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    init_logging();
    info!("pipeconsole {} starting...", VERSION);

    let mut config = ConsoleConfig::load();
    options.apply(&mut config);
    let spec = options.spawn_spec();

    let mut console = Console::new(&config).context("invalid key mappings")?;
    if let Err(e) = console.start_process(&spec) {
        error!("Failed to start {}: {}", spec.program, e);
        return Err(e).with_context(|| format!("could not start {}", spec.program));
    }

    let mut renderer = Renderer::new(config.colors.clone());
    renderer.init()?;
    let result = run_main_loop(&mut console, &mut renderer, &spec);
    let _ = renderer.cleanup();

    info!("pipeconsole exiting");
    result
}

fn status_line(console: &Console, spec: &SpawnSpec) -> String {
    if console.is_process_running() {
        format!(" {} | running | Ctrl+Q quit", spec.program)
    } else {
        format!(" {} | exited | F5 restart | Ctrl+Q quit", spec.program)
    }
}

fn run_main_loop(console: &mut Console, renderer: &mut Renderer, spec: &SpawnSpec) -> anyhow::Result<()> {
    let poll_timeout = Duration::from_millis(10);
    let mut dirty = true;

    loop {
        if console.process_events() > 0 {
            renderer.scroll_to_bottom();
            dirty = true;
        }

        if dirty {
            renderer.render(console.buffer(), &status_line(console, spec))?;
            dirty = false;
        }

        if !event::poll(poll_timeout)? {
            continue;
        }

        match event::read()? {
            Event::Key(key_event) => {
                if key_event.kind != KeyEventKind::Press {
                    continue;
                }
                dirty = true;

                match key_event.code {
                    KeyCode::Char('q') if key_event.modifiers.contains(KeyModifiers::CONTROL) => {
                        shutdown(console);
                        return Ok(());
                    }
                    KeyCode::PageUp => {
                        renderer.scroll_up(10);
                        continue;
                    }
                    KeyCode::PageDown => {
                        renderer.scroll_down(10);
                        continue;
                    }
                    KeyCode::F(5) if !console.is_process_running() => {
                        if let Err(e) = console.start_process(spec) {
                            warn!("restart failed: {}", e);
                        }
                        continue;
                    }
                    _ => {}
                }

                let Some(input) = KeyInput::from_crossterm(&key_event) else {
                    continue;
                };
                match console.handle_key(&input) {
                    KeyOutcome::Submitted(_) | KeyOutcome::Edited(true) => renderer.scroll_to_bottom(),
                    _ => {}
                }
            }
            Event::Resize(_, _) => dirty = true,
            _ => {}
        }
    }
}

/// Stop the child and give it a moment to report its exit
fn shutdown(console: &mut Console) {
    if !console.is_process_running() {
        return;
    }
    console.stop_process();

    let deadline = Instant::now() + SHUTDOWN_TIMEOUT;
    while !console.is_read_only() || console.is_process_running() {
        if Instant::now() >= deadline {
            warn!("child did not exit within {:?}", SHUTDOWN_TIMEOUT);
            break;
        }
        console.wait_events(Duration::from_millis(50));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_flags_then_command() {
        let options = parse_args(&args(&["-d", "--crlf", "python", "-i", "-d"])).unwrap();
        assert!(options.diagnostics);
        assert_eq!(options.line_ending, Some(LineEnding::CrLf));
        assert_eq!(options.command, args(&["python", "-i", "-d"]));

        let spec = options.spawn_spec();
        assert_eq!(spec.program, "python");
        assert_eq!(spec.args, args(&["-i", "-d"]));
    }

    #[test]
    fn test_double_dash() {
        let options = parse_args(&args(&["-k", "--", "-weird"])).unwrap();
        assert!(options.forward_keys);
        assert_eq!(options.command, args(&["-weird"]));
    }

    #[test]
    fn test_unknown_flag() {
        assert!(parse_args(&args(&["--bogus"])).is_err());
    }

    #[test]
    fn test_default_program() {
        let options = parse_args(&[]).unwrap();
        assert!(!options.spawn_spec().program.is_empty());
    }

    #[test]
    fn test_flags_override_config() {
        let options = parse_args(&args(&["-d", "-k", "--no-input", "--lf"])).unwrap();
        let mut config = ConsoleConfig::default();
        options.apply(&mut config);
        assert!(config.show_diagnostics);
        assert!(config.forward_keyboard_commands);
        assert!(!config.input_enabled);
        assert_eq!(config.line_ending, LineEnding::Lf);
    }
}
