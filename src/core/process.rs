//! Process spawning collaborator
//!
//! The session never touches `std::process` directly. It asks a [`ProcessSpawner`] for a
//! child with three piped standard streams and a handle it can poll and kill.

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpawnError {
    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Child process has no {0} pipe")]
    MissingPipe(&'static str),

    #[error("Empty command")]
    EmptyCommand,
}

/// What to run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpawnSpec {
    /// Executable path or name resolved through PATH
    pub program: String,
    /// Argument list
    pub args: Vec<String>,
    /// Working directory (inherits ours when None)
    pub cwd: Option<PathBuf>,
    /// Environment overrides
    pub env: Vec<(String, String)>,
}

impl SpawnSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append arguments given as a single command-line string
    pub fn arg_string(mut self, arguments: &str) -> Self {
        self.args.extend(split_arguments(arguments));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Parse a full command line: first word is the program
    pub fn parse(command_line: &str) -> Result<Self, SpawnError> {
        let mut words = split_arguments(command_line).into_iter();
        let program = words.next().ok_or(SpawnError::EmptyCommand)?;
        Ok(Self::new(program).args(words))
    }

    /// Arguments joined back into one string, for diagnostics
    pub fn display_args(&self) -> String {
        self.args
            .iter()
            .map(|a| {
                if a.is_empty() || a.contains(char::is_whitespace) {
                    format!("\"{}\"", a)
                } else {
                    a.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Split a command-line string on whitespace, honoring double quotes
pub fn split_arguments(input: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for ch in input.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    args.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }

    if has_token {
        args.push(current);
    }
    args
}

/// Handle on a launched child
pub trait ChildProcess: Send {
    /// Exit code if the child has exited (`Some(None)` when killed by a signal)
    fn try_wait(&mut self) -> io::Result<Option<Option<i32>>>;

    /// Request termination. Must succeed when the child already exited.
    fn kill(&mut self) -> io::Result<()>;

    /// OS process id, if there is one
    fn id(&self) -> Option<u32> {
        None
    }
}

/// A launched child with its standard streams split out
pub struct SpawnedProcess {
    pub stdin: Box<dyn Write + Send>,
    pub stdout: Box<dyn Read + Send>,
    pub stderr: Box<dyn Read + Send>,
    pub child: Box<dyn ChildProcess>,
}

/// Creates child processes
pub trait ProcessSpawner: Send + Sync {
    fn spawn(&self, spec: &SpawnSpec) -> Result<SpawnedProcess, SpawnError>;
}

/// Spawner backed by `std::process::Command`
#[derive(Debug, Default, Clone, Copy)]
pub struct StdProcessSpawner;

impl ProcessSpawner for StdProcessSpawner {
    fn spawn(&self, spec: &SpawnSpec) -> Result<SpawnedProcess, SpawnError> {
        if spec.program.is_empty() {
            return Err(SpawnError::EmptyCommand);
        }

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(ref dir) = spec.cwd {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| SpawnError::Launch {
            program: spec.program.clone(),
            source,
        })?;

        let stdin = child.stdin.take().ok_or(SpawnError::MissingPipe("stdin"));
        let stdout = child.stdout.take().ok_or(SpawnError::MissingPipe("stdout"));
        let stderr = child.stderr.take().ok_or(SpawnError::MissingPipe("stderr"));
        let (stdin, stdout, stderr) = match (stdin, stdout, stderr) {
            (Ok(i), Ok(o), Ok(e)) => (i, o, e),
            (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
                // Don't leave an orphan behind
                let _ = child.kill();
                let _ = child.wait();
                return Err(e);
            }
        };

        Ok(SpawnedProcess {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
            child: Box::new(StdChild(child)),
        })
    }
}

struct StdChild(Child);

impl ChildProcess for StdChild {
    fn try_wait(&mut self) -> io::Result<Option<Option<i32>>> {
        Ok(self.0.try_wait()?.map(|status| status.code()))
    }

    fn kill(&mut self) -> io::Result<()> {
        match self.0.kill() {
            // Already reaped
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            other => other,
        }
    }

    fn id(&self) -> Option<u32> {
        Some(self.0.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_arguments() {
        assert_eq!(split_arguments("-la /tmp"), vec!["-la", "/tmp"]);
        assert_eq!(
            split_arguments("  -c \"echo hi there\"  x"),
            vec!["-c", "echo hi there", "x"]
        );
        assert_eq!(split_arguments("\"\""), vec![""]);
        assert!(split_arguments("   ").is_empty());
    }

    #[test]
    fn test_parse_command_line() {
        let spec = SpawnSpec::parse("git log --oneline").unwrap();
        assert_eq!(spec.program, "git");
        assert_eq!(spec.args, vec!["log", "--oneline"]);

        assert!(matches!(SpawnSpec::parse(""), Err(SpawnError::EmptyCommand)));
    }

    #[test]
    fn test_display_args_quotes_whitespace() {
        let spec = SpawnSpec::new("sh").arg("-c").arg("echo hi");
        assert_eq!(spec.display_args(), "-c \"echo hi\"");
    }

    #[test]
    fn test_missing_executable() {
        let spec = SpawnSpec::new("/definitely/not/a/real/binary");
        let err = StdProcessSpawner.spawn(&spec).err().unwrap();
        assert!(matches!(err, SpawnError::Launch { .. }));
    }

    #[test]
    #[cfg(unix)]
    fn test_spawn_and_read() {
        let spec = SpawnSpec::new("/bin/sh").arg("-c").arg("printf hello");
        let mut spawned = StdProcessSpawner.spawn(&spec).unwrap();
        assert!(spawned.child.id().map_or(false, |pid| pid > 0));

        let mut out = String::new();
        spawned.stdout.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello");

        loop {
            if let Some(code) = spawned.child.try_wait().unwrap() {
                assert_eq!(code, Some(0));
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        // Killing an exited child is fine
        assert!(spawned.child.kill().is_ok());
    }
}
