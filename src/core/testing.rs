//! In-memory process doubles for tests
//!
//! `FakeSpawner` runs a script closure on its own thread in place of a real child. The
//! script talks to the session through blocking in-memory pipes, so sessions, pumps and
//! the console run exactly as they do against a real process.

use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use super::process::{ChildProcess, ProcessSpawner, SpawnError, SpawnSpec, SpawnedProcess};

#[derive(Default)]
struct PipeState {
    chunks: VecDeque<Vec<u8>>,
    closed: bool,
}

/// Shared end of an in-memory pipe that can close it from anywhere
#[derive(Clone, Default)]
pub struct PipeHandle(Arc<(Mutex<PipeState>, Condvar)>);

impl PipeHandle {
    pub fn close(&self) {
        let (lock, cvar) = &*self.0;
        lock.lock().unwrap().closed = true;
        cvar.notify_all();
    }
}

pub struct PipeWriter(PipeHandle);

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let (lock, cvar) = &*(self.0).0;
        let mut state = lock.lock().unwrap();
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"));
        }
        state.chunks.push_back(buf.to_vec());
        cvar.notify_all();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Reader side. Each read returns at most one written chunk.
pub struct PipeReader(PipeHandle);

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let (lock, cvar) = &*(self.0).0;
        let mut state = lock.lock().unwrap();
        loop {
            if let Some(mut chunk) = state.chunks.pop_front() {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    chunk.drain(..n);
                    state.chunks.push_front(chunk);
                }
                return Ok(n);
            }
            if state.closed {
                return Ok(0);
            }
            state = cvar.wait(state).unwrap();
        }
    }
}

pub fn pipe() -> (PipeWriter, PipeReader, PipeHandle) {
    let handle = PipeHandle::default();
    (PipeWriter(handle.clone()), PipeReader(handle.clone()), handle)
}

/// The child's view of its standard streams
pub struct FakeIo {
    pub stdin: BufReader<PipeReader>,
    pub stdout: PipeWriter,
    pub stderr: PipeWriter,
}

impl FakeIo {
    /// Next stdin line without its terminator, None at EOF
    pub fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.stdin.read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
        }
    }
}

type Script = dyn Fn(FakeIo) -> i32 + Send + Sync;

/// Spawner whose children are closures
#[derive(Clone)]
pub struct FakeSpawner {
    script: Arc<Script>,
    spawned: Arc<Mutex<Vec<SpawnSpec>>>,
    fail: bool,
}

impl FakeSpawner {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(FakeIo) -> i32 + Send + Sync + 'static,
    {
        Self {
            script: Arc::new(script),
            spawned: Arc::new(Mutex::new(Vec::new())),
            fail: false,
        }
    }

    /// A spawner that never manages to launch anything
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(|_| 0)
        }
    }

    /// Child that echoes every stdin line back on stdout with CRLF
    pub fn echo() -> Self {
        Self::new(|mut io| {
            while let Some(line) = io.read_line() {
                if io.stdout.write_all(format!("{}\r\n", line).as_bytes()).is_err() {
                    break;
                }
            }
            0
        })
    }

    /// Child that stores raw stdin bytes into `sink` until EOF
    pub fn capture(sink: Arc<Mutex<Vec<u8>>>) -> Self {
        Self::new(move |mut io| {
            let mut buf = [0u8; 256];
            loop {
                match io.stdin.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => sink.lock().unwrap().extend_from_slice(&buf[..n]),
                }
            }
            0
        })
    }

    pub fn spawned(&self) -> Vec<SpawnSpec> {
        self.spawned.lock().unwrap().clone()
    }
}

impl ProcessSpawner for FakeSpawner {
    fn spawn(&self, spec: &SpawnSpec) -> Result<SpawnedProcess, SpawnError> {
        if self.fail {
            return Err(SpawnError::Launch {
                program: spec.program.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "no such program"),
            });
        }
        self.spawned.lock().unwrap().push(spec.clone());

        let (stdin_w, stdin_r, stdin_h) = pipe();
        let (stdout_w, stdout_r, stdout_h) = pipe();
        let (stderr_w, stderr_r, stderr_h) = pipe();
        let exit = Arc::new(Mutex::new(None));
        let killed = Arc::new(AtomicBool::new(false));

        let script = self.script.clone();
        let exit_slot = exit.clone();
        let was_killed = killed.clone();
        thread::spawn(move || {
            let io = FakeIo {
                stdin: BufReader::new(stdin_r),
                stdout: stdout_w,
                stderr: stderr_w,
            };
            let code = script(io);
            let code = if was_killed.load(Ordering::SeqCst) {
                None
            } else {
                Some(code)
            };
            *exit_slot.lock().unwrap() = Some(code);
        });

        Ok(SpawnedProcess {
            stdin: Box::new(stdin_w),
            stdout: Box::new(stdout_r),
            stderr: Box::new(stderr_r),
            child: Box::new(FakeChild {
                exit,
                killed,
                pipes: [stdin_h, stdout_h, stderr_h],
            }),
        })
    }
}

/// Killing closes every pipe; the script sees EOF or a broken pipe and returns, and only
/// then does the child count as exited.
struct FakeChild {
    exit: Arc<Mutex<Option<Option<i32>>>>,
    killed: Arc<AtomicBool>,
    pipes: [PipeHandle; 3],
}

impl ChildProcess for FakeChild {
    fn try_wait(&mut self) -> io::Result<Option<Option<i32>>> {
        Ok(*self.exit.lock().unwrap())
    }

    fn kill(&mut self) -> io::Result<()> {
        if self.exit.lock().unwrap().is_none() {
            self.killed.store(true, Ordering::SeqCst);
        }
        for pipe in &self.pipes {
            pipe.close();
        }
        Ok(())
    }
}
