//! Executing prepared command lines.
//!
//! The runner decides *what* to run; a [`ProcessRunner`] decides *how*. The
//! production implementation hands the line to `bash -c`, streams stdout and
//! stderr back as they arrive and waits for the exit status. There is no
//! timeout at this layer.

use std::io::{self, Read, Write};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Sender};
use std::thread;

use thiserror::Error;

use crate::command::PreparedCommand;
use crate::process_guard::{ChildRegistry, CommandProcessGroup};

/// One piece of output, tagged with the stream it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputChunk {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
}

impl OutputChunk {
    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::Stdout(bytes) | Self::Stderr(bytes) => bytes,
        }
    }
}

/// Why a command did not complete successfully
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("failed to spawn: {0}")]
    Spawn(#[source] io::Error),

    #[error("failed while waiting for the process: {0}")]
    Wait(#[source] io::Error),

    #[error("exited with code {0}")]
    ExitCode(i32),

    #[error("terminated by signal")]
    Signaled,
}

/// Runs a command line, reporting output chunks in arrival order.
///
/// Returns `Ok` only when the process exits with status 0.
pub trait ProcessRunner {
    fn run(
        &mut self,
        label: &str,
        command: &PreparedCommand,
        on_output: &mut dyn FnMut(OutputChunk),
    ) -> Result<(), ExecError>;
}

/// Runs commands through `bash -c` in their own process group.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    /// Mirror child output to our stderr while capturing it
    echo: bool,
}

impl ShellRunner {
    pub fn new() -> Self {
        Self { echo: true }
    }

    pub fn quiet() -> Self {
        Self { echo: false }
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

const READ_BUFFER_SIZE: usize = 8192;

fn forward<R: Read>(mut reader: R, tx: Sender<OutputChunk>, wrap: fn(Vec<u8>) -> OutputChunk) {
    let mut buf = [0u8; READ_BUFFER_SIZE];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(wrap(buf[..n].to_vec())).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::warn!("Stopped reading child output: {}", e);
                break;
            }
        }
    }
}

impl ProcessRunner for ShellRunner {
    fn run(
        &mut self,
        label: &str,
        command: &PreparedCommand,
        on_output: &mut dyn FnMut(OutputChunk),
    ) -> Result<(), ExecError> {
        let mut child = Command::new("bash")
            .arg("-c")
            .arg(&command.line)
            .envs(command.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .in_new_process_group()
            .spawn()
            .map_err(ExecError::Spawn)?;
        let pid = child.id();
        ChildRegistry::register(pid, label);

        let (tx, rx) = mpsc::channel();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            let tx = tx.clone();
            readers.push(thread::spawn(move || forward(stdout, tx, OutputChunk::Stdout)));
        }
        if let Some(stderr) = child.stderr.take() {
            let tx = tx.clone();
            readers.push(thread::spawn(move || forward(stderr, tx, OutputChunk::Stderr)));
        }
        drop(tx);

        // Ends once both pipes are closed
        for chunk in rx {
            if self.echo {
                let mut err = io::stderr().lock();
                let _ = err.write_all(chunk.bytes());
                let _ = err.flush();
            }
            on_output(chunk);
        }
        for reader in readers {
            let _ = reader.join();
        }

        let status = child.wait();
        ChildRegistry::unregister(pid);
        let status = status.map_err(ExecError::Wait)?;

        if status.success() {
            Ok(())
        } else {
            match status.code() {
                Some(code) => Err(ExecError::ExitCode(code)),
                None => Err(ExecError::Signaled),
            }
        }
    }
}

/// Reports what would run without running anything.
#[derive(Debug, Clone, Default)]
pub struct DryRunner;

impl ProcessRunner for DryRunner {
    fn run(
        &mut self,
        label: &str,
        command: &PreparedCommand,
        on_output: &mut dyn FnMut(OutputChunk),
    ) -> Result<(), ExecError> {
        tracing::info!("[DRY RUN] {}: {}", label, command);
        on_output(OutputChunk::Stdout(
            format!("[DRY RUN] Skipped: {}\n", command).into_bytes(),
        ));
        Ok(())
    }
}
