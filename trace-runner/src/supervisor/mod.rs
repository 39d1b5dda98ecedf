//! Tracer process supervision
//!
//! Runs one [`TracerCommand`] as a child process alongside an interrupt state
//! machine. The state machine task starts before the child is spawned and
//! shares a cancellation token with the foreground wait; cancelling it is the
//! only way the wait ends early, and it kills the child.
//!
//! Failures are returned as-is. A tracer run attaches probes and writes
//! output, so nothing here retries.

pub mod interrupt;

use log::{debug, info, warn};
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::dispatch::TracerCommand;
use crate::domain::SupervisorError;
use crate::output::artifact::staging_file;

pub use interrupt::{InterruptEvent, InterruptListener, InterruptState, InterruptStateMachine};

/// Where the child's standard output goes. Stdin and stderr are inherited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdoutTarget {
    Inherit,
    /// Buffer everything for post-processing
    Capture,
    /// Replace a file, once the child has started
    File(PathBuf),
}

/// Result of a successful run
#[derive(Debug)]
pub struct ExitOutcome {
    pub status: ExitStatus,
    pub final_state: InterruptState,
    /// Child stdout when [`StdoutTarget::Capture`] was requested
    pub captured: Option<Vec<u8>>,
}

/// Run `command` with SIGINT driving the interrupt protocol.
///
/// # Errors
/// See [`run_with_interrupts`]; also fails if SIGINT cannot be hooked.
pub async fn run(
    command: &TracerCommand,
    stdout: StdoutTarget,
) -> Result<ExitOutcome, SupervisorError> {
    let (_listener, events) = InterruptListener::spawn()?;
    run_with_interrupts(command, stdout, events).await
}

/// Run `command`, taking interrupts from `events`.
///
/// # Errors
/// - [`SupervisorError::Launch`] when the binary cannot be started
/// - [`SupervisorError::NonZeroExit`] when the child fails
/// - [`SupervisorError::Cancelled`] after the second interrupt
pub async fn run_with_interrupts(
    command: &TracerCommand,
    stdout: StdoutTarget,
    events: mpsc::Receiver<InterruptEvent>,
) -> Result<ExitOutcome, SupervisorError> {
    let terminate = CancellationToken::new();
    let done = CancellationToken::new();
    let machine = InterruptStateMachine::new(terminate.clone());
    let state_task = tokio::spawn(machine.run(events, done.clone()));

    let result = supervise_child(command, stdout, &terminate).await;

    done.cancel();
    let final_state = state_task.await.unwrap_or_else(|e| {
        warn!("Interrupt state task failed: {e}");
        InterruptState::Idle
    });

    let (status, captured) = result?;
    info!("{} exited with {status} (interrupt state {final_state:?})", command.name());
    if !status.success() {
        return Err(SupervisorError::NonZeroExit { program: command.name(), status });
    }
    Ok(ExitOutcome { status, final_state, captured })
}

async fn supervise_child(
    command: &TracerCommand,
    stdout: StdoutTarget,
    terminate: &CancellationToken,
) -> Result<(ExitStatus, Option<Vec<u8>>), SupervisorError> {
    // File output goes to a staged file that replaces the target only once
    // the child is running.
    let mut staged = None;
    let stdout = match stdout {
        StdoutTarget::Inherit => Stdio::inherit(),
        StdoutTarget::Capture => Stdio::piped(),
        StdoutTarget::File(path) => {
            let open_err = |source| SupervisorError::OpenOutput { path: path.clone(), source };
            let file = staging_file(&path).map_err(open_err)?;
            let fd = file.as_file().try_clone().map_err(open_err)?;
            staged = Some((file, path));
            fd.into()
        }
    };

    let mut child = Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::inherit())
        .stdout(stdout)
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| SupervisorError::Launch { program: command.to_string(), source })?;
    info!("Started {command} as child {:?}", child.id());

    if let Some((file, path)) = staged {
        file.persist(&path)
            .map_err(|e| SupervisorError::OpenOutput { path: path.clone(), source: e.error })?;
        debug!("Streaming {} output to {}", command.name(), path.display());
    }

    let reader = child.stdout.take().map(|mut out| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            out.read_to_end(&mut buf).await.map(|_| buf)
        })
    });

    let exited = tokio::select! {
        status = child.wait() => Some(status?),
        () = terminate.cancelled() => None,
    };

    let Some(status) = exited else {
        warn!("Second interrupt, killing {}", command.name());
        child.kill().await?;
        if let Some(handle) = reader {
            handle.abort();
        }
        return Err(SupervisorError::Cancelled { program: command.name() });
    };

    let captured = match reader {
        Some(handle) => Some(handle.await.map_err(io::Error::other)??),
        None => None,
    };
    Ok((status, captured))
}
