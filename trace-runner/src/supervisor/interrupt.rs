//! Two-stage interrupt protocol
//!
//! Tracers that aggregate into maps print them on the first SIGINT and keep
//! running. The child receives that SIGINT straight from the terminal's
//! process group; the supervisor only counts it. The second interrupt cancels
//! the child.
//!
//! Signals are turned into [`InterruptEvent`]s on a bounded channel so the
//! state machine can be driven without real signals.

use log::{debug, warn};
use std::io;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Interrupt events buffered between listener and state machine
pub const INTERRUPT_CHANNEL_CAPACITY: usize = 4;

pub const FLUSH_MESSAGE: &str =
    "first SIGINT received, now if your program had maps and did not free them it should print them out";

/// One external interrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptState {
    Idle,
    /// First interrupt seen, tracer is expected to flush its maps
    FlushRequested,
    /// Second interrupt seen, child cancellation requested
    Terminating,
}

/// Counts interrupts and cancels `terminate` on the second one.
#[derive(Debug)]
pub struct InterruptStateMachine {
    state: InterruptState,
    terminate: CancellationToken,
}

impl InterruptStateMachine {
    #[must_use]
    pub fn new(terminate: CancellationToken) -> Self {
        Self { state: InterruptState::Idle, terminate }
    }

    #[must_use]
    pub fn state(&self) -> InterruptState {
        self.state
    }

    /// Apply one interrupt and return the new state.
    pub fn on_interrupt(&mut self) -> InterruptState {
        self.state = match self.state {
            InterruptState::Idle => {
                println!("\n{FLUSH_MESSAGE}");
                InterruptState::FlushRequested
            }
            InterruptState::FlushRequested | InterruptState::Terminating => {
                self.terminate.cancel();
                InterruptState::Terminating
            }
        };
        debug!("Interrupt received, state now {:?}", self.state);
        self.state
    }

    /// Consume events in arrival order until `done` fires, then report the
    /// final state.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<InterruptEvent>,
        done: CancellationToken,
    ) -> InterruptState {
        loop {
            tokio::select! {
                biased;
                () = done.cancelled() => break,
                event = events.recv() => match event {
                    Some(InterruptEvent) => {
                        self.on_interrupt();
                    }
                    None => {
                        // No more interrupts can arrive; wait for the child.
                        done.cancelled().await;
                        break;
                    }
                },
            }
        }
        self.state
    }
}

/// SIGINT listener publishing into a bounded channel.
///
/// Aborts its task on drop.
#[derive(Debug)]
pub struct InterruptListener {
    handle: JoinHandle<()>,
}

impl InterruptListener {
    /// Register the SIGINT handler now and start forwarding.
    ///
    /// Registration happens before this returns, so an interrupt delivered
    /// right after the child is spawned is not lost.
    ///
    /// # Errors
    /// Returns an error if the signal handler cannot be installed.
    pub fn spawn() -> io::Result<(Self, mpsc::Receiver<InterruptEvent>)> {
        let mut stream = signal(SignalKind::interrupt())?;
        let (tx, rx) = mpsc::channel(INTERRUPT_CHANNEL_CAPACITY);

        let handle = tokio::spawn(async move {
            while stream.recv().await.is_some() {
                if tx.send(InterruptEvent).await.is_err() {
                    warn!("Interrupt received after supervision ended");
                    break;
                }
            }
        });

        Ok((Self { handle }, rx))
    }
}

impl Drop for InterruptListener {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
