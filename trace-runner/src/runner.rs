//! One trace invocation, end to end.
//!
//! validate -> locate (container targets) -> dispatch -> supervise ->
//! flame graph (flame graph output). Every stage error is returned unchanged.

use log::info;
use tokio::sync::mpsc;

use crate::dispatch::{dispatch, DispatchConfig};
use crate::domain::{
    LocateError, OutputMode, Pid, SupervisorError, TargetScope, TraceError, TraceRequest,
};
use crate::output::{Artifact, FlameGraphConfig, OutputPipeline, STREAM_FILE_NAME};
use crate::process_lookup::{locate, ProcFs, ProcessTable};
use crate::supervisor::{self, ExitOutcome, InterruptEvent, InterruptListener, StdoutTarget};

pub const USAGE_HINT: &str = "if your program has maps to print, send a SIGINT using Ctrl-C, \
                              if you want to interrupt the execution send SIGINT two times";

/// Everything a run needs besides the request
#[derive(Debug, Clone, Default)]
pub struct RunnerConfig {
    pub dispatch: DispatchConfig,
    pub flamegraph: FlameGraphConfig,
}

/// What a successful run produced
#[derive(Debug)]
pub struct RunSummary {
    pub resolved: Option<Pid>,
    pub outcome: ExitOutcome,
    /// Written flame graph, for flame graph output
    pub artifact: Option<Artifact>,
}

pub struct TraceRunner<T: ProcessTable = ProcFs> {
    config: RunnerConfig,
    table: T,
}

impl TraceRunner<ProcFs> {
    #[must_use]
    pub fn new(config: RunnerConfig) -> Self {
        Self::with_table(config, ProcFs::default())
    }
}

impl<T: ProcessTable> TraceRunner<T> {
    pub fn with_table(config: RunnerConfig, table: T) -> Self {
        Self { config, table }
    }

    /// Run `request` with SIGINT driving the interrupt protocol.
    ///
    /// # Errors
    /// Returns the first failing stage's error.
    pub async fn run(&self, request: &TraceRequest) -> Result<RunSummary, TraceError> {
        let (_listener, events) = InterruptListener::spawn().map_err(SupervisorError::from)?;
        self.run_with_interrupts(request, events).await
    }

    /// Run `request`, taking interrupts from `events`.
    ///
    /// # Errors
    /// Returns the first failing stage's error.
    pub async fn run_with_interrupts(
        &self,
        request: &TraceRequest,
        events: mpsc::Receiver<InterruptEvent>,
    ) -> Result<RunSummary, TraceError> {
        request.validate()?;

        let resolved = self.resolve(request)?;
        // Owns the rendered program until the run is over
        let command = dispatch(request, resolved, &self.config.dispatch)?;

        let stdout = match request.output {
            OutputMode::FlameGraph => StdoutTarget::Capture,
            OutputMode::Stream => request
                .destination
                .file_path(STREAM_FILE_NAME)
                .map_or(StdoutTarget::Inherit, StdoutTarget::File),
        };

        println!("{USAGE_HINT}");
        let mut outcome = supervisor::run_with_interrupts(&command, stdout, events).await?;

        let artifact = match (request.output, outcome.captured.take()) {
            (OutputMode::FlameGraph, Some(raw)) => {
                info!("Captured {} bytes of stack samples", raw.len());
                let pipeline = OutputPipeline::new(self.config.flamegraph.clone());
                Some(pipeline.finish(&raw, &request.destination).await?)
            }
            _ => None,
        };

        Ok(RunSummary { resolved, outcome, artifact })
    }

    fn resolve(&self, request: &TraceRequest) -> Result<Option<Pid>, LocateError> {
        if request.target != TargetScope::Container {
            return Ok(None);
        }
        locate(&self.table, &request.pod_uid, &request.container).map(Some)
    }
}
