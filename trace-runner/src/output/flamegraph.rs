//! Flame graph rendering through the FlameGraph toolkit.
//!
//! Raw stack samples go through two external programs: the collapse stage
//! (`stackcollapse-bpftrace`) folds stacks into one line per unique stack,
//! and the render stage (`flamegraph`) draws them as SVG. The collapse
//! stage's stdout is wired directly into the render stage's stdin.

use log::{debug, info};
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::domain::PipelineError;

pub const DEFAULT_STACKCOLLAPSE_BINARY: &str = "/bin/stackcollapse-bpftrace";
pub const DEFAULT_FLAMEGRAPH_BINARY: &str = "/bin/flamegraph";

const COLLAPSE_STAGE: &str = "stackcollapse";
const RENDER_STAGE: &str = "flamegraph";

#[derive(Debug, Clone)]
pub struct FlameGraphConfig {
    pub stackcollapse_binary: PathBuf,
    pub flamegraph_binary: PathBuf,
}

impl Default for FlameGraphConfig {
    fn default() -> Self {
        Self {
            stackcollapse_binary: PathBuf::from(DEFAULT_STACKCOLLAPSE_BINARY),
            flamegraph_binary: PathBuf::from(DEFAULT_FLAMEGRAPH_BINARY),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FlameGraph {
    config: FlameGraphConfig,
}

impl FlameGraph {
    #[must_use]
    pub fn new(config: FlameGraphConfig) -> Self {
        Self { config }
    }

    /// Collapse then render `raw` and return the rendered image.
    ///
    /// # Errors
    /// - [`PipelineError::Spawn`] when a stage binary cannot be started
    /// - [`PipelineError::StageFailed`] when a stage exits unsuccessfully
    pub async fn generate(&self, raw: &[u8]) -> Result<Vec<u8>, PipelineError> {
        let mut collapse = spawn_stage(
            COLLAPSE_STAGE,
            Command::new(&self.config.stackcollapse_binary).stdin(Stdio::piped()),
            &self.config.stackcollapse_binary,
        )?;

        let collapsed: Stdio = collapse
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("collapse stage stdout not captured"))?
            .try_into()?;
        let render = spawn_stage(
            RENDER_STAGE,
            Command::new(&self.config.flamegraph_binary).stdin(collapsed),
            &self.config.flamegraph_binary,
        )?;

        let mut stdin = collapse
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("collapse stage stdin not captured"))?;
        let raw = raw.to_vec();
        let feeder = tokio::spawn(async move {
            stdin.write_all(&raw).await?;
            stdin.shutdown().await
        });

        let (collapse_out, render_out) =
            tokio::join!(collapse.wait_with_output(), render.wait_with_output());

        let collapse_out = collapse_out?;
        let render_out = render_out?;
        // Collapse dying of SIGPIPE only means render stopped reading.
        if !render_out.status.success() && killed_by_broken_pipe(&collapse_out) {
            debug!("{COLLAPSE_STAGE} stage hit a closed pipe after {RENDER_STAGE} failed");
        } else {
            check_stage(COLLAPSE_STAGE, &collapse_out)?;
        }
        check_stage(RENDER_STAGE, &render_out)?;
        feeder.await.map_err(io::Error::other)??;

        info!("Rendered flame graph ({} bytes)", render_out.stdout.len());
        Ok(render_out.stdout)
    }
}

fn spawn_stage(
    stage: &'static str,
    command: &mut Command,
    binary: &std::path::Path,
) -> Result<tokio::process::Child, PipelineError> {
    debug!("Starting {stage} stage: {}", binary.display());
    command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| PipelineError::Spawn { stage, binary: binary.to_path_buf(), source })
}

fn killed_by_broken_pipe(output: &Output) -> bool {
    output.status.signal() == Some(libc::SIGPIPE)
}

fn check_stage(stage: &'static str, output: &Output) -> Result<(), PipelineError> {
    if output.status.success() {
        return Ok(());
    }
    Err(PipelineError::StageFailed {
        stage,
        status: output.status,
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}
