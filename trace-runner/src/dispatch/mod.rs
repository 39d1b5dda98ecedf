//! Tracer dispatch
//!
//! Turns a validated [`TraceRequest`] into a concrete [`TracerCommand`]:
//! - [`bpftrace`]: runs a script, rewriting the container pid placeholder when
//!   the target is a container
//! - [`bcc`]: runs a bcc tool with pass-through arguments
//!
//! Binary locations come from [`DispatchConfig`], never from global state, so
//! several configurations can coexist in one process.

pub mod bcc;
pub mod bpftrace;

use log::info;
use std::fmt;
use std::path::{Path, PathBuf};
use tempfile::TempPath;

use crate::domain::{DispatchError, Pid, TargetScope, TraceError, TraceRequest, TracerKind};

pub use bcc::Bcc;
pub use bpftrace::{render_program, Bpftrace, CONTAINER_PID_PLACEHOLDER};

/// Default bpftrace binary inside the runner image
pub const DEFAULT_BPFTRACE_BINARY: &str = "/bin/bpftrace";
/// Default location of packaged bcc tools
pub const DEFAULT_BCC_TOOLS_DIR: &str = "/usr/share/bcc/tools";

/// Where tracer binaries live and where rendered programs go
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub bpftrace_binary: PathBuf,
    pub bcc_tools_dir: PathBuf,
    pub render_dir: PathBuf,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            bpftrace_binary: PathBuf::from(DEFAULT_BPFTRACE_BINARY),
            bcc_tools_dir: PathBuf::from(DEFAULT_BCC_TOOLS_DIR),
            render_dir: std::env::temp_dir(),
        }
    }
}

/// Executable, arguments and the temporary files the run depends on.
///
/// Owned by one invocation. Dropping it deletes the rendered program.
#[derive(Debug)]
pub struct TracerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    artifacts: Vec<TempPath>,
}

impl TracerCommand {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self { program: program.into(), args, artifacts: Vec::new() }
    }

    #[must_use]
    pub fn with_artifact(mut self, artifact: TempPath) -> Self {
        self.artifacts.push(artifact);
        self
    }

    /// Rendered files this command reads
    pub fn artifacts(&self) -> impl Iterator<Item = &Path> {
        self.artifacts.iter().map(|artifact| &**artifact)
    }

    /// Short program name for messages
    #[must_use]
    pub fn name(&self) -> String {
        self.program
            .file_name()
            .map_or_else(|| self.program.display().to_string(), |n| n.to_string_lossy().into_owned())
    }
}

impl fmt::Display for TracerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// A backend able to produce the command line for a request
pub trait TracerBackend {
    /// Build the command for `request`. `resolved` is the container process
    /// when the target is a container.
    ///
    /// # Errors
    /// Returns an error when the program cannot be read or rendered.
    fn build_command(
        &self,
        request: &TraceRequest,
        resolved: Option<Pid>,
    ) -> Result<TracerCommand, DispatchError>;
}

/// Every supported backend; matching is exhaustive so a new kind cannot
/// silently fall through to another backend.
#[derive(Debug, Clone)]
pub enum Tracer {
    Bpftrace(Bpftrace),
    Bcc(Bcc),
}

impl Tracer {
    #[must_use]
    pub fn new(kind: TracerKind, config: &DispatchConfig) -> Self {
        match kind {
            TracerKind::Bpftrace => {
                Self::Bpftrace(Bpftrace::new(&config.bpftrace_binary, &config.render_dir))
            }
            TracerKind::Bcc => Self::Bcc(Bcc::new(&config.bcc_tools_dir)),
        }
    }

    /// Executable that will be launched for `request`
    #[must_use]
    pub fn executable(&self, request: &TraceRequest) -> PathBuf {
        match self {
            Self::Bpftrace(backend) => backend.binary().to_path_buf(),
            Self::Bcc(backend) => backend.resolve_tool(&request.program),
        }
    }
}

impl TracerBackend for Tracer {
    fn build_command(
        &self,
        request: &TraceRequest,
        resolved: Option<Pid>,
    ) -> Result<TracerCommand, DispatchError> {
        match self {
            Self::Bpftrace(backend) => backend.build_command(request, resolved),
            Self::Bcc(backend) => backend.build_command(request, resolved),
        }
    }
}

/// Validate `request` and build its tracer command.
///
/// # Errors
/// - Validation errors, before any filesystem access
/// - [`DispatchError::ProcessNotResolved`] for a container target without pid
/// - Program read/render failures
pub fn dispatch(
    request: &TraceRequest,
    resolved: Option<Pid>,
    config: &DispatchConfig,
) -> Result<TracerCommand, TraceError> {
    request.validate()?;
    if request.target == TargetScope::Container && resolved.is_none() {
        return Err(DispatchError::ProcessNotResolved.into());
    }

    let command = Tracer::new(request.tracer, config).build_command(request, resolved)?;
    info!("Dispatched {}: {command}", request.tracer);
    Ok(command)
}
