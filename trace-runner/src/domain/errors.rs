//! Structured error types for trace-runner
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! Every stage has its own enum; [`TraceError`] carries them unchanged to the
//! top of the invocation.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use super::types::TracerKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("tracer \"{0}\" not implemented")]
    UnsupportedTracer(String),

    #[error("unknown target \"{0}\" (expected node, pod or container)")]
    UnsupportedTarget(String),

    #[error("unknown output \"{0}\" (expected stdout, file or directory)")]
    UnsupportedOutput(String),

    #[error("poduid and container must be specified when target=container")]
    MissingContainerIdentity,

    #[error("no program given for {0}")]
    MissingProgram(TracerKind),

    #[error("cannot parse program args {args:?}: {source}")]
    InvalidProgramArgs {
        args: String,
        #[source]
        source: shell_words::ParseError,
    },
}

#[derive(Error, Debug)]
pub enum LocateError {
    #[error("no process found for pod {pod_uid} and container {container}")]
    NotFound { pod_uid: String, container: String },

    #[error("Failed to read process table {path}: {source}")]
    ProcessTable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("container target requires a resolved process, refusing to fall back to node scope")]
    ProcessNotResolved,

    #[error("Failed to read program {path}: {source}")]
    ReadProgram {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write rendered program in {dir}: {source}")]
    RenderProgram {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with {status}")]
    NonZeroExit { program: String, status: ExitStatus },

    #[error("{program} terminated after second interrupt")]
    Cancelled { program: String },

    #[error("Failed to open output {path}: {source}")]
    OpenOutput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to start {stage} stage ({binary}): {source}")]
    Spawn {
        stage: &'static str,
        binary: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{stage} stage exited with {status}: {stderr}")]
    StageFailed { stage: &'static str, status: ExitStatus, stderr: String },

    #[error("Failed to write flame graph to {path}: {source}")]
    WriteArtifact {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Any failure of a single trace invocation
#[derive(Error, Debug)]
pub enum TraceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Locate(#[from] LocateError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = LocateError::NotFound {
            pod_uid: "abc123".to_string(),
            container: "web".to_string(),
        };
        assert_eq!(err.to_string(), "no process found for pod abc123 and container web");
    }

    #[test]
    fn test_trace_error_is_transparent() {
        let err: TraceError = ValidationError::UnsupportedTracer("systemtap".to_string()).into();
        assert_eq!(err.to_string(), "tracer \"systemtap\" not implemented");
    }
}
