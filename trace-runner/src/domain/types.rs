//! Domain types providing compile-time safety and self-documentation
//!
//! The request handed to the runner is built once from the command line and
//! never mutated afterwards. Tracer, target and output selections are closed
//! enums so an unknown value can only enter through [`FromStr`], where it is
//! rejected with a [`ValidationError`] naming it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::errors::ValidationError;

/// Process ID
///
/// Identifies a process in the host process table. A resolved target pid is
/// foreign state: the runner reads it but never signals or reaps it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID:{}", self.0)
    }
}

/// Supported tracing backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracerKind {
    /// Scripted probes, program is a `.bt` source file
    Bpftrace,
    /// Compiled bcc tool, program is the tool's executable name
    Bcc,
}

impl TracerKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bpftrace => "bpftrace",
            Self::Bcc => "bcc",
        }
    }
}

impl fmt::Display for TracerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TracerKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bpftrace" => Ok(Self::Bpftrace),
            "bcc" => Ok(Self::Bcc),
            other => Err(ValidationError::UnsupportedTracer(other.to_string())),
        }
    }
}

/// Where the tracer runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetScope {
    Node,
    /// Inside the pod's namespaces; no process resolution needed
    Pod,
    /// Attached to one container process, resolved from the process table
    Container,
}

impl fmt::Display for TargetScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Node => "node",
            Self::Pod => "pod",
            Self::Container => "container",
        })
    }
}

impl FromStr for TargetScope {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "node" => Ok(Self::Node),
            "pod" => Ok(Self::Pod),
            "container" => Ok(Self::Container),
            other => Err(ValidationError::UnsupportedTarget(other.to_string())),
        }
    }
}

/// How tracer output reaches the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Raw tracer stdout copied straight to the destination
    Stream,
    /// Stack samples buffered and rendered into a flame graph
    FlameGraph,
}

/// Sink for tracer output or the rendered artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputDestination {
    Stdout,
    File(PathBuf),
    /// Directory receiving a file with a mode-specific default name
    Directory(PathBuf),
}

impl OutputDestination {
    /// Parse an `--output` selector together with its `--output-path`.
    ///
    /// # Errors
    /// Returns [`ValidationError::UnsupportedOutput`] for unknown selectors.
    pub fn from_selector(selector: &str, path: &Path) -> Result<Self, ValidationError> {
        match selector {
            "stdout" => Ok(Self::Stdout),
            "file" => Ok(Self::File(path.to_path_buf())),
            "directory" => Ok(Self::Directory(path.to_path_buf())),
            other => Err(ValidationError::UnsupportedOutput(other.to_string())),
        }
    }

    /// Concrete file path for this destination, `None` for stdout.
    #[must_use]
    pub fn file_path(&self, default_name: &str) -> Option<PathBuf> {
        match self {
            Self::Stdout => None,
            Self::File(path) => Some(path.clone()),
            Self::Directory(dir) => Some(dir.join(default_name)),
        }
    }
}

impl fmt::Display for OutputDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::File(path) => write!(f, "file {}", path.display()),
            Self::Directory(dir) => write!(f, "directory {}", dir.display()),
        }
    }
}

/// One fully-specified trace invocation
#[derive(Debug, Clone)]
pub struct TraceRequest {
    pub tracer: TracerKind,
    pub target: TargetScope,
    /// Required together with `container` when `target` is container
    pub pod_uid: String,
    pub container: String,
    /// bpftrace source path, or bcc tool name/path
    pub program: String,
    /// Passed verbatim to bcc tools, ignored for bpftrace
    pub program_args: Vec<String>,
    pub output: OutputMode,
    pub destination: OutputDestination,
}

impl TraceRequest {
    /// Check field combinations before anything touches the host.
    ///
    /// # Errors
    /// - Container scope without both pod uid and container name
    /// - Empty program
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.target == TargetScope::Container
            && (self.pod_uid.is_empty() || self.container.is_empty())
        {
            return Err(ValidationError::MissingContainerIdentity);
        }
        if self.program.is_empty() {
            return Err(ValidationError::MissingProgram(self.tracer));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(target: TargetScope, pod_uid: &str, container: &str) -> TraceRequest {
        TraceRequest {
            tracer: TracerKind::Bpftrace,
            target,
            pod_uid: pod_uid.to_string(),
            container: container.to_string(),
            program: "program.bt".to_string(),
            program_args: Vec::new(),
            output: OutputMode::Stream,
            destination: OutputDestination::Stdout,
        }
    }

    #[test]
    fn test_tracer_kind_parse() {
        assert_eq!("bpftrace".parse::<TracerKind>().unwrap(), TracerKind::Bpftrace);
        assert_eq!("bcc".parse::<TracerKind>().unwrap(), TracerKind::Bcc);

        let err = "dtrace".parse::<TracerKind>().unwrap_err();
        assert!(err.to_string().contains("dtrace"));
        assert!(err.to_string().contains("not implemented"));
    }

    #[test]
    fn test_target_and_output_parse() {
        assert_eq!("pod".parse::<TargetScope>().unwrap(), TargetScope::Pod);
        assert!("cluster".parse::<TargetScope>().is_err());

        let dest = OutputDestination::from_selector("directory", Path::new("/out")).unwrap();
        assert_eq!(dest.file_path("flamegraph.svg"), Some(PathBuf::from("/out/flamegraph.svg")));
        assert_eq!(OutputDestination::Stdout.file_path("trace.txt"), None);
        assert!(OutputDestination::from_selector("s3", Path::new("/out")).is_err());
    }

    #[test]
    fn test_container_scope_requires_identity() {
        assert!(matches!(
            request(TargetScope::Container, "", "web").validate(),
            Err(ValidationError::MissingContainerIdentity)
        ));
        assert!(matches!(
            request(TargetScope::Container, "abc123", "").validate(),
            Err(ValidationError::MissingContainerIdentity)
        ));
        assert!(request(TargetScope::Container, "abc123", "web").validate().is_ok());
        assert!(request(TargetScope::Node, "", "").validate().is_ok());
    }

    #[test]
    fn test_pid_display() {
        assert_eq!(Pid(4821).to_string(), "PID:4821");
    }
}
