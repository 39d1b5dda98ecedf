//! bpftrace backend
//!
//! Container-scoped scripts refer to the target process through a
//! placeholder. The script is copied with every placeholder replaced by the
//! resolved pid; the original file is never modified.

use log::debug;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{TracerBackend, TracerCommand};
use crate::domain::{DispatchError, Pid, TargetScope, TraceRequest};

/// Token standing for the container's host pid in bpftrace programs
pub const CONTAINER_PID_PLACEHOLDER: &str = "$container_pid";

#[derive(Debug, Clone)]
pub struct Bpftrace {
    binary: PathBuf,
    render_dir: PathBuf,
}

impl Bpftrace {
    pub fn new(binary: &Path, render_dir: &Path) -> Self {
        Self { binary: binary.to_path_buf(), render_dir: render_dir.to_path_buf() }
    }

    #[must_use]
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Write the rendered program to a uniquely named file in `render_dir`.
    fn write_rendered(&self, source: &str, pid: Pid) -> Result<tempfile::TempPath, DispatchError> {
        let render_err = |err: std::io::Error| DispatchError::RenderProgram {
            dir: self.render_dir.clone(),
            source: err,
        };

        let mut file = tempfile::Builder::new()
            .prefix("program-container-")
            .suffix(".bt")
            .tempfile_in(&self.render_dir)
            .map_err(render_err)?;
        file.write_all(render_program(source, pid).as_bytes()).map_err(render_err)?;
        file.flush().map_err(render_err)?;

        let path = file.into_temp_path();
        debug!("Rendered program for {pid} at {}", path.display());
        Ok(path)
    }
}

impl TracerBackend for Bpftrace {
    fn build_command(
        &self,
        request: &TraceRequest,
        resolved: Option<Pid>,
    ) -> Result<TracerCommand, DispatchError> {
        if request.target != TargetScope::Container {
            return Ok(TracerCommand::new(&self.binary, vec![request.program.clone()]));
        }

        let pid = resolved.ok_or(DispatchError::ProcessNotResolved)?;
        let source = fs::read_to_string(&request.program).map_err(|source| {
            DispatchError::ReadProgram { path: PathBuf::from(&request.program), source }
        })?;

        let rendered = self.write_rendered(&source, pid)?;
        let args = vec![rendered.to_string_lossy().into_owned()];
        Ok(TracerCommand::new(&self.binary, args).with_artifact(rendered))
    }
}

/// Replace every placeholder occurrence with the decimal pid.
#[must_use]
pub fn render_program(source: &str, pid: Pid) -> String {
    source.replace(CONTAINER_PID_PLACEHOLDER, &pid.0.to_string())
}
