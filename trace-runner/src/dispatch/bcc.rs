//! bcc backend
//!
//! bcc tools are standalone executables; the request's program names the
//! tool and its arguments are passed through untouched.

use std::path::{Path, PathBuf};

use super::{TracerBackend, TracerCommand};
use crate::domain::{DispatchError, Pid, TraceRequest};

#[derive(Debug, Clone)]
pub struct Bcc {
    tools_dir: PathBuf,
}

impl Bcc {
    pub fn new(tools_dir: &Path) -> Self {
        Self { tools_dir: tools_dir.to_path_buf() }
    }

    /// Bare tool names live in the tools directory; anything with a slash is
    /// used as given.
    pub(crate) fn resolve_tool(&self, program: &str) -> PathBuf {
        if program.contains('/') {
            PathBuf::from(program)
        } else {
            self.tools_dir.join(program)
        }
    }
}

impl TracerBackend for Bcc {
    fn build_command(
        &self,
        request: &TraceRequest,
        _resolved: Option<Pid>,
    ) -> Result<TracerCommand, DispatchError> {
        Ok(TracerCommand::new(self.resolve_tool(&request.program), request.program_args.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OutputDestination, OutputMode, TargetScope, TracerKind};

    fn request(program: &str, args: &[&str]) -> TraceRequest {
        TraceRequest {
            tracer: TracerKind::Bcc,
            target: TargetScope::Container,
            pod_uid: "abc123".to_string(),
            container: "web".to_string(),
            program: program.to_string(),
            program_args: args.iter().map(ToString::to_string).collect(),
            output: OutputMode::Stream,
            destination: OutputDestination::Stdout,
        }
    }

    #[test]
    fn test_tool_resolved_in_tools_dir() {
        let backend = Bcc::new(Path::new("/usr/share/bcc/tools"));
        let command = backend.build_command(&request("opensnoop", &["-p", "4821"]), None).unwrap();

        assert_eq!(command.program, PathBuf::from("/usr/share/bcc/tools/opensnoop"));
        assert_eq!(command.args, vec!["-p".to_string(), "4821".to_string()]);
    }

    #[test]
    fn test_args_not_rewritten() {
        let backend = Bcc::new(Path::new("/usr/share/bcc/tools"));
        let command = backend
            .build_command(&request("/opt/tools/trace", &["$container_pid", "'do_sys_open'"]), Some(Pid(7)))
            .unwrap();

        assert_eq!(command.program, PathBuf::from("/opt/tools/trace"));
        assert_eq!(command.args, vec!["$container_pid".to_string(), "'do_sys_open'".to_string()]);
        assert_eq!(command.artifacts().count(), 0);
    }
}
