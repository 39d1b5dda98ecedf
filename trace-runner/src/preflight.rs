//! Pre-flight checks for trace-runner
//!
//! Validates host requirements before a tracer is launched.
//! Provides clear, actionable error messages when requirements aren't met.

#![allow(unsafe_code)] // geteuid() requires unsafe

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::dispatch::Tracer;
use crate::domain::{OutputMode, TargetScope, TraceRequest, TracerKind};
use crate::runner::RunnerConfig;

/// Run all pre-flight checks for `request`
pub fn run_preflight_checks(
    request: &TraceRequest,
    config: &RunnerConfig,
    proc_root: &Path,
) -> Result<()> {
    check_privileges()?;

    let tracer = Tracer::new(request.tracer, &config.dispatch);
    check_binary_exists(&tracer.executable(request), request.tracer.as_str())?;
    if request.tracer == TracerKind::Bpftrace {
        check_program_exists(&request.program)?;
    }

    if request.target == TargetScope::Container {
        check_proc_access(proc_root)?;
    }

    if request.output == OutputMode::FlameGraph {
        check_binary_exists(&config.flamegraph.stackcollapse_binary, "stackcollapse")?;
        check_binary_exists(&config.flamegraph.flamegraph_binary, "flamegraph")?;
    }
    Ok(())
}

/// Check if running with sufficient privileges to load probes
fn check_privileges() -> Result<()> {
    if unsafe { libc::geteuid() } == 0 {
        return Ok(());
    }

    bail!(
        "Permission denied: trace-runner requires root privileges to attach probes.\n\n\
         Run the trace job as a privileged container."
    );
}

/// Check if a required binary exists and is a file
fn check_binary_exists(path: &Path, what: &str) -> Result<()> {
    if !path.exists() {
        bail!(
            "{what} binary not found: {}\n\n\
             Make sure the path is correct and the runner image ships it.",
            path.display()
        );
    }
    if !path.is_file() {
        bail!("{what} binary is not a file: {}", path.display());
    }
    Ok(())
}

/// Check if the bpftrace program can be read
fn check_program_exists(program: &str) -> Result<()> {
    let path = Path::new(program);
    if !path.is_file() {
        bail!(
            "Program not found: {program}\n\n\
             Mount the program into the runner or pass its path with --program."
        );
    }
    Ok(())
}

/// Check if the process table can be listed
fn check_proc_access(proc_root: &Path) -> Result<()> {
    std::fs::read_dir(proc_root).with_context(|| {
        format!(
            "Cannot read {}\n\n\
             Container targets need the host process table:\n\
             - run the trace job with hostPID: true\n\
             - make sure /proc is mounted",
            proc_root.display()
        )
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_not_found() {
        let result = check_binary_exists(Path::new("/nonexistent/path/to/bpftrace"), "bpftrace");
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("bpftrace binary not found"));
    }

    #[test]
    fn test_binary_is_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = check_binary_exists(dir.path(), "flamegraph").unwrap_err().to_string();
        assert!(err.contains("not a file"));
    }

    #[test]
    fn test_program_not_found() {
        let err = check_program_exists("/nonexistent/program.bt").unwrap_err().to_string();
        assert!(err.contains("Program not found"));
    }

    #[test]
    fn test_proc_access() {
        assert!(check_proc_access(Path::new("/proc")).is_ok());
        assert!(check_proc_access(Path::new("/nonexistent/proc")).is_err());
    }
}
