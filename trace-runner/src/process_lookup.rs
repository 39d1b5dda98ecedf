//! Resolve the host PID of a container from its pod UID and container name.
//!
//! Container runtimes bind-mount per-pod, per-container paths (for example
//! `/var/lib/kubelet/pods/<uid>/containers/<name>/...`) into every process of
//! the container. Those paths show up as mount roots in
//! `/proc/<pid>/mountinfo`, so a process whose mount roots contain both the pod
//! UID and the container name belongs to that container.

use log::{debug, info};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::domain::{LocateError, Pid};

/// Default process table mount point
pub const PROC_ROOT: &str = "/proc";

/// Read access to a process table.
pub trait ProcessTable {
    /// Live pids in traversal order.
    ///
    /// # Errors
    /// Returns an error if the table itself cannot be listed.
    fn pids(&self) -> Result<Vec<Pid>, LocateError>;

    /// Mount roots of one process. Fails when the process vanished or is
    /// not readable.
    ///
    /// # Errors
    /// Returns the underlying I/O error.
    fn mount_roots(&self, pid: Pid) -> io::Result<Vec<String>>;
}

/// `procfs` backed process table
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
}

impl ProcFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new(PROC_ROOT)
    }
}

impl ProcessTable for ProcFs {
    fn pids(&self) -> Result<Vec<Pid>, LocateError> {
        let entries = fs::read_dir(&self.root)
            .map_err(|source| LocateError::ProcessTable { path: self.root.clone(), source })?;

        let mut pids = Vec::new();
        for entry in entries {
            // An entry can vanish between readdir calls; that is not fatal.
            let Ok(entry) = entry else {
                continue;
            };
            let file_name = entry.file_name();
            let Ok(pid) = file_name.to_string_lossy().parse::<u32>() else {
                continue;
            };
            pids.push(Pid(pid));
        }
        Ok(pids)
    }

    fn mount_roots(&self, pid: Pid) -> io::Result<Vec<String>> {
        let path = self.root.join(pid.0.to_string()).join("mountinfo");
        let content = fs::read_to_string(path)?;
        Ok(parse_mount_roots(&content))
    }
}

/// Find the first process whose mount roots mention both identities.
///
/// The first match in traversal order wins. Traversal order is not creation
/// order, so callers must pass identities specific enough for a single
/// process to match. The result is a point-in-time answer and may go stale.
///
/// # Errors
/// - [`LocateError::ProcessTable`] when the table cannot be listed
/// - [`LocateError::NotFound`] when no process matches after a full scan
pub fn locate(
    table: &impl ProcessTable,
    pod_uid: &str,
    container: &str,
) -> Result<Pid, LocateError> {
    for pid in table.pids()? {
        let roots = match table.mount_roots(pid) {
            Ok(roots) => roots,
            Err(e) => {
                debug!("Skipping {pid}: {e}");
                continue;
            }
        };

        if roots.iter().any(|root| is_match(root, pod_uid, container)) {
            info!("Resolved pod {pod_uid} container {container} to {pid}");
            return Ok(pid);
        }
    }

    Err(LocateError::NotFound { pod_uid: pod_uid.to_string(), container: container.to_string() })
}

/// Extract the root field of every record in a `mountinfo` file.
///
/// Format (man 5 proc):
/// `mount_id parent_id major:minor root mount_point options ... - fstype source superoptions`
fn parse_mount_roots(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| line.split_whitespace().nth(3))
        .map(str::to_string)
        .collect()
}

fn is_match(root: &str, pod_uid: &str, container: &str) -> bool {
    root.contains(pod_uid) && root.contains(container)
}
