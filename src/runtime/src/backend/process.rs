//! Bare process backend.
//!
//! Runs prebuilt executables straight from a bin directory. The "image" of a
//! process instance is its executable name and its id is the decimal pid.
//! Processes are detached into their own session so they outlive the
//! deploying command.

use std::collections::HashMap;
use std::os::unix::io::AsRawFd;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use sysinfo::{Pid, Process, System};
use traefiker_core::error::{DeployError, Result};
use traefiker_core::{BackendKind, Instance};

use super::ExecutionBackend;
use crate::spec::RuntimeSpec;

/// Default location of deployable executables.
pub const DEFAULT_BIN_DIR: &str = "/usr/local/bin";

/// How long a new process must survive before it counts as launched.
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(3);

/// Descriptor pointed at `/dev/null` in every launched process.
const NULL_FD: libc::c_int = 3;

/// Backend for directly spawned OS processes.
pub struct ProcessBackend {
    bin_dir: PathBuf,
    workdir: PathBuf,
    settle: Duration,
}

impl ProcessBackend {
    /// Processes start in `workdir`.
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            bin_dir: PathBuf::from(DEFAULT_BIN_DIR),
            workdir: workdir.into(),
            settle: DEFAULT_SETTLE,
        }
    }

    pub fn with_bin_dir(mut self, bin_dir: impl Into<PathBuf>) -> Self {
        self.bin_dir = bin_dir.into();
        self
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn bin_dir(&self) -> &Path {
        &self.bin_dir
    }
}

#[async_trait]
impl ExecutionBackend for ProcessBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Process
    }

    async fn list(&self) -> Result<Vec<Instance>> {
        let mut sys = System::new();
        sys.refresh_processes();

        let mut instances: Vec<Instance> = sys
            .processes()
            .iter()
            .map(|(pid, process)| {
                let name = program_name(process);
                Instance {
                    id: pid.to_string(),
                    image: name.clone(),
                    names: vec![name],
                    backend: BackendKind::Process,
                }
            })
            .collect();
        instances.sort_by_key(|i| i.id.parse::<u32>().unwrap_or(u32::MAX));
        Ok(instances)
    }

    async fn run(
        &self,
        image: &str,
        _pull: Option<&str>,
        labels: &HashMap<String, String>,
        spec: &RuntimeSpec,
    ) -> Result<String> {
        let launch_error = |message: String| DeployError::LaunchError {
            image: image.to_string(),
            message,
        };

        let argv = spec
            .command()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| launch_error("No command configured".to_string()))?;
        if !labels.is_empty() {
            tracing::debug!(count = labels.len(), "Labels are ignored for processes");
        }

        let program = self.bin_dir.join(&argv[0]);
        let null = std::fs::File::open("/dev/null")
            .map_err(|e| launch_error(format!("Failed to open /dev/null: {}", e)))?;
        let null_fd = null.as_raw_fd();

        let mut command = Command::new(&program);
        command
            .args(&argv[1..])
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        // SAFETY: only async-signal-safe libc calls run between fork and exec.
        unsafe {
            command.pre_exec(move || {
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                let rc = if null_fd == NULL_FD {
                    libc::fcntl(NULL_FD, libc::F_SETFD, 0)
                } else {
                    libc::dup2(null_fd, NULL_FD)
                };
                if rc == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let mut child = command
            .spawn()
            .map_err(|e| launch_error(format!("Failed to start {}: {}", program.display(), e)))?;
        drop(command);
        drop(null);

        let pid = child.id();
        tracing::info!(pid, program = %program.display(), "Process spawned, waiting to settle");

        tokio::time::sleep(self.settle).await;

        if let Ok(Some(status)) = child.try_wait() {
            return Err(launch_error(format!(
                "Process {} exited during startup ({})",
                pid, status
            )));
        }

        let mut sys = System::new();
        if !sys.refresh_process(Pid::from_u32(pid)) {
            return Err(launch_error(format!(
                "Process {} is gone after startup",
                pid
            )));
        }

        tracing::info!(pid, image, "Process running");
        Ok(pid.to_string())
    }

    async fn stop(&self, id: &str) -> Result<()> {
        let pid: libc::pid_t = id.trim().parse().map_err(|_| DeployError::StopError {
            id: id.to_string(),
            message: "not a process id".to_string(),
        })?;

        // SAFETY: kill(2) has no memory-safety preconditions.
        let rc = unsafe { libc::kill(pid, libc::SIGKILL) };
        if rc != 0 {
            return Err(DeployError::StopError {
                id: id.to_string(),
                message: std::io::Error::last_os_error().to_string(),
            });
        }

        let mut sys = System::new();
        if sys.refresh_process(Pid::from_u32(pid as u32)) {
            tracing::warn!(pid, "Process still present after SIGKILL");
        } else {
            tracing::debug!(pid, "Process stopped");
        }
        Ok(())
    }
}

/// Executable name from argv[0], falling back to the kernel's process name.
fn program_name(process: &Process) -> String {
    process
        .cmd()
        .first()
        .and_then(|arg0| Path::new(arg0).file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| process.name().to_string())
}
