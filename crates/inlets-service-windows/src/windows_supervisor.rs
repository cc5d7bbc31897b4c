use async_trait::async_trait;
use inlets_service_core::{
    EventSink, LaunchSpec, ProcessSupervisor, SpawnError, TerminateError, spawn_output_forwarders,
};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::process::{Child, Command};
use tracing::{info, warn};

/// Windows child handle.
#[derive(Debug)]
pub struct WindowsChildHandle {
    child: Child,
    pid: u32,
}

impl WindowsChildHandle {
    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}

/// Spawns the child without a console window and kills it, along with any
/// processes it started, via `TerminateProcess`.
pub struct WindowsProcessSupervisor {
    sink: Arc<dyn EventSink>,
    system: std::sync::Mutex<System>,
}

impl WindowsProcessSupervisor {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        info!("Initializing Windows process supervisor");
        Self {
            sink,
            system: std::sync::Mutex::new(System::new()),
        }
    }

    /// Every descendant of `parent`, deepest first.
    fn find_descendants(&self, parent: u32) -> Vec<u32> {
        let Ok(mut system) = self.system.lock() else {
            return Vec::new();
        };
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing(),
        );

        let mut found = Vec::new();
        Self::find_children_recursive(&system, parent, &mut found);
        found
    }

    fn find_children_recursive(system: &System, parent: u32, result: &mut Vec<u32>) {
        for (pid, process) in system.processes() {
            if process.parent().map(|p| p.as_u32()) == Some(parent) {
                let child = pid.as_u32();
                Self::find_children_recursive(system, child, result);
                result.push(child);
            }
        }
    }

    fn kill_descendants(&self, descendants: &[u32]) {
        let Ok(system) = self.system.lock() else {
            return;
        };
        for pid in descendants {
            if let Some(process) = system.process(Pid::from_u32(*pid)) {
                if !process.kill() {
                    warn!(pid, "Failed to kill descendant process");
                }
            }
        }
    }
}

#[async_trait]
impl ProcessSupervisor for WindowsProcessSupervisor {
    type Handle = WindowsChildHandle;

    async fn spawn(&self, spec: &LaunchSpec) -> Result<WindowsChildHandle, SpawnError> {
        let mut cmd = Command::new(spec.executable());
        cmd.args(spec.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Services have no console; keep the child from allocating one.
        #[cfg(windows)]
        cmd.creation_flags(windows::Win32::System::Threading::CREATE_NO_WINDOW.0);

        let mut child = cmd
            .spawn()
            .map_err(|e| SpawnError::from_io(spec.executable(), e))?;

        let pid = child.id().unwrap_or_default();
        info!(
            pid = %pid,
            command = %spec.executable(),
            "Spawned Windows process"
        );
        self.sink.info(&format!("PID {pid}"));

        let label = Path::new(spec.executable())
            .file_stem()
            .and_then(|name| name.to_str())
            .unwrap_or(spec.executable())
            .to_string();
        spawn_output_forwarders(&mut child, &label, self.sink.clone());

        Ok(WindowsChildHandle { child, pid })
    }

    async fn terminate(&self, mut handle: WindowsChildHandle) -> Result<(), TerminateError> {
        if !handle.is_alive() {
            info!(pid = %handle.pid, "Process already exited");
            return Err(TerminateError::AlreadyExited);
        }

        let descendants = self.find_descendants(handle.pid);

        match handle.child.start_kill() {
            Ok(()) => {
                info!(pid = %handle.pid, "Terminated Windows process");
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                warn!(pid = %handle.pid, "Access denied terminating process");
                return Err(TerminateError::PermissionDenied);
            }
            Err(e) => {
                if !handle.is_alive() {
                    return Err(TerminateError::AlreadyExited);
                }
                warn!(pid = %handle.pid, "Failed to terminate process: {e}");
                return Err(TerminateError::Failed(e.to_string()));
            }
        }

        if !descendants.is_empty() {
            info!(count = descendants.len(), "Killing descendant processes");
            self.kill_descendants(&descendants);
        }
        Ok(())
    }

    fn platform_name(&self) -> &'static str {
        "windows"
    }
}
