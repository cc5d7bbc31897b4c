use async_trait::async_trait;
use inlets_service_core::{
    EventSink, LaunchSpec, ProcessSupervisor, SpawnError, TerminateError, spawn_output_forwarders,
};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid as NixPid;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::{Child, Command};
use tracing::{info, warn};

/// Unix child handle. The child leads its own process group.
#[derive(Debug)]
pub struct UnixChildHandle {
    child: Child,
    pid: u32,
}

impl UnixChildHandle {
    /// False once the child has exited.
    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}

/// Spawns the child in a fresh process group and kills it with SIGKILL.
pub struct UnixProcessSupervisor {
    sink: Arc<dyn EventSink>,
}

impl UnixProcessSupervisor {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        info!("Initializing Unix process supervisor");
        Self { sink }
    }
}

#[async_trait]
impl ProcessSupervisor for UnixProcessSupervisor {
    type Handle = UnixChildHandle;

    async fn spawn(&self, spec: &LaunchSpec) -> Result<UnixChildHandle, SpawnError> {
        let mut cmd = Command::new(spec.executable());
        cmd.args(spec.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Own process group so the kill also reaches anything the child forks.
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| SpawnError::from_io(spec.executable(), e))?;

        // A child we just spawned has not been reaped, so it always has a pid.
        let pid = child.id().unwrap_or_default();
        info!(pid, command = spec.executable(), "Spawned Unix process");
        self.sink.info(&format!("PID {pid}"));

        let label = Path::new(spec.executable())
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(spec.executable())
            .to_string();
        spawn_output_forwarders(&mut child, &label, self.sink.clone());

        Ok(UnixChildHandle { child, pid })
    }

    async fn terminate(&self, mut handle: UnixChildHandle) -> Result<(), TerminateError> {
        if !handle.is_alive() {
            info!(pid = handle.pid, "Process already exited");
            return Err(TerminateError::AlreadyExited);
        }

        let pgid = NixPid::from_raw(handle.pid as i32);
        match signal::killpg(pgid, Signal::SIGKILL) {
            Ok(()) => {
                info!(pid = handle.pid, "Sent SIGKILL to process group");
                Ok(())
            }
            Err(nix::errno::Errno::ESRCH) => {
                info!(pid = handle.pid, "Process group not found (already terminated)");
                Err(TerminateError::AlreadyExited)
            }
            Err(nix::errno::Errno::EPERM) => {
                warn!(pid = handle.pid, "Permission denied to kill process group");
                Err(TerminateError::PermissionDenied)
            }
            Err(e) => {
                warn!(pid = handle.pid, "Failed to send SIGKILL to process group: {e}");
                Err(TerminateError::Failed(format!("SIGKILL failed: {e}")))
            }
        }
    }

    fn platform_name(&self) -> &'static str {
        "unix"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inlets_service_core::{EventLevel, MemoryEventSink};
    use std::time::Duration;

    fn supervisor() -> (UnixProcessSupervisor, Arc<MemoryEventSink>) {
        let sink = Arc::new(MemoryEventSink::new());
        (UnixProcessSupervisor::new(sink.clone()), sink)
    }

    #[tokio::test]
    async fn test_spawn_and_kill() {
        let (supervisor, sink) = supervisor();
        let spec = LaunchSpec::new("sh", ["-c", "sleep 30"]);

        let mut handle = supervisor.spawn(&spec).await.unwrap();
        assert!(handle.is_alive());
        assert!(
            sink.messages_at(EventLevel::Info)
                .iter()
                .any(|m| m.starts_with("PID "))
        );

        supervisor.terminate(handle).await.unwrap();
    }

    #[tokio::test]
    async fn test_terminate_exited_child() {
        let (supervisor, _sink) = supervisor();
        let spec = LaunchSpec::new("sh", ["-c", "exit 0"]);

        let mut handle = supervisor.spawn(&spec).await.unwrap();
        for _ in 0..50 {
            if !handle.is_alive() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let err = supervisor.terminate(handle).await.unwrap_err();
        assert!(err.is_benign());
    }

    #[tokio::test]
    async fn test_spawn_missing_executable() {
        let (supervisor, _sink) = supervisor();
        let spec = LaunchSpec::new("/nonexistent/inlets-pro", ["http", "client"]);

        let err = supervisor.spawn(&spec).await.unwrap_err();
        assert!(matches!(err, SpawnError::ExecutableNotFound(_)));
    }

    #[tokio::test]
    async fn test_child_output_reaches_sink() {
        let (supervisor, sink) = supervisor();
        let spec = LaunchSpec::new("sh", ["-c", "echo tunnel up; echo bad token >&2"]);

        let _handle = supervisor.spawn(&spec).await.unwrap();
        for _ in 0..50 {
            if !sink.messages_at(EventLevel::Warning).is_empty()
                && sink.messages_at(EventLevel::Info).len() >= 2
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        assert!(
            sink.messages_at(EventLevel::Info)
                .contains(&"[sh] tunnel up".to_string())
        );
        assert_eq!(sink.messages_at(EventLevel::Warning), vec!["[sh] bad token"]);
    }

    #[tokio::test]
    async fn test_long_output_line_keeps_child_alive() {
        let (supervisor, sink) = supervisor();
        let script = "head -c 20000 /dev/zero | tr '\\0' x; echo; sleep 0.3; \
                      i=0; while [ $i -lt 200 ]; do echo line $i; i=$((i+1)); done; \
                      echo tunnel ready; exec sleep 30";
        let spec = LaunchSpec::new("sh", ["-c", script]);

        let mut handle = supervisor.spawn(&spec).await.unwrap();
        for _ in 0..100 {
            if sink
                .messages_at(EventLevel::Info)
                .contains(&"[sh] tunnel ready".to_string())
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let info = sink.messages_at(EventLevel::Info);
        assert!(info.contains(&"[sh] line 0".to_string()));
        assert!(info.contains(&"[sh] line 199".to_string()));
        assert!(info.contains(&"[sh] tunnel ready".to_string()));
        assert!(!info.iter().any(|m| m.contains("xxxx")));
        assert!(handle.is_alive());

        supervisor.terminate(handle).await.unwrap();
    }
}
