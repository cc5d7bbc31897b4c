use crate::config::{ControlLoopSettings, DEFAULT_EXECUTABLE, LaunchSpec, ServiceConfig};
use crate::control::ServiceChannel;
use crate::event::EventSink;
use crate::machine::ControlStateMachine;
use crate::process::ProcessSupervisor;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::info;

pub struct Uninitialized;

pub struct Started;

/// A configured service that has, or has not yet, launched its child.
pub struct ServiceRunner<Status, S: ProcessSupervisor> {
    name: String,
    config: ServiceConfig,
    executable: String,
    supervisor: Arc<S>,
    sink: Arc<dyn EventSink>,
    settings: ControlLoopSettings,
    child: Option<S::Handle>,
    _status: PhantomData<Status>,
}

impl<S: ProcessSupervisor> ServiceRunner<Uninitialized, S> {
    pub fn new(
        name: impl Into<String>,
        config: ServiceConfig,
        supervisor: Arc<S>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            executable: DEFAULT_EXECUTABLE.to_string(),
            supervisor,
            sink,
            settings: ControlLoopSettings::default(),
            child: None,
            _status: PhantomData,
        }
    }

    pub fn with_executable(mut self, executable: impl Into<String>) -> Self {
        self.executable = executable.into();
        self
    }

    pub fn with_settings(mut self, settings: ControlLoopSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Spawn the child. A spawn failure is recorded and the service carries on
    /// without a child; nothing is retried.
    pub async fn start(self) -> ServiceRunner<Started, S> {
        let spec = LaunchSpec::from_config(&self.executable, &self.config);
        self.sink.info(&spec.redacted().to_string());

        info!(
            service = %self.name,
            platform = self.supervisor.platform_name(),
            "spawning child process"
        );
        let child = match self.supervisor.spawn(&spec).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                self.sink.error(&format!("Error starting app {e}"));
                None
            }
        };

        ServiceRunner {
            name: self.name,
            config: self.config,
            executable: self.executable,
            supervisor: self.supervisor,
            sink: self.sink,
            settings: self.settings,
            child,
            _status: PhantomData,
        }
    }
}

impl<S: ProcessSupervisor> ServiceRunner<Started, S> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_child(&self) -> bool {
        self.child.is_some()
    }

    /// Run the control loop until the host stops the service.
    pub async fn execute(self, args: &[String], channel: ServiceChannel) -> u32 {
        let mut machine =
            ControlStateMachine::new(self.supervisor, self.child, self.sink, self.settings);
        machine.run(args, channel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{ControlKind, ServiceState, control_channel};
    use crate::event::{EventLevel, MemoryEventSink};
    use crate::machine::tests::FakeSupervisor;
    use std::sync::atomic::Ordering;

    fn config() -> ServiceConfig {
        ServiceConfig {
            upstreams: vec!["a".into(), "b".into()],
            url: "https://x".into(),
            token: "t".into(),
            license_file: "lic.txt".into(),
            auto_tls: true,
        }
    }

    #[tokio::test]
    async fn test_start_logs_redacted_command() {
        let supervisor = Arc::new(FakeSupervisor::default());
        let sink = Arc::new(MemoryEventSink::new());
        let runner = ServiceRunner::new("inlets", config(), supervisor.clone(), sink.clone())
            .start()
            .await;

        assert!(runner.has_child());
        assert_eq!(supervisor.spawns.load(Ordering::SeqCst), 1);
        assert_eq!(
            sink.messages_at(EventLevel::Info),
            vec![
                "inlets-pro http client --url=https://x --upstream=a,b --token=*** \
                 --license-file=lic.txt --auto-tls=true"
            ]
        );
    }

    #[tokio::test]
    async fn test_spawn_failure_still_reaches_running() {
        let supervisor = Arc::new(FakeSupervisor {
            fail_spawn: true,
            ..Default::default()
        });
        let sink = Arc::new(MemoryEventSink::new());
        let runner = ServiceRunner::new("inlets", config(), supervisor.clone(), sink.clone())
            .with_executable("missing-binary")
            .start()
            .await;

        assert!(!runner.has_child());
        assert_eq!(
            sink.messages_at(EventLevel::Error),
            vec!["Error starting app executable not found: missing-binary"]
        );

        let (mut host, service) = control_channel();
        host.requests.send(ControlKind::Stop.into()).unwrap();
        assert_eq!(runner.execute(&[], service).await, 0);

        let mut states = Vec::new();
        while let Some(status) = host.status.recv().await {
            states.push(status.state);
        }
        assert_eq!(
            states,
            vec![
                ServiceState::StartPending,
                ServiceState::Running,
                ServiceState::StopPending,
            ]
        );
        assert_eq!(supervisor.terminations.load(Ordering::SeqCst), 0);
    }
}
