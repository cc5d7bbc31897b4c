use crate::factory::{PlatformSupervisor, PlatformSupervisorFactory};
use inlets_service_core::{
    ControlKind, ControlLoopSettings, ControlRequest, DEFAULT_EXECUTABLE, EventSink, HostChannel,
    ServiceConfig, ServiceError, ServiceRunner, ServiceStatus, TracingEventSink, Uninitialized,
    control_channel,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// How the service talks to its host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceMode {
    /// Local console harness: Ctrl-C stops, stdin lines are control requests.
    Debug,
    /// Registered with the platform service manager.
    Managed,
}

/// Connects a host service manager to the control loop.
pub struct ServiceBridge {
    name: String,
    config_path: PathBuf,
    executable: String,
    settings: ControlLoopSettings,
    sink: Arc<dyn EventSink>,
}

impl ServiceBridge {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            sink: Arc::new(TracingEventSink::new(name.clone())),
            name,
            config_path: ServiceConfig::default_path(),
            executable: DEFAULT_EXECUTABLE.to_string(),
            settings: ControlLoopSettings::default(),
        }
    }

    pub fn with_config_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config_path = path.as_ref().to_path_buf();
        self
    }

    pub fn with_executable(mut self, executable: impl Into<String>) -> Self {
        self.executable = executable.into();
        self
    }

    pub fn with_settings(mut self, settings: ControlLoopSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Load the configuration and run the service until the host stops it.
    ///
    /// Only configuration and registration failures are returned; everything
    /// after startup is logged through the sink.
    pub fn run(self, mode: ServiceMode) -> Result<(), ServiceError> {
        self.sink.info(&format!("starting {} service", self.name));

        let result = ServiceConfig::load(&self.config_path)
            .map_err(ServiceError::from)
            .and_then(|config| match mode {
                ServiceMode::Debug => self.run_debug(config),
                ServiceMode::Managed => self.run_managed(config),
            });

        match &result {
            Ok(()) => self.sink.info(&format!("{} service stopped", self.name)),
            Err(e) => self.sink.error(&format!("{} service failed: {e}", self.name)),
        }
        result
    }

    fn runner(&self, config: ServiceConfig) -> ServiceRunner<Uninitialized, PlatformSupervisor> {
        info!(platform = PlatformSupervisorFactory::platform_name(), "creating service runner");
        let supervisor = PlatformSupervisorFactory::create_supervisor(self.sink.clone());
        ServiceRunner::new(self.name.clone(), config, supervisor, self.sink.clone())
            .with_executable(self.executable.clone())
            .with_settings(self.settings.clone())
    }

    fn run_debug(&self, config: ServiceConfig) -> Result<(), ServiceError> {
        let runtime = build_runtime()?;
        let runner = self.runner(config);
        let args = vec![self.name.clone()];

        let exit_code = runtime.block_on(async move {
            let (host, service) = control_channel();
            let HostChannel { requests, status } = host;
            let reporter = tokio::spawn(report_status(status));
            let console = tokio::spawn(console_requests(requests));

            let exit_code = runner.start().await.execute(&args, service).await;

            let _ = reporter.await;
            console.abort();
            exit_code
        });
        // The stdin reader sits on a blocking thread that never finishes on its own.
        runtime.shutdown_background();

        info!(exit_code, state = %ServiceStatus::stopped().state, "service status");
        Ok(())
    }

    #[cfg(unix)]
    fn run_managed(&self, config: ServiceConfig) -> Result<(), ServiceError> {
        use inlets_service_unix::SignalBridge;

        let runtime = build_runtime()?;
        let runner = self.runner(config);
        let args = vec![self.name.clone()];

        let exit_code = runtime.block_on(async move {
            let signals = SignalBridge::register()?;

            let (host, service) = control_channel();
            let HostChannel { requests, status } = host;
            let reporter = tokio::spawn(report_status(status));
            let forwarder = tokio::spawn(signals.run(requests));

            let exit_code = runner.start().await.execute(&args, service).await;

            let _ = reporter.await;
            let _ = forwarder.await;
            Ok::<_, ServiceError>(exit_code)
        })?;

        info!(exit_code, state = %ServiceStatus::stopped().state, "service status");
        Ok(())
    }

    #[cfg(windows)]
    fn run_managed(&self, config: ServiceConfig) -> Result<(), ServiceError> {
        let runner = self.runner(config);
        let sink = self.sink.clone();

        inlets_service_windows::run_service(&self.name, move |args, service| {
            let runtime = match build_runtime() {
                Ok(runtime) => runtime,
                Err(e) => {
                    sink.error(&e.to_string());
                    return 1;
                }
            };
            let exit_code =
                runtime.block_on(async move { runner.start().await.execute(&args, service).await });
            runtime.shutdown_background();
            exit_code
        })
    }
}

fn build_runtime() -> Result<Runtime, ServiceError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| ServiceError::Other(anyhow::anyhow!("failed to build tokio runtime: {e}")))
}

async fn report_status(mut status: mpsc::UnboundedReceiver<ServiceStatus>) {
    while let Some(next) = status.recv().await {
        info!(state = %next.state, accepts = ?next.accepts, "service status");
    }
}

/// Debug harness input: Ctrl-C stops the service, stdin lines name a control.
async fn console_requests(requests: mpsc::UnboundedSender<ControlRequest>) {
    info!("debug console: type stop, shutdown, pause, continue, interrogate or a control code");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        let kind = tokio::select! {
            _ = tokio::signal::ctrl_c() => ControlKind::Stop,
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match ControlKind::parse_command(&line) {
                    Some(kind) => kind,
                    None => {
                        if !line.trim().is_empty() {
                            warn!(input = %line.trim(), "unknown console command");
                        }
                        continue;
                    }
                },
                Ok(None) | Err(_) => {
                    stdin_open = false;
                    continue;
                }
            },
            _ = requests.closed() => break,
        };
        if requests.send(ControlRequest::new(kind)).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inlets_service_core::{EventLevel, MemoryEventSink};

    #[test]
    fn test_missing_config_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(MemoryEventSink::new());

        let err = ServiceBridge::new("inlets")
            .with_config_path(dir.path().join("inlets.json"))
            .with_sink(sink.clone())
            .run(ServiceMode::Debug)
            .unwrap_err();

        assert!(err.is_fatal());
        assert!(matches!(err, ServiceError::ConfigLoad(_)));
        assert_eq!(
            sink.messages_at(EventLevel::Info),
            vec!["starting inlets service"]
        );
        let errors = sink.messages_at(EventLevel::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("inlets service failed: failed to read config file"));
    }

    #[test]
    fn test_invalid_config_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inlets.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = ServiceBridge::new("inlets")
            .with_config_path(&path)
            .with_sink(Arc::new(MemoryEventSink::new()))
            .run(ServiceMode::Managed)
            .unwrap_err();

        assert!(matches!(err, ServiceError::ConfigLoad(_)));
    }
}
