use inlets_service_core::{ControlKind, ControlRequest, ServiceError};
use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Delivers Unix signals to the control loop as control requests.
///
/// | signal  | request     |
/// |---------|-------------|
/// | SIGTERM | Stop        |
/// | SIGINT  | Shutdown    |
/// | SIGUSR1 | Pause       |
/// | SIGUSR2 | Continue    |
/// | SIGHUP  | Interrogate |
pub struct SignalBridge {
    terminate: Signal,
    interrupt: Signal,
    pause: Signal,
    resume: Signal,
    hangup: Signal,
}

impl SignalBridge {
    /// Install the handlers. Failure here is fatal for managed mode.
    pub fn register() -> Result<Self, ServiceError> {
        let install = |kind: SignalKind, name: &str| {
            signal(kind).map_err(|e| {
                ServiceError::Registration(format!("failed to install {name} handler: {e}"))
            })
        };

        Ok(Self {
            terminate: install(SignalKind::terminate(), "SIGTERM")?,
            interrupt: install(SignalKind::interrupt(), "SIGINT")?,
            pause: install(SignalKind::user_defined1(), "SIGUSR1")?,
            resume: install(SignalKind::user_defined2(), "SIGUSR2")?,
            hangup: install(SignalKind::hangup(), "SIGHUP")?,
        })
    }

    /// Forward signals until the control loop drops its receiver.
    pub async fn run(mut self, requests: mpsc::UnboundedSender<ControlRequest>) {
        info!("Forwarding SIGTERM/SIGINT/SIGUSR1/SIGUSR2/SIGHUP as control requests");
        loop {
            let kind = tokio::select! {
                _ = self.terminate.recv() => ControlKind::Stop,
                _ = self.interrupt.recv() => ControlKind::Shutdown,
                _ = self.pause.recv() => ControlKind::Pause,
                _ = self.resume.recv() => ControlKind::Continue,
                _ = self.hangup.recv() => ControlKind::Interrogate,
                _ = requests.closed() => break,
            };
            debug!(?kind, "signal received");
            if requests.send(ControlRequest::new(kind)).is_err() {
                break;
            }
        }
    }
}
