use crate::config::ControlLoopSettings;
use crate::control::{ControlKind, ControlRequest, ServiceChannel, ServiceStatus};
use crate::error::UnrecognizedControlError;
use crate::event::EventSink;
use crate::process::ProcessSupervisor;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tracing::{debug, trace, warn};

/// Which heartbeat period the loop is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickSource {
    Fast,
    Slow,
}

enum Flow {
    Continue,
    Exit,
}

/// Drives the child's lifecycle from host control requests.
///
/// The machine is the single owner of the service status and the child
/// handle. [`run`](Self::run) processes one event per iteration and pushes a
/// status for every transition before it takes the next input.
pub struct ControlStateMachine<S: ProcessSupervisor> {
    supervisor: Arc<S>,
    child: Option<S::Handle>,
    sink: Arc<dyn EventSink>,
    settings: ControlLoopSettings,
    status: ServiceStatus,
    tick: TickSource,
}

impl<S: ProcessSupervisor> ControlStateMachine<S> {
    pub fn new(
        supervisor: Arc<S>,
        child: Option<S::Handle>,
        sink: Arc<dyn EventSink>,
        settings: ControlLoopSettings,
    ) -> Self {
        Self {
            supervisor,
            child,
            sink,
            settings,
            status: ServiceStatus::pending_start(),
            tick: TickSource::Fast,
        }
    }

    pub fn status(&self) -> ServiceStatus {
        self.status
    }

    pub fn tick_source(&self) -> TickSource {
        self.tick
    }

    pub fn has_child(&self) -> bool {
        self.child.is_some()
    }

    /// Run until a stop or shutdown request, then return the service exit code.
    ///
    /// `args` are the service's startup arguments, echoed in the stop diagnostic.
    pub async fn run(&mut self, args: &[String], channel: ServiceChannel) -> u32 {
        let ServiceChannel {
            mut requests,
            status,
        } = channel;

        self.push(&status, ServiceStatus::pending_start());

        let now = Instant::now();
        let mut fast = interval_at(now + self.settings.fast_tick, self.settings.fast_tick);
        let mut slow = interval_at(now + self.settings.slow_tick, self.settings.slow_tick);
        fast.set_missed_tick_behavior(MissedTickBehavior::Delay);
        slow.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.push(&status, ServiceStatus::running());

        loop {
            let source = self.tick;
            tokio::select! {
                _ = next_tick(&mut fast, &mut slow, source) => self.on_tick(),
                request = requests.recv() => {
                    let flow = match request {
                        Some(request) => self.handle(request, args, &status).await,
                        None => {
                            warn!("control channel closed, stopping service");
                            self.stop(args, None, &status).await;
                            Flow::Exit
                        }
                    };
                    if let Flow::Exit = flow {
                        break;
                    }
                }
            }
        }

        0
    }

    async fn handle(
        &mut self,
        request: ControlRequest,
        args: &[String],
        status: &mpsc::UnboundedSender<ServiceStatus>,
    ) -> Flow {
        debug!(kind = ?request.kind, context = ?request.context, "control request");
        match request.kind {
            ControlKind::Interrogate => {
                let current = self.status;
                self.push(status, current);
                if !self.settings.interrogate_delay.is_zero() {
                    tokio::time::sleep(self.settings.interrogate_delay).await;
                }
                self.push(status, current);
            }
            ControlKind::Stop | ControlKind::Shutdown => {
                self.stop(args, request.context, status).await;
                return Flow::Exit;
            }
            ControlKind::Pause => {
                self.push(status, ServiceStatus::paused());
                self.tick = TickSource::Slow;
            }
            ControlKind::Continue => {
                self.push(status, ServiceStatus::running());
                self.tick = TickSource::Fast;
            }
            ControlKind::Unknown(code) => {
                self.sink
                    .error(&UnrecognizedControlError { code }.to_string());
            }
        }
        Flow::Continue
    }

    async fn stop(
        &mut self,
        args: &[String],
        context: Option<u32>,
        status: &mpsc::UnboundedSender<ServiceStatus>,
    ) {
        // A request without context echoes as 0.
        let line = format!("{}-{}", args.join("-"), context.unwrap_or(0));
        self.sink.info(&line);

        if let Some(child) = self.child.take() {
            match self.supervisor.terminate(child).await {
                Ok(()) => debug!("child process killed"),
                Err(e) if e.is_benign() => {
                    self.sink.info(&format!("Child process already gone: {e}"))
                }
                Err(e) => self.sink.warning(&format!("Error killing process: {e}")),
            }
        }

        self.push(status, ServiceStatus::pending_stop());
    }

    fn on_tick(&self) {
        trace!(tick = ?self.tick, state = %self.status.state, "heartbeat");
    }

    fn push(&mut self, status: &mpsc::UnboundedSender<ServiceStatus>, next: ServiceStatus) {
        self.status = next;
        if status.send(next).is_err() {
            debug!(state = %next.state, "status receiver dropped");
        }
    }
}

async fn next_tick(fast: &mut Interval, slow: &mut Interval, source: TickSource) -> Instant {
    match source {
        TickSource::Fast => fast.tick().await,
        TickSource::Slow => slow.tick().await,
    }
}
