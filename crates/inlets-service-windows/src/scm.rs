use inlets_service_core::{
    AcceptedControls, ControlKind, ControlRequest, HostChannel, ServiceChannel, ServiceError,
    ServiceState, ServiceStatus, control_channel,
};
use std::ffi::OsString;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;
use tracing::{error, info, warn};
use windows_service::service::{
    ServiceControl, ServiceControlAccept, ServiceExitCode, ServiceState as WinState,
    ServiceStatus as WinStatus, ServiceType,
};
use windows_service::service_control_handler::{self, ServiceControlHandlerResult};
use windows_service::{define_windows_service, service_dispatcher};

type ServiceBody = Box<dyn FnOnce(Vec<String>, ServiceChannel) -> u32 + Send>;

struct Registration {
    name: String,
    body: Mutex<Option<ServiceBody>>,
}

// The dispatcher calls a plain `extern "system"` entry point, so the body has
// to be parked somewhere it can reach.
static REGISTRATION: OnceLock<Registration> = OnceLock::new();

const PENDING_WAIT_HINT: Duration = Duration::from_secs(10);

define_windows_service!(ffi_service_main, service_main);

/// Hand the calling thread to the Service Control Manager.
///
/// `body` runs on the service thread with the startup arguments and the
/// service end of the control channel, and returns the exit code. This call
/// blocks until the service has stopped.
pub fn run_service<F>(name: &str, body: F) -> Result<(), ServiceError>
where
    F: FnOnce(Vec<String>, ServiceChannel) -> u32 + Send + 'static,
{
    REGISTRATION
        .set(Registration {
            name: name.to_string(),
            body: Mutex::new(Some(Box::new(body))),
        })
        .map_err(|_| ServiceError::Registration("service already dispatched".into()))?;

    service_dispatcher::start(name, ffi_service_main).map_err(|e| {
        ServiceError::Registration(format!("failed to start service dispatcher: {e}"))
    })
}

fn service_main(arguments: Vec<OsString>) {
    if let Err(e) = run_registered(arguments) {
        error!("service failed: {e}");
    }
}

fn run_registered(arguments: Vec<OsString>) -> Result<(), ServiceError> {
    let registration = REGISTRATION
        .get()
        .ok_or_else(|| ServiceError::Registration("service entry point not set".into()))?;
    let body = registration
        .body
        .lock()
        .ok()
        .and_then(|mut body| body.take())
        .ok_or_else(|| ServiceError::Registration("service body already consumed".into()))?;

    let (host, service) = control_channel();
    let HostChannel {
        requests,
        mut status,
    } = host;

    let handler = move |control: ServiceControl| -> ServiceControlHandlerResult {
        let kind = match control {
            ServiceControl::Stop => ControlKind::Stop,
            ServiceControl::Shutdown => ControlKind::Shutdown,
            ServiceControl::Pause => ControlKind::Pause,
            ServiceControl::Continue => ControlKind::Continue,
            ServiceControl::Interrogate => ControlKind::Interrogate,
            other => ControlKind::Unknown(other.raw_service_control_type()),
        };
        // After the loop exits nobody is listening; the SCM still expects an answer.
        let _ = requests.send(ControlRequest::new(kind));
        match kind {
            ControlKind::Unknown(_) => ServiceControlHandlerResult::NotImplemented,
            _ => ServiceControlHandlerResult::NoError,
        }
    };

    let status_handle = service_control_handler::register(&registration.name, handler)
        .map_err(|e| ServiceError::Registration(format!("failed to register handler: {e}")))?;
    info!(service = %registration.name, "Registered with the Service Control Manager");

    let pump = std::thread::spawn(move || {
        while let Some(next) = status.blocking_recv() {
            if let Err(e) = status_handle.set_service_status(to_windows_status(next, 0)) {
                warn!(state = %next.state, "failed to report status: {e}");
            }
        }
    });

    let args = arguments
        .into_iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    let exit_code = body(args, service);

    if pump.join().is_err() {
        warn!("status pump panicked");
    }

    status_handle
        .set_service_status(to_windows_status(ServiceStatus::stopped(), exit_code))
        .map_err(|e| ServiceError::Other(e.into()))?;
    info!(service = %registration.name, exit_code, "Service stopped");
    Ok(())
}

/// Translate a loop status into the SCM's status record.
pub fn to_windows_status(status: ServiceStatus, exit_code: u32) -> WinStatus {
    let current_state = match status.state {
        ServiceState::StartPending => WinState::StartPending,
        ServiceState::Running => WinState::Running,
        ServiceState::Paused => WinState::Paused,
        ServiceState::StopPending => WinState::StopPending,
        ServiceState::Stopped => WinState::Stopped,
    };

    let mut controls_accepted = ServiceControlAccept::empty();
    if status.accepts.contains(AcceptedControls::STOP) {
        controls_accepted |= ServiceControlAccept::STOP;
    }
    if status.accepts.contains(AcceptedControls::SHUTDOWN) {
        controls_accepted |= ServiceControlAccept::SHUTDOWN;
    }
    if status.accepts.contains(AcceptedControls::PAUSE_CONTINUE) {
        controls_accepted |= ServiceControlAccept::PAUSE_CONTINUE;
    }

    let wait_hint = match status.state {
        ServiceState::StartPending | ServiceState::StopPending => PENDING_WAIT_HINT,
        _ => Duration::default(),
    };

    WinStatus {
        service_type: ServiceType::OWN_PROCESS,
        current_state,
        controls_accepted,
        exit_code: ServiceExitCode::Win32(exit_code),
        checkpoint: 0,
        wait_hint,
        process_id: None,
    }
}
