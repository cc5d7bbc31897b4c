use inlets_service_core::EventSink;
use std::sync::Arc;

/// Supervisor implementation for the platform being compiled.
#[cfg(unix)]
pub type PlatformSupervisor = inlets_service_unix::UnixProcessSupervisor;

#[cfg(windows)]
pub type PlatformSupervisor = inlets_service_windows::WindowsProcessSupervisor;

#[cfg(not(any(unix, windows)))]
compile_error!("Unsupported platform: only Unix and Windows are currently supported");

/// Platform-independent factory that selects the appropriate implementation at compile time
pub struct PlatformSupervisorFactory;

impl PlatformSupervisorFactory {
    pub fn create_supervisor(sink: Arc<dyn EventSink>) -> Arc<PlatformSupervisor> {
        #[cfg(unix)]
        return Arc::new(inlets_service_unix::UnixSupervisorFactory::create_supervisor(sink));

        #[cfg(windows)]
        return Arc::new(inlets_service_windows::WindowsSupervisorFactory::create_supervisor(sink));
    }

    pub fn platform_name() -> &'static str {
        #[cfg(unix)]
        return inlets_service_unix::UnixSupervisorFactory::platform_name();

        #[cfg(windows)]
        return inlets_service_windows::WindowsSupervisorFactory::platform_name();
    }
}
