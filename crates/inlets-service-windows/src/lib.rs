//! Windows process supervision and Service Control Manager integration.

#[cfg(windows)]
mod scm;
mod windows_supervisor;

#[cfg(windows)]
pub use scm::{run_service, to_windows_status};
pub use windows_supervisor::{WindowsChildHandle, WindowsProcessSupervisor};

pub struct WindowsSupervisorFactory;

impl WindowsSupervisorFactory {
    pub fn create_supervisor(
        sink: std::sync::Arc<dyn inlets_service_core::EventSink>,
    ) -> WindowsProcessSupervisor {
        WindowsProcessSupervisor::new(sink)
    }

    pub fn platform_name() -> &'static str {
        "Windows"
    }
}
