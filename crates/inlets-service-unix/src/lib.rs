//! Unix process supervision and signal-driven service control.

#[cfg(unix)]
mod signal_bridge;
#[cfg(unix)]
mod unix_supervisor;

#[cfg(unix)]
pub use signal_bridge::SignalBridge;
#[cfg(unix)]
pub use unix_supervisor::{UnixChildHandle, UnixProcessSupervisor};

#[cfg(unix)]
pub struct UnixSupervisorFactory;

#[cfg(unix)]
impl UnixSupervisorFactory {
    pub fn create_supervisor(
        sink: std::sync::Arc<dyn inlets_service_core::EventSink>,
    ) -> UnixProcessSupervisor {
        UnixProcessSupervisor::new(sink)
    }

    pub fn platform_name() -> &'static str {
        "Unix"
    }
}
