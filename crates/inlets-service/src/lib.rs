//! inlets-service - runs the inlets-pro tunnel client as a managed service
//!
//! Picks the process supervisor for the target platform and connects the
//! host service manager (Windows SCM, Unix signals or a debug console) to the
//! control loop in `inlets-service-core`.
//!
//! ```no_run
//! use inlets_service::{ServiceBridge, ServiceMode};
//!
//! ServiceBridge::new("inlets")
//!     .with_config_path("/etc/inlets/inlets.json")
//!     .run(ServiceMode::Debug)?;
//! # Ok::<(), inlets_service::ServiceError>(())
//! ```

mod bridge;
mod factory;
pub mod logging;

pub use bridge::{ServiceBridge, ServiceMode};
pub use factory::{PlatformSupervisor, PlatformSupervisorFactory};
pub use inlets_service_core::*;
