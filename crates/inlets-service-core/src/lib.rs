//! inlets-service core - platform-independent service supervision
//!
//! This crate holds the control state machine, the data model shared with the
//! host service manager, the configuration loader and the process supervisor
//! abstraction implemented by the platform crates.

pub mod config;
pub mod control;
pub mod error;
pub mod event;
pub mod machine;
pub mod process;
pub mod runner;

pub use config::*;
pub use control::*;
pub use error::*;
pub use event::*;
pub use machine::{ControlStateMachine, TickSource};
pub use process::*;
pub use runner::{ServiceRunner, Started, Uninitialized};
