use crate::error::UnrecognizedControlError;
use std::fmt;
use std::ops::BitOr;
use tokio::sync::mpsc;

/// Windows `SERVICE_CONTROL_*` codes, used as the canonical numbering.
pub mod codes {
    pub const STOP: u32 = 0x1;
    pub const PAUSE: u32 = 0x2;
    pub const CONTINUE: u32 = 0x3;
    pub const INTERROGATE: u32 = 0x4;
    pub const SHUTDOWN: u32 = 0x5;
}

/// Kind of request delivered by the host service manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    Interrogate,
    Stop,
    Shutdown,
    Pause,
    Continue,
    Unknown(u32),
}

impl ControlKind {
    pub fn from_code(code: u32) -> Self {
        match code {
            codes::STOP => ControlKind::Stop,
            codes::PAUSE => ControlKind::Pause,
            codes::CONTINUE => ControlKind::Continue,
            codes::INTERROGATE => ControlKind::Interrogate,
            codes::SHUTDOWN => ControlKind::Shutdown,
            other => ControlKind::Unknown(other),
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            ControlKind::Stop => codes::STOP,
            ControlKind::Pause => codes::PAUSE,
            ControlKind::Continue => codes::CONTINUE,
            ControlKind::Interrogate => codes::INTERROGATE,
            ControlKind::Shutdown => codes::SHUTDOWN,
            ControlKind::Unknown(code) => *code,
        }
    }

    /// Parse a debug-console command: a control name or a raw numeric code.
    pub fn parse_command(input: &str) -> Option<Self> {
        let input = input.trim();
        match input.to_ascii_lowercase().as_str() {
            "stop" => Some(ControlKind::Stop),
            "shutdown" => Some(ControlKind::Shutdown),
            "pause" => Some(ControlKind::Pause),
            "continue" | "resume" => Some(ControlKind::Continue),
            "interrogate" | "status" => Some(ControlKind::Interrogate),
            _ => input.parse::<u32>().ok().map(ControlKind::from_code),
        }
    }
}

/// A control request, optionally carrying the host's context value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRequest {
    pub kind: ControlKind,
    pub context: Option<u32>,
}

impl ControlRequest {
    pub fn new(kind: ControlKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    pub fn with_context(kind: ControlKind, context: u32) -> Self {
        Self {
            kind,
            context: Some(context),
        }
    }

    /// The request as an error, if its code is not one the loop handles.
    pub fn unrecognized(&self) -> Option<UnrecognizedControlError> {
        match self.kind {
            ControlKind::Unknown(code) => Some(UnrecognizedControlError { code }),
            _ => None,
        }
    }
}

impl From<ControlKind> for ControlRequest {
    fn from(kind: ControlKind) -> Self {
        ControlRequest::new(kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    StartPending,
    Running,
    Paused,
    StopPending,
    Stopped,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceState::StartPending => "start-pending",
            ServiceState::Running => "running",
            ServiceState::Paused => "paused",
            ServiceState::StopPending => "stop-pending",
            ServiceState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Set of control kinds the service advertises to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AcceptedControls(u8);

impl AcceptedControls {
    pub const NONE: Self = Self(0);
    pub const STOP: Self = Self(0b001);
    pub const SHUTDOWN: Self = Self(0b010);
    pub const PAUSE_CONTINUE: Self = Self(0b100);

    /// Everything a running service accepts.
    pub const ALL: Self = Self(0b111);

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for AcceptedControls {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Status reported to the host after every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceStatus {
    pub state: ServiceState,
    pub accepts: AcceptedControls,
}

impl ServiceStatus {
    pub fn pending_start() -> Self {
        Self {
            state: ServiceState::StartPending,
            accepts: AcceptedControls::NONE,
        }
    }

    pub fn running() -> Self {
        Self {
            state: ServiceState::Running,
            accepts: AcceptedControls::ALL,
        }
    }

    pub fn paused() -> Self {
        Self {
            state: ServiceState::Paused,
            accepts: AcceptedControls::ALL,
        }
    }

    pub fn pending_stop() -> Self {
        Self {
            state: ServiceState::StopPending,
            accepts: AcceptedControls::NONE,
        }
    }

    pub fn stopped() -> Self {
        Self {
            state: ServiceState::Stopped,
            accepts: AcceptedControls::NONE,
        }
    }
}

/// Host side of the control channel pair: sends requests, receives statuses.
pub struct HostChannel {
    pub requests: mpsc::UnboundedSender<ControlRequest>,
    pub status: mpsc::UnboundedReceiver<ServiceStatus>,
}

/// Service side of the control channel pair, consumed by the control loop.
pub struct ServiceChannel {
    pub requests: mpsc::UnboundedReceiver<ControlRequest>,
    pub status: mpsc::UnboundedSender<ServiceStatus>,
}

/// Create a connected request/status channel pair.
pub fn control_channel() -> (HostChannel, ServiceChannel) {
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = mpsc::unbounded_channel();
    (
        HostChannel {
            requests: request_tx,
            status: status_rx,
        },
        ServiceChannel {
            requests: request_rx,
            status: status_tx,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_codes() {
        assert_eq!(ControlKind::from_code(1), ControlKind::Stop);
        assert_eq!(ControlKind::from_code(2), ControlKind::Pause);
        assert_eq!(ControlKind::from_code(3), ControlKind::Continue);
        assert_eq!(ControlKind::from_code(4), ControlKind::Interrogate);
        assert_eq!(ControlKind::from_code(5), ControlKind::Shutdown);
        assert_eq!(ControlKind::from_code(200), ControlKind::Unknown(200));
        assert_eq!(ControlKind::Unknown(200).code(), 200);
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(ControlKind::parse_command(" Pause\n"), Some(ControlKind::Pause));
        assert_eq!(ControlKind::parse_command("resume"), Some(ControlKind::Continue));
        assert_eq!(ControlKind::parse_command("5"), Some(ControlKind::Shutdown));
        assert_eq!(ControlKind::parse_command("128"), Some(ControlKind::Unknown(128)));
        assert_eq!(ControlKind::parse_command("dance"), None);
    }

    #[test]
    fn test_accepted_controls() {
        let accepts = AcceptedControls::STOP | AcceptedControls::SHUTDOWN;
        assert!(accepts.contains(AcceptedControls::STOP));
        assert!(!accepts.contains(AcceptedControls::PAUSE_CONTINUE));
        assert_eq!(accepts | AcceptedControls::PAUSE_CONTINUE, AcceptedControls::ALL);

        assert!(ServiceStatus::running().accepts.contains(AcceptedControls::ALL));
        assert!(ServiceStatus::paused().accepts.contains(AcceptedControls::ALL));
        assert!(ServiceStatus::pending_stop().accepts.is_empty());
    }

    #[test]
    fn test_unrecognized() {
        let request = ControlRequest::new(ControlKind::Unknown(77));
        assert_eq!(request.unrecognized().map(|e| e.code), Some(77));
        assert!(ControlRequest::new(ControlKind::Stop).unrecognized().is_none());
    }
}
