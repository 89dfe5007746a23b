use std::fmt;

use super::error::DeviceError;

/// Capture stream state as reported by the hardware.
///
/// The engine never sets this directly; it only observes it and reacts
/// through prepare/start/resume.
///
/// ```text
/// open → setup → prepared → running ⇄ xrun
///                              ↓
///                          suspended → (resume) → running
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceState {
    Open,
    Setup,
    Prepared,
    Running,
    XRun,
    Suspended,
    /// Any state the engine has no recovery for (draining, paused, ...).
    Other(&'static str),
}

impl DeviceState {
    /// States in which the availability check can go ahead directly.
    pub fn is_healthy(&self) -> bool {
        matches!(
            self,
            Self::Open | Self::Setup | Self::Prepared | Self::Running
        )
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => f.write_str("open"),
            Self::Setup => f.write_str("setup"),
            Self::Prepared => f.write_str("prepared"),
            Self::Running => f.write_str("running"),
            Self::XRun => f.write_str("xrun"),
            Self::Suspended => f.write_str("suspended"),
            Self::Other(name) => f.write_str(name),
        }
    }
}

/// What the capture engine should do next to get the stream healthy again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Nothing to fix; go on to the availability check.
    Proceed,
    /// Re-prepare the stream after an overrun.
    Prepare,
    /// Resume a suspended stream.
    Resume,
    /// Unknown state: report it and carry on.
    Report,
    /// Back off for one timeout.
    Sleep,
}

/// Recovery plan for an observed device state.
///
/// Returns the action and the new value of the restart-pending flag.
pub fn plan_for_state(state: DeviceState, restart_pending: bool) -> (RecoveryAction, bool) {
    match state {
        DeviceState::Open | DeviceState::Setup | DeviceState::Prepared | DeviceState::Running => {
            (RecoveryAction::Proceed, restart_pending)
        }
        DeviceState::XRun => (RecoveryAction::Prepare, true),
        DeviceState::Suspended => (RecoveryAction::Resume, restart_pending),
        DeviceState::Other(_) => (RecoveryAction::Report, restart_pending),
    }
}

/// Recovery plan for a failed availability query.
///
/// Any query failure leaves the stream needing a restart.
pub fn plan_for_error(error: DeviceError) -> (RecoveryAction, bool) {
    match error {
        DeviceError::Overrun => (RecoveryAction::Prepare, true),
        DeviceError::Suspended => (RecoveryAction::Resume, true),
        _ => (RecoveryAction::Sleep, true),
    }
}
