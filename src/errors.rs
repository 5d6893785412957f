use crate::permissions::PermissionKind;
use crate::session::SessionPreset;
use thiserror::Error;

/// Failures of the engine itself, as opposed to device access outcomes.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("session queue is closed")]
    QueueClosed,
    #[error("timed out waiting for {0}")]
    Timeout(String),
    #[error("could not lock device {device} for configuration: {reason}")]
    ConfigurationLockFailed { device: String, reason: String },
    #[error("no current capture device")]
    NoCurrentDevice,
    #[error("session preset {0} is not supported by the current session")]
    PresetUnsupported(SessionPreset),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("negotiation was already resumed or abandoned")]
    AlreadyResumed,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn lock_failed(device: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigurationLockFailed {
            device: device.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

/// Everything that can keep a device from being attached to the session.
///
/// These are never raised as faults; callers see them through the
/// [`DeviceAccessResult`](crate::access::DeviceAccessResult) of a negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    #[error("access denied by the user")]
    PermissionDenied,
    #[error("access restricted by system policy")]
    PermissionRestricted,
    #[error("access has not been requested yet")]
    PermissionNotDetermined,
    #[error("could not create device input: {0}")]
    InputConstructionFailed(String),
    #[error("session rejected the {0} input")]
    InputRejectedBySession(PermissionKind),
    #[error("capture devices are unavailable on the simulator")]
    RunningOnSimulator,
    #[error("unexpected platform error: {0}")]
    UnknownPlatformError(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
