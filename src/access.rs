//! Device access states, results and the default policy that turns a
//! result into the caller's next action.

use crate::errors::AccessError;
use crate::permissions::{AuthorizationStatus, PermissionKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Access state of one input, derived from a single authorization snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum DeviceAccessState {
    /// Can proceed safely
    Authorized,
    /// Settings change required
    Denied,
    /// Probably restricted by parental controls or device management
    Restricted,
    /// The user hasn't made a choice yet
    NotDetermined,
    /// The session refused an input of the given kind
    UnableToAdd(PermissionKind),
    RunningOnSimulator,
    Other(String),
}

impl From<AuthorizationStatus> for DeviceAccessState {
    fn from(status: AuthorizationStatus) -> Self {
        match status {
            AuthorizationStatus::Authorized => DeviceAccessState::Authorized,
            AuthorizationStatus::Denied => DeviceAccessState::Denied,
            AuthorizationStatus::Restricted => DeviceAccessState::Restricted,
            AuthorizationStatus::NotDetermined => DeviceAccessState::NotDetermined,
        }
    }
}

impl DeviceAccessState {
    /// The error this state represents, `None` when access is authorized.
    ///
    /// `Other` seen when a negotiation starts comes from the platform query;
    /// see [`AccessOutcome::error`](crate::negotiation::AccessOutcome::error)
    /// for failures while attaching.
    pub fn to_error(&self) -> Option<AccessError> {
        match self {
            DeviceAccessState::Authorized => None,
            DeviceAccessState::Denied => Some(AccessError::PermissionDenied),
            DeviceAccessState::Restricted => Some(AccessError::PermissionRestricted),
            DeviceAccessState::NotDetermined => Some(AccessError::PermissionNotDetermined),
            DeviceAccessState::UnableToAdd(kind) => Some(AccessError::InputRejectedBySession(*kind)),
            DeviceAccessState::RunningOnSimulator => Some(AccessError::RunningOnSimulator),
            DeviceAccessState::Other(message) => Some(AccessError::UnknownPlatformError(message.clone())),
        }
    }
}

impl fmt::Display for DeviceAccessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceAccessState::Authorized => write!(f, "authorized"),
            DeviceAccessState::Denied => write!(f, "denied"),
            DeviceAccessState::Restricted => write!(f, "restricted"),
            DeviceAccessState::NotDetermined => write!(f, "not_determined"),
            DeviceAccessState::UnableToAdd(kind) => write!(f, "unable_to_add({kind})"),
            DeviceAccessState::RunningOnSimulator => write!(f, "running_on_simulator"),
            DeviceAccessState::Other(message) => write!(f, "other({message})"),
        }
    }
}

/// A [`DeviceAccessState`] tagged with the input it was negotiated for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAccessResult {
    pub kind: PermissionKind,
    pub state: DeviceAccessState,
}

impl DeviceAccessResult {
    pub fn new(kind: PermissionKind, state: DeviceAccessState) -> Self {
        Self { kind, state }
    }

    pub fn camera(state: DeviceAccessState) -> Self {
        Self::new(PermissionKind::Camera, state)
    }

    pub fn microphone(state: DeviceAccessState) -> Self {
        Self::new(PermissionKind::Microphone, state)
    }
}

impl fmt::Display for DeviceAccessResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind, self.state)
    }
}

/// What the caller wants to happen after seeing a [`DeviceAccessResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "detail", rename_all = "snake_case")]
pub enum DeviceAccessAction {
    /// Access was denied or restricted, the user has to visit settings
    SettingsChangeRequired,
    /// Access not determined; the caller may explain the upcoming system
    /// prompt before continuing
    CanPerformFirstTimeAccess,
    CanProceedAccessGranted,
    UnexpectedError(String),
    RunningOnSimulator,
}

impl DeviceAccessAction {
    /// Whether resuming with this action attaches the input.
    pub fn proceeds(&self) -> bool {
        matches!(
            self,
            DeviceAccessAction::CanPerformFirstTimeAccess | DeviceAccessAction::CanProceedAccessGranted
        )
    }
}

impl fmt::Display for DeviceAccessAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceAccessAction::SettingsChangeRequired => write!(f, "settings_change_required"),
            DeviceAccessAction::CanPerformFirstTimeAccess => write!(f, "can_perform_first_time_access"),
            DeviceAccessAction::CanProceedAccessGranted => write!(f, "can_proceed_access_granted"),
            DeviceAccessAction::UnexpectedError(message) => write!(f, "unexpected_error({message})"),
            DeviceAccessAction::RunningOnSimulator => write!(f, "running_on_simulator"),
        }
    }
}

/// Default policy: the action a caller with no UI of its own would take.
///
/// Only the state participates, so `Camera(x)` and `Microphone(x)` always
/// classify the same way.
pub fn classify_action(result: &DeviceAccessResult) -> DeviceAccessAction {
    classify_state(&result.state)
}

pub fn classify_state(state: &DeviceAccessState) -> DeviceAccessAction {
    match state {
        DeviceAccessState::Denied
        | DeviceAccessState::Restricted
        | DeviceAccessState::UnableToAdd(_) => DeviceAccessAction::SettingsChangeRequired,
        DeviceAccessState::NotDetermined => DeviceAccessAction::CanPerformFirstTimeAccess,
        DeviceAccessState::Authorized => DeviceAccessAction::CanProceedAccessGranted,
        DeviceAccessState::Other(message) => DeviceAccessAction::UnexpectedError(message.clone()),
        DeviceAccessState::RunningOnSimulator => DeviceAccessAction::RunningOnSimulator,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_from_status() {
        assert_eq!(
            DeviceAccessState::from(AuthorizationStatus::Restricted),
            DeviceAccessState::Restricted
        );
        assert_eq!(
            DeviceAccessState::from(AuthorizationStatus::NotDetermined),
            DeviceAccessState::NotDetermined
        );
    }

    #[test]
    fn test_to_error() {
        assert_eq!(DeviceAccessState::Authorized.to_error(), None);
        assert_eq!(
            DeviceAccessState::UnableToAdd(PermissionKind::Camera).to_error(),
            Some(AccessError::InputRejectedBySession(PermissionKind::Camera))
        );
        assert_eq!(
            DeviceAccessState::Other("boom".into()).to_error(),
            Some(AccessError::UnknownPlatformError("boom".into()))
        );
    }

    #[test]
    fn test_result_display() {
        let result = DeviceAccessResult::camera(DeviceAccessState::Denied);
        assert_eq!(result.to_string(), "camera(denied)");
        let result =
            DeviceAccessResult::microphone(DeviceAccessState::UnableToAdd(PermissionKind::Microphone));
        assert_eq!(result.to_string(), "microphone(unable_to_add(microphone))");
    }

    #[test]
    fn test_proceeds() {
        assert!(DeviceAccessAction::CanProceedAccessGranted.proceeds());
        assert!(DeviceAccessAction::CanPerformFirstTimeAccess.proceeds());
        assert!(!DeviceAccessAction::SettingsChangeRequired.proceeds());
        assert!(!DeviceAccessAction::UnexpectedError("x".into()).proceeds());
        assert!(!DeviceAccessAction::RunningOnSimulator.proceeds());
    }

    #[test]
    fn test_serialized_form() {
        let json = serde_json::to_string(&DeviceAccessResult::camera(DeviceAccessState::UnableToAdd(
            PermissionKind::Microphone,
        )))
        .unwrap();
        assert_eq!(
            json,
            r#"{"kind":"camera","state":{"state":"unable_to_add","detail":"microphone"}}"#
        );
    }
}
