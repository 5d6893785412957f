//! Platform authorization queries for camera and microphone access.

use crate::access::DeviceAccessState;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which physical input a permission applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionKind {
    Camera,
    Microphone,
}

impl PermissionKind {
    pub const ALL: [PermissionKind; 2] = [PermissionKind::Camera, PermissionKind::Microphone];

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionKind::Camera => "camera",
            PermissionKind::Microphone => "microphone",
        }
    }

    /// AVFoundation media type four-character code.
    pub fn media_type(&self) -> &'static std::ffi::CStr {
        match self {
            PermissionKind::Camera => c"vide",
            PermissionKind::Microphone => c"soun",
        }
    }
}

impl fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "camera" | "video" => Ok(PermissionKind::Camera),
            "microphone" | "mic" | "audio" => Ok(PermissionKind::Microphone),
            other => Err(format!("unknown permission kind: {other}")),
        }
    }
}

/// Platform authorization snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    /// Access granted
    Authorized,
    /// Access denied by the user
    Denied,
    /// Access restricted (parental controls, MDM, etc)
    Restricted,
    /// The user hasn't been asked yet
    NotDetermined,
}

impl AuthorizationStatus {
    /// Map a raw `AVAuthorizationStatus` value.
    pub fn from_raw(raw: isize) -> Self {
        match raw {
            3 => AuthorizationStatus::Authorized,
            2 => AuthorizationStatus::Denied,
            1 => AuthorizationStatus::Restricted,
            _ => AuthorizationStatus::NotDetermined,
        }
    }
}

impl fmt::Display for AuthorizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthorizationStatus::Authorized => write!(f, "authorized"),
            AuthorizationStatus::Denied => write!(f, "denied"),
            AuthorizationStatus::Restricted => write!(f, "restricted"),
            AuthorizationStatus::NotDetermined => write!(f, "not_determined"),
        }
    }
}

/// Detailed permission information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionInfo {
    pub kind: PermissionKind,
    pub status: AuthorizationStatus,
    pub message: String,
    pub can_request: bool,
}

/// Read-only source of authorization status.
pub trait AuthorizationProvider: Send + Sync {
    fn authorization_status(&self, kind: PermissionKind) -> AuthorizationStatus;

    /// Access state reported when a negotiation starts. Providers that can
    /// fail to reach the platform report that as `Other`.
    fn access_state(&self, kind: PermissionKind) -> DeviceAccessState {
        self.authorization_status(kind).into()
    }

    /// Ask the platform to prompt the user. Blocks until the user answers.
    fn request_access(&self, kind: PermissionKind) -> bool {
        self.authorization_status(kind) == AuthorizationStatus::Authorized
    }
}

/// Authorization backed by the host operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemAuthorization;

impl AuthorizationProvider for SystemAuthorization {
    fn authorization_status(&self, kind: PermissionKind) -> AuthorizationStatus {
        check_permission(kind)
    }

    fn access_state(&self, kind: PermissionKind) -> DeviceAccessState {
        match platform_unavailable() {
            Some(reason) => {
                log::error!("Cannot query {} authorization: {}", kind, reason);
                DeviceAccessState::Other(reason)
            }
            None => self.authorization_status(kind).into(),
        }
    }

    fn request_access(&self, kind: PermissionKind) -> bool {
        #[cfg(target_os = "macos")]
        {
            request_access_macos(kind)
        }

        #[cfg(not(target_os = "macos"))]
        {
            let info = check_permission_detailed(kind);
            if info.status != AuthorizationStatus::Authorized {
                log::warn!("Cannot prompt for {} access: {}", kind, info.message);
            }
            info.status == AuthorizationStatus::Authorized
        }
    }
}

/// Why authorization cannot be queried at all on this host, if it cannot.
#[cfg(target_os = "macos")]
fn platform_unavailable() -> Option<String> {
    match objc::runtime::Class::get("AVCaptureDevice") {
        Some(_) => None,
        None => Some("AVFoundation not available".to_string()),
    }
}

#[cfg(not(target_os = "macos"))]
fn platform_unavailable() -> Option<String> {
    None
}

/// Check permission status for the current platform
pub fn check_permission(kind: PermissionKind) -> AuthorizationStatus {
    check_permission_detailed(kind).status
}

/// Check permission status with detailed information
pub fn check_permission_detailed(kind: PermissionKind) -> PermissionInfo {
    #[cfg(target_os = "macos")]
    {
        check_permission_macos(kind)
    }

    #[cfg(target_os = "linux")]
    {
        check_permission_linux(kind)
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        PermissionInfo {
            kind,
            status: AuthorizationStatus::NotDetermined,
            message: "Platform not supported".to_string(),
            can_request: false,
        }
    }
}

#[cfg(target_os = "macos")]
fn av_media_type(kind: PermissionKind) -> Option<*mut objc::runtime::Object> {
    use objc::runtime::{Class, Object};
    use objc::{msg_send, sel, sel_impl};

    let string_class = Class::get("NSString")?;
    let media_type: *mut Object =
        unsafe { msg_send![string_class, stringWithUTF8String: kind.media_type().as_ptr()] };
    if media_type.is_null() {
        None
    } else {
        Some(media_type)
    }
}

#[cfg(target_os = "macos")]
fn check_permission_macos(kind: PermissionKind) -> PermissionInfo {
    use objc::runtime::Class;
    use objc::{msg_send, sel, sel_impl};

    let (Some(device_class), Some(media_type)) = (Class::get("AVCaptureDevice"), av_media_type(kind))
    else {
        return PermissionInfo {
            kind,
            status: AuthorizationStatus::NotDetermined,
            message: "AVFoundation not available".to_string(),
            can_request: false,
        };
    };

    // AVAuthorizationStatus: 0 NotDetermined, 1 Restricted, 2 Denied, 3 Authorized
    let raw: isize = unsafe { msg_send![device_class, authorizationStatusForMediaType: media_type] };
    let status = AuthorizationStatus::from_raw(raw);

    let message = match status {
        AuthorizationStatus::Authorized => format!("{kind} access authorized"),
        AuthorizationStatus::Denied => format!(
            "{kind} access denied - enable in System Settings > Privacy & Security"
        ),
        AuthorizationStatus::Restricted => format!("{kind} access restricted by system policy"),
        AuthorizationStatus::NotDetermined => format!("{kind} permission not yet requested"),
    };

    PermissionInfo {
        kind,
        status,
        message,
        can_request: status == AuthorizationStatus::NotDetermined,
    }
}

#[cfg(target_os = "macos")]
fn request_access_macos(kind: PermissionKind) -> bool {
    use block::ConcreteBlock;
    use objc::runtime::{Class, BOOL, NO};
    use objc::{msg_send, sel, sel_impl};
    use std::time::Duration;

    let (Some(device_class), Some(media_type)) = (Class::get("AVCaptureDevice"), av_media_type(kind))
    else {
        log::error!("AVFoundation not available, cannot request {} access", kind);
        return false;
    };

    log::info!("Requesting macOS {} permission", kind);

    let (tx, rx) = crossbeam_channel::bounded(1);
    let handler = ConcreteBlock::new(move |granted: BOOL| {
        let _ = tx.try_send(granted != NO);
    });
    // The completion handler fires on an arbitrary queue after this frame returns.
    let handler = handler.copy();

    unsafe {
        let _: () = msg_send![device_class, requestAccessForMediaType: media_type completionHandler: &*handler];
    }

    match rx.recv_timeout(Duration::from_secs(60)) {
        Ok(granted) => {
            log::info!("{} permission granted: {}", kind, granted);
            granted
        }
        Err(_) => {
            log::error!("{} permission request timed out", kind);
            false
        }
    }
}

#[cfg(target_os = "linux")]
fn check_permission_linux(kind: PermissionKind) -> PermissionInfo {
    use std::fs;
    use std::path::Path;

    let (candidates, groups): (Vec<String>, &[&str]) = match kind {
        PermissionKind::Camera => ((0..10).map(|i| format!("/dev/video{i}")).collect(), &["video", "plugdev"]),
        PermissionKind::Microphone => (
            (0..10)
                .map(|i| format!("/dev/snd/pcmC{i}D0c"))
                .chain(std::iter::once("/dev/snd/controlC0".to_string()))
                .collect(),
            &["audio"],
        ),
    };

    let Some(first_device) = candidates.into_iter().find(|path| Path::new(path).exists()) else {
        return PermissionInfo {
            kind,
            status: AuthorizationStatus::NotDetermined,
            message: format!("No {kind} device nodes found"),
            can_request: false,
        };
    };

    match fs::metadata(&first_device) {
        Ok(_) if check_linux_group_membership(groups) => PermissionInfo {
            kind,
            status: AuthorizationStatus::Authorized,
            message: format!("{kind} access granted (user in {} group, {first_device} found)", groups[0]),
            can_request: false,
        },
        Ok(_) => PermissionInfo {
            kind,
            status: AuthorizationStatus::Denied,
            message: format!(
                "{first_device} exists but user is not in the {} group - run: sudo usermod -a -G {} $USER",
                groups[0], groups[0]
            ),
            can_request: true,
        },
        Err(e) => PermissionInfo {
            kind,
            status: AuthorizationStatus::Denied,
            message: format!("Cannot access {first_device}: {e}"),
            can_request: true,
        },
    }
}

#[cfg(target_os = "linux")]
fn check_linux_group_membership(wanted: &[&str]) -> bool {
    use std::process::Command;

    let Ok(output) = Command::new("groups").output() else {
        return false;
    };
    String::from_utf8(output.stdout)
        .map(|groups| groups.split_whitespace().any(|g| wanted.contains(&g)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_matches_av_authorization_status() {
        assert_eq!(AuthorizationStatus::from_raw(0), AuthorizationStatus::NotDetermined);
        assert_eq!(AuthorizationStatus::from_raw(1), AuthorizationStatus::Restricted);
        assert_eq!(AuthorizationStatus::from_raw(2), AuthorizationStatus::Denied);
        assert_eq!(AuthorizationStatus::from_raw(3), AuthorizationStatus::Authorized);
        assert_eq!(AuthorizationStatus::from_raw(42), AuthorizationStatus::NotDetermined);
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("Camera".parse::<PermissionKind>(), Ok(PermissionKind::Camera));
        assert_eq!("mic".parse::<PermissionKind>(), Ok(PermissionKind::Microphone));
        assert!("speaker".parse::<PermissionKind>().is_err());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(AuthorizationStatus::NotDetermined.to_string(), "not_determined");
        assert_eq!(PermissionKind::Microphone.to_string(), "microphone");
    }

    #[test]
    fn test_default_access_state_follows_status() {
        struct Fixed(AuthorizationStatus);
        impl AuthorizationProvider for Fixed {
            fn authorization_status(&self, _kind: PermissionKind) -> AuthorizationStatus {
                self.0
            }
        }

        assert_eq!(
            Fixed(AuthorizationStatus::Restricted).access_state(PermissionKind::Camera),
            DeviceAccessState::Restricted
        );
        assert_eq!(
            Fixed(AuthorizationStatus::NotDetermined).access_state(PermissionKind::Microphone),
            DeviceAccessState::NotDetermined
        );
    }

    #[test]
    fn test_check_permission_no_panic() {
        for kind in PermissionKind::ALL {
            let info = check_permission_detailed(kind);
            assert_eq!(info.kind, kind);
            assert!(!info.message.is_empty());
        }
    }
}
