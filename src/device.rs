//! Capture devices and their configurable properties.

use crate::errors::{EngineError, Result};
use crate::permissions::PermissionKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevicePosition {
    Back,
    Front,
    Unspecified,
}

impl DevicePosition {
    pub fn toggle(&self) -> DevicePosition {
        match self {
            DevicePosition::Back => DevicePosition::Front,
            DevicePosition::Front | DevicePosition::Unspecified => DevicePosition::Back,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusMode {
    Locked,
    AutoFocus,
    ContinuousAutoFocus,
}

impl FocusMode {
    pub const ALL: [FocusMode; 3] = [
        FocusMode::Locked,
        FocusMode::AutoFocus,
        FocusMode::ContinuousAutoFocus,
    ];

    pub fn description(&self) -> &'static str {
        match self {
            FocusMode::Locked => "Locked",
            FocusMode::AutoFocus => "AutoFocus",
            FocusMode::ContinuousAutoFocus => "ContinuousAutoFocus",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExposureMode {
    Locked,
    AutoExpose,
    ContinuousAutoExposure,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TorchMode {
    #[default]
    Off,
    On,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashMode {
    #[default]
    Off,
    On,
    Auto,
}

/// A point in device coordinates: (0,0) top-left, (1,1) bottom-right of the
/// sensor in its native landscape orientation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DevicePoint {
    pub x: f64,
    pub y: f64,
}

impl DevicePoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_normalized(&self) -> bool {
        (0.0..=1.0).contains(&self.x) && (0.0..=1.0).contains(&self.y)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub id: String,
    pub name: String,
    pub kind: PermissionKind,
    pub position: DevicePosition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    pub focus_modes: Vec<FocusMode>,
    pub exposure_modes: Vec<ExposureMode>,
    pub focus_point_of_interest: bool,
    pub exposure_point_of_interest: bool,
    pub torch_available: bool,
    pub flash_available: bool,
    pub max_zoom_factor: f64,
}

impl DeviceCapabilities {
    pub fn supports_focus(&self, mode: FocusMode) -> bool {
        self.focus_modes.contains(&mode)
    }

    pub fn supports_exposure(&self, mode: ExposureMode) -> bool {
        self.exposure_modes.contains(&mode)
    }
}

impl Default for DeviceCapabilities {
    /// A microphone, or a fixed-focus camera without torch and flash.
    fn default() -> Self {
        Self {
            focus_modes: Vec::new(),
            exposure_modes: Vec::new(),
            focus_point_of_interest: false,
            exposure_point_of_interest: false,
            torch_available: false,
            flash_available: false,
            max_zoom_factor: 1.0,
        }
    }
}

/// Mutable properties of a device, applied as a whole under a configuration lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSettings {
    pub focus_mode: FocusMode,
    pub exposure_mode: ExposureMode,
    pub focus_point: Option<DevicePoint>,
    pub exposure_point: Option<DevicePoint>,
    pub torch_mode: TorchMode,
    pub zoom_factor: f64,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            focus_mode: FocusMode::ContinuousAutoFocus,
            exposure_mode: ExposureMode::ContinuousAutoExposure,
            focus_point: None,
            exposure_point: None,
            torch_mode: TorchMode::Off,
            zoom_factor: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AdjustmentStatus {
    pub focus: bool,
    pub exposure: bool,
    pub white_balance: bool,
}

/// A physical camera or microphone.
pub trait CaptureDevice: Send + Sync + fmt::Debug {
    fn descriptor(&self) -> &DeviceDescriptor;

    fn capabilities(&self) -> DeviceCapabilities;

    fn settings(&self) -> DeviceSettings;

    fn adjustment(&self) -> AdjustmentStatus {
        AdjustmentStatus::default()
    }

    /// Acquire exclusive configuration access. The error is the platform's reason.
    fn lock_for_configuration(&self) -> std::result::Result<(), String>;

    fn apply(&self, settings: &DeviceSettings);

    fn unlock_for_configuration(&self);
}

pub type SharedDevice = Arc<dyn CaptureDevice>;

/// Lock `device`, let `change` edit its settings, apply them and unlock.
///
/// Returns the settings that were applied.
pub fn configure<F>(device: &dyn CaptureDevice, change: F) -> Result<DeviceSettings>
where
    F: FnOnce(&mut DeviceSettings),
{
    device.lock_for_configuration().map_err(|reason| {
        log::warn!("Configuration lock failed for {}: {}", device.descriptor().id, reason);
        EngineError::lock_failed(device.descriptor().id.clone(), reason)
    })?;

    let mut settings = device.settings();
    change(&mut settings);
    device.apply(&settings);
    device.unlock_for_configuration();
    Ok(settings)
}

/// Enumerates the devices the engine can attach.
pub trait DeviceCatalog: Send + Sync {
    fn devices(&self) -> Vec<SharedDevice>;

    fn camera(&self, position: DevicePosition) -> Option<SharedDevice> {
        let cameras: Vec<_> = self
            .devices()
            .into_iter()
            .filter(|d| d.descriptor().kind == PermissionKind::Camera)
            .collect();
        let exact = cameras
            .iter()
            .find(|d| d.descriptor().position == position)
            .cloned();
        match (exact, position) {
            (Some(device), _) => Some(device),
            (None, DevicePosition::Unspecified) => cameras.into_iter().next(),
            (None, _) => None,
        }
    }

    fn microphone(&self) -> Option<SharedDevice> {
        self.devices()
            .into_iter()
            .find(|d| d.descriptor().kind == PermissionKind::Microphone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_toggle() {
        assert_eq!(DevicePosition::Back.toggle(), DevicePosition::Front);
        assert_eq!(DevicePosition::Front.toggle(), DevicePosition::Back);
        assert_eq!(DevicePosition::Unspecified.toggle(), DevicePosition::Back);
    }

    #[test]
    fn test_point_normalized() {
        assert!(DevicePoint::new(0.0, 1.0).is_normalized());
        assert!(!DevicePoint::new(-0.1, 0.5).is_normalized());
        assert!(!DevicePoint::new(0.5, f64::NAN).is_normalized());
    }

    #[test]
    fn test_focus_descriptions() {
        let names: Vec<_> = FocusMode::ALL.iter().map(|m| m.description()).collect();
        assert_eq!(names, ["Locked", "AutoFocus", "ContinuousAutoFocus"]);
    }
}
