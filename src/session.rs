//! The capture session mutation surface and the inputs it holds.
//!
//! Implementations are driven exclusively from the
//! [`SessionQueue`](crate::queue::SessionQueue) worker, so they only need to
//! be `Send`.

use crate::device::CaptureDevice;
use crate::permissions::PermissionKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A session-attachable wrapper around one physical device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceInput {
    pub id: Uuid,
    pub device_id: String,
    pub kind: PermissionKind,
}

impl DeviceInput {
    pub fn for_device(device: &dyn CaptureDevice) -> Self {
        let descriptor = device.descriptor();
        Self {
            id: Uuid::new_v4(),
            device_id: descriptor.id.clone(),
            kind: descriptor.kind,
        }
    }
}

/// Wraps devices in inputs. Construction can fail, e.g. when the device was
/// unplugged or is held exclusively by another process.
pub trait InputFactory: Send + Sync {
    fn make_input(&self, device: &dyn CaptureDevice) -> Result<DeviceInput, String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultInputFactory;

impl InputFactory for DefaultInputFactory {
    fn make_input(&self, device: &dyn CaptureDevice) -> Result<DeviceInput, String> {
        Ok(DeviceInput::for_device(device))
    }
}

/// Capture quality presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPreset {
    Photo,
    High,
    Medium,
    Low,
    Cif352x288,
    Vga640x480,
    Hd1280x720,
    Hd1920x1080,
    Hd4k3840x2160,
    Iframe960x540,
    Iframe1280x720,
    #[default]
    InputPriority,
}

impl SessionPreset {
    pub fn available() -> Vec<SessionPreset> {
        vec![
            SessionPreset::Photo,
            SessionPreset::High,
            SessionPreset::Medium,
            SessionPreset::Low,
            SessionPreset::Cif352x288,
            SessionPreset::Vga640x480,
            SessionPreset::Hd1280x720,
            SessionPreset::Hd1920x1080,
            SessionPreset::Hd4k3840x2160,
            SessionPreset::Iframe960x540,
            SessionPreset::Iframe1280x720,
            SessionPreset::InputPriority,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPreset::Photo => "photo",
            SessionPreset::High => "high",
            SessionPreset::Medium => "medium",
            SessionPreset::Low => "low",
            SessionPreset::Cif352x288 => "cif352x288",
            SessionPreset::Vga640x480 => "vga640x480",
            SessionPreset::Hd1280x720 => "hd1280x720",
            SessionPreset::Hd1920x1080 => "hd1920x1080",
            SessionPreset::Hd4k3840x2160 => "hd4k3840x2160",
            SessionPreset::Iframe960x540 => "iframe960x540",
            SessionPreset::Iframe1280x720 => "iframe1280x720",
            SessionPreset::InputPriority => "input_priority",
        }
    }

    /// Frame dimensions for presets with a fixed size.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            SessionPreset::Cif352x288 => Some((352, 288)),
            SessionPreset::Vga640x480 => Some((640, 480)),
            SessionPreset::Hd1280x720 | SessionPreset::Iframe1280x720 => Some((1280, 720)),
            SessionPreset::Hd1920x1080 => Some((1920, 1080)),
            SessionPreset::Hd4k3840x2160 => Some((3840, 2160)),
            SessionPreset::Iframe960x540 => Some((960, 540)),
            _ => None,
        }
    }
}

impl fmt::Display for SessionPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutation surface of a capture session.
///
/// Input and preset changes between `begin_configuration` and
/// `commit_configuration` become visible to consumers together at commit.
pub trait CaptureSession: Send {
    fn begin_configuration(&mut self);

    fn commit_configuration(&mut self);

    fn can_add_input(&self, input: &DeviceInput) -> bool;

    fn add_input(&mut self, input: DeviceInput);

    fn remove_input(&mut self, input: &DeviceInput);

    fn inputs(&self) -> Vec<DeviceInput>;

    /// Attach photo, video and metadata outputs.
    fn configure_outputs(&mut self) {}

    fn can_set_preset(&self, preset: SessionPreset) -> bool;

    fn set_preset(&mut self, preset: SessionPreset);

    fn start_running(&mut self);

    fn stop_running(&mut self);

    fn is_running(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_presets() {
        let presets = SessionPreset::available();
        assert_eq!(presets.len(), 12);
        assert_eq!(presets.last(), Some(&SessionPreset::InputPriority));
        assert_eq!(SessionPreset::default(), SessionPreset::InputPriority);
    }

    #[test]
    fn test_preset_serde_matches_display() {
        for preset in SessionPreset::available() {
            let json = serde_json::to_string(&preset).unwrap();
            assert_eq!(json, format!("\"{}\"", preset));
        }
    }

    #[test]
    fn test_preset_dimensions() {
        assert_eq!(SessionPreset::Vga640x480.dimensions(), Some((640, 480)));
        assert_eq!(SessionPreset::High.dimensions(), None);
    }
}
