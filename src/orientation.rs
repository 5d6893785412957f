//! Orientation mapping between the physical device, the video connection and
//! still images, plus preview-to-device point conversion.

use crate::device::DevicePoint;
use serde::{Deserialize, Serialize};

/// Physical orientation of the device as reported by its motion sensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceOrientation {
    Unknown,
    Portrait,
    PortraitUpsideDown,
    LandscapeLeft,
    LandscapeRight,
    FaceUp,
    FaceDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoOrientation {
    Portrait,
    PortraitUpsideDown,
    LandscapeRight,
    LandscapeLeft,
}

impl VideoOrientation {
    /// Device landscape-left means the home side is on the right, which is
    /// video landscape-right, and vice versa. Flat and unknown orientations
    /// fall back to portrait.
    pub fn from_device_orientation(orientation: DeviceOrientation) -> Self {
        match orientation {
            DeviceOrientation::Portrait => VideoOrientation::Portrait,
            DeviceOrientation::PortraitUpsideDown => VideoOrientation::PortraitUpsideDown,
            DeviceOrientation::LandscapeLeft => VideoOrientation::LandscapeRight,
            DeviceOrientation::LandscapeRight => VideoOrientation::LandscapeLeft,
            DeviceOrientation::Unknown | DeviceOrientation::FaceUp | DeviceOrientation::FaceDown => {
                VideoOrientation::Portrait
            }
        }
    }
}

/// EXIF-style orientation of a captured still.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageOrientation {
    Up,
    Down,
    Left,
    Right,
}

impl ImageOrientation {
    /// The sensor's native orientation is landscape-left, which is `Up`.
    pub fn from_device_orientation(orientation: DeviceOrientation) -> Self {
        match orientation {
            DeviceOrientation::Portrait | DeviceOrientation::FaceUp => ImageOrientation::Right,
            DeviceOrientation::PortraitUpsideDown | DeviceOrientation::FaceDown => {
                ImageOrientation::Left
            }
            DeviceOrientation::LandscapeLeft => ImageOrientation::Up,
            DeviceOrientation::LandscapeRight => ImageOrientation::Down,
            DeviceOrientation::Unknown => ImageOrientation::Up,
        }
    }
}

/// Convert a point in preview coordinates to normalized device coordinates.
///
/// `layer_size` is the preview's `(width, height)`; the preview is assumed to
/// show the full frame. `mirrored` is set for front cameras. Returns `None`
/// for an empty preview.
pub fn device_point_from_layer(
    point: (f64, f64),
    layer_size: (f64, f64),
    orientation: VideoOrientation,
    mirrored: bool,
) -> Option<DevicePoint> {
    let (width, height) = layer_size;
    if !(width > 0.0 && height > 0.0) {
        return None;
    }

    let mut u = (point.0 / width).clamp(0.0, 1.0);
    let v = (point.1 / height).clamp(0.0, 1.0);
    if mirrored {
        u = 1.0 - u;
    }

    let (x, y) = match orientation {
        VideoOrientation::LandscapeRight => (u, v),
        VideoOrientation::LandscapeLeft => (1.0 - u, 1.0 - v),
        VideoOrientation::Portrait => (v, 1.0 - u),
        VideoOrientation::PortraitUpsideDown => (1.0 - v, u),
    };
    Some(DevicePoint::new(x, y))
}
