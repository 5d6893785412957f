//! Scriptable devices, authorization and input construction.

use crate::access::DeviceAccessState;
use crate::device::{
    AdjustmentStatus, CaptureDevice, DeviceCapabilities, DeviceCatalog, DeviceDescriptor,
    DevicePosition, DeviceSettings, ExposureMode, FocusMode, SharedDevice,
};
use crate::permissions::{AuthorizationProvider, AuthorizationStatus, PermissionKind};
use crate::session::{DeviceInput, InputFactory};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug)]
pub struct VirtualDevice {
    descriptor: DeviceDescriptor,
    capabilities: DeviceCapabilities,
    settings: Mutex<DeviceSettings>,
    adjustment: Mutex<AdjustmentStatus>,
    lock_failure: Mutex<Option<String>>,
    locked: AtomicBool,
    lock_count: AtomicUsize,
}

impl VirtualDevice {
    pub fn new(descriptor: DeviceDescriptor, capabilities: DeviceCapabilities) -> Self {
        Self {
            descriptor,
            capabilities,
            settings: Mutex::new(DeviceSettings::default()),
            adjustment: Mutex::new(AdjustmentStatus::default()),
            lock_failure: Mutex::new(None),
            locked: AtomicBool::new(false),
            lock_count: AtomicUsize::new(0),
        }
    }

    /// Wide camera with every focus and exposure feature, torch, flash and 10x zoom.
    pub fn back_camera() -> Self {
        Self::new(
            DeviceDescriptor {
                id: "virtual-back-camera".to_string(),
                name: "Virtual Back Camera".to_string(),
                kind: PermissionKind::Camera,
                position: DevicePosition::Back,
            },
            DeviceCapabilities {
                focus_modes: FocusMode::ALL.to_vec(),
                exposure_modes: vec![
                    ExposureMode::Locked,
                    ExposureMode::AutoExpose,
                    ExposureMode::ContinuousAutoExposure,
                ],
                focus_point_of_interest: true,
                exposure_point_of_interest: true,
                torch_available: true,
                flash_available: true,
                max_zoom_factor: 10.0,
            },
        )
    }

    /// Fixed-focus selfie camera: exposure point of interest only, no torch.
    pub fn front_camera() -> Self {
        Self::new(
            DeviceDescriptor {
                id: "virtual-front-camera".to_string(),
                name: "Virtual Front Camera".to_string(),
                kind: PermissionKind::Camera,
                position: DevicePosition::Front,
            },
            DeviceCapabilities {
                focus_modes: vec![FocusMode::Locked],
                exposure_modes: vec![ExposureMode::AutoExpose, ExposureMode::ContinuousAutoExposure],
                focus_point_of_interest: false,
                exposure_point_of_interest: true,
                torch_available: false,
                flash_available: false,
                max_zoom_factor: 2.0,
            },
        )
    }

    pub fn microphone() -> Self {
        Self::new(
            DeviceDescriptor {
                id: "virtual-microphone".to_string(),
                name: "Virtual Microphone".to_string(),
                kind: PermissionKind::Microphone,
                position: DevicePosition::Unspecified,
            },
            DeviceCapabilities::default(),
        )
    }

    /// Make subsequent configuration locks fail with `reason`.
    pub fn fail_lock(&self, reason: impl Into<String>) {
        *lock(&self.lock_failure) = Some(reason.into());
    }

    pub fn set_settings(&self, settings: DeviceSettings) {
        *lock(&self.settings) = settings;
    }

    pub fn set_adjustment(&self, adjustment: AdjustmentStatus) {
        *lock(&self.adjustment) = adjustment;
    }

    pub fn lock_count(&self) -> usize {
        self.lock_count.load(Ordering::SeqCst)
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl CaptureDevice for VirtualDevice {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities.clone()
    }

    fn settings(&self) -> DeviceSettings {
        lock(&self.settings).clone()
    }

    fn adjustment(&self) -> AdjustmentStatus {
        *lock(&self.adjustment)
    }

    fn lock_for_configuration(&self) -> Result<(), String> {
        if let Some(reason) = lock(&self.lock_failure).clone() {
            return Err(reason);
        }
        self.locked.store(true, Ordering::SeqCst);
        self.lock_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn apply(&self, settings: &DeviceSettings) {
        *lock(&self.settings) = settings.clone();
    }

    fn unlock_for_configuration(&self) {
        self.locked.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Default)]
pub struct VirtualCatalog {
    devices: Vec<Arc<VirtualDevice>>,
}

impl VirtualCatalog {
    pub fn new(devices: Vec<Arc<VirtualDevice>>) -> Self {
        Self { devices }
    }

    /// Back camera, front camera and one microphone.
    pub fn standard() -> Self {
        Self::new(vec![
            VirtualDevice::back_camera().shared(),
            VirtualDevice::front_camera().shared(),
            VirtualDevice::microphone().shared(),
        ])
    }

    pub fn device(&self, id: &str) -> Option<Arc<VirtualDevice>> {
        self.devices.iter().find(|d| d.descriptor.id == id).cloned()
    }
}

impl DeviceCatalog for VirtualCatalog {
    fn devices(&self) -> Vec<SharedDevice> {
        self.devices
            .iter()
            .map(|d| d.clone() as SharedDevice)
            .collect()
    }
}

/// Authorization with statuses set by the test. A prompt for a
/// not-determined kind is answered with `grant_on_prompt`.
#[derive(Debug)]
pub struct StaticAuthorization {
    statuses: Mutex<HashMap<PermissionKind, AuthorizationStatus>>,
    grant_on_prompt: bool,
    platform_error: Option<String>,
    prompts: AtomicUsize,
}

impl StaticAuthorization {
    pub fn new(camera: AuthorizationStatus, microphone: AuthorizationStatus) -> Self {
        let statuses = HashMap::from([
            (PermissionKind::Camera, camera),
            (PermissionKind::Microphone, microphone),
        ]);
        Self {
            statuses: Mutex::new(statuses),
            grant_on_prompt: true,
            platform_error: None,
            prompts: AtomicUsize::new(0),
        }
    }

    pub fn authorized() -> Self {
        Self::new(AuthorizationStatus::Authorized, AuthorizationStatus::Authorized)
    }

    pub fn denying_prompts(mut self) -> Self {
        self.grant_on_prompt = false;
        self
    }

    /// Report every negotiation as a platform failure with `message`.
    pub fn unreachable_platform(mut self, message: impl Into<String>) -> Self {
        self.platform_error = Some(message.into());
        self
    }

    pub fn set(&self, kind: PermissionKind, status: AuthorizationStatus) {
        lock(&self.statuses).insert(kind, status);
    }

    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

impl AuthorizationProvider for StaticAuthorization {
    fn authorization_status(&self, kind: PermissionKind) -> AuthorizationStatus {
        lock(&self.statuses)
            .get(&kind)
            .copied()
            .unwrap_or(AuthorizationStatus::NotDetermined)
    }

    fn access_state(&self, kind: PermissionKind) -> DeviceAccessState {
        match &self.platform_error {
            Some(message) => DeviceAccessState::Other(message.clone()),
            None => self.authorization_status(kind).into(),
        }
    }

    fn request_access(&self, kind: PermissionKind) -> bool {
        let mut statuses = lock(&self.statuses);
        let status = statuses.entry(kind).or_insert(AuthorizationStatus::NotDetermined);
        if *status == AuthorizationStatus::NotDetermined {
            self.prompts.fetch_add(1, Ordering::SeqCst);
            *status = if self.grant_on_prompt {
                AuthorizationStatus::Authorized
            } else {
                AuthorizationStatus::Denied
            };
        }
        *status == AuthorizationStatus::Authorized
    }
}

/// Input factory that succeeds unless told otherwise.
#[derive(Debug, Default)]
pub struct VirtualInputFactory {
    fail_all: Option<String>,
    failures: HashMap<String, String>,
    created: AtomicUsize,
}

impl VirtualInputFactory {
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            fail_all: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn failing_for(mut self, device_id: impl Into<String>, message: impl Into<String>) -> Self {
        self.failures.insert(device_id.into(), message.into());
        self
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl InputFactory for VirtualInputFactory {
    fn make_input(&self, device: &dyn CaptureDevice) -> Result<DeviceInput, String> {
        let id = &device.descriptor().id;
        if let Some(message) = self.fail_all.as_ref().or_else(|| self.failures.get(id)) {
            return Err(message.clone());
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(DeviceInput::for_device(device))
    }
}
