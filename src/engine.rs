//! The capture engine: one owned session, its serial queue, device access
//! negotiation and the current device's properties.
//!
//! Session work (start, stop, inputs, outputs, preset) always runs on the
//! session queue. Device properties (focus, zoom, torch) are changed directly
//! under the device's configuration lock.

use crate::config::EngineConfig;
use crate::coordinator::{DeviceAccessCoordinator, SessionContext, SharedSessionQueue};
use crate::device::{
    self, DeviceCatalog, DevicePoint, DevicePosition, ExposureMode, FlashMode, FocusMode,
    SharedDevice, TorchMode,
};
use crate::errors::{EngineError, Result};
use crate::negotiation::Negotiation;
use crate::orientation::{DeviceOrientation, VideoOrientation};
use crate::permissions::{AuthorizationProvider, PermissionKind};
use crate::queue::SessionQueue;
use crate::session::{CaptureSession, DeviceInput, InputFactory, SessionPreset};
use std::sync::{Arc, Mutex, MutexGuard};

/// Platform collaborators the engine is built from.
pub struct EngineParts {
    pub session: Box<dyn CaptureSession>,
    pub authorization: Arc<dyn AuthorizationProvider>,
    pub input_factory: Arc<dyn InputFactory>,
    pub catalog: Arc<dyn DeviceCatalog>,
}

struct EngineState {
    position: DevicePosition,
    camera: Option<SharedDevice>,
    microphone: Option<SharedDevice>,
    requests: Vec<PermissionKind>,
    preset: SessionPreset,
    focus_mode: FocusMode,
    zoom_factor: f64,
    torch_mode: TorchMode,
    flash_mode: FlashMode,
    rotation_follows_device: bool,
}

pub struct CaptureEngine {
    config: EngineConfig,
    queue: SharedSessionQueue,
    coordinator: DeviceAccessCoordinator,
    catalog: Arc<dyn DeviceCatalog>,
    state: Mutex<EngineState>,
}

impl CaptureEngine {
    pub fn new(config: EngineConfig, parts: EngineParts) -> Result<Self> {
        config.validate().map_err(EngineError::Config)?;

        let EngineParts {
            session,
            authorization,
            input_factory,
            catalog,
        } = parts;

        let queue = Arc::new(SessionQueue::new(
            config.session.queue_label.clone(),
            SessionContext::new(session),
        )?);
        let coordinator = DeviceAccessCoordinator::new(authorization, input_factory, queue.clone());

        let position = config.device.default_position;
        let camera = catalog.camera(position);
        let microphone = catalog.microphone();
        if camera.is_none() {
            log::warn!("No camera found at position {:?}", position);
        }

        let preset = config.session.preset;
        queue.dispatch(move |context| {
            let session = context.session.as_mut();
            if session.can_set_preset(preset) {
                session.begin_configuration();
                session.set_preset(preset);
                session.commit_configuration();
            } else {
                log::warn!("Configured preset {} is not supported, keeping session default", preset);
            }
        })?;

        let state = EngineState {
            position,
            camera,
            microphone,
            requests: config.permissions.requests.clone(),
            preset,
            focus_mode: config.device.focus,
            zoom_factor: 1.0,
            torch_mode: config.device.torch,
            flash_mode: FlashMode::Off,
            rotation_follows_device: config.device.rotation_follows_device,
        };

        log::info!("Capture engine created (queue '{}')", config.session.queue_label);

        let engine = Self {
            config,
            queue,
            coordinator,
            catalog,
            state: Mutex::new(state),
        };
        engine.apply_device_config();
        Ok(engine)
    }

    /// Push the configured focus, torch and flash onto the selected camera.
    /// Settings the camera cannot take are logged, never fatal.
    fn apply_device_config(&self) {
        let settings = self.config.device.clone();

        if let Some(device) = self.capture_device() {
            let current = device.settings().focus_mode;
            if !device.capabilities().supports_focus(settings.focus) {
                log::warn!(
                    "Configured focus mode {} not supported by {}",
                    settings.focus.description(),
                    device.descriptor().id
                );
                self.state().focus_mode = current;
            } else if current != settings.focus {
                if let Err(e) = self.set_focus_mode(settings.focus) {
                    log::warn!("Could not apply configured focus mode: {}", e);
                    self.state().focus_mode = current;
                }
            }
        }

        if let Err(e) = self.set_torch_mode(settings.torch) {
            log::warn!("Could not apply configured torch mode: {}", e);
            if let Some(device) = self.capture_device() {
                self.state().torch_mode = device.settings().torch_mode;
            }
        }

        if !self.set_flash_mode(settings.flash) && settings.flash != FlashMode::Off {
            log::warn!("Configured flash mode ignored, current camera has no flash");
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &DeviceAccessCoordinator {
        &self.coordinator
    }

    /// Whether the caller is running on the session queue.
    pub fn is_on_session_queue(&self) -> bool {
        self.queue.is_current()
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // Session lifecycle

    /// Negotiate access for each of `requests`, configure outputs and start
    /// the session. The returned negotiations are in request order; kinds
    /// without a device are skipped.
    pub fn start_session_with(&self, requests: &[PermissionKind]) -> Result<Vec<Negotiation>> {
        self.state().requests = requests.to_vec();

        let mut negotiations = Vec::with_capacity(requests.len());
        for &kind in requests {
            match self.device_for(kind) {
                Some(device) => negotiations.push(self.coordinator.negotiate(kind, device)),
                None => log::warn!("No {} device available, skipping negotiation", kind),
            }
        }

        self.queue.dispatch(|context| context.session.configure_outputs())?;
        self.start_session()?;
        Ok(negotiations)
    }

    pub fn start_session(&self) -> Result<()> {
        self.queue.dispatch(|context| {
            log::info!("Starting capture session");
            context.session.start_running();
        })
    }

    pub fn stop_session(&self) -> Result<()> {
        self.queue.dispatch(|context| {
            log::info!("Stopping capture session");
            context.session.stop_running();
        })
    }

    pub fn is_running(&self) -> Result<bool> {
        self.queue.dispatch_sync(|context| context.session.is_running())
    }

    /// Inputs currently visible on the session.
    pub fn session_inputs(&self) -> Result<Vec<DeviceInput>> {
        self.queue.dispatch_sync(|context| context.session.inputs())
    }

    /// Input the engine attached for `kind`, if any.
    pub fn attached_input(&self, kind: PermissionKind) -> Result<Option<DeviceInput>> {
        self.queue
            .dispatch_sync(move |context| context.inputs.get(kind).cloned())
    }

    /// Stop the session and join the session queue.
    pub fn shutdown(&self) -> Result<()> {
        if self.queue.is_closed() {
            return Ok(());
        }
        self.stop_session()?;
        self.queue.shutdown(self.config.shutdown_timeout())?;
        log::info!("Capture engine shut down");
        Ok(())
    }

    // Device access

    pub fn permission_requests(&self) -> Vec<PermissionKind> {
        self.state().requests.clone()
    }

    /// Open a negotiation for the current device of `kind`.
    pub fn negotiate(&self, kind: PermissionKind) -> Result<Negotiation> {
        let device = self.device_for(kind).ok_or(EngineError::NoCurrentDevice)?;
        Ok(self.coordinator.negotiate(kind, device))
    }

    fn device_for(&self, kind: PermissionKind) -> Option<SharedDevice> {
        let state = self.state();
        match kind {
            PermissionKind::Camera => state.camera.clone(),
            PermissionKind::Microphone => state.microphone.clone(),
        }
    }

    // Device selection

    pub fn capture_device(&self) -> Option<SharedDevice> {
        self.state().camera.clone()
    }

    pub fn current_position(&self) -> DevicePosition {
        self.state().position
    }

    /// Select the camera at `position` and, when cameras are among the
    /// permission requests, open a negotiation to attach it.
    pub fn change_device_position(&self, position: DevicePosition) -> Result<Option<Negotiation>> {
        let camera = self.catalog.camera(position);
        let negotiate = {
            let mut state = self.state();
            state.position = position;
            state.camera = camera.clone();
            state.requests.contains(&PermissionKind::Camera)
        };

        log::info!("Camera position changed to {:?}", position);

        match camera {
            Some(device) if negotiate => Ok(Some(self.coordinator.negotiate(PermissionKind::Camera, device))),
            Some(_) => Ok(None),
            None => Err(EngineError::NoCurrentDevice),
        }
    }

    /// Toggle between back and front cameras.
    pub fn switch_device(&self) -> Result<Option<Negotiation>> {
        let position = self.current_position().toggle();
        self.change_device_position(position)
    }

    // Session preset

    pub fn session_preset(&self) -> SessionPreset {
        self.state().preset
    }

    pub fn set_session_preset(&self, preset: SessionPreset) -> Result<()> {
        let applied = self.queue.dispatch_sync(move |context| {
            let session = context.session.as_mut();
            if !session.can_set_preset(preset) {
                return false;
            }
            session.begin_configuration();
            session.set_preset(preset);
            session.commit_configuration();
            true
        })?;

        if !applied {
            return Err(EngineError::PresetUnsupported(preset));
        }
        self.state().preset = preset;
        Ok(())
    }

    pub fn compatible_session_presets(&self) -> Result<Vec<SessionPreset>> {
        self.queue.dispatch_sync(|context| {
            SessionPreset::available()
                .into_iter()
                .filter(|p| context.session.can_set_preset(*p))
                .collect()
        })
    }

    // Focus and exposure

    pub fn focus_mode(&self) -> FocusMode {
        self.state().focus_mode
    }

    pub fn compatible_focus_modes(&self) -> Vec<FocusMode> {
        match self.capture_device() {
            Some(device) => {
                let capabilities = device.capabilities();
                FocusMode::ALL
                    .into_iter()
                    .filter(|m| capabilities.supports_focus(*m))
                    .collect()
            }
            None => Vec::new(),
        }
    }

    /// Apply `mode` to the current camera. Without a camera the mode is only
    /// remembered.
    pub fn set_focus_mode(&self, mode: FocusMode) -> Result<()> {
        if let Some(device) = self.capture_device() {
            if !device.capabilities().supports_focus(mode) {
                return Err(EngineError::invalid_argument(format!(
                    "focus mode {} not supported by {}",
                    mode.description(),
                    device.descriptor().id
                )));
            }
            device::configure(device.as_ref(), |settings| settings.focus_mode = mode)?;
        }
        self.state().focus_mode = mode;
        Ok(())
    }

    /// Focus and expose at `point` (normalized device coordinates).
    ///
    /// Returns `false` when the device supports neither point of interest.
    pub fn focus_at(&self, point: DevicePoint) -> Result<bool> {
        if !point.is_normalized() {
            return Err(EngineError::invalid_argument(format!(
                "point ({}, {}) is outside the unit square",
                point.x, point.y
            )));
        }
        let device = self.capture_device().ok_or(EngineError::NoCurrentDevice)?;
        let capabilities = device.capabilities();

        let perform_focus =
            capabilities.supports_focus(FocusMode::AutoFocus) && capabilities.focus_point_of_interest;
        let perform_exposure = capabilities.supports_exposure(ExposureMode::AutoExpose)
            && capabilities.exposure_point_of_interest;
        if !perform_focus && !perform_exposure {
            return Ok(false);
        }

        let applied = device::configure(device.as_ref(), |settings| {
            if perform_focus {
                settings.focus_point = Some(point);
                settings.focus_mode = if settings.focus_mode == FocusMode::Locked {
                    FocusMode::AutoFocus
                } else {
                    FocusMode::ContinuousAutoFocus
                };
            }
            if perform_exposure {
                settings.exposure_point = Some(point);
                settings.exposure_mode = if settings.exposure_mode == ExposureMode::Locked {
                    ExposureMode::AutoExpose
                } else {
                    ExposureMode::ContinuousAutoExposure
                };
            }
        })?;

        if perform_focus {
            self.state().focus_mode = applied.focus_mode;
        }
        Ok(true)
    }

    pub fn is_adjusting_focus(&self) -> bool {
        self.capture_device().is_some_and(|d| d.adjustment().focus)
    }

    pub fn is_adjusting_exposure(&self) -> bool {
        self.capture_device().is_some_and(|d| d.adjustment().exposure)
    }

    pub fn is_adjusting_white_balance(&self) -> bool {
        self.capture_device().is_some_and(|d| d.adjustment().white_balance)
    }

    // Zoom

    /// Current zoom factor, read from the camera when there is one.
    pub fn zoom_factor(&self) -> f64 {
        match self.capture_device() {
            Some(device) => {
                let zoom = device.settings().zoom_factor;
                self.state().zoom_factor = zoom;
                zoom
            }
            None => self.state().zoom_factor,
        }
    }

    /// Set the zoom factor, clamped to what the camera supports. Returns the
    /// factor actually applied.
    pub fn set_zoom_factor(&self, factor: f64) -> Result<f64> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(EngineError::invalid_argument(format!("invalid zoom factor {factor}")));
        }
        let device = self.capture_device().ok_or(EngineError::NoCurrentDevice)?;
        let max = device.capabilities().max_zoom_factor.max(1.0);
        let zoom = factor.clamp(1.0, max);

        device::configure(device.as_ref(), |settings| settings.zoom_factor = zoom)?;
        self.state().zoom_factor = zoom;
        Ok(zoom)
    }

    // Torch and flash

    pub fn torch_mode(&self) -> TorchMode {
        self.state().torch_mode
    }

    /// Remember `mode` and apply it when the camera has a torch in a different mode.
    pub fn set_torch_mode(&self, mode: TorchMode) -> Result<()> {
        self.state().torch_mode = mode;
        if let Some(device) = self.capture_device() {
            if device.capabilities().torch_available && device.settings().torch_mode != mode {
                device::configure(device.as_ref(), |settings| settings.torch_mode = mode)?;
            }
        }
        Ok(())
    }

    /// Flash mode used for the next photo capture.
    pub fn flash_mode(&self) -> FlashMode {
        self.state().flash_mode
    }

    /// Only takes effect on cameras with a flash; returns whether it did.
    pub fn set_flash_mode(&self, mode: FlashMode) -> bool {
        let available = self
            .capture_device()
            .is_some_and(|d| d.capabilities().flash_available);
        if available {
            self.state().flash_mode = mode;
        }
        available
    }

    // Orientation

    pub fn rotation_follows_device(&self) -> bool {
        self.state().rotation_follows_device
    }

    pub fn set_rotation_follows_device(&self, enabled: bool) {
        self.state().rotation_follows_device = enabled;
    }

    /// Preview orientation for the given device orientation; fixed to
    /// portrait unless rotation follows the device.
    pub fn preview_orientation(&self, orientation: DeviceOrientation) -> VideoOrientation {
        if self.rotation_follows_device() {
            VideoOrientation::from_device_orientation(orientation)
        } else {
            VideoOrientation::Portrait
        }
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::warn!("Error shutting down capture engine in drop: {}", e);
        }
    }
}
