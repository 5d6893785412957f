//! Device access coordination: reports the authorization state of an input
//! and, once the caller resumes, attaches the input to the session.

use crate::access::{DeviceAccessAction, DeviceAccessResult, DeviceAccessState};
use crate::device::{CaptureDevice, SharedDevice};
use crate::errors::Result;
use crate::negotiation::{AccessOutcome, Negotiation};
use crate::permissions::{AuthorizationProvider, AuthorizationStatus, PermissionKind};
use crate::queue::SessionQueue;
use crate::session::{CaptureSession, DeviceInput, InputFactory};
use crossbeam_channel::Sender;
use std::sync::Arc;

/// The inputs the engine has attached, at most one per kind.
#[derive(Debug, Default, Clone)]
pub struct InputSlots {
    camera: Option<DeviceInput>,
    microphone: Option<DeviceInput>,
}

impl InputSlots {
    pub fn get(&self, kind: PermissionKind) -> Option<&DeviceInput> {
        match kind {
            PermissionKind::Camera => self.camera.as_ref(),
            PermissionKind::Microphone => self.microphone.as_ref(),
        }
    }

    fn slot_mut(&mut self, kind: PermissionKind) -> &mut Option<DeviceInput> {
        match kind {
            PermissionKind::Camera => &mut self.camera,
            PermissionKind::Microphone => &mut self.microphone,
        }
    }
}

/// Everything owned by the session queue worker.
pub struct SessionContext {
    pub session: Box<dyn CaptureSession>,
    pub inputs: InputSlots,
}

impl SessionContext {
    pub fn new(session: Box<dyn CaptureSession>) -> Self {
        Self {
            session,
            inputs: InputSlots::default(),
        }
    }
}

pub type SharedSessionQueue = Arc<SessionQueue<SessionContext>>;

pub struct DeviceAccessCoordinator {
    authorization: Arc<dyn AuthorizationProvider>,
    factory: Arc<dyn InputFactory>,
    queue: SharedSessionQueue,
}

impl DeviceAccessCoordinator {
    pub fn new(
        authorization: Arc<dyn AuthorizationProvider>,
        factory: Arc<dyn InputFactory>,
        queue: SharedSessionQueue,
    ) -> Self {
        Self {
            authorization,
            factory,
            queue,
        }
    }

    pub fn authorization(&self) -> &dyn AuthorizationProvider {
        self.authorization.as_ref()
    }

    /// Snapshot the authorization for `kind` and open a negotiation for
    /// attaching `device`. Nothing touches the session until the returned
    /// negotiation is resumed with a proceeding action.
    pub fn negotiate(&self, kind: PermissionKind, device: SharedDevice) -> Negotiation {
        let result = DeviceAccessResult::new(kind, self.authorization.access_state(kind));
        log::info!(
            "Device access for {} ({}): {}",
            kind,
            device.descriptor().id,
            result.state
        );

        Negotiation::new(
            result,
            PendingAttach {
                kind,
                device,
                authorization: self.authorization.clone(),
                factory: self.factory.clone(),
                queue: self.queue.clone(),
            },
        )
    }
}

/// Session mutation held by a pending negotiation.
pub(crate) struct PendingAttach {
    kind: PermissionKind,
    device: SharedDevice,
    authorization: Arc<dyn AuthorizationProvider>,
    factory: Arc<dyn InputFactory>,
    queue: SharedSessionQueue,
}

impl PendingAttach {
    /// Re-enter the session queue and attach the input there.
    ///
    /// On first-time access the platform prompt is shown from the queue
    /// before the input is created.
    pub(crate) fn run(self, action: DeviceAccessAction, done: Sender<AccessOutcome>) -> Result<()> {
        let PendingAttach {
            kind,
            device,
            authorization,
            factory,
            queue,
        } = self;

        queue.dispatch(move |context| {
            let outcome = match prompt_if_needed(authorization.as_ref(), kind, &action) {
                Some(refused) => refused,
                None => attach_input(context, factory.as_ref(), device.as_ref(), kind),
            };
            let _ = done.send(outcome);
        })
    }
}

/// Prompt for access when the caller proceeds with first-time access.
/// Returns the failure outcome when access is still not granted afterwards.
fn prompt_if_needed(
    authorization: &dyn AuthorizationProvider,
    kind: PermissionKind,
    action: &DeviceAccessAction,
) -> Option<AccessOutcome> {
    if *action != DeviceAccessAction::CanPerformFirstTimeAccess
        || authorization.authorization_status(kind) != AuthorizationStatus::NotDetermined
    {
        return None;
    }

    if authorization.request_access(kind) {
        return None;
    }

    let state = DeviceAccessState::from(authorization.authorization_status(kind));
    log::warn!("{} access not granted after prompt: {}", kind, state);
    Some(AccessOutcome::Failed(DeviceAccessResult::new(kind, state)))
}

/// Attach an input for `device` to the session in `context`.
///
/// Cameras replace the previously attached camera. A microphone is attached
/// once; while one is attached further attempts report `UnableToAdd`.
pub(crate) fn attach_input(
    context: &mut SessionContext,
    factory: &dyn InputFactory,
    device: &dyn CaptureDevice,
    kind: PermissionKind,
) -> AccessOutcome {
    if kind == PermissionKind::Microphone && context.inputs.get(kind).is_some() {
        log::warn!("Microphone input already attached, not adding another");
        return AccessOutcome::Failed(DeviceAccessResult::new(
            kind,
            DeviceAccessState::UnableToAdd(kind),
        ));
    }

    let input = match factory.make_input(device) {
        Ok(input) => input,
        Err(message) => {
            log::warn!("Could not create {} input for {}: {}", kind, device.descriptor().id, message);
            return AccessOutcome::Failed(DeviceAccessResult::new(
                kind,
                DeviceAccessState::Other(message),
            ));
        }
    };

    let session = context.session.as_mut();
    session.begin_configuration();

    if !session.can_add_input(&input) {
        session.commit_configuration();
        log::warn!("Session rejected {} input for {}", kind, input.device_id);
        return AccessOutcome::Failed(DeviceAccessResult::new(
            kind,
            DeviceAccessState::UnableToAdd(kind),
        ));
    }

    let slot = context.inputs.slot_mut(kind);
    if let Some(previous) = slot.take() {
        log::debug!("Replacing {} input {}", kind, previous.device_id);
        session.remove_input(&previous);
    }
    session.add_input(input.clone());
    *slot = Some(input.clone());
    session.commit_configuration();

    log::info!("Attached {} input {}", kind, input.device_id);
    AccessOutcome::Installed(input)
}
