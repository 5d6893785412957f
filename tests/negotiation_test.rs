//! Tests for device access negotiation against an in-memory session

use capture_engine::coordinator::{DeviceAccessCoordinator, SessionContext};
use capture_engine::device::DevicePosition;
use capture_engine::queue::SessionQueue;
use capture_engine::testing::{
    SessionCall, SessionLog, StaticAuthorization, VirtualCatalog, VirtualDevice, VirtualInputFactory,
    VirtualSession,
};
use capture_engine::{
    AccessError, AccessOutcome, AuthorizationStatus, CaptureEngine, DeviceAccessAction, DeviceAccessResult,
    DeviceAccessState, EngineConfig, EngineError, EngineParts, NegotiationPhase, PermissionKind,
};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    engine: CaptureEngine,
    log: SessionLog,
    authorization: Arc<StaticAuthorization>,
}

fn harness_with(session: VirtualSession, authorization: StaticAuthorization, factory: VirtualInputFactory) -> Harness {
    let log = session.log();
    let authorization = Arc::new(authorization);
    let engine = CaptureEngine::new(
        EngineConfig::default(),
        EngineParts {
            session: Box::new(session),
            authorization: authorization.clone(),
            input_factory: Arc::new(factory),
            catalog: Arc::new(VirtualCatalog::standard()),
        },
    )
    .unwrap();
    Harness {
        engine,
        log,
        authorization,
    }
}

fn harness(camera: AuthorizationStatus, microphone: AuthorizationStatus) -> Harness {
    harness_with(
        VirtualSession::new(),
        StaticAuthorization::new(camera, microphone),
        VirtualInputFactory::default(),
    )
}

fn installed(outcome: AccessOutcome) -> capture_engine::DeviceInput {
    match outcome {
        AccessOutcome::Installed(input) => input,
        other => panic!("expected installed input, got {other:?}"),
    }
}

#[cfg(test)]
mod camera_tests {
    use super::*;

    #[test]
    fn test_authorized_camera_is_attached_once() {
        let h = harness(AuthorizationStatus::Authorized, AuthorizationStatus::Authorized);

        let negotiation = h.engine.negotiate(PermissionKind::Camera).unwrap();
        assert_eq!(
            negotiation.result(),
            &DeviceAccessResult::camera(DeviceAccessState::Authorized)
        );
        assert_eq!(negotiation.suggested_action(), DeviceAccessAction::CanProceedAccessGranted);

        let input = installed(negotiation.resume_with_default().unwrap().wait().unwrap());

        assert_eq!(input.kind, PermissionKind::Camera);
        assert_eq!(h.engine.session_inputs().unwrap(), vec![input.clone()]);
        assert_eq!(h.engine.attached_input(PermissionKind::Camera).unwrap(), Some(input));
    }

    #[test]
    fn test_new_camera_replaces_previous_camera() {
        let h = harness(AuthorizationStatus::Authorized, AuthorizationStatus::Authorized);

        let back = installed(
            h.engine
                .negotiate(PermissionKind::Camera)
                .unwrap()
                .resume_with_default()
                .unwrap()
                .wait()
                .unwrap(),
        );

        let switched = h.engine.switch_device().unwrap().expect("camera renegotiation");
        let front = installed(switched.resume_with_default().unwrap().wait().unwrap());

        assert_eq!(h.engine.current_position(), DevicePosition::Front);
        assert_eq!(front.device_id, "virtual-front-camera");
        let inputs = h.engine.session_inputs().unwrap();
        assert_eq!(inputs, vec![front]);
        assert!(h.log.calls().contains(&SessionCall::RemoveInput(back)));
    }

    #[test]
    fn test_rejected_camera_keeps_previous_input() {
        let h = harness_with(
            VirtualSession::new().rejecting_device("virtual-front-camera"),
            StaticAuthorization::authorized(),
            VirtualInputFactory::default(),
        );

        let back = installed(
            h.engine
                .negotiate(PermissionKind::Camera)
                .unwrap()
                .resume_with_default()
                .unwrap()
                .wait()
                .unwrap(),
        );
        let adds_before = h.log.count_adds();

        let switched = h.engine.switch_device().unwrap().unwrap();
        let outcome = switched.resume_with_default().unwrap().wait().unwrap();

        assert_eq!(
            outcome,
            AccessOutcome::Failed(DeviceAccessResult::camera(DeviceAccessState::UnableToAdd(
                PermissionKind::Camera
            )))
        );
        assert_eq!(h.log.count_adds(), adds_before);
        assert_eq!(h.log.count_removes(), 0);
        assert_eq!(h.engine.session_inputs().unwrap(), vec![back.clone()]);
        assert_eq!(h.engine.attached_input(PermissionKind::Camera).unwrap(), Some(back));
    }

    #[test]
    fn test_input_construction_failure_is_reported() {
        let h = harness_with(
            VirtualSession::new(),
            StaticAuthorization::authorized(),
            VirtualInputFactory::default().failing_for("virtual-back-camera", "device is in use"),
        );

        let outcome = h
            .engine
            .negotiate(PermissionKind::Camera)
            .unwrap()
            .resume_with_default()
            .unwrap()
            .wait()
            .unwrap();

        assert_eq!(
            outcome,
            AccessOutcome::Failed(DeviceAccessResult::camera(DeviceAccessState::Other(
                "device is in use".into()
            )))
        );
        assert_eq!(h.log.input_mutations(), 0);
        assert!(h.engine.session_inputs().unwrap().is_empty());
        assert_eq!(
            outcome.error(),
            Some(AccessError::InputConstructionFailed("device is in use".into()))
        );
    }

    #[test]
    fn test_unreachable_platform_is_reported_as_other() {
        let h = harness_with(
            VirtualSession::new(),
            StaticAuthorization::authorized().unreachable_platform("AVFoundation not available"),
            VirtualInputFactory::default(),
        );

        let negotiation = h.engine.negotiate(PermissionKind::Camera).unwrap();
        let state = &negotiation.result().state;
        assert_eq!(state, &DeviceAccessState::Other("AVFoundation not available".into()));
        assert_eq!(
            state.to_error(),
            Some(AccessError::UnknownPlatformError("AVFoundation not available".into()))
        );

        let action = negotiation.suggested_action();
        assert_eq!(
            action,
            DeviceAccessAction::UnexpectedError("AVFoundation not available".into())
        );
        let outcome = negotiation.resume(action.clone()).unwrap().wait().unwrap();
        assert_eq!(outcome, AccessOutcome::Skipped(action));
        assert_eq!(outcome.error(), None);
        assert_eq!(h.log.input_mutations(), 0);
    }
}

#[cfg(test)]
mod microphone_tests {
    use super::*;

    #[test]
    fn test_second_microphone_negotiation_is_unable_to_add() {
        let h = harness(AuthorizationStatus::Authorized, AuthorizationStatus::Authorized);

        let first = h.engine.negotiate(PermissionKind::Microphone).unwrap();
        let mic = installed(first.resume_with_default().unwrap().wait().unwrap());

        let second = h.engine.negotiate(PermissionKind::Microphone).unwrap();
        assert_eq!(second.result().state, DeviceAccessState::Authorized);
        let outcome = second.resume_with_default().unwrap().wait().unwrap();

        assert_eq!(
            outcome,
            AccessOutcome::Failed(DeviceAccessResult::microphone(DeviceAccessState::UnableToAdd(
                PermissionKind::Microphone
            )))
        );
        let microphones: Vec<_> = h
            .engine
            .session_inputs()
            .unwrap()
            .into_iter()
            .filter(|i| i.kind == PermissionKind::Microphone)
            .collect();
        assert_eq!(microphones, vec![mic]);
    }
}

#[cfg(test)]
mod microphone_retry_tests {
    use super::*;

    #[test]
    fn test_refused_microphone_leaves_slot_free() {
        let h = harness_with(
            VirtualSession::new().rejecting_device_once("virtual-microphone"),
            StaticAuthorization::authorized(),
            VirtualInputFactory::default(),
        );

        let refused = h
            .engine
            .negotiate(PermissionKind::Microphone)
            .unwrap()
            .resume_with_default()
            .unwrap()
            .wait()
            .unwrap();
        assert_eq!(
            refused,
            AccessOutcome::Failed(DeviceAccessResult::microphone(DeviceAccessState::UnableToAdd(
                PermissionKind::Microphone
            )))
        );
        assert_eq!(h.engine.attached_input(PermissionKind::Microphone).unwrap(), None);

        let mic = installed(
            h.engine
                .negotiate(PermissionKind::Microphone)
                .unwrap()
                .resume_with_default()
                .unwrap()
                .wait()
                .unwrap(),
        );

        assert_eq!(
            h.engine.attached_input(PermissionKind::Microphone).unwrap(),
            Some(mic.clone())
        );
        assert_eq!(h.engine.session_inputs().unwrap(), vec![mic]);
        assert_eq!(h.log.count_adds(), 1);
    }
}

#[cfg(test)]
mod resume_tests {
    use super::*;

    #[test]
    fn test_denied_then_settings_change_never_mutates() {
        let h = harness(AuthorizationStatus::Denied, AuthorizationStatus::Denied);

        for kind in PermissionKind::ALL {
            let negotiation = h.engine.negotiate(kind).unwrap();
            assert_eq!(negotiation.result().state, DeviceAccessState::Denied);
            let action = negotiation.suggested_action();
            assert_eq!(action, DeviceAccessAction::SettingsChangeRequired);

            let outcome = negotiation.resume(action.clone()).unwrap().wait().unwrap();
            assert_eq!(outcome, AccessOutcome::Skipped(action));
        }

        // Flush the queue before inspecting the log.
        assert!(!h.engine.is_running().unwrap());
        assert_eq!(h.log.input_mutations(), 0);
        assert!(h.engine.session_inputs().unwrap().is_empty());
    }

    #[test]
    fn test_non_proceeding_actions_leave_existing_inputs() {
        let h = harness(AuthorizationStatus::Authorized, AuthorizationStatus::Authorized);
        let camera = installed(
            h.engine
                .negotiate(PermissionKind::Camera)
                .unwrap()
                .resume_with_default()
                .unwrap()
                .wait()
                .unwrap(),
        );

        for action in [
            DeviceAccessAction::SettingsChangeRequired,
            DeviceAccessAction::UnexpectedError("whatever".into()),
            DeviceAccessAction::RunningOnSimulator,
        ] {
            let negotiation = h.engine.negotiate(PermissionKind::Camera).unwrap();
            let outcome = negotiation.resume(action.clone()).unwrap().wait().unwrap();
            assert_eq!(outcome, AccessOutcome::Skipped(action));
        }

        assert_eq!(h.engine.session_inputs().unwrap(), vec![camera]);
    }

    #[test]
    fn test_resume_at_most_once() {
        let h = harness(AuthorizationStatus::Authorized, AuthorizationStatus::Authorized);
        let negotiation = h.engine.negotiate(PermissionKind::Camera).unwrap();
        assert_eq!(negotiation.phase(), NegotiationPhase::Pending);

        let completion = negotiation.resume_with_default().unwrap();
        assert_eq!(negotiation.phase(), NegotiationPhase::Resumed);
        assert!(matches!(
            negotiation.resume_with_default(),
            Err(EngineError::AlreadyResumed)
        ));
        assert!(!negotiation.abandon());

        completion.wait().unwrap();
        assert_eq!(h.log.count_adds(), 1);
    }

    #[test]
    fn test_abandoned_negotiation_cannot_resume() {
        let h = harness(AuthorizationStatus::Authorized, AuthorizationStatus::Authorized);
        let negotiation = h.engine.negotiate(PermissionKind::Microphone).unwrap();

        assert!(negotiation.abandon());
        assert_eq!(negotiation.phase(), NegotiationPhase::Abandoned);
        assert!(matches!(
            negotiation.resume(DeviceAccessAction::CanProceedAccessGranted),
            Err(EngineError::AlreadyResumed)
        ));
        assert!(h.engine.session_inputs().unwrap().is_empty());
    }

    #[test]
    fn test_resume_from_another_thread_mutates_on_session_queue() {
        let h = harness(AuthorizationStatus::Authorized, AuthorizationStatus::Authorized);
        let negotiation = Arc::new(h.engine.negotiate(PermissionKind::Camera).unwrap());

        let n = negotiation.clone();
        let outcome = std::thread::Builder::new()
            .name("ui-thread".to_string())
            .spawn(move || n.resume_with_default().unwrap().wait().unwrap())
            .unwrap()
            .join()
            .unwrap();
        installed(outcome);

        let label = h.engine.config().session.queue_label.clone();
        for record in h.log.records() {
            assert_eq!(record.thread.as_deref(), Some(label.as_str()), "{:?}", record.call);
        }
    }

    #[test]
    fn test_first_time_access_prompts_then_attaches() {
        let h = harness(AuthorizationStatus::NotDetermined, AuthorizationStatus::NotDetermined);
        let negotiation = h.engine.negotiate(PermissionKind::Camera).unwrap();
        assert_eq!(negotiation.suggested_action(), DeviceAccessAction::CanPerformFirstTimeAccess);

        let input = installed(negotiation.resume_with_default().unwrap().wait().unwrap());

        assert_eq!(h.authorization.prompts(), 1);
        assert_eq!(h.engine.session_inputs().unwrap(), vec![input]);
    }

    #[test]
    fn test_first_time_access_refused_at_prompt() {
        let h = harness_with(
            VirtualSession::new(),
            StaticAuthorization::new(AuthorizationStatus::NotDetermined, AuthorizationStatus::Authorized)
                .denying_prompts(),
            VirtualInputFactory::default(),
        );
        let negotiation = h.engine.negotiate(PermissionKind::Camera).unwrap();

        let outcome = negotiation.resume_with_default().unwrap().wait().unwrap();

        assert_eq!(
            outcome,
            AccessOutcome::Failed(DeviceAccessResult::camera(DeviceAccessState::Denied))
        );
        assert_eq!(outcome.error(), Some(AccessError::PermissionDenied));
        assert_eq!(h.log.input_mutations(), 0);
    }

    #[test]
    fn test_resume_after_shutdown_fails() {
        let h = harness(AuthorizationStatus::Authorized, AuthorizationStatus::Authorized);
        let negotiation = h.engine.negotiate(PermissionKind::Camera).unwrap();
        h.engine.shutdown().unwrap();

        assert!(matches!(
            negotiation.resume_with_default(),
            Err(EngineError::QueueClosed)
        ));
    }

    #[test]
    fn test_wait_timeout_returns_outcome() {
        let h = harness(AuthorizationStatus::Authorized, AuthorizationStatus::Authorized);
        let completion = h
            .engine
            .negotiate(PermissionKind::Microphone)
            .unwrap()
            .resume_with_default()
            .unwrap();

        let outcome = completion.wait_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(outcome, Some(AccessOutcome::Installed(_))));
    }

    #[test]
    fn test_wait_timeout_while_queue_is_busy() {
        let queue = Arc::new(
            SessionQueue::new("busy-session", SessionContext::new(Box::new(VirtualSession::new())))
                .unwrap(),
        );
        let coordinator = DeviceAccessCoordinator::new(
            Arc::new(StaticAuthorization::authorized()),
            Arc::new(VirtualInputFactory::default()),
            queue.clone(),
        );
        let (release, gate) = std::sync::mpsc::channel::<()>();
        queue
            .dispatch(move |_| {
                let _ = gate.recv();
            })
            .unwrap();

        let negotiation = coordinator.negotiate(
            PermissionKind::Camera,
            VirtualDevice::back_camera().shared(),
        );
        let completion = negotiation.resume_with_default().unwrap();

        assert_eq!(completion.wait_timeout(Duration::from_millis(20)).unwrap(), None);
        assert_eq!(completion.try_outcome().unwrap(), None);

        release.send(()).unwrap();
        let outcome = completion.wait_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(outcome, Some(AccessOutcome::Installed(_))));
    }

    #[tokio::test]
    async fn test_outcome_can_be_awaited() {
        let h = harness(AuthorizationStatus::Authorized, AuthorizationStatus::Authorized);
        let completion = h
            .engine
            .negotiate(PermissionKind::Microphone)
            .unwrap()
            .resume_with_default()
            .unwrap();

        let outcome = completion.outcome().await.unwrap();
        assert_eq!(installed(outcome).kind, PermissionKind::Microphone);
    }
}
