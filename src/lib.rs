//! capture-engine: capture session management with device access negotiation
//!
//! This crate owns a capture session, attaches camera and microphone inputs
//! to it once the platform and the caller agree, and exposes the current
//! camera's focus, exposure, zoom, torch and flash controls.
//!
//! # Features
//! - Two-phase device access negotiation (report, then resume once)
//! - All session mutation on one serial session queue
//! - Camera input replacement and single microphone attachment
//! - Platform authorization queries (AVFoundation on macOS, device nodes on Linux)
//! - In-memory session and devices for offline use
//!
//! # Usage
//! ```rust,no_run
//! use capture_engine::testing::{StaticAuthorization, VirtualCatalog, VirtualInputFactory, VirtualSession};
//! use capture_engine::{CaptureEngine, EngineConfig, EngineParts, PermissionKind};
//! use std::sync::Arc;
//!
//! let engine = CaptureEngine::new(
//!     EngineConfig::default(),
//!     EngineParts {
//!         session: Box::new(VirtualSession::new()),
//!         authorization: Arc::new(StaticAuthorization::authorized()),
//!         input_factory: Arc::new(VirtualInputFactory::default()),
//!         catalog: Arc::new(VirtualCatalog::standard()),
//!     },
//! )?;
//!
//! for negotiation in engine.start_session_with(&[PermissionKind::Camera])? {
//!     let outcome = negotiation.resume_with_default()?.wait()?;
//!     println!("{}: {:?}", negotiation.result(), outcome);
//! }
//! # Ok::<(), capture_engine::EngineError>(())
//! ```
pub mod access;
pub mod config;
pub mod coordinator;
pub mod device;
pub mod engine;
pub mod errors;
pub mod negotiation;
pub mod orientation;
pub mod permissions;
pub mod queue;
pub mod session;

// Testing utilities - in-memory platform for offline testing
pub mod testing;

// Re-exports for convenience
pub use access::{classify_action, DeviceAccessAction, DeviceAccessResult, DeviceAccessState};
pub use config::EngineConfig;
pub use coordinator::DeviceAccessCoordinator;
pub use engine::{CaptureEngine, EngineParts};
pub use errors::{AccessError, EngineError};
pub use negotiation::{AccessOutcome, Completion, Negotiation, NegotiationPhase};
pub use permissions::{AuthorizationProvider, AuthorizationStatus, PermissionKind, SystemAuthorization};
pub use session::{CaptureSession, DeviceInput, InputFactory, SessionPreset};

/// Initialize logging for the capture engine
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "capture_engine=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn test_crate_info() {
        let info = get_info();
        assert_eq!(info.name, "capture-engine");
        assert!(!info.version.is_empty());
        assert!(!info.description.is_empty());
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging();
        init_logging();
    }
}
