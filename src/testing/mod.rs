//! Testing utilities for the capture engine
//!
//! In-memory stand-ins for the platform: a capture session that records
//! every call made to it, scriptable devices, a fixed authorization source
//! and an input factory that can be told to fail. They allow exercising the
//! whole engine offline, without camera hardware or OS permission prompts.

pub mod virtual_device;
pub mod virtual_session;

pub use virtual_device::{StaticAuthorization, VirtualCatalog, VirtualDevice, VirtualInputFactory};
pub use virtual_session::{RecordedCall, SessionCall, SessionLog, VirtualSession};
