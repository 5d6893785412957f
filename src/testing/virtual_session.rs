//! A capture session that lives entirely in memory.

use crate::session::{CaptureSession, DeviceInput, SessionPreset};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// One call made on a [`VirtualSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCall {
    BeginConfiguration,
    CommitConfiguration,
    AddInput(DeviceInput),
    RemoveInput(DeviceInput),
    ConfigureOutputs,
    SetPreset(SessionPreset),
    StartRunning,
    StopRunning,
}

impl SessionCall {
    /// Whether the call changes the session's input list.
    pub fn is_input_mutation(&self) -> bool {
        matches!(self, SessionCall::AddInput(_) | SessionCall::RemoveInput(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub call: SessionCall,
    /// Name of the thread the call was made on.
    pub thread: Option<String>,
}

/// Shared, append-only record of session calls. Clones see the same log.
#[derive(Debug, Clone, Default)]
pub struct SessionLog {
    inner: Arc<Mutex<Vec<RecordedCall>>>,
}

impl SessionLog {
    fn push(&self, call: SessionCall) {
        let thread = std::thread::current().name().map(str::to_string);
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(RecordedCall { call, thread });
    }

    pub fn records(&self) -> Vec<RecordedCall> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn calls(&self) -> Vec<SessionCall> {
        self.records().into_iter().map(|r| r.call).collect()
    }

    pub fn count_adds(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, SessionCall::AddInput(_)))
            .count()
    }

    pub fn count_removes(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, SessionCall::RemoveInput(_)))
            .count()
    }

    pub fn input_mutations(&self) -> usize {
        self.calls().iter().filter(|c| c.is_input_mutation()).count()
    }
}

/// In-memory [`CaptureSession`].
///
/// Input changes made inside a configuration bracket are staged and become
/// visible through [`inputs`](CaptureSession::inputs) only on the outermost
/// commit.
#[derive(Debug, Default)]
pub struct VirtualSession {
    committed: Vec<DeviceInput>,
    staged: Vec<DeviceInput>,
    depth: u32,
    rejected_devices: HashSet<String>,
    pending_rejections: Mutex<HashMap<String, usize>>,
    unsupported_presets: HashSet<SessionPreset>,
    preset: SessionPreset,
    running: bool,
    log: SessionLog,
}

impl VirtualSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `can_add_input` refuse inputs for `device_id`.
    pub fn rejecting_device(mut self, device_id: impl Into<String>) -> Self {
        self.rejected_devices.insert(device_id.into());
        self
    }

    /// Make `can_add_input` refuse the next input for `device_id` only.
    pub fn rejecting_device_once(self, device_id: impl Into<String>) -> Self {
        *self
            .pending_rejections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(device_id.into())
            .or_insert(0) += 1;
        self
    }

    pub fn without_preset(mut self, preset: SessionPreset) -> Self {
        self.unsupported_presets.insert(preset);
        self
    }

    pub fn log(&self) -> SessionLog {
        self.log.clone()
    }

    pub fn preset(&self) -> SessionPreset {
        self.preset
    }

    pub fn in_configuration(&self) -> bool {
        self.depth > 0
    }

    fn working_inputs(&mut self) -> &mut Vec<DeviceInput> {
        if self.depth > 0 {
            &mut self.staged
        } else {
            &mut self.committed
        }
    }
}

impl CaptureSession for VirtualSession {
    fn begin_configuration(&mut self) {
        self.log.push(SessionCall::BeginConfiguration);
        if self.depth == 0 {
            self.staged = self.committed.clone();
        }
        self.depth += 1;
    }

    fn commit_configuration(&mut self) {
        self.log.push(SessionCall::CommitConfiguration);
        match self.depth {
            0 => log::warn!("commit_configuration without matching begin_configuration"),
            1 => {
                self.depth = 0;
                self.committed = std::mem::take(&mut self.staged);
            }
            _ => self.depth -= 1,
        }
    }

    fn can_add_input(&self, input: &DeviceInput) -> bool {
        let current = if self.depth > 0 {
            &self.staged
        } else {
            &self.committed
        };
        if self.rejected_devices.contains(&input.device_id) || current.iter().any(|i| i.id == input.id) {
            return false;
        }

        let mut pending = self
            .pending_rejections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match pending.get_mut(&input.device_id) {
            Some(left) if *left > 0 => {
                *left -= 1;
                false
            }
            _ => true,
        }
    }

    fn add_input(&mut self, input: DeviceInput) {
        self.log.push(SessionCall::AddInput(input.clone()));
        self.working_inputs().push(input);
    }

    fn remove_input(&mut self, input: &DeviceInput) {
        self.log.push(SessionCall::RemoveInput(input.clone()));
        self.working_inputs().retain(|i| i.id != input.id);
    }

    fn inputs(&self) -> Vec<DeviceInput> {
        self.committed.clone()
    }

    fn configure_outputs(&mut self) {
        self.log.push(SessionCall::ConfigureOutputs);
    }

    fn can_set_preset(&self, preset: SessionPreset) -> bool {
        !self.unsupported_presets.contains(&preset)
    }

    fn set_preset(&mut self, preset: SessionPreset) {
        self.log.push(SessionCall::SetPreset(preset));
        self.preset = preset;
    }

    fn start_running(&mut self) {
        self.log.push(SessionCall::StartRunning);
        self.running = true;
    }

    fn stop_running(&mut self) {
        self.log.push(SessionCall::StopRunning);
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }
}
