//! Collaborator boundary
//!
//! The engine hands nudge actions to a presentation collaborator and nudge
//! records to a storage collaborator. Both are best-effort: a failure is logged by
//! the engine and never changes or delays the decision.

use crate::config::DEFAULT_NUDGE_HISTORY_CAPACITY;
use crate::error::SinkError;
use crate::types::{NudgeAction, NudgeLogRecord};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::mpsc::Sender;

/// Receives nudge actions for display
pub trait NudgePresenter {
    fn present(&mut self, action: &NudgeAction) -> Result<(), SinkError>;
}

/// Receives nudge records for persistence
pub trait NudgeLogSink {
    fn append(&mut self, record: NudgeLogRecord) -> Result<(), SinkError>;
}

impl<T: NudgePresenter + ?Sized> NudgePresenter for Rc<RefCell<T>> {
    fn present(&mut self, action: &NudgeAction) -> Result<(), SinkError> {
        self.borrow_mut().present(action)
    }
}

impl<T: NudgeLogSink + ?Sized> NudgeLogSink for Rc<RefCell<T>> {
    fn append(&mut self, record: NudgeLogRecord) -> Result<(), SinkError> {
        self.borrow_mut().append(record)
    }
}

/// Presenter that only logs
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPresenter;

impl NudgePresenter for NoopPresenter {
    fn present(&mut self, action: &NudgeAction) -> Result<(), SinkError> {
        log::debug!("No presenter attached, dropping level {} action", action.level().as_u8());
        Ok(())
    }
}

/// Nudge log that only logs
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNudgeLog;

impl NudgeLogSink for NoopNudgeLog {
    fn append(&mut self, record: NudgeLogRecord) -> Result<(), SinkError> {
        log::debug!(
            "No nudge log attached, dropping record for {} (level {}, count {})",
            record.session_id,
            record.nudge_level,
            record.nudge_count
        );
        Ok(())
    }
}

/// Presenter that keeps every action it receives
#[derive(Debug, Clone, Default)]
pub struct RecordingPresenter {
    actions: Vec<NudgeAction>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actions(&self) -> &[NudgeAction] {
        &self.actions
    }

    pub fn take(&mut self) -> Vec<NudgeAction> {
        std::mem::take(&mut self.actions)
    }
}

impl NudgePresenter for RecordingPresenter {
    fn present(&mut self, action: &NudgeAction) -> Result<(), SinkError> {
        self.actions.push(action.clone());
        Ok(())
    }
}

/// Bounded in-memory nudge history, keeping the most recent records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NudgeHistory {
    records: VecDeque<NudgeLogRecord>,
    capacity: usize,
}

impl Default for NudgeHistory {
    fn default() -> Self {
        Self::new(DEFAULT_NUDGE_HISTORY_CAPACITY)
    }
}

impl NudgeHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, record: NudgeLogRecord) {
        self.records.push_back(record);
        while self.records.len() > self.capacity {
            self.records.pop_front();
        }
    }

    pub fn records(&self) -> impl Iterator<Item = &NudgeLogRecord> {
        self.records.iter()
    }

    pub fn latest(&self) -> Option<&NudgeLogRecord> {
        self.records.back()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Serialize the retained records as a JSON array
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.records)
    }

    /// Load records from a JSON array, keeping only the most recent `capacity`
    pub fn from_json(json: &str, capacity: usize) -> Result<Self, serde_json::Error> {
        let records: Vec<NudgeLogRecord> = serde_json::from_str(json)?;
        let mut history = Self::new(capacity);
        for record in records {
            history.push(record);
        }
        Ok(history)
    }
}

impl NudgeLogSink for NudgeHistory {
    fn append(&mut self, record: NudgeLogRecord) -> Result<(), SinkError> {
        self.push(record);
        Ok(())
    }
}

/// Fire-and-forget log that hands records to another thread
#[derive(Debug, Clone)]
pub struct ChannelNudgeLog {
    sender: Sender<NudgeLogRecord>,
}

impl ChannelNudgeLog {
    pub fn new(sender: Sender<NudgeLogRecord>) -> Self {
        Self { sender }
    }
}

impl NudgeLogSink for ChannelNudgeLog {
    fn append(&mut self, record: NudgeLogRecord) -> Result<(), SinkError> {
        self.sender.send(record).map_err(|_| SinkError::Disconnected)
    }
}
