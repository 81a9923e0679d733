use std::sync::mpsc::Sender;

use crate::domain::{DatasetProcessingStatus, DatasetState};
use crate::error::CurtainError;

// Called from worker threads. One dataset's transitions arrive in order.
pub trait StatusSink: Send + Sync {
    fn status(&self, status: &DatasetProcessingStatus);
}

impl<F> StatusSink for F
where
    F: Fn(&DatasetProcessingStatus) + Send + Sync,
{
    fn status(&self, status: &DatasetProcessingStatus) {
        self(status)
    }
}

pub struct ChannelSink {
    sender: Sender<DatasetProcessingStatus>,
}

impl ChannelSink {
    pub fn new(sender: Sender<DatasetProcessingStatus>) -> Self {
        Self { sender }
    }
}

impl StatusSink for ChannelSink {
    fn status(&self, status: &DatasetProcessingStatus) {
        let _ = self.sender.send(status.clone());
    }
}

pub struct NoopSink;

impl StatusSink for NoopSink {
    fn status(&self, _status: &DatasetProcessingStatus) {}
}

pub struct StatusTracker<'a> {
    status: DatasetProcessingStatus,
    sink: &'a dyn StatusSink,
}

impl<'a> StatusTracker<'a> {
    pub fn new(id: &str, dataset_name: &str, sink: &'a dyn StatusSink) -> Self {
        let tracker = Self {
            status: DatasetProcessingStatus {
                id: id.to_string(),
                dataset_name: dataset_name.to_string(),
                state: DatasetState::Pending,
                error: None,
            },
            sink,
        };
        tracker.sink.status(&tracker.status);
        tracker
    }

    pub fn state(&self) -> DatasetState {
        self.status.state
    }

    pub fn status(&self) -> &DatasetProcessingStatus {
        &self.status
    }

    pub fn set_dataset_name(&mut self, name: &str) {
        self.status.dataset_name = name.to_string();
    }

    pub fn advance(&mut self, next: DatasetState) -> Result<(), CurtainError> {
        if next == DatasetState::Failed {
            return Err(self.invalid(next));
        }
        self.transition(next, None)
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), CurtainError> {
        self.transition(DatasetState::Failed, Some(message.into()))
    }

    pub fn into_status(self) -> DatasetProcessingStatus {
        self.status
    }

    fn transition(
        &mut self,
        next: DatasetState,
        error: Option<String>,
    ) -> Result<(), CurtainError> {
        if !self.status.state.can_advance_to(next) {
            return Err(self.invalid(next));
        }
        self.status.state = next;
        self.status.error = error;
        self.sink.status(&self.status);
        Ok(())
    }

    fn invalid(&self, next: DatasetState) -> CurtainError {
        CurtainError::InvalidTransition {
            link_id: self.status.id.clone(),
            from: self.status.state.to_string(),
            to: next.to_string(),
        }
    }
}
