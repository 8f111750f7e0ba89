// 📣 Pass Events - Informational notifications for a CLI/UI layer
//
// Observers never influence the pass. They only get told what happens.

use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    PassStarted { run_id: String },
    Progress(String),
    PassFinished { run_id: String, rows_written: usize, new_entries: usize },
}

pub trait SyncObserver {
    fn notify(&mut self, event: &SyncEvent);
}

/// Discards every event
pub struct NullObserver;

impl SyncObserver for NullObserver {
    fn notify(&mut self, _event: &SyncEvent) {}
}

/// Forwards events to the tracing subscriber
pub struct LogObserver;

impl SyncObserver for LogObserver {
    fn notify(&mut self, event: &SyncEvent) {
        match event {
            SyncEvent::PassStarted { run_id } => info!(%run_id, "reconciliation pass started"),
            SyncEvent::Progress(msg) => info!("{}", msg),
            SyncEvent::PassFinished {
                run_id,
                rows_written,
                new_entries,
            } => info!(
                %run_id,
                rows_written,
                new_entries,
                "reconciliation pass finished"
            ),
        }
    }
}

/// Keeps every event, handy for callers that render a log afterwards
#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub events: Vec<SyncEvent>,
}

impl SyncObserver for RecordingObserver {
    fn notify(&mut self, event: &SyncEvent) {
        self.events.push(event.clone());
    }
}
