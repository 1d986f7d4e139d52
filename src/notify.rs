use serde::Serialize;

use crate::coordinator::SyncReport;
use crate::record::{RecordId, RecordKind};

/// User-facing notifications published by the coordinator
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    /// A record was saved locally and will sync once connected
    StoredOffline { id: RecordId, kind: RecordKind },
    /// Records confirmed by the remote during a drain cycle
    SyncSucceeded { count: usize },
    /// Records left pending after a drain cycle
    SyncFailed { count: usize },
}

impl SyncEvent {
    /// Notifications for a finished drain cycle. Nothing is emitted for an
    /// empty cycle.
    pub fn from_report(report: &SyncReport) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        if report.success_count > 0 {
            events.push(SyncEvent::SyncSucceeded {
                count: report.success_count,
            });
        }
        if report.failure_count > 0 {
            events.push(SyncEvent::SyncFailed {
                count: report.failure_count,
            });
        }
        events
    }

    pub fn is_error(&self) -> bool {
        matches!(self, SyncEvent::SyncFailed { .. })
    }

    pub fn title(&self) -> &'static str {
        match self {
            SyncEvent::StoredOffline { .. } => "Saved offline",
            SyncEvent::SyncSucceeded { .. } => "Sync complete",
            SyncEvent::SyncFailed { .. } => "Sync error",
        }
    }

    pub fn description(&self) -> String {
        match self {
            SyncEvent::StoredOffline { .. } => {
                "Data was saved locally and will be synced when a connection is available"
                    .to_string()
            }
            SyncEvent::SyncSucceeded { count } => format!("{} item(s) synced successfully", count),
            SyncEvent::SyncFailed { count } => format!("{} item(s) could not be synced", count),
        }
    }
}
