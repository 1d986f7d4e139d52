// Library interface for the CLI and tests

pub mod config;
pub mod connectivity;
pub mod constants;
pub mod coordinator;
pub mod credentials;
pub mod error;
pub mod notify;
pub mod queries;
pub mod queue;
pub mod record;
pub mod remote;
pub mod schema;
pub mod serve;
pub mod storage;

pub use coordinator::{SyncCoordinator, SyncOutcome, SyncReport, SyncStatus};
pub use error::{QueueError, RemoteWriteError};
pub use queue::OfflineQueue;
pub use record::{QueueRecord, RecordId, RecordKind};
