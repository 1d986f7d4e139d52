//! Sync coordinator: drains the offline queue against the remote service.
//!
//! At most one drain cycle runs at a time. A cycle works on a snapshot of the
//! unsynced records taken when it starts, writes them one at a time in
//! insertion order, and counts each failure without stopping. Failed records
//! stay unsynced and are retried on the next trigger.
//!
//! Triggers:
//! - connectivity going from offline to online
//! - an explicit [`SyncCoordinator::sync_now`] call
//!
//! A trigger that arrives while a cycle is running queues one follow-up
//! cycle, so records that failed during a brief outage are retried once the
//! host is back.
//!
//! The periodic timer only refreshes the displayed unsynced count unless
//! `drain_on_refresh` is set.

use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;

use crate::connectivity::{Connectivity, Subscription};
use crate::constants::{DEFAULT_COUNT_REFRESH_INTERVAL, DEFAULT_WRITE_TIMEOUT};
use crate::error::{QueueError, RemoteWriteError};
use crate::notify::SyncEvent;
use crate::queue::OfflineQueue;
use crate::record::{QueueRecord, RecordId, RecordKind};
use crate::remote::RemoteSink;

const EVENT_CHANNEL_CAPACITY: usize = 64;

type DrainFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Live state exposed to the presentation layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub is_online: bool,
    pub is_syncing: bool,
    pub unsynced_count: usize,
}

impl SyncStatus {
    /// Whether a manual sync affordance should be offered
    pub fn can_sync(&self) -> bool {
        self.is_online && !self.is_syncing && self.unsynced_count > 0
    }
}

/// Result of one drain cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub success_count: usize,
    pub failure_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Offline,
    AlreadySyncing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    Completed(SyncReport),
    Skipped { reason: SkipReason },
}

#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Upper bound on one remote insert; a timeout counts as a failure
    pub write_timeout: Duration,
    /// Period of the unsynced count refresh
    pub count_refresh_interval: Duration,
    /// Also start a drain on each refresh tick when online with pending records
    pub drain_on_refresh: bool,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            count_refresh_interval: DEFAULT_COUNT_REFRESH_INTERVAL,
            drain_on_refresh: false,
        }
    }
}

pub struct SyncCoordinator {
    queue: Arc<OfflineQueue>,
    remote: Arc<dyn RemoteSink>,
    options: CoordinatorOptions,
    syncing: AtomicBool,
    status: watch::Sender<SyncStatus>,
    events: broadcast::Sender<SyncEvent>,
}

/// Clears the syncing flag even if the cycle is cancelled or panics
struct SyncingGuard<'a> {
    coordinator: &'a SyncCoordinator,
}

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.syncing.store(false, Ordering::Release);
        self.coordinator
            .status
            .send_modify(|status| status.is_syncing = false);
    }
}

impl SyncCoordinator {
    pub fn new(
        queue: Arc<OfflineQueue>,
        remote: Arc<dyn RemoteSink>,
        options: CoordinatorOptions,
    ) -> Self {
        let (status, _) = watch::channel(SyncStatus::default());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            queue,
            remote,
            options,
            syncing: AtomicBool::new(false),
            status,
            events,
        }
    }

    pub fn queue(&self) -> &Arc<OfflineQueue> {
        &self.queue
    }

    pub fn status(&self) -> SyncStatus {
        *self.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Mirror host connectivity into the exposed status. Does not start a drain.
    pub fn set_online(&self, online: bool) {
        self.status.send_modify(|status| status.is_online = online);
    }

    /// Re-read the unsynced count from the queue
    pub async fn refresh_count(&self) -> Result<usize, QueueError> {
        let count = self.queue.unsynced_count().await?;
        self.status.send_modify(|status| status.unsynced_count = count);
        Ok(count)
    }

    /// Save a record locally for a later sync
    pub async fn store_offline(
        &self,
        kind: RecordKind,
        payload: Value,
    ) -> Result<RecordId, QueueError> {
        let id = self.queue.enqueue(kind, payload).await?;
        self.refresh_count().await?;
        self.publish(SyncEvent::StoredOffline {
            id: id.clone(),
            kind,
        });
        Ok(id)
    }

    /// Run one drain cycle now, unless offline or a cycle is already running.
    ///
    /// Remote failures never make this fail; only local storage errors do.
    pub async fn sync_now(&self) -> Result<SyncOutcome, QueueError> {
        if !self.status().is_online {
            debug!("Sync skipped: offline");
            return Ok(SyncOutcome::Skipped {
                reason: SkipReason::Offline,
            });
        }

        if self
            .syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Sync skipped: a cycle is already running");
            return Ok(SyncOutcome::Skipped {
                reason: SkipReason::AlreadySyncing,
            });
        }

        let report = {
            let _guard = SyncingGuard { coordinator: self };
            self.status.send_modify(|status| status.is_syncing = true);
            self.drain().await
        };

        let report = match report {
            Ok(report) => report,
            Err(e) => {
                error!("Sync cycle aborted: {}", e);
                return Err(e);
            }
        };

        info!(
            "Sync cycle finished: {} synced, {} failed",
            report.success_count, report.failure_count
        );
        for event in SyncEvent::from_report(&report) {
            self.publish(event);
        }

        // Remote writes are done at this point; report them even if the count is stale
        if let Err(e) = self.refresh_count().await {
            error!("Failed to refresh unsynced count after sync: {}", e);
        }

        Ok(SyncOutcome::Completed(report))
    }

    async fn drain(&self) -> Result<SyncReport, QueueError> {
        let snapshot = self.queue.list_unsynced().await?;
        let mut report = SyncReport::default();

        if snapshot.is_empty() {
            return Ok(report);
        }
        info!("Draining {} unsynced record(s)", snapshot.len());

        for record in &snapshot {
            match self.write_record(record).await {
                Ok(()) => {
                    self.queue.mark_synced(&record.id).await?;
                    report.success_count += 1;
                }
                Err(e) => {
                    warn!(
                        "Failed to sync {} record {}: {}",
                        record.kind, record.id, e
                    );
                    report.failure_count += 1;
                }
            }
        }

        Ok(report)
    }

    async fn write_record(&self, record: &QueueRecord) -> Result<(), RemoteWriteError> {
        let destination = record.kind.destination();
        let timeout = self.options.write_timeout;
        match tokio::time::timeout(timeout, self.remote.insert(destination, &record.payload)).await
        {
            Ok(result) => result,
            Err(_) => Err(RemoteWriteError::Timeout(timeout)),
        }
    }

    fn publish(&self, event: SyncEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    /// Subscribe to `connectivity` and run the event loop in the background.
    ///
    /// The subscription lives as long as the loop; it is released when the
    /// returned handle is shut down or dropped.
    pub fn start(self: &Arc<Self>, connectivity: &Connectivity) -> CoordinatorHandle {
        let subscription = connectivity.subscribe();
        self.set_online(subscription.current());

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let coordinator = Arc::clone(self);
        let task = tokio::spawn(async move {
            coordinator.run(subscription, shutdown_rx).await;
        });

        CoordinatorHandle {
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    async fn run(&self, mut subscription: Subscription, mut shutdown: oneshot::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.options.count_refresh_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut signal_open = true;

        // The cycle in flight is polled next to the signal, so transitions
        // during a drain are applied as they arrive instead of being merged.
        let mut drain: Option<DrainFuture<'_>> = None;
        // A trigger asked for a cycle that has not started yet
        let mut drain_requested = false;

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                change = subscription.changed(), if signal_open => match change {
                    Some(online) => drain_requested |= self.on_connectivity_change(online),
                    None => {
                        warn!("Connectivity signal closed; only the count refresh remains active");
                        signal_open = false;
                    }
                },
                _ = ticker.tick() => drain_requested |= self.on_refresh_tick().await,
                _ = async {
                    if let Some(cycle) = drain.as_mut() {
                        cycle.await;
                    }
                }, if drain.is_some() => drain = None,
            }

            if drain_requested && drain.is_none() {
                drain_requested = false;
                let cycle: DrainFuture<'_> = Box::pin(self.run_cycle());
                drain = Some(cycle);
            }
        }

        if let Some(cycle) = drain {
            debug!("Waiting for the running sync cycle before stopping");
            cycle.await;
        }
        debug!("Coordinator loop stopped");
    }

    /// Mirror a transition into the status. Returns true on an offline to
    /// online edge, which asks for a drain.
    fn on_connectivity_change(&self, online: bool) -> bool {
        let was_online = self.status().is_online;
        self.set_online(online);
        online && !was_online
    }

    async fn on_refresh_tick(&self) -> bool {
        match self.refresh_count().await {
            Ok(count) => self.options.drain_on_refresh && count > 0 && self.status().is_online,
            Err(e) => {
                error!("Failed to refresh unsynced count: {}", e);
                false
            }
        }
    }

    async fn run_cycle(&self) {
        loop {
            match self.sync_now().await {
                // A manual sync took its snapshot before this trigger
                Ok(SyncOutcome::Skipped {
                    reason: SkipReason::AlreadySyncing,
                }) => self.wait_until_idle().await,
                Ok(_) => break,
                Err(e) => {
                    error!("Background sync failed: {}", e);
                    break;
                }
            }
        }
    }

    async fn wait_until_idle(&self) {
        let mut status = self.status.subscribe();
        loop {
            let syncing = status.borrow_and_update().is_syncing;
            if !syncing || status.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Owns the background loop started by [`SyncCoordinator::start`].
///
/// Dropping the handle asks the loop to stop; an in-flight drain cycle is
/// allowed to finish first.
pub struct CoordinatorHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl CoordinatorHandle {
    /// Stop the loop and wait for it to exit
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Coordinator loop ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for CoordinatorHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}
