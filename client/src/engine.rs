//! The device-side sync engine.
//!
//! [`SyncClient`] owns the local store, the watermark and the scheduler. A
//! pass pushes every pending operation, applies whatever the server returns
//! and advances the watermark. Passes never overlap: a request arriving
//! while one is running is folded into a single follow-up pass.

use crate::config::ClientConfig;
use crate::error::{SyncError, SyncResult};
use crate::state::StateStore;
use crate::transport::SyncTransport;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tally_engine::{
    ApplyOutcome, ClientSnapshot, EntityKind, Identity, LocalStore, SyncRequest, Timestamp,
    INITIAL_SYNC_TIMESTAMP,
};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

const EVENT_CAPACITY: usize = 64;

/// Notifications published by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Started,
    Completed {
        /// Operations pushed in this pass
        sent: usize,
        /// Pulled operations that changed the local replica
        pulled: usize,
    },
    Error(String),
}

/// Counters of one successful pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    pub sent: usize,
    pub received: usize,
    pub pulled: usize,
    pub watermark: Timestamp,
}

/// What a call to [`SyncClient::sync`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(PassSummary),
    /// Another pass was running; it will run once more when it finishes.
    Coalesced,
    Offline,
    Unauthenticated,
    Failed(String),
}

impl SyncOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, SyncOutcome::Completed(_))
    }
}

/// Current wall-clock time in milliseconds.
pub fn now_millis() -> Timestamp {
    chrono::Utc::now().timestamp_millis()
}

struct Inner {
    config: ClientConfig,
    transport: Arc<dyn SyncTransport>,
    state: Arc<dyn StateStore>,
    store: tokio::sync::Mutex<LocalStore>,
    identity: RwLock<Option<Identity>>,
    watermark: AtomicI64,
    running: watch::Sender<bool>,
    in_flight: AtomicBool,
    rerun: AtomicBool,
    online: watch::Receiver<bool>,
    events: broadcast::Sender<SyncEvent>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
    /// Entity kinds to wipe at the start of the next pass.
    pending_resets: Mutex<Vec<EntityKind>>,
}

/// Handle to a device's sync engine. Cheap to clone.
#[derive(Clone)]
pub struct SyncClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SyncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncClient")
            .field("api_url", &self.inner.config.api_url)
            .field("running", &self.is_running())
            .field("last_sync_timestamp", &self.last_sync_timestamp())
            .finish()
    }
}

impl SyncClient {
    /// Open the engine, restoring persisted state or creating a new device.
    ///
    /// `online` mirrors the platform's connectivity signal.
    pub async fn open(
        config: ClientConfig,
        transport: Arc<dyn SyncTransport>,
        state: Arc<dyn StateStore>,
        online: watch::Receiver<bool>,
    ) -> SyncResult<Self> {
        let snapshot = match state.load().await? {
            Some(snapshot) => snapshot,
            None => {
                let snapshot = ClientSnapshot::new(uuid::Uuid::new_v4().to_string());
                tracing::info!(device_id = %snapshot.device_id, "Registered new device");
                state.save(&snapshot).await?;
                snapshot
            }
        };
        let (store, watermark) = snapshot.into_store();

        tracing::debug!(
            device_id = %store.device_id(),
            watermark,
            pending = store.pending_count(),
            "Sync client opened"
        );

        let (running, _) = watch::channel(false);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                transport,
                state,
                store: tokio::sync::Mutex::new(store),
                identity: RwLock::new(None),
                watermark: AtomicI64::new(watermark),
                running,
                in_flight: AtomicBool::new(false),
                rerun: AtomicBool::new(false),
                online,
                events,
                scheduler: Mutex::new(None),
                pending_resets: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub async fn device_id(&self) -> String {
        self.inner.store.lock().await.device_id().clone()
    }

    /// Set or clear the authenticated caller.
    pub fn set_identity(&self, identity: Option<Identity>) {
        *self.inner.identity.write() = identity;
    }

    pub fn identity(&self) -> Option<Identity> {
        self.inner.identity.read().clone()
    }

    pub fn is_online(&self) -> bool {
        *self.inner.online.borrow()
    }

    pub fn is_running(&self) -> bool {
        *self.inner.running.borrow()
    }

    pub fn last_sync_timestamp(&self) -> Timestamp {
        self.inner.watermark.load(Ordering::Acquire)
    }

    /// Number of operations waiting to be pushed.
    pub async fn pending_count(&self) -> usize {
        self.inner.store.lock().await.pending_count()
    }

    /// Subscribe to sync notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    /// Read the local store.
    pub async fn read<T>(&self, f: impl FnOnce(&LocalStore) -> T) -> T {
        let store = self.inner.store.lock().await;
        f(&store)
    }

    /// Run a domain mutator against the local store and persist the result.
    ///
    /// The mutator receives the current time. When `push_on_write` is set a
    /// pass is started in the background.
    pub async fn mutate<T, F>(&self, f: F) -> SyncResult<T>
    where
        F: FnOnce(&mut LocalStore, Timestamp) -> tally_engine::error::Result<T>,
    {
        let (value, snapshot) = {
            let mut store = self.inner.store.lock().await;
            let value = f(&mut store, now_millis())?;
            (value, ClientSnapshot::capture(&store, self.last_sync_timestamp()))
        };
        self.persist(&snapshot).await;

        if self.inner.config.push_on_write {
            let client = self.clone();
            tokio::spawn(async move {
                client.sync().await;
            });
        }
        Ok(value)
    }

    /// Start the engine: one initial pass, then the periodic scheduler.
    ///
    /// Returns false when already running or when no caller is signed in.
    pub async fn start(&self) -> bool {
        if self.identity().is_none() {
            tracing::debug!("Not starting sync: no authenticated user");
            return false;
        }
        let started = self.inner.running.send_if_modified(|running| {
            if *running {
                false
            } else {
                *running = true;
                true
            }
        });
        if !started {
            return false;
        }

        tracing::info!(
            interval_secs = self.inner.config.sync_interval.as_secs_f64(),
            "Sync engine started"
        );

        let initial = self.sync().await;
        let retry_initial = matches!(initial, SyncOutcome::Failed(_));

        let client = self.clone();
        let handle = tokio::spawn(async move { client.schedule(retry_initial).await });
        if let Some(previous) = self.inner.scheduler.lock().replace(handle) {
            previous.abort();
        }
        true
    }

    /// Stop scheduling passes. A pass already running is not interrupted.
    pub fn stop(&self) {
        if self.inner.running.send_replace(false) {
            tracing::info!("Sync engine stopped");
        }
    }

    /// Reset the watermark, drop cached entities of `kind` and the whole
    /// queue, then pull everything again.
    ///
    /// The reset runs at the start of the next pass, never under one that
    /// is already in flight. If a pass is running this returns
    /// [`SyncOutcome::Coalesced`] and the follow-up pass does the full pull;
    /// while offline the reset waits for the next pass.
    pub async fn force_full_sync(&self, kind: EntityKind) -> SyncOutcome {
        tracing::warn!(entity = %kind, "Forcing full sync");
        self.inner.pending_resets.lock().push(kind);
        self.sync().await
    }

    /// Run a sync pass now.
    ///
    /// Never fails: problems are reported through the outcome and the
    /// event channel, and pending operations stay queued.
    pub async fn sync(&self) -> SyncOutcome {
        if !self.is_online() {
            tracing::debug!("Skipping sync: offline");
            return SyncOutcome::Offline;
        }
        let Some(identity) = self.identity() else {
            tracing::debug!("Skipping sync: no authenticated user");
            return SyncOutcome::Unauthenticated;
        };

        if self.inner.in_flight.swap(true, Ordering::AcqRel) {
            self.inner.rerun.store(true, Ordering::Release);
            return SyncOutcome::Coalesced;
        }

        loop {
            let outcome = self.pass(&identity).await;
            if self.inner.rerun.swap(false, Ordering::AcqRel) {
                continue;
            }
            self.inner.in_flight.store(false, Ordering::Release);
            // a request may have landed between the check and the release
            if !self.inner.rerun.swap(false, Ordering::AcqRel)
                || self.inner.in_flight.swap(true, Ordering::AcqRel)
            {
                return outcome;
            }
        }
    }

    async fn pass(&self, identity: &Identity) -> SyncOutcome {
        let _ = self.inner.events.send(SyncEvent::Started);

        match self.exchange(identity).await {
            Ok(summary) => {
                tracing::info!(
                    sent = summary.sent,
                    received = summary.received,
                    pulled = summary.pulled,
                    watermark = summary.watermark,
                    "Sync completed"
                );
                let _ = self.inner.events.send(SyncEvent::Completed {
                    sent: summary.sent,
                    pulled: summary.pulled,
                });
                SyncOutcome::Completed(summary)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Sync failed");
                let _ = self.inner.events.send(SyncEvent::Error(e.to_string()));
                SyncOutcome::Failed(e.to_string())
            }
        }
    }

    async fn exchange(&self, identity: &Identity) -> SyncResult<PassSummary> {
        let (request, reset) = {
            let mut store = self.inner.store.lock().await;
            let kinds = std::mem::take(&mut *self.inner.pending_resets.lock());
            let reset = if kinds.is_empty() {
                None
            } else {
                for kind in &kinds {
                    store.clear_kind(*kind);
                }
                store.queue_mut().clear_all();
                self.inner
                    .watermark
                    .store(INITIAL_SYNC_TIMESTAMP, Ordering::Release);
                tracing::info!(entities = ?kinds, "Local state reset for full sync");
                Some(ClientSnapshot::capture(&store, INITIAL_SYNC_TIMESTAMP))
            };
            let request = SyncRequest::new(store.device_id().clone(), self.last_sync_timestamp())
                .with_operations(store.pending_operations());
            (request, reset)
        };
        if let Some(snapshot) = reset {
            self.persist(&snapshot).await;
        }

        tracing::debug!(
            operations = request.operations.len(),
            watermark = request.last_sync_timestamp,
            "Sending sync request"
        );

        let response = self.inner.transport.send(&request, identity).await?;
        if !response.success {
            return Err(SyncError::Rejected(
                response.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        let (summary, snapshot) = {
            let mut store = self.inner.store.lock().await;

            for op in &request.operations {
                store.queue_mut().mark_completed(&op.id);
            }

            let mut pulled = 0;
            for op in &response.operations {
                match store.apply_remote(op) {
                    Ok(ApplyOutcome::Applied) => pulled += 1,
                    Ok(ApplyOutcome::Skipped) => {
                        tracing::debug!(op_id = %op.id, entity = %op.entity, "Skipped pulled operation");
                    }
                    Err(e) => {
                        tracing::warn!(op_id = %op.id, entity = %op.entity, error = %e, "Failed to apply pulled operation");
                    }
                }
            }

            store.queue_mut().clear_completed();

            let previous = self
                .inner
                .watermark
                .fetch_max(response.last_sync_timestamp, Ordering::AcqRel);
            let watermark = previous.max(response.last_sync_timestamp);

            let summary = PassSummary {
                sent: request.operations.len(),
                received: response.operations.len(),
                pulled,
                watermark,
            };
            (summary, ClientSnapshot::capture(&store, watermark))
        };

        self.persist(&snapshot).await;
        Ok(summary)
    }

    async fn persist(&self, snapshot: &ClientSnapshot) {
        if let Err(e) = self.inner.state.save(snapshot).await {
            tracing::error!(error = %e, "Failed to persist client state");
        }
    }

    async fn schedule(self, mut retry_initial: bool) {
        let interval = self.inner.config.sync_interval;
        let retry_delay = self.inner.config.retry_delay;

        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut online = self.inner.online.clone();
        let mut connectivity_open = true;
        let mut running = self.inner.running.subscribe();

        while self.is_running() {
            let retry_armed = retry_initial;

            tokio::select! {
                _ = async { let _ = running.wait_for(|r| !*r).await; } => break,
                _ = tokio::time::sleep(retry_delay), if retry_armed => {
                    tracing::info!("Retrying initial sync");
                    retry_initial = matches!(self.sync().await, SyncOutcome::Failed(_));
                }
                _ = ticker.tick() => {
                    if self.sync().await.is_completed() {
                        retry_initial = false;
                    }
                }
                changed = online.changed(), if connectivity_open => {
                    match changed {
                        Ok(()) => {
                            let restored = *online.borrow_and_update();
                            if restored {
                                tracing::info!("Connectivity restored, syncing");
                                if self.sync().await.is_completed() {
                                    retry_initial = false;
                                }
                            }
                        }
                        Err(_) => connectivity_open = false,
                    }
                }
            }
        }

        tracing::debug!("Sync scheduler exited");
    }
}
