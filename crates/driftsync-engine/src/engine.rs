//! Top-level engine orchestration
//!
//! The [`SyncEngine`] owns every component and wires them together:
//!
//! 1. **Intake**: local file events and remote change pages flow through
//!    the single-threaded reconciler, which mutates the index and derives
//!    operations.
//! 2. **Scheduling**: operations enter the transfer scheduler, whose worker
//!    tasks execute them under the bandwidth governor while the pause
//!    state machine says `Running`.
//! 3. **Failure handling**: every failed attempt goes through the retry
//!    engine; the decision either requeues the operation after backoff,
//!    pauses the whole engine, raises a conflict, or records a permanent
//!    failure.
//! 4. **Persistence**: a background task mirrors index changes into the
//!    state store; operations, sessions, and the remote cursor are saved
//!    at their natural checkpoints so a restart resumes where it left off.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use driftsync_cache::CacheManager;
use driftsync_conflict::{ConflictPolicy, ConflictResolutionResult, ConflictResolver};
use driftsync_core::config::Config;
use driftsync_core::domain::{
    CachePriority, ConflictInfo, ConflictKind, Cursor, ItemId, ItemKind, LocalPath, OperationKind,
    ResolutionStrategy, SyncEvent, SyncOperation, SyncState, VersionStamp,
};
use driftsync_core::ports::{CloudTransport, LocalStore, StateStore};
use driftsync_index::SyncIndex;
use driftsync_reconcile::{FileEvent, Reconciler};
use driftsync_retry::{classify, EngineState, ErrorClass, PauseController, PauseReason, RetryDecision, RetryEngine};
use driftsync_transfer::{BandwidthGovernor, TransferError, TransferScheduler};

use crate::diagnostics::{DiagnosticReport, SystemHealthStatus};
use crate::error::EngineError;

/// How long an idle worker sleeps before checking the queue again
const IDLE_POLL: Duration = Duration::from_millis(200);

fn parse_strategy(name: &str) -> Result<ResolutionStrategy, EngineError> {
    serde_json::from_value(serde_json::Value::String(name.to_string()))
        .map_err(|_| EngineError::UnknownStrategy(name.to_string()))
}

/// The assembled synchronization engine
///
/// Construct with [`SyncEngine::new`], restore durable state with
/// [`SyncEngine::start`], then hand an `Arc` of it to
/// [`SyncEngine::spawn`] to launch the background tasks. The host feeds
/// local events through [`SyncEngine::handle_local_event`]; remote polling
/// runs on its own task.
pub struct SyncEngine {
    config: Config,
    index: Arc<SyncIndex>,
    reconciler: Mutex<Reconciler>,
    resolver: ConflictResolver,
    scheduler: Arc<TransferScheduler>,
    cache: Arc<CacheManager>,
    retry: RetryEngine,
    pause: Arc<PauseController>,
    store: Arc<dyn StateStore>,
    cloud: Arc<dyn CloudTransport>,
    cursor: Mutex<Option<Cursor>>,
    excluded: Vec<glob::Pattern>,
    shutdown: CancellationToken,
}

impl SyncEngine {
    pub fn new(
        config: Config,
        cloud: Arc<dyn CloudTransport>,
        local: Arc<dyn LocalStore>,
        store: Arc<dyn StateStore>,
    ) -> Result<Self, EngineError> {
        let root = LocalPath::new(config.sync.root.clone())
            .map_err(|e| EngineError::InvalidRoot(e.to_string()))?;

        let index = Arc::new(SyncIndex::new());
        let governor = Arc::new(BandwidthGovernor::new(config.bandwidth.clone()));
        let scheduler = Arc::new(TransferScheduler::new(
            Arc::clone(&index),
            Arc::clone(&cloud),
            local,
            governor,
            config.bandwidth.max_concurrent_transfers.max(1) as usize,
        ));

        let strategy = parse_strategy(&config.conflicts.default_strategy)?;
        let resolver = ConflictResolver::new(Arc::clone(&index), ConflictPolicy::new(strategy));

        let excluded = config
            .sync
            .excluded_patterns
            .iter()
            .filter_map(|p| match glob::Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(err) => {
                    warn!(pattern = %p, error = %err, "ignoring invalid exclusion pattern");
                    None
                }
            })
            .collect();

        Ok(Self {
            reconciler: Mutex::new(Reconciler::new(Arc::clone(&index), root)),
            resolver,
            scheduler,
            cache: Arc::new(CacheManager::new(Arc::clone(&index), &config.cache)),
            retry: RetryEngine::new(&config.retry),
            pause: Arc::new(PauseController::new(&config.retry)),
            store,
            cloud,
            cursor: Mutex::new(None),
            excluded,
            shutdown: CancellationToken::new(),
            index,
            config,
        })
    }

    // ------------------------------------------------------------------
    // Component access
    // ------------------------------------------------------------------

    pub fn index(&self) -> &Arc<SyncIndex> {
        &self.index
    }

    pub fn scheduler(&self) -> &Arc<TransferScheduler> {
        &self.scheduler
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        self.pause.state()
    }

    /// Subscribes to the status broadcast channel
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.index.subscribe()
    }

    // ------------------------------------------------------------------
    // Startup
    // ------------------------------------------------------------------

    /// Restores durable state from the store
    ///
    /// Items repopulate the index, offline copies re-register with the
    /// cache accountant, interrupted sessions go back to the scheduler for
    /// resume, and pending operations requeue. Operations that outlived
    /// their TTL while the engine was down become permanent failures.
    pub async fn start(&self) -> Result<(), EngineError> {
        for item in self.store.load_items().await? {
            self.index.upsert(item)?;
        }
        for item in self
            .index
            .query(|it| it.is_offline_available() && it.kind() == ItemKind::File)
        {
            if let Err(err) =
                self.cache
                    .register(*item.id(), item.size_bytes(), CachePriority::Normal)
            {
                warn!(item_id = %item.id(), error = %err, "cache re-registration failed");
            }
        }

        if let Some(cursor) = self.store.load_cursor().await? {
            *self.cursor.lock().unwrap() = Some(cursor);
        }

        for session in self.store.load_sessions().await? {
            self.scheduler.restore_session(session);
        }

        let mut requeued = 0usize;
        for op in self.store.load_operations().await? {
            if op.is_expired() {
                self.record_permanent(op).await;
            } else if self.scheduler.enqueue(op) {
                requeued += 1;
            }
        }

        info!(
            items = self.index.len(),
            operations = requeued,
            "engine state restored"
        );
        Ok(())
    }

    /// Launches the background tasks; returns their handles
    pub fn spawn(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = vec![
            self.spawn_persistence(),
            tokio::spawn(Arc::clone(&self.cache).run(self.shutdown.child_token())),
            self.spawn_poller(),
        ];
        let workers = self.config.bandwidth.max_concurrent_transfers.max(1);
        for _ in 0..workers {
            handles.push(tokio::spawn(Arc::clone(self).worker_loop()));
        }
        info!(workers, "engine tasks spawned");
        handles
    }

    // ------------------------------------------------------------------
    // Intake
    // ------------------------------------------------------------------

    /// Feeds one debounced local filesystem event through reconciliation
    ///
    /// Events whose path matches an exclusion pattern are dropped before
    /// they reach the reconciler.
    #[tracing::instrument(skip(self, event))]
    pub async fn handle_local_event(&self, event: FileEvent) -> Result<(), EngineError> {
        if self.is_excluded(&event.path) {
            debug!(path = %event.path, "event matches exclusion pattern, ignored");
            return Ok(());
        }
        let ops = { self.reconciler.lock().unwrap().apply_local_event(&event)? };
        for op in ops {
            self.submit(op).await?;
        }
        Ok(())
    }

    /// Pulls and applies remote change pages until the feed is drained
    ///
    /// The cursor is persisted only after the whole page applied, so a
    /// crash mid-page replays it rather than losing changes.
    #[tracing::instrument(skip(self))]
    pub async fn poll_remote(&self) -> Result<usize, EngineError> {
        let mut total = 0usize;
        loop {
            let cursor = self.cursor.lock().unwrap().clone();
            let set = self.cloud.fetch_changes(cursor.as_ref()).await?;
            total += set.changes.len();

            let ops = { self.reconciler.lock().unwrap().apply_change_set(&set)? };
            for op in ops {
                self.submit(op).await?;
            }

            self.store.save_cursor(&set.cursor).await?;
            *self.cursor.lock().unwrap() = Some(set.cursor.clone());

            if !set.has_more {
                break;
            }
        }
        Ok(total)
    }

    fn is_excluded(&self, path: &LocalPath) -> bool {
        self.excluded.iter().any(|pattern| {
            pattern.matches(&path.to_string())
                || path.file_name().map_or(false, |name| pattern.matches(name))
        })
    }

    /// Changes folder selection; deselected subtrees stop scheduling
    pub fn set_selected(&self, path: &LocalPath, selected: bool) -> Result<(), EngineError> {
        self.reconciler
            .lock()
            .unwrap()
            .set_selected(path, selected)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Conflict resolution
    // ------------------------------------------------------------------

    /// Resolves a conflicted item, explicitly or by per-path policy
    ///
    /// On success any follow-up operations enter the queue, and a deletion
    /// that was parked behind this conflict is released.
    #[tracing::instrument(skip(self))]
    pub async fn resolve_conflict(
        &self,
        item_id: &ItemId,
        strategy: Option<ResolutionStrategy>,
    ) -> Result<ConflictResolutionResult, EngineError> {
        let result = match strategy {
            Some(strategy) => self.resolver.resolve(item_id, strategy)?,
            None => self.resolver.resolve_auto(item_id)?,
        };

        if result.success {
            if let Err(err) = self.store.save_item(&result.item).await {
                warn!(item_id = %item_id, error = %err, "failed to persist resolved item");
            }
            if let Some(created) = &result.created {
                if let Err(err) = self.store.save_item(created).await {
                    warn!(item_id = %created.id(), error = %err, "failed to persist conflict copy");
                }
            }
            for op in result.operations.clone() {
                self.submit(op).await?;
            }
            // AskUser is not a resolution; the parked deletion stays parked.
            if result.strategy != ResolutionStrategy::AskUser {
                let deferred = {
                    self.reconciler
                        .lock()
                        .unwrap()
                        .take_deferred_deletion(item_id)
                };
                if let Some(op) = deferred {
                    if result.operations.is_empty() {
                        info!(item_id = %item_id, "releasing deletion parked behind conflict");
                        self.submit(op).await?;
                    } else {
                        // The resolution re-established content on the
                        // deleted side; the old deletion no longer applies.
                        debug!(item_id = %item_id, "deferred deletion superseded by resolution");
                    }
                }
            }
        }
        Ok(result)
    }

    // ------------------------------------------------------------------
    // Control surface
    // ------------------------------------------------------------------

    pub fn pause(&self, reason: PauseReason) {
        self.pause.pause(reason);
    }

    /// Explicit user resume; clears any pause reason
    pub fn resume(&self) {
        self.pause.resume();
    }

    /// Cooperatively cancels an in-flight transfer for `item_id`
    pub fn cancel_transfer(&self, item_id: &ItemId) -> bool {
        self.scheduler.cancel(item_id)
    }

    /// Reports a connectivity change to the bandwidth governor
    pub fn set_metered(&self, metered: bool) {
        self.scheduler.governor().set_metered(metered);
    }

    /// Requests shutdown and persists resumable state
    pub async fn shutdown(&self) {
        info!("engine shutting down");
        self.pause.stop();
        self.shutdown.cancel();

        for session in self.scheduler.suspended_sessions() {
            if let Err(err) = self.store.save_session(&session).await {
                warn!(item_id = %session.item_id(), error = %err, "failed to persist session");
            }
        }
        self.persist_all().await;
    }

    /// Builds a point-in-time health report across all components
    pub async fn diagnostics(&self) -> Result<DiagnosticReport, EngineError> {
        let engine_state = self.pause.state();
        let items = self.index.statistics();
        let unresolved_failures = self
            .store
            .list_failures()
            .await?
            .iter()
            .filter(|f| !f.resolved)
            .count();
        let health = DiagnosticReport::health_of(&engine_state, &items, unresolved_failures);
        Ok(DiagnosticReport {
            generated_at: Utc::now(),
            engine_state,
            items,
            transfers: self.scheduler.stats_snapshot(),
            cache: self.cache.usage(),
            unresolved_failures,
            health,
        })
    }

    pub fn health(&self) -> SystemHealthStatus {
        DiagnosticReport::health_of(&self.pause.state(), &self.index.statistics(), 0)
    }

    // ------------------------------------------------------------------
    // Workers
    // ------------------------------------------------------------------

    async fn worker_loop(self: Arc<Self>) {
        let mut state = self.pause.subscribe();
        loop {
            if self.shutdown.is_cancelled() {
                return;
            }
            let current = *state.borrow_and_update();
            match current {
                EngineState::Running => {}
                EngineState::Stopping => return,
                EngineState::Paused(_) => {
                    tokio::select! {
                        _ = self.shutdown.cancelled() => return,
                        changed = state.changed() => {
                            if changed.is_err() {
                                return;
                            }
                            continue;
                        }
                    }
                }
            }

            match self.scheduler.run_next().await {
                Some((op, Ok(()))) => { eprintln!("DBG: op completed ok kind={:?} state={:?}", op.kind(), self.pause.state()); self.finish_operation(op).await },
                Some((op, Err(err))) => self.handle_failure(op, err).await,
                None => {
                    for op in self.scheduler.take_expired() {
                        self.record_permanent(op).await;
                    }
                    tokio::select! {
                        _ = self.shutdown.cancelled() => return,
                        _ = tokio::time::sleep(IDLE_POLL) => {}
                    }
                }
            }
        }
    }

    /// Queues an operation, persisting it only if accepted
    async fn submit(&self, op: SyncOperation) -> Result<(), EngineError> {
        let copy = op.clone();
        if self.scheduler.enqueue(op) {
            self.store.save_operation(&copy).await?;
        } else {
            debug!(
                item_id = %copy.item_id(),
                kind = %copy.kind(),
                "dropped operation: item already has one live"
            );
        }
        Ok(())
    }

    async fn finish_operation(&self, op: SyncOperation) {
        if let Err(err) = self.store.delete_operation(op.id()).await {
            warn!(operation_id = %op.id(), error = %err, "failed to clear completed operation");
        }
        // A completed download materialized an offline copy; account for it.
        if op.kind() == OperationKind::Download {
            if let Some(item) = self.index.get(op.item_id()) {
                if item.kind() == ItemKind::File {
                    if let Err(err) =
                        self.cache
                            .register(*item.id(), item.size_bytes(), CachePriority::Normal)
                    {
                        warn!(item_id = %item.id(), error = %err, "cache registration failed");
                    }
                }
            }
        }
    }

    async fn handle_failure(&self, mut op: SyncOperation, err: TransferError) {
        if matches!(err, TransferError::Cancelled) {
            // Deliberate cancellation keeps the operation durable so a
            // restart can pick it up; the suspended session keeps the
            // progress.
            if let Err(e) = self.store.save_operation(&op).await {
                warn!(operation_id = %op.id(), error = %e, "failed to persist cancelled operation");
            }
            return;
        }

        if let Some(reason) = self.pause.record_failure() {
            warn!(%reason, "rolling error window tripped, engine paused");
        }

        let Some(transport) = err.as_transport().cloned() else {
            op.record_attempt();
            op.record_error(err.to_string());
            self.record_permanent(op).await;
            return;
        };

        op.record_attempt();
        op.record_error(transport.to_string());

        match self.retry.assess(&op, &transport) {
            RetryDecision::Retry { delay } => {
                debug!(
                    item_id = %op.item_id(),
                    attempt = op.attempts(),
                    delay_secs = delay.as_secs(),
                    "transient failure, retrying after backoff"
                );
                if let Err(e) = self.store.save_operation(&op).await {
                    warn!(operation_id = %op.id(), error = %e, "failed to persist retry state");
                }
                let scheduler = Arc::clone(&self.scheduler);
                let shutdown = self.shutdown.child_token();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = shutdown.cancelled() => {}
                        _ = tokio::time::sleep(delay) => {
                            scheduler.enqueue(op);
                        }
                    }
                });
            }
            RetryDecision::Pause(reason) => {
                eprintln!("DBG: pause decision reason={reason:?}");
                warn!(item_id = %op.item_id(), %reason, "environmental failure, pausing engine");
                self.pause.pause(reason);
                if let Err(e) = self.store.save_operation(&op).await {
                    warn!(operation_id = %op.id(), error = %e, "failed to persist paused operation");
                }
                // Requeued so it runs once the pause lifts.
                let accepted = self.scheduler.enqueue(op);
                eprintln!("DBG: requeue accepted={accepted} queued_len={}", self.scheduler.queued_len());
            }
            RetryDecision::PermanentFailure => self.record_permanent(op).await,
            RetryDecision::IntegrityConflict => self.mark_integrity_conflict(op).await,
        }
    }

    async fn record_permanent(&self, op: SyncOperation) {
        let record = self.retry.failure_record(&op);
        error!(
            item_id = %op.item_id(),
            kind = %op.kind(),
            attempts = op.attempts(),
            reason = %record.reason,
            "operation failed permanently"
        );

        if let Err(e) = self.store.record_failure(&record).await {
            warn!(operation_id = %op.id(), error = %e, "failed to write failure record");
        }
        if let Err(e) = self
            .index
            .set_state(op.item_id(), SyncState::Error(record.reason.clone()))
        {
            debug!(item_id = %op.item_id(), error = %e, "item not marked errored");
        }
        self.index.publish(SyncEvent::OperationFailed {
            item_id: *op.item_id(),
            kind: op.kind(),
            retry_count: op.attempts(),
            reason: record.reason,
            at: Utc::now(),
        });
        if let Err(e) = self.store.delete_operation(op.id()).await {
            warn!(operation_id = %op.id(), error = %e, "failed to clear failed operation");
        }
    }

    /// The transferred content no longer matches what reconciliation saw;
    /// surface it as a content conflict instead of retrying blindly
    async fn mark_integrity_conflict(&self, op: SyncOperation) {
        warn!(item_id = %op.item_id(), "content diverged mid-transfer, raising conflict");
        let marked = self.index.update(op.item_id(), |item| {
            let local = VersionStamp::new(
                item.content_hash().cloned(),
                item.size_bytes(),
                item.modified_at(),
            );
            // The remote hash is unknown at this point; the descriptor
            // records the divergence, not the winning side.
            let remote = VersionStamp::new(None, item.size_bytes(), None);
            item.mark_conflicted(ConflictInfo::new(ConflictKind::Content, local, remote))?;
            Ok(())
        });
        match marked {
            Ok(item) => self.index.publish(SyncEvent::ConflictDetected {
                item_id: *item.id(),
                path: item.local_path().clone(),
                kind: ConflictKind::Content,
                at: Utc::now(),
            }),
            Err(e) => warn!(item_id = %op.item_id(), error = %e, "could not mark conflict"),
        }
        if let Err(e) = self.store.delete_operation(op.id()).await {
            warn!(operation_id = %op.id(), error = %e, "failed to clear conflicted operation");
        }
    }

    // ------------------------------------------------------------------
    // Background tasks
    // ------------------------------------------------------------------

    /// Mirrors index changes into the state store
    fn spawn_persistence(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        let mut rx = engine.index.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = engine.shutdown.cancelled() => break,
                    event = rx.recv() => match event {
                        Ok(event) => engine.persist_event(&event).await,
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(missed, "status channel lagged, snapshotting full index");
                            engine.persist_all().await;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        })
    }

    async fn persist_event(&self, event: &SyncEvent) {
        let item_id = match event {
            SyncEvent::StatusChange { item_id, .. }
            | SyncEvent::CacheUpdate { item_id, .. }
            | SyncEvent::ConflictDetected { item_id, .. }
            | SyncEvent::ConflictResolved { item_id, .. }
            | SyncEvent::OperationFailed { item_id, .. } => *item_id,
            SyncEvent::SelectionChange { .. } => return,
        };
        match self.index.get(&item_id) {
            Some(item) => {
                if let Err(err) = self.store.save_item(&item).await {
                    warn!(item_id = %item_id, error = %err, "failed to persist item");
                }
            }
            None => {
                if let Err(err) = self.store.delete_item(&item_id).await {
                    warn!(item_id = %item_id, error = %err, "failed to delete purged item");
                }
            }
        }
    }

    async fn persist_all(&self) {
        for item in self.index.query(|_| true) {
            if let Err(err) = self.store.save_item(&item).await {
                warn!(item_id = %item.id(), error = %err, "failed to persist item");
            }
        }
    }

    /// Drives the remote change feed on the configured interval
    fn spawn_poller(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let period = Duration::from_secs(engine.config.sync.poll_interval.max(1));
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = engine.shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if !engine.pause.is_running() && !engine.pause.auto_resume() {
                    continue;
                }
                match engine.poll_remote().await {
                    Ok(0) => {}
                    Ok(changes) => debug!(changes, "remote poll applied changes"),
                    Err(EngineError::Transport(err)) => {
                        warn!(error = %err, "remote poll failed");
                        if let ErrorClass::Environmental(reason) = classify(&err) {
                            engine.pause.pause(reason);
                        }
                        if let Some(reason) = engine.pause.record_failure() {
                            warn!(%reason, "rolling error window tripped, engine paused");
                        }
                    }
                    Err(err) => warn!(error = %err, "remote poll failed"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strategy_known_values() {
        assert_eq!(parse_strategy("ask_user").unwrap(), ResolutionStrategy::AskUser);
        assert_eq!(parse_strategy("keep_both").unwrap(), ResolutionStrategy::KeepBoth);
        assert_eq!(parse_strategy("keep_newer").unwrap(), ResolutionStrategy::KeepNewer);
    }

    #[test]
    fn test_parse_strategy_rejects_unknown() {
        assert!(matches!(
            parse_strategy("coin_flip"),
            Err(EngineError::UnknownStrategy(_))
        ));
    }
}
