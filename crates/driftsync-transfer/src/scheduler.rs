//! Transfer scheduler
//!
//! Pulls operations off the queue, asks the governor for admission, and
//! drives the worker under a concurrency cap. Interrupted transfers park
//! their suspended sessions here and resume from the last checkpoint the
//! next time the same item's operation is dequeued.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use driftsync_core::domain::{
    ItemId, OperationKind, SyncOperation, TransferDirection, TransferSession, TransportError,
};
use driftsync_core::ports::{CloudTransport, LocalStore};
use driftsync_index::SyncIndex;

use crate::error::TransferError;
use crate::governor::{Admission, BandwidthGovernor};
use crate::queue::TransferQueue;
use crate::stats::{TransferStatistics, TransferStatsSnapshot};
use crate::worker::TransferWorker;

/// Coordinates queueing, admission, and execution of sync operations
pub struct TransferScheduler {
    worker: TransferWorker,
    governor: Arc<BandwidthGovernor>,
    queue: Mutex<TransferQueue>,
    /// Caps concurrently executing operations
    semaphore: Semaphore,
    /// Suspended sessions keyed by item, awaiting resumption
    sessions: DashMap<ItemId, TransferSession>,
    /// Cancellation handles for in-flight operations
    cancels: DashMap<ItemId, CancellationToken>,
    stats: Arc<TransferStatistics>,
}

impl TransferScheduler {
    pub fn new(
        index: Arc<SyncIndex>,
        cloud: Arc<dyn CloudTransport>,
        local: Arc<dyn LocalStore>,
        governor: Arc<BandwidthGovernor>,
        max_concurrent: usize,
    ) -> Self {
        let stats = Arc::new(TransferStatistics::new());
        Self {
            worker: TransferWorker::new(
                index,
                cloud,
                local,
                Arc::clone(&stats),
                governor.transfer_timeout(),
            ),
            governor,
            queue: Mutex::new(TransferQueue::new()),
            semaphore: Semaphore::new(max_concurrent.max(1)),
            sessions: DashMap::new(),
            cancels: DashMap::new(),
            stats,
        }
    }

    pub fn governor(&self) -> &Arc<BandwidthGovernor> {
        &self.governor
    }

    /// Queues an operation; returns false if the item already has one live
    pub fn enqueue(&self, op: SyncOperation) -> bool {
        self.queue.lock().unwrap().enqueue(op)
    }

    /// Requests cooperative cancellation of an in-flight operation
    ///
    /// The worker checkpoints the current chunk and suspends the session
    /// before releasing; returns false if the item has nothing in flight.
    pub fn cancel(&self, item_id: &ItemId) -> bool {
        match self.cancels.get(item_id) {
            Some(token) => {
                info!(item_id = %item_id, "cancelling in-flight operation");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Re-adopts a session persisted before shutdown
    pub fn restore_session(&self, session: TransferSession) {
        debug!(item_id = %session.item_id(), progress = session.progress(), "restored session");
        self.sessions.insert(*session.item_id(), session);
    }

    /// Suspended sessions for persistence across restarts
    pub fn suspended_sessions(&self) -> Vec<TransferSession> {
        self.sessions.iter().map(|e| e.value().clone()).collect()
    }

    /// Operations dropped for exceeding their TTL since the last call
    pub fn take_expired(&self) -> Vec<SyncOperation> {
        self.queue.lock().unwrap().take_expired()
    }

    pub fn queued_len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    pub fn active_len(&self) -> usize {
        self.queue.lock().unwrap().in_flight_count()
    }

    pub fn stats_snapshot(&self) -> TransferStatsSnapshot {
        let queue = self.queue.lock().unwrap();
        self.stats.snapshot(queue.in_flight_count(), queue.len())
    }

    /// Dequeues and executes the next admissible operation
    ///
    /// Returns `None` when the queue is empty or admission is currently
    /// denied (the operation goes back to the front). Callers loop on this
    /// from one or more worker tasks. The operation comes back with the
    /// outcome so the caller can decide whether to retry it.
    pub async fn run_next(&self) -> Option<(SyncOperation, Result<(), TransferError>)> {
        let op = {
            let mut queue = self.queue.lock().unwrap();
            let op = queue.next()?;
            if op.kind().is_transfer() {
                let active = queue.in_flight_count().saturating_sub(1) as u32;
                match self.governor.admit(direction_of(op.kind()), active) {
                    Admission::Admitted => {}
                    verdict => {
                        debug!(kind = %op.kind(), ?verdict, "admission denied, requeued");
                        queue.requeue_front(op);
                        return None;
                    }
                }
            }
            op
        };

        let item_id = *op.item_id();
        // Semaphore errors only on close, which never happens here.
        let _permit = self.semaphore.acquire().await.ok()?;
        let cancel = CancellationToken::new();
        self.cancels.insert(item_id, cancel.clone());

        let result = if op.kind().is_transfer() {
            self.run_transfer(&op, &cancel).await
        } else {
            self.worker.execute_metadata(&op).await
        };

        self.cancels.remove(&item_id);
        self.queue.lock().unwrap().complete(&item_id);
        if let Err(err) = &result {
            self.stats.record_failure();
            warn!(item_id = %item_id, kind = %op.kind(), error = %err, "operation failed");
        }
        Some((op, result))
    }

    async fn run_transfer(
        &self,
        op: &SyncOperation,
        cancel: &CancellationToken,
    ) -> Result<(), TransferError> {
        let direction = direction_of(op.kind());
        let mut session = match self.sessions.remove(op.item_id()) {
            Some((_, session)) if session.direction() == direction => session,
            // Direction changed since suspension; the checkpoint is useless.
            Some(_) | None => {
                TransferSession::new(*op.id(), *op.item_id(), direction, op.size_bytes())
            }
        };

        let result = self
            .worker
            .execute_transfer(op, &mut session, &self.governor, cancel)
            .await;

        match &result {
            Ok(()) => {}
            Err(TransferError::Cancelled) => {
                self.sessions.insert(*op.item_id(), session);
            }
            Err(TransferError::Transport(TransportError::StaleResumeToken(_))) => {
                // The provider forgot the upload; the next attempt restarts
                // from byte zero with a fresh session.
                warn!(item_id = %op.item_id(), "resume token stale, discarding session");
                session.abort();
            }
            Err(_) => {
                session.suspend();
                self.sessions.insert(*op.item_id(), session);
            }
        }
        result
    }
}

fn direction_of(kind: OperationKind) -> TransferDirection {
    match kind {
        OperationKind::Download => TransferDirection::Download,
        _ => TransferDirection::Upload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use driftsync_core::config::BandwidthConfig;
    use driftsync_core::domain::{
        ContentHash, Cursor, ItemKind, LocalPath, RemoteId, RemotePath, ResumeToken, SyncItem,
        SyncState,
    };
    use driftsync_core::ports::{ChangeSet, UploadProgress};

    // ------------------------------------------------------------------
    // In-memory port doubles
    // ------------------------------------------------------------------

    #[derive(Default)]
    struct MockCloud {
        /// remote-id string -> content
        files: Mutex<HashMap<String, Vec<u8>>>,
        /// token string -> bytes received so far
        uploads: Mutex<HashMap<String, Vec<u8>>>,
        upload_totals: Mutex<HashMap<String, u64>>,
        begin_calls: AtomicU32,
        /// Hash reported on upload completion; defaults to "h-upload"
        complete_hash: Mutex<Option<ContentHash>>,
        /// Invoked after each accepted upload chunk, e.g. to cancel mid-flight
        on_chunk: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
        /// Makes upload_chunk hang indefinitely, simulating a dead connection
        stall_chunks: AtomicBool,
        deleted: Mutex<Vec<String>>,
        relocated: Mutex<Vec<(String, String)>>,
    }

    impl MockCloud {
        fn with_file(remote_id: &str, content: &[u8]) -> Self {
            let mock = Self::default();
            mock.files
                .lock()
                .unwrap()
                .insert(remote_id.to_string(), content.to_vec());
            mock
        }

        fn set_complete_hash(&self, hash: &str) {
            *self.complete_hash.lock().unwrap() =
                Some(ContentHash::new(hash.to_string()).unwrap());
        }

        fn uploaded(&self, token: &str) -> Vec<u8> {
            self.uploads.lock().unwrap().get(token).cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl CloudTransport for MockCloud {
        async fn fetch_changes(
            &self,
            _cursor: Option<&Cursor>,
        ) -> Result<ChangeSet, TransportError> {
            Ok(ChangeSet {
                changes: Vec::new(),
                cursor: Cursor::new("end".to_string()).map_err(|_| TransportError::Other("cursor".into()))?,
                has_more: false,
            })
        }

        async fn begin_upload(
            &self,
            path: &RemotePath,
            total_bytes: u64,
        ) -> Result<ResumeToken, TransportError> {
            self.begin_calls.fetch_add(1, Ordering::SeqCst);
            let token = format!("tok{}", path.as_str().replace('/', "-"));
            self.uploads.lock().unwrap().insert(token.clone(), Vec::new());
            self.upload_totals.lock().unwrap().insert(token.clone(), total_bytes);
            ResumeToken::new(token).map_err(|_| TransportError::Other("token".into()))
        }

        async fn upload_chunk(
            &self,
            token: &ResumeToken,
            offset: u64,
            data: &[u8],
        ) -> Result<UploadProgress, TransportError> {
            if self.stall_chunks.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            let mut uploads = self.uploads.lock().unwrap();
            let buffer = uploads
                .get_mut(token.as_str())
                .ok_or_else(|| TransportError::StaleResumeToken(token.as_str().to_string()))?;
            assert_eq!(buffer.len() as u64, offset, "chunk out of order");
            buffer.extend_from_slice(data);
            let done = buffer.len() as u64;
            let total = self.upload_totals.lock().unwrap()[token.as_str()];
            drop(uploads);

            if let Some(hook) = self.on_chunk.lock().unwrap().as_ref() {
                hook();
            }
            if done >= total {
                let hash = self
                    .complete_hash
                    .lock()
                    .unwrap()
                    .clone()
                    .unwrap_or_else(|| ContentHash::new("h-upload".to_string()).unwrap());
                Ok(UploadProgress::Completed {
                    remote_id: RemoteId::new(format!("rid-{}", token.as_str().replace('.', "-")))
                        .map_err(|_| TransportError::Other("id".into()))?,
                    content_hash: hash,
                })
            } else {
                Ok(UploadProgress::InProgress {
                    resume_token: token.clone(),
                })
            }
        }

        async fn download_chunk(
            &self,
            remote_id: &RemoteId,
            offset: u64,
            len: u64,
        ) -> Result<Vec<u8>, TransportError> {
            let files = self.files.lock().unwrap();
            let content = files
                .get(remote_id.as_str())
                .ok_or_else(|| TransportError::NotFound(remote_id.as_str().to_string()))?;
            let start = offset as usize;
            let end = (offset + len).min(content.len() as u64) as usize;
            Ok(content[start..end].to_vec())
        }

        async fn delete(&self, remote_id: &RemoteId) -> Result<(), TransportError> {
            self.deleted.lock().unwrap().push(remote_id.as_str().to_string());
            Ok(())
        }

        async fn relocate(
            &self,
            remote_id: &RemoteId,
            new_path: &RemotePath,
        ) -> Result<(), TransportError> {
            self.relocated
                .lock()
                .unwrap()
                .push((remote_id.as_str().to_string(), new_path.as_str().to_string()));
            Ok(())
        }

        async fn create_folder(&self, path: &RemotePath) -> Result<RemoteId, TransportError> {
            RemoteId::new(format!("fid{}", path.as_str().replace('/', "-")))
                .map_err(|_| TransportError::Other("id".into()))
        }
    }

    #[derive(Default)]
    struct MockLocal {
        files: Mutex<HashMap<String, Vec<u8>>>,
        /// path -> hash reported by content_hash; defaults to "h-local"
        hashes: Mutex<HashMap<String, String>>,
        removed: Mutex<Vec<String>>,
    }

    impl MockLocal {
        fn with_file(path: &str, content: &[u8]) -> Self {
            let mock = Self::default();
            mock.files
                .lock()
                .unwrap()
                .insert(path.to_string(), content.to_vec());
            mock
        }

        fn set_hash(&self, path: &str, hash: &str) {
            self.hashes
                .lock()
                .unwrap()
                .insert(path.to_string(), hash.to_string());
        }

        fn content(&self, path: &str) -> Vec<u8> {
            self.files.lock().unwrap().get(path).cloned().unwrap_or_default()
        }
    }

    fn key(path: &LocalPath) -> String {
        path.as_path().display().to_string()
    }

    #[async_trait]
    impl LocalStore for MockLocal {
        async fn read_chunk(
            &self,
            path: &LocalPath,
            offset: u64,
            len: u64,
        ) -> Result<Vec<u8>, TransportError> {
            let files = self.files.lock().unwrap();
            let content = files
                .get(&key(path))
                .ok_or_else(|| TransportError::NotFound(key(path)))?;
            let start = offset as usize;
            let end = (offset + len).min(content.len() as u64) as usize;
            Ok(content[start.min(end)..end].to_vec())
        }

        async fn write_chunk(
            &self,
            path: &LocalPath,
            offset: u64,
            data: &[u8],
        ) -> Result<(), TransportError> {
            let mut files = self.files.lock().unwrap();
            let content = files.entry(key(path)).or_default();
            let end = offset as usize + data.len();
            if content.len() < end {
                content.resize(end, 0);
            }
            content[offset as usize..end].copy_from_slice(data);
            Ok(())
        }

        async fn remove(&self, path: &LocalPath) -> Result<(), TransportError> {
            self.files.lock().unwrap().remove(&key(path));
            self.removed.lock().unwrap().push(key(path));
            Ok(())
        }

        async fn relocate(&self, from: &LocalPath, to: &LocalPath) -> Result<(), TransportError> {
            let mut files = self.files.lock().unwrap();
            if let Some(content) = files.remove(&key(from)) {
                files.insert(key(to), content);
            }
            Ok(())
        }

        async fn create_folder(&self, path: &LocalPath) -> Result<(), TransportError> {
            self.files.lock().unwrap().insert(key(path), Vec::new());
            Ok(())
        }

        async fn content_hash(&self, path: &LocalPath) -> Result<ContentHash, TransportError> {
            let hash = self
                .hashes
                .lock()
                .unwrap()
                .get(&key(path))
                .cloned()
                .unwrap_or_else(|| "h-local".to_string());
            ContentHash::new(hash).map_err(|_| TransportError::Other("hash".into()))
        }
    }

    // ------------------------------------------------------------------
    // Fixtures
    // ------------------------------------------------------------------

    fn lpath(s: &str) -> LocalPath {
        LocalPath::new(PathBuf::from(s)).unwrap()
    }

    fn rpath(s: &str) -> RemotePath {
        RemotePath::new(s.to_string()).unwrap()
    }

    fn scheduler(
        cloud: Arc<MockCloud>,
        local: Arc<MockLocal>,
    ) -> (Arc<SyncIndex>, TransferScheduler) {
        let index = Arc::new(SyncIndex::new());
        let governor = Arc::new(BandwidthGovernor::new(BandwidthConfig::default()));
        let sched = TransferScheduler::new(Arc::clone(&index), cloud, local, governor, 3);
        (index, sched)
    }

    fn local_file(index: &SyncIndex, path: &str, remote: &str, size: u64, hash: &str) -> ItemId {
        let mut item = SyncItem::new_local(lpath(path), rpath(remote), ItemKind::File, size);
        item.set_content_hash(ContentHash::new(hash.to_string()).unwrap());
        let id = *item.id();
        index.upsert(item).unwrap();
        id
    }

    fn remote_file(index: &SyncIndex, path: &str, remote: &str, rid: &str, size: u64, hash: &str) -> ItemId {
        let item = SyncItem::new_remote(
            lpath(path),
            rpath(remote),
            RemoteId::new(rid.to_string()).unwrap(),
            ItemKind::File,
            size,
            Some(ContentHash::new(hash.to_string()).unwrap()),
            None,
        );
        let id = *item.id();
        index.upsert(item).unwrap();
        id
    }

    // ------------------------------------------------------------------
    // Tests
    // ------------------------------------------------------------------

    mod upload_tests {
        use super::*;

        #[tokio::test]
        async fn test_upload_completes_and_pairs_identity() {
            let content = vec![7u8; 1000];
            let cloud = Arc::new(MockCloud::default());
            cloud.set_complete_hash("h1");
            let local = Arc::new(MockLocal::with_file("/sync/a.txt", &content));
            let (index, sched) = scheduler(Arc::clone(&cloud), local);
            let id = local_file(&index, "/sync/a.txt", "/a.txt", 1000, "h1");

            assert!(sched.enqueue(SyncOperation::new(id, OperationKind::Upload, 1000)));
            let (done_op, result) = sched.run_next().await.unwrap();
            assert_eq!(*done_op.item_id(), id);
            result.unwrap();

            let item = index.get(&id).unwrap();
            assert_eq!(item.state(), &SyncState::Synced);
            assert!(item.remote_id().is_some());
            assert_eq!(cloud.uploaded("tok-a.txt"), content);
            assert_eq!(sched.stats_snapshot().uploads_completed, 1);
        }

        #[tokio::test]
        async fn test_upload_chunks_large_file() {
            // Just over two chunks.
            let size = 2 * crate::worker::CHUNK_SIZE as usize + 17;
            let content = vec![3u8; size];
            let cloud = Arc::new(MockCloud::default());
            cloud.set_complete_hash("h1");
            let local = Arc::new(MockLocal::with_file("/sync/big.bin", &content));
            let (index, sched) = scheduler(Arc::clone(&cloud), local);
            let id = local_file(&index, "/sync/big.bin", "/big.bin", size as u64, "h1");

            sched.enqueue(SyncOperation::new(id, OperationKind::Upload, size as u64));
            sched.run_next().await.unwrap().1.unwrap();
            assert_eq!(cloud.uploaded("tok-big.bin").len(), size);
        }

        #[tokio::test]
        async fn test_cancel_suspends_and_resume_continues_from_checkpoint() {
            let size = 2 * crate::worker::CHUNK_SIZE as usize;
            let content = vec![9u8; size];
            let cloud = Arc::new(MockCloud::default());
            cloud.set_complete_hash("h1");
            let local = Arc::new(MockLocal::with_file("/sync/a.bin", &content));
            let index = Arc::new(SyncIndex::new());
            let governor = Arc::new(BandwidthGovernor::new(BandwidthConfig::default()));
            let sched = Arc::new(TransferScheduler::new(
                Arc::clone(&index),
                Arc::clone(&cloud) as Arc<dyn CloudTransport>,
                Arc::clone(&local) as Arc<dyn LocalStore>,
                governor,
                3,
            ));
            let id = local_file(&index, "/sync/a.bin", "/a.bin", size as u64, "h1");

            // The mock requests cancellation after the first accepted chunk.
            let sched_ref = Arc::clone(&sched);
            *cloud.on_chunk.lock().unwrap() = Some(Box::new(move || {
                sched_ref.cancel(&id);
            }));
            sched.enqueue(SyncOperation::new(id, OperationKind::Upload, size as u64));
            let (_, result) = sched.run_next().await.unwrap();
            assert!(matches!(result, Err(TransferError::Cancelled)));

            let suspended = sched.suspended_sessions();
            assert_eq!(suspended.len(), 1);
            assert_eq!(suspended[0].transferred_bytes(), crate::worker::CHUNK_SIZE);

            // Second attempt resumes without reopening the upload.
            *cloud.on_chunk.lock().unwrap() = None;
            sched.enqueue(SyncOperation::new(id, OperationKind::Upload, size as u64));
            sched.run_next().await.unwrap().1.unwrap();
            assert_eq!(cloud.begin_calls.load(Ordering::SeqCst), 1);
            assert_eq!(cloud.uploaded("tok-a.bin").len(), size);
            assert_eq!(index.get(&id).unwrap().state(), &SyncState::Synced);
        }

        #[tokio::test(start_paused = true)]
        async fn test_stalled_chunk_times_out_as_network_error() {
            let cloud = Arc::new(MockCloud::default());
            cloud.stall_chunks.store(true, Ordering::SeqCst);
            let local = Arc::new(MockLocal::with_file("/sync/a.txt", b"hello"));
            let (index, sched) = scheduler(Arc::clone(&cloud), local);
            let id = local_file(&index, "/sync/a.txt", "/a.txt", 5, "h1");

            sched.enqueue(SyncOperation::new(id, OperationKind::Upload, 5));
            // Paused time jumps to the transfer bound instead of sitting
            // through the stalled call; the worker must come back with a
            // retryable network error, not hang.
            let (_, result) = sched.run_next().await.unwrap();
            assert!(matches!(
                result,
                Err(TransferError::Transport(TransportError::Network(_)))
            ));
            assert_eq!(sched.stats_snapshot().failed_attempts, 1);
        }

        #[tokio::test]
        async fn test_upload_integrity_mismatch_fails() {
            let cloud = Arc::new(MockCloud::default());
            cloud.set_complete_hash("tampered");
            let local = Arc::new(MockLocal::with_file("/sync/a.txt", b"hello"));
            let (index, sched) = scheduler(cloud, local);
            let id = local_file(&index, "/sync/a.txt", "/a.txt", 5, "h1");

            sched.enqueue(SyncOperation::new(id, OperationKind::Upload, 5));
            let (_, result) = sched.run_next().await.unwrap();
            assert!(matches!(
                result,
                Err(TransferError::Transport(TransportError::IntegrityMismatch { .. }))
            ));
            assert_eq!(sched.stats_snapshot().failed_attempts, 1);
        }

        #[tokio::test]
        async fn test_empty_file_uploads() {
            let cloud = Arc::new(MockCloud::default());
            cloud.set_complete_hash("h-empty");
            let local = Arc::new(MockLocal::with_file("/sync/empty", b""));
            let (index, sched) = scheduler(cloud, local);
            let id = local_file(&index, "/sync/empty", "/empty", 0, "h-empty");

            sched.enqueue(SyncOperation::new(id, OperationKind::Upload, 0));
            sched.run_next().await.unwrap().1.unwrap();
            assert_eq!(index.get(&id).unwrap().state(), &SyncState::Synced);
        }
    }

    mod download_tests {
        use super::*;

        #[tokio::test]
        async fn test_download_writes_content_and_verifies() {
            let content = vec![5u8; 700];
            let cloud = Arc::new(MockCloud::with_file("R1", &content));
            let local = Arc::new(MockLocal::default());
            local.set_hash("/sync/b.txt", "h1");
            let (index, sched) = scheduler(cloud, Arc::clone(&local));
            let id = remote_file(&index, "/sync/b.txt", "/b.txt", "R1", 700, "h1");

            sched.enqueue(SyncOperation::new(id, OperationKind::Download, 700));
            sched.run_next().await.unwrap().1.unwrap();

            assert_eq!(local.content("/sync/b.txt"), content);
            let item = index.get(&id).unwrap();
            assert_eq!(item.state(), &SyncState::Synced);
            assert!(item.is_offline_available());
            assert_eq!(sched.stats_snapshot().downloads_completed, 1);
        }

        #[tokio::test]
        async fn test_download_verification_failure_surfaces() {
            let cloud = Arc::new(MockCloud::with_file("R1", b"abc"));
            let local = Arc::new(MockLocal::default());
            local.set_hash("/sync/b.txt", "wrong");
            let (index, sched) = scheduler(cloud, local);
            let id = remote_file(&index, "/sync/b.txt", "/b.txt", "R1", 3, "h1");

            sched.enqueue(SyncOperation::new(id, OperationKind::Download, 3));
            let (_, result) = sched.run_next().await.unwrap();
            assert!(matches!(
                result,
                Err(TransferError::Transport(TransportError::IntegrityMismatch { .. }))
            ));
        }
    }

    mod metadata_tests {
        use super::*;

        #[tokio::test]
        async fn test_delete_remote_tombstones() {
            let cloud = Arc::new(MockCloud::default());
            let local = Arc::new(MockLocal::default());
            let (index, sched) = scheduler(Arc::clone(&cloud), local);
            let id = remote_file(&index, "/sync/c.txt", "/c.txt", "R9", 10, "h1");

            sched.enqueue(SyncOperation::new(id, OperationKind::DeleteRemote, 0));
            sched.run_next().await.unwrap().1.unwrap();

            assert_eq!(cloud.deleted.lock().unwrap().as_slice(), ["R9"]);
            assert!(index.get(&id).unwrap().is_tombstoned());
        }

        #[tokio::test]
        async fn test_delete_local_removes_file() {
            let cloud = Arc::new(MockCloud::default());
            let local = Arc::new(MockLocal::with_file("/sync/d.txt", b"x"));
            let (index, sched) = scheduler(cloud, Arc::clone(&local));
            let id = remote_file(&index, "/sync/d.txt", "/d.txt", "R2", 1, "h1");

            sched.enqueue(SyncOperation::new(id, OperationKind::DeleteLocal, 0));
            sched.run_next().await.unwrap().1.unwrap();

            assert_eq!(local.removed.lock().unwrap().as_slice(), ["/sync/d.txt"]);
            assert!(index.get(&id).unwrap().is_tombstoned());
        }

        #[tokio::test]
        async fn test_local_origin_move_relocates_remote_copy() {
            let cloud = Arc::new(MockCloud::default());
            let local = Arc::new(MockLocal::default());
            let (index, sched) = scheduler(Arc::clone(&cloud), local);
            let id = remote_file(&index, "/sync/docs/e.txt", "/docs/e.txt", "R3", 10, "h1");

            // The index was already re-keyed when the local move was seen.
            let op = SyncOperation::new_relocation(
                id,
                OperationKind::Move,
                lpath("/sync/docs/e.txt"),
                rpath("/docs/e.txt"),
            );
            sched.enqueue(op);
            sched.run_next().await.unwrap().1.unwrap();

            assert_eq!(
                cloud.relocated.lock().unwrap().as_slice(),
                [("R3".to_string(), "/docs/e.txt".to_string())]
            );
        }

        #[tokio::test]
        async fn test_remote_origin_move_relocates_local_copy() {
            let cloud = Arc::new(MockCloud::default());
            let local = Arc::new(MockLocal::with_file("/sync/f.txt", b"f"));
            let (index, sched) = scheduler(cloud, Arc::clone(&local));
            let id = remote_file(&index, "/sync/f.txt", "/f.txt", "R4", 1, "h1");

            let op = SyncOperation::new_relocation(
                id,
                OperationKind::Move,
                lpath("/sync/archive/f.txt"),
                rpath("/archive/f.txt"),
            );
            sched.enqueue(op);
            sched.run_next().await.unwrap().1.unwrap();

            assert_eq!(local.content("/sync/archive/f.txt"), b"f");
            let item = index.get(&id).unwrap();
            assert_eq!(item.local_path(), &lpath("/sync/archive/f.txt"));
            assert_eq!(item.remote_path(), &rpath("/archive/f.txt"));
        }
    }

    mod scheduling_tests {
        use super::*;

        #[tokio::test]
        async fn test_duplicate_enqueue_rejected() {
            let cloud = Arc::new(MockCloud::default());
            let local = Arc::new(MockLocal::default());
            let (index, sched) = scheduler(cloud, local);
            let id = local_file(&index, "/sync/g.txt", "/g.txt", 10, "h1");

            assert!(sched.enqueue(SyncOperation::new(id, OperationKind::Upload, 10)));
            assert!(!sched.enqueue(SyncOperation::new(id, OperationKind::Upload, 10)));
        }

        #[tokio::test]
        async fn test_empty_queue_returns_none() {
            let cloud = Arc::new(MockCloud::default());
            let local = Arc::new(MockLocal::default());
            let (_, sched) = scheduler(cloud, local);
            assert!(sched.run_next().await.is_none());
        }

        #[tokio::test]
        async fn test_metered_pause_defers_transfers() {
            let cloud = Arc::new(MockCloud::default());
            let local = Arc::new(MockLocal::with_file("/sync/h.txt", b"h"));
            let index = Arc::new(SyncIndex::new());
            let mut cfg = BandwidthConfig::default();
            cfg.pause_on_metered = true;
            let governor = Arc::new(BandwidthGovernor::new(cfg));
            let sched = TransferScheduler::new(
                Arc::clone(&index),
                cloud,
                local,
                Arc::clone(&governor),
                3,
            );
            let id = local_file(&index, "/sync/h.txt", "/h.txt", 1, "h1");

            governor.set_metered(true);
            sched.enqueue(SyncOperation::new(id, OperationKind::Upload, 1));
            assert!(sched.run_next().await.is_none());
            assert_eq!(sched.queued_len(), 1);

            // Back off the metered network and the transfer proceeds.
            governor.set_metered(false);
            assert!(sched.run_next().await.is_some());
        }

        #[tokio::test]
        async fn test_cancel_without_in_flight_is_noop() {
            let cloud = Arc::new(MockCloud::default());
            let local = Arc::new(MockLocal::default());
            let (_, sched) = scheduler(cloud, local);
            assert!(!sched.cancel(&ItemId::new()));
        }
    }
}
