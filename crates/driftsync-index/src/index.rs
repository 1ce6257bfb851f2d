//! The sync index
//!
//! Concurrent registry of tracked items. Reads return owned snapshots so
//! callers never hold a shard lock across an await point; `query` iterates
//! over a point-in-time copy and is restartable.

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

use driftsync_core::domain::{
    ItemId, LocalPath, RemoteId, SyncEvent, SyncItem, SyncState,
};

use crate::error::IndexError;

/// Buffered status events before slow subscribers start lagging.
const EVENT_CAPACITY: usize = 256;

/// Count of items per sync state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusStatistics {
    pub synced: usize,
    pub uploading: usize,
    pub downloading: usize,
    pub local_only: usize,
    pub cloud_only: usize,
    pub conflict: usize,
    pub error: usize,
    pub paused: usize,
}

impl StatusStatistics {
    pub fn total(&self) -> usize {
        self.synced
            + self.uploading
            + self.downloading
            + self.local_only
            + self.cloud_only
            + self.conflict
            + self.error
            + self.paused
    }

    /// Items with a transfer in flight
    pub fn syncing(&self) -> usize {
        self.uploading + self.downloading
    }

    /// Items needing user attention
    pub fn attention(&self) -> usize {
        self.conflict + self.error
    }
}

/// Authoritative in-memory registry of sync items
pub struct SyncIndex {
    items: DashMap<ItemId, SyncItem>,
    by_path: DashMap<LocalPath, ItemId>,
    by_remote: DashMap<RemoteId, ItemId>,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncIndex {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            items: DashMap::new(),
            by_path: DashMap::new(),
            by_remote: DashMap::new(),
            events,
        }
    }

    /// Subscribes to the status event stream
    ///
    /// Receivers that fall behind observe `RecvError::Lagged`; the index
    /// never blocks on a slow subscriber.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Publishes an event on the shared stream
    ///
    /// The index owns the engine-wide event channel; other components
    /// (resolver, cache, reconciler) publish through it so subscribers see
    /// one ordered stream.
    pub fn publish(&self, event: SyncEvent) {
        let _ = self.events.send(event);
    }

    /// Inserts a new item or replaces an existing one by id
    ///
    /// # Errors
    /// Returns `IndexError::DuplicateIdentity` if the item's local path or
    /// remote id is already claimed by a different item.
    pub fn upsert(&self, item: SyncItem) -> Result<(), IndexError> {
        let id = *item.id();

        if let Some(existing) = self.by_path.get(item.local_path()) {
            if *existing != id {
                return Err(IndexError::DuplicateIdentity(format!(
                    "local path {} already tracked",
                    item.local_path()
                )));
            }
        }
        if let Some(remote_id) = item.remote_id() {
            if let Some(existing) = self.by_remote.get(remote_id) {
                if *existing != id {
                    return Err(IndexError::DuplicateIdentity(format!(
                        "remote id {} already tracked",
                        remote_id
                    )));
                }
            }
        }

        // Drop secondary keys of the previous version if they changed.
        if let Some(previous) = self.items.get(&id) {
            if previous.local_path() != item.local_path() {
                self.by_path.remove(previous.local_path());
            }
            match (previous.remote_id(), item.remote_id()) {
                (Some(old), new) if new != Some(old) => {
                    self.by_remote.remove(old);
                }
                _ => {}
            }
        }

        self.by_path.insert(item.local_path().clone(), id);
        if let Some(remote_id) = item.remote_id() {
            self.by_remote.insert(remote_id.clone(), id);
        }
        debug!(item_id = %id, path = %item.local_path(), "index upsert");
        self.items.insert(id, item);
        Ok(())
    }

    /// Returns an owned snapshot of the item
    pub fn get(&self, id: &ItemId) -> Option<SyncItem> {
        self.items.get(id).map(|entry| entry.clone())
    }

    pub fn get_by_path(&self, path: &LocalPath) -> Option<SyncItem> {
        self.by_path
            .get(path)
            .and_then(|id| self.items.get(&id).map(|entry| entry.clone()))
    }

    pub fn get_by_remote_id(&self, remote_id: &RemoteId) -> Option<SyncItem> {
        self.by_remote
            .get(remote_id)
            .and_then(|id| self.items.get(&id).map(|entry| entry.clone()))
    }

    /// Transitions an item to `state`, broadcasting the change
    ///
    /// # Errors
    /// `ItemNotFound` for an absent identity; `Domain` if the transition is
    /// illegal. Illegal transitions leave the item untouched.
    pub fn set_state(&self, id: &ItemId, state: SyncState) -> Result<(), IndexError> {
        let mut entry = self
            .items
            .get_mut(id)
            .ok_or(IndexError::ItemNotFound(*id))?;
        let previous = entry.state().clone();
        entry.transition_to(state.clone())?;
        let event = SyncEvent::StatusChange {
            item_id: *id,
            path: entry.local_path().clone(),
            previous,
            current: state,
            at: Utc::now(),
        };
        drop(entry);
        let _ = self.events.send(event);
        Ok(())
    }

    /// Applies a closure to an item in place and persists the result
    ///
    /// Used by the reconciler and resolver for compound mutations that must
    /// happen under the entry lock. No status event is emitted; use
    /// [`set_state`](SyncIndex::set_state) for transitions.
    pub fn update<F>(&self, id: &ItemId, f: F) -> Result<SyncItem, IndexError>
    where
        F: FnOnce(&mut SyncItem) -> Result<(), driftsync_core::domain::DomainError>,
    {
        let mut entry = self
            .items
            .get_mut(id)
            .ok_or(IndexError::ItemNotFound(*id))?;
        f(entry.value_mut())?;
        Ok(entry.clone())
    }

    /// Re-keys an item after a move or rename
    pub fn relocate(
        &self,
        id: &ItemId,
        local_path: LocalPath,
        remote_path: driftsync_core::domain::RemotePath,
    ) -> Result<(), IndexError> {
        if let Some(existing) = self.by_path.get(&local_path) {
            if *existing != *id {
                return Err(IndexError::DuplicateIdentity(format!(
                    "local path {} already tracked",
                    local_path
                )));
            }
        }
        let mut entry = self
            .items
            .get_mut(id)
            .ok_or(IndexError::ItemNotFound(*id))?;
        self.by_path.remove(entry.local_path());
        entry.relocate(local_path.clone(), remote_path);
        self.by_path.insert(local_path, *id);
        Ok(())
    }

    /// Tombstones an item and releases its identity keys
    pub fn tombstone(&self, id: &ItemId) -> Result<(), IndexError> {
        let mut entry = self
            .items
            .get_mut(id)
            .ok_or(IndexError::ItemNotFound(*id))?;
        entry.tombstone()?;
        self.by_path.remove(entry.local_path());
        if let Some(remote_id) = entry.remote_id() {
            self.by_remote.remove(remote_id);
        }
        debug!(item_id = %id, "item tombstoned");
        Ok(())
    }

    /// Removes a tombstoned item entirely (store compaction)
    pub fn purge(&self, id: &ItemId) -> Option<SyncItem> {
        self.items.remove(id).map(|(_, item)| item)
    }

    /// Returns a point-in-time snapshot of items matching `predicate`
    ///
    /// The snapshot is owned: callers may iterate, drop, and re-query
    /// without holding any index lock.
    pub fn query<P>(&self, predicate: P) -> Vec<SyncItem>
    where
        P: Fn(&SyncItem) -> bool,
    {
        self.items
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.clone())
            .collect()
    }

    /// Count of live (non-tombstoned) items
    pub fn len(&self) -> usize {
        self.items
            .iter()
            .filter(|entry| !entry.is_tombstoned())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Count of items per state, excluding tombstones
    pub fn statistics(&self) -> StatusStatistics {
        let mut stats = StatusStatistics::default();
        for entry in self.items.iter() {
            if entry.is_tombstoned() {
                continue;
            }
            match entry.state() {
                SyncState::Synced => stats.synced += 1,
                SyncState::Uploading => stats.uploading += 1,
                SyncState::Downloading => stats.downloading += 1,
                SyncState::LocalOnly => stats.local_only += 1,
                SyncState::CloudOnly => stats.cloud_only += 1,
                SyncState::Conflict => stats.conflict += 1,
                SyncState::Error(_) => stats.error += 1,
                SyncState::Paused => stats.paused += 1,
            }
        }
        stats
    }
}

impl Default for SyncIndex {
    fn default() -> Self {
        Self::new()
    }
}
