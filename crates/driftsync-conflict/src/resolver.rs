//! Conflict resolution
//!
//! Applies a [`ResolutionStrategy`] to a conflicted item. Strategies that
//! pick a winner reduce the conflict to a plain stale-side transfer;
//! `KeepBoth` splits the item in two. Every outcome is reported as a
//! [`ConflictResolutionResult`] and a failed application leaves the item in
//! conflict so it can be retried.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use driftsync_core::domain::{
    ConflictInfo, ItemKind, LocalPath, OperationKind, ResolutionStrategy, SyncEvent, SyncItem,
    SyncOperation, SyncState,
};
use driftsync_index::SyncIndex;

use crate::error::ConflictError;
use crate::namer;
use crate::policy::ConflictPolicy;

/// Outcome of one resolution attempt
#[derive(Debug, Clone)]
pub struct ConflictResolutionResult {
    pub strategy: ResolutionStrategy,
    /// The surviving (or renamed) item
    pub item: SyncItem,
    /// Second item minted by `KeepBoth`
    pub created: Option<SyncItem>,
    /// Follow-up operations for the scheduler
    pub operations: Vec<SyncOperation>,
    pub success: bool,
    pub error: Option<String>,
}

impl ConflictResolutionResult {
    fn pending(strategy: ResolutionStrategy, item: SyncItem) -> Self {
        Self {
            strategy,
            item,
            created: None,
            operations: Vec::new(),
            success: true,
            error: None,
        }
    }

    fn failed(strategy: ResolutionStrategy, item: SyncItem, error: String) -> Self {
        Self {
            strategy,
            item,
            created: None,
            operations: Vec::new(),
            success: false,
            error: Some(error),
        }
    }
}

/// Applies resolution strategies against the index
pub struct ConflictResolver {
    index: Arc<SyncIndex>,
    policy: ConflictPolicy,
}

impl ConflictResolver {
    pub fn new(index: Arc<SyncIndex>, policy: ConflictPolicy) -> Self {
        Self { index, policy }
    }

    pub fn policy(&self) -> &ConflictPolicy {
        &self.policy
    }

    /// Resolves using the per-path policy
    ///
    /// If the policy names a strategy that is illegal for this conflict
    /// kind, the item falls back to `AskUser` instead of failing; only an
    /// explicit user request gets the hard `InvalidResolution` error.
    pub fn resolve_auto(
        &self,
        item_id: &driftsync_core::domain::ItemId,
    ) -> Result<ConflictResolutionResult, ConflictError> {
        let item = self
            .index
            .get(item_id)
            .ok_or(driftsync_index::IndexError::ItemNotFound(*item_id))?;
        let info = item
            .conflict()
            .ok_or_else(|| ConflictError::NotInConflict(item.local_path().to_string()))?;

        let mut strategy = self.policy.strategy_for(item.local_path());
        if !info.allows(strategy) {
            warn!(
                path = %item.local_path(),
                %strategy,
                kind = %info.kind(),
                "policy strategy illegal for conflict kind, awaiting user"
            );
            strategy = ResolutionStrategy::AskUser;
        }
        self.resolve(item_id, strategy)
    }

    /// Applies `strategy` to the conflicted item
    ///
    /// # Errors
    /// `InvalidResolution` if the strategy is illegal for the conflict kind;
    /// `NotInConflict` if the item carries no descriptor. Application
    /// failures are reported inside the result with `success == false`.
    pub fn resolve(
        &self,
        item_id: &driftsync_core::domain::ItemId,
        strategy: ResolutionStrategy,
    ) -> Result<ConflictResolutionResult, ConflictError> {
        let item = self
            .index
            .get(item_id)
            .ok_or(driftsync_index::IndexError::ItemNotFound(*item_id))?;
        let info = item
            .conflict()
            .cloned()
            .ok_or_else(|| ConflictError::NotInConflict(item.local_path().to_string()))?;

        if !info.allows(strategy) {
            return Err(ConflictError::InvalidResolution {
                strategy,
                kind: info.kind(),
            });
        }

        let result = match strategy {
            // Leaves the item suspended in Conflict for an external choice.
            ResolutionStrategy::AskUser => {
                return Ok(ConflictResolutionResult::pending(strategy, item));
            }
            ResolutionStrategy::KeepLocal => self.keep_side(&item, strategy, true),
            ResolutionStrategy::KeepCloud => self.keep_side(&item, strategy, false),
            ResolutionStrategy::KeepNewer => {
                let keep_local = match (info.local().modified_at(), info.remote().modified_at()) {
                    // Exact ties keep local.
                    (Some(local), Some(remote)) => local >= remote,
                    // A side without a timestamp cannot win.
                    (Some(_), None) => true,
                    (None, Some(_)) => false,
                    (None, None) => true,
                };
                self.keep_side(&item, strategy, keep_local)
            }
            ResolutionStrategy::KeepLarger => {
                // Exact ties keep local.
                let keep_local = info.local().size_bytes() >= info.remote().size_bytes();
                self.keep_side(&item, strategy, keep_local)
            }
            ResolutionStrategy::KeepBoth => self.keep_both(&item, &info),
        };

        if let Ok(res) = &result {
            if res.success {
                info!(
                    path = %res.item.local_path(),
                    strategy = %res.strategy,
                    "conflict resolved"
                );
                self.index.publish(SyncEvent::ConflictResolved {
                    item_id: *res.item.id(),
                    path: res.item.local_path().clone(),
                    strategy: res.strategy,
                    at: Utc::now(),
                });
            }
        }
        result
    }

    /// Reduces the conflict to a transfer toward the losing side
    fn keep_side(
        &self,
        item: &SyncItem,
        strategy: ResolutionStrategy,
        keep_local: bool,
    ) -> Result<ConflictResolutionResult, ConflictError> {
        let target_state = if keep_local {
            SyncState::LocalOnly
        } else {
            SyncState::CloudOnly
        };
        let updated = match self.index.update(item.id(), |it| {
            it.clear_conflict();
            it.transition_to(target_state.clone())
        }) {
            Ok(updated) => updated,
            Err(e) => {
                return Ok(ConflictResolutionResult::failed(
                    strategy,
                    item.clone(),
                    e.to_string(),
                ));
            }
        };

        let op_kind = if keep_local {
            OperationKind::Upload
        } else {
            OperationKind::Download
        };
        let op = SyncOperation::new(*updated.id(), op_kind, updated.size_bytes());

        let mut result = ConflictResolutionResult::pending(strategy, updated);
        result.operations.push(op);
        Ok(result)
    }

    /// Renames the local copy and re-homes the cloud version in a new item
    fn keep_both(
        &self,
        item: &SyncItem,
        info: &ConflictInfo,
    ) -> Result<ConflictResolutionResult, ConflictError> {
        let strategy = ResolutionStrategy::KeepBoth;
        let remote_id = match item.remote_id() {
            Some(id) => id.clone(),
            None => {
                return Ok(ConflictResolutionResult::failed(
                    strategy,
                    item.clone(),
                    "cloud identity unknown for keep-both".to_string(),
                ));
            }
        };

        let original_local = item.local_path().clone();
        let original_remote = item.remote_path().clone();

        // Deterministic rename of the local copy, derived from detection time.
        let parent: PathBuf = match original_local.as_ref().parent() {
            Some(p) => p.to_path_buf(),
            None => {
                return Ok(ConflictResolutionResult::failed(
                    strategy,
                    item.clone(),
                    "conflicted item has no parent directory".to_string(),
                ));
            }
        };
        let new_name = match namer::available_conflict_name(
            item.name(),
            info.detected_at(),
            |candidate| {
                LocalPath::new(parent.join(candidate))
                    .ok()
                    .and_then(|p| self.index.get_by_path(&p))
                    .is_some()
            },
        ) {
            Some(name) => name,
            None => {
                return Ok(ConflictResolutionResult::failed(
                    strategy,
                    item.clone(),
                    "no available conflict-copy name".to_string(),
                ));
            }
        };

        let new_local = match LocalPath::new(parent.join(&new_name)) {
            Ok(p) => p,
            Err(e) => {
                return Ok(ConflictResolutionResult::failed(
                    strategy,
                    item.clone(),
                    e.to_string(),
                ));
            }
        };
        let new_remote = match original_remote
            .parent()
            .unwrap_or_else(driftsync_core::domain::RemotePath::root)
            .join(&new_name)
        {
            Ok(p) => p,
            Err(e) => {
                return Ok(ConflictResolutionResult::failed(
                    strategy,
                    item.clone(),
                    e.to_string(),
                ));
            }
        };

        if let Err(e) = self
            .index
            .relocate(item.id(), new_local.clone(), new_remote.clone())
        {
            return Ok(ConflictResolutionResult::failed(
                strategy,
                item.clone(),
                e.to_string(),
            ));
        }

        let renamed = match self.index.update(item.id(), |it| {
            it.clear_conflict();
            it.clear_remote_id();
            it.transition_to(SyncState::LocalOnly)
        }) {
            Ok(it) => it,
            Err(e) => {
                return Ok(ConflictResolutionResult::failed(
                    strategy,
                    item.clone(),
                    e.to_string(),
                ));
            }
        };

        // The cloud version keeps the original paths and identity.
        let cloud_item = SyncItem::new_remote(
            original_local,
            original_remote,
            remote_id,
            item.kind(),
            info.remote().size_bytes(),
            info.remote().hash().cloned(),
            info.remote().modified_at(),
        );
        if let Err(e) = self.index.upsert(cloud_item.clone()) {
            return Ok(ConflictResolutionResult::failed(
                strategy,
                renamed,
                e.to_string(),
            ));
        }

        let upload = SyncOperation::new(*renamed.id(), OperationKind::Upload, renamed.size_bytes());
        let download = SyncOperation::new(
            *cloud_item.id(),
            OperationKind::Download,
            cloud_item.size_bytes(),
        );

        Ok(ConflictResolutionResult {
            strategy,
            item: renamed,
            created: Some(cloud_item),
            operations: vec![upload, download],
            success: true,
            error: None,
        })
    }
}
