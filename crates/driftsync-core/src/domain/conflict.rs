//! Conflict descriptors and resolution strategies
//!
//! A conflict is recorded when both sides of an item changed since the last
//! agreed version and the changes cannot be merged mechanically. The
//! descriptor captures a frozen snapshot of both versions at detection time;
//! the resolver in `driftsync-conflict` consumes it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::newtypes::ContentHash;

/// Classification of a detected conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Both sides modified content since the last agreed version
    Content,
    /// An item was created on both sides under the same name with
    /// different content
    Name,
    /// One side replaced a file with a folder of the same name (or the
    /// reverse)
    TypeMismatch,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKind::Content => write!(f, "content"),
            ConflictKind::Name => write!(f, "name"),
            ConflictKind::TypeMismatch => write!(f, "type mismatch"),
        }
    }
}

/// Frozen view of one side of a conflicted item at detection time
///
/// Stored by value so the descriptor stays meaningful even if the live item
/// keeps changing underneath it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionStamp {
    /// Content hash if one was available (folders have none)
    hash: Option<ContentHash>,
    /// Size in bytes
    size_bytes: u64,
    /// Modification timestamp if the side reported one
    modified_at: Option<DateTime<Utc>>,
}

impl VersionStamp {
    pub fn new(
        hash: Option<ContentHash>,
        size_bytes: u64,
        modified_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            hash,
            size_bytes,
            modified_at,
        }
    }

    pub fn hash(&self) -> Option<&ContentHash> {
        self.hash.as_ref()
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        self.modified_at
    }
}

/// How a conflict should be resolved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Leave the item in conflict and surface it to the host application
    #[default]
    AskUser,
    /// Local version wins; cloud version is overwritten
    KeepLocal,
    /// Cloud version wins; local version is overwritten
    KeepCloud,
    /// Keep both; the losing side is renamed with a conflict suffix
    KeepBoth,
    /// The side with the later modification timestamp wins
    KeepNewer,
    /// The side with the larger size wins
    KeepLarger,
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResolutionStrategy::AskUser => "ask-user",
            ResolutionStrategy::KeepLocal => "keep-local",
            ResolutionStrategy::KeepCloud => "keep-cloud",
            ResolutionStrategy::KeepBoth => "keep-both",
            ResolutionStrategy::KeepNewer => "keep-newer",
            ResolutionStrategy::KeepLarger => "keep-larger",
        };
        write!(f, "{}", s)
    }
}

/// Descriptor attached to an item while it is in conflict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictInfo {
    kind: ConflictKind,
    local: VersionStamp,
    remote: VersionStamp,
    detected_at: DateTime<Utc>,
}

impl ConflictInfo {
    pub fn new(kind: ConflictKind, local: VersionStamp, remote: VersionStamp) -> Self {
        Self {
            kind,
            local,
            remote,
            detected_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> ConflictKind {
        self.kind
    }

    pub fn local(&self) -> &VersionStamp {
        &self.local
    }

    pub fn remote(&self) -> &VersionStamp {
        &self.remote
    }

    pub fn detected_at(&self) -> DateTime<Utc> {
        self.detected_at
    }

    /// Strategies that are legal for this conflict kind
    ///
    /// A type mismatch admits no automatic winner or rename: a file and a
    /// folder cannot coexist under one name and size/time comparisons are
    /// meaningless across kinds, so only an explicit side choice is allowed.
    pub fn legal_resolutions(&self) -> &'static [ResolutionStrategy] {
        match self.kind {
            ConflictKind::Content | ConflictKind::Name => &[
                ResolutionStrategy::AskUser,
                ResolutionStrategy::KeepLocal,
                ResolutionStrategy::KeepCloud,
                ResolutionStrategy::KeepBoth,
                ResolutionStrategy::KeepNewer,
                ResolutionStrategy::KeepLarger,
            ],
            ConflictKind::TypeMismatch => {
                &[ResolutionStrategy::KeepLocal, ResolutionStrategy::KeepCloud]
            }
        }
    }

    /// Checks whether `strategy` may be applied to this conflict
    pub fn allows(&self, strategy: ResolutionStrategy) -> bool {
        self.legal_resolutions().contains(&strategy)
    }
}
