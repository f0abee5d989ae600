//! Merging a duplicate feed ("copy") into the feed that survives ("master").
//!
//! [`FeedMerger::merge`] runs the pipeline in a fixed order:
//!
//! 1. load both feeds
//! 2. move follows to the master ([`migrate_follows`])
//! 3. move pins to master articles, delete copy articles ([`reconcile_content`])
//! 4. delete the copy feed
//! 5. store the union of both feeds' URLs on the master ([`merge_feed_urls`])
//!
//! Each step commits on its own. A failure stops the pipeline and reports the
//! stage; nothing already committed is rolled back. Follow migration and URL
//! merging are safe to re-run, content reconciliation is not once the copy's
//! articles are gone.

mod content;
mod follows;
mod store;
mod urls;

use std::fmt;

use thiserror::Error;

use crate::storage::{Feed, FeedKind};

pub use content::{reconcile_content, ContentReconciliation};
pub use follows::{migrate_follows, FollowMigration};
pub use store::{FeedStore, FollowStream};
pub use urls::merge_feed_urls;

// ============================================================================
// Error Types
// ============================================================================

/// Which side of a merge a feed is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedRole {
    Master,
    Copy,
}

impl fmt::Display for FeedRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedRole::Master => f.write_str("master"),
            FeedRole::Copy => f.write_str("copy"),
        }
    }
}

/// Pipeline step a failed merge stopped in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStage {
    Load,
    Follows,
    Content,
    DeleteFeed,
    SaveMaster,
}

impl MergeStage {
    /// Whether re-running the merge after a failure in this stage finishes
    /// the job. From copy deletion on, the copy may already be gone and a
    /// re-run stops at `FeedNotFound`.
    pub fn is_resumable(self) -> bool {
        match self {
            MergeStage::Load | MergeStage::Follows | MergeStage::Content => true,
            MergeStage::DeleteFeed | MergeStage::SaveMaster => false,
        }
    }
}

impl fmt::Display for MergeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MergeStage::Load => "load",
            MergeStage::Follows => "follow migration",
            MergeStage::Content => "content reconciliation",
            MergeStage::DeleteFeed => "copy deletion",
            MergeStage::SaveMaster => "master save",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum MergeError {
    /// A feed ID did not resolve. Raised before anything is written.
    #[error("{role} feed {id} not found")]
    FeedNotFound { role: FeedRole, id: i64 },

    #[error("Cannot merge feed {0} into itself")]
    SameFeed(i64),

    #[error("Cannot merge a {copy} feed into a {master} feed")]
    KindMismatch { master: FeedKind, copy: FeedKind },

    /// A storage operation failed mid-merge. Steps before `stage` stay committed.
    #[error("Merge failed during {stage}: {source}")]
    Failed {
        stage: MergeStage,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl MergeError {
    fn failed(stage: MergeStage, err: anyhow::Error) -> Self {
        MergeError::Failed {
            stage,
            source: err.into(),
        }
    }

    /// Stage the merge stopped in, if it got past validation
    pub fn stage(&self) -> Option<MergeStage> {
        match self {
            MergeError::Failed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

// ============================================================================
// Merge Orchestrator
// ============================================================================

/// Outcome of a completed merge
#[derive(Debug, Clone)]
pub struct MergeReport {
    /// The master as persisted
    pub master: Feed,
    /// Primary URL of the deleted copy
    pub copy_url: String,
    pub follows: FollowMigration,
    pub content: ContentReconciliation,
}

/// Runs merges against a store and a live stream.
///
/// Concurrent merges touching the same feeds must be serialized by the
/// caller; the merger takes no locks.
pub struct FeedMerger<'a, S: ?Sized, F: ?Sized> {
    store: &'a S,
    stream: &'a F,
}

impl<'a, S, F> FeedMerger<'a, S, F>
where
    S: FeedStore + ?Sized,
    F: FollowStream + ?Sized,
{
    pub fn new(store: &'a S, stream: &'a F) -> Self {
        Self { store, stream }
    }

    /// Merge `copy_id` into `master_id`, returning the persisted master and
    /// what was moved.
    pub async fn merge(&self, master_id: i64, copy_id: i64) -> Result<MergeReport, MergeError> {
        if master_id == copy_id {
            return Err(MergeError::SameFeed(master_id));
        }

        let mut master = self.load(FeedRole::Master, master_id).await?;
        let copy = self.load(FeedRole::Copy, copy_id).await?;
        if master.kind != copy.kind {
            return Err(MergeError::KindMismatch {
                master: master.kind,
                copy: copy.kind,
            });
        }

        tracing::info!(
            copy_id = copy.id,
            copy_url = %copy.url,
            master_id = master.id,
            master_url = %master.url,
            "Removing copy feed and merging it with master"
        );

        let follows = migrate_follows(self.store, self.stream, &master, &copy)
            .await
            .map_err(|e| MergeError::failed(MergeStage::Follows, e))?;

        let content = reconcile_content(self.store, &master, &copy)
            .await
            .map_err(|e| MergeError::failed(MergeStage::Content, e))?;

        self.store
            .delete_feed(copy.id)
            .await
            .map_err(|e| MergeError::failed(MergeStage::DeleteFeed, e))?;

        master.feed_urls = merge_feed_urls(&master, &copy);
        tracing::info!(feed_urls = ?master.feed_urls, "Merged feed URLs");

        self.store
            .save_feed(&master)
            .await
            .map_err(|e| MergeError::failed(MergeStage::SaveMaster, e))?;

        tracing::info!(
            copy_url = %copy.url,
            master_url = %master.url,
            "Completed the merge"
        );

        Ok(MergeReport {
            master,
            copy_url: copy.url,
            follows,
            content,
        })
    }

    async fn load(&self, role: FeedRole, id: i64) -> Result<Feed, MergeError> {
        self.store
            .find_feed_by_id(id)
            .await
            .map_err(|e| MergeError::failed(MergeStage::Load, e))?
            .ok_or(MergeError::FeedNotFound { role, id })
    }
}

/// Merge `copy_id` into `master_id` and return the persisted master.
pub async fn merge_feeds<S, F>(
    store: &S,
    stream: &F,
    master_id: i64,
    copy_id: i64,
) -> Result<Feed, MergeError>
where
    S: FeedStore + ?Sized,
    F: FollowStream + ?Sized,
{
    let report = FeedMerger::new(store, stream).merge(master_id, copy_id).await?;
    Ok(report.master)
}
