use anyhow::Result;

use super::store::{FeedStore, FollowStream};
use crate::storage::{Feed, FollowInstruction};

/// Follow counts observed while moving a copy's followers to its master
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FollowMigration {
    /// Follows that referenced the copy
    pub found: usize,
    /// Copy rows moved onto the master in place
    pub retargeted: u64,
    /// Master follows that exist for the migrated users afterwards
    pub ensured: usize,
    /// Copy rows deleted because their user already followed the master
    pub superseded: u64,
}

/// Move every follow of `copy` onto `master`, leaving each user with a single
/// master follow and no copy follows.
///
/// The store has no unique (user, feed) index, so this runs as a retarget of
/// the rows whose user is not yet on the master, a get-or-create to fill any
/// gap, and a delete of whatever still points at the copy. Every step is safe
/// to repeat.
pub async fn migrate_follows<S, F>(
    store: &S,
    stream: &F,
    master: &Feed,
    copy: &Feed,
) -> Result<FollowMigration>
where
    S: FeedStore + ?Sized,
    F: FollowStream + ?Sized,
{
    let follows = store.find_follows(copy.id).await?;

    for follow in &follows {
        stream.detach(follow).await?;
    }

    let retargeted = store.retarget_follows(copy.id, master.id).await?;

    let instructions: Vec<FollowInstruction> = follows
        .iter()
        .map(|follow| FollowInstruction {
            kind: follow.kind,
            user_id: follow.user_id,
            feed_id: master.id,
        })
        .collect();
    let ensured = store.get_or_create_follows(&instructions).await?;
    for follow in &ensured {
        stream.attach(follow).await?;
    }

    tracing::info!(
        copy_id = copy.id,
        master_id = master.id,
        follows = follows.len(),
        "Removed follows from stream and added them for the master feed"
    );

    let superseded = store.delete_follows(copy.id).await?;

    let migration = FollowMigration {
        found: follows.len(),
        retargeted,
        ensured: ensured.len(),
        superseded,
    };
    tracing::info!(
        found = migration.found,
        retargeted = migration.retargeted,
        ensured = migration.ensured,
        superseded = migration.superseded,
        "Updated the follow records"
    );

    Ok(migration)
}
