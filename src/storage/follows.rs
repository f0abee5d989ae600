use std::collections::HashSet;

use anyhow::Result;

use super::schema::Database;
use super::types::{FeedKind, Follow, FollowDbRow, FollowInstruction};

impl Database {
    // ========================================================================
    // Follow Operations
    // ========================================================================

    /// Record that a user follows a feed and register the live stream
    /// subscription for it. Returns the new follow's ID.
    ///
    /// No uniqueness check: this is a raw insert, and calling it twice for the
    /// same (user, feed) leaves two rows. Use [`Database::get_or_create_follows`]
    /// when duplicates must be avoided.
    pub async fn insert_follow(&self, user_id: i64, feed_id: i64, kind: FeedKind) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let row: (i64,) = sqlx::query_as(
            "INSERT INTO follows (user_id, feed_id, kind, created_at) VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(user_id)
        .bind(feed_id)
        .bind(kind.as_str())
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT OR IGNORE INTO stream_subscriptions (user_id, feed_id, subscribed_at) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(feed_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.0)
    }

    /// Get every follow referencing a feed
    pub async fn find_follows(&self, feed_id: i64) -> Result<Vec<Follow>> {
        let rows: Vec<FollowDbRow> = sqlx::query_as(
            "SELECT id, user_id, feed_id, kind, created_at FROM follows WHERE feed_id = ? ORDER BY id",
        )
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(FollowDbRow::into_follow).collect()
    }

    /// Get every follow belonging to a user
    pub async fn find_follows_for_user(&self, user_id: i64) -> Result<Vec<Follow>> {
        let rows: Vec<FollowDbRow> = sqlx::query_as(
            "SELECT id, user_id, feed_id, kind, created_at FROM follows WHERE user_id = ? ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(FollowDbRow::into_follow).collect()
    }

    /// Number of follow rows for one (user, feed) pair
    pub async fn count_follows(&self, user_id: i64, feed_id: i64) -> Result<i64> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM follows WHERE user_id = ? AND feed_id = ?")
                .bind(user_id)
                .bind(feed_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0)
    }

    /// Make sure a follow exists for every instruction, returning one follow
    /// per distinct instruction in input order.
    ///
    /// The follows table has no unique index on (user_id, feed_id, kind), so
    /// the lookup and insert run in one transaction. SQLite allows a single
    /// writer, which keeps a concurrent caller from inserting between the two.
    pub async fn get_or_create_follows(
        &self,
        instructions: &[FollowInstruction],
    ) -> Result<Vec<Follow>> {
        if instructions.is_empty() {
            return Ok(Vec::new());
        }

        let now = chrono::Utc::now().timestamp();
        let mut seen = HashSet::new();
        let mut follows = Vec::with_capacity(instructions.len());
        let mut created = 0usize;
        let mut tx = self.pool.begin().await?;

        for instruction in instructions {
            if !seen.insert(*instruction) {
                continue;
            }

            let existing: Option<FollowDbRow> = sqlx::query_as(
                r#"
                SELECT id, user_id, feed_id, kind, created_at
                FROM follows
                WHERE user_id = ? AND feed_id = ? AND kind = ?
                ORDER BY id
                LIMIT 1
            "#,
            )
            .bind(instruction.user_id)
            .bind(instruction.feed_id)
            .bind(instruction.kind.as_str())
            .fetch_optional(&mut *tx)
            .await?;

            let row = match existing {
                Some(row) => row,
                None => {
                    created += 1;
                    sqlx::query_as(
                        r#"
                        INSERT INTO follows (user_id, feed_id, kind, created_at)
                        VALUES (?, ?, ?, ?)
                        RETURNING id, user_id, feed_id, kind, created_at
                    "#,
                    )
                    .bind(instruction.user_id)
                    .bind(instruction.feed_id)
                    .bind(instruction.kind.as_str())
                    .bind(now)
                    .fetch_one(&mut *tx)
                    .await?
                }
            };
            follows.push(row.into_follow()?);
        }

        tx.commit().await?;
        tracing::debug!(
            requested = instructions.len(),
            created = created,
            "get_or_create_follows"
        );
        Ok(follows)
    }

    /// Move follows from one feed to another without creating duplicates.
    ///
    /// Only rows whose user does not already follow `to_feed` (with the same
    /// kind) are moved, and at most one row per user. Rows left behind belong
    /// to users already covered on `to_feed`. Returns the number of rows moved.
    pub async fn retarget_follows(&self, from_feed: i64, to_feed: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE follows SET feed_id = ?
            WHERE feed_id = ?
              AND id IN (
                  SELECT MIN(id) FROM follows WHERE feed_id = ? GROUP BY user_id, kind
              )
              AND NOT EXISTS (
                  SELECT 1 FROM follows AS existing
                  WHERE existing.feed_id = ?
                    AND existing.user_id = follows.user_id
                    AND existing.kind = follows.kind
              )
        "#,
        )
        .bind(to_feed)
        .bind(from_feed)
        .bind(from_feed)
        .bind(to_feed)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Delete every follow referencing a feed, returning how many were removed
    pub async fn delete_follows(&self, feed_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM follows WHERE feed_id = ?")
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, FeedKind, FollowInstruction};

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    async fn test_feed(db: &Database, n: i64) -> i64 {
        db.insert_feed(
            FeedKind::Rss,
            &format!("Feed {}", n),
            &format!("https://feed{}.example.com/rss", n),
            &[],
        )
        .await
        .unwrap()
    }

    fn rss(user_id: i64, feed_id: i64) -> FollowInstruction {
        FollowInstruction {
            kind: FeedKind::Rss,
            user_id,
            feed_id,
        }
    }

    #[tokio::test]
    async fn test_insert_follow_subscribes_stream() {
        let db = test_db().await;
        let feed = test_feed(&db, 1).await;

        db.insert_follow(1, feed, FeedKind::Rss).await.unwrap();

        let follows = db.find_follows(feed).await.unwrap();
        assert_eq!(follows.len(), 1);
        assert_eq!(follows[0].user_id, 1);
        assert!(db.is_streaming(1, feed).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_or_create_creates_missing() {
        let db = test_db().await;
        let feed = test_feed(&db, 1).await;

        let follows = db
            .get_or_create_follows(&[rss(1, feed), rss(2, feed)])
            .await
            .unwrap();

        assert_eq!(follows.len(), 2);
        assert_eq!(db.count_follows(1, feed).await.unwrap(), 1);
        assert_eq!(db.count_follows(2, feed).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_or_create_returns_existing() {
        let db = test_db().await;
        let feed = test_feed(&db, 1).await;
        let existing = db.insert_follow(1, feed, FeedKind::Rss).await.unwrap();

        let follows = db.get_or_create_follows(&[rss(1, feed)]).await.unwrap();

        assert_eq!(follows[0].id, existing);
        assert_eq!(db.count_follows(1, feed).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_or_create_dedups_instructions() {
        let db = test_db().await;
        let feed = test_feed(&db, 1).await;

        let follows = db
            .get_or_create_follows(&[rss(1, feed), rss(1, feed)])
            .await
            .unwrap();

        assert_eq!(follows.len(), 1);
        assert_eq!(db.count_follows(1, feed).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_or_create_empty() {
        let db = test_db().await;
        assert!(db.get_or_create_follows(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retarget_skips_users_already_following() {
        let db = test_db().await;
        let from = test_feed(&db, 1).await;
        let to = test_feed(&db, 2).await;

        db.insert_follow(1, from, FeedKind::Rss).await.unwrap();
        db.insert_follow(1, to, FeedKind::Rss).await.unwrap();
        let moved_id = db.insert_follow(2, from, FeedKind::Rss).await.unwrap();

        let moved = db.retarget_follows(from, to).await.unwrap();

        assert_eq!(moved, 1);
        assert_eq!(db.count_follows(1, to).await.unwrap(), 1);
        assert_eq!(db.count_follows(1, from).await.unwrap(), 1);
        let user2 = db.find_follows_for_user(2).await.unwrap();
        assert_eq!(user2.len(), 1);
        assert_eq!(user2[0].id, moved_id);
        assert_eq!(user2[0].feed_id, to);
    }

    #[tokio::test]
    async fn test_retarget_moves_one_row_per_user() {
        let db = test_db().await;
        let from = test_feed(&db, 1).await;
        let to = test_feed(&db, 2).await;

        db.insert_follow(3, from, FeedKind::Rss).await.unwrap();
        db.insert_follow(3, from, FeedKind::Rss).await.unwrap();

        let moved = db.retarget_follows(from, to).await.unwrap();

        assert_eq!(moved, 1);
        assert_eq!(db.count_follows(3, to).await.unwrap(), 1);
        assert_eq!(db.count_follows(3, from).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_follows() {
        let db = test_db().await;
        let feed = test_feed(&db, 1).await;
        let other = test_feed(&db, 2).await;
        db.insert_follow(1, feed, FeedKind::Rss).await.unwrap();
        db.insert_follow(2, feed, FeedKind::Rss).await.unwrap();
        db.insert_follow(1, other, FeedKind::Rss).await.unwrap();

        assert_eq!(db.delete_follows(feed).await.unwrap(), 2);
        assert!(db.find_follows(feed).await.unwrap().is_empty());
        assert_eq!(db.find_follows(other).await.unwrap().len(), 1);
    }
}
