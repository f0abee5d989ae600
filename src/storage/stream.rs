use anyhow::Result;

use super::schema::Database;

impl Database {
    // ========================================================================
    // Stream Subscription Operations
    // ========================================================================

    /// Register live delivery of `feed_id` to `user_id`. Idempotent.
    pub async fn subscribe_stream(&self, user_id: i64, feed_id: i64) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            "INSERT OR IGNORE INTO stream_subscriptions (user_id, feed_id, subscribed_at) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(feed_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Tear down live delivery of `feed_id` to `user_id`, returning whether a
    /// subscription existed.
    pub async fn unsubscribe_stream(&self, user_id: i64, feed_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM stream_subscriptions WHERE user_id = ? AND feed_id = ?")
            .bind(user_id)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn is_streaming(&self, user_id: i64, feed_id: i64) -> Result<bool> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM stream_subscriptions WHERE user_id = ? AND feed_id = ?",
        )
        .bind(user_id)
        .bind(feed_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0 > 0)
    }
}
