use anyhow::{bail, Result};

use super::schema::Database;
use super::types::{Feed, FeedDbRow, FeedKind};

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Insert a feed, returning its ID.
    ///
    /// If a feed with the same primary URL exists its title is updated and
    /// the existing ID is returned (ON CONFLICT DO UPDATE).
    pub async fn insert_feed(
        &self,
        kind: FeedKind,
        title: &str,
        url: &str,
        feed_urls: &[String],
    ) -> Result<i64> {
        let feed_urls = serde_json::to_string(feed_urls)?;
        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO feeds (kind, title, url, feed_urls)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET title = excluded.title
            RETURNING id
        "#,
        )
        .bind(kind.as_str())
        .bind(title)
        .bind(url)
        .bind(feed_urls)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    /// Get all feeds ordered by ID
    pub async fn list_feeds(&self) -> Result<Vec<Feed>> {
        let rows: Vec<FeedDbRow> =
            sqlx::query_as("SELECT id, kind, title, url, feed_urls FROM feeds ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(FeedDbRow::into_feed).collect()
    }

    pub async fn find_feed_by_id(&self, feed_id: i64) -> Result<Option<Feed>> {
        let row: Option<FeedDbRow> =
            sqlx::query_as("SELECT id, kind, title, url, feed_urls FROM feeds WHERE id = ?")
                .bind(feed_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(FeedDbRow::into_feed).transpose()
    }

    /// Persist every mutable column of `feed`.
    ///
    /// Fails if the feed no longer exists rather than silently writing nothing.
    pub async fn save_feed(&self, feed: &Feed) -> Result<()> {
        let feed_urls = serde_json::to_string(&feed.feed_urls)?;
        let result =
            sqlx::query("UPDATE feeds SET kind = ?, title = ?, url = ?, feed_urls = ? WHERE id = ?")
                .bind(feed.kind.as_str())
                .bind(&feed.title)
                .bind(&feed.url)
                .bind(feed_urls)
                .bind(feed.id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            bail!("Cannot save feed {}: it does not exist", feed.id);
        }
        Ok(())
    }

    /// Delete a feed along with its stream subscriptions.
    ///
    /// Articles, follows and pins referencing the feed go with it via
    /// ON DELETE CASCADE.
    pub async fn delete_feed(&self, feed_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM stream_subscriptions WHERE feed_id = ?")
            .bind(feed_id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM feeds WHERE id = ?")
            .bind(feed_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            // Dropping tx rolls back the subscription delete
            bail!("Cannot delete feed {}: it does not exist", feed_id);
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, FeedKind, NewArticle};

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|u| u.to_string()).collect()
    }

    #[tokio::test]
    async fn test_insert_and_find_feed() {
        let db = test_db().await;
        let id = db
            .insert_feed(
                FeedKind::Rss,
                "Example",
                "https://example.com/rss",
                &urls(&["https://example.com/feed"]),
            )
            .await
            .unwrap();

        let feed = db.find_feed_by_id(id).await.unwrap().unwrap();
        assert_eq!(feed.kind, FeedKind::Rss);
        assert_eq!(feed.title, "Example");
        assert_eq!(feed.url, "https://example.com/rss");
        assert_eq!(feed.feed_urls, urls(&["https://example.com/feed"]));
    }

    #[tokio::test]
    async fn test_find_missing_feed_returns_none() {
        let db = test_db().await;
        assert!(db.find_feed_by_id(42).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_duplicate_url_returns_same_id() {
        let db = test_db().await;
        let id1 = db
            .insert_feed(FeedKind::Rss, "Old", "https://example.com/rss", &[])
            .await
            .unwrap();
        let id2 = db
            .insert_feed(FeedKind::Rss, "New", "https://example.com/rss", &[])
            .await
            .unwrap();

        assert_eq!(id1, id2);
        let feeds = db.list_feeds().await.unwrap();
        assert_eq!(feeds.len(), 1);
        assert_eq!(feeds[0].title, "New");
    }

    #[tokio::test]
    async fn test_save_feed_persists_alternate_urls() {
        let db = test_db().await;
        let id = db
            .insert_feed(FeedKind::Podcast, "Show", "https://show.example.com/rss", &[])
            .await
            .unwrap();

        let mut feed = db.find_feed_by_id(id).await.unwrap().unwrap();
        feed.feed_urls = urls(&["https://a.example.com", "https://b.example.com"]);
        db.save_feed(&feed).await.unwrap();

        let reloaded = db.find_feed_by_id(id).await.unwrap().unwrap();
        assert_eq!(reloaded, feed);
    }

    #[tokio::test]
    async fn test_save_deleted_feed_fails() {
        let db = test_db().await;
        let id = db
            .insert_feed(FeedKind::Rss, "Gone", "https://gone.example.com/rss", &[])
            .await
            .unwrap();
        let feed = db.find_feed_by_id(id).await.unwrap().unwrap();
        db.delete_feed(id).await.unwrap();

        assert!(db.save_feed(&feed).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_feed_cascades() {
        let db = test_db().await;
        let id = db
            .insert_feed(FeedKind::Rss, "Doomed", "https://doomed.example.com/rss", &[])
            .await
            .unwrap();
        let article = db
            .insert_article(
                id,
                &NewArticle {
                    url: "https://doomed.example.com/1".to_string(),
                    title: "One".to_string(),
                    published: None,
                },
            )
            .await
            .unwrap();
        db.insert_follow(7, id, FeedKind::Rss).await.unwrap();

        db.delete_feed(id).await.unwrap();

        assert!(db.find_feed_by_id(id).await.unwrap().is_none());
        assert!(db.find_articles(id).await.unwrap().is_empty());
        assert!(db.find_follows(id).await.unwrap().is_empty());
        assert!(db.find_pins(&[article]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_feed_fails() {
        let db = test_db().await;
        assert!(db.delete_feed(99).await.is_err());
    }
}
