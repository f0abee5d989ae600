use anyhow::Result;

use super::schema::Database;
use super::types::{Article, NewArticle};

/// Rows fetched per keyset page in `find_articles`
pub(crate) const ARTICLE_PAGE_SIZE: i64 = 1000;

impl Database {
    // ========================================================================
    // Article Operations
    // ========================================================================

    /// Insert an article for a feed, returning its ID.
    ///
    /// (feed_id, url) is unique: inserting a known URL refreshes the title and
    /// published time and returns the existing ID.
    pub async fn insert_article(&self, feed_id: i64, article: &NewArticle) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();
        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO articles (feed_id, url, title, published, fetched_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(feed_id, url) DO UPDATE SET
                title = excluded.title,
                published = excluded.published
            RETURNING id
        "#,
        )
        .bind(feed_id)
        .bind(&article.url)
        .bind(&article.title)
        .bind(article.published)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    /// Get every article owned by a feed, ordered by ID.
    ///
    /// Pages through the feed with `id > last_id` so no article is ever left
    /// out; callers that delete a feed's articles afterwards rely on seeing
    /// all of them.
    pub async fn find_articles(&self, feed_id: i64) -> Result<Vec<Article>> {
        let mut articles = Vec::new();
        let mut last_id = 0i64;

        loop {
            let page = sqlx::query_as::<_, Article>(
                r#"
                SELECT id, feed_id, url, title, published, fetched_at
                FROM articles
                WHERE feed_id = ? AND id > ?
                ORDER BY id
                LIMIT ?
            "#,
            )
            .bind(feed_id)
            .bind(last_id)
            .bind(ARTICLE_PAGE_SIZE)
            .fetch_all(&self.pool)
            .await?;

            let page_len = page.len() as i64;
            if let Some(last) = page.last() {
                last_id = last.id;
            }
            articles.extend(page);

            if page_len < ARTICLE_PAGE_SIZE {
                break;
            }
        }

        Ok(articles)
    }

    /// Find the article a feed publishes under `url`, if any
    pub async fn find_article_by_url(&self, feed_id: i64, url: &str) -> Result<Option<Article>> {
        let article = sqlx::query_as::<_, Article>(
            r#"
            SELECT id, feed_id, url, title, published, fetched_at
            FROM articles
            WHERE feed_id = ? AND url = ?
        "#,
        )
        .bind(feed_id)
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        Ok(article)
    }

    /// Delete every article owned by a feed, returning how many were removed.
    ///
    /// Pins on those articles are removed by ON DELETE CASCADE.
    pub async fn delete_articles(&self, feed_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM articles WHERE feed_id = ?")
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
