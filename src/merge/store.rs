//! Storage seams the merge pipeline runs against.
//!
//! [`FeedStore`] covers feeds, follows, articles and pins; [`FollowStream`]
//! covers the real-time delivery state tied to a follow. Both are implemented
//! for the SQLite [`Database`].

use anyhow::Result;
use async_trait::async_trait;

use crate::storage::{Article, Database, Feed, Follow, FollowInstruction, NewPin, Pin};

/// Persistent records touched by a merge.
///
/// Every method is a single, independently committed operation.
#[async_trait]
pub trait FeedStore: Send + Sync {
    async fn find_feed_by_id(&self, feed_id: i64) -> Result<Option<Feed>>;

    async fn find_follows(&self, feed_id: i64) -> Result<Vec<Follow>>;

    /// Ensure one follow exists per distinct instruction, creating only the
    /// missing ones.
    async fn get_or_create_follows(&self, instructions: &[FollowInstruction])
        -> Result<Vec<Follow>>;

    /// Bulk-move follows of `from_feed` whose user does not already follow
    /// `to_feed`. Returns the number of rows modified.
    async fn retarget_follows(&self, from_feed: i64, to_feed: i64) -> Result<u64>;

    async fn delete_follows(&self, feed_id: i64) -> Result<u64>;

    async fn find_articles(&self, feed_id: i64) -> Result<Vec<Article>>;

    async fn find_article_by_url(&self, feed_id: i64, url: &str) -> Result<Option<Article>>;

    async fn delete_articles(&self, feed_id: i64) -> Result<u64>;

    async fn find_pins(&self, article_ids: &[i64]) -> Result<Vec<Pin>>;

    async fn create_pin(&self, pin: NewPin) -> Result<Pin>;

    async fn delete_pin(&self, pin_id: i64) -> Result<()>;

    async fn delete_feed(&self, feed_id: i64) -> Result<()>;

    async fn save_feed(&self, feed: &Feed) -> Result<()>;
}

/// Live delivery hooks for follows.
#[async_trait]
pub trait FollowStream: Send + Sync {
    /// Stop delivering the follow's feed to its user.
    async fn detach(&self, follow: &Follow) -> Result<()>;

    /// Start delivering the follow's feed to its user. Idempotent.
    async fn attach(&self, follow: &Follow) -> Result<()>;
}

#[async_trait]
impl FeedStore for Database {
    async fn find_feed_by_id(&self, feed_id: i64) -> Result<Option<Feed>> {
        Database::find_feed_by_id(self, feed_id).await
    }

    async fn find_follows(&self, feed_id: i64) -> Result<Vec<Follow>> {
        Database::find_follows(self, feed_id).await
    }

    async fn get_or_create_follows(
        &self,
        instructions: &[FollowInstruction],
    ) -> Result<Vec<Follow>> {
        Database::get_or_create_follows(self, instructions).await
    }

    async fn retarget_follows(&self, from_feed: i64, to_feed: i64) -> Result<u64> {
        Database::retarget_follows(self, from_feed, to_feed).await
    }

    async fn delete_follows(&self, feed_id: i64) -> Result<u64> {
        Database::delete_follows(self, feed_id).await
    }

    async fn find_articles(&self, feed_id: i64) -> Result<Vec<Article>> {
        Database::find_articles(self, feed_id).await
    }

    async fn find_article_by_url(&self, feed_id: i64, url: &str) -> Result<Option<Article>> {
        Database::find_article_by_url(self, feed_id, url).await
    }

    async fn delete_articles(&self, feed_id: i64) -> Result<u64> {
        Database::delete_articles(self, feed_id).await
    }

    async fn find_pins(&self, article_ids: &[i64]) -> Result<Vec<Pin>> {
        Database::find_pins(self, article_ids).await
    }

    async fn create_pin(&self, pin: NewPin) -> Result<Pin> {
        Database::create_pin(self, pin).await
    }

    async fn delete_pin(&self, pin_id: i64) -> Result<()> {
        Database::delete_pin(self, pin_id).await
    }

    async fn delete_feed(&self, feed_id: i64) -> Result<()> {
        Database::delete_feed(self, feed_id).await
    }

    async fn save_feed(&self, feed: &Feed) -> Result<()> {
        Database::save_feed(self, feed).await
    }
}

#[async_trait]
impl FollowStream for Database {
    async fn detach(&self, follow: &Follow) -> Result<()> {
        let existed = self.unsubscribe_stream(follow.user_id, follow.feed_id).await?;
        if !existed {
            tracing::debug!(
                follow_id = follow.id,
                user_id = follow.user_id,
                feed_id = follow.feed_id,
                "Follow had no stream subscription"
            );
        }
        Ok(())
    }

    async fn attach(&self, follow: &Follow) -> Result<()> {
        self.subscribe_stream(follow.user_id, follow.feed_id).await
    }
}
