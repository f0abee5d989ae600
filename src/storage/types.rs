use std::fmt;
use std::str::FromStr;

use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds the database lock
    #[error("The database is locked by another process. Wait for it to finish and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Other(err)
    }
}

/// SQLITE_BUSY (5), SQLITE_LOCKED (6) and SQLITE_CANTOPEN (14) all surface as
/// one of these messages.
pub(crate) fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
        || message.contains("unable to open database file")
}

// ============================================================================
// Feed Kind
// ============================================================================

/// What sort of source a feed (and a follow of it) is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    Rss,
    Podcast,
}

impl FeedKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FeedKind::Rss => "rss",
            FeedKind::Podcast => "podcast",
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rss" => Ok(FeedKind::Rss),
            "podcast" => Ok(FeedKind::Podcast),
            other => anyhow::bail!("Unknown feed kind: {}", other),
        }
    }
}

// ============================================================================
// Row Types
// ============================================================================

/// Internal row type for feed queries (used by sqlx FromRow).
/// Converts to Feed via into_feed(), decoding the JSON alternate URL list.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedDbRow {
    pub id: i64,
    pub kind: String,
    pub title: String,
    pub url: String,
    pub feed_urls: String,
}

impl FeedDbRow {
    pub(crate) fn into_feed(self) -> anyhow::Result<Feed> {
        let kind = self.kind.parse()?;
        let feed_urls: Vec<String> = serde_json::from_str(&self.feed_urls).map_err(|e| {
            anyhow::anyhow!("Feed {} has a malformed feed_urls column: {}", self.id, e)
        })?;
        Ok(Feed {
            id: self.id,
            kind,
            title: self.title,
            url: self.url,
            feed_urls,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FollowDbRow {
    pub id: i64,
    pub user_id: i64,
    pub feed_id: i64,
    pub kind: String,
    pub created_at: i64,
}

impl FollowDbRow {
    pub(crate) fn into_follow(self) -> anyhow::Result<Follow> {
        Ok(Follow {
            id: self.id,
            user_id: self.user_id,
            feed_id: self.feed_id,
            kind: self.kind.parse()?,
            created_at: self.created_at,
        })
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// Feed data from database
///
/// `url` is the primary source URL. `feed_urls` holds every other URL the
/// source is known under; it is advisory and may repeat `url`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    pub id: i64,
    pub kind: FeedKind,
    pub title: String,
    pub url: String,
    pub feed_urls: Vec<String>,
}

/// A piece of content published under a feed, identified by its URL.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Article {
    pub id: i64,
    pub feed_id: i64,
    pub url: String,
    pub title: String,
    pub published: Option<i64>,
    pub fetched_at: i64,
}

/// A user's subscription to a feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Follow {
    pub id: i64,
    pub user_id: i64,
    pub feed_id: i64,
    pub kind: FeedKind,
    /// Unix seconds
    pub created_at: i64,
}

/// Request for a follow that must exist after the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FollowInstruction {
    pub kind: FeedKind,
    pub user_id: i64,
    pub feed_id: i64,
}

/// A user's saved reference to an article
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Pin {
    pub id: i64,
    pub user_id: i64,
    pub article_id: i64,
    /// Unix seconds
    pub created_at: i64,
}

/// Pin to be created. `created_at` is supplied by the caller so a migrated
/// pin keeps the time the user originally saved it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewPin {
    pub user_id: i64,
    pub article_id: i64,
    pub created_at: i64,
}

/// Article to be inserted for a feed
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub url: String,
    pub title: String,
    pub published: Option<i64>,
}
