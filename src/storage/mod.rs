mod articles;
mod feeds;
mod follows;
mod pins;
mod schema;
mod stream;
mod types;

#[cfg(test)]
pub(crate) use articles::ARTICLE_PAGE_SIZE;
pub use schema::Database;
pub use types::{
    Article, DatabaseError, Feed, FeedKind, Follow, FollowInstruction, NewArticle, NewPin, Pin,
};
