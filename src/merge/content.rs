use std::collections::HashMap;

use anyhow::{anyhow, Result};

use super::store::FeedStore;
use crate::storage::{Feed, NewPin};

/// What happened to the copy's articles and the pins on them
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentReconciliation {
    /// Articles owned by the copy
    pub articles: usize,
    /// Pins found on those articles
    pub pins: usize,
    /// Pins re-created on a master article with the same URL
    pub moved: usize,
    /// Pins dropped because the master has no article with that URL
    pub dropped: usize,
    /// Copy articles deleted
    pub deleted: u64,
}

/// Re-point pins on `copy` articles at the `master` article with the same
/// URL, then delete the copy's articles.
///
/// A pin with no matching master article is deleted without replacement.
/// Every pin is handled before any article is deleted, and the first storage
/// error stops the run: carrying on could delete articles that unprocessed
/// pins still reference.
pub async fn reconcile_content<S>(
    store: &S,
    master: &Feed,
    copy: &Feed,
) -> Result<ContentReconciliation>
where
    S: FeedStore + ?Sized,
{
    let articles = store.find_articles(copy.id).await?;
    let urls: HashMap<i64, &str> = articles.iter().map(|a| (a.id, a.url.as_str())).collect();
    let article_ids: Vec<i64> = articles.iter().map(|a| a.id).collect();

    tracing::info!(
        copy_id = copy.id,
        articles = articles.len(),
        "Updating pin references"
    );

    let pins = if article_ids.is_empty() {
        Vec::new()
    } else {
        store.find_pins(&article_ids).await?
    };

    // copy article ID -> matching master article ID
    let mut targets: HashMap<i64, Option<i64>> = HashMap::new();
    let mut moved = 0;
    let mut dropped = 0;

    for pin in &pins {
        let target = match targets.get(&pin.article_id) {
            Some(target) => *target,
            None => {
                // Only reachable through a store whose find_pins over-returns
                let url = urls.get(&pin.article_id).ok_or_else(|| {
                    anyhow!(
                        "Pin {} references article {}, which feed {} does not own",
                        pin.id,
                        pin.article_id,
                        copy.id
                    )
                })?;
                let target = store
                    .find_article_by_url(master.id, url)
                    .await?
                    .map(|article| article.id);
                targets.insert(pin.article_id, target);
                target
            }
        };

        match target {
            Some(article_id) => {
                store
                    .create_pin(NewPin {
                        user_id: pin.user_id,
                        article_id,
                        created_at: pin.created_at,
                    })
                    .await?;
                moved += 1;
            }
            None => {
                tracing::info!(
                    pin_id = pin.id,
                    user_id = pin.user_id,
                    article_id = pin.article_id,
                    "No matching article on master feed, dropping pin"
                );
                dropped += 1;
            }
        }

        // Always remove the old pin so nothing points at a deleted article
        store.delete_pin(pin.id).await?;
    }

    tracing::info!(
        moved = moved,
        dropped = dropped,
        "Updated all pins, removing copy articles"
    );

    let deleted = store.delete_articles(copy.id).await?;

    Ok(ContentReconciliation {
        articles: articles.len(),
        pins: pins.len(),
        moved,
        dropped,
        deleted,
    })
}
