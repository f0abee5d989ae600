use std::collections::HashSet;
use std::iter;

use crate::storage::Feed;

/// Union of every URL either feed is known under, first occurrence first.
///
/// Input order is `master.url`, `master.feed_urls`, `copy.url`,
/// `copy.feed_urls`. The master's primary URL stays in the list: the result
/// feeds duplicate detection and is not a partition of primary vs alternates.
pub fn merge_feed_urls(master: &Feed, copy: &Feed) -> Vec<String> {
    let candidates = iter::once(&master.url)
        .chain(&master.feed_urls)
        .chain(iter::once(&copy.url))
        .chain(&copy.feed_urls);

    let mut seen = HashSet::new();
    candidates
        .filter(|url| seen.insert(url.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FeedKind;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn feed(id: i64, url: &str, feed_urls: &[&str]) -> Feed {
        Feed {
            id,
            kind: FeedKind::Rss,
            title: format!("Feed {}", id),
            url: url.to_string(),
            feed_urls: feed_urls.iter().map(|u| u.to_string()).collect(),
        }
    }

    #[test]
    fn test_first_seen_order() {
        let master = feed(1, "u1", &["u1", "u2"]);
        let copy = feed(2, "u3", &["u1", "u4"]);

        assert_eq!(merge_feed_urls(&master, &copy), vec!["u1", "u2", "u3", "u4"]);
    }

    #[test]
    fn test_master_primary_is_kept() {
        let master = feed(1, "https://a.example.com/rss", &[]);
        let copy = feed(2, "https://b.example.com/rss", &[]);

        assert_eq!(
            merge_feed_urls(&master, &copy),
            vec!["https://a.example.com/rss", "https://b.example.com/rss"]
        );
    }

    #[test]
    fn test_duplicates_within_one_feed() {
        let master = feed(1, "m", &["x", "x", "m"]);
        let copy = feed(2, "m", &["x"]);

        assert_eq!(merge_feed_urls(&master, &copy), vec!["m", "x"]);
    }

    proptest! {
        #[test]
        fn prop_every_url_exactly_once(
            master_url in "[a-d]",
            master_alts in prop::collection::vec("[a-f]", 0..8),
            copy_url in "[a-d]",
            copy_alts in prop::collection::vec("[a-f]", 0..8),
        ) {
            let master = Feed { id: 1, kind: FeedKind::Rss, title: String::new(), url: master_url, feed_urls: master_alts };
            let copy = Feed { id: 2, kind: FeedKind::Rss, title: String::new(), url: copy_url, feed_urls: copy_alts };

            let merged = merge_feed_urls(&master, &copy);

            let all: Vec<&String> = iter::once(&master.url)
                .chain(&master.feed_urls)
                .chain(iter::once(&copy.url))
                .chain(&copy.feed_urls)
                .collect();
            for url in &all {
                prop_assert_eq!(merged.iter().filter(|m| m == url).count(), 1);
            }
            prop_assert!(merged.iter().all(|m| all.contains(&m)));
            prop_assert_eq!(&merged[0], &master.url);
        }
    }
}
