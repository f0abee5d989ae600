//! Merge duplicate feed records.
//!
//! When two feeds turn out to be the same upstream source, [`merge::merge_feeds`]
//! folds the copy into the master: followers move over without duplicates,
//! pins move to the master's matching articles, the alternate URL lists are
//! unioned, and the copy is deleted.

pub mod config;
pub mod merge;
pub mod storage;
