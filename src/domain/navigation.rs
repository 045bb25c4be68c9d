//! Tag and archive-year indexes derived from the post corpus.
//!
//! The index doubles as the allowlist for listing keys: a tag or year only
//! becomes a [`KnownTag`] / [`KnownYear`] after it has been found here, and
//! only those types can address the listing cache.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use super::entities::PostRecord;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagCount {
    pub tag: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearCount {
    pub year: i32,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NavigationError {
    #[error("unknown tag")]
    UnknownTag,
    #[error("unknown archive year")]
    UnknownYear,
}

/// A tag that exists in the corpus.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KnownTag(String);

impl KnownTag {
    /// The tag of a stored post is known by construction.
    pub fn of_post(post: &PostRecord) -> Self {
        Self(post.tag.clone())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// An archive year that exists in the corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KnownYear(i32);

impl KnownYear {
    pub fn of_post(post: &PostRecord) -> Self {
        Self(post.year())
    }

    pub fn get(self) -> i32 {
        self.0
    }
}

/// Group posts by tag; ascending lexicographic order.
pub fn build_tag_index(posts: &[PostRecord]) -> Vec<TagCount> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for post in posts {
        *counts.entry(post.tag.as_str()).or_default() += 1;
    }

    counts
        .into_iter()
        .map(|(tag, count)| TagCount {
            tag: tag.to_string(),
            count,
        })
        .collect()
}

/// Group posts by creation year; newest year first, matching listing order.
pub fn build_archive_index(posts: &[PostRecord]) -> Vec<YearCount> {
    let mut counts: BTreeMap<i32, usize> = BTreeMap::new();
    for post in posts {
        *counts.entry(post.year()).or_default() += 1;
    }

    counts
        .into_iter()
        .rev()
        .map(|(year, count)| YearCount { year, count })
        .collect()
}

/// Sidebar navigation plus the allowlist of listing keys.
///
/// Rebuilt from the live corpus on every request that needs it; fine at
/// blog-sized volumes, linear in the number of posts otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NavigationIndex {
    pub tags: Vec<TagCount>,
    pub archive: Vec<YearCount>,
}

impl NavigationIndex {
    pub fn build(posts: &[PostRecord]) -> Self {
        Self {
            tags: build_tag_index(posts),
            archive: build_archive_index(posts),
        }
    }

    pub fn is_valid_tag(&self, tag: &str) -> bool {
        self.tags
            .binary_search_by(|entry| entry.tag.as_str().cmp(tag))
            .is_ok()
    }

    pub fn is_valid_year(&self, year: i32) -> bool {
        self.archive.iter().any(|entry| entry.year == year)
    }

    pub fn known_tag(&self, raw: &str) -> Result<KnownTag, NavigationError> {
        if self.is_valid_tag(raw) {
            Ok(KnownTag(raw.to_string()))
        } else {
            Err(NavigationError::UnknownTag)
        }
    }

    /// Parse and validate a year taken from request input.
    pub fn known_year(&self, raw: &str) -> Result<KnownYear, NavigationError> {
        let year = raw
            .parse::<i32>()
            .map_err(|_| NavigationError::UnknownYear)?;
        if self.is_valid_year(year) {
            Ok(KnownYear(year))
        } else {
            Err(NavigationError::UnknownYear)
        }
    }
}
