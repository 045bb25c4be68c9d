//! Listing cache keys.
//!
//! Tag and archive keys wrap [`KnownTag`] / [`KnownYear`], so a key can only
//! be built from a value the navigation index has already accepted or from
//! a stored post. Raw request text never reaches the cache namespace.

use std::fmt;

use crate::domain::entities::PostRecord;
use crate::domain::navigation::{KnownTag, KnownYear};

const PREFIX: &str = "listing";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ListingKey {
    /// Newest posts on the front page.
    Main,
    Tag(KnownTag),
    Archive(KnownYear),
    /// Most visited posts.
    Visits,
}

impl ListingKey {
    /// Every listing whose content depends on `post`.
    pub fn affected_by(post: &PostRecord) -> [ListingKey; 4] {
        [
            ListingKey::Main,
            ListingKey::Tag(KnownTag::of_post(post)),
            ListingKey::Archive(KnownYear::of_post(post)),
            ListingKey::Visits,
        ]
    }

    /// Short label for metrics; bounded cardinality.
    pub fn kind(&self) -> &'static str {
        match self {
            ListingKey::Main => "main",
            ListingKey::Tag(_) => "tag",
            ListingKey::Archive(_) => "archive",
            ListingKey::Visits => "visits",
        }
    }
}

impl fmt::Display for ListingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListingKey::Main => write!(f, "{PREFIX}:main"),
            ListingKey::Tag(tag) => write!(f, "{PREFIX}:tag:{}", tag.as_str()),
            ListingKey::Archive(year) => write!(f, "{PREFIX}:archive:{}", year.get()),
            ListingKey::Visits => write!(f, "{PREFIX}:visits"),
        }
    }
}
