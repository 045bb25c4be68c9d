//! Domain entities mirrored from persistent storage.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::error::DomainError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: i64,
    pub subject: String,
    pub content: String,
    pub image_url: String,
    pub tag: String,
    pub author: String,
    pub visits: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl PostRecord {
    /// Archive year the post is filed under.
    pub fn year(&self) -> i32 {
        self.created_at.year()
    }
}

/// Author-supplied fields of a post, before persistence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostDraft {
    pub subject: String,
    pub content: String,
    pub image_url: String,
    pub tag: String,
}

impl PostDraft {
    /// Trim the single-line fields; content is kept verbatim.
    pub fn normalized(self) -> Self {
        Self {
            subject: self.subject.trim().to_string(),
            content: self.content,
            image_url: self.image_url.trim().to_string(),
            tag: self.tag.trim().to_string(),
        }
    }

    /// Every field is required.
    pub fn validate(&self) -> Result<(), DomainError> {
        let missing: Vec<&'static str> = [
            ("subject", self.subject.trim().is_empty()),
            ("content", self.content.trim().is_empty()),
            ("image_url", self.image_url.trim().is_empty()),
            ("tag", self.tag.trim().is_empty()),
        ]
        .into_iter()
        .filter_map(|(field, blank)| blank.then_some(field))
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(DomainError::validation(format!(
                "all fields are required (missing: {})",
                missing.join(", ")
            )))
        }
    }
}

/// The single draft slot shown on the preview page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostPreview {
    #[serde(flatten)]
    pub draft: PostDraft,
    pub author: String,
    #[serde(with = "time::serde::rfc3339")]
    pub saved_at: OffsetDateTime,
}
