//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::credentials::Credential;
use crate::domain::entities::{PostDraft, PostPreview, PostRecord};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Fields stamped onto a post at creation.
#[derive(Debug, Clone)]
pub struct CreatePostParams {
    pub draft: PostDraft,
    pub author: String,
}

#[async_trait]
pub trait PostsRepo: Send + Sync {
    /// The whole corpus; input to the navigation index.
    async fn list_all(&self) -> Result<Vec<PostRecord>, RepoError>;

    /// Newest first.
    async fn list_recent(&self, limit: usize) -> Result<Vec<PostRecord>, RepoError>;

    /// Newest first.
    async fn list_by_tag(&self, tag: &str) -> Result<Vec<PostRecord>, RepoError>;

    /// Newest first.
    async fn list_by_year(&self, year: i32) -> Result<Vec<PostRecord>, RepoError>;

    /// Most visited first; ties broken newest first.
    async fn list_by_visits(&self, limit: usize) -> Result<Vec<PostRecord>, RepoError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<PostRecord>, RepoError>;

    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError>;

    /// Replace the author-supplied fields; `NotFound` for an unknown id.
    async fn update_post(&self, id: i64, draft: PostDraft) -> Result<PostRecord, RepoError>;

    /// Increment the visit counter and return the updated post.
    async fn record_visit(&self, id: i64) -> Result<PostRecord, RepoError>;

    async fn save_preview(&self, preview: PostPreview) -> Result<(), RepoError>;

    async fn load_preview(&self) -> Result<Option<PostPreview>, RepoError>;
}

#[async_trait]
pub trait CredentialsRepo: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<Credential>, RepoError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Credential>, RepoError>;

    /// `Duplicate` when the username is taken.
    async fn insert(&self, credential: &Credential) -> Result<(), RepoError>;

    /// Overwrite username, salt and hash by id. `Duplicate` when renaming
    /// onto a taken username, `NotFound` for an unknown id.
    async fn update(&self, credential: &Credential) -> Result<(), RepoError>;
}
