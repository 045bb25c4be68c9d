//! Post writes, previews and visit counting.
//!
//! Every write invalidates the listings it changes before returning, so a
//! reader that starts after the write completes never sees the old listing.

use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::application::listing::ListingService;
use crate::application::repos::{CreatePostParams, PostsRepo, RepoError};
use crate::cache::{CacheError, ContentCache, ListingKey};
use crate::domain::entities::{PostDraft, PostPreview, PostRecord};
use crate::domain::error::DomainError;

const SOURCE: &str = "application::posts";

#[derive(Debug, Error)]
pub enum PostError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    /// The write itself succeeded; cached listings may still show old data.
    #[error("post {post_id} saved but cached listings could not be invalidated")]
    CacheBackendUnavailable {
        post_id: i64,
        #[source]
        source: CacheError,
    },
    #[error(transparent)]
    Cache(#[from] CacheError),
}

#[derive(Debug, Clone)]
pub struct PostSettings {
    /// Author stamped on new posts.
    pub author: String,
    pub refresh_on_write: bool,
}

#[derive(Clone)]
pub struct PostService {
    posts: Arc<dyn PostsRepo>,
    cache: Arc<ContentCache>,
    listings: ListingService,
    settings: PostSettings,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        cache: Arc<ContentCache>,
        listings: ListingService,
        settings: PostSettings,
    ) -> Self {
        Self {
            posts,
            cache,
            listings,
            settings,
        }
    }

    pub async fn create(&self, draft: PostDraft) -> Result<PostRecord, PostError> {
        let draft = draft.normalized();
        draft.validate()?;

        let post = self
            .posts
            .create_post(CreatePostParams {
                draft,
                author: self.settings.author.clone(),
            })
            .await?;
        info!(
            target_module = SOURCE,
            post_id = post.id,
            tag = %post.tag,
            "Post created"
        );

        self.invalidate(&post, ListingKey::affected_by(&post)).await?;
        self.refresh_main(&post).await?;
        Ok(post)
    }

    /// Replace a post's fields; both the old and the new tag listings are
    /// invalidated.
    pub async fn update(&self, id: i64, draft: PostDraft) -> Result<PostRecord, PostError> {
        let draft = draft.normalized();
        draft.validate()?;

        let previous = self
            .posts
            .find_by_id(id)
            .await?
            .ok_or(DomainError::not_found("post"))?;
        let post = self.posts.update_post(id, draft).await.map_err(|err| match err {
            RepoError::NotFound => PostError::Domain(DomainError::not_found("post")),
            other => PostError::Repo(other),
        })?;
        info!(
            target_module = SOURCE,
            post_id = post.id,
            previous_tag = %previous.tag,
            tag = %post.tag,
            "Post updated"
        );

        let mut keys = ListingKey::affected_by(&post).to_vec();
        for key in ListingKey::affected_by(&previous) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        self.invalidate(&post, keys).await?;
        self.refresh_main(&post).await?;
        Ok(post)
    }

    /// Overwrite the single preview slot. Previews never touch listings.
    pub async fn preview(&self, draft: PostDraft) -> Result<PostPreview, PostError> {
        let draft = draft.normalized();
        draft.validate()?;

        let preview = PostPreview {
            draft,
            author: self.settings.author.clone(),
            saved_at: OffsetDateTime::now_utc(),
        };
        self.posts.save_preview(preview.clone()).await?;
        Ok(preview)
    }

    pub async fn load_preview(&self) -> Result<PostPreview, PostError> {
        self.posts
            .load_preview()
            .await?
            .ok_or_else(|| DomainError::not_found("preview").into())
    }

    /// Count a permalink view. The visit-history listing is left to go
    /// stale until the next write.
    pub async fn visit(&self, id: i64) -> Result<PostRecord, PostError> {
        self.posts.record_visit(id).await.map_err(|err| match err {
            RepoError::NotFound => PostError::Domain(DomainError::not_found("post")),
            other => PostError::Repo(other),
        })
    }

    async fn invalidate<I>(&self, post: &PostRecord, keys: I) -> Result<(), PostError>
    where
        I: IntoIterator<Item = ListingKey>,
    {
        // Attempt every key even after a failure so as few listings as
        // possible stay stale.
        let mut failure = None;
        for key in keys {
            if let Err(err) = self.cache.invalidate(&key).await {
                failure.get_or_insert(err);
            }
        }

        match failure {
            None => Ok(()),
            Some(source) => Err(PostError::CacheBackendUnavailable {
                post_id: post.id,
                source,
            }),
        }
    }

    async fn refresh_main(&self, post: &PostRecord) -> Result<(), PostError> {
        if !self.settings.refresh_on_write {
            return Ok(());
        }

        if let Err(err) = self.listings.refresh::<PostError>(&ListingKey::Main).await {
            warn!(
                target_module = SOURCE,
                post_id = post.id,
                error = %err,
                "Main listing refresh failed after write"
            );
            return Err(match err {
                PostError::Cache(source) => PostError::CacheBackendUnavailable {
                    post_id: post.id,
                    source,
                },
                other => other,
            });
        }
        Ok(())
    }
}
