//! Post listings served through the content cache.

use std::sync::Arc;

use thiserror::Error;

use crate::application::repos::{PostsRepo, RepoError};
use crate::cache::{CacheError, ContentCache, ListingKey};
use crate::domain::entities::PostRecord;
use crate::domain::navigation::{NavigationError, NavigationIndex};

pub const DEFAULT_MAIN_PAGE_SIZE: usize = 10;
pub const DEFAULT_HISTORY_SIZE: usize = 20;

#[derive(Debug, Error)]
pub enum ListingError {
    #[error("unknown tag")]
    UnknownTag,
    #[error("unknown archive year")]
    UnknownYear,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl From<NavigationError> for ListingError {
    fn from(error: NavigationError) -> Self {
        match error {
            NavigationError::UnknownTag => ListingError::UnknownTag,
            NavigationError::UnknownYear => ListingError::UnknownYear,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingLimits {
    pub main_page_size: usize,
    pub history_size: usize,
}

impl Default for ListingLimits {
    fn default() -> Self {
        Self {
            main_page_size: DEFAULT_MAIN_PAGE_SIZE,
            history_size: DEFAULT_HISTORY_SIZE,
        }
    }
}

#[derive(Clone)]
pub struct ListingService {
    posts: Arc<dyn PostsRepo>,
    cache: Arc<ContentCache>,
    limits: ListingLimits,
}

impl ListingService {
    pub fn new(posts: Arc<dyn PostsRepo>, cache: Arc<ContentCache>, limits: ListingLimits) -> Self {
        Self {
            posts,
            cache,
            limits,
        }
    }

    /// Tag and archive navigation built from the live corpus.
    pub async fn sidebar(&self) -> Result<NavigationIndex, ListingError> {
        let posts = self.posts.list_all().await?;
        Ok(NavigationIndex::build(&posts))
    }

    pub async fn main(&self) -> Result<Vec<PostRecord>, ListingError> {
        self.cached(&ListingKey::Main).await
    }

    /// Posts filed under `raw`, which must be a tag in `navigation`.
    pub async fn by_tag(
        &self,
        navigation: &NavigationIndex,
        raw: &str,
    ) -> Result<Vec<PostRecord>, ListingError> {
        let tag = navigation.known_tag(raw)?;
        self.cached(&ListingKey::Tag(tag)).await
    }

    /// Posts created in `raw`, which must parse to a year in `navigation`.
    pub async fn by_year(
        &self,
        navigation: &NavigationIndex,
        raw: &str,
    ) -> Result<Vec<PostRecord>, ListingError> {
        let year = navigation.known_year(raw)?;
        self.cached(&ListingKey::Archive(year)).await
    }

    pub async fn history(&self) -> Result<Vec<PostRecord>, ListingError> {
        self.cached(&ListingKey::Visits).await
    }

    /// Recompute `key` from the repository and overwrite the cached entry.
    pub async fn refresh<E>(&self, key: &ListingKey) -> Result<Vec<PostRecord>, E>
    where
        E: From<CacheError> + From<RepoError>,
    {
        self.cache
            .force_refresh(key, || async {
                self.query(key)
                    .await
                    .map_err(<E as From<RepoError>>::from)
            })
            .await
    }

    async fn cached(&self, key: &ListingKey) -> Result<Vec<PostRecord>, ListingError> {
        self.cache
            .get_or_compute(key, || async { self.query(key).await.map_err(ListingError::from) })
            .await
    }

    async fn query(&self, key: &ListingKey) -> Result<Vec<PostRecord>, RepoError> {
        match key {
            ListingKey::Main => self.posts.list_recent(self.limits.main_page_size).await,
            ListingKey::Tag(tag) => self.posts.list_by_tag(tag.as_str()).await,
            ListingKey::Archive(year) => self.posts.list_by_year(year.get()).await,
            ListingKey::Visits => self.posts.list_by_visits(self.limits.history_size).await,
        }
    }
}
