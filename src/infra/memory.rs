//! Process-local repositories used when no database is configured.
//!
//! Contents are lost on restart; a single-node deployment or a test run is
//! the intended use.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::application::repos::{CreatePostParams, CredentialsRepo, PostsRepo, RepoError};
use crate::domain::credentials::Credential;
use crate::domain::entities::{PostDraft, PostPreview, PostRecord};

#[derive(Default)]
struct PostsState {
    posts: BTreeMap<i64, PostRecord>,
    last_id: i64,
    preview: Option<PostPreview>,
}

#[derive(Default)]
pub struct InMemoryPosts {
    state: RwLock<PostsState>,
}

fn newest_first(posts: &mut [PostRecord]) {
    posts.sort_by_key(|post| Reverse((post.created_at, post.id)));
}

impl InMemoryPosts {
    async fn select<F>(&self, keep: F) -> Vec<PostRecord>
    where
        F: Fn(&PostRecord) -> bool,
    {
        let state = self.state.read().await;
        let mut selected: Vec<PostRecord> =
            state.posts.values().filter(|post| keep(post)).cloned().collect();
        newest_first(&mut selected);
        selected
    }
}

#[async_trait]
impl PostsRepo for InMemoryPosts {
    async fn list_all(&self) -> Result<Vec<PostRecord>, RepoError> {
        Ok(self.select(|_| true).await)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<PostRecord>, RepoError> {
        let mut posts = self.select(|_| true).await;
        posts.truncate(limit);
        Ok(posts)
    }

    async fn list_by_tag(&self, tag: &str) -> Result<Vec<PostRecord>, RepoError> {
        Ok(self.select(|post| post.tag == tag).await)
    }

    async fn list_by_year(&self, year: i32) -> Result<Vec<PostRecord>, RepoError> {
        Ok(self.select(|post| post.year() == year).await)
    }

    async fn list_by_visits(&self, limit: usize) -> Result<Vec<PostRecord>, RepoError> {
        let mut posts = self.select(|_| true).await;
        // Stable sort keeps the newest-first order among equal counts.
        posts.sort_by_key(|post| Reverse(post.visits));
        posts.truncate(limit);
        Ok(posts)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<PostRecord>, RepoError> {
        Ok(self.state.read().await.posts.get(&id).cloned())
    }

    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let mut state = self.state.write().await;
        state.last_id += 1;
        let now = OffsetDateTime::now_utc();
        let PostDraft {
            subject,
            content,
            image_url,
            tag,
        } = params.draft;

        let post = PostRecord {
            id: state.last_id,
            subject,
            content,
            image_url,
            tag,
            author: params.author,
            visits: 0,
            created_at: now,
            updated_at: now,
        };
        state.posts.insert(post.id, post.clone());
        Ok(post)
    }

    async fn update_post(&self, id: i64, draft: PostDraft) -> Result<PostRecord, RepoError> {
        let mut state = self.state.write().await;
        let post = state.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
        post.subject = draft.subject;
        post.content = draft.content;
        post.image_url = draft.image_url;
        post.tag = draft.tag;
        post.updated_at = OffsetDateTime::now_utc();
        Ok(post.clone())
    }

    async fn record_visit(&self, id: i64) -> Result<PostRecord, RepoError> {
        let mut state = self.state.write().await;
        let post = state.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
        post.visits += 1;
        Ok(post.clone())
    }

    async fn save_preview(&self, preview: PostPreview) -> Result<(), RepoError> {
        self.state.write().await.preview = Some(preview);
        Ok(())
    }

    async fn load_preview(&self) -> Result<Option<PostPreview>, RepoError> {
        Ok(self.state.read().await.preview.clone())
    }
}

#[derive(Default)]
pub struct InMemoryCredentials {
    by_id: RwLock<HashMap<Uuid, Credential>>,
}

impl InMemoryCredentials {
    fn username_taken(
        credentials: &HashMap<Uuid, Credential>,
        username: &str,
        except: Uuid,
    ) -> bool {
        credentials
            .values()
            .any(|existing| existing.username == username && existing.id != except)
    }
}

#[async_trait]
impl CredentialsRepo for InMemoryCredentials {
    async fn find_by_username(&self, username: &str) -> Result<Option<Credential>, RepoError> {
        Ok(self
            .by_id
            .read()
            .await
            .values()
            .find(|credential| credential.username == username)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Credential>, RepoError> {
        Ok(self.by_id.read().await.get(&id).cloned())
    }

    async fn insert(&self, credential: &Credential) -> Result<(), RepoError> {
        let mut credentials = self.by_id.write().await;
        if credentials.contains_key(&credential.id)
            || Self::username_taken(&credentials, &credential.username, credential.id)
        {
            return Err(RepoError::Duplicate {
                constraint: "credentials_username_key".to_string(),
            });
        }
        credentials.insert(credential.id, credential.clone());
        Ok(())
    }

    async fn update(&self, credential: &Credential) -> Result<(), RepoError> {
        let mut credentials = self.by_id.write().await;
        if !credentials.contains_key(&credential.id) {
            return Err(RepoError::NotFound);
        }
        if Self::username_taken(&credentials, &credential.username, credential.id) {
            return Err(RepoError::Duplicate {
                constraint: "credentials_username_key".to_string(),
            });
        }
        credentials.insert(credential.id, credential.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(subject: &str, tag: &str) -> CreatePostParams {
        CreatePostParams {
            draft: PostDraft {
                subject: subject.to_string(),
                content: "content".to_string(),
                image_url: "https://img.example/p.png".to_string(),
                tag: tag.to_string(),
            },
            author: "Author A".to_string(),
        }
    }

    #[tokio::test]
    async fn ids_increase_and_listings_are_newest_first() {
        let repo = InMemoryPosts::default();
        let first = repo.create_post(params("a", "go")).await.expect("created");
        let second = repo.create_post(params("b", "go")).await.expect("created");
        assert!(second.id > first.id);

        let recent = repo.list_recent(10).await.expect("recent");
        assert_eq!(recent[0].id, second.id);
        assert_eq!(repo.list_recent(1).await.expect("recent").len(), 1);
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let repo = InMemoryPosts::default();
        assert!(matches!(
            repo.record_visit(1).await,
            Err(RepoError::NotFound)
        ));
        assert!(matches!(
            repo.update_post(1, params("a", "go").draft).await,
            Err(RepoError::NotFound)
        ));
        assert!(repo.find_by_id(1).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn credential_usernames_are_unique() {
        let repo = InMemoryCredentials::default();
        let make = |username: &str| Credential {
            id: Uuid::new_v4(),
            username: username.to_string(),
            salt: "00".to_string(),
            password_hash: vec![0; 4],
        };

        let admin = make("admin");
        repo.insert(&admin).await.expect("inserted");
        assert!(matches!(
            repo.insert(&make("admin")).await,
            Err(RepoError::Duplicate { .. })
        ));

        let other = make("other");
        repo.insert(&other).await.expect("inserted");
        let renamed = Credential {
            username: "admin".to_string(),
            ..other.clone()
        };
        assert!(matches!(
            repo.update(&renamed).await,
            Err(RepoError::Duplicate { .. })
        ));
        assert!(matches!(
            repo.update(&make("ghost")).await,
            Err(RepoError::NotFound)
        ));
    }
}
