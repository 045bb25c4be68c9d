use async_trait::async_trait;
use time::OffsetDateTime;

use crate::application::repos::{CreatePostParams, PostsRepo, RepoError};
use crate::domain::entities::{PostDraft, PostPreview, PostRecord};

use super::PostgresRepositories;
use super::util::map_sqlx_error;

const POST_COLUMNS: &str =
    "id, subject, content, image_url, tag, author, visits, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct PostRow {
    id: i64,
    subject: String,
    content: String,
    image_url: String,
    tag: String,
    author: String,
    visits: i64,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<PostRow> for PostRecord {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            subject: row.subject,
            content: row.content,
            image_url: row.image_url,
            tag: row.tag,
            author: row.author,
            visits: row.visits,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PreviewRow {
    subject: String,
    content: String,
    image_url: String,
    tag: String,
    author: String,
    saved_at: OffsetDateTime,
}

impl From<PreviewRow> for PostPreview {
    fn from(row: PreviewRow) -> Self {
        Self {
            draft: PostDraft {
                subject: row.subject,
                content: row.content,
                image_url: row.image_url,
                tag: row.tag,
            },
            author: row.author,
            saved_at: row.saved_at,
        }
    }
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn into_records(rows: Vec<PostRow>) -> Vec<PostRecord> {
    rows.into_iter().map(PostRecord::from).collect()
}

#[async_trait]
impl PostsRepo for PostgresRepositories {
    async fn list_all(&self) -> Result<Vec<PostRecord>, RepoError> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts ORDER BY created_at DESC, id DESC");
        let rows = sqlx::query_as::<_, PostRow>(&sql)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(into_records(rows))
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<PostRecord>, RepoError> {
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts ORDER BY created_at DESC, id DESC LIMIT $1"
        );
        let rows = sqlx::query_as::<_, PostRow>(&sql)
            .bind(limit_param(limit))
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(into_records(rows))
    }

    async fn list_by_tag(&self, tag: &str) -> Result<Vec<PostRecord>, RepoError> {
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE tag = $1 ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, PostRow>(&sql)
            .bind(tag)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(into_records(rows))
    }

    async fn list_by_year(&self, year: i32) -> Result<Vec<PostRecord>, RepoError> {
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts \
             WHERE EXTRACT(YEAR FROM created_at AT TIME ZONE 'UTC')::int = $1 \
             ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, PostRow>(&sql)
            .bind(year)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(into_records(rows))
    }

    async fn list_by_visits(&self, limit: usize) -> Result<Vec<PostRecord>, RepoError> {
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts \
             ORDER BY visits DESC, created_at DESC, id DESC LIMIT $1"
        );
        let rows = sqlx::query_as::<_, PostRow>(&sql)
            .bind(limit_param(limit))
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(into_records(rows))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<PostRecord>, RepoError> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1");
        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(PostRecord::from))
    }

    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let CreatePostParams { draft, author } = params;
        let sql = format!(
            "INSERT INTO posts (subject, content, image_url, tag, author) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {POST_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(draft.subject)
            .bind(draft.content)
            .bind(draft.image_url)
            .bind(draft.tag)
            .bind(author)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn update_post(&self, id: i64, draft: PostDraft) -> Result<PostRecord, RepoError> {
        let sql = format!(
            "UPDATE posts SET subject = $2, content = $3, image_url = $4, tag = $5, \
             updated_at = now() WHERE id = $1 RETURNING {POST_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(id)
            .bind(draft.subject)
            .bind(draft.content)
            .bind(draft.image_url)
            .bind(draft.tag)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn record_visit(&self, id: i64) -> Result<PostRecord, RepoError> {
        let sql = format!(
            "UPDATE posts SET visits = visits + 1 WHERE id = $1 RETURNING {POST_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(id)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn save_preview(&self, preview: PostPreview) -> Result<(), RepoError> {
        let PostPreview {
            draft,
            author,
            saved_at,
        } = preview;
        sqlx::query(
            "INSERT INTO post_preview (slot, subject, content, image_url, tag, author, saved_at) \
             VALUES (1, $1, $2, $3, $4, $5, $6) \
             ON CONFLICT (slot) DO UPDATE SET subject = EXCLUDED.subject, \
             content = EXCLUDED.content, image_url = EXCLUDED.image_url, tag = EXCLUDED.tag, \
             author = EXCLUDED.author, saved_at = EXCLUDED.saved_at",
        )
        .bind(draft.subject)
        .bind(draft.content)
        .bind(draft.image_url)
        .bind(draft.tag)
        .bind(author)
        .bind(saved_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn load_preview(&self) -> Result<Option<PostPreview>, RepoError> {
        let row = sqlx::query_as::<_, PreviewRow>(
            "SELECT subject, content, image_url, tag, author, saved_at \
             FROM post_preview WHERE slot = 1",
        )
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(PostPreview::from))
    }
}
