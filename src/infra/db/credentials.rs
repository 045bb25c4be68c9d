use async_trait::async_trait;
use uuid::Uuid;

use crate::application::repos::{CredentialsRepo, RepoError};
use crate::domain::credentials::Credential;

use super::PostgresRepositories;
use super::util::map_sqlx_error;

#[derive(sqlx::FromRow)]
struct CredentialRow {
    id: Uuid,
    username: String,
    salt: String,
    password_hash: Vec<u8>,
}

impl From<CredentialRow> for Credential {
    fn from(row: CredentialRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            salt: row.salt,
            password_hash: row.password_hash,
        }
    }
}

#[async_trait]
impl CredentialsRepo for PostgresRepositories {
    async fn find_by_username(&self, username: &str) -> Result<Option<Credential>, RepoError> {
        let row = sqlx::query_as::<_, CredentialRow>(
            "SELECT id, username, salt, password_hash FROM credentials WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(Credential::from))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Credential>, RepoError> {
        let row = sqlx::query_as::<_, CredentialRow>(
            "SELECT id, username, salt, password_hash FROM credentials WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(Credential::from))
    }

    async fn insert(&self, credential: &Credential) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO credentials (id, username, salt, password_hash) VALUES ($1, $2, $3, $4)",
        )
        .bind(credential.id)
        .bind(&credential.username)
        .bind(&credential.salt)
        .bind(&credential.password_hash)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn update(&self, credential: &Credential) -> Result<(), RepoError> {
        let result = sqlx::query(
            "UPDATE credentials SET username = $2, salt = $3, password_hash = $4, \
             updated_at = now() WHERE id = $1",
        )
        .bind(credential.id)
        .bind(&credential.username)
        .bind(&credential.salt)
        .bind(&credential.password_hash)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
