use crate::application::repos::RepoError;
use crate::cache::CacheError;

pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::Database(db) if db.message().contains("duplicate key") => {
            RepoError::Duplicate {
                constraint: db.constraint().unwrap_or("unknown").to_string(),
            }
        }
        sqlx::Error::Database(db)
            if db
                .message()
                .contains("canceling statement due to user request") =>
        {
            RepoError::Timeout
        }
        other => RepoError::from_persistence(other),
    }
}

/// Every database failure on the cache path means the shared namespace is
/// unreachable from this node.
pub fn map_cache_error(err: sqlx::Error) -> CacheError {
    CacheError::unavailable(err.to_string())
}
