//! Round trips against a live Postgres. Run with
//! `DATABASE_URL=... cargo test -- --ignored`.

use bytes::Bytes;
use penna::application::repos::{CreatePostParams, CredentialsRepo, PostsRepo, RepoError};
use penna::cache::CacheBackend;
use penna::domain::credentials::Credential;
use penna::domain::entities::PostDraft;
use penna::infra::db::{PostgresCacheBackend, PostgresRepositories};
use sqlx::PgPool;
use uuid::Uuid;

fn params(subject: &str, tag: &str) -> CreatePostParams {
    CreatePostParams {
        draft: PostDraft {
            subject: subject.to_string(),
            content: format!("{subject} body"),
            image_url: "https://img.example/p.png".to_string(),
            tag: tag.to_string(),
        },
        author: "Author A".to_string(),
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn posts_list_newest_first_and_count_visits(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);

    let first = repos.create_post(params("A", "rust")).await.expect("created");
    let second = repos.create_post(params("B", "go")).await.expect("created");

    let recent = repos.list_recent(10).await.expect("recent");
    assert_eq!(recent[0].id, second.id);
    assert_eq!(repos.list_by_tag("rust").await.expect("tag")[0].id, first.id);

    let visited = repos.record_visit(first.id).await.expect("visit");
    assert_eq!(visited.visits, 1);
    let history = repos.list_by_visits(10).await.expect("history");
    assert_eq!(history[0].id, first.id);

    assert!(matches!(
        repos.record_visit(first.id + 1000).await,
        Err(RepoError::NotFound)
    ));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn credential_usernames_are_unique(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let make = |username: &str| Credential {
        id: Uuid::new_v4(),
        username: username.to_string(),
        salt: "00".to_string(),
        password_hash: vec![0; 4],
    };

    repos.insert(&make("admin")).await.expect("inserted");
    assert!(matches!(
        repos.insert(&make("admin")).await,
        Err(RepoError::Duplicate { .. })
    ));
    assert!(matches!(
        repos.update(&make("ghost")).await,
        Err(RepoError::NotFound)
    ));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn cache_entries_upsert_and_delete(pool: PgPool) {
    let backend = PostgresCacheBackend::new(PostgresRepositories::new(pool));

    backend
        .set("listing:main", Bytes::from_static(b"[1]"))
        .await
        .expect("set");
    backend
        .set("listing:main", Bytes::from_static(b"[2,1]"))
        .await
        .expect("overwrite");
    assert_eq!(
        backend.get("listing:main").await.expect("get"),
        Some(Bytes::from_static(b"[2,1]"))
    );

    backend.delete("listing:main").await.expect("delete");
    assert_eq!(backend.get("listing:main").await.expect("get"), None);
}
