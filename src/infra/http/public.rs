use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;

use crate::{
    application::{
        context::{Chrome, SiteContext},
        error::HttpError,
    },
    domain::entities::{PostPreview, PostRecord},
};

use super::HttpState;

#[derive(Debug, Serialize)]
struct ListingPage<'a> {
    #[serde(flatten)]
    chrome: Chrome<'a>,
    posts: Vec<PostRecord>,
}

#[derive(Debug, Serialize)]
struct PostPage<'a> {
    #[serde(flatten)]
    chrome: Chrome<'a>,
    post: PostRecord,
}

#[derive(Debug, Serialize)]
struct PreviewPage<'a> {
    #[serde(flatten)]
    chrome: Chrome<'a>,
    preview: PostPreview,
}

pub(super) fn routes() -> Router<HttpState> {
    Router::new()
        .route("/", get(index))
        .route("/tags/{tag}", get(tag_index))
        .route("/archive/{year}", get(archive_index))
        .route("/history", get(history))
        .route("/posts/{id}", get(post_detail))
        .route("/preview", get(preview))
}

fn listing(site: &SiteContext, posts: Vec<PostRecord>) -> Json<ListingPage<'_>> {
    Json(ListingPage {
        chrome: site.chrome(),
        posts,
    })
}

async fn index(
    State(state): State<HttpState>,
    site: SiteContext,
) -> Result<Response, HttpError> {
    let posts = state.listings.main().await?;
    Ok(listing(&site, posts).into_response())
}

async fn tag_index(
    State(state): State<HttpState>,
    site: SiteContext,
    Path(tag): Path<String>,
) -> Result<Response, HttpError> {
    let posts = state.listings.by_tag(&site.navigation, &tag).await?;
    Ok(listing(&site, posts).into_response())
}

async fn archive_index(
    State(state): State<HttpState>,
    site: SiteContext,
    Path(year): Path<String>,
) -> Result<Response, HttpError> {
    let posts = state.listings.by_year(&site.navigation, &year).await?;
    Ok(listing(&site, posts).into_response())
}

async fn history(
    State(state): State<HttpState>,
    site: SiteContext,
) -> Result<Response, HttpError> {
    let posts = state.listings.history().await?;
    Ok(listing(&site, posts).into_response())
}

async fn post_detail(
    State(state): State<HttpState>,
    site: SiteContext,
    Path(id): Path<String>,
) -> Result<Response, HttpError> {
    const SOURCE: &str = "infra::http::public::post_detail";

    let id: i64 = id.parse().map_err(|_| {
        HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Resource not found",
            format!("`{id}` is not a post id"),
        )
    })?;
    let post = state.posts.visit(id).await?;
    Ok(Json(PostPage {
        chrome: site.chrome(),
        post,
    })
    .into_response())
}

async fn preview(
    State(state): State<HttpState>,
    site: SiteContext,
) -> Result<Response, HttpError> {
    let preview = state.posts.load_preview().await?;
    Ok(Json(PreviewPage {
        chrome: site.chrome(),
        preview,
    })
    .into_response())
}
