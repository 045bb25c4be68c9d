use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{post, put},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use serde_json::json;

use crate::{application::error::HttpError, domain::entities::PostDraft};

use super::{AdminSession, HttpState, Submitted, session_cookie};

#[derive(Debug, Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct PostForm {
    #[serde(flatten)]
    draft: PostDraft,
    /// Store into the preview slot instead of publishing.
    #[serde(default)]
    preview: bool,
}

#[derive(Debug, Deserialize)]
struct PasswordForm {
    password: String,
    verify_password: String,
}

#[derive(Debug, Deserialize)]
struct UsernameForm {
    new_username: String,
    password: String,
}

pub(super) fn routes() -> Router<HttpState> {
    Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout).get(logout))
        .route("/admin/posts", post(create_post))
        .route("/admin/posts/{id}", put(update_post))
        .route("/admin/password", post(change_password))
        .route("/admin/username", post(change_username))
}

async fn login(
    State(state): State<HttpState>,
    jar: CookieJar,
    Submitted(form): Submitted<LoginForm>,
) -> Result<Response, HttpError> {
    let outcome = state.auth.login(&form.username, &form.password).await?;
    let cookie = session_cookie(state.auth.session_cookie(&outcome.token));
    Ok((jar.add(cookie), Json(outcome.principal)).into_response())
}

async fn logout(State(state): State<HttpState>, jar: CookieJar) -> Response {
    let cookie = session_cookie(state.auth.logout());
    (jar.add(cookie), StatusCode::NO_CONTENT).into_response()
}

async fn create_post(
    State(state): State<HttpState>,
    AdminSession(_): AdminSession,
    Submitted(form): Submitted<PostForm>,
) -> Result<Response, HttpError> {
    if form.preview {
        let preview = state.posts.preview(form.draft).await?;
        return Ok(Json(preview).into_response());
    }

    let post = state.posts.create(form.draft).await?;
    Ok((StatusCode::CREATED, Json(post)).into_response())
}

async fn update_post(
    State(state): State<HttpState>,
    AdminSession(_): AdminSession,
    Path(id): Path<String>,
    Submitted(draft): Submitted<PostDraft>,
) -> Result<Response, HttpError> {
    const SOURCE: &str = "infra::http::admin::update_post";

    let id: i64 = id.parse().map_err(|_| {
        HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Resource not found",
            format!("`{id}` is not a post id"),
        )
    })?;
    let post = state.posts.update(id, draft).await?;
    Ok(Json(post).into_response())
}

async fn change_password(
    State(state): State<HttpState>,
    AdminSession(principal): AdminSession,
    Submitted(form): Submitted<PasswordForm>,
) -> Result<Response, HttpError> {
    state
        .auth
        .change_password(&principal, &form.password, &form.verify_password)
        .await?;
    Ok(Json(json!({ "status": "password changed" })).into_response())
}

async fn change_username(
    State(state): State<HttpState>,
    AdminSession(principal): AdminSession,
    Submitted(form): Submitted<UsernameForm>,
) -> Result<Response, HttpError> {
    let renamed = state
        .auth
        .change_username(&principal, &form.new_username, &form.password)
        .await?;
    Ok(Json(renamed).into_response())
}
