//! Request extractors: session state, admin guard and form-or-JSON bodies.

use axum::{
    Form, Json,
    extract::{FromRequest, FromRequestParts, Request},
    http::{header::CONTENT_TYPE, request::Parts},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::de::DeserializeOwned;

use crate::application::{
    auth::{Principal, SessionCookie},
    context::SiteContext,
    error::HttpError,
};

use super::HttpState;

const SOURCE: &str = "infra::http::session";

fn session_value<'a>(jar: &'a CookieJar, name: &str) -> Option<&'a str> {
    jar.get(name).map(|cookie| cookie.value())
}

impl FromRequestParts<HttpState> for SiteContext {
    type Rejection = HttpError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &HttpState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let cookie = session_value(&jar, state.auth.cookie_name());
        SiteContext::assemble(&state.auth, &state.listings, cookie)
            .await
            .map_err(HttpError::from)
    }
}

/// An authenticated admin. Rejects anonymous requests with 401.
#[derive(Debug, Clone)]
pub struct AdminSession(pub Principal);

impl FromRequestParts<HttpState> for AdminSession {
    type Rejection = HttpError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &HttpState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let cookie = session_value(&jar, state.auth.cookie_name());
        match state.auth.resolve(cookie).await.principal() {
            Some(principal) => Ok(AdminSession(principal.clone())),
            None => Err(HttpError::unauthorized(SOURCE)),
        }
    }
}

/// Body accepted as `application/json` or as an urlencoded form.
#[derive(Debug, Clone)]
pub struct Submitted<T>(pub T);

impl<S, T> FromRequest<S> for Submitted<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = HttpError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("application/json"));

        if is_json {
            Json::<T>::from_request(request, state)
                .await
                .map(|Json(value)| Submitted(value))
                .map_err(|rejection| {
                    HttpError::new(
                        SOURCE,
                        rejection.status(),
                        "Malformed request body",
                        rejection.body_text(),
                    )
                })
        } else {
            Form::<T>::from_request(request, state)
                .await
                .map(|Form(value)| Submitted(value))
                .map_err(|rejection| {
                    HttpError::new(
                        SOURCE,
                        rejection.status(),
                        "Malformed request body",
                        rejection.body_text(),
                    )
                })
        }
    }
}

/// Render a set-or-clear instruction as a cookie scoped to the whole site.
pub fn session_cookie(instruction: SessionCookie) -> Cookie<'static> {
    Cookie::build((instruction.name, instruction.value))
        .path(instruction.path)
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}
