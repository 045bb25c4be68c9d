mod admin;
mod middleware;
mod public;
mod session;

pub use session::{AdminSession, Submitted, session_cookie};

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use sqlx::Error as SqlxError;

use crate::application::{
    auth::AuthService, error::ErrorReport, listing::ListingService, posts::PostService,
};
use crate::infra::db::PostgresRepositories;

use middleware::{log_responses, set_request_context};

#[derive(Clone)]
pub struct HttpState {
    pub auth: AuthService,
    pub listings: ListingService,
    pub posts: PostService,
    /// Present when posts live in Postgres; the in-memory store has no
    /// connection to check.
    pub db: Option<PostgresRepositories>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .merge(public::routes())
        .merge(admin::routes())
        .route("/_health", get(health))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}

async fn health(State(state): State<HttpState>) -> Response {
    match &state.db {
        Some(db) => db_health_response(db.health_check().await),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

fn db_health_response(result: Result<(), SqlxError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_health_check_carries_a_report() {
        let response = db_health_response(Err(SqlxError::PoolTimedOut));
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("report attached");
        assert_eq!(report.source, "infra::http::db_health");
    }

    #[test]
    fn healthy_database_is_no_content() {
        assert_eq!(db_health_response(Ok(())).status(), StatusCode::NO_CONTENT);
    }
}
