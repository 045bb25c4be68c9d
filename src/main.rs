use std::{process, sync::Arc};

use penna::{
    application::{
        auth::{AuthError, AuthService, SessionPolicy},
        error::AppError,
        listing::{ListingLimits, ListingService},
        posts::{PostService, PostSettings},
        repos::{CredentialsRepo, PostsRepo},
    },
    cache::{CacheBackend, CacheConfig, ContentCache, MemoryBackend},
    config::{self, CacheBackendKind, HashPasswordArgs},
    domain::{credentials::CredentialStore, session::SessionTokenCodec},
    infra::{
        db::{PostgresCacheBackend, PostgresRepositories},
        error::InfraError,
        http::{self, HttpState},
        memory::{InMemoryCredentials, InMemoryPosts},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::HashPassword(args) => run_hash_password(&settings, &args),
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let secret = settings
        .session
        .secret
        .as_deref()
        .ok_or_else(|| AppError::validation("session.secret must be set to serve"))?;
    let codec = SessionTokenCodec::new(secret.as_bytes())
        .map_err(|err| AppError::validation(format!("session.secret: {err}")))?;
    let store = CredentialStore::new(settings.kdf).map_err(AuthError::from)?;

    let db = init_repositories(&settings).await?;
    let (posts_repo, credentials_repo): (Arc<dyn PostsRepo>, Arc<dyn CredentialsRepo>) =
        match db.as_ref() {
            Some(db) => (Arc::new(db.clone()), Arc::new(db.clone())),
            None => {
                warn!("database.url is not set; posts and credentials are kept in memory");
                (
                    Arc::new(InMemoryPosts::default()),
                    Arc::new(InMemoryCredentials::default()),
                )
            }
        };

    let cache_config = CacheConfig::from(&settings.cache);
    let backend: Arc<dyn CacheBackend> = match (cache_config.backend, db.as_ref()) {
        (CacheBackendKind::Postgres, Some(db)) => Arc::new(PostgresCacheBackend::new(db.clone())),
        (CacheBackendKind::Postgres, None) => {
            return Err(InfraError::configuration(
                "the postgres cache backend requires database.url",
            )
            .into());
        }
        (CacheBackendKind::Memory, _) => {
            Arc::new(MemoryBackend::new(cache_config.capacity_non_zero()))
        }
    };
    let cache = Arc::new(ContentCache::new(backend, &cache_config));

    let max_age = settings
        .session
        .max_age
        .map(time::Duration::try_from)
        .transpose()
        .map_err(|err| AppError::validation(format!("session.max_age_seconds: {err}")))?;
    let auth = AuthService::new(
        credentials_repo,
        store,
        codec,
        SessionPolicy {
            cookie_name: settings.session.cookie_name.clone(),
            max_age,
        },
    );

    if let Some(seed) = settings.admin.seed.as_ref() {
        let created = auth.bootstrap_admin(seed).await?;
        info!(username = %seed.username, created, "admin seed applied");
    }

    let listings = ListingService::new(
        posts_repo.clone(),
        cache.clone(),
        ListingLimits {
            main_page_size: settings.listing.main_page_size.get(),
            history_size: settings.listing.history_size.get(),
        },
    );
    let posts = PostService::new(
        posts_repo,
        cache,
        listings.clone(),
        PostSettings {
            author: settings.site.author.clone(),
            refresh_on_write: cache_config.refresh_on_write,
        },
    );

    let state = HttpState {
        auth,
        listings,
        posts,
        db,
    };
    serve_http(&settings, state).await
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Option<PostgresRepositories>, AppError> {
    let Some(database_url) = settings.database.url.as_ref() else {
        return Ok(None);
    };

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    Ok(Some(PostgresRepositories::new(pool)))
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "listening");

    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal());
    let grace = settings.server.graceful_shutdown;

    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))
        }
        _ = async {
            shutdown_signal().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(grace_seconds = grace.as_secs(), "graceful shutdown timed out");
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

fn run_hash_password(settings: &config::Settings, args: &HashPasswordArgs) -> Result<(), AppError> {
    let store = CredentialStore::new(settings.kdf).map_err(AuthError::from)?;
    let credential = store
        .create_credential(&args.username, &args.password)
        .map_err(AuthError::from)?;

    println!("username = {}", credential.username);
    println!("salt     = {}", credential.salt);
    println!("hash     = {}", hex::encode(&credential.password_hash));
    Ok(())
}
