//! Admin authentication: login, session resolution and credential changes.
//!
//! Sessions are `ANONYMOUS` until a login succeeds, which issues a signed
//! token naming the credential. Every request re-derives its state from the
//! cookie; a token that fails verification, has expired, or names a
//! credential that no longer exists simply resolves to anonymous.

use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::repos::{CredentialsRepo, RepoError};
use crate::domain::credentials::{Credential, CredentialError, CredentialStore};
use crate::domain::session::{SessionSubject, SessionToken, SessionTokenCodec};

const SOURCE: &str = "application::auth";
const METRIC_LOGIN_FAILURE_TOTAL: &str = "penna_login_failure_total";

pub const DEFAULT_COOKIE_NAME: &str = "user_id";
const COOKIE_PATH: &str = "/";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("authentication required")]
    Unauthenticated,
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub credential_id: Uuid,
    pub username: String,
}

impl From<&Credential> for Principal {
    fn from(credential: &Credential) -> Self {
        Self {
            credential_id: credential.id,
            username: credential.username.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthContext {
    #[default]
    Anonymous,
    Authenticated(Principal),
}

impl AuthContext {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthContext::Authenticated(_))
    }

    pub fn principal(&self) -> Option<&Principal> {
        match self {
            AuthContext::Authenticated(principal) => Some(principal),
            AuthContext::Anonymous => None,
        }
    }

    pub fn require(&self) -> Result<&Principal, AuthError> {
        self.principal().ok_or(AuthError::Unauthenticated)
    }
}

/// Instruction for the transport layer to set or clear the session cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub path: &'static str,
}

impl SessionCookie {
    pub fn is_removal(&self) -> bool {
        self.value.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub token: SessionToken,
    pub principal: Principal,
}

#[derive(Clone)]
pub struct AdminSeed {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for AdminSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminSeed")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SessionPolicy {
    pub cookie_name: String,
    /// Tokens older than this resolve to anonymous; `None` keeps sessions
    /// valid until the signing secret rotates.
    pub max_age: Option<Duration>,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            max_age: None,
        }
    }
}

#[derive(Clone)]
pub struct AuthService {
    credentials: Arc<dyn CredentialsRepo>,
    store: CredentialStore,
    codec: SessionTokenCodec,
    policy: SessionPolicy,
}

impl AuthService {
    pub fn new(
        credentials: Arc<dyn CredentialsRepo>,
        store: CredentialStore,
        codec: SessionTokenCodec,
        policy: SessionPolicy,
    ) -> Self {
        Self {
            credentials,
            store,
            codec,
            policy,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.policy.cookie_name
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let credential = self.credentials.find_by_username(username.trim()).await?;

        let Some(credential) = credential else {
            // Same KDF cost as a wrong password for the caller's clock.
            let password = password.to_string();
            self.with_store(move |store| store.verify_dummy(&password))
                .await?;
            counter!(METRIC_LOGIN_FAILURE_TOTAL, "reason" => "unknown_user").increment(1);
            debug!(target_module = SOURCE, "Login rejected: unknown username");
            return Err(AuthError::InvalidCredentials);
        };

        let (credential, verified) = {
            let password = password.to_string();
            self.with_store(move |store| {
                let verified = store.verify(&credential, &password);
                (credential, verified)
            })
            .await?
        };
        if !verified {
            counter!(METRIC_LOGIN_FAILURE_TOTAL, "reason" => "wrong_password").increment(1);
            debug!(
                target_module = SOURCE,
                credential_id = %credential.id,
                "Login rejected: password mismatch"
            );
            return Err(AuthError::InvalidCredentials);
        }

        let subject = SessionSubject::new(credential.id, OffsetDateTime::now_utc());
        let token = self.codec.issue(&subject.to_string());
        info!(
            target_module = SOURCE,
            credential_id = %credential.id,
            "Admin session issued"
        );

        Ok(LoginOutcome {
            token,
            principal: Principal::from(&credential),
        })
    }

    /// Derive the session state from a cookie value. Never fails: anything
    /// short of a valid, live session is `Anonymous`.
    pub async fn resolve(&self, cookie: Option<&str>) -> AuthContext {
        let Some(raw) = cookie.filter(|value| !value.is_empty()) else {
            return AuthContext::Anonymous;
        };

        let subject = match self.codec.verify(raw) {
            Ok(subject) => subject,
            Err(err) => {
                debug!(target_module = SOURCE, reason = %err, "Session token rejected");
                return AuthContext::Anonymous;
            }
        };

        let subject: SessionSubject = match subject.parse() {
            Ok(subject) => subject,
            Err(err) => {
                debug!(target_module = SOURCE, reason = %err, "Session subject unreadable");
                return AuthContext::Anonymous;
            }
        };

        if let Some(max_age) = self.policy.max_age
            && subject.age_seconds(OffsetDateTime::now_utc()) > max_age.whole_seconds()
        {
            debug!(
                target_module = SOURCE,
                credential_id = %subject.credential_id,
                "Session expired"
            );
            return AuthContext::Anonymous;
        }

        match self.credentials.find_by_id(subject.credential_id).await {
            Ok(Some(credential)) => AuthContext::Authenticated(Principal::from(&credential)),
            Ok(None) => {
                debug!(
                    target_module = SOURCE,
                    credential_id = %subject.credential_id,
                    "Session names a credential that no longer exists"
                );
                AuthContext::Anonymous
            }
            Err(err) => {
                warn!(
                    target_module = SOURCE,
                    error = %err,
                    "Credential lookup failed while resolving session"
                );
                AuthContext::Anonymous
            }
        }
    }

    pub fn session_cookie(&self, token: &SessionToken) -> SessionCookie {
        SessionCookie {
            name: self.policy.cookie_name.clone(),
            value: token.as_str().to_string(),
            path: COOKIE_PATH,
        }
    }

    /// Clearing instruction; there is no server-side session to destroy.
    pub fn logout(&self) -> SessionCookie {
        SessionCookie {
            name: self.policy.cookie_name.clone(),
            value: String::new(),
            path: COOKIE_PATH,
        }
    }

    pub async fn change_password(
        &self,
        principal: &Principal,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<(), AuthError> {
        let credential = self.load(principal).await?;
        let (new_password, confirm_password) =
            (new_password.to_string(), confirm_password.to_string());
        let updated = self
            .with_store(move |store| {
                store.change_password(&credential, &new_password, &confirm_password)
            })
            .await??;
        self.credentials.update(&updated).await?;

        info!(
            target_module = SOURCE,
            credential_id = %updated.id,
            "Admin password changed"
        );
        Ok(())
    }

    pub async fn change_username(
        &self,
        principal: &Principal,
        new_username: &str,
        current_password: &str,
    ) -> Result<Principal, AuthError> {
        let credential = self.load(principal).await?;
        let (new_username, current_password) =
            (new_username.to_string(), current_password.to_string());
        let updated = self
            .with_store(move |store| {
                store.change_username(&credential, &new_username, &current_password)
            })
            .await??;

        if let Some(existing) = self.credentials.find_by_username(&updated.username).await?
            && existing.id != updated.id
        {
            return Err(CredentialError::InvalidUsername.into());
        }
        self.credentials
            .update(&updated)
            .await
            .map_err(duplicate_as_invalid_username)?;

        info!(
            target_module = SOURCE,
            credential_id = %updated.id,
            username = %updated.username,
            "Admin username changed"
        );
        Ok(Principal::from(&updated))
    }

    pub async fn create_credential(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Credential, AuthError> {
        let (username, password) = (username.to_string(), password.to_string());
        let credential = self
            .with_store(move |store| store.create_credential(&username, &password))
            .await??;
        if self
            .credentials
            .find_by_username(&credential.username)
            .await?
            .is_some()
        {
            return Err(CredentialError::InvalidUsername.into());
        }

        self.credentials
            .insert(&credential)
            .await
            .map_err(duplicate_as_invalid_username)?;
        Ok(credential)
    }

    /// Create the seed admin unless a credential with that username exists.
    /// Returns whether a credential was created.
    pub async fn bootstrap_admin(&self, seed: &AdminSeed) -> Result<bool, AuthError> {
        if self
            .credentials
            .find_by_username(seed.username.trim())
            .await?
            .is_some()
        {
            debug!(target_module = SOURCE, "Admin seed already present");
            return Ok(false);
        }

        let credential = self.create_credential(&seed.username, &seed.password).await?;
        info!(
            target_module = SOURCE,
            credential_id = %credential.id,
            username = %credential.username,
            "Seeded admin credential"
        );
        Ok(true)
    }

    /// Run key derivation on the blocking pool so Argon2 never occupies an
    /// async worker.
    async fn with_store<T, F>(&self, work: F) -> Result<T, AuthError>
    where
        T: Send + 'static,
        F: FnOnce(&CredentialStore) -> T + Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || work(&store))
            .await
            .map_err(|err| {
                AuthError::from(CredentialError::Kdf(format!(
                    "credential task did not complete: {err}"
                )))
            })
    }

    async fn load(&self, principal: &Principal) -> Result<Credential, AuthError> {
        self.credentials
            .find_by_id(principal.credential_id)
            .await?
            .ok_or(AuthError::Unauthenticated)
    }
}

fn duplicate_as_invalid_username(err: RepoError) -> AuthError {
    match err {
        RepoError::Duplicate { .. } => CredentialError::InvalidUsername.into(),
        other => other.into(),
    }
}
