//! Admin credentials: salted Argon2id password hashes and the rules for
//! changing them.
//!
//! Every operation here is a pure function of its inputs plus the KDF cost
//! parameters; persistence and uniqueness checks live in the application
//! layer.

use std::fmt;

use argon2::{Algorithm, Argon2, Params, Version};
use rand::{RngCore, rngs::OsRng};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

/// Random salt length in bytes (hex-encoded when stored).
pub const SALT_BYTES: usize = 16;
/// Derived hash length in bytes.
pub const HASH_LEN: usize = 32;
/// Minimum password length accepted by [`CredentialStore::change_password`].
pub const MIN_PASSWORD_CHARS: usize = 6;

const DUMMY_SALT: &str = "00000000000000000000000000000000";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("invalid username")]
    InvalidUsername,
    #[error("passwords do not match")]
    PasswordMismatch,
    #[error("password must be at least {} characters", MIN_PASSWORD_CHARS)]
    PasswordTooShort,
    #[error("invalid password")]
    InvalidPassword,
    #[error("key derivation failed: {0}")]
    Kdf(String),
}

/// Stored username, salt and derived password hash.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub id: Uuid,
    pub username: String,
    pub salt: String,
    pub password_hash: Vec<u8>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("salt", &"<redacted>")
            .field("password_hash", &"<redacted>")
            .finish()
    }
}

/// Argon2 cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

#[derive(Clone)]
pub struct CredentialStore {
    kdf: Argon2<'static>,
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore").finish_non_exhaustive()
    }
}

impl CredentialStore {
    pub fn new(params: KdfParams) -> Result<Self, CredentialError> {
        let params = Params::new(
            params.memory_kib,
            params.iterations,
            params.parallelism,
            Some(HASH_LEN),
        )
        .map_err(|err| CredentialError::Kdf(err.to_string()))?;

        Ok(Self {
            kdf: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash `password` under a fresh salt.
    ///
    /// Username uniqueness is the caller's concern; this only rejects blank
    /// usernames.
    pub fn create_credential(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Credential, CredentialError> {
        let username = normalize_username(username)?;
        let salt = generate_salt();
        let password_hash = self.derive(password, &salt)?;

        Ok(Credential {
            id: Uuid::new_v4(),
            username,
            salt,
            password_hash,
        })
    }

    pub fn verify(&self, credential: &Credential, password: &str) -> bool {
        match self.derive(password, &credential.salt) {
            Ok(candidate) => credential.password_hash.ct_eq(&candidate).unwrap_u8() == 1,
            Err(err) => {
                warn!(
                    credential_id = %credential.id,
                    error = %err,
                    "password verification could not derive a hash"
                );
                false
            }
        }
    }

    /// Run one derivation against a throwaway salt so that a login for an
    /// unknown username costs the same as a wrong password.
    pub fn verify_dummy(&self, password: &str) {
        let _ = self.derive(password, DUMMY_SALT);
    }

    /// Replace the password. The caller has already authenticated the
    /// session; the current password is not checked here.
    pub fn change_password(
        &self,
        credential: &Credential,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<Credential, CredentialError> {
        if new_password != confirm_password {
            return Err(CredentialError::PasswordMismatch);
        }
        if new_password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(CredentialError::PasswordTooShort);
        }

        let salt = generate_salt();
        let password_hash = self.derive(new_password, &salt)?;

        Ok(Credential {
            salt,
            password_hash,
            ..credential.clone()
        })
    }

    /// Rename the credential after re-checking the current password. Salt
    /// and hash are carried over untouched.
    pub fn change_username(
        &self,
        credential: &Credential,
        new_username: &str,
        current_password: &str,
    ) -> Result<Credential, CredentialError> {
        if !self.verify(credential, current_password) {
            return Err(CredentialError::InvalidPassword);
        }

        Ok(Credential {
            username: normalize_username(new_username)?,
            ..credential.clone()
        })
    }

    fn derive(&self, password: &str, salt: &str) -> Result<Vec<u8>, CredentialError> {
        let mut output = vec![0u8; HASH_LEN];
        self.kdf
            .hash_password_into(password.as_bytes(), salt.as_bytes(), &mut output)
            .map_err(|err| CredentialError::Kdf(err.to_string()))?;
        Ok(output)
    }
}

fn normalize_username(username: &str) -> Result<String, CredentialError> {
    let trimmed = username.trim();
    if trimmed.is_empty() {
        return Err(CredentialError::InvalidUsername);
    }
    Ok(trimmed.to_string())
}

fn generate_salt() -> String {
    let mut bytes = [0u8; SALT_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
pub(crate) fn test_store() -> CredentialStore {
    CredentialStore::new(KdfParams {
        memory_kib: 64,
        iterations: 1,
        parallelism: 1,
    })
    .expect("cheap test parameters are valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_credential_verifies_its_password() {
        let store = test_store();
        for (username, password) in [("admin", "password"), ("ana", ""), ("b", "ünïcødé pass")] {
            let credential = store
                .create_credential(username, password)
                .expect("credential created");
            assert!(store.verify(&credential, password), "{username} should verify");
        }
    }

    #[test]
    fn different_password_is_rejected() {
        let store = test_store();
        let credential = store.create_credential("admin", "hunter22").expect("created");

        for wrong in ["hunter23", "Hunter22", "", "hunter22 "] {
            assert!(!store.verify(&credential, wrong), "{wrong:?} must not verify");
        }
    }

    #[test]
    fn salts_are_unique_per_credential() {
        let store = test_store();
        let a = store.create_credential("a", "same-password").expect("created");
        let b = store.create_credential("b", "same-password").expect("created");

        assert_ne!(a.salt, b.salt);
        assert_ne!(a.password_hash, b.password_hash);
        assert_eq!(a.salt.len(), SALT_BYTES * 2);
    }

    #[test]
    fn blank_username_is_invalid() {
        let store = test_store();
        assert_eq!(
            store.create_credential("   ", "password"),
            Err(CredentialError::InvalidUsername)
        );
    }

    #[test]
    fn change_password_enforces_confirmation_then_length() {
        let store = test_store();
        let credential = store.create_credential("admin", "password").expect("created");

        assert_eq!(
            store.change_password(&credential, "abcdef", "abcdeg"),
            Err(CredentialError::PasswordMismatch)
        );
        assert_eq!(
            store.change_password(&credential, "abcde", "abcde"),
            Err(CredentialError::PasswordTooShort)
        );
    }

    #[test]
    fn change_password_regenerates_salt() {
        let store = test_store();
        let credential = store.create_credential("admin", "password").expect("created");

        let updated = store
            .change_password(&credential, "new-secret", "new-secret")
            .expect("password changed");

        assert_eq!(updated.id, credential.id);
        assert_eq!(updated.username, credential.username);
        assert_ne!(updated.salt, credential.salt);
        assert!(store.verify(&updated, "new-secret"));
        assert!(!store.verify(&updated, "password"));
    }

    #[test]
    fn change_password_accepts_exactly_minimum_length() {
        let store = test_store();
        let credential = store.create_credential("admin", "password").expect("created");
        assert!(store.change_password(&credential, "123456", "123456").is_ok());
    }

    #[test]
    fn change_username_requires_current_password() {
        let store = test_store();
        let credential = store.create_credential("admin", "password").expect("created");

        assert_eq!(
            store.change_username(&credential, "editor", "wrong"),
            Err(CredentialError::InvalidPassword)
        );

        let renamed = store
            .change_username(&credential, "editor", "password")
            .expect("renamed");
        assert_eq!(renamed.username, "editor");
        assert_eq!(renamed.salt, credential.salt);
        assert_eq!(renamed.password_hash, credential.password_hash);
        assert!(store.verify(&renamed, "password"));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let store = test_store();
        let credential = store.create_credential("admin", "password").expect("created");
        let rendered = format!("{credential:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains(&credential.salt));
    }

    #[test]
    fn invalid_params_are_reported() {
        let err = CredentialStore::new(KdfParams {
            memory_kib: 0,
            iterations: 0,
            parallelism: 0,
        })
        .expect_err("zero cost rejected");
        assert!(matches!(err, CredentialError::Kdf(_)));
    }
}
