//! Signed session tokens.
//!
//! A token is `subject|tag` where `tag` is the lowercase hex HMAC-SHA256 of
//! the subject under the process-wide signing secret. The token is the whole
//! session: there is no server-side allowlist, so rotating the secret drops
//! every outstanding session at once.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use hmac::{Hmac, Mac};
use rand::{RngCore, rngs::OsRng};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const TOKEN_SEPARATOR: char = '|';
const TAG_HEX_LEN: usize = 64;
const SUBJECT_SEPARATOR: char = '.';
const NONCE_BYTES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("session token is malformed")]
    Malformed,
    #[error("session token failed its integrity check")]
    Tampered,
    #[error("signing secret is unusable")]
    InvalidSecret,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone)]
pub struct SessionTokenCodec {
    keyed: Arc<HmacSha256>,
}

impl fmt::Debug for SessionTokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTokenCodec").finish_non_exhaustive()
    }
}

impl SessionTokenCodec {
    pub fn new(secret: &[u8]) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::InvalidSecret);
        }
        let keyed = HmacSha256::new_from_slice(secret).map_err(|_| TokenError::InvalidSecret)?;
        Ok(Self {
            keyed: Arc::new(keyed),
        })
    }

    pub fn issue(&self, subject: &str) -> SessionToken {
        SessionToken(format!("{subject}{TOKEN_SEPARATOR}{}", self.tag(subject)))
    }

    /// Recover the subject from a token.
    ///
    /// The tag is taken after the last separator, so subjects may themselves
    /// contain the separator character.
    pub fn verify(&self, token: &str) -> Result<String, TokenError> {
        let (subject, tag) = token
            .rsplit_once(TOKEN_SEPARATOR)
            .ok_or(TokenError::Malformed)?;

        if tag.len() != TAG_HEX_LEN || !tag.bytes().all(is_lower_hex) {
            return Err(TokenError::Malformed);
        }

        let expected = self.tag(subject);
        if expected.as_bytes().ct_eq(tag.as_bytes()).unwrap_u8() == 1 {
            Ok(subject.to_string())
        } else {
            Err(TokenError::Tampered)
        }
    }

    /// [`verify`](Self::verify) with the failure reason discarded.
    pub fn verify_subject(&self, token: &str) -> Option<String> {
        self.verify(token).ok()
    }

    fn tag(&self, subject: &str) -> String {
        let mut mac = HmacSha256::clone(&self.keyed);
        mac.update(subject.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

fn is_lower_hex(byte: u8) -> bool {
    matches!(byte, b'0'..=b'9' | b'a'..=b'f')
}

/// Subject embedded in admin session tokens:
/// `<credential-id>.<issued-at-unix-seconds>.<nonce>`.
///
/// The nonce makes every login produce a distinct token; the timestamp lets
/// the caller bound session age.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSubject {
    pub credential_id: Uuid,
    pub issued_at: i64,
    pub nonce: String,
}

impl SessionSubject {
    pub fn new(credential_id: Uuid, issued_at: OffsetDateTime) -> Self {
        let mut bytes = [0u8; NONCE_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self {
            credential_id,
            issued_at: issued_at.unix_timestamp(),
            nonce: hex::encode(bytes),
        }
    }

    /// Seconds elapsed between issue and `now`; negative for future stamps.
    pub fn age_seconds(&self, now: OffsetDateTime) -> i64 {
        now.unix_timestamp() - self.issued_at
    }
}

impl fmt::Display for SessionSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{SUBJECT_SEPARATOR}{}{SUBJECT_SEPARATOR}{}",
            self.credential_id, self.issued_at, self.nonce
        )
    }
}

impl FromStr for SessionSubject {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, SUBJECT_SEPARATOR);
        let credential_id = parts
            .next()
            .and_then(|value| Uuid::parse_str(value).ok())
            .ok_or(TokenError::Malformed)?;
        let issued_at = parts
            .next()
            .and_then(|value| value.parse::<i64>().ok())
            .ok_or(TokenError::Malformed)?;
        let nonce = parts
            .next()
            .filter(|value| !value.is_empty())
            .ok_or(TokenError::Malformed)?;

        Ok(Self {
            credential_id,
            issued_at,
            nonce: nonce.to_string(),
        })
    }
}
