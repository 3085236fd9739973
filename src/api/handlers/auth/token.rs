//! Bearer token minting and validation.
//!
//! Tokens are self-contained: user id plus expiry, signed with a
//! process-wide secret. Nothing is persisted; validity comes from the
//! signature and the clock.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: Uuid,
    iat: i64,
    exp: i64,
}

/// Uniform validation failure. Expired, malformed, and forged tokens are
/// indistinguishable to callers so nothing leaks to the client.
#[derive(Debug, PartialEq, Eq)]
pub struct InvalidToken;

impl fmt::Display for InvalidToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid or expired token")
    }
}

impl std::error::Error for InvalidToken {}

pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_seconds: i64,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(secret: &SecretString, ttl_seconds: i64) -> Self {
        let secret = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl_seconds,
        }
    }

    /// Mint a signed token for the given user id.
    ///
    /// # Errors
    /// Returns an error if token serialization fails.
    pub fn mint(&self, user_id: Uuid) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            iat: now.timestamp(),
            exp: (now + Duration::seconds(self.ttl_seconds)).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding).context("failed to mint token")
    }

    /// Resolve a token back to the user id it was minted for.
    ///
    /// # Errors
    /// Returns [`InvalidToken`] for any failure: bad signature, malformed
    /// token, or expiry.
    pub fn validate(&self, token: &str) -> Result<Uuid, InvalidToken> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims.sub)
            .map_err(|_| InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer(ttl_seconds: i64) -> TokenIssuer {
        TokenIssuer::new(&SecretString::from("test-secret".to_string()), ttl_seconds)
    }

    #[test]
    fn mint_then_validate_round_trips() {
        let issuer = issuer(3600);
        let user_id = Uuid::new_v4();
        let token = issuer.mint(user_id).expect("mint");
        assert_eq!(issuer.validate(&token), Ok(user_id));
    }

    #[test]
    fn expired_token_is_rejected() {
        // Far enough in the past to clear the default validation leeway.
        let issuer = issuer(-3600);
        let token = issuer.mint(Uuid::new_v4()).expect("mint");
        assert_eq!(issuer.validate(&token), Err(InvalidToken));
    }

    #[test]
    fn tampered_token_is_rejected() {
        let issuer = issuer(3600);
        let token = issuer.mint(Uuid::new_v4()).expect("mint");
        let mut tampered = token.into_bytes();
        let last = tampered.last_mut().expect("non-empty token");
        *last = if *last == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(tampered).expect("utf8");
        assert_eq!(issuer.validate(&tampered), Err(InvalidToken));
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let token = issuer(3600).mint(Uuid::new_v4()).expect("mint");
        let other = TokenIssuer::new(&SecretString::from("other-secret".to_string()), 3600);
        assert_eq!(other.validate(&token), Err(InvalidToken));
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(issuer(3600).validate("not-a-token"), Err(InvalidToken));
    }
}
