//! Signed bearer tokens.
//!
//! Tokens are compact `header.claims.signature` strings, each segment
//! base64url without padding, signed with HMAC-SHA256 over the first two
//! segments. The token kind is part of the signed claims, so an access token
//! can never be accepted where a refresh token is expected (or the reverse).

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use marketstall_core::{Email, TokenKind, UserId};

type HmacSha256 = Hmac<Sha256>;

/// `{"alg":"HS256","typ":"JWT"}`, pre-encoded.
const HEADER: &str = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9";

/// Errors from issuing or verifying a token.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Not three segments, bad base64 or bad claims JSON.
    #[error("malformed token")]
    Malformed,

    #[error("invalid token signature")]
    InvalidSignature,

    /// The signature is valid but the token is past its expiry.
    ///
    /// Carries the decoded claims so callers may still act on an expired
    /// token they have reason to accept.
    #[error("token expired")]
    Expired {
        /// Claims of the expired token.
        claims: Claims,
    },

    /// A valid token of the other kind.
    #[error("expected {expected} token, got {actual}")]
    WrongKind {
        expected: TokenKind,
        actual: TokenKind,
    },

    #[error("token signing failed: {0}")]
    Signing(String),
}

/// Signed token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Owning user.
    pub sub: UserId,
    pub email: Email,
    #[serde(rename = "typ")]
    pub kind: TokenKind,
    /// Issued at (unix seconds).
    pub iat: i64,
    /// Expires at (unix seconds).
    pub exp: i64,
    /// Unique per token, so two tokens issued in the same second differ.
    pub jti: Uuid,
}

/// Issues and verifies tokens with a shared secret.
#[derive(Clone)]
pub struct TokenCodec {
    secret: SecretString,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("secret", &"[REDACTED]")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

impl TokenCodec {
    #[must_use]
    pub const fn new(secret: SecretString, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            secret,
            access_ttl,
            refresh_ttl,
        }
    }

    /// Validity window for tokens of `kind`.
    #[must_use]
    pub const fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }

    /// Issue a token of `kind` for a user, valid from now.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Signing` if the claims cannot be encoded.
    pub fn issue(
        &self,
        user_id: UserId,
        email: &Email,
        kind: TokenKind,
    ) -> Result<(String, Claims), TokenError> {
        self.issue_at(user_id, email, kind, Utc::now().timestamp())
    }

    /// Issue a token as if the current time were `now` (unix seconds).
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Signing` if the claims cannot be encoded.
    pub fn issue_at(
        &self,
        user_id: UserId,
        email: &Email,
        kind: TokenKind,
        now: i64,
    ) -> Result<(String, Claims), TokenError> {
        let ttl = i64::try_from(self.ttl(kind).as_secs())
            .map_err(|_| TokenError::Signing("ttl out of range".to_owned()))?;
        let claims = Claims {
            sub: user_id,
            email: email.clone(),
            kind,
            iat: now,
            exp: now.saturating_add(ttl),
            jti: Uuid::new_v4(),
        };

        let payload =
            serde_json::to_vec(&claims).map_err(|e| TokenError::Signing(e.to_string()))?;
        let signing_input = format!("{HEADER}.{}", URL_SAFE_NO_PAD.encode(payload));

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok((format!("{signing_input}.{signature}"), claims))
    }

    /// Verify a token of the `expected` kind against the current time.
    ///
    /// # Errors
    ///
    /// See [`TokenCodec::verify_at`].
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims, TokenError> {
        self.verify_at(token, expected, Utc::now().timestamp())
    }

    /// Verify a token as if the current time were `now` (unix seconds).
    ///
    /// Checks run in order: structure, signature, kind, expiry. A token that
    /// fails an earlier check never reports a later one.
    ///
    /// # Errors
    ///
    /// Returns `Malformed`, `InvalidSignature`, `WrongKind` or `Expired`.
    pub fn verify_at(
        &self,
        token: &str,
        expected: TokenKind,
        now: i64,
    ) -> Result<Claims, TokenError> {
        let mut segments = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(TokenError::Malformed);
        };
        if header != HEADER {
            return Err(TokenError::Malformed);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::Malformed)?;
        let mut mac = self.mac()?;
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| TokenError::Malformed)?;
        let claims: Claims = serde_json::from_slice(&payload).map_err(|_| TokenError::Malformed)?;

        if claims.kind != expected {
            return Err(TokenError::WrongKind {
                expected,
                actual: claims.kind,
            });
        }
        if claims.exp <= now {
            return Err(TokenError::Expired { claims });
        }

        Ok(claims)
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|e| TokenError::Signing(e.to_string()))
    }
}

/// One-way digest of a token, used as its lookup key.
///
/// Raw tokens are never persisted or cached; only this digest is.
#[must_use]
pub fn hash(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const NOW: i64 = 1_750_000_000;

    fn codec() -> TokenCodec {
        TokenCodec::new(
            SecretString::from("k3Y!r8#Qz@1vLm^p7&Xw2*Nd5$Tg9%Hb"),
            Duration::from_secs(60),
            Duration::from_secs(3600),
        )
    }

    fn email() -> Email {
        Email::parse("u@test.com").unwrap()
    }

    #[test]
    fn test_issue_then_verify() {
        let codec = codec();
        let (token, issued) = codec
            .issue_at(UserId::new(7), &email(), TokenKind::Access, NOW)
            .unwrap();

        let claims = codec.verify_at(&token, TokenKind::Access, NOW + 30).unwrap();
        assert_eq!(claims, issued);
        assert_eq!(claims.sub, UserId::new(7));
        assert_eq!(claims.exp, NOW + 60);
    }

    #[test]
    fn test_kinds_cannot_be_swapped() {
        let codec = codec();
        let (access, _) = codec
            .issue_at(UserId::new(1), &email(), TokenKind::Access, NOW)
            .unwrap();
        let (refresh, _) = codec
            .issue_at(UserId::new(1), &email(), TokenKind::Refresh, NOW)
            .unwrap();

        assert!(matches!(
            codec.verify_at(&access, TokenKind::Refresh, NOW),
            Err(TokenError::WrongKind {
                expected: TokenKind::Refresh,
                actual: TokenKind::Access
            })
        ));
        assert!(matches!(
            codec.verify_at(&refresh, TokenKind::Access, NOW),
            Err(TokenError::WrongKind { .. })
        ));
    }

    #[test]
    fn test_expired_carries_claims() {
        let codec = codec();
        let (token, _) = codec
            .issue_at(UserId::new(3), &email(), TokenKind::Access, NOW)
            .unwrap();

        match codec.verify_at(&token, TokenKind::Access, NOW + 60) {
            Err(TokenError::Expired { claims }) => assert_eq!(claims.sub, UserId::new(3)),
            other => panic!("expected Expired, got {other:?}"),
        }
    }

    #[test]
    fn test_tampering_is_detected() {
        let codec = codec();
        let (token, _) = codec
            .issue_at(UserId::new(1), &email(), TokenKind::Access, NOW)
            .unwrap();

        let forged_claims = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&serde_json::json!({
                "sub": 2, "email": "u@test.com", "typ": "ACCESS",
                "iat": NOW, "exp": NOW + 60, "jti": Uuid::nil()
            }))
            .unwrap(),
        );
        let signature = token.rsplit('.').next().unwrap();
        let forged = format!("{HEADER}.{forged_claims}.{signature}");
        assert!(matches!(
            codec.verify_at(&forged, TokenKind::Access, NOW),
            Err(TokenError::InvalidSignature)
        ));

        let other_secret = TokenCodec::new(
            SecretString::from("Zp9!x2@Lm#4vQ8$rT6%yN1^wB3&kD7*s"),
            Duration::from_secs(60),
            Duration::from_secs(60),
        );
        assert!(matches!(
            other_secret.verify_at(&token, TokenKind::Access, NOW),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn test_malformed_inputs() {
        let codec = codec();
        for token in ["", "abc", "a.b", "a.b.c.d", "x.y.z", &format!("{HEADER}.!!.??")] {
            assert!(
                matches!(
                    codec.verify_at(token, TokenKind::Access, NOW),
                    Err(TokenError::Malformed)
                ),
                "{token}"
            );
        }
    }

    #[test]
    fn test_each_issue_is_unique() {
        let codec = codec();
        let (a, _) = codec
            .issue_at(UserId::new(1), &email(), TokenKind::Access, NOW)
            .unwrap();
        let (b, _) = codec
            .issue_at(UserId::new(1), &email(), TokenKind::Access, NOW)
            .unwrap();
        assert_ne!(a, b);
        assert_ne!(hash(&a), hash(&b));
    }

    #[test]
    fn test_header_is_standard_hs256_jwt() {
        let header: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(HEADER).unwrap()).unwrap();
        assert_eq!(header, serde_json::json!({"alg": "HS256", "typ": "JWT"}));
    }

    #[test]
    fn test_hash_is_hex_sha256() {
        assert_eq!(
            hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
