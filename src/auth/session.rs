//! Stateless session tokens
//!
//! HS256 JWTs carrying `{sub, iat, exp, jti}`. Nothing is stored server-side:
//! a token is valid iff its signature verifies under the process key and
//! `iat <= now < exp`. There is no revocation, so a leaked token stays usable
//! until it expires; keep `session_hours` short enough for that exposure.

use crate::clock::Clock;
use crate::config::Config;
use crate::error::{PanelError, Result};
use chrono::Duration;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// The only accepted signing algorithm
const ALGORITHM: Algorithm = Algorithm::HS256;

/// JWT claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Operator username
    pub sub: String,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expiration (unix seconds, exclusive)
    pub exp: i64,
    /// Token ID, for log correlation
    pub jti: String,
}

/// Issued bearer token
#[derive(Debug, Clone, Serialize)]
pub struct SessionToken {
    pub token: String,
    pub username: String,
    pub expires_at: i64,
}

/// Signs and validates session tokens with a key fixed for the process lifetime
pub struct SessionIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    session_duration: Duration,
    key_fingerprint: String,
    clock: Arc<dyn Clock>,
}

impl SessionIssuer {
    pub fn new(secret: &[u8], session_duration: Duration, clock: Arc<dyn Clock>) -> Self {
        let mut validation = Validation::new(ALGORITHM);
        // The time window is checked against our own clock below
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["sub", "iat", "exp"]);

        let digest = Sha256::digest(secret);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            session_duration,
            key_fingerprint: hex::encode(&digest[..4]),
            clock,
        }
    }

    pub fn from_config(config: &Config, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            config.jwt_secret.as_bytes(),
            Duration::hours(config.session_hours),
            clock,
        )
    }

    /// Short, non-reversible identifier of the signing key, safe to log
    pub fn key_fingerprint(&self) -> &str {
        &self.key_fingerprint
    }

    pub fn session_duration(&self) -> Duration {
        self.session_duration
    }

    /// Issue a token for an already-authenticated operator
    pub fn issue(&self, username: &str) -> Result<SessionToken> {
        let now = self.clock.now();
        let expires = now.checked_add_signed(self.session_duration).ok_or_else(|| {
            PanelError::InvalidRequest("session lifetime exceeds the supported date range".into())
        })?;
        let claims = Claims {
            sub: username.to_string(),
            iat: now.timestamp(),
            exp: expires.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(ALGORITHM), &claims, &self.encoding_key)
            .map_err(|_| PanelError::TokenInvalid)?;

        debug!(username, jti = %claims.jti, "Issued session token");

        Ok(SessionToken {
            token,
            username: claims.sub,
            expires_at: claims.exp,
        })
    }

    /// Validate a token and return the operator it was issued to
    pub fn validate(&self, token: &str) -> Result<String> {
        self.validate_claims(token).map(|claims| claims.sub)
    }

    /// Validate a token and return all of its claims
    pub fn validate_claims(&self, token: &str) -> Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|_| PanelError::TokenInvalid)?;

        if data.header.alg != ALGORITHM {
            return Err(PanelError::TokenInvalid);
        }

        let now = self.clock.now().timestamp();
        let claims = data.claims;
        if now < claims.iat || now >= claims.exp || claims.sub.is_empty() {
            return Err(PanelError::TokenInvalid);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

    const SECRET: &[u8] = b"test-secret-at-least-32-characters-long";

    fn issuer_with_clock() -> (SessionIssuer, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let issuer = SessionIssuer::new(SECRET, Duration::hours(24), clock.clone());
        (issuer, clock)
    }

    #[test]
    fn test_issue_then_validate() {
        let (issuer, _clock) = issuer_with_clock();
        let token = issuer.issue("admin").unwrap();

        assert_eq!(token.username, "admin");
        assert_eq!(issuer.validate(&token.token).unwrap(), "admin");

        let claims = issuer.validate_claims(&token.token).unwrap();
        assert_eq!(claims.exp - claims.iat, 24 * 3600);
        assert_eq!(claims.exp, token.expires_at);
    }

    #[test]
    fn test_out_of_range_lifetime_is_an_error() {
        let clock = Arc::new(ManualClock::starting_now());
        let issuer = SessionIssuer::new(SECRET, Duration::hours(2_400_000_000), clock);

        let err = issuer.issue("admin").unwrap_err();
        assert_eq!(err.kind(), "invalid_request");
    }

    #[test]
    fn test_flipped_signature_byte_rejected() {
        let (issuer, _clock) = issuer_with_clock();
        let token = issuer.issue("admin").unwrap().token;

        let (signing_input, signature) = token.rsplit_once('.').unwrap();
        let mut sig = URL_SAFE_NO_PAD.decode(signature).unwrap();
        sig[0] ^= 0x01;
        let tampered = format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(sig));

        assert!(matches!(issuer.validate(&tampered), Err(PanelError::TokenInvalid)));
    }

    #[test]
    fn test_expired_token_rejected() {
        let (issuer, clock) = issuer_with_clock();
        let token = issuer.issue("admin").unwrap().token;

        clock.advance(Duration::hours(24) - Duration::seconds(1));
        assert!(issuer.validate(&token).is_ok());

        // `exp` itself is outside the window
        clock.advance(Duration::seconds(1));
        assert!(matches!(issuer.validate(&token), Err(PanelError::TokenInvalid)));
    }

    #[test]
    fn test_token_from_the_future_rejected() {
        let (issuer, clock) = issuer_with_clock();
        let token = issuer.issue("admin").unwrap().token;

        clock.advance(-Duration::minutes(5));
        assert!(matches!(issuer.validate(&token), Err(PanelError::TokenInvalid)));
    }

    #[test]
    fn test_other_hmac_algorithm_rejected() {
        let (issuer, clock) = issuer_with_clock();
        let now = clock.now().timestamp();
        let claims = Claims {
            sub: "admin".into(),
            iat: now,
            exp: now + 3600,
            jti: "x".into(),
        };
        let token = encode(
            &Header::new(Algorithm::HS384),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();

        assert!(matches!(issuer.validate(&token), Err(PanelError::TokenInvalid)));
    }

    #[test]
    fn test_unsigned_token_rejected() {
        let (issuer, clock) = issuer_with_clock();
        let now = clock.now().timestamp();
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(
            format!(r#"{{"sub":"admin","iat":{},"exp":{},"jti":"x"}}"#, now, now + 3600).as_bytes(),
        );

        assert!(issuer.validate(&format!("{}.{}.", header, payload)).is_err());
        assert!(issuer.validate(&format!("{}.{}", header, payload)).is_err());
    }

    #[test]
    fn test_foreign_key_rejected() {
        let (issuer, clock) = issuer_with_clock();
        let other = SessionIssuer::new(b"another-secret-entirely-different!!", Duration::hours(24), clock);
        let token = other.issue("admin").unwrap().token;

        assert!(matches!(issuer.validate(&token), Err(PanelError::TokenInvalid)));
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        let (issuer, _clock) = issuer_with_clock();
        for garbage in ["", "abc", "a.b.c", "....", "Bearer xyz"] {
            assert!(matches!(issuer.validate(garbage), Err(PanelError::TokenInvalid)));
        }
    }

    #[test]
    fn test_fingerprint_does_not_leak_secret() {
        let (issuer, _clock) = issuer_with_clock();
        assert_eq!(issuer.key_fingerprint().len(), 8);
        assert!(!String::from_utf8_lossy(SECRET).contains(issuer.key_fingerprint()));
    }
}
