//! Stateless session credentials.
//!
//! Sessions are HS256 JWTs carrying the account id; validity is signature
//! plus embedded expiry, nothing server-side. Logout is therefore a pure
//! client-side act (the cookie is cleared) and issued tokens remain
//! technically valid until they expire.
//!
//! The cookie twins in here must stay attribute-identical: a clearing cookie
//! with different attributes would not replace the one the browser holds.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::token::epoch_secs;

/// Cookie the session credential travels in.
pub const SESSION_COOKIE: &str = "token";

/// Sessions last 7 days.
pub const SESSION_TTL_SECS: i64 = 7 * 24 * 3600;

/// Shared attribute tail for the issue and clear cookies. `SameSite=None` +
/// `Secure` because the SPA is served from a different origin.
const COOKIE_ATTRIBUTES: &str = "Path=/; HttpOnly; Secure; SameSite=None";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Account id.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Mints and verifies session JWTs with a single shared secret.
#[derive(Clone)]
pub struct SessionIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SessionIssuer {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Mint a session for the account, valid for [`SESSION_TTL_SECS`].
    pub fn mint(&self, account_id: &str) -> Result<String, AuthError> {
        self.mint_with_ttl(account_id, SESSION_TTL_SECS)
    }

    pub fn mint_with_ttl(&self, account_id: &str, ttl_secs: i64) -> Result<String, AuthError> {
        let now = epoch_secs();
        let claims = SessionClaims {
            sub: account_id.to_string(),
            iat: now,
            exp: now + ttl_secs,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("session encoding failed: {e}")))
    }

    /// Check signature and expiry. Every failure collapses into
    /// `InvalidSession`; callers learn nothing about which check tripped.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, AuthError> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        decode::<SessionClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|_| AuthError::InvalidSession)
    }
}

/// `Set-Cookie` value that installs a session.
pub fn session_cookie(token: &str) -> String {
    format!("{SESSION_COOKIE}={token}; Max-Age={SESSION_TTL_SECS}; {COOKIE_ATTRIBUTES}")
}

/// `Set-Cookie` value that clears the session. Same attributes as the issue
/// path with `Max-Age=0` so the browser actually drops it.
pub fn clear_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; Max-Age=0; {COOKIE_ATTRIBUTES}")
}

/// Pull the session token out of a `Cookie` request header value.
pub fn session_token_from_cookies(header: &str) -> Option<&str> {
    header
        .split(';')
        .map(str::trim)
        .find_map(|pair| pair.strip_prefix(SESSION_COOKIE)?.strip_prefix('='))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_and_verify_round_trip() {
        let issuer = SessionIssuer::new("unit-test-secret");
        let token = issuer.mint("account-123").unwrap();
        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.sub, "account-123");
        assert_eq!(claims.exp - claims.iat, SESSION_TTL_SECS);
    }

    #[test]
    fn foreign_or_tampered_tokens_are_rejected() {
        let issuer = SessionIssuer::new("unit-test-secret");
        let other = SessionIssuer::new("a-different-secret");
        let token = other.mint("account-123").unwrap();
        assert!(matches!(
            issuer.verify(&token),
            Err(AuthError::InvalidSession)
        ));

        let mut tampered = issuer.mint("account-123").unwrap();
        tampered.pop();
        assert!(issuer.verify(&tampered).is_err());
        assert!(issuer.verify("not-a-jwt").is_err());
    }

    #[test]
    fn expired_sessions_are_rejected() {
        let issuer = SessionIssuer::new("unit-test-secret");
        let token = issuer.mint_with_ttl("account-123", -10).unwrap();
        assert!(matches!(
            issuer.verify(&token),
            Err(AuthError::InvalidSession)
        ));
    }

    #[test]
    fn cookie_twins_share_attributes() {
        let issue = session_cookie("abc");
        let clear = clear_session_cookie();
        assert_eq!(
            issue,
            "token=abc; Max-Age=604800; Path=/; HttpOnly; Secure; SameSite=None"
        );
        assert_eq!(
            clear,
            "token=; Max-Age=0; Path=/; HttpOnly; Secure; SameSite=None"
        );
        let tail = issue.splitn(3, "; ").nth(2).unwrap();
        assert!(clear.ends_with(tail));
    }

    #[test]
    fn cookie_header_parsing_finds_the_session() {
        assert_eq!(
            session_token_from_cookies("theme=dark; token=abc.def.ghi; lang=en"),
            Some("abc.def.ghi")
        );
        assert_eq!(session_token_from_cookies("token=solo"), Some("solo"));
        assert_eq!(session_token_from_cookies("theme=dark"), None);
        assert_eq!(session_token_from_cookies(""), None);
        // A prefix-named cookie must not match.
        assert_eq!(session_token_from_cookies("token2=nope"), None);
    }
}
