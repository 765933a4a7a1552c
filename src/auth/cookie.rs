//! Identity cookie encoding and decoding
//!
//! The identity cookie binds a request to a team. Its value is a signed
//! HS256 token carrying the team's resource name and an admin capability
//! flag; the signature is verified on every read, so an absent or invalid
//! cookie always resolves to "no team" rather than a default.
//!
//! Security notes:
//! - Tokens are signed with HS256 (HMAC-SHA256)
//! - In production, COOKIE_SECRET must be a strong random value from environment
//! - The cookie is httpOnly; the browser never exposes it to scripts

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::team::TeamName;
use crate::types::GatehouseError;

/// Name of the identity cookie
pub const COOKIE_NAME: &str = "gatehouse_team";

/// Payload stored in the identity cookie
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Internal resource name of the team's backend workload
    pub sub: String,
    /// Validated team name
    pub team: String,
    /// Admin capability, resolved once at issue time
    pub is_admin: bool,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// A verified identity extracted from the cookie
#[derive(Debug, Clone)]
pub struct TeamIdentity {
    pub team: String,
    pub is_admin: bool,
}

/// Signs and verifies identity cookies
#[derive(Clone)]
pub struct CookieCodec {
    secret: String,
    ttl_seconds: u64,
}

impl CookieCodec {
    /// Create a new codec.
    ///
    /// Returns an error if the secret is empty or too short.
    pub fn new(secret: String, ttl_seconds: u64) -> Result<Self, GatehouseError> {
        if secret.is_empty() {
            return Err(GatehouseError::Config(
                "COOKIE_SECRET is required in production mode".into(),
            ));
        }

        if secret.len() < 32 {
            return Err(GatehouseError::Config(
                "COOKIE_SECRET must be at least 32 characters".into(),
            ));
        }

        Ok(Self {
            secret,
            ttl_seconds,
        })
    }

    /// Create a codec for dev mode (fixed insecure secret)
    pub fn new_dev() -> Self {
        Self {
            secret: "dev-mode-secret-not-for-production-use-123456".into(),
            ttl_seconds: 7 * 24 * 60 * 60,
        }
    }

    /// Issue a signed cookie value for a team.
    ///
    /// The admin flag is decided here, once, and carried in the signed
    /// claims; privileged boundaries check the flag, not the name.
    pub fn issue(&self, team: &TeamName, is_admin: bool) -> Result<String, GatehouseError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| GatehouseError::Auth(format!("System time error: {}", e)))?
            .as_secs();

        let claims = Claims {
            sub: team.resource_name(),
            team: team.as_str().to_string(),
            is_admin,
            iat: now,
            exp: now + self.ttl_seconds,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| GatehouseError::Auth(format!("Failed to sign cookie: {}", e)))?;

        Ok(token)
    }

    /// Build the Set-Cookie header value for an issued cookie.
    pub fn set_cookie_header(&self, value: &str) -> String {
        format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            COOKIE_NAME, value, self.ttl_seconds
        )
    }

    /// Verify a cookie value and extract the identity.
    ///
    /// Any failure (bad signature, expired, malformed) is `None`: the
    /// visitor is simply not identified yet.
    pub fn verify(&self, value: &str) -> Option<TeamIdentity> {
        let validation = Validation::default();

        match decode::<Claims>(
            value,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        ) {
            Ok(token_data) => Some(TeamIdentity {
                team: token_data.claims.team,
                is_admin: token_data.claims.is_admin,
            }),
            Err(_) => None,
        }
    }

    /// Extract and verify the identity cookie from a Cookie header value.
    pub fn identity_from_cookie_header(&self, cookie_header: Option<&str>) -> Option<TeamIdentity> {
        let value = extract_cookie_value(cookie_header?, COOKIE_NAME)?;
        self.verify(value)
    }
}

/// Find a named cookie in a Cookie header value.
fn extract_cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    for pair in header.split(';') {
        if let Some((key, value)) = pair.trim().split_once('=') {
            if key == name && !value.is_empty() {
                return Some(value);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_codec() -> CookieCodec {
        CookieCodec::new(
            "test-secret-that-is-at-least-32-characters-long".into(),
            3600,
        )
        .unwrap()
    }

    #[test]
    fn test_issue_and_verify() {
        let codec = test_codec();
        let team = TeamName::parse("team42").unwrap();

        let value = codec.issue(&team, false).unwrap();
        assert!(!value.is_empty());

        let identity = codec.verify(&value).unwrap();
        assert_eq!(identity.team, "team42");
        assert!(!identity.is_admin);
    }

    #[test]
    fn test_admin_flag_carried() {
        let codec = test_codec();
        let team = TeamName::parse("admin").unwrap();

        let value = codec.issue(&team, true).unwrap();
        let identity = codec.verify(&value).unwrap();
        assert!(identity.is_admin);
    }

    #[test]
    fn test_tampered_cookie_rejected() {
        let codec = test_codec();
        let team = TeamName::parse("team42").unwrap();

        let mut value = codec.issue(&team, false).unwrap();
        value.push('x');
        assert!(codec.verify(&value).is_none());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let codec1 = test_codec();
        let codec2 = CookieCodec::new(
            "different-secret-that-is-at-least-32-characters".into(),
            3600,
        )
        .unwrap();

        let team = TeamName::parse("team42").unwrap();
        let value = codec1.issue(&team, false).unwrap();
        assert!(codec2.verify(&value).is_none());
    }

    #[test]
    fn test_extract_from_cookie_header() {
        let codec = test_codec();
        let team = TeamName::parse("team42").unwrap();
        let value = codec.issue(&team, false).unwrap();

        let header = format!("other=1; {}={}; theme=dark", COOKIE_NAME, value);
        let identity = codec.identity_from_cookie_header(Some(&header)).unwrap();
        assert_eq!(identity.team, "team42");

        assert!(codec.identity_from_cookie_header(None).is_none());
        assert!(codec
            .identity_from_cookie_header(Some("other=1; theme=dark"))
            .is_none());
        assert!(codec
            .identity_from_cookie_header(Some(&format!("{}=garbage", COOKIE_NAME)))
            .is_none());
    }

    #[test]
    fn test_set_cookie_header() {
        let codec = test_codec();
        let header = codec.set_cookie_header("abc");
        assert!(header.starts_with("gatehouse_team=abc;"));
        assert!(header.contains("HttpOnly"));
        assert!(header.contains("Max-Age=3600"));
    }

    #[test]
    fn test_secret_validation() {
        assert!(CookieCodec::new("short".into(), 3600).is_err());
        assert!(CookieCodec::new("".into(), 3600).is_err());
        assert!(CookieCodec::new(
            "this-secret-is-at-least-32-chars-long".into(),
            3600
        )
        .is_ok());
    }
}
