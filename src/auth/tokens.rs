//! JWT issuance and verification
//!
//! Access tokens live 8 hours, or 30 days with "remember me". Refresh tokens
//! always live 30 days and carry `type = "refresh"`; they are issued for the
//! dashboard but never accepted as access tokens.

use anyhow::Result;
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const SESSION_TTL_SECS: i64 = 8 * 60 * 60;
pub const REMEMBER_ME_TTL_SECS: i64 = 30 * 24 * 60 * 60;
pub const REFRESH_TTL_SECS: i64 = 30 * 24 * 60 * 60;

/// Access token claims
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub role: String,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RefreshClaims {
    user_id: Uuid,
    #[serde(rename = "type")]
    kind: String,
    exp: i64,
}

/// A signed pair handed back by the login endpoint
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

/// Lifetime of the access token for the given "remember me" choice
pub fn access_ttl(remember_me: bool) -> i64 {
    if remember_me {
        REMEMBER_ME_TTL_SECS
    } else {
        SESSION_TTL_SECS
    }
}

/// Sign an access and a refresh token for a user
pub fn issue_tokens(
    secret: &str,
    user_id: Uuid,
    email: Option<String>,
    role: &str,
    remember_me: bool,
) -> Result<IssuedTokens> {
    let now = Utc::now().timestamp();
    let expires_in = access_ttl(remember_me);
    let key = EncodingKey::from_secret(secret.as_bytes());

    let claims = Claims {
        user_id,
        email,
        role: role.to_string(),
        exp: now + expires_in,
    };
    let access_token = encode(&Header::default(), &claims, &key)?;

    let refresh = RefreshClaims {
        user_id,
        kind: "refresh".to_string(),
        exp: now + REFRESH_TTL_SECS,
    };
    let refresh_token = encode(&Header::default(), &refresh, &key)?;

    Ok(IssuedTokens {
        access_token,
        refresh_token,
        expires_in,
    })
}

/// Verify signature and expiry of an access token
pub fn verify_access_token(secret: &str, token: &str) -> Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn remember_me_extends_lifetime() {
        assert_eq!(access_ttl(false), 8 * 3600);
        assert_eq!(access_ttl(true), 30 * 24 * 3600);
    }

    #[test]
    fn issued_access_token_verifies() {
        let user_id = Uuid::new_v4();
        let tokens = issue_tokens(SECRET, user_id, Some("a@b.de".into()), "pm", false).unwrap();
        let claims = verify_access_token(SECRET, &tokens.access_token).unwrap();
        assert_eq!(claims.user_id, user_id);
        assert_eq!(claims.role, "pm");
        assert_eq!(tokens.expires_in, SESSION_TTL_SECS);
        assert!(claims.exp > Utc::now().timestamp());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let tokens = issue_tokens(SECRET, Uuid::new_v4(), None, "admin", true).unwrap();
        assert!(verify_access_token("other", &tokens.access_token).is_err());
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let tokens = issue_tokens(SECRET, Uuid::new_v4(), None, "admin", false).unwrap();
        assert!(verify_access_token(SECRET, &tokens.refresh_token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let claims = Claims {
            user_id: Uuid::new_v4(),
            email: None,
            role: "viewer".into(),
            exp: Utc::now().timestamp() - 3600,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert!(verify_access_token(SECRET, &token).is_err());
    }
}
