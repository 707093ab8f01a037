pub mod error;
pub mod issuer;
pub mod jwt;
pub mod password;
pub mod role_layer;

use axum::{extract::FromRequestParts, http::StatusCode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Musician,
    Listener,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Musician => "musician",
            Role::Listener => "listener",
        }
    }
}

impl TryFrom<&str> for Role {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "admin" => Ok(Role::Admin),
            "musician" => Ok(Role::Musician),
            "listener" => Ok(Role::Listener),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT payload. Access tokens denormalize `username`/`email`/`role` so
/// per-request authorization never needs a store lookup; refresh tokens
/// carry only `sub` plus a random `jti` so successive rotations never
/// produce the same token string.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // user id
    pub exp: usize,  // expiry (unix)
    pub iat: usize,  // issued at
    #[serde(rename = "type")]
    pub kind: TokenKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl Claims {
    pub fn user_id(&self) -> Option<i32> {
        self.sub.parse().ok()
    }
}

// Helper extractor: pull JWT claims from request extensions.
impl<S> FromRequestParts<S> for Claims
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Claims>()
            .cloned()
            .ok_or((StatusCode::UNAUTHORIZED, "No claims in request"))
    }
}

#[cfg(test)]
mod tests {
    use super::{Role, TokenKind};

    #[test]
    fn role_string_roundtrip() {
        assert_eq!(Role::Admin.as_str(), "admin");
        assert_eq!(Role::Musician.as_str(), "musician");
        assert_eq!(Role::Listener.as_str(), "listener");

        assert_eq!(Role::try_from("admin"), Ok(Role::Admin));
        assert_eq!(Role::try_from("musician"), Ok(Role::Musician));
        assert_eq!(Role::try_from("listener"), Ok(Role::Listener));
        assert!(Role::try_from("manager").is_err());
    }

    #[test]
    fn token_kind_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&TokenKind::Access).expect("serialize"),
            "\"access\""
        );
        assert_eq!(
            serde_json::to_string(&TokenKind::Refresh).expect("serialize"),
            "\"refresh\""
        );
    }
}
