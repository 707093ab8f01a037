use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset};
use uuid::Uuid;

use super::{Claims, Role, TokenKind, error::AuthError, jwt::TokenCodec};
use crate::{clock::Clock, db::entities::user};

/// The freshly signed pair for one authenticated identity. Nothing is
/// persisted here; the caller stores the refresh token.
#[derive(Debug)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<FixedOffset>,
    /// Access-token lifetime in seconds, surfaced as `expires_in`.
    pub expires_in: usize,
}

/// Composes the codec with the two TTLs: a short-lived access token carrying
/// denormalized identity attributes and a long-lived refresh token carrying
/// only the subject plus a random `jti`.
#[derive(Clone)]
pub struct TokenIssuer {
    codec: Arc<TokenCodec>,
    clock: Arc<dyn Clock>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(
        codec: Arc<TokenCodec>,
        clock: Arc<dyn Clock>,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            codec,
            clock,
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn issue(&self, identity: &user::Model) -> Result<IssuedTokens, AuthError> {
        let now = self.clock.now();
        let iat = now.timestamp().max(0) as usize;
        let role = Role::try_from(identity.role.as_str()).unwrap_or(Role::Listener);

        let access_exp = now + self.access_ttl;
        let access = Claims {
            sub: identity.id.to_string(),
            exp: access_exp.timestamp().max(0) as usize,
            iat,
            kind: TokenKind::Access,
            jti: None,
            username: Some(identity.username.clone()),
            email: Some(identity.email.clone()),
            role: Some(role),
        };

        let refresh_expires_at = now + self.refresh_ttl;
        let refresh = Claims {
            sub: identity.id.to_string(),
            exp: refresh_expires_at.timestamp().max(0) as usize,
            iat,
            kind: TokenKind::Refresh,
            jti: Some(Uuid::new_v4().to_string()),
            username: None,
            email: None,
            role: None,
        };

        Ok(IssuedTokens {
            access_token: self.codec.encode(&access)?,
            refresh_token: self.codec.encode(&refresh)?,
            refresh_expires_at,
            expires_in: self.access_ttl.num_seconds().max(0) as usize,
        })
    }
}
