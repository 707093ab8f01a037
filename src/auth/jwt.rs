use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};

use super::{Claims, error::AuthError};
use crate::{clock::Clock, error::AppError, state::AppState};

#[derive(Clone)]
pub struct JwtKeys {
    pub enc: EncodingKey,
    pub dec: DecodingKey,
}

impl JwtKeys {
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            enc: EncodingKey::from_secret(secret),
            dec: DecodingKey::from_secret(secret),
        }
    }
}

/// Stateless signed-token codec. Signature verification uses HS256 with a
/// single shared secret; expiry is checked against the injected clock rather
/// than the library's wall clock so tests can pin time.
pub struct TokenCodec {
    keys: JwtKeys,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    pub fn new(keys: JwtKeys, clock: Arc<dyn Clock>) -> Self {
        Self { keys, clock }
    }

    pub fn encode(&self, claims: &Claims) -> Result<String, AuthError> {
        let mut header = Header::new(Algorithm::HS256);
        header.typ = Some("JWT".into());

        encode(&header, claims, &self.keys.enc)
            .map_err(|err| AuthError::Internal(format!("token encoding failed: {err}")))
    }

    /// Rejects with three distinct kinds: `MalformedToken` (not a JWT),
    /// `BadSignature` (forged), `ExpiredToken` (stale). Callers need to tell
    /// "retry with a fresh token" apart from "forged request".
    pub fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;

        let data = decode::<Claims>(token, &self.keys.dec, &validation).map_err(|err| {
            match err.kind() {
                ErrorKind::InvalidSignature => AuthError::BadSignature,
                ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                _ => AuthError::MalformedToken,
            }
        })?;

        if data.claims.exp <= self.clock.now_unix() {
            return Err(AuthError::ExpiredToken);
        }

        Ok(data.claims)
    }
}

/// Bearer-token middleware: validates the access token and stashes its
/// claims in request extensions. Never touches the refresh-token store.
pub async fn jwt_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, Response> {
    let auth = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").ok_or_else(|| {
        AppError::unauthorized("Missing/invalid Authorization header").into_response()
    })?;

    let claims = state
        .sessions
        .validate(token)
        .map_err(|err| AppError::from(err).into_response())?;

    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, FixedOffset, TimeZone};

    use super::{JwtKeys, TokenCodec};
    use crate::{
        auth::{Claims, Role, TokenKind, error::AuthError},
        clock::{Clock, FixedClock},
    };

    fn test_clock() -> Arc<FixedClock> {
        let at = FixedOffset::east_opt(0)
            .expect("offset should be valid")
            .with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
            .single()
            .expect("timestamp should be valid");
        Arc::new(FixedClock::at(at))
    }

    fn access_claims(clock: &dyn Clock, ttl_secs: usize) -> Claims {
        let iat = clock.now_unix();
        Claims {
            sub: "7".to_string(),
            exp: iat + ttl_secs,
            iat,
            kind: TokenKind::Access,
            jti: None,
            username: Some("frida".to_string()),
            email: Some("frida@example.com".to_string()),
            role: Some(Role::Musician),
        }
    }

    #[test]
    fn encodes_and_decodes_with_same_secret() {
        let clock = test_clock();
        let codec = TokenCodec::new(JwtKeys::from_secret(b"unit-test-secret"), clock.clone());
        let claims = access_claims(clock.as_ref(), 600);

        let token = codec.encode(&claims).expect("token should encode");
        let decoded = codec.decode(&token).expect("token should decode");

        assert_eq!(decoded.sub, claims.sub);
        assert_eq!(decoded.kind, TokenKind::Access);
        assert_eq!(decoded.username.as_deref(), Some("frida"));
        assert_eq!(decoded.role, Some(Role::Musician));
        assert_eq!(decoded.exp, claims.exp);
    }

    #[test]
    fn rejects_wrong_secret_as_bad_signature() {
        let clock = test_clock();
        let codec = TokenCodec::new(JwtKeys::from_secret(b"secret-one"), clock.clone());
        let token = codec
            .encode(&access_claims(clock.as_ref(), 600))
            .expect("encode");

        let other = TokenCodec::new(JwtKeys::from_secret(b"secret-two"), clock);
        let err = other.decode(&token).expect_err("forged token");
        assert!(matches!(err, AuthError::BadSignature));
    }

    #[test]
    fn rejects_garbage_as_malformed() {
        let codec = TokenCodec::new(JwtKeys::from_secret(b"unit-test-secret"), test_clock());
        let err = codec.decode("not-a-token").expect_err("garbage token");
        assert!(matches!(err, AuthError::MalformedToken));
    }

    #[test]
    fn rejects_past_exp_as_expired_even_when_well_formed() {
        let clock = test_clock();
        let codec = TokenCodec::new(JwtKeys::from_secret(b"unit-test-secret"), clock.clone());
        let token = codec
            .encode(&access_claims(clock.as_ref(), 60))
            .expect("encode");

        clock.advance(Duration::seconds(61));
        let err = codec.decode(&token).expect_err("expired token");
        assert!(matches!(err, AuthError::ExpiredToken));
    }
}
