use std::{future::Future, sync::Arc, time::Duration as StdDuration};

use chrono::Duration;
use serde::Serialize;

use crate::{
    auth::{
        Claims, TokenKind,
        error::AuthError,
        issuer::TokenIssuer,
        jwt::TokenCodec,
        password::PasswordHasher,
    },
    clock::Clock,
    db::{
        entities::user,
        store::{IdentityStore, RefreshTokenStore, StoreError, StoreResult},
    },
};

#[derive(Debug, Serialize)]
pub struct TokenBundle {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: usize,
}

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub role: String,
}

impl From<&user::Model> for UserSummary {
    fn from(user: &user::Model) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
        }
    }
}

#[derive(Debug)]
pub struct LoginOutcome {
    pub tokens: TokenBundle,
    pub user: UserSummary,
}

/// Orchestrates the credential/session lifecycle over the stores. Raises the
/// precise `AuthError` kinds internally; the HTTP boundary collapses them
/// into a uniform unauthorized response.
#[derive(Clone)]
pub struct SessionService {
    identities: Arc<dyn IdentityStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    hasher: PasswordHasher,
    codec: Arc<TokenCodec>,
    issuer: TokenIssuer,
    clock: Arc<dyn Clock>,
    store_timeout: StdDuration,
    rotated_retention: Duration,
}

impl SessionService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        hasher: PasswordHasher,
        codec: Arc<TokenCodec>,
        issuer: TokenIssuer,
        clock: Arc<dyn Clock>,
        store_timeout: StdDuration,
        rotated_retention: Duration,
    ) -> Self {
        Self {
            identities,
            refresh_tokens,
            hasher,
            codec,
            issuer,
            clock,
            store_timeout,
            rotated_retention,
        }
    }

    /// Verifies credentials and opens a session. Unknown username, inactive
    /// account, and wrong password are indistinguishable to the caller.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let user = self
            .store_call(self.identities.find_by_username(username))
            .await
            .map_err(internal_store_error)?
            .ok_or(AuthError::InvalidCredentials)?;

        if !user.is_active {
            tracing::debug!(user_id = user.id, "login rejected: account inactive");
            return Err(AuthError::InvalidCredentials);
        }

        // Argon2 is deliberately expensive; keep it off the async runtime's
        // worker threads.
        let hasher = self.hasher.clone();
        let password = password.to_string();
        let stored_hash = user.password_hash.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &stored_hash))
            .await
            .map_err(|err| AuthError::Internal(format!("verify task failed: {err}")))??;

        let now = self.clock.now();
        self.store_call(self.identities.set_last_login(user.id, now))
            .await
            .map_err(internal_store_error)?;

        let issued = self.issuer.issue(&user)?;
        self.store_call(self.refresh_tokens.create(
            &issued.refresh_token,
            user.id,
            issued.refresh_expires_at,
            now,
        ))
        .await
        .map_err(internal_store_error)?;

        tracing::info!(user_id = user.id, "session opened");
        Ok(LoginOutcome {
            tokens: TokenBundle {
                access_token: issued.access_token,
                refresh_token: issued.refresh_token,
                token_type: "bearer",
                expires_in: issued.expires_in,
            },
            user: UserSummary::from(&user),
        })
    }

    /// Exchanges a refresh token for a brand-new pair. The old token is
    /// consumed; presenting it again fails and, if it was consumed by
    /// rotation, revokes the whole descendant chain (reuse of a rotated
    /// token is a strong theft signal).
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenBundle, AuthError> {
        let claims = self.codec.decode(refresh_token)?;
        if claims.kind != TokenKind::Refresh {
            return Err(AuthError::WrongTokenKind);
        }
        let user_id = claims.user_id().ok_or(AuthError::MalformedToken)?;

        let user = self
            .store_call(self.identities.find_by_id(user_id))
            .await
            .map_err(internal_store_error)?
            .filter(|user| user.is_active)
            .ok_or(AuthError::TokenNotActive)?;

        let issued = self.issuer.issue(&user)?;
        let now = self.clock.now();
        let rotation = self
            .store_call(self.refresh_tokens.rotate(
                refresh_token,
                &issued.refresh_token,
                issued.refresh_expires_at,
                now,
            ))
            .await;

        match rotation {
            Ok(_) => Ok(TokenBundle {
                access_token: issued.access_token,
                refresh_token: issued.refresh_token,
                token_type: "bearer",
                expires_in: issued.expires_in,
            }),
            Err(StoreError::TokenNotActive) => {
                self.cascade_on_reuse(refresh_token, user_id, now).await;
                Err(AuthError::TokenNotActive)
            }
            Err(StoreError::UnknownToken) => Err(AuthError::TokenNotActive),
            Err(err) => Err(internal_store_error(err)),
        }
    }

    /// Revokes one session. The refresh token must belong to the
    /// authenticated caller; a miss reports `false` rather than erroring.
    pub async fn logout(&self, refresh_token: &str, caller: &Claims) -> Result<bool, AuthError> {
        let caller_id = caller.user_id().ok_or(AuthError::MalformedToken)?;
        let now = self.clock.now();
        let revoked = self
            .store_call(self.refresh_tokens.revoke(refresh_token, caller_id, now))
            .await
            .map_err(internal_store_error)?;
        if revoked {
            tracing::info!(user_id = caller_id, "session revoked");
        }
        Ok(revoked)
    }

    /// Revokes every active session of the caller ("log out everywhere").
    pub async fn logout_all(&self, caller: &Claims) -> Result<u64, AuthError> {
        let caller_id = caller.user_id().ok_or(AuthError::MalformedToken)?;
        let revoked = self
            .store_call(self.refresh_tokens.revoke_all(caller_id, self.clock.now()))
            .await
            .map_err(internal_store_error)?;
        tracing::info!(user_id = caller_id, revoked, "all sessions revoked");
        Ok(revoked)
    }

    /// Stateless access-token check: decode and kind only, no store
    /// round-trip. Safe to call on every request.
    pub fn validate(&self, access_token: &str) -> Result<Claims, AuthError> {
        let claims = self.codec.decode(access_token)?;
        if claims.kind != TokenKind::Access {
            return Err(AuthError::WrongTokenKind);
        }
        Ok(claims)
    }

    /// Sweeps dead rows: expired, or rotated longer ago than the retention
    /// window. Intended for a schedule, not the request path.
    pub async fn cleanup(&self) -> Result<u64, AuthError> {
        let removed = self
            .store_call(
                self.refresh_tokens
                    .purge(self.clock.now(), self.rotated_retention),
            )
            .await
            .map_err(internal_store_error)?;
        if removed > 0 {
            tracing::info!(removed, "purged dead refresh tokens");
        }
        Ok(removed)
    }

    async fn cascade_on_reuse(
        &self,
        presented_token: &str,
        user_id: i32,
        now: chrono::DateTime<chrono::FixedOffset>,
    ) {
        // Best effort: the refresh already failed; this only hardens the
        // aftermath, so store errors here are logged and swallowed.
        let row = match self
            .store_call(self.refresh_tokens.find_by_token(presented_token))
            .await
        {
            Ok(row) => row,
            Err(err) => {
                tracing::warn!(user_id, "reuse inspection failed: {err}");
                return;
            }
        };

        if let Some(row) = row.filter(|row| row.is_rotated) {
            match self
                .store_call(self.refresh_tokens.revoke_descendants(row.id, now))
                .await
            {
                Ok(revoked) => tracing::warn!(
                    user_id,
                    revoked,
                    "rotated refresh token reused; descendant chain revoked"
                ),
                Err(err) => tracing::warn!(user_id, "cascade revocation failed: {err}"),
            }
        }
    }

    async fn store_call<T>(
        &self,
        op: impl Future<Output = StoreResult<T>> + Send,
    ) -> StoreResult<T> {
        match tokio::time::timeout(self.store_timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout),
        }
    }
}

fn internal_store_error(err: StoreError) -> AuthError {
    match err {
        StoreError::UnknownToken | StoreError::TokenNotActive => AuthError::TokenNotActive,
        StoreError::Timeout => AuthError::Internal("store operation timed out".to_string()),
        StoreError::Db(db_err) => AuthError::Internal(format!("database error: {db_err}")),
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration as StdDuration};

    use chrono::{Duration, FixedOffset, TimeZone};

    use super::SessionService;
    use crate::{
        auth::{
            Claims, error::AuthError, issuer::TokenIssuer, jwt::{JwtKeys, TokenCodec},
            password::PasswordHasher,
        },
        clock::{Clock, FixedClock},
        db::{
            memory::{InMemoryIdentityStore, InMemoryRefreshTokenStore},
            store::{IdentityStore, RefreshTokenStore},
        },
    };

    const PASSWORD: &str = "correct horse battery";

    struct Harness {
        sessions: SessionService,
        identities: Arc<InMemoryIdentityStore>,
        refresh_tokens: Arc<InMemoryRefreshTokenStore>,
        clock: Arc<FixedClock>,
    }

    fn harness() -> Harness {
        let start = FixedOffset::east_opt(0)
            .expect("offset should be valid")
            .with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
            .single()
            .expect("timestamp should be valid");
        let clock = Arc::new(FixedClock::at(start));
        let hasher = PasswordHasher::new("unit-test-pepper");
        let codec = Arc::new(TokenCodec::new(
            JwtKeys::from_secret(b"unit-test-secret"),
            clock.clone(),
        ));
        let issuer = TokenIssuer::new(
            codec.clone(),
            clock.clone(),
            Duration::minutes(60),
            Duration::days(30),
        );

        let identities = Arc::new(InMemoryIdentityStore::new());
        let hash = hasher.hash(PASSWORD).expect("hash");
        identities.add_user("frida", "frida@example.com", &hash, "musician", true, start);
        identities.add_user("dormant", "dormant@example.com", &hash, "listener", false, start);

        let refresh_tokens = Arc::new(InMemoryRefreshTokenStore::new());
        let sessions = SessionService::new(
            identities.clone(),
            refresh_tokens.clone(),
            hasher,
            codec,
            issuer,
            clock.clone(),
            StdDuration::from_secs(5),
            Duration::days(7),
        );

        Harness {
            sessions,
            identities,
            refresh_tokens,
            clock,
        }
    }

    fn caller_claims(h: &Harness, access_token: &str) -> Claims {
        h.sessions.validate(access_token).expect("validate")
    }

    #[tokio::test]
    async fn login_issues_pair_and_stamps_last_login() {
        let h = harness();

        let outcome = h.sessions.login("frida", PASSWORD).await.expect("login");
        assert_eq!(outcome.tokens.token_type, "bearer");
        assert_eq!(outcome.tokens.expires_in, 3600);
        assert_eq!(outcome.user.username, "frida");
        assert_eq!(outcome.user.role, "musician");

        let stored = h
            .identities
            .find_by_id(outcome.user.id)
            .await
            .expect("find")
            .expect("user");
        assert_eq!(stored.last_login_at, Some(h.clock.now()));
        assert_eq!(h.refresh_tokens.row_count(), 1);
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let h = harness();

        for (username, password) in [
            ("frida", "wrong password entirely"),
            ("nobody", PASSWORD),
            ("dormant", PASSWORD),
        ] {
            let err = h
                .sessions
                .login(username, password)
                .await
                .expect_err("login must fail");
            assert!(
                matches!(err, AuthError::InvalidCredentials),
                "{username}: {err}"
            );
        }
        assert_eq!(h.refresh_tokens.row_count(), 0);
    }

    #[tokio::test]
    async fn refresh_rotates_and_consumes_the_old_token() {
        let h = harness();
        let login = h.sessions.login("frida", PASSWORD).await.expect("login");
        let r1 = login.tokens.refresh_token;

        let second = h.sessions.refresh(&r1).await.expect("first refresh");
        assert_ne!(second.refresh_token, r1);

        // The fresh token works; the consumed one is dead for good.
        h.sessions
            .refresh(&second.refresh_token)
            .await
            .expect("fresh token still works");

        let err = h.sessions.refresh(&r1).await.expect_err("reuse of r1");
        assert!(matches!(err, AuthError::TokenNotActive));
    }

    #[tokio::test]
    async fn rotation_links_rows_back_to_their_predecessor() {
        let h = harness();
        let login = h.sessions.login("frida", PASSWORD).await.expect("login");
        let r1 = login.tokens.refresh_token;

        let old_row = h
            .refresh_tokens
            .find_by_token(&r1)
            .await
            .expect("find")
            .expect("row");
        let second = h.sessions.refresh(&r1).await.expect("refresh");
        let new_row = h
            .refresh_tokens
            .find_by_token(&second.refresh_token)
            .await
            .expect("find")
            .expect("row");

        assert_eq!(new_row.previous_token_id, Some(old_row.id));
        let old_row = h
            .refresh_tokens
            .find_by_token(&r1)
            .await
            .expect("find")
            .expect("row");
        assert!(old_row.is_rotated);
    }

    #[tokio::test]
    async fn refresh_rejects_access_tokens_and_garbage() {
        let h = harness();
        let login = h.sessions.login("frida", PASSWORD).await.expect("login");

        let err = h
            .sessions
            .refresh(&login.tokens.access_token)
            .await
            .expect_err("access token is the wrong kind");
        assert!(matches!(err, AuthError::WrongTokenKind));

        let err = h
            .sessions
            .refresh("garbage")
            .await
            .expect_err("garbage token");
        assert!(matches!(err, AuthError::MalformedToken));
    }

    #[tokio::test]
    async fn refresh_rejects_expired_refresh_tokens() {
        let h = harness();
        let login = h.sessions.login("frida", PASSWORD).await.expect("login");

        h.clock.advance(Duration::days(31));
        let err = h
            .sessions
            .refresh(&login.tokens.refresh_token)
            .await
            .expect_err("expired refresh token");
        assert!(matches!(err, AuthError::ExpiredToken));
    }

    #[tokio::test]
    async fn reuse_of_a_rotated_token_revokes_the_descendant_chain() {
        let h = harness();
        let login = h.sessions.login("frida", PASSWORD).await.expect("login");
        let r1 = login.tokens.refresh_token;

        let second = h.sessions.refresh(&r1).await.expect("r1 -> r2");
        let third = h
            .sessions
            .refresh(&second.refresh_token)
            .await
            .expect("r2 -> r3");

        // Replaying r1 is a theft signal: the live tail (r3) must die too.
        let err = h.sessions.refresh(&r1).await.expect_err("replayed r1");
        assert!(matches!(err, AuthError::TokenNotActive));

        let err = h
            .sessions
            .refresh(&third.refresh_token)
            .await
            .expect_err("r3 revoked by cascade");
        assert!(matches!(err, AuthError::TokenNotActive));
    }

    #[tokio::test]
    async fn logout_revokes_only_the_callers_token() {
        let h = harness();
        let login = h.sessions.login("frida", PASSWORD).await.expect("login");
        let caller = caller_claims(&h, &login.tokens.access_token);

        // A different caller replaying the token string gets a silent no-op.
        let mut stranger = caller.clone();
        stranger.sub = "9999".to_string();
        let revoked = h
            .sessions
            .logout(&login.tokens.refresh_token, &stranger)
            .await
            .expect("logout");
        assert!(!revoked);
        h.sessions
            .refresh(&login.tokens.refresh_token)
            .await
            .expect("token must still be alive");

        // Refresh consumed the old token; log out with the current one.
        let login = h.sessions.login("frida", PASSWORD).await.expect("login");
        let revoked = h
            .sessions
            .logout(&login.tokens.refresh_token, &caller)
            .await
            .expect("logout");
        assert!(revoked);
        let err = h
            .sessions
            .refresh(&login.tokens.refresh_token)
            .await
            .expect_err("revoked token");
        assert!(matches!(err, AuthError::TokenNotActive));
    }

    #[tokio::test]
    async fn logout_all_kills_every_prior_session() {
        let h = harness();
        let first = h.sessions.login("frida", PASSWORD).await.expect("login");
        let second = h.sessions.login("frida", PASSWORD).await.expect("login");
        let caller = caller_claims(&h, &first.tokens.access_token);

        let revoked = h.sessions.logout_all(&caller).await.expect("logout_all");
        assert_eq!(revoked, 2);

        for token in [first.tokens.refresh_token, second.tokens.refresh_token] {
            let err = h.sessions.refresh(&token).await.expect_err("revoked");
            assert!(matches!(err, AuthError::TokenNotActive));
        }
    }

    #[tokio::test]
    async fn validate_is_stateless_and_kind_checked() {
        let h = harness();
        let login = h.sessions.login("frida", PASSWORD).await.expect("login");

        let claims = h
            .sessions
            .validate(&login.tokens.access_token)
            .expect("valid access token");
        assert_eq!(claims.username.as_deref(), Some("frida"));

        let err = h
            .sessions
            .validate(&login.tokens.refresh_token)
            .expect_err("refresh token is the wrong kind");
        assert!(matches!(err, AuthError::WrongTokenKind));

        h.clock.advance(Duration::minutes(61));
        let err = h
            .sessions
            .validate(&login.tokens.access_token)
            .expect_err("expired access token");
        assert!(matches!(err, AuthError::ExpiredToken));
    }

    #[tokio::test]
    async fn cleanup_reports_purged_rows() {
        let h = harness();
        h.sessions.login("frida", PASSWORD).await.expect("login");
        assert_eq!(h.sessions.cleanup().await.expect("cleanup"), 0);

        h.clock.advance(Duration::days(31));
        assert_eq!(h.sessions.cleanup().await.expect("cleanup"), 1);
        assert_eq!(h.refresh_tokens.row_count(), 0);
    }
}
