use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset};
use thiserror::Error;

use super::entities::{refresh_token, user};

#[derive(Debug, Error)]
pub enum StoreError {
    /// No row with that token string.
    #[error("unknown refresh token")]
    UnknownToken,

    /// The row exists but is revoked, rotated, or expired.
    #[error("refresh token is not active")]
    TokenNotActive,

    #[error("store operation timed out")]
    Timeout,

    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persisted state machine for refresh tokens. Rows move `Active → Rotated`
/// or `Active → Revoked`, both terminal; expiry is a computed predicate, not
/// a stored flag. Implementations must make `rotate` single-winner under
/// concurrency via a conditional update (or equivalent), not an application
/// lock, since multiple service instances may share the store.
///
/// `now` is always passed in by the caller so implementations stay
/// clock-free and deterministic under test.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Inserts a fresh Active root row (no previous-link). Always permitted.
    async fn create(
        &self,
        token: &str,
        user_id: i32,
        expires_at: DateTime<FixedOffset>,
        now: DateTime<FixedOffset>,
    ) -> StoreResult<refresh_token::Model>;

    /// Atomically marks the old row rotated and inserts the successor row
    /// back-linked via `previous_token_id`. Exactly one of N concurrent
    /// calls against the same old token wins; the rest get `TokenNotActive`.
    /// `UnknownToken` if no row carries `old_token` at all.
    async fn rotate(
        &self,
        old_token: &str,
        new_token: &str,
        new_expires_at: DateTime<FixedOffset>,
        now: DateTime<FixedOffset>,
    ) -> StoreResult<refresh_token::Model>;

    /// Revokes one not-yet-revoked row iff it belongs to `user_id`. Returns
    /// false (not an error) when the token is missing or owned by someone
    /// else, so logout cannot leak the existence of other users' tokens.
    async fn revoke(
        &self,
        token: &str,
        user_id: i32,
        now: DateTime<FixedOffset>,
    ) -> StoreResult<bool>;

    /// Revokes every currently-Active, unexpired row for the user. Returns
    /// the count.
    async fn revoke_all(&self, user_id: i32, now: DateTime<FixedOffset>) -> StoreResult<u64>;

    /// Follows successor links forward from `token_id` and revokes every
    /// not-yet-revoked descendant. Used when reuse of a rotated token
    /// signals theft of the session chain. Returns the count revoked.
    async fn revoke_descendants(
        &self,
        token_id: i32,
        now: DateTime<FixedOffset>,
    ) -> StoreResult<u64>;

    async fn find_by_token(&self, token: &str) -> StoreResult<Option<refresh_token::Model>>;

    /// Deletes rows that are expired, or rotated longer ago than
    /// `retention`. Rotated rows are kept for the retention window so an
    /// operator can distinguish "not found" from "already consumed". Never
    /// touches an Active row.
    async fn purge(&self, now: DateTime<FixedOffset>, retention: Duration) -> StoreResult<u64>;
}

/// Read-mostly access to identities, which are owned by the domain layer.
/// This core only ever stamps `last_login_at`.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> StoreResult<Option<user::Model>>;

    async fn find_by_id(&self, id: i32) -> StoreResult<Option<user::Model>>;

    async fn set_last_login(&self, id: i32, at: DateTime<FixedOffset>) -> StoreResult<()>;
}
