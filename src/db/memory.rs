use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset};

use super::{
    entities::{refresh_token, user},
    store::{IdentityStore, RefreshTokenStore, StoreError, StoreResult},
};

/// In-memory refresh-token store. Implements the same state machine as the
/// relational store behind a single mutex, which trivially gives the
/// single-winner rotation guarantee. Used by tests and by anything that
/// needs the session core without a database.
#[derive(Default)]
pub struct InMemoryRefreshTokenStore {
    inner: Mutex<Rows>,
}

#[derive(Default)]
struct Rows {
    rows: Vec<refresh_token::Model>,
    next_id: i32,
}

impl Rows {
    fn allocate_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }
}

impl InMemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row_count(&self) -> usize {
        self.lock().rows.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Rows> {
        self.inner.lock().expect("refresh token store lock poisoned")
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshTokenStore {
    async fn create(
        &self,
        token: &str,
        user_id: i32,
        expires_at: DateTime<FixedOffset>,
        now: DateTime<FixedOffset>,
    ) -> StoreResult<refresh_token::Model> {
        let mut inner = self.lock();
        let id = inner.allocate_id();
        let row = refresh_token::Model {
            id,
            token: token.to_string(),
            user_id,
            expires_at,
            is_revoked: false,
            is_rotated: false,
            rotated_at: None,
            previous_token_id: None,
            created_at: now,
            revoked_at: None,
        };
        inner.rows.push(row.clone());
        Ok(row)
    }

    async fn rotate(
        &self,
        old_token: &str,
        new_token: &str,
        new_expires_at: DateTime<FixedOffset>,
        now: DateTime<FixedOffset>,
    ) -> StoreResult<refresh_token::Model> {
        let mut inner = self.lock();

        let old_index = inner
            .rows
            .iter()
            .position(|row| row.token == old_token)
            .ok_or(StoreError::UnknownToken)?;
        if !inner.rows[old_index].is_active(now) {
            return Err(StoreError::TokenNotActive);
        }

        let old_id = {
            let old = &mut inner.rows[old_index];
            old.is_rotated = true;
            old.rotated_at = Some(now);
            old.id
        };

        let id = inner.allocate_id();
        let successor = refresh_token::Model {
            id,
            token: new_token.to_string(),
            user_id: inner.rows[old_index].user_id,
            expires_at: new_expires_at,
            is_revoked: false,
            is_rotated: false,
            rotated_at: None,
            previous_token_id: Some(old_id),
            created_at: now,
            revoked_at: None,
        };
        inner.rows.push(successor.clone());
        Ok(successor)
    }

    async fn revoke(
        &self,
        token: &str,
        user_id: i32,
        now: DateTime<FixedOffset>,
    ) -> StoreResult<bool> {
        let mut inner = self.lock();
        let Some(row) = inner
            .rows
            .iter_mut()
            .find(|row| row.token == token && row.user_id == user_id && !row.is_revoked)
        else {
            return Ok(false);
        };
        row.is_revoked = true;
        row.revoked_at = Some(now);
        Ok(true)
    }

    async fn revoke_all(&self, user_id: i32, now: DateTime<FixedOffset>) -> StoreResult<u64> {
        let mut inner = self.lock();
        let mut revoked = 0u64;
        for row in inner
            .rows
            .iter_mut()
            .filter(|row| row.user_id == user_id && row.is_active(now))
        {
            row.is_revoked = true;
            row.revoked_at = Some(now);
            revoked += 1;
        }
        Ok(revoked)
    }

    async fn revoke_descendants(
        &self,
        token_id: i32,
        now: DateTime<FixedOffset>,
    ) -> StoreResult<u64> {
        let mut inner = self.lock();
        let mut revoked = 0u64;
        let mut current = token_id;

        loop {
            let Some(index) = inner
                .rows
                .iter()
                .position(|row| row.previous_token_id == Some(current))
            else {
                break;
            };
            let row = &mut inner.rows[index];
            if !row.is_revoked {
                row.is_revoked = true;
                row.revoked_at = Some(now);
                revoked += 1;
            }
            current = row.id;
        }

        Ok(revoked)
    }

    async fn find_by_token(&self, token: &str) -> StoreResult<Option<refresh_token::Model>> {
        Ok(self.lock().rows.iter().find(|row| row.token == token).cloned())
    }

    async fn purge(&self, now: DateTime<FixedOffset>, retention: Duration) -> StoreResult<u64> {
        let cutoff = now - retention;
        let mut inner = self.lock();
        let before = inner.rows.len();
        inner.rows.retain(|row| {
            let expired = row.expires_at < now;
            let stale_rotated = row.is_rotated && row.rotated_at.is_some_and(|at| at < cutoff);
            !(expired || stale_rotated)
        });
        Ok((before - inner.rows.len()) as u64)
    }
}

/// In-memory identity store for tests and seeding without a database.
#[derive(Default)]
pub struct InMemoryIdentityStore {
    inner: Mutex<Users>,
}

#[derive(Default)]
struct Users {
    users: Vec<user::Model>,
    next_id: i32,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
        role: &str,
        is_active: bool,
        created_at: DateTime<FixedOffset>,
    ) -> user::Model {
        let mut inner = self.inner.lock().expect("identity store lock poisoned");
        inner.next_id += 1;
        let user = user::Model {
            id: inner.next_id,
            username: username.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            role: role.to_string(),
            is_active,
            last_login_at: None,
            created_at,
        };
        inner.users.push(user.clone());
        user
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn find_by_username(&self, username: &str) -> StoreResult<Option<user::Model>> {
        Ok(self
            .inner
            .lock()
            .expect("identity store lock poisoned")
            .users
            .iter()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn find_by_id(&self, id: i32) -> StoreResult<Option<user::Model>> {
        Ok(self
            .inner
            .lock()
            .expect("identity store lock poisoned")
            .users
            .iter()
            .find(|user| user.id == id)
            .cloned())
    }

    async fn set_last_login(&self, id: i32, at: DateTime<FixedOffset>) -> StoreResult<()> {
        let mut inner = self.inner.lock().expect("identity store lock poisoned");
        if let Some(user) = inner.users.iter_mut().find(|user| user.id == id) {
            user.last_login_at = Some(at);
        }
        Ok(())
    }
}
