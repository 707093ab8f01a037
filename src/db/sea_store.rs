use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionError, TransactionTrait, sea_query::Expr,
};

use super::{
    entities::{
        refresh_token::{self, Entity as RefreshToken},
        user::{self, Entity as User},
    },
    store::{IdentityStore, RefreshTokenStore, StoreError, StoreResult},
};

/// Relational implementation backed by sea-orm. The single relational store
/// is the source of truth for refresh-token state across service instances,
/// so every state transition is a conditional update.
#[derive(Clone)]
pub struct SeaRefreshTokenStore {
    db: DatabaseConnection,
}

impl SeaRefreshTokenStore {
    pub fn new(db: &DatabaseConnection) -> Self {
        Self { db: db.clone() }
    }
}

#[async_trait]
impl RefreshTokenStore for SeaRefreshTokenStore {
    async fn create(
        &self,
        token: &str,
        user_id: i32,
        expires_at: DateTime<FixedOffset>,
        now: DateTime<FixedOffset>,
    ) -> StoreResult<refresh_token::Model> {
        let model = refresh_token::ActiveModel {
            token: Set(token.to_string()),
            user_id: Set(user_id),
            expires_at: Set(expires_at),
            is_revoked: Set(false),
            is_rotated: Set(false),
            rotated_at: Set(None),
            previous_token_id: Set(None),
            created_at: Set(now),
            revoked_at: Set(None),
            ..Default::default()
        };
        Ok(model.insert(&self.db).await?)
    }

    async fn rotate(
        &self,
        old_token: &str,
        new_token: &str,
        new_expires_at: DateTime<FixedOffset>,
        now: DateTime<FixedOffset>,
    ) -> StoreResult<refresh_token::Model> {
        let old_token = old_token.to_string();
        let new_token = new_token.to_string();

        // Single transaction: claim-old and insert-new must not be torn
        // apart by a crash. The claim is a compare-and-swap on the state
        // flags; rows_affected == 0 means another rotation (or a revoke, or
        // expiry) got there first.
        let result = self
            .db
            .transaction::<_, refresh_token::Model, StoreError>(move |txn| {
                Box::pin(async move {
                    let claimed = RefreshToken::update_many()
                        .col_expr(refresh_token::Column::IsRotated, Expr::value(true))
                        .col_expr(refresh_token::Column::RotatedAt, Expr::value(now))
                        .filter(refresh_token::Column::Token.eq(old_token.clone()))
                        .filter(refresh_token::Column::IsRevoked.eq(false))
                        .filter(refresh_token::Column::IsRotated.eq(false))
                        .filter(refresh_token::Column::ExpiresAt.gt(now))
                        .exec(txn)
                        .await?;

                    if claimed.rows_affected == 0 {
                        let existing = RefreshToken::find()
                            .filter(refresh_token::Column::Token.eq(old_token))
                            .one(txn)
                            .await?;
                        return Err(match existing {
                            None => StoreError::UnknownToken,
                            Some(_) => StoreError::TokenNotActive,
                        });
                    }

                    let old = RefreshToken::find()
                        .filter(refresh_token::Column::Token.eq(old_token))
                        .one(txn)
                        .await?
                        .ok_or(StoreError::UnknownToken)?;

                    let successor = refresh_token::ActiveModel {
                        token: Set(new_token),
                        user_id: Set(old.user_id),
                        expires_at: Set(new_expires_at),
                        is_revoked: Set(false),
                        is_rotated: Set(false),
                        rotated_at: Set(None),
                        previous_token_id: Set(Some(old.id)),
                        created_at: Set(now),
                        revoked_at: Set(None),
                        ..Default::default()
                    };
                    Ok(successor.insert(txn).await?)
                })
            })
            .await;

        result.map_err(|err| match err {
            TransactionError::Connection(db_err) => StoreError::Db(db_err),
            TransactionError::Transaction(store_err) => store_err,
        })
    }

    async fn revoke(
        &self,
        token: &str,
        user_id: i32,
        now: DateTime<FixedOffset>,
    ) -> StoreResult<bool> {
        let updated = RefreshToken::update_many()
            .col_expr(refresh_token::Column::IsRevoked, Expr::value(true))
            .col_expr(refresh_token::Column::RevokedAt, Expr::value(now))
            .filter(refresh_token::Column::Token.eq(token))
            .filter(refresh_token::Column::UserId.eq(user_id))
            .filter(refresh_token::Column::IsRevoked.eq(false))
            .exec(&self.db)
            .await?;
        Ok(updated.rows_affected > 0)
    }

    async fn revoke_all(&self, user_id: i32, now: DateTime<FixedOffset>) -> StoreResult<u64> {
        let updated = RefreshToken::update_many()
            .col_expr(refresh_token::Column::IsRevoked, Expr::value(true))
            .col_expr(refresh_token::Column::RevokedAt, Expr::value(now))
            .filter(refresh_token::Column::UserId.eq(user_id))
            .filter(refresh_token::Column::IsRevoked.eq(false))
            .filter(refresh_token::Column::IsRotated.eq(false))
            .filter(refresh_token::Column::ExpiresAt.gt(now))
            .exec(&self.db)
            .await?;
        Ok(updated.rows_affected)
    }

    async fn revoke_descendants(
        &self,
        token_id: i32,
        now: DateTime<FixedOffset>,
    ) -> StoreResult<u64> {
        let mut revoked = 0u64;
        let mut current = token_id;

        // The chain is a path (at most one successor per row), so a forward
        // walk terminates at the Active tail.
        loop {
            let successor = RefreshToken::find()
                .filter(refresh_token::Column::PreviousTokenId.eq(current))
                .one(&self.db)
                .await?;
            let Some(successor) = successor else { break };

            let updated = RefreshToken::update_many()
                .col_expr(refresh_token::Column::IsRevoked, Expr::value(true))
                .col_expr(refresh_token::Column::RevokedAt, Expr::value(now))
                .filter(refresh_token::Column::Id.eq(successor.id))
                .filter(refresh_token::Column::IsRevoked.eq(false))
                .exec(&self.db)
                .await?;
            revoked += updated.rows_affected;
            current = successor.id;
        }

        Ok(revoked)
    }

    async fn find_by_token(&self, token: &str) -> StoreResult<Option<refresh_token::Model>> {
        Ok(RefreshToken::find()
            .filter(refresh_token::Column::Token.eq(token))
            .one(&self.db)
            .await?)
    }

    async fn purge(&self, now: DateTime<FixedOffset>, retention: Duration) -> StoreResult<u64> {
        let rotated_cutoff = now - retention;
        let deleted = RefreshToken::delete_many()
            .filter(
                Condition::any()
                    .add(refresh_token::Column::ExpiresAt.lt(now))
                    .add(
                        Condition::all()
                            .add(refresh_token::Column::IsRotated.eq(true))
                            .add(refresh_token::Column::RotatedAt.lt(rotated_cutoff)),
                    ),
            )
            .exec(&self.db)
            .await?;
        Ok(deleted.rows_affected)
    }
}

#[derive(Clone)]
pub struct SeaIdentityStore {
    db: DatabaseConnection,
}

impl SeaIdentityStore {
    pub fn new(db: &DatabaseConnection) -> Self {
        Self { db: db.clone() }
    }

    /// Inserts an identity row. Only used by startup seeding; day-to-day
    /// user management belongs to the domain layer.
    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
        role: &str,
    ) -> StoreResult<user::Model> {
        let model = user::ActiveModel {
            username: Set(username.to_string()),
            email: Set(email.to_string()),
            password_hash: Set(password_hash.to_string()),
            role: Set(role.to_string()),
            is_active: Set(true),
            last_login_at: Set(None),
            ..Default::default()
        };
        Ok(model.insert(&self.db).await?)
    }
}

#[async_trait]
impl IdentityStore for SeaIdentityStore {
    async fn find_by_username(&self, username: &str) -> StoreResult<Option<user::Model>> {
        Ok(User::find()
            .filter(user::Column::Username.eq(username))
            .one(&self.db)
            .await?)
    }

    async fn find_by_id(&self, id: i32) -> StoreResult<Option<user::Model>> {
        Ok(User::find_by_id(id).one(&self.db).await?)
    }

    async fn set_last_login(&self, id: i32, at: DateTime<FixedOffset>) -> StoreResult<()> {
        User::update_many()
            .col_expr(user::Column::LastLoginAt, Expr::value(at))
            .filter(user::Column::Id.eq(id))
            .exec(&self.db)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, FixedOffset, TimeZone};
    use sea_orm::{DatabaseBackend, DbErr, MockDatabase, MockExecResult};

    use super::{SeaRefreshTokenStore, StoreError};
    use crate::db::{entities::refresh_token, store::RefreshTokenStore};

    fn ts() -> chrono::DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .expect("offset should be valid")
            .with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
            .single()
            .expect("timestamp should be valid")
    }

    #[tokio::test]
    async fn find_by_token_returns_none_when_missing() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<refresh_token::Model>::new()])
            .into_connection();
        let store = SeaRefreshTokenStore::new(&db);

        let result = store
            .find_by_token("missing-token")
            .await
            .expect("query should succeed");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn revoke_reports_false_when_no_row_matches() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();
        let store = SeaRefreshTokenStore::new(&db);

        let revoked = store
            .revoke("token-1", 7, ts())
            .await
            .expect("update should succeed");
        assert!(!revoked);
    }

    #[tokio::test]
    async fn purge_reports_deleted_row_count() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 3,
            }])
            .into_connection();
        let store = SeaRefreshTokenStore::new(&db);

        let removed = store
            .purge(ts(), Duration::days(7))
            .await
            .expect("delete should succeed");
        assert_eq!(removed, 3);
    }

    #[tokio::test]
    async fn revoke_all_maps_database_errors() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_errors([DbErr::Custom("update failed".to_string())])
            .into_connection();
        let store = SeaRefreshTokenStore::new(&db);

        let err = store
            .revoke_all(7, ts())
            .await
            .expect_err("update should fail");
        assert!(matches!(err, StoreError::Db(_)));
    }
}
