#[allow(unused_imports)]
pub mod prelude {
    pub use super::refresh_token::Entity as RefreshToken;
    pub use super::user::Entity as User;
}

pub mod user {
    use sea_orm::entity::prelude::*;

    #[sea_orm::model]
    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "users")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        #[sea_orm(unique)]
        pub username: String,
        #[sea_orm(unique)]
        pub email: String,
        pub password_hash: String,
        pub role: String,
        #[sea_orm(default_value = true)]
        pub is_active: bool,
        pub last_login_at: Option<DateTimeWithTimeZone>,
        #[sea_orm(default_expr = "Expr::current_timestamp()")]
        pub created_at: DateTimeWithTimeZone,
        #[sea_orm(has_many)]
        pub refresh_tokens: HasMany<super::refresh_token::Entity>,
    }

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod refresh_token {
    use sea_orm::entity::prelude::*;

    /// One persisted refresh token. `is_revoked` and `is_rotated` are
    /// independent one-way flags, each set together with its timestamp
    /// exactly once. `previous_token_id` back-links the row this one
    /// replaced during rotation, forming a path per login session.
    #[sea_orm::model]
    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "refresh_tokens")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        #[sea_orm(unique)]
        pub token: String,
        #[sea_orm(indexed)]
        pub user_id: i32,
        #[sea_orm(indexed)]
        pub expires_at: DateTimeWithTimeZone,
        #[sea_orm(default_value = false)]
        pub is_revoked: bool,
        #[sea_orm(default_value = false)]
        pub is_rotated: bool,
        pub rotated_at: Option<DateTimeWithTimeZone>,
        #[sea_orm(indexed)]
        pub previous_token_id: Option<i32>,
        #[sea_orm(default_expr = "Expr::current_timestamp()")]
        pub created_at: DateTimeWithTimeZone,
        pub revoked_at: Option<DateTimeWithTimeZone>,
        #[sea_orm(belongs_to, from = "user_id", to = "id", on_delete = "Cascade")]
        pub user: HasOne<super::user::Entity>,
    }

    impl ActiveModelBehavior for ActiveModel {}

    impl Model {
        /// Usable for a further refresh iff not revoked, not rotated, and
        /// not past expiry. Any other state is a hard rejection.
        pub fn is_active(&self, now: chrono::DateTime<chrono::FixedOffset>) -> bool {
            !self.is_revoked && !self.is_rotated && now < self.expires_at
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, FixedOffset, TimeZone};

    use super::refresh_token;

    fn ts() -> chrono::DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .expect("offset should be valid")
            .with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
            .single()
            .expect("timestamp should be valid")
    }

    fn row() -> refresh_token::Model {
        let now = ts();
        refresh_token::Model {
            id: 1,
            token: "token-1".to_string(),
            user_id: 7,
            expires_at: now + Duration::days(30),
            is_revoked: false,
            is_rotated: false,
            rotated_at: None,
            previous_token_id: None,
            created_at: now,
            revoked_at: None,
        }
    }

    #[test]
    fn active_predicate_requires_all_three_conditions() {
        let now = ts();

        assert!(row().is_active(now));

        let mut revoked = row();
        revoked.is_revoked = true;
        assert!(!revoked.is_active(now));

        let mut rotated = row();
        rotated.is_rotated = true;
        assert!(!rotated.is_active(now));

        let expired = row();
        assert!(!expired.is_active(now + Duration::days(31)));
        // Boundary: a token expiring exactly now is no longer usable.
        assert!(!expired.is_active(expired.expires_at));
    }
}
