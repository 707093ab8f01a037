use std::{sync::Arc, time::Duration as StdDuration};

use chrono::Duration;
use sea_orm::DatabaseConnection;

use crate::{
    auth::{
        issuer::TokenIssuer,
        jwt::{JwtKeys, TokenCodec},
        password::PasswordHasher,
    },
    clock::{Clock, SystemClock},
    config::AppConfig,
    db::{IdentityStore, RefreshTokenStore, SeaIdentityStore, SeaRefreshTokenStore},
    services::SessionService,
};

#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionService,
}

impl AppState {
    pub fn from_database(cfg: &AppConfig, db: &DatabaseConnection) -> Arc<Self> {
        Self::with_stores(
            cfg,
            Arc::new(SeaIdentityStore::new(db)),
            Arc::new(SeaRefreshTokenStore::new(db)),
            Arc::new(SystemClock),
        )
    }

    /// Wires the session core over any store pair; tests hand in the
    /// in-memory implementations.
    pub fn with_stores(
        cfg: &AppConfig,
        identities: Arc<dyn IdentityStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let codec = Arc::new(TokenCodec::new(
            JwtKeys::from_secret(cfg.jwt_secret.as_bytes()),
            clock.clone(),
        ));
        let issuer = TokenIssuer::new(
            codec.clone(),
            clock.clone(),
            Duration::minutes(cfg.access_ttl_mins),
            Duration::minutes(cfg.refresh_ttl_mins),
        );
        let hasher = PasswordHasher::new(cfg.password_pepper.clone());

        let sessions = SessionService::new(
            identities,
            refresh_tokens,
            hasher,
            codec,
            issuer,
            clock,
            StdDuration::from_secs(cfg.store_timeout_secs),
            Duration::days(cfg.rotated_retention_days),
        );

        Arc::new(Self { sessions })
    }
}
