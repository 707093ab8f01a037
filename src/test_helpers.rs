use std::sync::Arc;

use axum::Router;

use crate::{
    auth::password::PasswordHasher,
    clock::{Clock, SystemClock},
    config::AppConfig,
    db::{
        entities::user,
        memory::{InMemoryIdentityStore, InMemoryRefreshTokenStore},
    },
    routes::router,
    state::AppState,
};

pub const TEST_PEPPER: &str = "test-pepper";

pub fn test_config() -> AppConfig {
    AppConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_url: String::new(),
        db_max_connections: 1,
        db_min_idle: 1,
        jwt_secret: "test-secret".to_string(),
        password_pepper: TEST_PEPPER.to_string(),
        access_ttl_mins: 60,
        refresh_ttl_mins: 43_200,
        rotated_retention_days: 7,
        store_timeout_secs: 5,
        cleanup_interval_secs: 3_600,
        admin_username: "admin".to_string(),
        admin_email: "admin@example.com".to_string(),
        admin_password: "admin-test-password".to_string(),
        log_level: "info".to_string(),
    }
}

/// Router plus handles to the in-memory stores behind it, so tests can seed
/// users and inspect refresh-token rows directly.
pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub identities: Arc<InMemoryIdentityStore>,
    pub refresh_tokens: Arc<InMemoryRefreshTokenStore>,
    hasher: PasswordHasher,
}

impl TestApp {
    pub fn seed_user(&self, username: &str, role: &str, password: &str) -> user::Model {
        let hash = self.hasher.hash(password).expect("hash test password");
        self.identities.add_user(
            username,
            &format!("{username}@example.com"),
            &hash,
            role,
            true,
            SystemClock.now(),
        )
    }
}

pub fn test_app() -> TestApp {
    let cfg = test_config();
    let identities = Arc::new(InMemoryIdentityStore::new());
    let refresh_tokens = Arc::new(InMemoryRefreshTokenStore::new());
    let state = AppState::with_stores(
        &cfg,
        identities.clone(),
        refresh_tokens.clone(),
        Arc::new(SystemClock),
    );

    TestApp {
        router: router(state.clone()),
        state,
        identities,
        refresh_tokens,
        hasher: PasswordHasher::new(TEST_PEPPER),
    }
}
