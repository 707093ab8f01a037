use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::Router;
use sea_orm::{ConnectOptions, Database};
use tower_http::trace::TraceLayer;

use encore_server::{
    auth::{Role, password::PasswordHasher},
    config::AppConfig,
    db::{IdentityStore, SeaIdentityStore},
    logging::init_tracing,
    routes::router,
    state::AppState,
};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        tracing::error!("server failed: {err:?}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cfg = AppConfig::from_env().expect("failed to load config");
    init_tracing(&cfg.log_level);

    let mut opt = ConnectOptions::new(cfg.database_url.clone());
    opt.max_connections(cfg.db_max_connections)
        .min_connections(cfg.db_min_idle)
        .connect_timeout(Duration::from_secs(5))
        .sqlx_logging(false);

    let db = Database::connect(opt).await?;
    tracing::info!("syncing database schema from entities");
    db.get_schema_registry("encore_server::db::entities::*")
        .sync(&db)
        .await?;

    seed_admin(&cfg, &db).await?;

    let state = AppState::from_database(&cfg, &db);
    spawn_cleanup_task(&cfg, &state);

    let app = Router::new()
        .merge(router(Arc::clone(&state)))
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .expect("invalid host/port");
    tracing::info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn seed_admin(cfg: &AppConfig, db: &sea_orm::DatabaseConnection) -> anyhow::Result<()> {
    let identities = SeaIdentityStore::new(db);
    if let Some(existing) = identities
        .find_by_username(&cfg.admin_username)
        .await
        .map_err(|err| anyhow::anyhow!("admin lookup failed: {err}"))?
    {
        tracing::info!("admin user already present: {}", existing.username);
        return Ok(());
    }

    let hasher = PasswordHasher::new(cfg.password_pepper.clone());
    let hash = hasher
        .hash(&cfg.admin_password)
        .map_err(|err| anyhow::anyhow!("admin seed hash error: {err}"))?;
    let user = identities
        .create_user(
            &cfg.admin_username,
            &cfg.admin_email,
            &hash,
            Role::Admin.as_str(),
        )
        .await
        .map_err(|err| anyhow::anyhow!("admin seed insert failed: {err}"))?;
    tracing::info!("seeded admin user {}", user.username);
    Ok(())
}

/// Periodic sweep of dead refresh-token rows. The endpoint exists too, but
/// routine hygiene should not depend on anyone calling it.
fn spawn_cleanup_task(cfg: &AppConfig, state: &Arc<AppState>) {
    let sessions = state.sessions.clone();
    let period = Duration::from_secs(cfg.cleanup_interval_secs);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            if let Err(err) = sessions.cleanup().await {
                tracing::warn!("scheduled refresh-token cleanup failed: {err}");
            }
        }
    });
}
