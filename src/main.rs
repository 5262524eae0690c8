use std::sync::Arc;
use std::time::Duration;

use chat_service::{
    auth::JwtTokenValidator,
    config::Config,
    db, error, logging,
    media::FilesystemMediaStore,
    routes,
    state::AppState,
    store::PgChatStore,
    websocket::{typing::TypingTracker, ConnectionRegistry},
};

#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    logging::init_tracing();
    let cfg = Arc::new(Config::from_env()?);

    let db = db::init_pool(&cfg.database_url)
        .await
        .map_err(|e| error::AppError::StartServer(format!("db: {e}")))?;
    db::MIGRATOR
        .run(&db)
        .await
        .map_err(|e| error::AppError::StartServer(format!("migrations: {e}")))?;

    let media = FilesystemMediaStore::new(&cfg.media_root, cfg.media_base_url.clone())?;

    let state = AppState {
        store: Arc::new(PgChatStore::new(db)),
        media: Arc::new(media),
        tokens: Arc::new(JwtTokenValidator::new(cfg.jwt_secret.as_bytes())),
        registry: ConnectionRegistry::new(),
        typing: TypingTracker::new(Duration::from_millis(cfg.typing_ttl_ms)),
        config: cfg.clone(),
    };

    let app = routes::build_router().with_state(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", cfg.port))
        .await
        .map_err(|e| error::AppError::StartServer(format!("bind: {e}")))?;

    tracing::info!(port = cfg.port, "starting chat-service");
    axum::serve(listener, app)
        .await
        .map_err(|e| error::AppError::StartServer(e.to_string()))?;

    Ok(())
}
