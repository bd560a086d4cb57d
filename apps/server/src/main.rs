mod calendar;
mod changes;
mod config;
mod db;
mod handlers;
mod models;
mod rollover;
mod store;
mod telegram;
mod telegram_layer;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use chrono::FixedOffset;
use sqlx::postgres::PgPoolOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use config::{Config, StorageBackend};
use handlers::screenshot::ScreenshotRequest;
use store::{FileStore, PgStore, ScheduleStore, SupabaseStore};
use telegram::{ChatRoutes, ChatSender, TelegramClient};

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub store: Arc<dyn ScheduleStore>,
    pub sender: Arc<dyn ChatSender>,
    pub chat_routes: ChatRoutes,
    pub utc_offset: FixedOffset,
    pub static_dir: PathBuf,
    /// Screenshot the browser should capture and upload next.
    pub pending_screenshot: Mutex<Option<ScreenshotRequest>>,
    pub started_at: Instant,
}

/// Schedule documents carry the whole UI state; screenshots are base64 PNGs.
const BODY_LIMIT_BYTES: usize = 50 * 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // ── Config (read before tracing so TelegramLayer can use it) ──
    let config = Config::from_env()?;

    // ── Tracing: console + optional Telegram error alerts ──
    let env_filter = EnvFilter::from_default_env().add_directive("info".parse()?);
    let fmt_layer = tracing_subscriber::fmt::layer();
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    if let Some(alert_chat_id) = config.alert_chat_id {
        let tg_layer = telegram_layer::TelegramLayer::new(config.bot_token.clone(), alert_chat_id);
        registry.with(tg_layer).init();
    } else {
        registry.init();
    }

    // ── Datastore ──
    let store = open_store(&config.storage).await?;
    tracing::info!("Storage backend: {}", store.name());

    if config.chat_routes.is_empty() {
        tracing::warn!("TELEGRAM_CHAT_IDS not set — change notifications will not be delivered");
    } else {
        tracing::info!("Telegram notifications enabled for {} chats", config.chat_routes.len());
    }

    let state = Arc::new(AppState {
        store,
        sender: Arc::new(TelegramClient::new(config.bot_token.clone())),
        chat_routes: config.chat_routes.clone(),
        utc_offset: config.utc_offset,
        static_dir: config.static_dir.clone(),
        pending_screenshot: Mutex::new(None),
        started_at: Instant::now(),
    });

    // ── Background task: daily rollover at 04:00 local ──
    if config.rollover_enabled {
        tokio::spawn(rollover::run_daily(state.store.clone(), state.utc_offset));
    } else {
        tracing::warn!("ROLLOVER_ENABLED=false — the date window will not advance");
    }

    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Schedule server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn open_store(backend: &StorageBackend) -> anyhow::Result<Arc<dyn ScheduleStore>> {
    Ok(match backend {
        StorageBackend::Postgres { database_url } => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await?;
            db::run_migrations(&pool).await?;
            Arc::new(PgStore::new(pool))
        }
        StorageBackend::Supabase { url, anon_key } => {
            Arc::new(SupabaseStore::new(url, anon_key.clone()))
        }
        StorageBackend::File { path } => Arc::new(FileStore::new(path.clone())),
    })
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let static_files = ServeDir::new(&state.static_dir);

    Router::new()
        .route("/", get(handlers::health::root))
        .route("/health", get(handlers::health::health))
        .route("/api/health", get(handlers::health::health))
        .route(
            "/api/schedule",
            get(handlers::schedule::get_schedule).post(handlers::schedule::save_schedule),
        )
        .route("/api/activity", post(handlers::activity::add_activity))
        .route(
            "/api/screenshot",
            post(handlers::screenshot::upload_screenshot),
        )
        .route(
            "/api/screenshot/request",
            post(handlers::screenshot::request_screenshot),
        )
        .route(
            "/api/screenshot/pending",
            get(handlers::screenshot::pending_screenshot),
        )
        .fallback_service(static_files)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
