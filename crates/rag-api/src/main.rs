use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing::{error, info, warn};

use rag_core::cache::QueryCache;
use rag_core::db::{DbPool, PgVectorStore, Repository, VectorStore};
use rag_core::embedding::EmbeddingService;
use rag_core::key_pool::ApiKeyPool;
use rag_core::provider::{CerebrasClient, CohereClient, GeminiClient, GroqClient, ProviderClient, SambanovaClient};
use rag_core::router::{spawn_reset_task, RouterProviderConfig, WeightedRouter};
use rag_core::storage::{FileStorage, LocalFileStorage};

use rag_api::auth::JwtManager;
use rag_api::config::ApiSettings;
use rag_api::handlers;
use rag_api::state::AppState;

fn build_provider_client(name: &str) -> Arc<dyn ProviderClient> {
    match name.to_ascii_uppercase().as_str() {
        "GROQ" => Arc::new(GroqClient::new(None)),
        "GEMINI" => Arc::new(GeminiClient::new(None)),
        "COHERE" => Arc::new(CohereClient::new(None)),
        "CEREBRAS" => Arc::new(CerebrasClient::new(None)),
        "SAMBANOVA" => Arc::new(SambanovaClient::new(None)),
        other => {
            warn!("unrecognized provider '{other}', defaulting to Gemini-compatible client");
            Arc::new(GeminiClient::new(None))
        }
    }
}

fn build_router(settings: &ApiSettings) -> WeightedRouter {
    let providers = settings
        .engine
        .providers
        .iter()
        .map(|p| RouterProviderConfig {
            name: p.name.clone(),
            api_key: p.api_key.clone(),
            client: build_provider_client(&p.name),
            rpm: p.rpm,
        })
        .collect();

    WeightedRouter::new(
        providers,
        settings.engine.router.max_retries,
        settings.engine.router.retry_delay_ms,
        settings.engine.router.unavailable_threshold,
        settings.engine.router.cooldown_secs,
    )
}

fn spawn_keepalive(url: String, interval_ms: u64) {
    tokio::spawn(async move {
        let client = reqwest::Client::new();
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
        loop {
            ticker.tick().await;
            if let Err(e) = client.get(&url).send().await {
                warn!("keepalive ping to {url} failed: {e}");
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rag_api::logging::init()?;
    info!("starting query API");

    let settings = ApiSettings::load()?;
    info!("configuration loaded");

    let db_url = settings.engine.database.resolve_url()?;
    let db_pool = DbPool::new(
        &db_url,
        settings.engine.database.pool_max_size,
        settings.engine.database.pool_timeout_seconds,
    )
    .await?;
    info!("database connected");

    let repo = Repository::new(db_pool.clone());
    let vector_store: Arc<dyn VectorStore> = Arc::new(PgVectorStore::new(db_pool.clone()));

    let key_pool = Arc::new(ApiKeyPool::new(
        settings.engine.key_pool.keys.clone(),
        settings.engine.key_pool.bucket_capacity,
        settings.engine.key_pool.bucket_refill_per_sec,
        settings.engine.key_pool.max_consecutive_failures,
        settings.engine.key_pool.disable_duration_secs,
        settings.engine.key_pool.max_wait_ms,
    ));

    let embedding = Arc::new(EmbeddingService::new(
        settings.engine.embedding.base_url.clone(),
        settings.engine.embedding.model.clone(),
        settings.engine.embedding.dimension,
        settings.engine.embedding.batch_max,
        settings.engine.embedding.min_interval_ms,
        settings.engine.embedding.max_retries,
        key_pool,
    ));

    let router = Arc::new(build_router(&settings));
    spawn_reset_task(router.clone());

    let cache = Arc::new(QueryCache::new(
        repo.clone(),
        embedding.clone(),
        settings.engine.cache.semantic_threshold,
        settings.engine.cache.ttl_hours,
        settings.engine.cache.knn_limit,
    ));

    let storage: Arc<dyn FileStorage> =
        Arc::new(LocalFileStorage::new(std::env::var("STORAGE_DIR").map(std::path::PathBuf::from).unwrap_or_else(|_| std::path::PathBuf::from("./storage"))));

    let jwt = Arc::new(JwtManager::new(
        &settings.auth.jwt_secret,
        settings.auth.jwt_expiration_secs,
    ));

    if let Some(url) = settings.keepalive.url.clone() {
        spawn_keepalive(url, settings.keepalive.interval_ms);
    }

    let cors_origins = settings.cors.allowed_origins.clone();
    let host = settings.server.host.clone();
    let port = settings.server.port;

    let state = AppState {
        db_pool,
        repo,
        vector_store,
        embedding,
        router,
        cache,
        storage,
        jwt,
        settings: Arc::new(settings),
    };

    let cors = if cors_origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<axum::http::HeaderValue> = cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any)
    };

    let public_routes = Router::new()
        .route("/health/ping", get(handlers::health::ping))
        .route("/health/warmup", get(handlers::health::warmup))
        .route("/actuator/health", get(handlers::health::warmup))
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login));

    let protected_routes = Router::new()
        .route("/chats", post(handlers::chats::create).get(handlers::chats::list))
        .route(
            "/chats/{id}",
            get(handlers::chats::get)
                .put(handlers::chats::update)
                .delete(handlers::chats::delete),
        )
        .route("/documents/upload", post(handlers::documents::upload))
        .route("/documents/upload/bulk", post(handlers::documents::upload_bulk))
        .route("/documents", get(handlers::documents::list))
        .route("/documents/{id}/status", get(handlers::documents::status))
        .route("/documents/{id}", delete(handlers::documents::delete))
        .route("/query", post(handlers::query::ask))
        .route("/query/history", get(handlers::query::history));

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default().include_headers(false)))
        .layer(DefaultBodyLimit::max(rag_core::models::MAX_FILE_SIZE_BYTES as usize))
        .layer(axum::middleware::from_fn(rag_api::error::stamp_error_path))
        .with_state(state);

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    info!("listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let server = axum::serve(listener, app.into_make_service());
    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!("server error: {e}");
            }
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("failed to listen for shutdown signal: {e}");
            }
            info!("shutdown signal received");
        }
    }

    Ok(())
}
