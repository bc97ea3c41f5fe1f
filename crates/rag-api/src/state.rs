use std::sync::Arc;

use axum::extract::FromRef;
use rag_core::cache::QueryCache;
use rag_core::db::{DbPool, Repository, VectorStore};
use rag_core::embedding::EmbeddingService;
use rag_core::router::WeightedRouter;
use rag_core::storage::FileStorage;

use crate::auth::jwt::JwtManager;
use crate::config::ApiSettings;

/// Shared handler dependencies, mirroring the teacher's `AppState` but
/// wired through `FromRef` extractors instead of per-route `Extension`
/// layers, since every handler here needs most of these collaborators.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub repo: Repository,
    pub vector_store: Arc<dyn VectorStore>,
    pub embedding: Arc<EmbeddingService>,
    pub router: Arc<WeightedRouter>,
    pub cache: Arc<QueryCache>,
    pub storage: Arc<dyn FileStorage>,
    pub jwt: Arc<JwtManager>,
    pub settings: Arc<ApiSettings>,
}

impl FromRef<AppState> for Repository {
    fn from_ref(state: &AppState) -> Self {
        state.repo.clone()
    }
}

impl FromRef<AppState> for Arc<JwtManager> {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}

impl FromRef<AppState> for Arc<ApiSettings> {
    fn from_ref(state: &AppState) -> Self {
        state.settings.clone()
    }
}
