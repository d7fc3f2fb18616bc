use anyhow::Result;
use axum::{extract::{Path, Query, State}, http::StatusCode, routing::get, Json, Router};
use bsbi::{DocId, IndexError, Searcher};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer, AllowOrigin};
use tower_http::trace::TraceLayer;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
}
fn default_k() -> usize { 100 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_ms: u128,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
    /// Set when the query was rejected (stopword, bad syntax).
    pub diagnostic: Option<String>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub path: String,
}

#[derive(Clone)]
pub struct AppState {
    pub searcher: Arc<Mutex<Searcher>>,
}

pub fn build_app(index_dir: String) -> Result<Router> {
    // Dictionaries and the index directory are loaded once at startup
    let searcher = Searcher::open(&index_dir)?;
    tracing::info!(
        index = %index_dir,
        num_docs = searcher.num_docs(),
        num_terms = searcher.num_terms(),
        encoding = %searcher.encoding(),
        "index loaded"
    );
    let app_state = AppState { searcher: Arc::new(Mutex::new(searcher)) };

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());
    Ok(app)
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Result<Json<SearchResponse>, (StatusCode, String)> {
    let start = Instant::now();
    let outcome = state.searcher.lock().search(&params.q).map_err(internal_error)?;

    let total_hits = outcome.doc_ids.len();
    let k = params.k.clamp(1, 1000);
    let results = outcome
        .doc_ids
        .into_iter()
        .zip(outcome.documents)
        .take(k)
        .map(|(doc_id, path)| SearchHit { doc_id, path })
        .collect();

    let elapsed = start.elapsed();
    Ok(Json(SearchResponse {
        query: params.q,
        took_ms: elapsed.as_millis(),
        took_s: elapsed.as_secs_f64(),
        total_hits,
        results,
        diagnostic: outcome.diagnostic,
    }))
}

pub async fn doc_handler(State(state): State<AppState>, Path(doc_id): Path<DocId>) -> (StatusCode, Json<serde_json::Value>) {
    let searcher = state.searcher.lock();
    let Some(path) = searcher.doc_path(doc_id) else {
        return (StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "not found" })));
    };
    let mut obj = serde_json::json!({
        "doc_id": doc_id,
        "path": path,
    });
    // The collection may have moved since indexing; the text is best effort
    if let Some(root) = searcher.data_path() {
        if let Ok(text) = std::fs::read_to_string(root.join(path)) {
            obj["text"] = serde_json::Value::String(text);
        }
    }
    (StatusCode::OK, Json(obj))
}

fn internal_error(err: IndexError) -> (StatusCode, String) {
    tracing::error!(error = %err, "search failed");
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}
