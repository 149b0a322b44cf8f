use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ftsearch_core::{Document, IndexError, IndexHandle, QueryEngine, QueryOptions};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
    /// Field weights as `field:weight` pairs separated by commas, e.g. `headline:2,text:1`.
    #[serde(default)]
    pub w: Option<String>,
}
fn default_k() -> usize { 10 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub generation: u64,
    pub took_ms: u128,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub doc_id: u32,
    pub score: f32,
    pub fields: Map<String, Value>,
    pub snippet: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub index: Arc<IndexHandle>,
    pub admin_token: Option<String>,
}

impl AppState {
    pub fn open(index_dir: &str, admin_token: Option<String>) -> Result<Self> {
        let index = IndexHandle::open(index_dir)?;
        tracing::info!(index_dir, generation = index.generation(), "opened index");
        Ok(Self { index: Arc::new(index), admin_token })
    }
}

/// Error body shared by every endpoint.
#[derive(Debug)]
pub struct ApiError(StatusCode, String);

impl From<IndexError> for ApiError {
    fn from(err: IndexError) -> Self {
        let status = match &err {
            IndexError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            IndexError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

pub fn build_app(index_dir: String) -> Result<Router> {
    let admin_token = std::env::var("ADMIN_TOKEN").ok();
    let state = AppState::open(&index_dir, admin_token)?;
    Ok(build_router(state))
}

pub fn build_router(state: AppState) -> Router {
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

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .route("/index/reload", post(reload_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Result<Json<SearchResponse>, ApiError> {
    let start = std::time::Instant::now();
    let k = params.k.clamp(1, 100);
    let mut options = QueryOptions::default().top_k(k);
    if let Some(pairs) = params.w.as_deref() {
        for (field, weight) in parse_weights(pairs)? {
            options = options.field_weight(field, weight);
        }
    }

    // Hold one snapshot for the whole request; a reload swaps in a new one for later requests.
    let generation = state.index.generation();
    let segment = state.index.segment();
    let ranked = QueryEngine::new(&segment).search(&params.q, &options)?;
    let total_hits = ranked.total_hits();

    let raw_terms: Vec<String> = params
        .q
        .split_whitespace()
        .map(|s| s.rsplit(':').next().unwrap_or(s).to_string())
        .collect();
    let results = ranked
        .into_hits(&segment)?
        .into_iter()
        .map(|hit| SearchHit {
            doc_id: hit.doc_id,
            score: hit.score,
            snippet: snippet(&hit.fields, &raw_terms),
            fields: fields_json(&hit.fields),
        })
        .collect();

    let elapsed = start.elapsed();
    tracing::debug!(query = %params.q, total_hits, "search served");
    Ok(Json(SearchResponse { query: params.q, generation, took_ms: elapsed.as_millis(), took_s: elapsed.as_secs_f64(), total_hits, results }))
}

pub async fn doc_handler(State(state): State<AppState>, Path(doc_id): Path<u32>) -> Result<Json<Value>, ApiError> {
    let segment = state.index.segment();
    let doc = segment.get_document(doc_id)?;
    Ok(Json(json!({ "doc_id": doc_id, "fields": fields_json(doc) })))
}

async fn reload_handler(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>, ApiError> {
    authorize(&state, &headers)?;
    let index = Arc::clone(&state.index);
    let generation = tokio::task::spawn_blocking(move || index.reload())
        .await
        .map_err(|e| ApiError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))??;
    Ok(Json(json!({ "generation": generation })))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err(ApiError(StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err(ApiError(StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}

fn parse_weights(pairs: &str) -> Result<Vec<(String, f32)>, ApiError> {
    pairs.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|pair| {
            let bad = || ApiError(StatusCode::BAD_REQUEST, format!("bad field weight `{pair}`, expected field:weight"));
            let (field, weight) = pair.trim().split_once(':').ok_or_else(bad)?;
            let weight: f32 = weight.parse().map_err(|_| bad())?;
            Ok((field.to_string(), weight))
        })
        .collect()
}

fn fields_json(doc: &Document) -> Map<String, Value> {
    doc.fields().iter().map(|f| (f.name.clone(), Value::String(f.value.clone()))).collect()
}

/// Take the longest stored field as the snippet source.
fn snippet(doc: &Document, raw_terms: &[String]) -> Option<String> {
    let text = doc.fields().iter().map(|f| f.value.as_str()).max_by_key(|v| v.len())?;
    if text.is_empty() { return None; }
    // find first match (case-insensitive) of any raw term
    let first_idx = raw_terms
        .iter()
        .filter(|t| !t.trim().is_empty())
        .find_map(|t| find_case_insensitive(text, t));
    let snippet = match first_idx {
        Some(idx) => {
            let start = floor_char_boundary(text, idx.saturating_sub(100));
            let end = floor_char_boundary(text, (idx + 200).min(text.len()));
            text[start..end].to_string()
        }
        None => text.chars().take(200).collect(),
    };
    Some(highlight_terms(&snippet, raw_terms))
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn find_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    let pat = regex::RegexBuilder::new(&regex::escape(needle)).case_insensitive(true).build().ok()?;
    pat.find(haystack).map(|m| m.start())
}

/// Wrap every query word in `<em>` in one pass, so inserted tags are never matched again.
fn highlight_terms(snippet: &str, terms: &[String]) -> String {
    let mut words: Vec<&str> = terms.iter().map(|t| t.trim()).filter(|t| !t.is_empty()).collect();
    if words.is_empty() { return snippet.to_string(); }
    // longest first so `banking` wins over `bank`
    words.sort_by_key(|w| std::cmp::Reverse(w.len()));
    let alternation = words.iter().map(|w| regex::escape(w)).collect::<Vec<_>>().join("|");
    let Ok(pat) = regex::RegexBuilder::new(&alternation).case_insensitive(true).build() else { return snippet.to_string() };
    pat.replace_all(snippet, |caps: &regex::Captures| format!("<em>{}</em>", &caps[0])).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_highlights_and_respects_char_boundaries() {
        let doc = Document::new().with_field("title", "Café").with_field("text", format!("{}Zürich banks rallied", "é".repeat(120)));
        let s = snippet(&doc, &["banks".to_string()]).unwrap();
        assert!(s.contains("<em>banks</em>"));
    }

    #[test]
    fn highlighting_does_not_touch_inserted_tags() {
        let s = highlight_terms("the cat sat", &["cat".to_string(), "em".to_string()]);
        assert_eq!(s, "the <em>cat</em> sat");
        let s = highlight_terms("Bank banking", &["bank".to_string(), "banking".to_string()]);
        assert_eq!(s, "<em>Bank</em> <em>banking</em>");
    }

    #[test]
    fn weights_parse() {
        let w = parse_weights("headline:2, text:0.5").unwrap();
        assert_eq!(w, vec![("headline".to_string(), 2.0), ("text".to_string(), 0.5)]);
        assert!(parse_weights("headline").is_err());
    }
}
