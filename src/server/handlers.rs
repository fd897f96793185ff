// HTTP request handlers
// Author: kelexine (https://github.com/kelexine)

use super::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;

use crate::cache::{SetOptions, SetOutcome};
use crate::error::StoreError;
use crate::license::FREE_MAX_ENTRIES;
use crate::similarity::{SearchOptions, SimilarityMatch};
use crate::storage::CacheStats;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub checks: HashMap<String, HealthCheck>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct HealthCheck {
    pub status: String,
    pub message: String,
}

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut checks = HashMap::new();
    let mut overall_status = HealthStatus::Healthy;

    let cache = state.cache.lock();
    let stats = cache.stats();

    // Check storage
    let storage_check = match &stats {
        Ok(stats) => HealthCheck {
            status: "ok".to_string(),
            message: format!(
                "{} backend, {} entries",
                cache.backend_kind(),
                stats.total_entries
            ),
        },
        Err(e) => {
            overall_status = HealthStatus::Unhealthy;
            HealthCheck {
                status: "error".to_string(),
                message: e.to_string(),
            }
        }
    };
    checks.insert("storage".to_string(), storage_check);

    // Check license tier and remaining free-tier headroom
    let license_check = if cache.is_pro() {
        HealthCheck {
            status: "ok".to_string(),
            message: "PRO tier, no entry limit".to_string(),
        }
    } else {
        let used = stats.as_ref().map(|s| s.total_entries).unwrap_or(0);
        let remaining = FREE_MAX_ENTRIES.saturating_sub(used);
        if remaining == 0 {
            overall_status = match overall_status {
                HealthStatus::Unhealthy => HealthStatus::Unhealthy,
                _ => HealthStatus::Degraded,
            };
            HealthCheck {
                status: "warning".to_string(),
                message: format!("FREE tier full ({FREE_MAX_ENTRIES} entries)"),
            }
        } else {
            HealthCheck {
                status: "ok".to_string(),
                message: format!("FREE tier, {remaining} entries remaining"),
            }
        }
    };
    checks.insert("license".to_string(), license_check);
    drop(cache);

    Json(HealthResponse {
        status: overall_status,
        checks,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Deserialize)]
pub struct SetRequest {
    pub prompt: String,
    pub response: String,
    pub model: Option<String>,
    pub ttl: Option<String>,
    pub tokens: Option<u64>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct SetResponse {
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Handler for `POST /v1/cache`. Limit rejections come back as 402 rather
/// than a store error: the request was valid, the tier was not.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<(StatusCode, Json<SetResponse>), StoreError> {
    let options = SetOptions {
        model: req
            .model
            .or_else(|| Some(state.config.cache.default_model.clone())),
        ttl: req.ttl.or_else(|| state.config.cache.default_ttl.clone()),
        tokens: req.tokens,
        tags: req.tags,
    };
    let outcome = state.cache.lock().set(&req.prompt, &req.response, options)?;
    let (status, body) = match outcome {
        SetOutcome::Inserted { hash } => (
            StatusCode::CREATED,
            SetResponse {
                outcome: "inserted",
                hash: Some(hash),
                reason: None,
            },
        ),
        SetOutcome::Updated { hash } => (
            StatusCode::OK,
            SetResponse {
                outcome: "updated",
                hash: Some(hash),
                reason: None,
            },
        ),
        SetOutcome::LimitExceeded { reason } => (
            StatusCode::PAYMENT_REQUIRED,
            SetResponse {
                outcome: "limit_exceeded",
                hash: None,
                reason: Some(reason.to_string()),
            },
        ),
    };
    Ok((status, Json(body)))
}

/// Handler for `GET /v1/cache/:hash`. A found entry counts as a hit, exactly
/// like a prompt lookup through the library.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Response, StoreError> {
    match state.cache.lock().get_by_hash(&hash)? {
        Some(entry) => Ok(Json(entry).into_response()),
        None => Ok(not_found(&hash)),
    }
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
    pub hash: String,
}

pub async fn delete_handler(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Response, StoreError> {
    if state.cache.lock().delete(&hash)? {
        Ok(Json(DeleteResponse {
            deleted: true,
            hash,
        })
        .into_response())
    } else {
        Ok(not_found(&hash))
    }
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub backend: String,
    pub pro: bool,
    #[serde(flatten)]
    pub stats: CacheStats,
}

pub async fn stats_handler(
    State(state): State<AppState>,
) -> Result<Json<StatsResponse>, StoreError> {
    let cache = state.cache.lock();
    let stats = cache.stats()?;
    Ok(Json(StatsResponse {
        backend: cache.backend_kind().to_string(),
        pro: cache.is_pro(),
        stats,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    /// Free-text query to match against cached prompts.
    pub q: String,
    pub threshold: Option<f64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub matches: Vec<SimilarityMatch>,
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, StoreError> {
    let options = SearchOptions {
        threshold: params.threshold.unwrap_or(state.config.search.threshold),
        limit: params.limit.unwrap_or(state.config.search.limit),
    };
    let matches = state.cache.lock().search(&params.q, &options)?;
    Ok(Json(SearchResponse {
        query: params.q,
        matches,
    }))
}

/// 404 body in the same error envelope `StoreError` responses use.
fn not_found(hash: &str) -> Response {
    let body = json!({
        "type": "error",
        "error": {
            "type": "not_found",
            "message": format!("no entry with hash {hash:?}"),
        }
    });
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}
