use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::State;
use axum_auth::AuthBearer;
use log::info;

use super::error::{Result, Unauthorized};
use super::state::AppState;
use super::types::*;
use crate::error::EngineError;
use crate::index::{IndexHealth, IndexMetadata};
use crate::searcher;

fn check_token(state: &AppState, token: &str) -> Result<()> {
    if token != state.token {
        return Err(Unauthorized.into());
    }
    Ok(())
}

/// 按查询向量搜索相似记录
#[utoipa::path(
    post,
    path = "/search",
    request_body = SearchRequest,
    responses(
        (status = 200, body = SearchReply),
        (status = 400, description = "参数错误"),
        (status = 503, description = "索引为空"),
    )
)]
pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    Json(data): Json<SearchRequest>,
) -> Result<Json<SearchReply>> {
    let start = Instant::now();

    let k = usize::try_from(data.k)
        .ok()
        .filter(|&k| k > 0)
        .ok_or_else(|| EngineError::Validation(format!("k 必须为正整数: {}", data.k)))?;
    let mut request = searcher::SearchRequest::new(data.query_vector, k);
    if let Some(ctx) = data.demographic_context {
        request = request.context(ctx.into());
    }
    if let Some(weights) = data.weights {
        request = request.weights(weights);
    }

    let response = state.engine.search(request).await?;

    Ok(Json(SearchReply {
        results: response.results,
        fallback_used: response.fallback_used,
        time: start.elapsed().as_millis() as u64,
    }))
}

/// 获取索引状态
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, body = IndexHealth),
    )
)]
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<IndexHealth> {
    Json(state.engine.health())
}

/// 添加记录到数据库和索引
#[utoipa::path(
    post,
    path = "/records",
    request_body = AddRecordsRequest,
    responses(
        (status = 200, body = AddRecordsReply),
        (status = 409, description = "记录已存在"),
    ),
    security(("bearer" = []))
)]
pub async fn add_records_handler(
    State(state): State<Arc<AppState>>,
    AuthBearer(token): AuthBearer,
    Json(data): Json<AddRecordsRequest>,
) -> Result<Json<AddRecordsReply>> {
    check_token(&state, &token)?;
    let added = state.engine.add_records(data.records).await?;
    info!("通过 API 添加 {added} 条记录");
    Ok(Json(AddRecordsReply { added }))
}

/// 从数据库重建索引
#[utoipa::path(
    post,
    path = "/rebuild",
    responses(
        (status = 200, body = IndexMetadata),
    ),
    security(("bearer" = []))
)]
pub async fn rebuild_handler(
    State(state): State<Arc<AppState>>,
    AuthBearer(token): AuthBearer,
) -> Result<Json<IndexMetadata>> {
    check_token(&state, &token)?;
    Ok(Json(state.engine.rebuild().await?))
}

/// 将索引写入磁盘
#[utoipa::path(
    post,
    path = "/persist",
    responses(
        (status = 200, body = IndexMetadata),
    ),
    security(("bearer" = []))
)]
pub async fn persist_handler(
    State(state): State<Arc<AppState>>,
    AuthBearer(token): AuthBearer,
) -> Result<Json<IndexMetadata>> {
    check_token(&state, &token)?;
    Ok(Json(state.engine.persist().await?))
}
