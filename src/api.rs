//! HTTP 接口（axum）
//!
//! - `POST /api/process`  `{"text": "...", "deep": false}` → Response
//! - `GET  /api/history?limit=N` → 最近 N 条执行记录
//! - `GET  /api/similar?text=...` → 相似的成功记录或 null
//! - `GET  /api/stats` → 分类统计
//! - `POST /api/health` → 所有 Worker 的健康检查结果

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router as HttpRouter,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::classifier::StatsSnapshot;
use crate::command::AgentKind;
use crate::history::ExecutionRecord;
use crate::router::{HealthStatus, Response, Router};

#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    pub text: String,
    #[serde(default)]
    pub deep: bool,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SimilarQuery {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub classifier: StatsSnapshot,
    pub log_entries: usize,
    pub agents: Vec<AgentKind>,
}

const DEFAULT_HISTORY_LIMIT: usize = 20;

pub fn create_router(router: Arc<Router>) -> HttpRouter {
    HttpRouter::new()
        .route("/api/process", post(process))
        .route("/api/history", get(history))
        .route("/api/similar", get(similar))
        .route("/api/stats", get(stats))
        .route("/api/health", post(health))
        .route("/health", get(|| async { "OK" }))
        .with_state(router)
}

/// 调度在独立任务中运行；客户端断开时取消，但仍会留下一条 Cancelled 记录
async fn process(
    State(router): State<Arc<Router>>,
    Json(req): Json<ProcessRequest>,
) -> Result<Json<Response>, StatusCode> {
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();

    let task = tokio::spawn(async move {
        if req.deep {
            router.process_deep(&req.text, &cancel).await
        } else {
            router.process_with_cancel(&req.text, &cancel).await
        }
    });

    let joined = task.await;
    guard.disarm();
    match joined {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            tracing::error!("Dispatch task failed: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn history(
    State(router): State<Arc<Router>>,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<ExecutionRecord>> {
    Json(router.history(query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT)))
}

async fn similar(
    State(router): State<Arc<Router>>,
    Query(query): Query<SimilarQuery>,
) -> Json<Option<ExecutionRecord>> {
    Json(router.find_similar(&query.text))
}

async fn stats(State(router): State<Arc<Router>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        classifier: router.stats(),
        log_entries: router.log().len(),
        agents: router.agents(),
    })
}

async fn health(State(router): State<Arc<Router>>) -> Json<Vec<HealthStatus>> {
    Json(router.health_check_all().await)
}
