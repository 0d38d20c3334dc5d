// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::infrastructure::durable_store::DurableStore;
use crate::presentation::handlers::{config_handler, events_handler, job_handler, queue_handler};
use crate::queue::orchestrator::QueueOrchestrator;
use axum::{
    routing::{delete, get, post},
    Extension, Router,
};
use std::sync::Arc;

/// 处理器共享的状态
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<QueueOrchestrator>,
    pub store: Arc<DurableStore>,
}

impl AppState {
    pub fn new(orchestrator: Arc<QueueOrchestrator>) -> Self {
        Self {
            store: orchestrator.store().clone(),
            orchestrator,
        }
    }
}

/// 创建应用路由
///
/// # 参数
///
/// * `state` - 编排器与存储
///
/// # 返回值
///
/// 返回配置好的路由
pub fn routes(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/v1/version", get(version));

    let queue_routes = Router::new()
        .route("/v1/queue", get(queue_handler::get_queue))
        .route("/v1/queue/start", post(queue_handler::start_queue))
        .route("/v1/queue/pause", post(queue_handler::pause_queue))
        .route("/v1/queue/resume", post(queue_handler::resume_queue))
        .route("/v1/queue/stop", post(queue_handler::stop_queue))
        .route("/v1/queue/selection", post(queue_handler::submit_selection))
        .route(
            "/v1/config",
            get(config_handler::get_config).put(config_handler::update_config),
        )
        .route("/v1/events", get(events_handler::stream_events));

    let job_routes = Router::new()
        .route(
            "/v1/jobs",
            get(job_handler::list_jobs).post(job_handler::enqueue_jobs),
        )
        .route("/v1/jobs/finished", delete(job_handler::delete_finished))
        .route("/v1/jobs/batch-label", post(job_handler::update_batch_label))
        .route("/v1/jobs/priority", post(job_handler::update_priority))
        .route(
            "/v1/jobs/{id}",
            delete(job_handler::delete_job).patch(job_handler::edit_job),
        )
        .route("/v1/jobs/{id}/duplicate", post(job_handler::duplicate_job))
        .route("/v1/history", get(job_handler::list_history));

    Router::new()
        .merge(public_routes)
        .merge(queue_routes)
        .merge(job_routes)
        .layer(Extension(state))
}

/// 健康检查端点
///
/// # 返回值
///
/// 返回"OK"字符串
pub async fn health_check() -> &'static str {
    "OK"
}

/// 版本信息端点
pub async fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
