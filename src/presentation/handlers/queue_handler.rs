// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{Extension, Json};
use validator::Validate;

use crate::application::dto::queue_request::{QueueStateResponseDto, SelectionRequestDto};
use crate::presentation::errors::AppError;
use crate::presentation::routes::AppState;

async fn current_state(state: &AppState) -> Json<QueueStateResponseDto> {
    Json(state.store.queue_state().await.into())
}

/// 查询队列状态
pub async fn get_queue(Extension(state): Extension<AppState>) -> Json<QueueStateResponseDto> {
    current_state(&state).await
}

/// 启动队列
pub async fn start_queue(
    Extension(state): Extension<AppState>,
) -> Result<Json<QueueStateResponseDto>, AppError> {
    state.orchestrator.start().await?;
    Ok(current_state(&state).await)
}

/// 暂停队列
pub async fn pause_queue(
    Extension(state): Extension<AppState>,
) -> Result<Json<QueueStateResponseDto>, AppError> {
    state.orchestrator.pause().await?;
    Ok(current_state(&state).await)
}

/// 恢复队列
pub async fn resume_queue(
    Extension(state): Extension<AppState>,
) -> Result<Json<QueueStateResponseDto>, AppError> {
    state.orchestrator.resume().await?;
    Ok(current_state(&state).await)
}

/// 停止队列
pub async fn stop_queue(
    Extension(state): Extension<AppState>,
) -> Result<Json<QueueStateResponseDto>, AppError> {
    state.orchestrator.stop().await?;
    Ok(current_state(&state).await)
}

/// 只运行选中的任务
///
/// # 参数
///
/// * `payload` - 选中任务的 ID，非待处理的任务会被忽略
pub async fn submit_selection(
    Extension(state): Extension<AppState>,
    Json(payload): Json<SelectionRequestDto>,
) -> Result<Json<QueueStateResponseDto>, AppError> {
    payload.validate()?;
    state.orchestrator.submit_selected(payload.job_ids).await?;
    Ok(current_state(&state).await)
}
