// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{extract::Path, http::StatusCode, Extension, Json};
use uuid::Uuid;
use validator::Validate;

use crate::application::dto::job_request::{
    BatchLabelRequestDto, EditJobRequestDto, EnqueueRequestDto, EnqueueResponseDto,
    PriorityRequestDto, UpdatedCountDto,
};
use crate::domain::models::job::JobRecord;
use crate::presentation::errors::AppError;
use crate::presentation::routes::AppState;

/// 列出全部任务
pub async fn list_jobs(Extension(state): Extension<AppState>) -> Json<Vec<JobRecord>> {
    Json(state.store.jobs().await)
}

/// 任务入队
///
/// # 参数
///
/// * `payload` - 新任务与插入位置
///
/// # 返回值
///
/// 返回新任务的 ID
pub async fn enqueue_jobs(
    Extension(state): Extension<AppState>,
    Json(payload): Json<EnqueueRequestDto>,
) -> Result<(StatusCode, Json<EnqueueResponseDto>), AppError> {
    payload.validate()?;
    let options = payload.insert_options()?;
    let jobs = payload
        .jobs
        .into_iter()
        .map(|input| input.into_record())
        .collect();

    let job_ids = state.orchestrator.enqueue(jobs, options).await?;
    Ok((StatusCode::CREATED, Json(EnqueueResponseDto { job_ids })))
}

/// 修改待处理任务的文本
pub async fn edit_job(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<EditJobRequestDto>,
) -> Result<StatusCode, AppError> {
    payload.validate()?;
    state.store.edit_text(id, payload.text).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// 复制任务，副本插入在原任务之后
pub async fn duplicate_job(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<JobRecord>), AppError> {
    let copy = state.store.duplicate_job(id).await?;
    Ok((StatusCode::CREATED, Json(copy)))
}

/// 删除任务
pub async fn delete_job(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if state.store.delete_job(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Ok(StatusCode::NOT_FOUND)
    }
}

/// 删除已完成和已失败的任务
pub async fn delete_finished(
    Extension(state): Extension<AppState>,
) -> Result<Json<UpdatedCountDto>, AppError> {
    let updated = state.store.delete_finished().await?;
    Ok(Json(UpdatedCountDto { updated }))
}

pub async fn update_batch_label(
    Extension(state): Extension<AppState>,
    Json(payload): Json<BatchLabelRequestDto>,
) -> Result<Json<UpdatedCountDto>, AppError> {
    payload.validate()?;
    let label = payload.batch_label.filter(|label| !label.trim().is_empty());
    let updated = state
        .store
        .update_batch_label(&payload.job_ids, label)
        .await?;
    Ok(Json(UpdatedCountDto { updated }))
}

pub async fn update_priority(
    Extension(state): Extension<AppState>,
    Json(payload): Json<PriorityRequestDto>,
) -> Result<Json<UpdatedCountDto>, AppError> {
    payload.validate()?;
    let updated = state
        .store
        .update_priority(&payload.job_ids, payload.priority)
        .await?;
    Ok(Json(UpdatedCountDto { updated }))
}

/// 历史记录，最新在前
pub async fn list_history(Extension(state): Extension<AppState>) -> Json<Vec<JobRecord>> {
    Json(state.store.history().await)
}
