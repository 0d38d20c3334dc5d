// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{Extension, Json};
use tracing::info;
use validator::Validate;

use crate::application::dto::queue_request::{ConfigResponseDto, ConfigUpdateDto};
use crate::presentation::errors::AppError;
use crate::presentation::routes::AppState;

/// 读取运行时配置
pub async fn get_config(Extension(state): Extension<AppState>) -> Json<ConfigResponseDto> {
    Json(state.store.stored_config().await.into())
}

/// 更新运行时配置
pub async fn update_config(
    Extension(state): Extension<AppState>,
    Json(payload): Json<ConfigUpdateDto>,
) -> Result<Json<ConfigResponseDto>, AppError> {
    payload.validate()?;
    let config = state
        .store
        .update_stored_config(|config| {
            payload.apply(config);
            config.clone()
        })
        .await?;
    info!(
        min_delay_ms = config.min_delay_ms,
        max_delay_ms = config.max_delay_ms,
        "Stored config updated"
    );
    Ok(Json(config.into()))
}
