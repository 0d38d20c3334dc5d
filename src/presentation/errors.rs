// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::domain::models::job::DomainError;
use crate::utils::errors::{DeliveryError, QueueError, StoreError};

/// 应用错误类型
///
/// 封装所有可能的应用层错误，提供统一的错误处理接口
#[derive(Debug)]
pub struct AppError(anyhow::Error);

fn store_status(error: &StoreError) -> StatusCode {
    match error {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Insert(_) => StatusCode::BAD_REQUEST,
        StoreError::Domain(domain) => domain_status(domain),
        StoreError::Storage(_) | StoreError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn domain_status(error: &DomainError) -> StatusCode {
    match error {
        DomainError::ValidationError(_) => StatusCode::BAD_REQUEST,
        DomainError::InvalidStateTransition { .. } => StatusCode::CONFLICT,
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        if let Some(error) = self.0.downcast_ref::<QueueError>() {
            return match error {
                QueueError::Store(store) => store_status(store),
                QueueError::Domain(domain) => domain_status(domain),
                QueueError::Delivery(DeliveryError::Busy(_)) => StatusCode::CONFLICT,
                QueueError::Delivery(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
        }
        if let Some(error) = self.0.downcast_ref::<StoreError>() {
            return store_status(error);
        }
        if let Some(error) = self.0.downcast_ref::<DomainError>() {
            return domain_status(error);
        }
        if self.0.downcast_ref::<validator::ValidationErrors>().is_some() {
            return StatusCode::BAD_REQUEST;
        }
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
