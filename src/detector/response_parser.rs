// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde_json::Value;

use crate::domain::models::active_task::{GenerationRef, TargetTaskStatus, TaskSnapshot};
use crate::utils::errors::DetectionError;

const RATE_LIMIT_CODE: &str = "too_many_daily_tasks";

/// 任务创建与轮询接口的路径特征
#[derive(Debug, Clone, Default)]
pub struct EndpointPatterns {
    creation: Vec<String>,
    polling: Vec<String>,
}

impl EndpointPatterns {
    pub fn new(creation: Vec<String>, polling: Vec<String>) -> Self {
        Self { creation, polling }
    }

    /// 只比较路径部分，URL 无法解析时退回到整串匹配
    fn path_of(url: &str) -> String {
        url::Url::parse(url)
            .map(|parsed| parsed.path().to_string())
            .unwrap_or_else(|_| url.to_string())
    }

    pub fn is_creation(&self, url: &str) -> bool {
        let path = Self::path_of(url);
        self.creation.iter().any(|p| path.contains(p.as_str()))
    }

    pub fn is_polling(&self, url: &str) -> bool {
        let path = Self::path_of(url);
        self.polling.iter().any(|p| path.contains(p.as_str()))
    }

    /// 是否需要读取响应正文
    pub fn wants_body(&self, url: &str) -> bool {
        self.is_creation(url) || self.is_polling(url)
    }
}

/// 任务创建响应的解析结果
#[derive(Debug, Clone, PartialEq)]
pub enum CreationResult {
    /// 目标已接受并分配了任务 ID
    Created { task_id: String },
    /// 目标拒绝了任务
    Rejected(DetectionError),
    /// 无法识别的响应
    Unrecognized,
}

/// 解析任务创建响应
///
/// # 参数
///
/// * `status` - HTTP 状态码
/// * `body` - 响应正文，可能缺失
pub fn parse_creation(status: u16, body: Option<&str>) -> CreationResult {
    let parsed = body.and_then(|b| serde_json::from_str::<Value>(b).ok());

    if let Some(error) = parsed.as_ref().and_then(|v| v.get("error")) {
        if !error.is_null() {
            let code = error.get("code").and_then(Value::as_str).unwrap_or_default();
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return CreationResult::Rejected(DetectionError::TargetFailure {
                message,
                rate_limited: code == RATE_LIMIT_CODE,
            });
        }
    }

    if !(200..300).contains(&status) {
        return CreationResult::Rejected(DetectionError::TargetFailure {
            message: format!("task creation returned HTTP {}", status),
            rate_limited: status == 429,
        });
    }

    match parsed
        .as_ref()
        .and_then(|v| v.get("id"))
        .and_then(Value::as_str)
    {
        Some(id) => CreationResult::Created {
            task_id: id.to_string(),
        },
        None => CreationResult::Unrecognized,
    }
}

/// 解析轮询响应中的全部任务
///
/// 支持任务数组、`{task_responses: [...]}`、`{data: [{payload}]}` 以及单个任务对象
pub fn parse_polling(body: &str) -> Vec<TaskSnapshot> {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return Vec::new();
    };

    let tasks: Vec<&Value> = if let Some(array) = value.as_array() {
        array.iter().collect()
    } else if let Some(array) = value.get("task_responses").and_then(Value::as_array) {
        array.iter().collect()
    } else if let Some(array) = value.get("data").and_then(Value::as_array) {
        array
            .iter()
            .map(|entry| entry.get("payload").unwrap_or(entry))
            .collect()
    } else if value.get("id").is_some() && value.get("status").is_some() {
        vec![&value]
    } else {
        Vec::new()
    };

    tasks.into_iter().filter_map(parse_task).collect()
}

fn parse_task(task: &Value) -> Option<TaskSnapshot> {
    let task_id = task.get("id")?.as_str()?.to_string();
    let status = task
        .get("status")
        .and_then(Value::as_str)
        .map(TargetTaskStatus::from_target)
        .unwrap_or(TargetTaskStatus::Running);

    let progress = match task.get("progress_pct").and_then(Value::as_f64) {
        Some(fraction) => Some(fraction * 100.0),
        None => task.get("progress").and_then(Value::as_f64),
    };

    let generations = task
        .get("generations")
        .and_then(Value::as_array)
        .map(|list| list.iter().map(parse_generation).collect())
        .unwrap_or_default();

    Some(TaskSnapshot {
        task_id,
        status,
        progress,
        failure_reason: task
            .get("failure_reason")
            .and_then(Value::as_str)
            .map(str::to_string),
        generations,
    })
}

fn parse_generation(generation: &Value) -> GenerationRef {
    let text = |key: &str| generation.get(key).and_then(Value::as_str).map(str::to_string);
    let dimension = |key: &str| {
        generation
            .get(key)
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
    };

    let url = generation
        .pointer("/encodings/source/path")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| text("url"));

    GenerationRef {
        id: text("id"),
        url,
        media_kind: text("task_type"),
        width: dimension("width"),
        height: dimension("height"),
    }
}
