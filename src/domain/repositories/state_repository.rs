// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use thiserror::Error;

/// 存储错误类型
#[derive(Error, Debug)]
pub enum StorageError {
    /// IO错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// 其他存储错误
    #[error("Storage error: {0}")]
    Other(String),
}

/// 状态仓库特质
///
/// 以逻辑键为单位保存序列化后的状态块。实现只负责字节的读写，
/// 读-改-写的串行化由上层的持久化存储负责。
#[async_trait]
pub trait StateRepository: Send + Sync {
    /// 保存指定键的完整状态块，写入需原子完成
    async fn save(&self, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// 读取指定键的状态块，不存在时返回 None
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// 删除指定键
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}
