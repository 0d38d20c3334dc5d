// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 基础设施层模块
///
/// 该模块包含系统的技术实现细节，提供对具体技术的抽象和封装。
///
/// 包含的子模块：
/// - 持久化存储（durable_store）：按逻辑键缓存、串行化读写并发布变更通知
/// - 指标（metrics）：Prometheus 导出器与指标名称
/// - 服务实现（services）：完成通知等外部服务
/// - 存储（storage）：本地文件与内存两种字节存储后端
///
/// 基础设施层依赖于领域层的抽象接口，领域层保持纯粹的业务逻辑。
pub mod durable_store;
pub mod metrics;
pub mod services;
pub mod storage;
