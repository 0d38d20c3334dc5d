// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// 该模块定义了系统的核心业务实体，包括：
/// - 任务（job）：队列中的单条生成请求及其状态机
/// - 队列状态（queue_state）：队列运行、暂停、当前任务等单例状态
/// - 活动任务（active_task）：完成检测器内部跟踪的目标任务状态
/// - 插入选项（insert）：新任务进入队列的位置
/// - 持久化配置（stored_config）：可由操作员修改的运行参数
pub mod active_task;
pub mod insert;
pub mod job;
pub mod queue_state;
pub mod stored_config;
