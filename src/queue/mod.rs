// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 队列模块
///
/// 负责任务的排队、派发和完成处理，以及进程启动时的恢复
pub mod orchestrator;
pub mod recovery;
