// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 工作器模块
///
/// 页面上下文与后台上下文各有一个工作器，两者只通过消息通道通信
pub mod background_worker;
pub mod target_worker;

pub use background_worker::BackgroundWorker;
pub use target_worker::TargetWorker;
