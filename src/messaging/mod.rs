// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 消息模块
///
/// 后台上下文与页面上下文之间唯一的通信方式：有序的异步请求/回复通道，
/// 处理方可以任意推迟回复
pub mod channel;
pub mod messages;
pub mod target_link;
