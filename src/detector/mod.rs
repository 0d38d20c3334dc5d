// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 完成检测模块
///
/// 将接口响应、页面结构和流量静默三种不可靠的信号合成为一个可信的完成结论：
/// - 信号源接口与共享上下文（traits）
/// - 一次性闩锁与开始确认闸门（latch）
/// - 接口响应解析（response_parser）
/// - 三个信号源（api_watcher、structural_watcher、external_source）
/// - 赛跑与超时（completion_detector）
pub mod api_watcher;
pub mod completion_detector;
pub mod external_source;
pub mod latch;
pub mod response_parser;
pub mod structural_watcher;
pub mod traits;
