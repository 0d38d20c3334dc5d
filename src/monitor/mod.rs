// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 监控模块
///
/// 根据目标自身遥测心跳的缺席推断生成完成，独立于完成检测器
pub mod silence_monitor;
