// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 目标页面模块
///
/// 定义页面驱动接口以及基于 chromiumoxide 的实现
pub mod chromium_driver;
pub mod driver;
