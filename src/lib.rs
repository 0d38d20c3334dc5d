// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 应用程序模块
///
/// 命令接口使用的数据传输对象
pub mod application;

/// 配置模块
///
/// 处理应用程序的配置设置和环境变量
pub mod config;

/// 完成检测模块
///
/// 接口流量、页面结构和外部信号三路赛跑，为每次提交得出唯一结论
pub mod detector;

/// 领域模块
///
/// 包含核心业务实体、服务和仓库接口
pub mod domain;

/// 基础设施模块
///
/// 提供持久化存储、指标和外部通知
pub mod infrastructure;

/// 消息模块
///
/// 后台上下文与页面上下文之间的请求/回复通道
pub mod messaging;

/// 流量静默监控模块
pub mod monitor;

/// 表示层模块
///
/// 处理HTTP请求和响应，包括路由和处理器
pub mod presentation;

/// 队列模块
///
/// 队列状态机与启动恢复
pub mod queue;

/// 目标页面模块
///
/// 页面驱动接口及其浏览器实现
pub mod target;

/// 工具模块
///
/// 提供通用的工具函数和辅助功能
pub mod utils;

/// 工作器模块
///
/// 两个执行上下文各自的消息处理循环
pub mod workers;
