// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::time::Duration;

/// 重试策略配置
///
/// 第 n 次重试前等待 `initial_backoff * n`，不超过 `max_backoff`
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最大重试次数
    pub max_retries: u32,
    /// 初始退避时间
    pub initial_backoff: Duration,
    /// 最大退避时间
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// 完成上报的重试策略
    ///
    /// 页面上下文向后台上报任务结果时使用：最多重试3次，
    /// 依次等待 1s、2s、3s
    pub fn completion_report() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(3),
        }
    }

    /// 计算第 `attempt` 次重试（从1开始）之前的退避时间
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(attempt.max(1))
            .min(self.max_backoff)
    }

    /// 是否应该继续重试
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_report_backoff_is_linear() {
        let policy = RetryPolicy::completion_report();
        assert_eq!(policy.calculate_backoff(0), Duration::from_secs(1));
        assert_eq!(policy.calculate_backoff(1), Duration::from_secs(1));
        assert_eq!(policy.calculate_backoff(2), Duration::from_secs(2));
        assert_eq!(policy.calculate_backoff(3), Duration::from_secs(3));
        assert_eq!(policy.calculate_backoff(9), Duration::from_secs(3));
    }

    #[test]
    fn test_backoff_is_capped_for_large_attempts() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(1),
        };
        assert_eq!(policy.calculate_backoff(2), Duration::from_millis(500));
        assert_eq!(policy.calculate_backoff(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::completion_report();
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }
}
