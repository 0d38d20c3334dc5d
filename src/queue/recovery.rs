// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::models::job::JobStatus;
use crate::infrastructure::durable_store::DurableStore;
use crate::utils::errors::StoreError;

/// 启动恢复结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecoveryReport {
    /// 被退回待处理的任务数
    pub recovered: usize,
}

/// 启动恢复
///
/// 进程重启后不存在任何正在执行的生成，所有处理中的任务退回待处理，
/// 队列回到停止状态，等待用户重新启动。
pub struct StartupRecovery {
    store: Arc<DurableStore>,
}

impl StartupRecovery {
    pub fn new(store: Arc<DurableStore>) -> Self {
        Self { store }
    }

    /// 执行恢复，可重复执行
    pub async fn run(&self) -> Result<RecoveryReport, StoreError> {
        let recovered = self
            .store
            .update_jobs(|jobs| {
                let mut recovered = 0;
                for job in jobs
                    .iter_mut()
                    .filter(|job| job.status == JobStatus::Processing)
                {
                    job.revert_to_pending()?;
                    recovered += 1;
                }
                Ok(recovered)
            })
            .await?;

        let was_running = self
            .store
            .update_queue_state(|state| {
                let was_running = state.is_running;
                state.reset_to_stopped();
                was_running
            })
            .await?;

        if recovered > 0 {
            warn!(recovered, "Recovered interrupted jobs back to pending");
        }
        info!(was_running, "Startup recovery finished");
        Ok(RecoveryReport { recovered })
    }
}
