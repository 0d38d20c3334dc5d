// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::models::insert::InsertOptions;
use crate::domain::models::job::{DomainError, JobPriority, JobRecord, JobStatus};
use crate::domain::models::queue_state::QueueState;
use crate::domain::models::stored_config::StoredConfig;
use crate::domain::repositories::state_repository::StateRepository;
use crate::infrastructure::storage::InMemoryStorage;
use crate::utils::errors::StoreError;

const DEFAULT_HISTORY_LIMIT: usize = 1000;

/// 持久化状态的逻辑键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
    Config,
    Jobs,
    History,
    QueueState,
}

impl StoreKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKey::Config => "config",
            StoreKey::Jobs => "jobs",
            StoreKey::History => "history",
            StoreKey::QueueState => "queueState",
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 变更通知
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreChange {
    pub key: StoreKey,
}

struct Slot<T> {
    key: StoreKey,
    value: Mutex<T>,
}

impl<T> Slot<T> {
    fn new(key: StoreKey, value: T) -> Self {
        Self {
            key,
            value: Mutex::new(value),
        }
    }
}

/// 持久化存储
///
/// 每个逻辑键拥有独立的缓存和锁。所有写操作都在该键的锁内完成
/// 读取-合并-写入：先修改副本，持久化成功后再替换缓存并发布变更通知，
/// 持久化失败时缓存保持原值。
pub struct DurableStore {
    backend: Arc<dyn StateRepository>,
    config: Slot<StoredConfig>,
    jobs: Slot<Vec<JobRecord>>,
    history: Slot<Vec<JobRecord>>,
    queue_state: Slot<QueueState>,
    history_limit: usize,
    changes: broadcast::Sender<StoreChange>,
}

impl DurableStore {
    /// 打开存储并加载全部键
    ///
    /// # 参数
    ///
    /// * `backend` - 底层字节存储
    /// * `history_limit` - 历史记录保留条数
    /// * `seed` - 配置键不存在时写入的初始配置
    pub async fn open(
        backend: Arc<dyn StateRepository>,
        history_limit: usize,
        seed: StoredConfig,
    ) -> Result<Self, StoreError> {
        let config = match load::<StoredConfig>(backend.as_ref(), StoreKey::Config).await? {
            Some(config) => config,
            None => {
                backend
                    .save(StoreKey::Config.as_str(), &serde_json::to_vec(&seed)?)
                    .await?;
                debug!("Seeded stored config");
                seed
            }
        };
        let jobs = load(backend.as_ref(), StoreKey::Jobs).await?.unwrap_or_default();
        let history = load(backend.as_ref(), StoreKey::History)
            .await?
            .unwrap_or_default();
        let queue_state = load(backend.as_ref(), StoreKey::QueueState)
            .await?
            .unwrap_or_default();

        let (changes, _) = broadcast::channel(256);
        let store = Self {
            backend,
            config: Slot::new(StoreKey::Config, config),
            jobs: Slot::new(StoreKey::Jobs, jobs),
            history: Slot::new(StoreKey::History, history),
            queue_state: Slot::new(StoreKey::QueueState, queue_state),
            history_limit: history_limit.max(1),
            changes,
        };
        info!(
            jobs = store.jobs.value.lock().await.len(),
            "Durable store opened"
        );
        Ok(store)
    }

    /// 基于内存后端的空存储
    pub fn in_memory() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            backend: Arc::new(InMemoryStorage::new()),
            config: Slot::new(StoreKey::Config, StoredConfig::default()),
            jobs: Slot::new(StoreKey::Jobs, Vec::new()),
            history: Slot::new(StoreKey::History, Vec::new()),
            queue_state: Slot::new(StoreKey::QueueState, QueueState::default()),
            history_limit: DEFAULT_HISTORY_LIMIT,
            changes,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    async fn update_slot<T, R, F>(&self, slot: &Slot<T>, f: F) -> Result<R, StoreError>
    where
        T: Serialize + Clone,
        F: FnOnce(&mut T) -> Result<R, StoreError>,
    {
        let mut guard = slot.value.lock().await;
        let mut draft = guard.clone();
        let out = f(&mut draft)?;

        let bytes = serde_json::to_vec(&draft)?;
        self.backend.save(slot.key.as_str(), &bytes).await?;
        *guard = draft;
        drop(guard);

        // 没有订阅者时发送失败，可以忽略
        let _ = self.changes.send(StoreChange { key: slot.key });
        Ok(out)
    }

    // ---- jobs ----

    pub async fn jobs(&self) -> Vec<JobRecord> {
        self.jobs.value.lock().await.clone()
    }

    pub async fn job(&self, id: Uuid) -> Option<JobRecord> {
        self.jobs
            .value
            .lock()
            .await
            .iter()
            .find(|job| job.id == id)
            .cloned()
    }

    /// 在任务列表锁内执行读取-合并-写入
    pub async fn update_jobs<R, F>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Vec<JobRecord>) -> Result<R, StoreError>,
    {
        self.update_slot(&self.jobs, f).await
    }

    /// 更新单个任务，任务不存在时返回 `NotFound`
    pub async fn update_job<R, F>(&self, id: Uuid, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut JobRecord) -> Result<R, StoreError>,
    {
        self.update_jobs(|jobs| {
            let job = jobs
                .iter_mut()
                .find(|job| job.id == id)
                .ok_or(StoreError::NotFound(id))?;
            f(job)
        })
        .await
    }

    /// 按插入选项写入新任务，返回新任务的 ID
    pub async fn insert_jobs(
        &self,
        incoming: Vec<JobRecord>,
        options: &InsertOptions,
    ) -> Result<Vec<Uuid>, StoreError> {
        let ids: Vec<Uuid> = incoming.iter().map(|job| job.id).collect();
        self.update_jobs(|jobs| {
            options.apply(jobs, incoming, Utc::now())?;
            Ok(())
        })
        .await?;
        debug!(count = ids.len(), position = ?options.position, "Inserted jobs");
        Ok(ids)
    }

    pub async fn update_batch_label(
        &self,
        ids: &[Uuid],
        label: Option<String>,
    ) -> Result<usize, StoreError> {
        self.update_jobs(|jobs| {
            let mut touched = 0;
            for job in jobs.iter_mut().filter(|job| ids.contains(&job.id)) {
                job.batch_label = label.clone();
                touched += 1;
            }
            Ok(touched)
        })
        .await
    }

    pub async fn update_priority(
        &self,
        ids: &[Uuid],
        priority: Option<JobPriority>,
    ) -> Result<usize, StoreError> {
        self.update_jobs(|jobs| {
            let mut touched = 0;
            for job in jobs.iter_mut().filter(|job| ids.contains(&job.id)) {
                job.priority = priority;
                touched += 1;
            }
            Ok(touched)
        })
        .await
    }

    /// 修改任务文本，仅允许待处理任务
    pub async fn edit_text(&self, id: Uuid, text: String) -> Result<(), StoreError> {
        self.update_job(id, |job| {
            if job.status != JobStatus::Pending {
                return Err(DomainError::ValidationError(format!(
                    "job {} is {} and can no longer be edited",
                    id, job.status
                ))
                .into());
            }
            job.text = text;
            Ok(())
        })
        .await
    }

    /// 复制任务，副本以待处理状态插入在原任务之后
    pub async fn duplicate_job(&self, id: Uuid) -> Result<JobRecord, StoreError> {
        self.update_jobs(|jobs| {
            let index = jobs
                .iter()
                .position(|job| job.id == id)
                .ok_or(StoreError::NotFound(id))?;

            let original = &jobs[index];
            let mut copy = JobRecord::new(original.text.clone(), original.media_kind);
            copy.priority = original.priority;
            copy.batch_label = original.batch_label.clone();
            copy.aspect_ratio = original.aspect_ratio.clone();
            copy.variations = original.variations;
            copy.preset = original.preset.clone();
            copy.enhanced = original.enhanced;
            copy.attachment = original.attachment.clone();
            copy.inserted_at = Some(Utc::now());
            copy.inserted_after = Some(id);

            jobs.insert(index + 1, copy.clone());
            Ok(copy)
        })
        .await
    }

    /// 删除任务；列表被清空时同时重置队列计数
    pub async fn delete_job(&self, id: Uuid) -> Result<bool, StoreError> {
        let (removed, emptied) = self
            .update_jobs(|jobs| {
                let before = jobs.len();
                jobs.retain(|job| job.id != id);
                Ok((jobs.len() != before, jobs.is_empty()))
            })
            .await?;

        if removed && emptied {
            self.update_queue_state(|state| {
                state.processed_count = 0;
                state.total_count = 0;
                state.current_job_id = None;
            })
            .await?;
        }
        Ok(removed)
    }

    /// 删除全部已完成和已失败的任务，返回删除数量
    pub async fn delete_finished(&self) -> Result<usize, StoreError> {
        let removed = self
            .update_jobs(|jobs| {
                let before = jobs.len();
                jobs.retain(|job| !job.is_terminal());
                Ok(before - jobs.len())
            })
            .await?;

        if removed > 0 {
            self.update_queue_state(|state| {
                state.processed_count = state.processed_count.saturating_sub(removed as u32);
            })
            .await?;
        }
        Ok(removed)
    }

    /// 清空任务列表并重置队列计数
    pub async fn clear_jobs(&self) -> Result<(), StoreError> {
        self.update_jobs(|jobs| {
            jobs.clear();
            Ok(())
        })
        .await?;
        self.update_queue_state(|state| {
            state.processed_count = 0;
            state.total_count = 0;
            state.current_job_id = None;
        })
        .await
    }

    // ---- history ----

    /// 历史记录，最新在前
    pub async fn history(&self) -> Vec<JobRecord> {
        self.history.value.lock().await.clone()
    }

    pub async fn append_history(&self, record: JobRecord) -> Result<(), StoreError> {
        let limit = self.history_limit;
        self.update_slot(&self.history, |history| {
            history.retain(|entry| entry.id != record.id);
            history.insert(0, record);
            history.truncate(limit);
            Ok(())
        })
        .await
    }

    // ---- queue state ----

    pub async fn queue_state(&self) -> QueueState {
        self.queue_state.value.lock().await.clone()
    }

    pub async fn update_queue_state<R, F>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut QueueState) -> R,
    {
        self.update_slot(&self.queue_state, |state| Ok(f(state))).await
    }

    // ---- config ----

    pub async fn stored_config(&self) -> StoredConfig {
        self.config.value.lock().await.clone()
    }

    pub async fn update_stored_config<R, F>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut StoredConfig) -> R,
    {
        self.update_slot(&self.config, |config| Ok(f(config))).await
    }
}

async fn load<T: DeserializeOwned>(
    backend: &dyn StateRepository,
    key: StoreKey,
) -> Result<Option<T>, StoreError> {
    match backend.load(key.as_str()).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
#[path = "durable_store_test.rs"]
mod tests;
