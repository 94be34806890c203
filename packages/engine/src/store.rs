//! 进度存储编排模块
//!
//! 负责答题事件的完整落库路径：本地投影先行更新（UI 立即可见），
//! 远端提交带有限次重试，失败时事件进入持久化离线队列；恢复连接
//! 后按原始顺序严格重放，重放与实时提交走同一条原子自增路径，
//! 因此无论何时落盘最终状态一致。

use chrono::{DateTime, Utc};
use parole_algo::{GamificationState, ReviewIntervals, DEFAULT_DUE_SOON_WINDOW_DAYS};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::remote::{RemoteResult, RemoteStore};
use crate::storage::models::{LearningSession, ProgressEvent, WordProgress};
use crate::storage::{Storage, StorageError, StorageResult};

// ============================================================
// StoreConfig - 存储配置
// ============================================================

/// 存储配置
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// 瞬时错误的最大重试次数
    pub max_retries: u32,
    /// 重试间隔（毫秒）
    pub retry_delay_ms: u64,
    /// 重放批次大小
    pub batch_size: usize,
    /// "即将到期" 前瞻窗口（天）
    pub due_soon_window_days: i64,
    /// 复习间隔表
    pub intervals: ReviewIntervals,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1000,
            batch_size: 100,
            due_soon_window_days: DEFAULT_DUE_SOON_WINDOW_DAYS,
            intervals: ReviewIntervals::default(),
        }
    }
}

// ============================================================
// ReplayReport - 重放结果
// ============================================================

/// 重放结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayReport {
    pub success: bool,
    pub replayed_count: usize,
    pub remaining_count: i64,
    pub errors: Vec<String>,
    pub replayed_at: DateTime<Utc>,
}

impl Default for ReplayReport {
    fn default() -> Self {
        Self {
            success: true,
            replayed_count: 0,
            remaining_count: 0,
            errors: Vec::new(),
            replayed_at: Utc::now(),
        }
    }
}

// ============================================================
// ProgressStore - 进度存储
// ============================================================

/// 进度存储
///
/// 持有本地存储与远端客户端，绑定单个已认证用户。
pub struct ProgressStore<R: RemoteStore> {
    storage: Arc<Storage>,
    remote: R,
    config: StoreConfig,
    user_id: String,
}

impl<R: RemoteStore> ProgressStore<R> {
    /// 创建新的进度存储
    pub fn new(storage: Arc<Storage>, remote: R, user_id: String, config: StoreConfig) -> Self {
        Self {
            storage,
            remote,
            config,
            user_id,
        }
    }

    /// 获取本地存储
    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    /// 获取远端存储
    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// 获取配置
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// 获取用户 ID
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    // ========== 事件落库 ==========

    /// 应用一次进度事件
    ///
    /// 校验失败时不产生任何状态变更。本地投影总是先更新并返回；
    /// 远端不可达不是错误，事件会进入离线队列等待重放。
    ///
    /// # Arguments
    /// * `event` - 进度事件
    ///
    /// # Returns
    /// * `WordProgress` - 更新后的进度记录
    pub async fn apply_event(&self, event: &ProgressEvent) -> StorageResult<WordProgress> {
        if event.word_id.trim().is_empty() {
            return Err(StorageError::Validation("word_id 不能为空".to_string()));
        }

        // 本地投影先行更新
        let progress = self.storage.progress().apply_answer(
            &self.user_id,
            &event.word_id,
            event.correct,
            event.occurred_at,
            &self.config.intervals,
        )?;

        // 远端提交，失败时入队
        match self.push_with_retry(event).await {
            Ok(()) => {
                self.storage
                    .progress()
                    .mark_synced(&self.user_id, &event.word_id)?;
            }
            Err(e) => {
                let queue_id = self.storage.queue().enqueue(&self.user_id, event)?;
                log::warn!(
                    "远端不可用，事件已入队 [queue_id={}, word_id={}]: {}",
                    queue_id,
                    event.word_id,
                    e
                );
            }
        }

        Ok(progress)
    }

    /// 带重试的远端提交
    ///
    /// 离线直接返回（触发入队）；瞬时错误按配置重试，
    /// 次数耗尽后同样交给队列。
    async fn push_with_retry(&self, event: &ProgressEvent) -> RemoteResult<()> {
        let mut attempt: u32 = 0;

        loop {
            match self.remote.record_answer(&self.user_id, event).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_offline() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    if attempt > self.config.max_retries {
                        return Err(e);
                    }
                    log::debug!("上传失败，第 {} 次重试: {}", attempt, e);
                    tokio::time::sleep(std::time::Duration::from_millis(
                        self.config.retry_delay_ms,
                    ))
                    .await;
                }
            }
        }
    }

    // ========== 队列重放 ==========

    /// 重放离线队列
    ///
    /// 从游标处开始，严格按入队顺序逐条重放；任一事件失败即停止，
    /// 队列保持原样（不重排），下次调用从剩余队列头部继续。游标
    /// 仅在远端确认后推进，重放中途崩溃后恢复执行与一次性执行
    /// 到达相同的最终状态。
    pub async fn replay_pending(&self) -> StorageResult<ReplayReport> {
        let queue = self.storage.queue();
        let mut report = ReplayReport::default();

        loop {
            let batch = queue.pending(self.config.batch_size as i64)?;
            if batch.is_empty() {
                break;
            }

            for item in batch {
                let event = item.to_event()?;
                match self.remote.record_answer(&item.user_id, &event).await {
                    Ok(()) => {
                        queue.advance_cursor(item.id)?;
                        self.storage
                            .progress()
                            .mark_synced(&item.user_id, &event.word_id)?;
                        report.replayed_count += 1;
                    }
                    Err(e) => {
                        queue.mark_failed(item.id, &e.to_string())?;
                        report.success = false;
                        report
                            .errors
                            .push(format!("重放事件失败 [{}]: {}", item.event_id, e));
                        report.remaining_count = queue.pending_count()?;
                        report.replayed_at = Utc::now();

                        log::warn!(
                            "重放中断: 已完成 {} 条, 剩余 {} 条: {}",
                            report.replayed_count,
                            report.remaining_count,
                            e
                        );
                        return Ok(report);
                    }
                }
            }
        }

        // 队列清空后推送游戏化快照（字段均单调，后写覆盖安全）
        if report.replayed_count > 0 {
            let state = self.storage.gamification().load_or_default(&self.user_id)?;
            if let Err(e) = self.remote.upsert_gamification(&self.user_id, &state).await {
                log::warn!("游戏化快照上传失败: {}", e);
            }
        }

        report.remaining_count = 0;
        report.replayed_at = Utc::now();

        log::info!("重放完成: {} 条", report.replayed_count);
        Ok(report)
    }

    // ========== 尽力而为的推送 ==========

    /// 推送学习会话（尽力而为）
    ///
    /// 会话是可重建的聚合数据，失败仅记录日志，等待下次同步。
    pub async fn push_session(&self, session: &LearningSession) {
        match self.remote.upsert_session(session).await {
            Ok(()) => {
                if let Err(e) = self.storage.sessions().mark_synced(&session.id) {
                    log::warn!("标记会话已同步失败: {}", e);
                }
            }
            Err(e) => log::debug!("会话上传失败，等待下次同步: {}", e),
        }
    }

    /// 推送游戏化状态快照（尽力而为）
    pub async fn push_gamification(&self, state: &GamificationState) {
        if let Err(e) = self.remote.upsert_gamification(&self.user_id, state).await {
            log::debug!("游戏化状态上传失败，等待下次同步: {}", e);
        }
    }

    /// 推送成就解锁（尽力而为，服务端幂等）
    pub async fn push_achievement(&self, achievement_id: &str, unlocked_at: DateTime<Utc>) {
        if let Err(e) = self
            .remote
            .insert_achievement(&self.user_id, achievement_id, unlocked_at)
            .await
        {
            log::debug!("成就上传失败 [{}]: {}", achievement_id, e);
        }
    }
}

// ============================================================
// 测试
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteError;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;

    /// 内存版远端存储：可切换在线状态，可注入瞬时失败
    #[derive(Default)]
    struct MockRemote {
        online: AtomicBool,
        fail_next: AtomicU32,
        /// 通过在线检查的 record_answer 调用计数
        calls: AtomicU32,
        /// 在第 N 次调用时注入失败
        fail_on_calls: Mutex<Vec<u32>>,
        /// (user_id, word_id) → (correct_count, wrong_count)
        counters: Mutex<HashMap<(String, String), (i32, i32)>>,
        gamification_pushes: AtomicU32,
    }

    impl MockRemote {
        fn online() -> Self {
            let mock = Self::default();
            mock.online.store(true, Ordering::SeqCst);
            mock
        }

        fn offline() -> Self {
            Self::default()
        }

        fn set_online(&self, value: bool) {
            self.online.store(value, Ordering::SeqCst);
        }

        fn counters_for(&self, user_id: &str, word_id: &str) -> (i32, i32) {
            self.counters
                .lock()
                .unwrap()
                .get(&(user_id.to_string(), word_id.to_string()))
                .copied()
                .unwrap_or((0, 0))
        }
    }

    impl RemoteStore for MockRemote {
        async fn record_answer(&self, user_id: &str, event: &ProgressEvent) -> RemoteResult<()> {
            if !self.online.load(Ordering::SeqCst) {
                return Err(RemoteError::Offline);
            }
            let call_no = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_next.load(Ordering::SeqCst) > 0 {
                self.fail_next.fetch_sub(1, Ordering::SeqCst);
                return Err(RemoteError::Http(503));
            }
            if self.fail_on_calls.lock().unwrap().contains(&call_no) {
                return Err(RemoteError::Http(503));
            }

            // 模拟服务端的原子自增
            let mut counters = self.counters.lock().unwrap();
            let entry = counters
                .entry((user_id.to_string(), event.word_id.clone()))
                .or_insert((0, 0));
            if event.correct {
                entry.0 += 1;
            } else {
                entry.1 += 1;
            }
            Ok(())
        }

        async fn upsert_session(&self, _session: &LearningSession) -> RemoteResult<()> {
            if !self.online.load(Ordering::SeqCst) {
                return Err(RemoteError::Offline);
            }
            Ok(())
        }

        async fn upsert_gamification(
            &self,
            _user_id: &str,
            _state: &GamificationState,
        ) -> RemoteResult<()> {
            if !self.online.load(Ordering::SeqCst) {
                return Err(RemoteError::Offline);
            }
            self.gamification_pushes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn insert_achievement(
            &self,
            _user_id: &str,
            _achievement_id: &str,
            _unlocked_at: DateTime<Utc>,
        ) -> RemoteResult<()> {
            if !self.online.load(Ordering::SeqCst) {
                return Err(RemoteError::Offline);
            }
            Ok(())
        }
    }

    fn test_config() -> StoreConfig {
        StoreConfig {
            max_retries: 1,
            retry_delay_ms: 1,
            ..Default::default()
        }
    }

    fn setup(remote: MockRemote) -> ProgressStore<MockRemote> {
        let storage = Arc::new(Storage::in_memory().expect("Failed to create storage"));
        ProgressStore::new(storage, remote, "user-1".to_string(), test_config())
    }

    fn at_noon(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_apply_event_online_syncs_immediately() {
        let store = setup(MockRemote::online());

        let event = ProgressEvent::new("word-1", true, at_noon(1));
        let progress = store.apply_event(&event).await.expect("Apply should succeed");

        assert_eq!(progress.correct_count, 1);
        assert_eq!(progress.mastery_level, 1);
        // 在线时不入队，行已标记同步
        assert_eq!(store.storage().queue().pending_count().unwrap(), 0);
        let stored = store
            .storage()
            .progress()
            .get("user-1", "word-1")
            .unwrap()
            .unwrap();
        assert!(!stored.is_dirty);
    }

    #[tokio::test]
    async fn test_apply_event_rejects_blank_word_id() {
        let store = setup(MockRemote::online());

        let event = ProgressEvent::new("  ", true, at_noon(1));
        let result = store.apply_event(&event).await;

        assert!(matches!(result, Err(StorageError::Validation(_))));
        // 校验失败不产生任何状态变更
        assert_eq!(
            store.storage().progress().get_all_by_user("user-1").unwrap().len(),
            0
        );
    }

    #[tokio::test]
    async fn test_apply_event_offline_queues_and_returns_projection() {
        let store = setup(MockRemote::offline());

        let event = ProgressEvent::new("word-1", true, at_noon(1));
        let progress = store.apply_event(&event).await.expect("Apply should succeed");

        // 本地投影立即可见
        assert_eq!(progress.correct_count, 1);
        // 事件进入队列
        assert_eq!(store.storage().queue().pending_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_transient_error_retries_then_succeeds() {
        let remote = MockRemote::online();
        remote.fail_next.store(1, Ordering::SeqCst);
        let store = setup(remote);

        let event = ProgressEvent::new("word-1", true, at_noon(1));
        store.apply_event(&event).await.expect("Apply should succeed");

        // 重试后成功，不入队
        assert_eq!(store.storage().queue().pending_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_transient_errors_exhaust_retries_then_queue() {
        let remote = MockRemote::online();
        remote.fail_next.store(10, Ordering::SeqCst);
        let store = setup(remote);

        let event = ProgressEvent::new("word-1", true, at_noon(1));
        store.apply_event(&event).await.expect("Apply should succeed");

        // 重试耗尽后入队而非丢弃
        assert_eq!(store.storage().queue().pending_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_offline_replay_converges_to_live_state() {
        // 三条离线事件按原序重放后，远端计数与实时提交一致
        let store = setup(MockRemote::offline());

        store
            .apply_event(&ProgressEvent::new("word-1", true, at_noon(1)))
            .await
            .unwrap();
        store
            .apply_event(&ProgressEvent::new("word-1", false, at_noon(1)))
            .await
            .unwrap();
        store
            .apply_event(&ProgressEvent::new("word-2", true, at_noon(1)))
            .await
            .unwrap();

        assert_eq!(store.storage().queue().pending_count().unwrap(), 3);

        store.remote.set_online(true);
        let report = store.replay_pending().await.expect("Replay should succeed");

        assert!(report.success);
        assert_eq!(report.replayed_count, 3);
        assert_eq!(report.remaining_count, 0);
        assert_eq!(store.remote.counters_for("user-1", "word-1"), (1, 1));
        assert_eq!(store.remote.counters_for("user-1", "word-2"), (1, 0));
        // 本地投影与远端一致
        let local = store
            .storage()
            .progress()
            .get("user-1", "word-1")
            .unwrap()
            .unwrap();
        assert_eq!((local.correct_count, local.wrong_count), (1, 1));
        // 队列清空后推送了游戏化快照
        assert_eq!(store.remote.gamification_pushes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_replay_stops_on_failure_and_resumes_from_front() {
        let store = setup(MockRemote::offline());

        store
            .apply_event(&ProgressEvent::new("word-1", true, at_noon(1)))
            .await
            .unwrap();
        store
            .apply_event(&ProgressEvent::new("word-2", true, at_noon(1)))
            .await
            .unwrap();
        store
            .apply_event(&ProgressEvent::new("word-3", false, at_noon(1)))
            .await
            .unwrap();

        // 第一条成功后远端再次故障，模拟重放中断
        store.remote.set_online(true);
        store.remote.fail_on_calls.lock().unwrap().push(2);

        let report = store.replay_pending().await.expect("Replay should succeed");
        assert!(!report.success);
        assert_eq!(report.replayed_count, 1);
        assert_eq!(report.remaining_count, 2);

        // 恢复后从剩余队列头部继续，每条事件恰好应用一次
        let report = store.replay_pending().await.expect("Replay should succeed");
        assert!(report.success);
        assert_eq!(report.replayed_count, 2);

        assert_eq!(store.remote.counters_for("user-1", "word-1"), (1, 0));
        assert_eq!(store.remote.counters_for("user-1", "word-2"), (1, 0));
        assert_eq!(store.remote.counters_for("user-1", "word-3"), (0, 1));
        assert_eq!(store.storage().queue().pending_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_replay_empty_queue_is_noop() {
        let store = setup(MockRemote::online());

        let report = store.replay_pending().await.expect("Replay should succeed");
        assert!(report.success);
        assert_eq!(report.replayed_count, 0);
        // 空队列不触发快照推送
        assert_eq!(store.remote.gamification_pushes.load(Ordering::SeqCst), 0);
    }
}
