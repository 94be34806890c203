//! 进度引擎外观模块
//!
//! UI 层调用的唯一公共入口，组合进度存储、游戏化引擎与会话跟踪：
//! - `update_progress` - 提交一次答题并返回全部派生状态
//! - `start_session` / `end_session` - 会话生命周期
//! - `get_stats` / `get_due_words` - 只读聚合视图
//!
//! 同一单词的更新串行执行：后一次更新必须等待前一次的落库（或入队）
//! 完成，不同单词之间可以并发。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parole_algo::{
    classify, evaluate_unlocks, on_answer, priority_key, AchievementContext, AchievementDef,
    DueStatus, GamificationState,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;

use crate::remote::RemoteStore;
use crate::storage::models::{Direction, LearningSession, ProgressEvent, WordProgress};
use crate::storage::{QueueStats, Storage, StorageError, StorageResult};
use crate::store::{ProgressStore, ReplayReport, StoreConfig};
use crate::tracker::SessionTracker;

// ============================================================
// 回调接口
// ============================================================

/// 可选的进度回调接口
///
/// UI 可以通过它接收引擎内部的状态变化；不设置回调是完全受支持的
/// 配置，而非错误路径。
pub trait ProgressListener: Send + Sync {
    /// 单词掌握等级发生变化
    fn on_mastery_changed(&self, _word_id: &str, _old_level: i32, _new_level: i32) {}

    /// 成就解锁
    fn on_achievement_unlocked(&self, _achievement: &'static AchievementDef) {}
}

// ============================================================
// 视图类型
// ============================================================

/// 一次答题的完整结果
#[derive(Debug, Clone, Serialize)]
pub struct UpdateOutcome {
    /// 更新后的单词进度
    pub progress: WordProgress,
    /// 本次新解锁的成就
    pub unlocked: Vec<UnlockedAchievement>,
    /// 当前会话快照（无进行中的会话时为空）
    pub session: Option<LearningSession>,
    /// 更新后的游戏化状态
    pub gamification: GamificationState,
}

/// 新解锁的成就
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockedAchievement {
    pub id: String,
    pub title: String,
    pub xp_reward: i64,
}

/// 聚合学习统计
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressStats {
    /// 学习过的单词总数
    pub total_words_studied: i32,
    /// 平均正确率
    pub accuracy: f64,
    /// 当前连续学习天数
    pub current_streak: i32,
    /// 已掌握的单词数
    pub mastered_words: i32,
    /// 学习中的单词数
    pub words_in_progress: i32,
    /// 总作答次数
    pub total_attempts: i64,
}

/// 待复习单词分组视图（请求时计算，不持久化）
#[derive(Debug, Clone, Serialize)]
pub struct DueWordsBreakdown {
    /// 已过期
    pub overdue: Vec<WordProgress>,
    /// 今日到期
    pub due_today: Vec<WordProgress>,
    /// 即将到期
    pub due_soon: Vec<WordProgress>,
    /// 三组合计
    pub total: usize,
}

// ============================================================
// ProgressFacade - 进度引擎外观
// ============================================================

/// 进度引擎外观
///
/// 绑定单个已认证用户；泛型参数 `R` 为远端存储实现。
pub struct ProgressFacade<R: RemoteStore> {
    store: ProgressStore<R>,
    tracker: AsyncMutex<SessionTracker>,
    /// 游戏化状态为每次答题共享的单行，独立加锁
    gamification_lock: AsyncMutex<()>,
    /// 按单词惰性创建的串行化锁
    word_locks: std::sync::Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    listener: Option<Box<dyn ProgressListener>>,
}

impl<R: RemoteStore> ProgressFacade<R> {
    /// 创建新的外观实例
    ///
    /// 自动恢复进行中的会话（如有）。
    ///
    /// # Arguments
    /// * `storage` - 本地存储
    /// * `remote` - 远端存储实现
    /// * `user_id` - 已认证用户 ID
    /// * `config` - 存储配置
    pub fn new(
        storage: Arc<Storage>,
        remote: R,
        user_id: String,
        config: StoreConfig,
    ) -> StorageResult<Self> {
        if user_id.trim().is_empty() {
            return Err(StorageError::Validation("user_id 不能为空".to_string()));
        }

        let tracker = SessionTracker::resume(storage.sessions(), user_id.clone())?;
        let store = ProgressStore::new(storage, remote, user_id, config);

        Ok(Self {
            store,
            tracker: AsyncMutex::new(tracker),
            gamification_lock: AsyncMutex::new(()),
            word_locks: std::sync::Mutex::new(HashMap::new()),
            listener: None,
        })
    }

    /// 设置进度回调
    pub fn with_listener(mut self, listener: Box<dyn ProgressListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    // ========== 答题入口 ==========

    /// 提交一次答题
    ///
    /// 依次驱动进度存储、游戏化引擎与会话跟踪，返回更新后的进度、
    /// 新解锁的成就与会话快照。离线时进度保存在本地并排队，
    /// 对调用方不是错误。
    ///
    /// # Arguments
    /// * `word_id` - 单词 ID
    /// * `correct` - 是否回答正确
    pub async fn update_progress(&self, word_id: &str, correct: bool) -> StorageResult<UpdateOutcome> {
        if word_id.trim().is_empty() {
            return Err(StorageError::Validation("word_id 不能为空".to_string()));
        }

        // 同一单词的更新串行化
        let lock = self.word_lock(word_id)?;
        let _guard = lock.lock().await;

        let now = Utc::now();
        let progress_repo = self.store.storage().progress();
        let old_level = progress_repo
            .get(self.store.user_id(), word_id)?
            .map(|p| p.mastery_level)
            .unwrap_or(0);

        // 1. 进度落库（含离线入队）
        let event = ProgressEvent::new(word_id, correct, now);
        let progress = self.store.apply_event(&event).await?;

        // 2. 游戏化
        let (gamification, unlocked_defs) = self.apply_gamification(correct, now).await?;

        // 3. 会话
        let session = {
            let mut tracker = self.tracker.lock().await;
            tracker.record_answer(correct)?
        };

        // 4. 回调
        if let Some(listener) = &self.listener {
            if progress.mastery_level != old_level {
                listener.on_mastery_changed(word_id, old_level, progress.mastery_level);
            }
            for def in &unlocked_defs {
                listener.on_achievement_unlocked(def);
            }
        }

        let unlocked = unlocked_defs
            .iter()
            .map(|def| UnlockedAchievement {
                id: def.id.to_string(),
                title: def.title.to_string(),
                xp_reward: def.xp_reward,
            })
            .collect();

        Ok(UpdateOutcome {
            progress,
            unlocked,
            session,
            gamification,
        })
    }

    /// 应用游戏化更新并判定成就
    async fn apply_gamification(
        &self,
        correct: bool,
        now: chrono::DateTime<Utc>,
    ) -> StorageResult<(GamificationState, Vec<&'static AchievementDef>)> {
        let _guard = self.gamification_lock.lock().await;

        let user_id = self.store.user_id();
        let repo = self.store.storage().gamification();

        let state = repo.load_or_default(user_id)?;
        let mut next = on_answer(&state, correct, now);

        // 在累计进度上判定未解锁的成就
        let stats = self.store.storage().progress().get_statistics(user_id)?;
        let ctx = AchievementContext {
            total_correct: stats.total_correct,
            mastered_words: stats.mastered_words as i64,
            current_streak: next.current_streak,
        };
        let unlocked_ids = repo.unlocked_ids(user_id)?;
        let unlocked = evaluate_unlocks(&ctx, &unlocked_ids);

        for def in &unlocked {
            // INSERT OR IGNORE 保证解锁恰好一次
            if repo.record_unlock(user_id, def.id, now)? {
                next.total_xp += def.xp_reward;
                self.store.push_achievement(def.id, now).await;
            }
        }

        repo.save(user_id, &next)?;
        self.store.push_gamification(&next).await;

        Ok((next, unlocked))
    }

    // ========== 会话生命周期 ==========

    /// 开启学习会话
    ///
    /// 已有进行中的会话时先将其关闭（会话永不重叠）；锁保证开启
    /// 必须等待前一个关闭完成。
    pub async fn start_session(&self, direction: Direction) -> StorageResult<LearningSession> {
        let now = Utc::now();

        let (closed, session) = {
            let mut tracker = self.tracker.lock().await;
            let closed = tracker.end(now)?;
            let session = tracker.start(direction, now)?;
            (closed, session)
        };

        if let Some(closed) = &closed {
            self.store.push_session(closed).await;
        }
        self.store.push_session(&session).await;

        Ok(session)
    }

    /// 结束当前会话（幂等）
    pub async fn end_session(&self) -> StorageResult<Option<LearningSession>> {
        let closed = {
            let mut tracker = self.tracker.lock().await;
            tracker.end(Utc::now())?
        };

        if let Some(session) = &closed {
            self.store.push_session(session).await;
        }

        Ok(closed)
    }

    /// 当前会话快照
    pub async fn current_session(&self) -> Option<LearningSession> {
        self.tracker.lock().await.snapshot()
    }

    // ========== 只读视图 ==========

    /// 聚合学习统计
    ///
    /// 纯聚合，无副作用。
    pub fn get_stats(&self) -> StorageResult<ProgressStats> {
        let user_id = self.store.user_id();
        let stats = self.store.storage().progress().get_statistics(user_id)?;
        let gamification = self
            .store
            .storage()
            .gamification()
            .load_or_default(user_id)?;

        Ok(ProgressStats {
            total_words_studied: stats.total_words,
            accuracy: stats.accuracy,
            current_streak: gamification.current_streak,
            mastered_words: stats.mastered_words,
            words_in_progress: stats.words_in_progress,
            total_attempts: stats.total_attempts,
        })
    }

    /// 待复习单词分组视图
    ///
    /// 没有进度记录的候选词视为零级、始终到期；`NotDue` 的单词
    /// 不会出现在任何分组。各组按 "等级最低、练习最久远优先"
    /// 排序（从未练习的排在最前）。
    ///
    /// # Arguments
    /// * `candidate_ids` - 候选单词 ID（来自只读的词库目录）
    pub fn get_due_words(&self, candidate_ids: &[String]) -> StorageResult<DueWordsBreakdown> {
        let user_id = self.store.user_id();
        let now = Utc::now();
        let window = self.store.config().due_soon_window_days;

        let rows = self
            .store
            .storage()
            .progress()
            .get_by_word_ids(user_id, candidate_ids)?;
        let mut by_id: HashMap<String, WordProgress> = rows
            .into_iter()
            .map(|p| (p.word_id.clone(), p))
            .collect();

        let mut overdue = Vec::new();
        let mut due_today = Vec::new();
        let mut due_soon = Vec::new();

        for word_id in candidate_ids {
            let progress = by_id
                .remove(word_id)
                .unwrap_or_else(|| WordProgress::new(user_id.to_string(), word_id.clone()));

            match classify(progress.next_review_at, now, window) {
                DueStatus::Overdue => overdue.push(progress),
                DueStatus::DueToday => due_today.push(progress),
                DueStatus::DueSoon => due_soon.push(progress),
                DueStatus::NotDue => {}
            }
        }

        for bucket in [&mut overdue, &mut due_today, &mut due_soon] {
            bucket.sort_by_key(|p| priority_key(p.mastery_level, p.last_practiced));
        }

        let total = overdue.len() + due_today.len() + due_soon.len();

        Ok(DueWordsBreakdown {
            overdue,
            due_today,
            due_soon,
            total,
        })
    }

    // ========== 同步 ==========

    /// 重放离线队列
    pub async fn sync_pending(&self) -> StorageResult<ReplayReport> {
        self.store.replay_pending().await
    }

    /// 队列状态（供 UI 显示"离线，进度已保存在本地"提示）
    pub fn sync_status(&self) -> StorageResult<QueueStats> {
        self.store.storage().queue().stats()
    }

    // ========== 辅助方法 ==========

    /// 获取指定单词的串行化锁
    fn word_lock(&self, word_id: &str) -> StorageResult<Arc<AsyncMutex<()>>> {
        let mut locks = self
            .word_locks
            .lock()
            .map_err(|e| StorageError::LockError(e.to_string()))?;

        Ok(Arc::clone(
            locks
                .entry(word_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        ))
    }
}

// ============================================================
// 测试
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{RemoteError, RemoteResult};
    use chrono::{DateTime, Duration};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// 内存版远端存储：仅区分在线/离线
    #[derive(Default)]
    struct MockRemote {
        online: AtomicBool,
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

        fn check(&self) -> RemoteResult<()> {
            if self.online.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(RemoteError::Offline)
            }
        }
    }

    impl RemoteStore for MockRemote {
        async fn record_answer(&self, _user_id: &str, _event: &ProgressEvent) -> RemoteResult<()> {
            self.check()
        }

        async fn upsert_session(&self, _session: &LearningSession) -> RemoteResult<()> {
            self.check()
        }

        async fn upsert_gamification(
            &self,
            _user_id: &str,
            _state: &GamificationState,
        ) -> RemoteResult<()> {
            self.check()
        }

        async fn insert_achievement(
            &self,
            _user_id: &str,
            _achievement_id: &str,
            _unlocked_at: DateTime<Utc>,
        ) -> RemoteResult<()> {
            self.check()
        }
    }

    fn test_config() -> StoreConfig {
        StoreConfig {
            max_retries: 0,
            retry_delay_ms: 1,
            ..Default::default()
        }
    }

    fn setup(remote: MockRemote) -> ProgressFacade<MockRemote> {
        let storage = Arc::new(Storage::in_memory().expect("Failed to create storage"));
        ProgressFacade::new(storage, remote, "user-1".to_string(), test_config())
            .expect("Facade should build")
    }

    #[tokio::test]
    async fn test_first_answer_schedules_next_day() {
        let facade = setup(MockRemote::online());

        let outcome = facade
            .update_progress("word-1", true)
            .await
            .expect("Update should succeed");

        assert_eq!(outcome.progress.correct_count, 1);
        assert_eq!(outcome.progress.wrong_count, 0);
        assert_eq!(outcome.progress.mastery_level, 1);
        // 等级 1 → 最后练习时间 + 1 天
        let practiced = outcome.progress.last_practiced.unwrap();
        assert_eq!(
            outcome.progress.next_review_at,
            Some(practiced + Duration::days(1))
        );
    }

    #[tokio::test]
    async fn test_session_scenario() {
        let facade = setup(MockRemote::online());

        facade
            .start_session(Direction::RuIt)
            .await
            .expect("Start should succeed");
        facade.update_progress("word-1", true).await.unwrap();
        facade.update_progress("word-2", true).await.unwrap();
        facade.update_progress("word-3", false).await.unwrap();

        let closed = facade
            .end_session()
            .await
            .expect("End should succeed")
            .expect("Session should close");
        assert_eq!(closed.words_studied, 3);
        assert_eq!(closed.correct_answers, 2);

        // 重复结束为空操作
        let again = facade.end_session().await.unwrap();
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn test_first_correct_achievement_unlocks_once() {
        let facade = setup(MockRemote::online());

        let outcome = facade.update_progress("word-1", true).await.unwrap();
        let ids: Vec<_> = outcome.unlocked.iter().map(|a| a.id.as_str()).collect();
        assert!(ids.contains(&"first_correct"));
        // 答对 10 XP + 成就奖励 10 XP
        assert_eq!(outcome.gamification.total_xp, 20);

        // 再次答对不重复解锁
        let second = facade.update_progress("word-1", true).await.unwrap();
        assert!(second.unlocked.is_empty());
        assert_eq!(second.gamification.total_xp, 30);
    }

    #[tokio::test]
    async fn test_wrong_answer_grants_no_xp() {
        let facade = setup(MockRemote::online());

        let outcome = facade.update_progress("word-1", false).await.unwrap();
        assert!(outcome.unlocked.is_empty());
        assert_eq!(outcome.gamification.total_xp, 0);
        // 活动日仍然计入
        assert_eq!(outcome.gamification.current_streak, 1);
    }

    #[tokio::test]
    async fn test_get_stats_aggregation() {
        let facade = setup(MockRemote::online());

        // word-1 连对 5 次 → 已掌握
        for _ in 0..5 {
            facade.update_progress("word-1", true).await.unwrap();
        }
        facade.update_progress("word-2", false).await.unwrap();

        let stats = facade.get_stats().expect("Stats should succeed");
        assert_eq!(stats.total_words_studied, 2);
        assert_eq!(stats.mastered_words, 1);
        assert_eq!(stats.words_in_progress, 1);
        assert_eq!(stats.total_attempts, 6);
        assert_eq!(stats.current_streak, 1);
        assert!((stats.accuracy - 5.0 / 6.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_due_words_buckets_and_order() {
        let facade = setup(MockRemote::online());
        let user_id = "user-1";
        let repo = facade.store.storage().progress();
        let now = Utc::now();

        // 已过期：上次练习在 10 天前，等级 1（1 天间隔）
        let mut overdue = WordProgress::new(user_id.to_string(), "overdue".to_string());
        overdue.correct_count = 1;
        overdue.mastery_level = 1;
        overdue.last_practiced = Some(now - Duration::days(10));
        overdue.next_review_at = Some(now - Duration::days(9));
        repo.save(&overdue).unwrap();

        // 未到期：等级 5，29 天后复习
        let mut not_due = WordProgress::new(user_id.to_string(), "mastered".to_string());
        not_due.correct_count = 5;
        not_due.mastery_level = 5;
        not_due.last_practiced = Some(now - Duration::days(1));
        not_due.next_review_at = Some(now + Duration::days(29));
        repo.save(&not_due).unwrap();

        // 即将到期：等级 2，后天复习
        let mut soon = WordProgress::new(user_id.to_string(), "soon".to_string());
        soon.correct_count = 2;
        soon.mastery_level = 2;
        soon.last_practiced = Some(now - Duration::days(1));
        soon.next_review_at = Some(now + Duration::days(2));
        repo.save(&soon).unwrap();

        let candidates: Vec<String> = ["overdue", "mastered", "soon", "never-seen"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let breakdown = facade
            .get_due_words(&candidates)
            .expect("Due words should succeed");

        assert_eq!(breakdown.overdue.len(), 1);
        assert_eq!(breakdown.overdue[0].word_id, "overdue");
        // 无记录的候选词始终到期
        assert_eq!(breakdown.due_today.len(), 1);
        assert_eq!(breakdown.due_today[0].word_id, "never-seen");
        assert_eq!(breakdown.due_soon.len(), 1);
        // NotDue 不出现在任何分组
        assert_eq!(breakdown.total, 3);
    }

    #[tokio::test]
    async fn test_due_words_priority_within_bucket() {
        let facade = setup(MockRemote::online());
        let user_id = "user-1";
        let repo = facade.store.storage().progress();
        let now = Utc::now();

        // 同为过期：等级高的排后，等级相同时练习更久远的排前
        let mut strong = WordProgress::new(user_id.to_string(), "strong".to_string());
        strong.mastery_level = 3;
        strong.last_practiced = Some(now - Duration::days(30));
        strong.next_review_at = Some(now - Duration::days(23));
        repo.save(&strong).unwrap();

        let mut weak_recent = WordProgress::new(user_id.to_string(), "weak-recent".to_string());
        weak_recent.mastery_level = 1;
        weak_recent.last_practiced = Some(now - Duration::days(5));
        weak_recent.next_review_at = Some(now - Duration::days(4));
        repo.save(&weak_recent).unwrap();

        let mut weak_stale = WordProgress::new(user_id.to_string(), "weak-stale".to_string());
        weak_stale.mastery_level = 1;
        weak_stale.last_practiced = Some(now - Duration::days(20));
        weak_stale.next_review_at = Some(now - Duration::days(19));
        repo.save(&weak_stale).unwrap();

        let candidates: Vec<String> = ["strong", "weak-recent", "weak-stale"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let breakdown = facade.get_due_words(&candidates).unwrap();
        let order: Vec<_> = breakdown
            .overdue
            .iter()
            .map(|p| p.word_id.as_str())
            .collect();
        assert_eq!(order, vec!["weak-stale", "weak-recent", "strong"]);
    }

    #[tokio::test]
    async fn test_offline_update_reports_queue_status() {
        let facade = setup(MockRemote::offline());

        let outcome = facade.update_progress("word-1", true).await.unwrap();
        // 本地投影立即可见
        assert_eq!(outcome.progress.correct_count, 1);

        let status = facade.sync_status().unwrap();
        assert_eq!(status.pending, 1);

        // 恢复连接后重放
        facade.store.remote().online.store(true, Ordering::SeqCst);
        let report = facade.sync_pending().await.unwrap();
        assert!(report.success);
        assert_eq!(report.replayed_count, 1);
        assert_eq!(facade.sync_status().unwrap().pending, 0);
    }

    #[tokio::test]
    async fn test_validation_rejects_blank_word() {
        let facade = setup(MockRemote::online());

        let result = facade.update_progress("", true).await;
        assert!(matches!(result, Err(StorageError::Validation(_))));
    }

    #[tokio::test]
    async fn test_listener_receives_callbacks() {
        #[derive(Default)]
        struct TestListener {
            mastery_changes: Mutex<Vec<(String, i32, i32)>>,
            unlocks: Mutex<Vec<&'static str>>,
        }

        impl ProgressListener for TestListener {
            fn on_mastery_changed(&self, word_id: &str, old_level: i32, new_level: i32) {
                self.mastery_changes
                    .lock()
                    .unwrap()
                    .push((word_id.to_string(), old_level, new_level));
            }

            fn on_achievement_unlocked(&self, achievement: &'static AchievementDef) {
                self.unlocks.lock().unwrap().push(achievement.id);
            }
        }

        let listener = Arc::new(TestListener::default());

        struct Forward(Arc<TestListener>);
        impl ProgressListener for Forward {
            fn on_mastery_changed(&self, word_id: &str, old_level: i32, new_level: i32) {
                self.0.on_mastery_changed(word_id, old_level, new_level);
            }
            fn on_achievement_unlocked(&self, achievement: &'static AchievementDef) {
                self.0.on_achievement_unlocked(achievement);
            }
        }

        let storage = Arc::new(Storage::in_memory().unwrap());
        let facade = ProgressFacade::new(
            storage,
            MockRemote::online(),
            "user-1".to_string(),
            test_config(),
        )
        .unwrap()
        .with_listener(Box::new(Forward(Arc::clone(&listener))));

        facade.update_progress("word-1", true).await.unwrap();

        assert_eq!(
            listener.mastery_changes.lock().unwrap().as_slice(),
            &[("word-1".to_string(), 0, 1)]
        );
        assert_eq!(listener.unlocks.lock().unwrap().as_slice(), &["first_correct"]);
    }
}
