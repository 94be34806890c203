//! 学习会话跟踪模块
//!
//! 维护 `Closed → Open → Closed` 的会话状态机：开启新会话时隐式
//! 关闭旧会话（会话永不重叠），会话进行中逐题累加计数，结束操作
//! 幂等。每次状态变化都通过仓储落库，页面重载后可恢复进行中的会话。

use chrono::{DateTime, Utc};

use crate::storage::models::{Direction, LearningSession};
use crate::storage::{SessionRepository, StorageResult};

/// 学习会话跟踪器
pub struct SessionTracker {
    repo: SessionRepository,
    user_id: String,
    current: Option<LearningSession>,
}

impl SessionTracker {
    /// 创建跟踪器并恢复进行中的会话（如有）
    ///
    /// # Arguments
    /// * `repo` - 会话仓储
    /// * `user_id` - 用户 ID
    pub fn resume(repo: SessionRepository, user_id: String) -> StorageResult<Self> {
        let current = repo.get_open(&user_id)?;

        if let Some(session) = &current {
            log::info!("恢复进行中的会话: {}", session.id);
        }

        Ok(Self {
            repo,
            user_id,
            current,
        })
    }

    /// 当前会话快照
    pub fn snapshot(&self) -> Option<LearningSession> {
        self.current.clone()
    }

    /// 开启新会话
    ///
    /// 已有进行中的会话时先将其关闭，再开启新会话。
    ///
    /// # Arguments
    /// * `direction` - 翻译方向
    /// * `now` - 开始时间
    ///
    /// # Returns
    /// * `LearningSession` - 新开启的会话
    pub fn start(
        &mut self,
        direction: Direction,
        now: DateTime<Utc>,
    ) -> StorageResult<LearningSession> {
        // 会话永不重叠：隐式关闭旧会话
        if let Some(previous) = self.close_current(now)? {
            log::info!("开启新会话前自动关闭旧会话: {}", previous.id);
        }

        let session = LearningSession::new(self.user_id.clone(), direction, now);
        self.repo.insert(&session)?;
        self.current = Some(session.clone());

        Ok(session)
    }

    /// 记录一次答题
    ///
    /// 没有进行中的会话时为空操作。
    ///
    /// # Returns
    /// * `Option<LearningSession>` - 更新后的会话快照
    pub fn record_answer(&mut self, correct: bool) -> StorageResult<Option<LearningSession>> {
        let session = match self.current.as_mut() {
            Some(session) => session,
            None => return Ok(None),
        };

        self.repo.record_answer(&session.id, correct)?;

        session.words_studied += 1;
        if correct {
            session.correct_answers += 1;
        }

        Ok(Some(session.clone()))
    }

    /// 结束当前会话（幂等）
    ///
    /// 没有进行中的会话时为空操作，不是错误。
    ///
    /// # Returns
    /// * `Option<LearningSession>` - 本次实际关闭的会话
    pub fn end(&mut self, now: DateTime<Utc>) -> StorageResult<Option<LearningSession>> {
        self.close_current(now)
    }

    /// 关闭当前会话并返回关闭后的快照
    fn close_current(&mut self, now: DateTime<Utc>) -> StorageResult<Option<LearningSession>> {
        let session = match self.current.take() {
            Some(session) => session,
            None => return Ok(None),
        };

        self.repo.close(&session.id, now)?;

        // 以数据库为准读回关闭后的状态
        let closed = self.repo.get(&session.id)?;
        Ok(closed)
    }
}
