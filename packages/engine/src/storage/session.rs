//! 学习会话数据库操作模块
//!
//! 提供 LearningSession 的持久化操作：创建时插入、
//! 答题时原子更新计数、结束时幂等关闭。

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

use crate::storage::models::{format_datetime, LearningSession};
use crate::storage::{StorageError, StorageResult};

/// 学习会话仓储
pub struct SessionRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SessionRepository {
    /// 创建新的仓储实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    // ========== 基本操作 ==========

    /// 插入新会话
    pub fn insert(&self, session: &LearningSession) -> StorageResult<()> {
        let conn = self.get_connection()?;
        session.insert(&conn)?;
        Ok(())
    }

    /// 获取单个会话
    pub fn get(&self, session_id: &str) -> StorageResult<Option<LearningSession>> {
        let conn = self.get_connection()?;

        let session = conn
            .query_row(
                "SELECT * FROM learning_sessions WHERE id = ?1",
                params![session_id],
                |row| LearningSession::from_row(row),
            )
            .optional()?;

        Ok(session)
    }

    /// 获取用户当前进行中的会话
    ///
    /// 唯一索引保证每个用户最多存在一个进行中的会话。
    pub fn get_open(&self, user_id: &str) -> StorageResult<Option<LearningSession>> {
        let conn = self.get_connection()?;

        let session = conn
            .query_row(
                "SELECT * FROM learning_sessions WHERE user_id = ?1 AND ended_at IS NULL",
                params![user_id],
                |row| LearningSession::from_row(row),
            )
            .optional()?;

        Ok(session)
    }

    // ========== 会话内更新 ==========

    /// 记录一次答题
    ///
    /// 对会话计数器执行存储层原子自增。
    ///
    /// # Arguments
    /// * `session_id` - 会话 ID
    /// * `correct` - 是否回答正确
    pub fn record_answer(&self, session_id: &str, correct: bool) -> StorageResult<()> {
        let conn = self.get_connection()?;

        conn.execute(
            r#"
            UPDATE learning_sessions
            SET words_studied = words_studied + 1,
                correct_answers = correct_answers + ?2,
                updated_at = datetime('now')
            WHERE id = ?1 AND ended_at IS NULL
            "#,
            params![session_id, correct as i32],
        )?;

        Ok(())
    }

    /// 关闭会话（幂等）
    ///
    /// 已关闭的会话不受影响；`ended_at` 不会早于 `started_at`。
    ///
    /// # Arguments
    /// * `session_id` - 会话 ID
    /// * `ended_at` - 结束时间
    ///
    /// # Returns
    /// * `bool` - 本次调用是否实际关闭了会话
    pub fn close(&self, session_id: &str, ended_at: DateTime<Utc>) -> StorageResult<bool> {
        let conn = self.get_connection()?;

        let affected = conn.execute(
            r#"
            UPDATE learning_sessions
            SET ended_at = MAX(?2, started_at),
                updated_at = datetime('now')
            WHERE id = ?1 AND ended_at IS NULL
            "#,
            params![session_id, format_datetime(ended_at)],
        )?;

        Ok(affected > 0)
    }

    /// 标记会话已同步
    pub fn mark_synced(&self, session_id: &str) -> StorageResult<()> {
        let conn = self.get_connection()?;

        conn.execute(
            "UPDATE learning_sessions SET is_dirty = 0 WHERE id = ?1",
            params![session_id],
        )?;

        Ok(())
    }

    // ========== 辅助方法 ==========

    /// 获取数据库连接
    fn get_connection(&self) -> StorageResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::LockError(e.to_string()))
    }
}
