//! 游戏化状态数据库操作模块
//!
//! 提供 GamificationState 的持久化与成就解锁记录。
//! 状态缺失时惰性初始化为零值，读取永不失败。

use chrono::{DateTime, Utc};
use parole_algo::GamificationState;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

use crate::storage::models::{format_date, format_datetime, parse_date};
use crate::storage::{StorageError, StorageResult};

/// 游戏化状态仓储
pub struct GamificationRepository {
    conn: Arc<Mutex<Connection>>,
}

impl GamificationRepository {
    /// 创建新的仓储实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    // ========== 状态操作 ==========

    /// 读取用户状态，不存在时返回零值默认状态
    pub fn load_or_default(&self, user_id: &str) -> StorageResult<GamificationState> {
        let conn = self.get_connection()?;

        let state = conn
            .query_row(
                "SELECT total_xp, current_streak, longest_streak, last_activity_date
                 FROM gamification_state WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(GamificationState {
                        total_xp: row.get(0)?,
                        current_streak: row.get(1)?,
                        longest_streak: row.get(2)?,
                        last_activity_date: row
                            .get::<_, Option<String>>(3)?
                            .and_then(|s| parse_date(&s)),
                    })
                },
            )
            .optional()?;

        Ok(state.unwrap_or_default())
    }

    /// 保存用户状态 (插入或更新)
    pub fn save(&self, user_id: &str, state: &GamificationState) -> StorageResult<()> {
        let conn = self.get_connection()?;

        conn.execute(
            r#"
            INSERT INTO gamification_state (
                user_id, total_xp, current_streak, longest_streak,
                last_activity_date, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(user_id) DO UPDATE SET
                total_xp = excluded.total_xp,
                current_streak = excluded.current_streak,
                longest_streak = excluded.longest_streak,
                last_activity_date = excluded.last_activity_date,
                updated_at = excluded.updated_at
            "#,
            params![
                user_id,
                state.total_xp,
                state.current_streak,
                state.longest_streak,
                state.last_activity_date.map(format_date),
                format_datetime(Utc::now()),
            ],
        )?;

        Ok(())
    }

    // ========== 成就操作 ==========

    /// 获取用户已解锁的成就 ID 列表
    pub fn unlocked_ids(&self, user_id: &str) -> StorageResult<Vec<String>> {
        let conn = self.get_connection()?;

        let mut stmt = conn.prepare(
            "SELECT achievement_id FROM achievements WHERE user_id = ?1 ORDER BY unlocked_at",
        )?;

        let ids = stmt
            .query_map(params![user_id], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(ids)
    }

    /// 记录成就解锁（幂等）
    ///
    /// 重复解锁同一成就是空操作。
    ///
    /// # Returns
    /// * `bool` - 本次调用是否实际写入了新解锁
    pub fn record_unlock(
        &self,
        user_id: &str,
        achievement_id: &str,
        unlocked_at: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let conn = self.get_connection()?;

        let affected = conn.execute(
            "INSERT OR IGNORE INTO achievements (user_id, achievement_id, unlocked_at)
             VALUES (?1, ?2, ?3)",
            params![user_id, achievement_id, format_datetime(unlocked_at)],
        )?;

        Ok(affected > 0)
    }

    // ========== 辅助方法 ==========

    /// 获取数据库连接
    fn get_connection(&self) -> StorageResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::LockError(e.to_string()))
    }
}
