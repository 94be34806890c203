//! 离线事件队列数据库操作模块
//!
//! 持久化的追加日志：断网时进度事件在此排队，恢复连接后按
//! 原始顺序重放。游标（已重放的最大行 ID）保存在 sync_metadata
//! 中，重放中途崩溃后可从剩余队列头部继续，不会重复也不会丢失。

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use crate::storage::models::{PendingEvent, ProgressEvent};
use crate::storage::{StorageError, StorageResult};

/// 回放游标在 sync_metadata 中的键名
const REPLAY_CURSOR_KEY: &str = "replay_cursor";

/// 队列统计信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    /// 待重放数量
    pub pending: i64,
    /// 已重放数量
    pub replayed: i64,
    /// 发生过重放失败的数量
    pub failed: i64,
}

/// 离线事件队列仓储
pub struct EventQueueRepository {
    conn: Arc<Mutex<Connection>>,
}

impl EventQueueRepository {
    /// 创建新的仓储实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    // ========== 入队操作 ==========

    /// 将进度事件入队
    ///
    /// # Returns
    /// * `i64` - 新队列项的行 ID
    pub fn enqueue(&self, user_id: &str, event: &ProgressEvent) -> StorageResult<i64> {
        let item = PendingEvent::from_event(user_id, event)?;
        let conn = self.get_connection()?;
        item.enqueue(&conn)
    }

    // ========== 查询操作 ==========

    /// 查看待重放的队列项（按入队顺序）
    ///
    /// 返回游标之后的行，不修改队列。
    ///
    /// # Arguments
    /// * `limit` - 最大返回数量
    pub fn pending(&self, limit: i64) -> StorageResult<Vec<PendingEvent>> {
        let cursor = self.cursor()?;
        let conn = self.get_connection()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM pending_events
            WHERE id > ?1
            ORDER BY id ASC
            LIMIT ?2
            "#,
        )?;

        let items: Vec<PendingEvent> = stmt
            .query_map(params![cursor, limit], |row| PendingEvent::from_row(row))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(items)
    }

    /// 获取待重放数量
    pub fn pending_count(&self) -> StorageResult<i64> {
        let cursor = self.cursor()?;
        let conn = self.get_connection()?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pending_events WHERE id > ?1",
            params![cursor],
            |row| row.get(0),
        )?;

        Ok(count)
    }

    /// 获取队列统计信息
    pub fn stats(&self) -> StorageResult<QueueStats> {
        let cursor = self.cursor()?;
        let conn = self.get_connection()?;

        let pending: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM pending_events WHERE id > ?1",
                params![cursor],
                |row| row.get(0),
            )
            .unwrap_or(0);

        let replayed: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM pending_events WHERE id <= ?1",
                params![cursor],
                |row| row.get(0),
            )
            .unwrap_or(0);

        let failed: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM pending_events WHERE id > ?1 AND retry_count > 0",
                params![cursor],
                |row| row.get(0),
            )
            .unwrap_or(0);

        Ok(QueueStats {
            pending,
            replayed,
            failed,
        })
    }

    // ========== 游标操作 ==========

    /// 读取回放游标（已成功重放的最大行 ID）
    pub fn cursor(&self) -> StorageResult<i64> {
        let conn = self.get_connection()?;

        let value: Option<i64> = conn
            .query_row(
                "SELECT CAST(value AS INTEGER) FROM sync_metadata WHERE key = ?1",
                params![REPLAY_CURSOR_KEY],
                |row| row.get(0),
            )
            .ok();

        Ok(value.unwrap_or(0))
    }

    /// 推进回放游标
    ///
    /// 只在远端确认成功后调用；游标持久化，重放因此可断点续传。
    pub fn advance_cursor(&self, id: i64) -> StorageResult<()> {
        let conn = self.get_connection()?;

        conn.execute(
            r#"
            INSERT INTO sync_metadata (key, value, updated_at)
            VALUES (?1, ?2, datetime('now'))
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![REPLAY_CURSOR_KEY, id.to_string()],
        )?;

        Ok(())
    }

    // ========== 状态管理 ==========

    /// 记录一次重放失败
    ///
    /// 队列保持原样（不出队、不重排），仅累加重试次数。
    pub fn mark_failed(&self, id: i64, error: &str) -> StorageResult<()> {
        let conn = self.get_connection()?;

        conn.execute(
            r#"
            UPDATE pending_events
            SET retry_count = retry_count + 1,
                last_error = ?2
            WHERE id = ?1
            "#,
            params![id, error],
        )?;

        Ok(())
    }

    /// 清理已重放的队列项
    ///
    /// # Returns
    /// * `usize` - 删除的记录数
    pub fn clear_replayed(&self) -> StorageResult<usize> {
        let cursor = self.cursor()?;
        let conn = self.get_connection()?;

        let affected = conn.execute(
            "DELETE FROM pending_events WHERE id <= ?1",
            params![cursor],
        )?;

        Ok(affected)
    }

    // ========== 辅助方法 ==========

    /// 获取数据库连接
    fn get_connection(&self) -> StorageResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::LockError(e.to_string()))
    }
}
