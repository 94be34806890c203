//! 学习进度数据库操作模块
//!
//! 提供 WordProgress 的完整 CRUD 操作、批量查询、统计聚合，
//! 以及答题事件的原子落库路径。

use chrono::{DateTime, Utc};
use parole_algo::ReviewIntervals;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use crate::storage::models::{format_datetime, WordProgress};
use crate::storage::{StorageError, StorageResult};

// ============================================================
// ProgressStatistics - 学习统计数据
// ============================================================

/// 学习统计数据
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProgressStatistics {
    /// 学习过的单词总数
    pub total_words: i32,
    /// 总作答次数
    pub total_attempts: i64,
    /// 总正确次数
    pub total_correct: i64,
    /// 平均正确率
    pub accuracy: f64,
    /// 已掌握的单词数 (等级 5)
    pub mastered_words: i32,
    /// 学习中的单词数 (等级 1-4)
    pub words_in_progress: i32,
    /// 今日待复习数
    pub due_today: i32,
    /// 过期未复习数
    pub overdue: i32,
}

// ============================================================
// ProgressRepository - 学习进度仓储
// ============================================================

/// 学习进度仓储
///
/// 提供 WordProgress 的数据库操作方法
pub struct ProgressRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ProgressRepository {
    /// 创建新的仓储实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    // ========== 基本 CRUD 操作 ==========

    /// 获取单个进度记录
    ///
    /// # Arguments
    /// * `user_id` - 用户 ID
    /// * `word_id` - 单词 ID
    ///
    /// # Returns
    /// * `Option<WordProgress>` - 进度记录，如果不存在则返回 None
    pub fn get(&self, user_id: &str, word_id: &str) -> StorageResult<Option<WordProgress>> {
        let conn = self.get_connection()?;

        let progress = conn
            .query_row(
                "SELECT * FROM user_progress WHERE user_id = ?1 AND word_id = ?2",
                params![user_id, word_id],
                |row| WordProgress::from_row(row),
            )
            .optional()?;

        Ok(progress)
    }

    /// 获取用户的所有进度记录
    pub fn get_all_by_user(&self, user_id: &str) -> StorageResult<Vec<WordProgress>> {
        let conn = self.get_connection()?;

        let mut stmt = conn
            .prepare("SELECT * FROM user_progress WHERE user_id = ?1 ORDER BY updated_at DESC")?;

        let rows: Vec<WordProgress> = stmt
            .query_map(params![user_id], |row| WordProgress::from_row(row))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(rows)
    }

    /// 根据单词 ID 列表批量获取进度记录
    ///
    /// # Arguments
    /// * `user_id` - 用户 ID
    /// * `word_ids` - 单词 ID 列表
    pub fn get_by_word_ids(
        &self,
        user_id: &str,
        word_ids: &[String],
    ) -> StorageResult<Vec<WordProgress>> {
        if word_ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.get_connection()?;

        // 构建 IN 子句的占位符
        let placeholders: Vec<String> =
            (0..word_ids.len()).map(|i| format!("?{}", i + 2)).collect();
        let sql = format!(
            "SELECT * FROM user_progress WHERE user_id = ?1 AND word_id IN ({})",
            placeholders.join(", ")
        );

        let mut stmt = conn.prepare(&sql)?;

        let mut params_vec: Vec<&dyn rusqlite::ToSql> = vec![&user_id as &dyn rusqlite::ToSql];
        for word_id in word_ids {
            params_vec.push(word_id as &dyn rusqlite::ToSql);
        }

        let rows: Vec<WordProgress> = stmt
            .query_map(params_vec.as_slice(), |row| WordProgress::from_row(row))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(rows)
    }

    /// 保存进度记录 (插入或更新)
    pub fn save(&self, progress: &WordProgress) -> StorageResult<()> {
        let conn = self.get_connection()?;
        progress.upsert(&conn)?;
        Ok(())
    }

    // ========== 答题落库 ==========

    /// 应用一次答题事件
    ///
    /// 读取或创建进度记录，对计数器执行存储层原子自增
    /// (`SET x = x + 1`，而非读-改-写)，随后在同一事务内由
    /// 自增后的计数器重新推导掌握等级与下次复习时间。
    ///
    /// # Arguments
    /// * `user_id` - 用户 ID
    /// * `word_id` - 单词 ID
    /// * `correct` - 是否回答正确
    /// * `now` - 作答时间
    /// * `intervals` - 复习间隔表
    ///
    /// # Returns
    /// * `WordProgress` - 更新后的进度记录
    pub fn apply_answer(
        &self,
        user_id: &str,
        word_id: &str,
        correct: bool,
        now: DateTime<Utc>,
        intervals: &ReviewIntervals,
    ) -> StorageResult<WordProgress> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| StorageError::LockError(e.to_string()))?;

        let tx = conn.transaction()?;

        // 首次作答时创建零值行
        tx.execute(
            r#"
            INSERT OR IGNORE INTO user_progress (user_id, word_id, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?3)
            "#,
            params![user_id, word_id, format_datetime(now)],
        )?;

        // 原子自增计数器
        let column = if correct {
            "correct_count"
        } else {
            "wrong_count"
        };
        tx.execute(
            &format!(
                "UPDATE user_progress SET {} = {} + 1 WHERE user_id = ?1 AND word_id = ?2",
                column, column
            ),
            params![user_id, word_id],
        )?;

        // 由自增后的计数器重新推导
        let mut progress = tx.query_row(
            "SELECT * FROM user_progress WHERE user_id = ?1 AND word_id = ?2",
            params![user_id, word_id],
            |row| WordProgress::from_row(row),
        )?;
        progress.recompute(now, intervals);
        progress.upsert(&tx)?;

        tx.commit()?;
        Ok(progress)
    }

    /// 标记进度记录已同步
    pub fn mark_synced(&self, user_id: &str, word_id: &str) -> StorageResult<()> {
        let conn = self.get_connection()?;

        conn.execute(
            "UPDATE user_progress SET is_dirty = 0, synced_at = datetime('now')
             WHERE user_id = ?1 AND word_id = ?2",
            params![user_id, word_id],
        )?;

        Ok(())
    }

    // ========== 统计查询 ==========

    /// 获取学习统计数据
    ///
    /// # Arguments
    /// * `user_id` - 用户 ID
    ///
    /// # Returns
    /// * `ProgressStatistics` - 学习统计数据
    pub fn get_statistics(&self, user_id: &str) -> StorageResult<ProgressStatistics> {
        let conn = self.get_connection()?;
        let now = Utc::now();
        let today_start = format_datetime(
            now.date_naive()
                .and_hms_opt(0, 0, 0)
                .map(|dt| dt.and_utc())
                .unwrap_or(now),
        );
        let today_end = format_datetime(
            now.date_naive()
                .and_hms_opt(23, 59, 59)
                .map(|dt| dt.and_utc())
                .unwrap_or(now),
        );

        let mut stats = ProgressStatistics::default();

        stats.total_words = conn
            .query_row(
                "SELECT COUNT(*) FROM user_progress WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .unwrap_or(0);

        stats.mastered_words = conn
            .query_row(
                "SELECT COUNT(*) FROM user_progress WHERE user_id = ?1 AND mastery_level = 5",
                params![user_id],
                |row| row.get(0),
            )
            .unwrap_or(0);

        stats.words_in_progress = stats.total_words - stats.mastered_words;

        // 今日待复习
        stats.due_today = conn
            .query_row(
                r#"
            SELECT COUNT(*) FROM user_progress
            WHERE user_id = ?1
                AND next_review_at IS NOT NULL
                AND next_review_at >= ?2
                AND next_review_at <= ?3
            "#,
                params![user_id, today_start, today_end],
                |row| row.get(0),
            )
            .unwrap_or(0);

        // 过期未复习
        stats.overdue = conn
            .query_row(
                r#"
            SELECT COUNT(*) FROM user_progress
            WHERE user_id = ?1
                AND next_review_at IS NOT NULL
                AND next_review_at < ?2
            "#,
                params![user_id, today_start],
                |row| row.get(0),
            )
            .unwrap_or(0);

        // 聚合统计
        let (attempts, correct): (i64, i64) = conn
            .query_row(
                r#"
            SELECT
                COALESCE(SUM(correct_count + wrong_count), 0),
                COALESCE(SUM(correct_count), 0)
            FROM user_progress
            WHERE user_id = ?1
            "#,
                params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap_or((0, 0));

        stats.total_attempts = attempts;
        stats.total_correct = correct;
        stats.accuracy = if attempts > 0 {
            correct as f64 / attempts as f64
        } else {
            0.0
        };

        Ok(stats)
    }

    // ========== 辅助方法 ==========

    /// 获取数据库连接
    fn get_connection(&self) -> StorageResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::LockError(e.to_string()))
    }
}
