//! 数据模型定义
//!
//! 定义进度引擎所需的所有数据结构，以及与数据库交互的方法。

use chrono::{DateTime, NaiveDate, Utc};
use parole_algo::{compute_mastery_level, next_review_date, ReviewIntervals};
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use serde::{Deserialize, Serialize};

use crate::storage::StorageResult;

// ============================================================
// Direction - 翻译方向
// ============================================================

/// 翻译方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    /// 俄语 → 意大利语
    RuIt,
    /// 意大利语 → 俄语
    ItRu,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RuIt => "ru-it",
            Self::ItRu => "it-ru",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ru-it" => Some(Self::RuIt),
            "it-ru" => Some(Self::ItRu),
            _ => None,
        }
    }
}

// ============================================================
// WordProgress - 单词学习进度
// ============================================================

/// 单词学习进度
///
/// 每个 (用户, 单词) 一行。掌握等级与下次复习时间始终由
/// 计数器推导，见 [`WordProgress::recompute`]。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordProgress {
    /// 用户 ID
    pub user_id: String,
    /// 单词 ID
    pub word_id: String,
    /// 正确次数
    pub correct_count: i32,
    /// 错误次数
    pub wrong_count: i32,
    /// 掌握等级 (0-5)
    pub mastery_level: i32,
    /// 最后练习时间（首次作答前为空）
    pub last_practiced: Option<DateTime<Utc>>,
    /// 下次复习时间（推导值）
    pub next_review_at: Option<DateTime<Utc>>,
    /// 是否有未同步的修改
    pub is_dirty: bool,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 更新时间
    pub updated_at: DateTime<Utc>,
    /// 最后同步时间
    pub synced_at: Option<DateTime<Utc>>,
}

impl WordProgress {
    /// 创建新的进度记录（尚无任何作答）
    pub fn new(user_id: String, word_id: String) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            word_id,
            correct_count: 0,
            wrong_count: 0,
            mastery_level: 0,
            last_practiced: None,
            next_review_at: None,
            is_dirty: true,
            created_at: now,
            updated_at: now,
            synced_at: None,
        }
    }

    /// 总作答次数
    pub fn total_attempts(&self) -> i32 {
        self.correct_count + self.wrong_count
    }

    /// 重新推导掌握等级与下次复习时间
    ///
    /// 在计数器变化后调用；`now` 同时作为最后练习时间。
    pub fn recompute(&mut self, now: DateTime<Utc>, intervals: &ReviewIntervals) {
        self.mastery_level = compute_mastery_level(self.correct_count, self.wrong_count);
        self.last_practiced = Some(now);
        self.next_review_at = Some(next_review_date(intervals, self.mastery_level, now));
        self.is_dirty = true;
        self.updated_at = now;
    }

    /// 从数据库行解析
    pub fn from_row(row: &Row) -> SqliteResult<Self> {
        Ok(Self {
            user_id: row.get("user_id")?,
            word_id: row.get("word_id")?,
            correct_count: row.get("correct_count")?,
            wrong_count: row.get("wrong_count")?,
            mastery_level: row.get("mastery_level")?,
            last_practiced: row
                .get::<_, Option<String>>("last_practiced")?
                .map(parse_datetime),
            next_review_at: row
                .get::<_, Option<String>>("next_review_at")?
                .map(parse_datetime),
            is_dirty: row.get::<_, i32>("is_dirty")? != 0,
            created_at: parse_datetime(row.get::<_, String>("created_at")?),
            updated_at: parse_datetime(row.get::<_, String>("updated_at")?),
            synced_at: row
                .get::<_, Option<String>>("synced_at")?
                .map(parse_datetime),
        })
    }

    /// 插入或更新 (upsert)
    pub fn upsert(&self, conn: &Connection) -> StorageResult<()> {
        conn.execute(
            r#"
            INSERT INTO user_progress (
                user_id, word_id, correct_count, wrong_count, mastery_level,
                last_practiced, next_review_at, is_dirty,
                created_at, updated_at, synced_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11
            )
            ON CONFLICT(user_id, word_id) DO UPDATE SET
                correct_count = excluded.correct_count,
                wrong_count = excluded.wrong_count,
                mastery_level = excluded.mastery_level,
                last_practiced = excluded.last_practiced,
                next_review_at = excluded.next_review_at,
                is_dirty = excluded.is_dirty,
                updated_at = excluded.updated_at,
                synced_at = excluded.synced_at
            "#,
            params![
                self.user_id,
                self.word_id,
                self.correct_count,
                self.wrong_count,
                self.mastery_level,
                self.last_practiced.map(format_datetime),
                self.next_review_at.map(format_datetime),
                self.is_dirty as i32,
                format_datetime(self.created_at),
                format_datetime(self.updated_at),
                self.synced_at.map(format_datetime),
            ],
        )?;
        Ok(())
    }
}

// ============================================================
// LearningSession - 学习会话
// ============================================================

/// 学习会话
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningSession {
    /// 会话唯一标识 (UUID)
    pub id: String,
    /// 用户 ID
    pub user_id: String,
    /// 开始时间
    pub started_at: DateTime<Utc>,
    /// 结束时间（进行中为空）
    pub ended_at: Option<DateTime<Utc>>,
    /// 本次会话学习的单词数
    pub words_studied: i32,
    /// 本次会话的正确数（不超过 words_studied）
    pub correct_answers: i32,
    /// 翻译方向
    pub direction: Direction,
    /// 是否有未同步的修改
    pub is_dirty: bool,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 更新时间
    pub updated_at: DateTime<Utc>,
}

impl LearningSession {
    /// 创建新的会话
    pub fn new(user_id: String, direction: Direction, started_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            started_at,
            ended_at: None,
            words_studied: 0,
            correct_answers: 0,
            direction,
            is_dirty: true,
            created_at: started_at,
            updated_at: started_at,
        }
    }

    /// 会话是否仍在进行中
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }

    /// 从数据库行解析
    pub fn from_row(row: &Row) -> SqliteResult<Self> {
        let direction_str: String = row.get("learning_direction")?;
        let direction = Direction::from_str(&direction_str).unwrap_or(Direction::RuIt);

        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            started_at: parse_datetime(row.get::<_, String>("started_at")?),
            ended_at: row
                .get::<_, Option<String>>("ended_at")?
                .map(parse_datetime),
            words_studied: row.get("words_studied")?,
            correct_answers: row.get("correct_answers")?,
            direction,
            is_dirty: row.get::<_, i32>("is_dirty")? != 0,
            created_at: parse_datetime(row.get::<_, String>("created_at")?),
            updated_at: parse_datetime(row.get::<_, String>("updated_at")?),
        })
    }

    /// 插入到数据库
    pub fn insert(&self, conn: &Connection) -> StorageResult<()> {
        conn.execute(
            r#"
            INSERT INTO learning_sessions (
                id, user_id, started_at, ended_at,
                words_studied, correct_answers, learning_direction,
                is_dirty, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10
            )
            "#,
            params![
                self.id,
                self.user_id,
                format_datetime(self.started_at),
                self.ended_at.map(format_datetime),
                self.words_studied,
                self.correct_answers,
                self.direction.as_str(),
                self.is_dirty as i32,
                format_datetime(self.created_at),
                format_datetime(self.updated_at),
            ],
        )?;
        Ok(())
    }
}

// ============================================================
// ProgressEvent - 进度事件
// ============================================================

/// 进度事件
///
/// 驱动所有推导状态的原子输入；每个持久化变更都可以由
/// 事件序列重建，这是离线回放设计的基础。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// 事件唯一标识 (UUID)
    pub id: String,
    /// 单词 ID
    pub word_id: String,
    /// 是否回答正确
    pub correct: bool,
    /// 作答时间
    pub occurred_at: DateTime<Utc>,
}

impl ProgressEvent {
    /// 创建新的进度事件
    pub fn new(word_id: &str, correct: bool, occurred_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            word_id: word_id.to_string(),
            correct,
            occurred_at,
        }
    }
}

// ============================================================
// PendingEvent - 离线队列项
// ============================================================

/// 离线队列项
///
/// 一条排队等待重放的进度事件，rowid 即回放顺序，
/// 事件本体以 JSON 形式保存在 payload 中。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingEvent {
    /// 队列行 ID（回放顺序）
    pub id: i64,
    /// 事件 ID (UUID)
    pub event_id: String,
    /// 用户 ID
    pub user_id: String,
    /// 进度事件本体 (JSON 格式)
    pub payload: String,
    /// 重试次数
    pub retry_count: i32,
    /// 最后一次错误信息
    pub last_error: Option<String>,
    /// 入队时间
    pub created_at: DateTime<Utc>,
}

impl PendingEvent {
    /// 由进度事件构造队列项
    pub fn from_event(user_id: &str, event: &ProgressEvent) -> StorageResult<Self> {
        let payload = serde_json::to_string(event)
            .map_err(|e| crate::storage::StorageError::Serialization(e.to_string()))?;

        Ok(Self {
            id: 0, // 由数据库自动生成
            event_id: event.id.clone(),
            user_id: user_id.to_string(),
            payload,
            retry_count: 0,
            last_error: None,
            created_at: Utc::now(),
        })
    }

    /// 还原为进度事件（用于回放）
    pub fn to_event(&self) -> StorageResult<ProgressEvent> {
        serde_json::from_str(&self.payload)
            .map_err(|e| crate::storage::StorageError::Serialization(e.to_string()))
    }

    /// 从数据库行解析
    pub fn from_row(row: &Row) -> SqliteResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            event_id: row.get("event_id")?,
            user_id: row.get("user_id")?,
            payload: row.get("payload")?,
            retry_count: row.get("retry_count")?,
            last_error: row.get("last_error")?,
            created_at: parse_datetime(row.get::<_, String>("created_at")?),
        })
    }

    /// 入队
    pub fn enqueue(&self, conn: &Connection) -> StorageResult<i64> {
        conn.execute(
            r#"
            INSERT INTO pending_events (
                event_id, user_id, payload, retry_count, last_error, created_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6
            )
            "#,
            params![
                self.event_id,
                self.user_id,
                self.payload,
                self.retry_count,
                self.last_error,
                format_datetime(self.created_at),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

// ============================================================
// 辅助函数
// ============================================================

/// 解析日期时间字符串
pub(crate) fn parse_datetime(s: String) -> DateTime<Utc> {
    // 尝试多种格式
    if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
        return dt.with_timezone(&Utc);
    }

    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S") {
        return DateTime::from_naive_utc_and_offset(dt, Utc);
    }

    // 默认返回当前时间
    Utc::now()
}

/// 格式化日期时间为字符串
pub(crate) fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// 解析日期字符串 (YYYY-MM-DD)
pub(crate) fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// 格式化日期为字符串
pub(crate) fn format_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}
