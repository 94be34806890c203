//! SQLite 本地存储模块
//!
//! 提供进度引擎的本地持久化层，支持：
//! - 单词学习进度与学习会话的本地缓存
//! - 游戏化状态与成就解锁记录
//! - 离线事件队列的持久化（页面重载后不丢失）
//! - 同步元数据（回放游标、最后同步时间）

// ============================================================
// 子模块声明
// ============================================================

pub mod gamification;
pub mod migrations;
pub mod models;
pub mod progress;
pub mod queue;
pub mod session;

// ============================================================
// 重新导出主要类型
// ============================================================

pub use gamification::GamificationRepository;
pub use migrations::run_migrations;
pub use models::*;
pub use progress::{ProgressRepository, ProgressStatistics};
pub use queue::{EventQueueRepository, QueueStats};
pub use session::SessionRepository;

// ============================================================
// 依赖导入
// ============================================================

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

// ============================================================
// 错误类型定义
// ============================================================

/// 存储模块错误类型
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("数据库错误: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("迁移错误: {0}")]
    Migration(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("网络错误: {0}")]
    Network(String),

    #[error("同步错误: {0}")]
    Sync(String),

    #[error("输入校验失败: {0}")]
    Validation(String),

    #[error("数据未找到: {0}")]
    NotFound(String),

    #[error("锁获取失败: {0}")]
    LockError(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

// ============================================================
// Storage - 统一存储结构体
// ============================================================

/// 统一存储结构体
///
/// 管理数据库连接并提供对所有 Repository 的便捷访问。
pub struct Storage {
    conn: Arc<Mutex<Connection>>,
    db_path: String,
}

impl Storage {
    /// 创建新的 Storage 实例
    ///
    /// 自动启用 WAL 模式、外键约束，并运行数据库迁移。
    ///
    /// # Arguments
    /// * `db_path` - 数据库文件路径
    pub fn new<P: AsRef<Path>>(db_path: P) -> StorageResult<Self> {
        let path_str = db_path.as_ref().to_string_lossy().to_string();
        let connection = Connection::open(&db_path)?;

        // 启用 WAL 模式以提高并发性能
        connection.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA foreign_keys=ON;
             PRAGMA cache_size=-64000;",
        )?;

        let conn = Arc::new(Mutex::new(connection));

        // 运行迁移
        {
            let guard = conn
                .lock()
                .map_err(|e| StorageError::LockError(e.to_string()))?;
            migrations::run_migrations(&guard)?;
        }

        Ok(Self {
            conn,
            db_path: path_str,
        })
    }

    /// 创建内存数据库（用于测试）
    ///
    /// 内存数据库不使用 WAL 模式，但启用外键约束。
    pub fn in_memory() -> StorageResult<Self> {
        let connection = Connection::open_in_memory()?;

        connection.execute_batch(
            "PRAGMA foreign_keys=ON;
             PRAGMA cache_size=-64000;",
        )?;

        let conn = Arc::new(Mutex::new(connection));

        {
            let guard = conn
                .lock()
                .map_err(|e| StorageError::LockError(e.to_string()))?;
            migrations::run_migrations(&guard)?;
        }

        Ok(Self {
            conn,
            db_path: ":memory:".to_string(),
        })
    }

    /// 获取数据库连接
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    /// 获取数据库连接的锁
    pub fn get_connection(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::LockError(e.to_string()))
    }

    /// 获取数据库路径
    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// 获取学习进度仓储
    pub fn progress(&self) -> ProgressRepository {
        ProgressRepository::new(Arc::clone(&self.conn))
    }

    /// 获取学习会话仓储
    pub fn sessions(&self) -> SessionRepository {
        SessionRepository::new(Arc::clone(&self.conn))
    }

    /// 获取游戏化状态仓储
    pub fn gamification(&self) -> GamificationRepository {
        GamificationRepository::new(Arc::clone(&self.conn))
    }

    /// 获取离线事件队列仓储
    pub fn queue(&self) -> EventQueueRepository {
        EventQueueRepository::new(Arc::clone(&self.conn))
    }

    /// 执行事务
    ///
    /// # Arguments
    /// * `f` - 在事务中执行的闭包
    pub fn transaction<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Connection) -> StorageResult<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| StorageError::LockError(e.to_string()))?;

        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;

        Ok(result)
    }

    // ========== 同步元数据操作 ==========

    /// 获取同步元数据
    ///
    /// # Arguments
    /// * `key` - 元数据键名
    ///
    /// # Returns
    /// * `Option<String>` - 元数据值，如果不存在则返回 None
    pub fn get_sync_metadata(&self, key: &str) -> StorageResult<Option<String>> {
        let conn = self.get_connection()?;

        let result: Option<String> = conn
            .query_row(
                "SELECT value FROM sync_metadata WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .ok();

        Ok(result)
    }

    /// 设置同步元数据
    ///
    /// # Arguments
    /// * `key` - 元数据键名
    /// * `value` - 元数据值
    pub fn set_sync_metadata(&self, key: &str, value: &str) -> StorageResult<()> {
        let conn = self.get_connection()?;

        conn.execute(
            "INSERT OR REPLACE INTO sync_metadata (key, value, updated_at) VALUES (?1, ?2, datetime('now'))",
            [key, value],
        )?;

        Ok(())
    }
}

// ============================================================
// 测试
// ============================================================
