//! 数据库迁移模块
//!
//! 管理 SQLite 数据库的版本迁移，确保数据库结构与应用版本保持一致。
//!
//! ## 迁移策略
//! - 每个迁移在独立事务中执行
//! - 迁移记录存储在 schema_migrations 表中

use rusqlite::Connection;

use crate::storage::{StorageError, StorageResult};

/// 当前数据库 schema 版本
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// 初始化 schema SQL (V1)
const INIT_SCHEMA: &str = include_str!("schema.sql");

/// 迁移记录
#[derive(Debug, Clone)]
pub struct Migration {
    /// 迁移版本号
    pub version: i32,
    /// 迁移名称/描述
    pub name: String,
    /// 迁移 SQL 语句
    pub sql: String,
}

impl Migration {
    /// 创建新的迁移
    pub fn new(version: i32, name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            version,
            name: name.into(),
            sql: sql.into(),
        }
    }
}

/// 获取所有迁移定义
///
/// 返回按版本号排序的迁移列表
pub fn get_migrations() -> Vec<Migration> {
    vec![
        // V1: 初始表结构
        Migration::new(1, "初始表结构", INIT_SCHEMA),
        // V2: 添加索引优化
        Migration::new(
            2,
            "添加索引优化",
            r#"
            -- 复合索引优化待复习查询
            CREATE INDEX IF NOT EXISTS idx_up_user_mastery_practiced
                ON user_progress(user_id, mastery_level, last_practiced);

            CREATE INDEX IF NOT EXISTS idx_up_user_dirty
                ON user_progress(user_id, is_dirty);

            -- 仅允许每个用户存在一个进行中的会话
            CREATE UNIQUE INDEX IF NOT EXISTS idx_ls_user_open
                ON learning_sessions(user_id) WHERE ended_at IS NULL;

            CREATE INDEX IF NOT EXISTS idx_pe_user
                ON pending_events(user_id, id);
            "#,
        ),
    ]
}

/// 确保迁移表存在
fn ensure_migrations_table(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at INTEGER NOT NULL
        );
        "#,
    )
    .map_err(|e| StorageError::Migration(format!("创建迁移表失败: {}", e)))?;

    Ok(())
}

/// 获取当前数据库版本
///
/// # Arguments
/// * `conn` - 数据库连接
///
/// # Returns
/// * `i32` - 当前版本号，如果没有迁移记录则返回 0
pub fn get_current_version(conn: &Connection) -> i32 {
    if ensure_migrations_table(conn).is_err() {
        return 0;
    }

    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .unwrap_or(0)
}

/// 获取已应用的迁移版本列表
fn get_applied_versions(conn: &Connection) -> StorageResult<Vec<i32>> {
    ensure_migrations_table(conn)?;

    let mut stmt = conn.prepare("SELECT version FROM schema_migrations ORDER BY version")?;
    let versions = stmt
        .query_map([], |row| row.get(0))?
        .filter_map(|r| r.ok())
        .collect();

    Ok(versions)
}

/// 记录迁移已应用
fn record_migration(conn: &Connection, migration: &Migration) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![
            migration.version,
            migration.name,
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs() as i64
        ],
    )?;

    Ok(())
}

/// 在事务中执行单个迁移
fn execute_migration_in_transaction(
    conn: &Connection,
    migration: &Migration,
) -> StorageResult<()> {
    conn.execute_batch("BEGIN")?;

    let result = conn
        .execute_batch(&migration.sql)
        .map_err(|e| StorageError::Migration(format!("迁移 v{} 失败: {}", migration.version, e)))
        .and_then(|_| record_migration(conn, migration));

    match result {
        Ok(()) => {
            conn.execute_batch("COMMIT")?;
            Ok(())
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(e)
        }
    }
}

/// 运行数据库迁移
///
/// 检查当前数据库版本并执行必要的迁移脚本。
/// 每个迁移在独立事务中执行，失败时自动回滚该迁移。
///
/// # Arguments
/// * `conn` - 数据库连接
///
/// # Returns
/// * `Result<i32, StorageError>` - 成功返回最终版本号
pub fn run_migrations(conn: &Connection) -> Result<i32, StorageError> {
    ensure_migrations_table(conn)?;

    let applied_versions = get_applied_versions(conn)?;
    let migrations = get_migrations();
    let mut final_version = get_current_version(conn);

    log::info!(
        "当前数据库版本: {}, 目标版本: {}",
        final_version,
        CURRENT_SCHEMA_VERSION
    );

    for migration in migrations {
        // 跳过已应用的迁移
        if applied_versions.contains(&migration.version) {
            continue;
        }

        log::info!("运行迁移 v{}: {}", migration.version, migration.name);

        match execute_migration_in_transaction(conn, &migration) {
            Ok(()) => {
                final_version = migration.version;
                log::info!("迁移 v{} 完成", migration.version);
            }
            Err(e) => {
                log::error!("迁移 v{} 失败: {}", migration.version, e);
                return Err(e);
            }
        }
    }

    Ok(final_version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_migrations_from_empty() {
        let conn = Connection::open_in_memory().unwrap();

        let version = run_migrations(&conn).expect("Migrations should succeed");
        assert_eq!(version, CURRENT_SCHEMA_VERSION);

        // 表应该已创建
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM user_progress", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_run_migrations_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        run_migrations(&conn).expect("First run should succeed");
        let version = run_migrations(&conn).expect("Second run should succeed");

        assert_eq!(version, CURRENT_SCHEMA_VERSION);
        assert_eq!(get_current_version(&conn), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_open_session_unique_index() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).expect("Migrations should succeed");

        conn.execute(
            "INSERT INTO learning_sessions (id, user_id, started_at, learning_direction, created_at, updated_at)
             VALUES ('s1', 'u1', '2025-03-10 08:00:00', 'ru-it', '2025-03-10 08:00:00', '2025-03-10 08:00:00')",
            [],
        )
        .unwrap();

        // 同一用户的第二个进行中会话应违反唯一索引
        let result = conn.execute(
            "INSERT INTO learning_sessions (id, user_id, started_at, learning_direction, created_at, updated_at)
             VALUES ('s2', 'u1', '2025-03-10 09:00:00', 'ru-it', '2025-03-10 09:00:00', '2025-03-10 09:00:00')",
            [],
        );
        assert!(result.is_err());
    }
}
