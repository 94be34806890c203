//! 远端存储客户端模块
//!
//! 定义进度引擎对云端数据库 API 的全部出站操作，并提供基于
//! reqwest 的 HTTP 实现。计数器更新以"原子自增"RPC 表达，
//! 服务端在最新存储值之上应用增量，多设备并发不会丢失更新。

use chrono::{DateTime, Utc};
use parole_algo::GamificationState;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;

use crate::storage::models::{LearningSession, ProgressEvent};

// ============================================================
// 错误类型定义
// ============================================================

/// 远端存储错误类型
#[derive(Error, Debug)]
pub enum RemoteError {
    /// 网络不可达（离线），应触发入队而非重试
    #[error("网络不可达")]
    Offline,

    /// 瞬时网络错误（在线但请求失败），可重试
    #[error("网络错误: {0}")]
    Network(String),

    /// 服务端返回非成功状态码
    #[error("请求失败: HTTP {0}")]
    Http(u16),
}

impl RemoteError {
    /// 是否应直接入队（离线），而非原地重试
    pub fn is_offline(&self) -> bool {
        matches!(self, Self::Offline)
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

// ============================================================
// RemoteStore - 出站操作接口
// ============================================================

/// 远端存储接口
///
/// 引擎对持久化层的全部出站操作。实盘实现为 [`HttpRemoteStore`]，
/// 测试中以内存实现替代。
#[allow(async_fn_in_trait)]
pub trait RemoteStore {
    /// 记录一次答题事件
    ///
    /// 服务端语义为 user_progress 的 upsert + 计数器原子自增，
    /// 并由自增后的计数器重新推导派生字段。重放与实时提交走
    /// 同一条路径。
    async fn record_answer(&self, user_id: &str, event: &ProgressEvent) -> RemoteResult<()>;

    /// 插入或更新学习会话
    async fn upsert_session(&self, session: &LearningSession) -> RemoteResult<()>;

    /// 插入或更新游戏化状态快照
    async fn upsert_gamification(
        &self,
        user_id: &str,
        state: &GamificationState,
    ) -> RemoteResult<()>;

    /// 记录成就解锁（服务端幂等）
    async fn insert_achievement(
        &self,
        user_id: &str,
        achievement_id: &str,
        unlocked_at: DateTime<Utc>,
    ) -> RemoteResult<()>;
}

// ============================================================
// HttpRemoteStore - HTTP 实现
// ============================================================

/// 答题事件上传载荷
#[derive(Debug, Serialize)]
struct AnswerPayload<'a> {
    user_id: &'a str,
    event_id: &'a str,
    word_id: &'a str,
    correct: bool,
    occurred_at: DateTime<Utc>,
}

/// 成就解锁上传载荷
#[derive(Debug, Serialize)]
struct AchievementPayload<'a> {
    user_id: &'a str,
    achievement_id: &'a str,
    unlocked_at: DateTime<Utc>,
}

/// 游戏化状态上传载荷
#[derive(Debug, Serialize)]
struct GamificationPayload<'a> {
    user_id: &'a str,
    #[serde(flatten)]
    state: &'a GamificationState,
}

/// 基于 reqwest 的远端存储实现
pub struct HttpRemoteStore {
    client: Client,
    api_base_url: String,
    auth_token: String,
}

impl HttpRemoteStore {
    /// 创建新的 HTTP 远端存储
    ///
    /// # Arguments
    /// * `api_base_url` - 同步 API 基础 URL
    /// * `auth_token` - 认证令牌（由外部认证系统提供）
    /// * `timeout_secs` - 请求超时（秒）
    pub fn new(api_base_url: String, auth_token: String, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_base_url,
            auth_token,
        }
    }

    /// 发送 JSON POST 请求并检查状态码
    async fn post_json<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> RemoteResult<()> {
        let url = format!("{}{}", self.api_base_url, path);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.auth_token)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    RemoteError::Offline
                } else {
                    RemoteError::Network(e.to_string())
                }
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(RemoteError::Http(response.status().as_u16()))
        }
    }
}

impl RemoteStore for HttpRemoteStore {
    async fn record_answer(&self, user_id: &str, event: &ProgressEvent) -> RemoteResult<()> {
        let payload = AnswerPayload {
            user_id,
            event_id: &event.id,
            word_id: &event.word_id,
            correct: event.correct,
            occurred_at: event.occurred_at,
        };
        self.post_json("/api/sync/progress-events", &payload).await
    }

    async fn upsert_session(&self, session: &LearningSession) -> RemoteResult<()> {
        self.post_json("/api/sync/sessions", session).await
    }

    async fn upsert_gamification(
        &self,
        user_id: &str,
        state: &GamificationState,
    ) -> RemoteResult<()> {
        let payload = GamificationPayload { user_id, state };
        self.post_json("/api/sync/gamification", &payload).await
    }

    async fn insert_achievement(
        &self,
        user_id: &str,
        achievement_id: &str,
        unlocked_at: DateTime<Utc>,
    ) -> RemoteResult<()> {
        let payload = AchievementPayload {
            user_id,
            achievement_id,
            unlocked_at,
        };
        self.post_json("/api/sync/achievements", &payload).await
    }
}
