//! # parole-engine - 进度引擎
//!
//! Parole（俄语-意大利语词汇学习应用）的间隔重复进度引擎：
//! 将逐词答题事件流转化为掌握等级、复习排期、会话统计与
//! 游戏化状态（XP、连续天数、成就）。
//!
//! ## 模块结构
//!
//! - [`facade`] - UI 调用的唯一公共入口
//! - [`store`] - 事件落库编排与离线队列重放
//! - [`storage`] - SQLite 本地缓存、离线队列与各仓储
//! - [`remote`] - 云端数据库 API 客户端
//! - [`tracker`] - 学习会话状态机
//!
//! 纯算法（掌握等级、复习间隔、游戏化推导）位于 `parole-algo` crate。

pub mod facade;
pub mod remote;
pub mod storage;
pub mod store;
pub mod tracker;

// ============================================================
// 重新导出主要类型
// ============================================================

pub use facade::{
    DueWordsBreakdown, ProgressFacade, ProgressListener, ProgressStats, UnlockedAchievement,
    UpdateOutcome,
};
pub use remote::{HttpRemoteStore, RemoteError, RemoteResult, RemoteStore};
pub use storage::{Storage, StorageError, StorageResult};
pub use store::{ProgressStore, ReplayReport, StoreConfig};
pub use tracker::SessionTracker;
