//! 积分账本服务
//!
//! 面向收银台的积分账户账本：消费赚取积分、花费积分，并保证
//! 同一操作重复提交时只生效一次、并发操作下余额始终正确。
//!
//! ## 核心功能
//!
//! - **赚取积分**：按业务时间点生效的规则集与账户等级计算积分
//! - **花费积分**：余额不足时拒绝，拒绝结果同样被幂等记录
//! - **幂等回放**：以 (账户, 操作类型, 操作 ID) 为键缓存最终响应
//! - **账本记录**：每次余额变动追加一条不可变流水
//! - **规则集管理**：按生效时间版本化，创建后不可修改
//!
//! ## 模块结构
//!
//! - `models`: 领域模型定义
//! - `error`: 错误类型定义
//! - `clock`: 时间源
//! - `rules`: 等级解析与积分计算
//! - `repository`: 存储层（PostgreSQL 与内存实现）
//! - `service`: 业务服务层

pub mod clock;
pub mod error;
pub mod models;
pub mod repository;
pub mod rules;
pub mod service;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ErrorKind, LedgerError, Result};
pub use models::*;
pub use repository::{LedgerStorage, MemoryLedgerStore, PgStorage};
pub use service::{
    AccountOpening, AccountService, CashierService, PageLimits, QueryService, RulesetService, dto,
};
