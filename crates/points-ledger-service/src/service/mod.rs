//! 服务层
//!
//! 实现积分账本业务逻辑，协调仓储层与规则引擎。
//!
//! ## 模块结构
//!
//! - `dto`: 数据传输对象定义
//! - `idempotency`: 幂等记录的快照与回放编解码
//! - `cashier_service`: 收银操作（赚取/花费积分）
//! - `query_service`: 账户与流水查询（只读操作）
//! - `ruleset_service`: 规则集管理
//! - `account_service`: 账户开户

pub mod account_service;
pub mod cashier_service;
pub mod dto;
pub mod idempotency;
pub mod query_service;
pub mod ruleset_service;

pub use account_service::{AccountOpening, AccountService};
pub use cashier_service::CashierService;
pub use dto::*;
pub use query_service::{PageLimits, QueryService};
pub use ruleset_service::RulesetService;
