//! 积分账本领域模型
//!
//! 包含金额/积分值类型、账户聚合、流水、规则集与幂等操作记录

pub mod account;
pub mod enums;
pub mod ledger;
pub mod money;
pub mod operation;
pub mod ruleset;

// 重新导出常用类型
pub use account::{Account, PublicCode};
pub use enums::{EventType, OperationType};
pub use ledger::{EventDraft, LedgerEvent};
pub use money::{Money, Percent, Points};
pub use operation::{
    OperationKey, OperationOutcome, OperationRecord, PendingOperation, validate_operation_id,
};
pub use ruleset::{LevelCode, LevelRule, NewRuleset, Ruleset};
