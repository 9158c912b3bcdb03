//! 积分规则引擎
//!
//! - `engine`: 等级解析与赚取积分计算
//! - `validator`: 等级规则校验与排序

pub mod engine;
pub mod validator;

pub use engine::{EarnEvaluation, compute_earn_points, evaluate_earn, resolve_level};
pub use validator::{prepare_levels, sort_levels, validate_base_rate, validate_levels};
