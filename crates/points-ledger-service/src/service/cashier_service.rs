//! 收银记账服务
//!
//! 处理赚取/花费积分的核心流程，所有步骤在同一个数据库事务内完成：
//!
//! 1. 校验输入（公开码、金额/积分、操作 ID），失败时不接触数据库
//! 2. 按公开码查找账户
//! 3. 插入待定的幂等记录；键已存在则回放缓存结果
//! 4. 对账户加行锁（同一账户的并发操作在此串行化）
//! 5. 赚取时加载业务时间点生效的规则集并计算积分
//! 6. 在内存中应用账户变更
//! 7. 写入流水并更新账户
//! 8. 写入幂等结果并提交
//!
//! 业务拒绝（如余额不足）同样写入幂等结果后提交，此时账户与流水未被修改；
//! 其他错误回滚整个事务，幂等键也随之回滚，重试可以从头开始。

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, SubsecRound, Utc};
use points_shared::observability::metrics as ledger_metrics;
use tracing::{error, info, instrument, warn};

use super::dto::{BalanceDto, EarnRequest, OperationResponse, SpendRequest};
use super::idempotency::{
    Replay, decode_replay, earn_request_snapshot, rejection_outcome, spend_request_snapshot,
    success_outcome,
};
use crate::clock::Clock;
use crate::error::{LedgerError, Result};
use crate::models::{
    Account, EventDraft, Money, OperationKey, OperationType, PendingOperation, Points, PublicCode,
    validate_operation_id,
};
use crate::repository::{
    AccountStore, EventStore, LedgerStorage, OperationLog, RulesetStore, TxManager,
};
use crate::rules::evaluate_earn;

/// 已校验的记账命令
#[derive(Debug, Clone)]
struct LedgerCommand {
    operation_id: String,
    public_code: PublicCode,
    ts: DateTime<Utc>,
    kind: CommandKind,
}

#[derive(Debug, Clone, Copy)]
enum CommandKind {
    Earn { purchase: Money },
    Spend { points: Points },
}

impl LedgerCommand {
    fn op_type(&self) -> OperationType {
        match self.kind {
            CommandKind::Earn { .. } => OperationType::Earn,
            CommandKind::Spend { .. } => OperationType::Spend,
        }
    }

    fn request_snapshot(&self) -> serde_json::Value {
        match self.kind {
            CommandKind::Earn { purchase } => {
                earn_request_snapshot(&self.operation_id, &self.public_code, purchase, self.ts)
            }
            CommandKind::Spend { points } => {
                spend_request_snapshot(&self.operation_id, &self.public_code, points, self.ts)
            }
        }
    }
}

/// 事务内的执行结果
enum TxOutcome {
    /// 新执行成功
    Applied(OperationResponse),
    /// 回放已缓存的成功结果
    Replayed(OperationResponse),
    /// 业务拒绝（新产生或回放），事务照常提交
    Rejected(LedgerError),
}

/// 收银记账服务
///
/// 唯一负责幂等记录生命周期与账户变更顺序的组件
pub struct CashierService<S: LedgerStorage> {
    storage: Arc<S>,
    clock: Arc<dyn Clock>,
    operation_timeout: Option<Duration>,
}

impl<S: LedgerStorage> CashierService<S> {
    pub fn new(storage: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            operation_timeout: None,
        }
    }

    /// 设置单次操作的超时时间，超时后事务被丢弃并回滚
    pub fn with_operation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// 消费赚取积分
    #[instrument(
        skip(self, request),
        fields(operation_id = %request.operation_id, public_code = %request.public_code)
    )]
    pub async fn earn(&self, actor_user_id: i64, request: EarnRequest) -> Result<OperationResponse> {
        let public_code = PublicCode::parse(&request.public_code)?;
        let operation_id = validate_operation_id(&request.operation_id)?;
        let purchase = Money::parse(&request.amount_money)?;
        if purchase.is_negative() {
            return Err(LedgerError::InvalidPurchaseAmount(format!(
                "消费金额不能为负: {purchase}"
            )));
        }

        let command = LedgerCommand {
            operation_id,
            public_code,
            ts: command_ts(request.ts, self.clock.as_ref()),
            kind: CommandKind::Earn { purchase },
        };
        self.run(actor_user_id, command).await
    }

    /// 花费积分
    #[instrument(
        skip(self, request),
        fields(operation_id = %request.operation_id, public_code = %request.public_code)
    )]
    pub async fn spend(&self, actor_user_id: i64, request: SpendRequest) -> Result<OperationResponse> {
        let public_code = PublicCode::parse(&request.public_code)?;
        let operation_id = validate_operation_id(&request.operation_id)?;
        let points = Points::positive(request.amount_points)?;

        let command = LedgerCommand {
            operation_id,
            public_code,
            ts: command_ts(request.ts, self.clock.as_ref()),
            kind: CommandKind::Spend { points },
        };
        self.run(actor_user_id, command).await
    }

    /// 执行并记录日志与指标
    async fn run(&self, actor_user_id: i64, command: LedgerCommand) -> Result<OperationResponse> {
        let start = Instant::now();
        let op_type = command.op_type();

        let result = self
            .with_deadline(self.execute(actor_user_id, &command))
            .await;

        let elapsed = start.elapsed();
        let outcome = match &result {
            Ok(TxOutcome::Applied(response)) => {
                info!(
                    op_type = %op_type,
                    event_id = response.event.id,
                    delta_points = %response.event.delta_points,
                    balance_after = %response.event.balance_after,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "记账成功"
                );
                "applied"
            }
            Ok(TxOutcome::Replayed(_)) => {
                info!(
                    op_type = %op_type,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "幂等请求，返回已缓存的结果"
                );
                "replayed"
            }
            Ok(TxOutcome::Rejected(err)) => {
                warn!(
                    op_type = %op_type,
                    code = err.error_code(),
                    error = %err,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "记账被业务规则拒绝"
                );
                "rejected"
            }
            Err(err) if err.is_business_error() => {
                warn!(
                    op_type = %op_type,
                    code = err.error_code(),
                    error = %err,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "记账请求无效"
                );
                "rejected"
            }
            Err(err) => {
                error!(
                    op_type = %op_type,
                    error = %err,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "记账失败"
                );
                "failed"
            }
        };
        ledger_metrics::record_ledger_operation(op_type.as_str(), outcome, elapsed.as_secs_f64());

        match result? {
            TxOutcome::Applied(response) | TxOutcome::Replayed(response) => Ok(response),
            TxOutcome::Rejected(err) => Err(err),
        }
    }

    async fn with_deadline<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match self.operation_timeout {
            Some(timeout) => tokio::time::timeout(timeout, fut).await.map_err(|_| {
                LedgerError::Timeout(format!("超过 {} ms 未完成", timeout.as_millis()))
            })?,
            None => fut.await,
        }
    }

    /// 开启事务、执行并按结果提交或回滚
    async fn execute(&self, actor_user_id: i64, command: &LedgerCommand) -> Result<TxOutcome> {
        let transactions = self.storage.transactions();
        let mut tx = transactions.begin().await?;

        match self.execute_in_tx(&mut tx, actor_user_id, command).await {
            Ok(outcome) => {
                transactions.commit(tx).await?;
                Ok(outcome)
            }
            Err(err) => {
                if let Err(rollback_err) = transactions.rollback(tx).await {
                    warn!(error = %rollback_err, "事务回滚失败");
                }
                Err(err)
            }
        }
    }

    async fn execute_in_tx(
        &self,
        tx: &mut S::Tx,
        actor_user_id: i64,
        command: &LedgerCommand,
    ) -> Result<TxOutcome> {
        let account = self
            .storage
            .accounts()
            .get_by_public_code(tx, &command.public_code)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(command.public_code.to_string()))?;

        let key = OperationKey {
            account_id: account.id,
            op_type: command.op_type(),
            operation_id: command.operation_id.clone(),
        };
        let pending = PendingOperation {
            key: key.clone(),
            request_json: command.request_snapshot(),
        };

        let operations = self.storage.operations();
        if !operations.insert_pending(tx, &pending).await? {
            return self.replay(tx, &key).await;
        }

        let locked = self.storage.accounts().lock_by_id(tx, account.id).await?;

        let (next, draft) = match self.apply(tx, &locked, actor_user_id, command).await {
            Ok(applied) => applied,
            Err(err) if err.is_cacheable_rejection() => {
                operations
                    .finalize(tx, &key, &rejection_outcome(&err)?)
                    .await?;
                return Ok(TxOutcome::Rejected(err));
            }
            Err(err) => return Err(err),
        };

        let event = self.storage.events().insert(tx, &draft).await?;
        let updated = match command.kind {
            CommandKind::Earn { .. } => {
                self.storage
                    .accounts()
                    .update_after_earn(
                        tx,
                        next.id,
                        next.balance_points,
                        next.total_spend_money,
                        &next.level_code,
                    )
                    .await?
            }
            CommandKind::Spend { .. } => {
                self.storage
                    .accounts()
                    .update_after_spend(tx, next.id, next.balance_points)
                    .await?
            }
        };

        let response = OperationResponse {
            operation_id: command.operation_id.clone(),
            op_type: command.op_type(),
            event,
            balance: BalanceDto::from_account(&updated, self.clock.now()),
            replayed: false,
        };
        operations
            .finalize(tx, &key, &success_outcome(&response)?)
            .await?;

        Ok(TxOutcome::Applied(response))
    }

    /// 计算账户变更（赚取时先按规则集计算积分）
    async fn apply(
        &self,
        tx: &mut S::Tx,
        account: &Account,
        actor_user_id: i64,
        command: &LedgerCommand,
    ) -> Result<(Account, EventDraft)> {
        match command.kind {
            CommandKind::Earn { purchase } => {
                let ruleset = self
                    .storage
                    .rulesets()
                    .get_effective_at(tx, command.ts)
                    .await?
                    .ok_or_else(|| {
                        LedgerError::InvalidRuleset(format!(
                            "{} 时没有生效的规则集",
                            command.ts.to_rfc3339()
                        ))
                    })?;

                let evaluation = evaluate_earn(&ruleset, account.total_spend_money, purchase)?;
                account.apply_earn(
                    evaluation.earned_points,
                    purchase,
                    evaluation.level_after.level_code,
                    Some(ruleset.id),
                    Some(actor_user_id),
                    command.ts,
                )
            }
            CommandKind::Spend { points } => {
                account.apply_spend(points, Some(actor_user_id), command.ts)
            }
        }
    }

    async fn replay(&self, tx: &mut S::Tx, key: &OperationKey) -> Result<TxOutcome> {
        let record = self
            .storage
            .operations()
            .get(tx, key)
            .await?
            .ok_or_else(|| {
                LedgerError::Internal(format!("操作 {} 的幂等记录缺失", key.operation_id))
            })?;

        match decode_replay(&record)? {
            Replay::Succeeded(response) => Ok(TxOutcome::Replayed(response)),
            Replay::Rejected(err) => Ok(TxOutcome::Rejected(err)),
        }
    }
}

/// 业务时间截断到微秒，与 TIMESTAMPTZ 的存储精度一致
fn command_ts(requested: Option<DateTime<Utc>>, clock: &dyn Clock) -> DateTime<Utc> {
    requested.unwrap_or_else(|| clock.now()).trunc_subsecs(6)
}
