//! PostgreSQL 存储集成测试
//!
//! 使用真实 PostgreSQL 验证行锁、冲突跳过插入与幂等记录的落库行为。
//!
//! ## 运行方式
//!
//! ```bash
//! DATABASE_URL=postgres://... cargo test --test pg_ledger_test -- --ignored
//! ```

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use points_ledger::dto::{CreateRulesetRequest, EarnRequest, LevelRuleInput, SpendRequest};
use points_ledger::{
    AccountOpening, AccountService, CashierService, Clock, ErrorKind, PageLimits, PgStorage,
    Points, QueryService, RulesetService, SystemClock,
};
use points_shared::database::Database;
use points_shared::test_utils::{test_database_config, test_operation_id};
use uuid::Uuid;

// ==================== 辅助函数 ====================

struct PgLedger {
    cashier: Arc<CashierService<PgStorage>>,
    queries: QueryService<PgStorage>,
    accounts: AccountService<PgStorage>,
    /// 本次测试专用规则集的生效时间
    effective_from: DateTime<Utc>,
}

/// 规则集的生效时间全局唯一，用随机秒数避开其他测试创建的规则集
fn unique_effective_from() -> DateTime<Utc> {
    let offset = (Uuid::new_v4().as_u128() % 300_000_000) as i64;
    Utc.with_ymd_and_hms(1990, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(offset)
}

async fn setup() -> PgLedger {
    let db = Database::connect(&test_database_config())
        .await
        .expect("数据库连接失败");
    db.run_migrations().await.expect("执行迁移失败");

    let storage = Arc::new(PgStorage::new(db.pool().clone()));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let effective_from = unique_effective_from();
    RulesetService::new(storage.clone(), clock.clone())
        .create_ruleset(
            1,
            CreateRulesetRequest {
                effective_from,
                base_rub_per_point: "10".to_string(),
                levels: vec![
                    LevelRuleInput {
                        level_code: "BASE".to_string(),
                        threshold_total_spend: "0".to_string(),
                        percent_earn: "100".to_string(),
                    },
                    LevelRuleInput {
                        level_code: "GOLD".to_string(),
                        threshold_total_spend: "1000".to_string(),
                        percent_earn: "200".to_string(),
                    },
                ],
            },
        )
        .await
        .expect("创建规则集失败");

    PgLedger {
        cashier: Arc::new(
            CashierService::new(storage.clone(), clock.clone())
                .with_operation_timeout(Some(std::time::Duration::from_secs(10))),
        ),
        queries: QueryService::new(storage.clone(), PageLimits::default()),
        accounts: AccountService::new(storage, clock, AccountOpening::default()),
        effective_from,
    }
}

fn earn(op: &str, code: &str, amount: &str, ts: DateTime<Utc>) -> EarnRequest {
    EarnRequest {
        operation_id: op.to_string(),
        public_code: code.to_string(),
        amount_money: amount.to_string(),
        ts: Some(ts),
    }
}

fn spend(op: &str, code: &str, points: i64, ts: DateTime<Utc>) -> SpendRequest {
    SpendRequest {
        operation_id: op.to_string(),
        public_code: code.to_string(),
        amount_points: points,
        ts: Some(ts),
    }
}

// ==================== 测试 ====================

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_pg_earn_is_idempotent() {
    let ledger = setup().await;
    let code = ledger.accounts.open_account().await.unwrap().public_code.to_string();
    let op = test_operation_id();

    let first = ledger
        .cashier
        .earn(1, earn(&op, &code, "105.00", ledger.effective_from))
        .await
        .unwrap();
    let second = ledger
        .cashier
        .earn(1, earn(&op, &code, "105.00", ledger.effective_from))
        .await
        .unwrap();

    assert!(!first.replayed);
    assert!(second.replayed);
    assert_eq!(first.event, second.event);
    assert_eq!(first.balance, second.balance);

    let page = ledger
        .queries
        .list_account_events(&code, Default::default())
        .await
        .unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].delta_points, Points::new(10));
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_pg_concurrent_spend_serializes_on_row_lock() {
    let ledger = setup().await;
    let code = ledger.accounts.open_account().await.unwrap().public_code.to_string();
    ledger
        .cashier
        .earn(1, earn(&test_operation_id(), &code, "1000.00", ledger.effective_from))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..2 {
        let cashier = ledger.cashier.clone();
        let request = spend(&test_operation_id(), &code, 60, ledger.effective_from);
        handles.push(tokio::spawn(async move { cashier.spend(1, request).await }));
    }

    let mut succeeded = 0;
    for result in futures::future::join_all(handles).await {
        match result.unwrap() {
            Ok(_) => succeeded += 1,
            Err(err) => assert_eq!(err.kind(), ErrorKind::NotEnoughBalance),
        }
    }
    assert_eq!(succeeded, 1);

    let summary = ledger.queries.lookup_account_by_public_code(&code).await.unwrap();
    assert_eq!(summary.balance_points, Points::new(40));
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_pg_rejection_is_cached() {
    let ledger = setup().await;
    let code = ledger.accounts.open_account().await.unwrap().public_code.to_string();
    let op = test_operation_id();

    let err = ledger
        .cashier
        .spend(1, spend(&op, &code, 5, ledger.effective_from))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotEnoughBalance);

    ledger
        .cashier
        .earn(1, earn(&test_operation_id(), &code, "100", ledger.effective_from))
        .await
        .unwrap();

    let replayed = ledger
        .cashier
        .spend(1, spend(&op, &code, 5, ledger.effective_from))
        .await
        .unwrap_err();
    assert_eq!(replayed.kind(), ErrorKind::NotEnoughBalance);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_pg_response_event_matches_stored_event() {
    let ledger = setup().await;
    let code = ledger.accounts.open_account().await.unwrap().public_code.to_string();
    let op = test_operation_id();

    // 纳秒级业务时间，超出 TIMESTAMPTZ 的精度
    let ts = ledger.effective_from + Duration::nanoseconds(123_456_789);
    let response = ledger
        .cashier
        .earn(1, earn(&op, &code, "100", ts))
        .await
        .unwrap();
    assert_eq!(response.event.ts, ledger.effective_from + Duration::microseconds(123_456));

    let page = ledger
        .queries
        .list_account_events(&code, Default::default())
        .await
        .unwrap();
    assert_eq!(page.items, vec![response.event.clone()]);

    let replayed = ledger
        .cashier
        .earn(1, earn(&op, &code, "100", ts))
        .await
        .unwrap();
    assert!(replayed.replayed);
    assert_eq!(replayed.event, page.items[0]);
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_pg_money_beyond_column_range_is_invalid_money() {
    let ledger = setup().await;
    let code = ledger.accounts.open_account().await.unwrap().public_code.to_string();
    let op = test_operation_id();

    let err = ledger
        .cashier
        .earn(1, earn(&op, &code, "1000000000000.00", ledger.effective_from))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidMoney);

    let ok = ledger
        .cashier
        .earn(1, earn(&op, &code, "100", ledger.effective_from))
        .await
        .unwrap();
    assert!(!ok.replayed);
}
