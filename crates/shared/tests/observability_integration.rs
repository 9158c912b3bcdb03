//! 可观测性模块集成测试
//!
//! 安装真实的 Prometheus recorder，验证账本指标能被渲染导出。
//! recorder 全局只能安装一次，因此所有断言放在同一个测试中。

use points_shared::observability::ObservabilityConfig;
use points_shared::observability::metrics::{
    self, ACCOUNTS_OPENED_TOTAL, LEDGER_OPERATION_DURATION_SECONDS, LEDGER_OPERATIONS_TOTAL,
    RULESETS_CREATED_TOTAL,
};

#[tokio::test]
async fn test_ledger_metrics_are_exported() {
    let config = ObservabilityConfig {
        metrics_port: 19_391,
        ..ObservabilityConfig::default()
    }
    .with_service_name("points-ledger-test");

    let _handle = metrics::init(&config).await.expect("初始化指标失败");

    metrics::record_ledger_operation("EARN", "applied", 0.004);
    metrics::record_ledger_operation("SPEND", "rejected", 0.002);
    metrics::record_ruleset_created();
    metrics::record_account_opened();

    let rendered = metrics::get_handle().expect("handle 未初始化").render();

    assert!(rendered.contains(LEDGER_OPERATIONS_TOTAL));
    assert!(rendered.contains(LEDGER_OPERATION_DURATION_SECONDS));
    assert!(rendered.contains(RULESETS_CREATED_TOTAL));
    assert!(rendered.contains(ACCOUNTS_OPENED_TOTAL));
    assert!(rendered.contains(r#"outcome="rejected""#));
    assert!(rendered.contains(r#"service="points-ledger-test""#));
}

#[test]
fn test_env_filter_accepts_directives() {
    let config = ObservabilityConfig {
        log_level: "points_ledger=debug,sqlx=warn".to_string(),
        ..ObservabilityConfig::default()
    };
    let filter = points_shared::observability::tracing::build_env_filter(&config);
    assert!(!filter.to_string().is_empty());
}
