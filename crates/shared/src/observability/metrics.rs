//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::ObservabilityConfig;

/// 记账操作计数
pub const LEDGER_OPERATIONS_TOTAL: &str = "ledger_operations_total";
/// 记账操作耗时
pub const LEDGER_OPERATION_DURATION_SECONDS: &str = "ledger_operation_duration_seconds";
/// 规则集创建计数
pub const RULESETS_CREATED_TOTAL: &str = "rulesets_created_total";
/// 开户计数
pub const ACCOUNTS_OPENED_TOTAL: &str = "accounts_opened_total";

/// 全局 Prometheus handle，用于渲染指标
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics 资源守卫
pub struct MetricsHandle {
    server_handle: tokio::task::JoinHandle<()>,
}

impl Drop for MetricsHandle {
    fn drop(&mut self) {
        self.server_handle.abort();
    }
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    // 保存到全局，供其他地方获取指标快照
    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    register_ledger_metrics(&config.service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle { server_handle })
}

/// 注册账本相关指标的描述
fn register_ledger_metrics(service_name: &str) {
    metrics::describe_counter!(
        LEDGER_OPERATIONS_TOTAL,
        "Total number of earn/spend operations by outcome"
    );
    metrics::describe_histogram!(
        LEDGER_OPERATION_DURATION_SECONDS,
        "Earn/spend operation duration in seconds"
    );
    metrics::describe_counter!(RULESETS_CREATED_TOTAL, "Total number of rulesets created");
    metrics::describe_counter!(ACCOUNTS_OPENED_TOTAL, "Total number of accounts opened");

    // 记录服务启动
    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 启动指标 HTTP 服务器
async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

/// 获取全局 Prometheus handle（用于自定义渲染）
pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录一次记账操作
///
/// outcome 取值：applied / replayed / rejected / failed
#[inline]
pub fn record_ledger_operation(op_type: &str, outcome: &str, duration_secs: f64) {
    metrics::counter!(
        LEDGER_OPERATIONS_TOTAL,
        "op_type" => op_type.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    metrics::histogram!(
        LEDGER_OPERATION_DURATION_SECONDS,
        "op_type" => op_type.to_string()
    )
    .record(duration_secs);
}

/// 记录规则集创建
#[inline]
pub fn record_ruleset_created() {
    metrics::counter!(RULESETS_CREATED_TOTAL).increment(1);
}

/// 记录开户
#[inline]
pub fn record_account_opened() {
    metrics::counter!(ACCOUNTS_OPENED_TOTAL).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_functions_do_not_panic() {
        // 即使没有初始化 recorder，这些函数也不应该 panic
        record_ledger_operation("EARN", "applied", 0.01);
        record_ledger_operation("SPEND", "rejected", 0.02);
        record_ruleset_created();
        record_account_opened();
        assert!(get_handle().is_none());
    }
}
