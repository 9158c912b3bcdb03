//! 积分账本服务入口
//!
//! 加载配置、初始化可观测性与数据库，装配账本服务后等待关闭信号。
//! 请求接入层由上游网关负责，本进程只暴露 metrics 与健康检查端点。

use std::sync::Arc;

use anyhow::Result;
use points_shared::{config::AppConfig, database::Database, observability};
use tokio::signal;
use tracing::{info, warn};

use points_ledger::{
    AccountOpening, AccountService, CashierService, PageLimits, PgStorage, QueryService,
    RulesetService, SystemClock, clock::Clock,
};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载配置：config/default.toml -> config/{env}.toml -> 环境变量
    let config = AppConfig::load("points-ledger-service").unwrap_or_else(|e| {
        eprintln!("配置加载失败，使用默认配置: {e}");
        AppConfig::default()
    });

    // 2. 初始化日志与指标
    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!("Starting points-ledger-service...");
    info!(environment = %config.environment, "Configuration loaded");

    // 3. 初始化数据库连接
    let db = Database::connect(&config.database).await?;
    let status = db.health_check().await?;
    info!(pool_size = status.size, idle = status.idle, "Database connection established");

    if config.database.run_migrations {
        db.run_migrations().await?;
    }

    // 4. 装配存储与服务
    let storage = Arc::new(PgStorage::new(db.pool().clone()));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let cashier = CashierService::new(storage.clone(), clock.clone())
        .with_operation_timeout(config.ledger.operation_timeout());
    let queries = QueryService::new(storage.clone(), PageLimits::from(&config.ledger));
    let rulesets = RulesetService::new(storage.clone(), clock.clone());
    let accounts = AccountService::new(
        storage.clone(),
        clock.clone(),
        AccountOpening::from(&config.ledger),
    );

    match rulesets.get_effective_ruleset(None).await {
        Ok(ruleset) => info!(
            ruleset_id = ruleset.id,
            effective_from = %ruleset.effective_from,
            levels = ruleset.levels.len(),
            "当前生效规则集"
        ),
        Err(e) => warn!(error = %e, "当前没有生效的规则集，赚取积分将被拒绝"),
    }

    info!(
        operation_timeout_ms = config.ledger.operation_timeout_ms,
        "Services initialized"
    );

    shutdown_signal().await;

    drop((cashier, queries, rulesets, accounts));
    db.close().await;
    info!("Service shutdown complete");
    Ok(())
}

/// 优雅关闭信号处理
///
/// 监听 Ctrl+C 和 SIGTERM 信号
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "无法监听 Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "无法监听 SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}
