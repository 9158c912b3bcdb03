//! 数据库连接与 schema 迁移
//!
//! 账本的全部一致性依赖 PostgreSQL 事务与行锁，因此连接池在借出连接前先做存活检测，
//! 迁移脚本在编译期嵌入，启动时按版本顺序执行。

use std::str::FromStr;
use std::time::Duration;

use sqlx::migrate::Migrator;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tracing::{debug, info, instrument};

use crate::config::DatabaseConfig;
use crate::error::Result;

/// 工作区根目录 `migrations/` 下的迁移脚本
static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// 连接池状态快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// 当前打开的连接数
    pub size: u32,
    /// 空闲连接数
    pub idle: usize,
}

/// 账本数据库
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 建立连接池
    #[instrument(skip(config), fields(application_name = %config.application_name))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options =
            PgConnectOptions::from_str(&config.url)?.application_name(&config.application_name);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .test_before_acquire(true)
            .connect_with(options)
            .await?;

        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "数据库连接池已建立"
        );

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 执行一次往返查询并返回连接池状态
    pub async fn health_check(&self) -> Result<PoolStatus> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(PoolStatus {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
        })
    }

    /// 按版本顺序执行尚未应用的迁移
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<()> {
        for migration in MIGRATOR.iter() {
            debug!(
                version = migration.version,
                description = %migration.description,
                "检查迁移"
            );
        }
        MIGRATOR.run(&self.pool).await?;
        info!(schema_version = ?latest_schema_version(), "数据库迁移完成");
        Ok(())
    }

    /// 关闭连接池，等待借出的连接归还
    pub async fn close(&self) {
        self.pool.close().await;
        info!("数据库连接池已关闭");
    }
}

/// 内嵌迁移脚本中的最新版本号
pub fn latest_schema_version() -> Option<i64> {
    MIGRATOR.iter().map(|m| m.version).max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_database_config;

    #[test]
    fn test_migrations_are_embedded() {
        assert_eq!(latest_schema_version(), Some(1));
        assert!(MIGRATOR.iter().any(|m| m.description == "init"));
    }

    #[tokio::test]
    #[ignore] // 需要数据库连接
    async fn test_migrations_create_ledger_tables() {
        let db = Database::connect(&test_database_config()).await.unwrap();
        db.run_migrations().await.unwrap();

        for table in ["accounts", "rulesets", "level_rules", "ledger_events", "operations"] {
            let found: Option<String> = sqlx::query_scalar("SELECT to_regclass($1)::text")
                .bind(format!("public.{table}"))
                .fetch_one(db.pool())
                .await
                .unwrap();
            assert!(found.is_some(), "缺少表 {table}");
        }

        let status = db.health_check().await.unwrap();
        assert!(status.size >= 1);
        db.close().await;
    }
}
