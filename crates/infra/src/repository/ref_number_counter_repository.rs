//! # RefNumberCounterRepository
//!
//! 参照番号（`PR-2026-00001` など）の採番。
//!
//! - **UPSERT による採番**: `INSERT .. ON CONFLICT DO UPDATE .. RETURNING` の 1 文で
//!   行ロックと加算を行い、並行採番でも番号が重複しない
//! - **トランザクション自己完結**: 呼び出し側のトランザクションとは独立してコミットする。
//!   呼び出し側がロールバックした場合は欠番になる

use async_trait::async_trait;
use procureflow_domain::value_objects::{RefNumber, RefPrefix};
use sqlx::PgPool;

use crate::error::InfraError;

/// 参照番号カウンターリポジトリトレイト
#[async_trait]
pub trait RefNumberCounterRepository: Send + Sync {
    /// 種別 × 年の次の参照番号を払い出す
    async fn next_ref_number(&self, prefix: RefPrefix, year: i32)
    -> Result<RefNumber, InfraError>;
}

/// PostgreSQL 実装
pub struct PostgresRefNumberCounterRepository {
    pool: PgPool,
}

impl PostgresRefNumberCounterRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefNumberCounterRepository for PostgresRefNumberCounterRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(%prefix, year))]
    async fn next_ref_number(
        &self,
        prefix: RefPrefix,
        year: i32,
    ) -> Result<RefNumber, InfraError> {
        let prefix_str: &str = prefix.into();
        let (sequence,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO ref_number_counters (prefix, year, last_value)
            VALUES ($1, $2, 1)
            ON CONFLICT (prefix, year)
            DO UPDATE SET last_value = ref_number_counters.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(prefix_str)
        .bind(year)
        .fetch_one(&self.pool)
        .await?;

        RefNumber::new(prefix, year, sequence).map_err(|e| InfraError::unexpected(e.to_string()))
    }
}
