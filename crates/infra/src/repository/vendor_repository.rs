//! # VendorRepository
//!
//! 業者マスタの参照。業者の登録・認定状態の変更は外部の管理機能が担う。

use async_trait::async_trait;
use procureflow_domain::vendor::{AccreditationStatus, Vendor, VendorId};
use sqlx::PgPool;
use uuid::Uuid;

use super::parse_column;
use crate::{db::TxContext, error::InfraError};

/// 業者リポジトリトレイト
#[async_trait]
pub trait VendorRepository: Send + Sync {
    async fn insert(&self, tx: &mut TxContext, vendor: &Vendor) -> Result<(), InfraError>;

    async fn find_by_id(&self, id: &VendorId) -> Result<Option<Vendor>, InfraError>;

    async fn find_by_ids(&self, ids: &[VendorId]) -> Result<Vec<Vendor>, InfraError>;
}

#[derive(Debug, sqlx::FromRow)]
struct VendorRow {
    id: Uuid,
    name: String,
    accreditation_status: String,
}

impl TryFrom<VendorRow> for Vendor {
    type Error = InfraError;

    fn try_from(row: VendorRow) -> Result<Self, Self::Error> {
        Ok(Vendor::from_db(
            VendorId::from_uuid(row.id),
            row.name,
            parse_column::<AccreditationStatus>(
                &row.accreditation_status,
                "accreditation_status",
            )?,
        ))
    }
}

/// PostgreSQL 実装
pub struct PostgresVendorRepository {
    pool: PgPool,
}

impl PostgresVendorRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VendorRepository for PostgresVendorRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(vendor_id = %vendor.id()))]
    async fn insert(&self, tx: &mut TxContext, vendor: &Vendor) -> Result<(), InfraError> {
        let status: &str = vendor.accreditation_status().into();
        sqlx::query("INSERT INTO vendors (id, name, accreditation_status) VALUES ($1, $2, $3)")
            .bind(vendor.id().as_uuid())
            .bind(vendor.name())
            .bind(status)
            .execute(tx.conn())
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%id))]
    async fn find_by_id(&self, id: &VendorId) -> Result<Option<Vendor>, InfraError> {
        let row = sqlx::query_as::<_, VendorRow>(
            "SELECT id, name, accreditation_status FROM vendors WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Vendor::try_from).transpose()
    }

    #[tracing::instrument(skip_all, level = "debug", fields(count = ids.len()))]
    async fn find_by_ids(&self, ids: &[VendorId]) -> Result<Vec<Vendor>, InfraError> {
        let uuids = ids.iter().map(|id| *id.as_uuid()).collect::<Vec<_>>();
        let rows = sqlx::query_as::<_, VendorRow>(
            "SELECT id, name, accreditation_status FROM vendors WHERE id = ANY($1) ORDER BY name",
        )
        .bind(&uuids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Vendor::try_from).collect()
    }
}
