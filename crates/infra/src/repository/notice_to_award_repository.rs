//! # NoticeToAwardRepository
//!
//! 落札通知の永続化。購買申請ごとに 1 件。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use procureflow_domain::{
    award::{AwardBasis, NoticeToAward, NoticeToAwardId, NoticeToAwardRecord, NtaStatus},
    quote::VendorQuoteId,
    requisition::RequisitionId,
    user::UserId,
    value_objects::RefNumber,
    vendor::VendorId,
};
use sqlx::PgPool;
use uuid::Uuid;

use super::parse_column;
use crate::{db::TxContext, error::InfraError};

/// 落札通知リポジトリトレイト
#[async_trait]
pub trait NoticeToAwardRepository: Send + Sync {
    /// 落札通知を作成する
    ///
    /// 同じ購買申請の通知が既にある場合は InvalidInput を返す。
    async fn insert(&self, tx: &mut TxContext, notice: &NoticeToAward) -> Result<(), InfraError>;

    /// 状態を更新する
    ///
    /// DB 上の状態が `expected_status` でなければ Conflict を返す。
    async fn update_status(
        &self,
        tx: &mut TxContext,
        notice: &NoticeToAward,
        expected_status: NtaStatus,
    ) -> Result<(), InfraError>;

    async fn find_by_requisition(
        &self,
        requisition_id: &RequisitionId,
    ) -> Result<Option<NoticeToAward>, InfraError>;
}

#[derive(Debug, sqlx::FromRow)]
struct NoticeToAwardRow {
    id: Uuid,
    ref_number: String,
    requisition_id: Uuid,
    vendor_id: Uuid,
    awarded_quote_id: Uuid,
    award_basis: String,
    override_justification: Option<String>,
    override_authorized_by: Option<Uuid>,
    issued_by: Uuid,
    issued_at: DateTime<Utc>,
    status: String,
    sent_at: Option<DateTime<Utc>>,
}

impl TryFrom<NoticeToAwardRow> for NoticeToAward {
    type Error = InfraError;

    fn try_from(row: NoticeToAwardRow) -> Result<Self, Self::Error> {
        Ok(NoticeToAward::from_db(NoticeToAwardRecord {
            id: NoticeToAwardId::from_uuid(row.id),
            ref_number: parse_column::<RefNumber>(&row.ref_number, "ref_number")?,
            requisition_id: RequisitionId::from_uuid(row.requisition_id),
            vendor_id: VendorId::from_uuid(row.vendor_id),
            awarded_quote_id: VendorQuoteId::from_uuid(row.awarded_quote_id),
            award_basis: parse_column::<AwardBasis>(&row.award_basis, "award_basis")?,
            override_justification: row.override_justification,
            override_authorized_by: row.override_authorized_by.map(UserId::from_uuid),
            issued_by: UserId::from_uuid(row.issued_by),
            issued_at: row.issued_at,
            status: parse_column::<NtaStatus>(&row.status, "status")?,
            sent_at: row.sent_at,
        }))
    }
}

/// PostgreSQL 実装
pub struct PostgresNoticeToAwardRepository {
    pool: PgPool,
}

impl PostgresNoticeToAwardRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NoticeToAwardRepository for PostgresNoticeToAwardRepository {
    #[tracing::instrument(
        skip_all,
        level = "debug",
        fields(notice_id = %notice.id(), requisition_id = %notice.requisition_id())
    )]
    async fn insert(&self, tx: &mut TxContext, notice: &NoticeToAward) -> Result<(), InfraError> {
        let basis: &str = notice.award_basis().into();
        let status: &str = notice.status().into();

        sqlx::query(
            r#"
            INSERT INTO notices_to_award (
                id, ref_number, requisition_id, vendor_id, awarded_quote_id, award_basis,
                override_justification, override_authorized_by, issued_by, issued_at,
                status, sent_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $10, $10)
            "#,
        )
        .bind(notice.id().as_uuid())
        .bind(notice.ref_number().to_string())
        .bind(notice.requisition_id().as_uuid())
        .bind(notice.vendor_id().as_uuid())
        .bind(notice.awarded_quote_id().as_uuid())
        .bind(basis)
        .bind(notice.override_justification())
        .bind(notice.override_authorized_by().map(|id| *id.as_uuid()))
        .bind(notice.issued_by().as_uuid())
        .bind(notice.issued_at())
        .bind(status)
        .bind(notice.sent_at())
        .execute(tx.conn())
        .await
        .map_err(|e| {
            InfraError::from(e).unique_violation_as_input("この購買申請の落札通知は発行済みです")
        })?;

        Ok(())
    }

    #[tracing::instrument(
        skip_all,
        level = "debug",
        fields(notice_id = %notice.id(), status = %notice.status(), %expected_status)
    )]
    async fn update_status(
        &self,
        tx: &mut TxContext,
        notice: &NoticeToAward,
        expected_status: NtaStatus,
    ) -> Result<(), InfraError> {
        let status: &str = notice.status().into();
        let expected: &str = expected_status.into();

        let result = sqlx::query(
            r#"
            UPDATE notices_to_award SET
                status = $1,
                sent_at = $2,
                updated_at = NOW()
            WHERE id = $3 AND status = $4
            "#,
        )
        .bind(status)
        .bind(notice.sent_at())
        .bind(notice.id().as_uuid())
        .bind(expected)
        .execute(tx.conn())
        .await?;

        if result.rows_affected() == 0 {
            return Err(InfraError::conflict("NoticeToAward", notice.id().to_string()));
        }

        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%requisition_id))]
    async fn find_by_requisition(
        &self,
        requisition_id: &RequisitionId,
    ) -> Result<Option<NoticeToAward>, InfraError> {
        let row = sqlx::query_as::<_, NoticeToAwardRow>(
            r#"
            SELECT
                id, ref_number, requisition_id, vendor_id, awarded_quote_id, award_basis,
                override_justification, override_authorized_by, issued_by, issued_at,
                status, sent_at
            FROM notices_to_award
            WHERE requisition_id = $1
            "#,
        )
        .bind(requisition_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(NoticeToAward::try_from).transpose()
    }
}
