//! # PaymentRequestRepository
//!
//! 支払申請と明細の永続化。伝票番号（APV / CV / 小切手番号）は本体の列に持つ。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use procureflow_domain::{
    case::{CaseState, CaseStatus},
    payment_request::{
        Disbursement,
        PaymentLineItem,
        PaymentLineItemId,
        PaymentRequest,
        PaymentRequestId,
        PaymentRequestRecord,
        RequestType,
    },
    requisition::RequisitionId,
    user::UserId,
    value_objects::{CaseTitle, RefNumber, Version},
};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use super::{CaseStateColumns, parse_column};
use crate::{db::TxContext, error::InfraError};

/// 支払申請リポジトリトレイト
#[async_trait]
pub trait PaymentRequestRepository: Send + Sync {
    async fn insert(
        &self,
        tx: &mut TxContext,
        payment_request: &PaymentRequest,
    ) -> Result<(), InfraError>;

    /// 楽観的ロック付きで申請本体（ヘッダー、伝票番号、状態）を更新する
    async fn update_with_version_check(
        &self,
        tx: &mut TxContext,
        payment_request: &PaymentRequest,
        expected_version: Version,
    ) -> Result<(), InfraError>;

    /// 明細を丸ごと置き換える
    async fn replace_line_items(
        &self,
        tx: &mut TxContext,
        payment_request: &PaymentRequest,
    ) -> Result<(), InfraError>;

    async fn find_by_id(&self, id: &PaymentRequestId)
    -> Result<Option<PaymentRequest>, InfraError>;

    /// ステータスで絞り込んだ一覧（作成日時の降順）
    async fn find_all(
        &self,
        status: Option<CaseStatus>,
    ) -> Result<Vec<PaymentRequest>, InfraError>;
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentRequestRow {
    id: Uuid,
    ref_number: String,
    request_type: String,
    requisition_id: Option<Uuid>,
    title: String,
    particulars: Option<String>,
    payee_name: String,
    amount: Decimal,
    due_date: Option<NaiveDate>,
    department: String,
    requested_by: Uuid,
    apv_number: Option<String>,
    cv_number: Option<String>,
    check_number: Option<String>,
    created_at: DateTime<Utc>,
    #[sqlx(flatten)]
    state: CaseStateColumns,
}

#[derive(Debug, sqlx::FromRow)]
struct LineItemRow {
    id: Uuid,
    payment_request_id: Uuid,
    description: String,
    amount: Decimal,
    sort_order: i32,
}

impl PaymentRequestRow {
    fn into_payment_request(
        self,
        line_items: Vec<LineItemRow>,
    ) -> Result<PaymentRequest, InfraError> {
        Ok(PaymentRequest::from_db(PaymentRequestRecord {
            id: PaymentRequestId::from_uuid(self.id),
            ref_number: parse_column::<RefNumber>(&self.ref_number, "ref_number")?,
            request_type: parse_column::<RequestType>(&self.request_type, "request_type")?,
            requisition_id: self.requisition_id.map(RequisitionId::from_uuid),
            title: CaseTitle::new(self.title).map_err(|e| InfraError::unexpected(e.to_string()))?,
            particulars: self.particulars,
            payee_name: self.payee_name,
            amount: self.amount,
            due_date: self.due_date,
            department: self.department,
            requested_by: UserId::from_uuid(self.requested_by),
            line_items: line_items
                .into_iter()
                .map(|row| {
                    PaymentLineItem::from_db(
                        PaymentLineItemId::from_uuid(row.id),
                        row.description,
                        row.amount,
                        row.sort_order,
                    )
                })
                .collect(),
            disbursement: Disbursement {
                apv_number:   self.apv_number,
                cv_number:    self.cv_number,
                check_number: self.check_number,
            },
            state: CaseState::try_from(self.state)?,
            created_at: self.created_at,
        }))
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT
        id, ref_number, request_type, requisition_id, title, particulars, payee_name,
        amount, due_date, department, requested_by, apv_number, cv_number, check_number,
        status, status_before_hold, hold_reason, sla_deadline, sla_paused_at,
        version, created_at, updated_at
    FROM payment_requests
"#;

/// PostgreSQL 実装
pub struct PostgresPaymentRequestRepository {
    pool: PgPool,
}

impl PostgresPaymentRequestRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_line_items(&self, ids: &[Uuid]) -> Result<Vec<LineItemRow>, InfraError> {
        let rows = sqlx::query_as::<_, LineItemRow>(
            r#"
            SELECT id, payment_request_id, description, amount, sort_order
            FROM payment_line_items
            WHERE payment_request_id = ANY($1)
            ORDER BY payment_request_id, sort_order
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

async fn insert_line_items(
    tx: &mut TxContext,
    payment_request: &PaymentRequest,
) -> Result<(), InfraError> {
    for item in payment_request.line_items() {
        sqlx::query(
            r#"
            INSERT INTO payment_line_items (id, payment_request_id, description, amount, sort_order)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(item.id().as_uuid())
        .bind(payment_request.id().as_uuid())
        .bind(item.description())
        .bind(item.amount())
        .bind(item.sort_order())
        .execute(tx.conn())
        .await?;
    }
    Ok(())
}

#[async_trait]
impl PaymentRequestRepository for PostgresPaymentRequestRepository {
    #[tracing::instrument(
        skip_all,
        level = "debug",
        fields(payment_request_id = %payment_request.id(), ref_number = %payment_request.ref_number())
    )]
    async fn insert(
        &self,
        tx: &mut TxContext,
        payment_request: &PaymentRequest,
    ) -> Result<(), InfraError> {
        let state = payment_request.state();
        let request_type: &str = payment_request.request_type().into();
        let status: &str = state.status().into();
        let status_before_hold: Option<&str> = state.status_before_hold().map(Into::into);
        let disbursement = payment_request.disbursement();

        sqlx::query(
            r#"
            INSERT INTO payment_requests (
                id, ref_number, request_type, requisition_id, title, particulars, payee_name,
                amount, due_date, department, requested_by, apv_number, cv_number, check_number,
                status, status_before_hold, hold_reason, sla_deadline, sla_paused_at,
                version, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11,
                $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22
            )
            "#,
        )
        .bind(payment_request.id().as_uuid())
        .bind(payment_request.ref_number().to_string())
        .bind(request_type)
        .bind(payment_request.requisition_id().map(|id| *id.as_uuid()))
        .bind(payment_request.title().as_str())
        .bind(payment_request.particulars())
        .bind(payment_request.payee_name())
        .bind(payment_request.amount())
        .bind(payment_request.due_date())
        .bind(payment_request.department())
        .bind(payment_request.requested_by().as_uuid())
        .bind(disbursement.apv_number.as_deref())
        .bind(disbursement.cv_number.as_deref())
        .bind(disbursement.check_number.as_deref())
        .bind(status)
        .bind(status_before_hold)
        .bind(state.hold_reason())
        .bind(state.sla().deadline())
        .bind(state.sla().paused_at())
        .bind(state.version().as_i32())
        .bind(payment_request.created_at())
        .bind(state.updated_at())
        .execute(tx.conn())
        .await
        .map_err(|e| {
            InfraError::from(e).unique_violation_as_input("参照番号が重複しています")
        })?;

        insert_line_items(tx, payment_request).await
    }

    #[tracing::instrument(
        skip_all,
        level = "debug",
        fields(payment_request_id = %payment_request.id(), expected_version = %expected_version)
    )]
    async fn update_with_version_check(
        &self,
        tx: &mut TxContext,
        payment_request: &PaymentRequest,
        expected_version: Version,
    ) -> Result<(), InfraError> {
        let state = payment_request.state();
        let request_type: &str = payment_request.request_type().into();
        let status: &str = state.status().into();
        let status_before_hold: Option<&str> = state.status_before_hold().map(Into::into);
        let disbursement = payment_request.disbursement();

        let result = sqlx::query(
            r#"
            UPDATE payment_requests SET
                request_type = $1,
                requisition_id = $2,
                title = $3,
                particulars = $4,
                payee_name = $5,
                amount = $6,
                due_date = $7,
                department = $8,
                apv_number = $9,
                cv_number = $10,
                check_number = $11,
                status = $12,
                status_before_hold = $13,
                hold_reason = $14,
                sla_deadline = $15,
                sla_paused_at = $16,
                version = $17,
                updated_at = $18
            WHERE id = $19 AND version = $20
            "#,
        )
        .bind(request_type)
        .bind(payment_request.requisition_id().map(|id| *id.as_uuid()))
        .bind(payment_request.title().as_str())
        .bind(payment_request.particulars())
        .bind(payment_request.payee_name())
        .bind(payment_request.amount())
        .bind(payment_request.due_date())
        .bind(payment_request.department())
        .bind(disbursement.apv_number.as_deref())
        .bind(disbursement.cv_number.as_deref())
        .bind(disbursement.check_number.as_deref())
        .bind(status)
        .bind(status_before_hold)
        .bind(state.hold_reason())
        .bind(state.sla().deadline())
        .bind(state.sla().paused_at())
        .bind(state.version().as_i32())
        .bind(state.updated_at())
        .bind(payment_request.id().as_uuid())
        .bind(expected_version.as_i32())
        .execute(tx.conn())
        .await?;

        if result.rows_affected() == 0 {
            return Err(InfraError::conflict(
                "PaymentRequest",
                payment_request.id().to_string(),
            ));
        }

        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(payment_request_id = %payment_request.id()))]
    async fn replace_line_items(
        &self,
        tx: &mut TxContext,
        payment_request: &PaymentRequest,
    ) -> Result<(), InfraError> {
        sqlx::query("DELETE FROM payment_line_items WHERE payment_request_id = $1")
            .bind(payment_request.id().as_uuid())
            .execute(tx.conn())
            .await?;

        insert_line_items(tx, payment_request).await
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%id))]
    async fn find_by_id(
        &self,
        id: &PaymentRequestId,
    ) -> Result<Option<PaymentRequest>, InfraError> {
        let row =
            sqlx::query_as::<_, PaymentRequestRow>(&format!("{SELECT_COLUMNS} WHERE id = $1"))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let line_items = self.load_line_items(&[row.id]).await?;
        row.into_payment_request(line_items).map(Some)
    }

    #[tracing::instrument(skip_all, level = "debug", fields(status = ?status))]
    async fn find_all(
        &self,
        status: Option<CaseStatus>,
    ) -> Result<Vec<PaymentRequest>, InfraError> {
        let status: Option<&str> = status.map(Into::into);
        let rows = sqlx::query_as::<_, PaymentRequestRow>(&format!(
            "{SELECT_COLUMNS} WHERE ($1::TEXT IS NULL OR status = $1) ORDER BY created_at DESC"
        ))
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        let ids = rows.iter().map(|row| row.id).collect::<Vec<_>>();
        let mut grouped: HashMap<Uuid, Vec<LineItemRow>> = HashMap::new();
        for item in self.load_line_items(&ids).await? {
            grouped.entry(item.payment_request_id).or_default().push(item);
        }

        rows.into_iter()
            .map(|row| {
                let line_items = grouped.remove(&row.id).unwrap_or_default();
                row.into_payment_request(line_items)
            })
            .collect()
    }
}
