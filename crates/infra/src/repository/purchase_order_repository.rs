//! # PurchaseOrderRepository
//!
//! 発注書と発注明細の永続化。購買申請ごとに 1 件。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use procureflow_domain::{
    purchase_order::{
        PoStatus,
        PurchaseOrder,
        PurchaseOrderId,
        PurchaseOrderLine,
        PurchaseOrderLineId,
        PurchaseOrderLineRecord,
        PurchaseOrderRecord,
        PurchaseOrderTerms,
    },
    quote::VendorQuoteId,
    requisition::{RequisitionId, RequisitionLineItemId},
    user::UserId,
    value_objects::RefNumber,
    vendor::VendorId,
};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use super::parse_column;
use crate::{db::TxContext, error::InfraError};

/// 発注書リポジトリトレイト
#[async_trait]
pub trait PurchaseOrderRepository: Send + Sync {
    /// 発注書を明細とともに作成する
    ///
    /// 同じ購買申請の発注書が既にある場合は InvalidInput を返す。
    async fn insert(&self, tx: &mut TxContext, order: &PurchaseOrder) -> Result<(), InfraError>;

    /// 状態を更新する
    ///
    /// DB 上の状態が `expected_status` でなければ Conflict を返す。
    async fn update_status(
        &self,
        tx: &mut TxContext,
        order: &PurchaseOrder,
        expected_status: PoStatus,
    ) -> Result<(), InfraError>;

    async fn find_by_requisition(
        &self,
        requisition_id: &RequisitionId,
    ) -> Result<Option<PurchaseOrder>, InfraError>;
}

#[derive(Debug, sqlx::FromRow)]
struct PurchaseOrderRow {
    id: Uuid,
    ref_number: String,
    requisition_id: Uuid,
    vendor_id: Uuid,
    awarded_quote_id: Uuid,
    delivery_terms: Option<String>,
    payment_terms: Option<String>,
    grand_total: Decimal,
    issued_by: Uuid,
    issued_at: DateTime<Utc>,
    status: String,
    sent_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, sqlx::FromRow)]
struct PurchaseOrderLineRow {
    id: Uuid,
    line_item_id: Uuid,
    description: String,
    unit: String,
    quantity: Decimal,
    unit_price: Decimal,
    line_total: Decimal,
}

impl PurchaseOrderRow {
    fn into_order(self, lines: Vec<PurchaseOrderLineRow>) -> Result<PurchaseOrder, InfraError> {
        Ok(PurchaseOrder::from_db(PurchaseOrderRecord {
            id: PurchaseOrderId::from_uuid(self.id),
            ref_number: parse_column::<RefNumber>(&self.ref_number, "ref_number")?,
            requisition_id: RequisitionId::from_uuid(self.requisition_id),
            vendor_id: VendorId::from_uuid(self.vendor_id),
            awarded_quote_id: VendorQuoteId::from_uuid(self.awarded_quote_id),
            terms: PurchaseOrderTerms {
                delivery_terms: self.delivery_terms,
                payment_terms:  self.payment_terms,
            },
            grand_total: self.grand_total,
            lines: lines
                .into_iter()
                .map(|line| {
                    PurchaseOrderLine::from_db(PurchaseOrderLineRecord {
                        id:           PurchaseOrderLineId::from_uuid(line.id),
                        line_item_id: RequisitionLineItemId::from_uuid(line.line_item_id),
                        description:  line.description,
                        unit:         line.unit,
                        quantity:     line.quantity,
                        unit_price:   line.unit_price,
                        line_total:   line.line_total,
                    })
                })
                .collect(),
            issued_by: UserId::from_uuid(self.issued_by),
            issued_at: self.issued_at,
            status: parse_column::<PoStatus>(&self.status, "status")?,
            sent_at: self.sent_at,
            completed_at: self.completed_at,
        }))
    }
}

/// PostgreSQL 実装
pub struct PostgresPurchaseOrderRepository {
    pool: PgPool,
}

impl PostgresPurchaseOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PurchaseOrderRepository for PostgresPurchaseOrderRepository {
    #[tracing::instrument(
        skip_all,
        level = "debug",
        fields(order_id = %order.id(), requisition_id = %order.requisition_id())
    )]
    async fn insert(&self, tx: &mut TxContext, order: &PurchaseOrder) -> Result<(), InfraError> {
        let status: &str = order.status().into();

        sqlx::query(
            r#"
            INSERT INTO purchase_orders (
                id, ref_number, requisition_id, vendor_id, awarded_quote_id,
                delivery_terms, payment_terms, grand_total, issued_by, issued_at,
                status, sent_at, completed_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $10, $10)
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.ref_number().to_string())
        .bind(order.requisition_id().as_uuid())
        .bind(order.vendor_id().as_uuid())
        .bind(order.awarded_quote_id().as_uuid())
        .bind(order.terms().delivery_terms.as_deref())
        .bind(order.terms().payment_terms.as_deref())
        .bind(order.grand_total())
        .bind(order.issued_by().as_uuid())
        .bind(order.issued_at())
        .bind(status)
        .bind(order.sent_at())
        .bind(order.completed_at())
        .execute(tx.conn())
        .await
        .map_err(|e| {
            InfraError::from(e).unique_violation_as_input("この購買申請の発注書は発行済みです")
        })?;

        for (line, sort_order) in order.lines().iter().zip(1_i32..) {
            sqlx::query(
                r#"
                INSERT INTO purchase_order_lines (
                    id, purchase_order_id, line_item_id, description, unit,
                    quantity, unit_price, line_total, sort_order
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(line.id().as_uuid())
            .bind(order.id().as_uuid())
            .bind(line.line_item_id().as_uuid())
            .bind(line.description())
            .bind(line.unit())
            .bind(line.quantity())
            .bind(line.unit_price())
            .bind(line.line_total())
            .bind(sort_order)
            .execute(tx.conn())
            .await?;
        }

        Ok(())
    }

    #[tracing::instrument(
        skip_all,
        level = "debug",
        fields(order_id = %order.id(), status = %order.status(), %expected_status)
    )]
    async fn update_status(
        &self,
        tx: &mut TxContext,
        order: &PurchaseOrder,
        expected_status: PoStatus,
    ) -> Result<(), InfraError> {
        let status: &str = order.status().into();
        let expected: &str = expected_status.into();

        let result = sqlx::query(
            r#"
            UPDATE purchase_orders SET
                status = $1,
                sent_at = $2,
                completed_at = $3,
                updated_at = NOW()
            WHERE id = $4 AND status = $5
            "#,
        )
        .bind(status)
        .bind(order.sent_at())
        .bind(order.completed_at())
        .bind(order.id().as_uuid())
        .bind(expected)
        .execute(tx.conn())
        .await?;

        if result.rows_affected() == 0 {
            return Err(InfraError::conflict("PurchaseOrder", order.id().to_string()));
        }

        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%requisition_id))]
    async fn find_by_requisition(
        &self,
        requisition_id: &RequisitionId,
    ) -> Result<Option<PurchaseOrder>, InfraError> {
        let row = sqlx::query_as::<_, PurchaseOrderRow>(
            r#"
            SELECT
                id, ref_number, requisition_id, vendor_id, awarded_quote_id,
                delivery_terms, payment_terms, grand_total, issued_by, issued_at,
                status, sent_at, completed_at
            FROM purchase_orders
            WHERE requisition_id = $1
            "#,
        )
        .bind(requisition_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let lines = sqlx::query_as::<_, PurchaseOrderLineRow>(
            r#"
            SELECT id, line_item_id, description, unit, quantity, unit_price, line_total
            FROM purchase_order_lines
            WHERE purchase_order_id = $1
            ORDER BY sort_order
            "#,
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await?;

        row.into_order(lines).map(Some)
    }
}
