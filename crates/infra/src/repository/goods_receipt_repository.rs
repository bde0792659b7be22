//! # GoodsReceiptRepository
//!
//! 検収記録と検収明細の永続化。追記のみ。
//!
//! 登録時は発注書の行をロックしてから書き込み、検収累計が発注数量を
//! 超えていないことを同じトランザクション内で確かめる。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use procureflow_domain::{
    purchase_order::{
        GoodsReceipt,
        GoodsReceiptId,
        GoodsReceiptLine,
        GoodsReceiptRecord,
        PurchaseOrderId,
        PurchaseOrderLineId,
    },
    user::UserId,
    value_objects::RefNumber,
};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use super::parse_column;
use crate::{db::TxContext, error::InfraError};

/// 検収記録リポジトリトレイト
#[async_trait]
pub trait GoodsReceiptRepository: Send + Sync {
    /// 検収記録を明細とともに登録する
    ///
    /// 書き込み後に検収累計が発注数量を超える明細があれば Conflict を返す。
    async fn insert(&self, tx: &mut TxContext, receipt: &GoodsReceipt) -> Result<(), InfraError>;

    /// 発注書の検収記録を登録順に取得する
    async fn find_by_purchase_order(
        &self,
        purchase_order_id: &PurchaseOrderId,
    ) -> Result<Vec<GoodsReceipt>, InfraError>;
}

#[derive(Debug, sqlx::FromRow)]
struct GoodsReceiptRow {
    id: Uuid,
    ref_number: String,
    purchase_order_id: Uuid,
    received_date: NaiveDate,
    received_by: Uuid,
    remarks: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct GoodsReceiptLineRow {
    goods_receipt_id: Uuid,
    po_line_id: Uuid,
    quantity_received: Decimal,
    remarks: Option<String>,
}

impl GoodsReceiptRow {
    fn into_receipt(self, lines: Vec<GoodsReceiptLineRow>) -> Result<GoodsReceipt, InfraError> {
        Ok(GoodsReceipt::from_db(GoodsReceiptRecord {
            id: GoodsReceiptId::from_uuid(self.id),
            ref_number: parse_column::<RefNumber>(&self.ref_number, "ref_number")?,
            purchase_order_id: PurchaseOrderId::from_uuid(self.purchase_order_id),
            received_date: self.received_date,
            received_by: UserId::from_uuid(self.received_by),
            remarks: self.remarks,
            lines: lines
                .into_iter()
                .map(|line| GoodsReceiptLine {
                    po_line_id:        PurchaseOrderLineId::from_uuid(line.po_line_id),
                    quantity_received: line.quantity_received,
                    remarks:           line.remarks,
                })
                .collect(),
            created_at: self.created_at,
        }))
    }
}

/// PostgreSQL 実装
pub struct PostgresGoodsReceiptRepository {
    pool: PgPool,
}

impl PostgresGoodsReceiptRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GoodsReceiptRepository for PostgresGoodsReceiptRepository {
    #[tracing::instrument(
        skip_all,
        level = "debug",
        fields(receipt_id = %receipt.id(), purchase_order_id = %receipt.purchase_order_id())
    )]
    async fn insert(&self, tx: &mut TxContext, receipt: &GoodsReceipt) -> Result<(), InfraError> {
        // 同じ発注書への検収を直列化する
        sqlx::query("SELECT id FROM purchase_orders WHERE id = $1 FOR UPDATE")
            .bind(receipt.purchase_order_id().as_uuid())
            .execute(tx.conn())
            .await?;

        sqlx::query(
            r#"
            INSERT INTO goods_receipts (
                id, ref_number, purchase_order_id, received_date, received_by, remarks, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(receipt.id().as_uuid())
        .bind(receipt.ref_number().to_string())
        .bind(receipt.purchase_order_id().as_uuid())
        .bind(receipt.received_date())
        .bind(receipt.received_by().as_uuid())
        .bind(receipt.remarks())
        .bind(receipt.created_at())
        .execute(tx.conn())
        .await?;

        for (line, sort_order) in receipt.lines().iter().zip(1_i32..) {
            sqlx::query(
                r#"
                INSERT INTO goods_receipt_lines (
                    goods_receipt_id, po_line_id, quantity_received, remarks, sort_order
                ) VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(receipt.id().as_uuid())
            .bind(line.po_line_id.as_uuid())
            .bind(line.quantity_received)
            .bind(line.remarks.as_deref())
            .bind(sort_order)
            .execute(tx.conn())
            .await?;
        }

        let over_received: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM purchase_order_lines l
                JOIN goods_receipt_lines g ON g.po_line_id = l.id
                WHERE l.purchase_order_id = $1
                GROUP BY l.id, l.quantity
                HAVING SUM(g.quantity_received) > l.quantity
            )
            "#,
        )
        .bind(receipt.purchase_order_id().as_uuid())
        .fetch_one(tx.conn())
        .await?;

        if over_received {
            return Err(InfraError::conflict(
                "PurchaseOrder",
                receipt.purchase_order_id().to_string(),
            ));
        }

        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%purchase_order_id))]
    async fn find_by_purchase_order(
        &self,
        purchase_order_id: &PurchaseOrderId,
    ) -> Result<Vec<GoodsReceipt>, InfraError> {
        let rows = sqlx::query_as::<_, GoodsReceiptRow>(
            r#"
            SELECT id, ref_number, purchase_order_id, received_date, received_by, remarks, created_at
            FROM goods_receipts
            WHERE purchase_order_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(purchase_order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        let ids = rows.iter().map(|row| row.id).collect::<Vec<_>>();
        let lines = sqlx::query_as::<_, GoodsReceiptLineRow>(
            r#"
            SELECT goods_receipt_id, po_line_id, quantity_received, remarks
            FROM goods_receipt_lines
            WHERE goods_receipt_id = ANY($1)
            ORDER BY goods_receipt_id, sort_order
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<Uuid, Vec<GoodsReceiptLineRow>> = HashMap::new();
        for line in lines {
            grouped.entry(line.goods_receipt_id).or_default().push(line);
        }

        rows.into_iter()
            .map(|row| {
                let lines = grouped.remove(&row.id).unwrap_or_default();
                row.into_receipt(lines)
            })
            .collect()
    }
}
