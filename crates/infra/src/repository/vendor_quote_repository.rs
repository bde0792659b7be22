//! # VendorQuoteRepository
//!
//! 業者見積と見積明細の永続化。
//!
//! 落札済み見積は購買申請ごとに 1 件までという制約を部分一意インデックスで持つ。
//! 落札の付け替えでは、先に他の見積のフラグを外してから対象に付ける。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use procureflow_domain::{
    quote::{QuoteLine, VendorQuote, VendorQuoteId, VendorQuoteRecord},
    requisition::{RequisitionId, RequisitionLineItemId},
    user::UserId,
    value_objects::Version,
    vendor::VendorId,
};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use super::parse_version;
use crate::{db::TxContext, error::InfraError};

/// 業者見積リポジトリトレイト
#[async_trait]
pub trait VendorQuoteRepository: Send + Sync {
    /// 見積を明細とともに登録する
    ///
    /// 同じ購買申請・業者の見積が既にある場合は InvalidInput を返す。
    async fn insert(&self, tx: &mut TxContext, quote: &VendorQuote) -> Result<(), InfraError>;

    /// 楽観的ロック付きで評価結果・落札フラグを更新する
    async fn update_with_version_check(
        &self,
        tx: &mut TxContext,
        quote: &VendorQuote,
        expected_version: Version,
    ) -> Result<(), InfraError>;

    async fn find_by_id(&self, id: &VendorQuoteId) -> Result<Option<VendorQuote>, InfraError>;

    /// 購買申請の見積を登録順に取得する
    async fn find_by_requisition(
        &self,
        requisition_id: &RequisitionId,
    ) -> Result<Vec<VendorQuote>, InfraError>;
}

#[derive(Debug, sqlx::FromRow)]
struct VendorQuoteRow {
    id: Uuid,
    requisition_id: Uuid,
    vendor_id: Uuid,
    registered_by: Uuid,
    grand_total: Decimal,
    is_complete: bool,
    is_compliant: Option<bool>,
    compliance_notes: Option<String>,
    is_awarded: bool,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct QuoteLineRow {
    quote_id: Uuid,
    line_item_id: Uuid,
    quantity: Decimal,
    unit_price: Decimal,
    line_total: Decimal,
}

impl VendorQuoteRow {
    fn into_quote(self, lines: Vec<QuoteLineRow>) -> Result<VendorQuote, InfraError> {
        Ok(VendorQuote::from_db(VendorQuoteRecord {
            id: VendorQuoteId::from_uuid(self.id),
            requisition_id: RequisitionId::from_uuid(self.requisition_id),
            vendor_id: VendorId::from_uuid(self.vendor_id),
            lines: lines
                .into_iter()
                .map(|line| {
                    QuoteLine::from_db(
                        RequisitionLineItemId::from_uuid(line.line_item_id),
                        line.quantity,
                        line.unit_price,
                        line.line_total,
                    )
                })
                .collect(),
            grand_total: self.grand_total,
            is_complete: self.is_complete,
            is_compliant: self.is_compliant,
            compliance_notes: self.compliance_notes,
            is_awarded: self.is_awarded,
            registered_by: UserId::from_uuid(self.registered_by),
            version: parse_version(self.version)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }))
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT
        id, requisition_id, vendor_id, registered_by, grand_total, is_complete,
        is_compliant, compliance_notes, is_awarded, version, created_at, updated_at
    FROM vendor_quotes
"#;

/// PostgreSQL 実装
pub struct PostgresVendorQuoteRepository {
    pool: PgPool,
}

impl PostgresVendorQuoteRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn assemble(&self, rows: Vec<VendorQuoteRow>) -> Result<Vec<VendorQuote>, InfraError> {
        let ids = rows.iter().map(|row| row.id).collect::<Vec<_>>();
        let lines = sqlx::query_as::<_, QuoteLineRow>(
            r#"
            SELECT q.quote_id, q.line_item_id, q.quantity, q.unit_price, q.line_total
            FROM quote_line_items q
            JOIN requisition_line_items l ON l.id = q.line_item_id
            WHERE q.quote_id = ANY($1)
            ORDER BY q.quote_id, l.sort_order
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<Uuid, Vec<QuoteLineRow>> = HashMap::new();
        for line in lines {
            grouped.entry(line.quote_id).or_default().push(line);
        }

        rows.into_iter()
            .map(|row| {
                let lines = grouped.remove(&row.id).unwrap_or_default();
                row.into_quote(lines)
            })
            .collect()
    }
}

#[async_trait]
impl VendorQuoteRepository for PostgresVendorQuoteRepository {
    #[tracing::instrument(
        skip_all,
        level = "debug",
        fields(quote_id = %quote.id(), requisition_id = %quote.requisition_id(), vendor_id = %quote.vendor_id())
    )]
    async fn insert(&self, tx: &mut TxContext, quote: &VendorQuote) -> Result<(), InfraError> {
        sqlx::query(
            r#"
            INSERT INTO vendor_quotes (
                id, requisition_id, vendor_id, registered_by, grand_total, is_complete,
                is_compliant, compliance_notes, is_awarded, version, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(quote.id().as_uuid())
        .bind(quote.requisition_id().as_uuid())
        .bind(quote.vendor_id().as_uuid())
        .bind(quote.registered_by().as_uuid())
        .bind(quote.grand_total())
        .bind(quote.is_complete())
        .bind(quote.is_compliant())
        .bind(quote.compliance_notes())
        .bind(quote.is_awarded())
        .bind(quote.version().as_i32())
        .bind(quote.created_at())
        .bind(quote.updated_at())
        .execute(tx.conn())
        .await
        .map_err(|e| {
            InfraError::from(e).unique_violation_as_input("この業者の見積は登録済みです")
        })?;

        for line in quote.lines() {
            sqlx::query(
                r#"
                INSERT INTO quote_line_items (quote_id, line_item_id, quantity, unit_price, line_total)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(quote.id().as_uuid())
            .bind(line.line_item_id().as_uuid())
            .bind(line.quantity())
            .bind(line.unit_price())
            .bind(line.line_total())
            .execute(tx.conn())
            .await?;
        }

        Ok(())
    }

    #[tracing::instrument(
        skip_all,
        level = "debug",
        fields(quote_id = %quote.id(), expected_version = %expected_version)
    )]
    async fn update_with_version_check(
        &self,
        tx: &mut TxContext,
        quote: &VendorQuote,
        expected_version: Version,
    ) -> Result<(), InfraError> {
        let result = sqlx::query(
            r#"
            UPDATE vendor_quotes SET
                is_compliant = $1,
                compliance_notes = $2,
                is_awarded = $3,
                version = $4,
                updated_at = $5
            WHERE id = $6 AND version = $7
            "#,
        )
        .bind(quote.is_compliant())
        .bind(quote.compliance_notes())
        .bind(quote.is_awarded())
        .bind(quote.version().as_i32())
        .bind(quote.updated_at())
        .bind(quote.id().as_uuid())
        .bind(expected_version.as_i32())
        .execute(tx.conn())
        .await?;

        if result.rows_affected() == 0 {
            return Err(InfraError::conflict("VendorQuote", quote.id().to_string()));
        }

        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%id))]
    async fn find_by_id(&self, id: &VendorQuoteId) -> Result<Option<VendorQuote>, InfraError> {
        let row = sqlx::query_as::<_, VendorQuoteRow>(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut quotes = self.assemble(vec![row]).await?;
        Ok(quotes.pop())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%requisition_id))]
    async fn find_by_requisition(
        &self,
        requisition_id: &RequisitionId,
    ) -> Result<Vec<VendorQuote>, InfraError> {
        let rows = sqlx::query_as::<_, VendorQuoteRow>(&format!(
            "{SELECT_COLUMNS} WHERE requisition_id = $1 ORDER BY created_at, id"
        ))
        .bind(requisition_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        self.assemble(rows).await
    }
}
