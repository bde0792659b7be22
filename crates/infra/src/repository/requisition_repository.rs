//! # RequisitionRepository
//!
//! 購買申請と明細の永続化。
//!
//! 明細は `requisition_line_items` に別テーブルで保持する。
//! ステータス遷移では明細を書き換えないため、明細の置き換えは
//! [`RequisitionRepository::replace_line_items`] に分けている
//! （見積明細が申請明細を参照しているため）。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use procureflow_domain::{
    case::{CaseState, CaseStatus},
    requisition::{
        Priority,
        Requisition,
        RequisitionId,
        RequisitionLineItem,
        RequisitionLineItemId,
        RequisitionLineItemRecord,
        RequisitionRecord,
    },
    user::UserId,
    value_objects::{CaseTitle, RefNumber, Version},
};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use super::{CaseStateColumns, parse_column};
use crate::{db::TxContext, error::InfraError};

/// 購買申請リポジトリトレイト
#[async_trait]
pub trait RequisitionRepository: Send + Sync {
    /// 新規申請を明細とともに作成する
    async fn insert(&self, tx: &mut TxContext, requisition: &Requisition)
    -> Result<(), InfraError>;

    /// 楽観的ロック付きで申請本体（ヘッダーと状態）を更新する
    ///
    /// `expected_version` と DB 上のバージョンが一致しない場合は Conflict を返す。
    async fn update_with_version_check(
        &self,
        tx: &mut TxContext,
        requisition: &Requisition,
        expected_version: Version,
    ) -> Result<(), InfraError>;

    /// 明細を丸ごと置き換える
    async fn replace_line_items(
        &self,
        tx: &mut TxContext,
        requisition: &Requisition,
    ) -> Result<(), InfraError>;

    async fn find_by_id(&self, id: &RequisitionId) -> Result<Option<Requisition>, InfraError>;

    /// ステータスで絞り込んだ一覧（作成日時の降順）
    async fn find_all(&self, status: Option<CaseStatus>) -> Result<Vec<Requisition>, InfraError>;
}

#[derive(Debug, sqlx::FromRow)]
struct RequisitionRow {
    id: Uuid,
    ref_number: String,
    title: String,
    department: String,
    requested_by: Uuid,
    date_needed: Option<NaiveDate>,
    priority: String,
    description: Option<String>,
    estimated_total: Decimal,
    provided_document_types: Vec<String>,
    checklist_satisfied: bool,
    created_at: DateTime<Utc>,
    #[sqlx(flatten)]
    state: CaseStateColumns,
}

#[derive(Debug, sqlx::FromRow)]
struct LineItemRow {
    id: Uuid,
    requisition_id: Uuid,
    description: String,
    unit: String,
    quantity: Decimal,
    estimated_unit_cost: Decimal,
    line_total: Decimal,
    sort_order: i32,
}

impl From<LineItemRow> for RequisitionLineItem {
    fn from(row: LineItemRow) -> Self {
        RequisitionLineItem::from_db(RequisitionLineItemRecord {
            id:                  RequisitionLineItemId::from_uuid(row.id),
            description:         row.description,
            unit:                row.unit,
            quantity:            row.quantity,
            estimated_unit_cost: row.estimated_unit_cost,
            line_total:          row.line_total,
            sort_order:          row.sort_order,
        })
    }
}

impl RequisitionRow {
    fn into_requisition(self, line_items: Vec<LineItemRow>) -> Result<Requisition, InfraError> {
        Ok(Requisition::from_db(RequisitionRecord {
            id: RequisitionId::from_uuid(self.id),
            ref_number: parse_column::<RefNumber>(&self.ref_number, "ref_number")?,
            title: CaseTitle::new(self.title).map_err(|e| InfraError::unexpected(e.to_string()))?,
            department: self.department,
            requested_by: UserId::from_uuid(self.requested_by),
            date_needed: self.date_needed,
            priority: parse_column::<Priority>(&self.priority, "priority")?,
            description: self.description,
            line_items: line_items.into_iter().map(RequisitionLineItem::from).collect(),
            estimated_total: self.estimated_total,
            provided_document_types: self.provided_document_types,
            checklist_satisfied: self.checklist_satisfied,
            state: CaseState::try_from(self.state)?,
            created_at: self.created_at,
        }))
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT
        id, ref_number, title, department, requested_by, date_needed, priority,
        description, estimated_total, provided_document_types, checklist_satisfied,
        status, status_before_hold, hold_reason, sla_deadline, sla_paused_at,
        version, created_at, updated_at
    FROM requisitions
"#;

/// PostgreSQL 実装
pub struct PostgresRequisitionRepository {
    pool: PgPool,
}

impl PostgresRequisitionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_line_items(&self, ids: &[Uuid]) -> Result<Vec<LineItemRow>, InfraError> {
        let rows = sqlx::query_as::<_, LineItemRow>(
            r#"
            SELECT
                id, requisition_id, description, unit, quantity,
                estimated_unit_cost, line_total, sort_order
            FROM requisition_line_items
            WHERE requisition_id = ANY($1)
            ORDER BY requisition_id, sort_order
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn assemble(&self, rows: Vec<RequisitionRow>) -> Result<Vec<Requisition>, InfraError> {
        let ids = rows.iter().map(|row| row.id).collect::<Vec<_>>();
        let mut grouped: HashMap<Uuid, Vec<LineItemRow>> = HashMap::new();
        for item in self.load_line_items(&ids).await? {
            grouped.entry(item.requisition_id).or_default().push(item);
        }

        rows.into_iter()
            .map(|row| {
                let line_items = grouped.remove(&row.id).unwrap_or_default();
                row.into_requisition(line_items)
            })
            .collect()
    }
}

async fn insert_line_items(
    tx: &mut TxContext,
    requisition: &Requisition,
) -> Result<(), InfraError> {
    for item in requisition.line_items() {
        sqlx::query(
            r#"
            INSERT INTO requisition_line_items (
                id, requisition_id, description, unit, quantity,
                estimated_unit_cost, line_total, sort_order
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(item.id().as_uuid())
        .bind(requisition.id().as_uuid())
        .bind(item.description())
        .bind(item.unit())
        .bind(item.quantity())
        .bind(item.estimated_unit_cost())
        .bind(item.line_total())
        .bind(item.sort_order())
        .execute(tx.conn())
        .await?;
    }
    Ok(())
}

#[async_trait]
impl RequisitionRepository for PostgresRequisitionRepository {
    #[tracing::instrument(
        skip_all,
        level = "debug",
        fields(requisition_id = %requisition.id(), ref_number = %requisition.ref_number())
    )]
    async fn insert(
        &self,
        tx: &mut TxContext,
        requisition: &Requisition,
    ) -> Result<(), InfraError> {
        let state = requisition.state();
        let priority: &str = requisition.priority().into();
        let status: &str = state.status().into();
        let status_before_hold: Option<&str> = state.status_before_hold().map(Into::into);

        sqlx::query(
            r#"
            INSERT INTO requisitions (
                id, ref_number, title, department, requested_by, date_needed, priority,
                description, estimated_total, provided_document_types, checklist_satisfied,
                status, status_before_hold, hold_reason, sla_deadline, sla_paused_at,
                version, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18, $19
            )
            "#,
        )
        .bind(requisition.id().as_uuid())
        .bind(requisition.ref_number().to_string())
        .bind(requisition.title().as_str())
        .bind(requisition.department())
        .bind(requisition.requested_by().as_uuid())
        .bind(requisition.date_needed())
        .bind(priority)
        .bind(requisition.description())
        .bind(requisition.estimated_total())
        .bind(requisition.provided_document_types())
        .bind(requisition.checklist_satisfied())
        .bind(status)
        .bind(status_before_hold)
        .bind(state.hold_reason())
        .bind(state.sla().deadline())
        .bind(state.sla().paused_at())
        .bind(state.version().as_i32())
        .bind(requisition.created_at())
        .bind(state.updated_at())
        .execute(tx.conn())
        .await
        .map_err(|e| {
            InfraError::from(e).unique_violation_as_input("参照番号が重複しています")
        })?;

        insert_line_items(tx, requisition).await
    }

    #[tracing::instrument(
        skip_all,
        level = "debug",
        fields(requisition_id = %requisition.id(), expected_version = %expected_version)
    )]
    async fn update_with_version_check(
        &self,
        tx: &mut TxContext,
        requisition: &Requisition,
        expected_version: Version,
    ) -> Result<(), InfraError> {
        let state = requisition.state();
        let priority: &str = requisition.priority().into();
        let status: &str = state.status().into();
        let status_before_hold: Option<&str> = state.status_before_hold().map(Into::into);

        let result = sqlx::query(
            r#"
            UPDATE requisitions SET
                title = $1,
                department = $2,
                date_needed = $3,
                priority = $4,
                description = $5,
                estimated_total = $6,
                provided_document_types = $7,
                checklist_satisfied = $8,
                status = $9,
                status_before_hold = $10,
                hold_reason = $11,
                sla_deadline = $12,
                sla_paused_at = $13,
                version = $14,
                updated_at = $15
            WHERE id = $16 AND version = $17
            "#,
        )
        .bind(requisition.title().as_str())
        .bind(requisition.department())
        .bind(requisition.date_needed())
        .bind(priority)
        .bind(requisition.description())
        .bind(requisition.estimated_total())
        .bind(requisition.provided_document_types())
        .bind(requisition.checklist_satisfied())
        .bind(status)
        .bind(status_before_hold)
        .bind(state.hold_reason())
        .bind(state.sla().deadline())
        .bind(state.sla().paused_at())
        .bind(state.version().as_i32())
        .bind(state.updated_at())
        .bind(requisition.id().as_uuid())
        .bind(expected_version.as_i32())
        .execute(tx.conn())
        .await?;

        if result.rows_affected() == 0 {
            return Err(InfraError::conflict(
                "Requisition",
                requisition.id().to_string(),
            ));
        }

        Ok(())
    }

    #[tracing::instrument(
        skip_all,
        level = "debug",
        fields(requisition_id = %requisition.id(), line_count = requisition.line_items().len())
    )]
    async fn replace_line_items(
        &self,
        tx: &mut TxContext,
        requisition: &Requisition,
    ) -> Result<(), InfraError> {
        sqlx::query("DELETE FROM requisition_line_items WHERE requisition_id = $1")
            .bind(requisition.id().as_uuid())
            .execute(tx.conn())
            .await?;

        insert_line_items(tx, requisition).await
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%id))]
    async fn find_by_id(&self, id: &RequisitionId) -> Result<Option<Requisition>, InfraError> {
        let row = sqlx::query_as::<_, RequisitionRow>(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let line_items = self.load_line_items(&[row.id]).await?;
        row.into_requisition(line_items).map(Some)
    }

    #[tracing::instrument(skip_all, level = "debug", fields(status = ?status))]
    async fn find_all(&self, status: Option<CaseStatus>) -> Result<Vec<Requisition>, InfraError> {
        let status: Option<&str> = status.map(Into::into);
        let rows = sqlx::query_as::<_, RequisitionRow>(&format!(
            "{SELECT_COLUMNS} WHERE ($1::TEXT IS NULL OR status = $1) ORDER BY created_at DESC"
        ))
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        self.assemble(rows).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_トレイトはsendとsyncを実装している() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PostgresRequisitionRepository>();
        assert_send_sync::<Box<dyn RequisitionRepository>>();
    }
}
