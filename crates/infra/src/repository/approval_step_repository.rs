//! # ApprovalStepRepository
//!
//! 承認ステップの永続化。
//!
//! ステップへの判断は `action = 'pending' AND version = $expected` を条件にした
//! 1 回の UPDATE で記録する。同じステップへの同時操作は 1 件だけが成功し、
//! 残りは 0 行更新となって Conflict になる。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use procureflow_domain::{
    approval::{ApprovalStep, ApprovalStepId, ApprovalStepRecord, StepAction},
    case::{CaseKind, CaseRef},
    role::Role,
    user::UserId,
    value_objects::Version,
};
use sqlx::PgPool;
use uuid::Uuid;

use super::{parse_column, parse_version};
use crate::{db::TxContext, error::InfraError};

/// 承認ステップリポジトリトレイト
#[async_trait]
pub trait ApprovalStepRepository: Send + Sync {
    async fn insert(&self, tx: &mut TxContext, step: &ApprovalStep) -> Result<(), InfraError>;

    /// 未処理ステップへの判断を記録する
    ///
    /// `action = 'pending'` かつ `version = expected_version` の行だけを更新する。
    /// 0 行なら Conflict を返す。
    async fn record_action(
        &self,
        tx: &mut TxContext,
        step: &ApprovalStep,
        expected_version: Version,
    ) -> Result<(), InfraError>;

    /// 楽観的ロック付きでステップを更新する（取消・再開・SLA 超過フラグ）
    async fn update_with_version_check(
        &self,
        tx: &mut TxContext,
        step: &ApprovalStep,
        expected_version: Version,
    ) -> Result<(), InfraError>;

    /// 未処理ステップを削除する
    ///
    /// 指定した ID のうち 1 件でも未処理でなくなっていれば Conflict を返す。
    async fn delete_pending(
        &self,
        tx: &mut TxContext,
        ids: &[ApprovalStepId],
    ) -> Result<(), InfraError>;

    async fn find_by_id(&self, id: &ApprovalStepId) -> Result<Option<ApprovalStep>, InfraError>;

    /// 案件のステップを `step_number` の昇順で取得する
    async fn find_by_case(&self, case: &CaseRef) -> Result<Vec<ApprovalStep>, InfraError>;

    /// SLA 期限を過ぎた未処理ステップを取得する
    ///
    /// 超過フラグ済みのステップ、保留中の案件に属するステップ、
    /// 同じ世代に未承認の前段が残るステップは除外する。
    async fn find_overdue(&self, now: DateTime<Utc>) -> Result<Vec<ApprovalStep>, InfraError>;
}

#[derive(Debug, sqlx::FromRow)]
struct ApprovalStepRow {
    id: Uuid,
    case_kind: String,
    case_id: Uuid,
    step_number: i32,
    cycle: i32,
    position: i32,
    step_label: String,
    role_required: String,
    action: String,
    actor_id: Option<Uuid>,
    comment: Option<String>,
    actioned_at: Option<DateTime<Utc>>,
    sla_deadline: DateTime<Utc>,
    is_sla_breached: bool,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ApprovalStepRow> for ApprovalStep {
    type Error = InfraError;

    fn try_from(row: ApprovalStepRow) -> Result<Self, Self::Error> {
        let kind = parse_column::<CaseKind>(&row.case_kind, "case_kind")?;
        Ok(ApprovalStep::from_db(ApprovalStepRecord {
            id: ApprovalStepId::from_uuid(row.id),
            case: CaseRef::from_parts(kind, row.case_id),
            step_number: row.step_number,
            cycle: row.cycle,
            position: row.position,
            step_label: row.step_label,
            role_required: parse_column::<Role>(&row.role_required, "role_required")?,
            action: parse_column::<StepAction>(&row.action, "action")?,
            actor_id: row.actor_id.map(UserId::from_uuid),
            comment: row.comment,
            actioned_at: row.actioned_at,
            sla_deadline: row.sla_deadline,
            is_sla_breached: row.is_sla_breached,
            version: parse_version(row.version)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }))
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT
        s.id, s.case_kind, s.case_id, s.step_number, s.cycle, s.position, s.step_label,
        s.role_required, s.action, s.actor_id, s.comment, s.actioned_at, s.sla_deadline,
        s.is_sla_breached, s.version, s.created_at, s.updated_at
    FROM approval_steps s
"#;

/// PostgreSQL 実装
pub struct PostgresApprovalStepRepository {
    pool: PgPool,
}

impl PostgresApprovalStepRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApprovalStepRepository for PostgresApprovalStepRepository {
    #[tracing::instrument(
        skip_all,
        level = "debug",
        fields(step_id = %step.id(), case = %step.case(), step_number = step.step_number())
    )]
    async fn insert(&self, tx: &mut TxContext, step: &ApprovalStep) -> Result<(), InfraError> {
        let case_kind: &str = step.case().kind().into();
        let role: &str = step.role_required().into();
        let action: &str = step.action().into();

        sqlx::query(
            r#"
            INSERT INTO approval_steps (
                id, case_kind, case_id, step_number, cycle, position, step_label,
                role_required, action, actor_id, comment, actioned_at, sla_deadline,
                is_sla_breached, version, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17
            )
            "#,
        )
        .bind(step.id().as_uuid())
        .bind(case_kind)
        .bind(step.case().as_uuid())
        .bind(step.step_number())
        .bind(step.cycle())
        .bind(step.position())
        .bind(step.step_label())
        .bind(role)
        .bind(action)
        .bind(step.actor_id().map(|id| *id.as_uuid()))
        .bind(step.comment())
        .bind(step.actioned_at())
        .bind(step.sla_deadline())
        .bind(step.is_sla_breached())
        .bind(step.version().as_i32())
        .bind(step.created_at())
        .bind(step.updated_at())
        .execute(tx.conn())
        .await
        .map_err(|e| InfraError::from(e).unique_violation_as_input("ステップ番号が重複しています"))?;

        Ok(())
    }

    #[tracing::instrument(
        skip_all,
        level = "debug",
        fields(step_id = %step.id(), action = %step.action(), expected_version = %expected_version)
    )]
    async fn record_action(
        &self,
        tx: &mut TxContext,
        step: &ApprovalStep,
        expected_version: Version,
    ) -> Result<(), InfraError> {
        let action: &str = step.action().into();

        let result = sqlx::query(
            r#"
            UPDATE approval_steps SET
                action = $1,
                actor_id = $2,
                comment = $3,
                actioned_at = $4,
                version = version + 1,
                updated_at = $5
            WHERE id = $6 AND action = 'pending' AND version = $7
            "#,
        )
        .bind(action)
        .bind(step.actor_id().map(|id| *id.as_uuid()))
        .bind(step.comment())
        .bind(step.actioned_at())
        .bind(step.updated_at())
        .bind(step.id().as_uuid())
        .bind(expected_version.as_i32())
        .execute(tx.conn())
        .await?;

        if result.rows_affected() == 0 {
            return Err(InfraError::conflict("ApprovalStep", step.id().to_string()));
        }

        Ok(())
    }

    #[tracing::instrument(
        skip_all,
        level = "debug",
        fields(step_id = %step.id(), expected_version = %expected_version)
    )]
    async fn update_with_version_check(
        &self,
        tx: &mut TxContext,
        step: &ApprovalStep,
        expected_version: Version,
    ) -> Result<(), InfraError> {
        let action: &str = step.action().into();

        let result = sqlx::query(
            r#"
            UPDATE approval_steps SET
                action = $1,
                actor_id = $2,
                comment = $3,
                actioned_at = $4,
                sla_deadline = $5,
                is_sla_breached = $6,
                version = $7,
                updated_at = $8
            WHERE id = $9 AND version = $10
            "#,
        )
        .bind(action)
        .bind(step.actor_id().map(|id| *id.as_uuid()))
        .bind(step.comment())
        .bind(step.actioned_at())
        .bind(step.sla_deadline())
        .bind(step.is_sla_breached())
        .bind(step.version().as_i32())
        .bind(step.updated_at())
        .bind(step.id().as_uuid())
        .bind(expected_version.as_i32())
        .execute(tx.conn())
        .await?;

        if result.rows_affected() == 0 {
            return Err(InfraError::conflict("ApprovalStep", step.id().to_string()));
        }

        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(count = ids.len()))]
    async fn delete_pending(
        &self,
        tx: &mut TxContext,
        ids: &[ApprovalStepId],
    ) -> Result<(), InfraError> {
        if ids.is_empty() {
            return Ok(());
        }
        let uuids = ids.iter().map(|id| *id.as_uuid()).collect::<Vec<_>>();

        let result =
            sqlx::query("DELETE FROM approval_steps WHERE id = ANY($1) AND action = 'pending'")
                .bind(&uuids)
                .execute(tx.conn())
                .await?;

        if result.rows_affected() != uuids.len() as u64 {
            let ids = ids.iter().map(ToString::to_string).collect::<Vec<_>>();
            return Err(InfraError::conflict("ApprovalStep", ids.join(",")));
        }

        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%id))]
    async fn find_by_id(&self, id: &ApprovalStepId) -> Result<Option<ApprovalStep>, InfraError> {
        let row = sqlx::query_as::<_, ApprovalStepRow>(&format!("{SELECT_COLUMNS} WHERE s.id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(ApprovalStep::try_from).transpose()
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%case))]
    async fn find_by_case(&self, case: &CaseRef) -> Result<Vec<ApprovalStep>, InfraError> {
        let case_kind: &str = case.kind().into();
        let rows = sqlx::query_as::<_, ApprovalStepRow>(&format!(
            "{SELECT_COLUMNS} WHERE s.case_kind = $1 AND s.case_id = $2 ORDER BY s.step_number"
        ))
        .bind(case_kind)
        .bind(case.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ApprovalStep::try_from).collect()
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%now))]
    async fn find_overdue(&self, now: DateTime<Utc>) -> Result<Vec<ApprovalStep>, InfraError> {
        let rows = sqlx::query_as::<_, ApprovalStepRow>(&format!(
            r#"
            {SELECT_COLUMNS}
            LEFT JOIN requisitions r
                ON s.case_kind = 'requisition' AND r.id = s.case_id
            LEFT JOIN payment_requests p
                ON s.case_kind = 'payment_request' AND p.id = s.case_id
            WHERE s.action = 'pending'
              AND NOT s.is_sla_breached
              AND s.sla_deadline < $1
              AND COALESCE(r.status, p.status) <> 'on_hold'
              AND NOT EXISTS (
                  SELECT 1 FROM approval_steps e
                  WHERE e.case_kind = s.case_kind
                    AND e.case_id = s.case_id
                    AND e.cycle = s.cycle
                    AND e.position < s.position
                    AND e.action <> 'approved'
              )
            ORDER BY s.sla_deadline, s.step_number
            "#
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ApprovalStep::try_from).collect()
    }
}
