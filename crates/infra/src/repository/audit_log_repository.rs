//! # AuditLogRepository
//!
//! 監査ログの追記と参照。
//!
//! 更新・削除のメソッドは持たない。DB 側もトリガーで UPDATE / DELETE を拒否する。
//! 状態変更と同じ [`TxContext`] で書き込み、変更とログが必ず一緒にコミットされるようにする。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use procureflow_domain::{
    audit_log::{AuditAction, AuditEntityType, AuditLog, AuditLogId},
    role::Role,
    user::UserId,
};
use sqlx::PgPool;
use uuid::Uuid;

use super::parse_column;
use crate::{db::TxContext, error::InfraError};

/// 監査ログリポジトリトレイト
#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    async fn insert(&self, tx: &mut TxContext, log: &AuditLog) -> Result<(), InfraError>;

    /// 対象エンティティの監査ログを古い順に取得する
    async fn find_by_entity(
        &self,
        entity_type: AuditEntityType,
        entity_id: &Uuid,
    ) -> Result<Vec<AuditLog>, InfraError>;

    /// 指定アクションの監査ログが存在するか
    async fn exists(
        &self,
        entity_type: AuditEntityType,
        entity_id: &Uuid,
        action: AuditAction,
    ) -> Result<bool, InfraError>;
}

#[derive(Debug, sqlx::FromRow)]
struct AuditLogRow {
    id: Uuid,
    entity_type: String,
    entity_id: Uuid,
    action: String,
    actor_id: Option<Uuid>,
    actor_role: Option<String>,
    before_state: Option<serde_json::Value>,
    after_state: Option<serde_json::Value>,
    comment: Option<String>,
    ip_address: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AuditLogRow> for AuditLog {
    type Error = InfraError;

    fn try_from(row: AuditLogRow) -> Result<Self, Self::Error> {
        Ok(AuditLog {
            id:           AuditLogId::from_uuid(row.id),
            entity_type:  parse_column::<AuditEntityType>(&row.entity_type, "entity_type")?,
            entity_id:    row.entity_id,
            action:       parse_column::<AuditAction>(&row.action, "action")?,
            actor_id:     row.actor_id.map(UserId::from_uuid),
            actor_role:   row
                .actor_role
                .as_deref()
                .map(|role| parse_column::<Role>(role, "actor_role"))
                .transpose()?,
            before_state: row.before_state,
            after_state:  row.after_state,
            comment:      row.comment,
            ip_address:   row.ip_address,
            created_at:   row.created_at,
        })
    }
}

/// PostgreSQL 実装
pub struct PostgresAuditLogRepository {
    pool: PgPool,
}

impl PostgresAuditLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLogRepository for PostgresAuditLogRepository {
    #[tracing::instrument(
        skip_all,
        level = "debug",
        fields(entity_type = %log.entity_type, entity_id = %log.entity_id, action = %log.action)
    )]
    async fn insert(&self, tx: &mut TxContext, log: &AuditLog) -> Result<(), InfraError> {
        let entity_type: &str = log.entity_type.into();
        let action: &str = log.action.into();
        let actor_role: Option<&str> = log.actor_role.map(Into::into);

        sqlx::query(
            r#"
            INSERT INTO audit_logs (
                id, entity_type, entity_id, action, actor_id, actor_role,
                before_state, after_state, comment, ip_address, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(log.id.as_uuid())
        .bind(entity_type)
        .bind(log.entity_id)
        .bind(action)
        .bind(log.actor_id.as_ref().map(|id| *id.as_uuid()))
        .bind(actor_role)
        .bind(&log.before_state)
        .bind(&log.after_state)
        .bind(log.comment.as_deref())
        .bind(log.ip_address.as_deref())
        .bind(log.created_at)
        .execute(tx.conn())
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%entity_type, %entity_id))]
    async fn find_by_entity(
        &self,
        entity_type: AuditEntityType,
        entity_id: &Uuid,
    ) -> Result<Vec<AuditLog>, InfraError> {
        let entity_type: &str = entity_type.into();
        let rows = sqlx::query_as::<_, AuditLogRow>(
            r#"
            SELECT
                id, entity_type, entity_id, action, actor_id, actor_role,
                before_state, after_state, comment, ip_address, created_at
            FROM audit_logs
            WHERE entity_type = $1 AND entity_id = $2
            ORDER BY created_at, id
            "#,
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AuditLog::try_from).collect()
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%entity_type, %entity_id, %action))]
    async fn exists(
        &self,
        entity_type: AuditEntityType,
        entity_id: &Uuid,
        action: AuditAction,
    ) -> Result<bool, InfraError> {
        let entity_type: &str = entity_type.into();
        let action: &str = action.into();
        let (exists,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM audit_logs
                WHERE entity_type = $1 AND entity_id = $2 AND action = $3
            )
            "#,
        )
        .bind(entity_type)
        .bind(entity_id)
        .bind(action)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}
