//! # UserRepository
//!
//! 操作者のロール・所属部門の解決と通知先の検索に使う。

use async_trait::async_trait;
use procureflow_domain::{
    role::Role,
    user::{Email, User, UserId, UserRecord},
};
use sqlx::PgPool;
use uuid::Uuid;

use super::parse_column;
use crate::error::InfraError;

/// ユーザーリポジトリトレイト
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, InfraError>;

    /// 指定ロールを持つ有効なユーザーを取得する（SLA 超過通知の宛先）
    async fn find_active_by_role(&self, role: Role) -> Result<Vec<User>, InfraError>;
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    role: String,
    department: Option<String>,
    is_active: bool,
}

impl TryFrom<UserRow> for User {
    type Error = InfraError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User::from_db(UserRecord {
            id:         UserId::from_uuid(row.id),
            name:       row.name,
            email:      Email::new(row.email).map_err(|e| InfraError::unexpected(e.to_string()))?,
            role:       parse_column::<Role>(&row.role, "role")?,
            department: row.department,
            is_active:  row.is_active,
        }))
    }
}

/// PostgreSQL 実装
pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(%id))]
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, InfraError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, email, role, department, is_active FROM users WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%role))]
    async fn find_active_by_role(&self, role: Role) -> Result<Vec<User>, InfraError> {
        let role: &str = role.into();
        let rows = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, name, email, role, department, is_active
            FROM users
            WHERE role = $1 AND is_active
            ORDER BY name
            "#,
        )
        .bind(role)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(User::try_from).collect()
    }
}
