//! # リポジトリ実装
//!
//! ドメインモデルの永続化を担当するリポジトリトレイトと PostgreSQL 実装。
//!
//! ## 設計方針
//!
//! - **トランザクション必須**: 書き込みメソッドは [`TxContext`](crate::db::TxContext) を受け取る
//! - **楽観的ロック**: 更新は `WHERE version = $expected` の条件付き UPDATE。0 行なら Conflict
//! - **行構造体**: `sqlx::FromRow` で受け、`TryFrom` でドメインモデルへ変換する
//! - **テスタビリティ**: トレイト経由でモック可能な設計（[`crate::mock`]）

pub mod approval_step_repository;
pub mod audit_log_repository;
pub mod goods_receipt_repository;
pub mod notice_to_award_repository;
pub mod payment_request_repository;
pub mod purchase_order_repository;
pub mod ref_number_counter_repository;
pub mod requisition_repository;
pub mod user_repository;
pub mod vendor_quote_repository;
pub mod vendor_repository;

pub use approval_step_repository::{ApprovalStepRepository, PostgresApprovalStepRepository};
pub use audit_log_repository::{AuditLogRepository, PostgresAuditLogRepository};
pub use goods_receipt_repository::{GoodsReceiptRepository, PostgresGoodsReceiptRepository};
pub use notice_to_award_repository::{NoticeToAwardRepository, PostgresNoticeToAwardRepository};
pub use payment_request_repository::{
    PaymentRequestRepository,
    PostgresPaymentRequestRepository,
};
pub use purchase_order_repository::{PostgresPurchaseOrderRepository, PurchaseOrderRepository};
pub use ref_number_counter_repository::{
    PostgresRefNumberCounterRepository,
    RefNumberCounterRepository,
};
pub use requisition_repository::{PostgresRequisitionRepository, RequisitionRepository};
pub use user_repository::{PostgresUserRepository, UserRepository};
pub use vendor_quote_repository::{PostgresVendorQuoteRepository, VendorQuoteRepository};
pub use vendor_repository::{PostgresVendorRepository, VendorRepository};

use procureflow_domain::{
    DomainError,
    case::{CaseState, CaseStateRecord, CaseStatus},
    value_objects::Version,
};

use crate::error::InfraError;

/// DB の文字列カラムをドメインの列挙型に変換する
pub(crate) fn parse_column<T>(value: &str, column: &str) -> Result<T, InfraError>
where
    T: std::str::FromStr<Err = DomainError>,
{
    value
        .parse::<T>()
        .map_err(|e| InfraError::unexpected(format!("不正な {column}: {e}")))
}

pub(crate) fn parse_version(value: i32) -> Result<Version, InfraError> {
    Version::try_from(value).map_err(|e| InfraError::unexpected(e.to_string()))
}

/// 案件テーブル共通の状態カラム
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CaseStateColumns {
    pub status:             String,
    pub status_before_hold: Option<String>,
    pub hold_reason:        Option<String>,
    pub sla_deadline:       Option<chrono::DateTime<chrono::Utc>>,
    pub sla_paused_at:      Option<chrono::DateTime<chrono::Utc>>,
    pub version:            i32,
    pub updated_at:         chrono::DateTime<chrono::Utc>,
}

impl TryFrom<CaseStateColumns> for CaseState {
    type Error = InfraError;

    fn try_from(columns: CaseStateColumns) -> Result<Self, Self::Error> {
        Ok(CaseState::from_db(CaseStateRecord {
            status:             parse_column::<CaseStatus>(&columns.status, "status")?,
            status_before_hold: columns
                .status_before_hold
                .as_deref()
                .map(|s| parse_column::<CaseStatus>(s, "status_before_hold"))
                .transpose()?,
            hold_reason:        columns.hold_reason,
            sla_deadline:       columns.sla_deadline,
            sla_paused_at:      columns.sla_paused_at,
            version:            parse_version(columns.version)?,
            updated_at:         columns.updated_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use procureflow_domain::role::Role;

    use super::*;

    #[test]
    fn test_parse_columnは不正な値をunexpectedにする() {
        let result = parse_column::<Role>("superuser", "role");

        let err = result.unwrap_err();
        assert!(matches!(err.kind(), crate::InfraErrorKind::Unexpected(_)));
    }

    #[test]
    fn test_parse_versionは負の値を拒否する() {
        assert!(parse_version(-1).is_err());
        assert!(parse_version(0).is_err());
        assert_eq!(parse_version(3).unwrap(), Version::new(3).unwrap());
    }

    #[test]
    fn test_状態カラムから案件状態を復元できる() {
        let now = chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let columns = CaseStateColumns {
            status:             "on_hold".to_string(),
            status_before_hold: Some("under_review".to_string()),
            hold_reason:        Some("予算確認中".to_string()),
            sla_deadline:       Some(now),
            sla_paused_at:      Some(now),
            version:            4,
            updated_at:         now,
        };

        let state = CaseState::try_from(columns).unwrap();

        assert_eq!(state.status(), CaseStatus::OnHold);
        assert_eq!(state.status_before_hold(), Some(CaseStatus::UnderReview));
        assert_eq!(state.hold_reason(), Some("予算確認中"));
        assert!(state.sla().is_paused());
        assert_eq!(state.version(), Version::new(4).unwrap());
    }
}
