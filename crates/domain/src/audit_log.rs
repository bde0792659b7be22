//! # 監査ログ
//!
//! 案件・承認ステップへの操作の監査証跡を記録するドメインモデル。
//!
//! ## 設計方針
//!
//! - **不変性**: 作成後は変更しない。リポジトリは追記のみを提供し、
//!   DB もトリガーで UPDATE / DELETE を拒否する
//! - **同一トランザクション**: 状態変更と監査ログは同じトランザクションで書き込む
//!
//! ## アクション体系
//!
//! | バリアント | 文字列表現 |
//! |-----------|-----------|
//! | `Created` | `created` |
//! | `Updated` | `updated` |
//! | `StatusChanged` | `status_changed` |
//! | `StepActioned` | `step_actioned` |
//! | `HoldResumed` | `hold_resumed` |
//! | `QuoteExceptionApproved` | `quote_exception_approved` |
//! | `VendorAwarded` | `vendor_awarded` |
//! | `NtaMarkedAsSent` | `nta_marked_as_sent` |
//! | `PoMarkedAsSent` | `po_marked_as_sent` |
//! | `GoodsReceived` | `goods_received` |
//! | `SlaBreach` | `sla_breach` |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use strum::IntoStaticStr;
use uuid::Uuid;

use crate::{
    DomainError,
    approval::ApprovalStep,
    case::{CaseKind, CaseRef, CaseStatus},
    role::{Actor, Role},
    user::UserId,
};

define_uuid_id! {
    /// 監査ログ ID
    pub struct AuditLogId;
}

/// 監査対象のアクション
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, IntoStaticStr, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuditAction {
    Created,
    Updated,
    StatusChanged,
    StepActioned,
    HoldResumed,
    QuoteExceptionApproved,
    VendorAwarded,
    NtaMarkedAsSent,
    PoMarkedAsSent,
    GoodsReceived,
    SlaBreach,
}

impl std::str::FromStr for AuditAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "updated" => Ok(Self::Updated),
            "status_changed" => Ok(Self::StatusChanged),
            "step_actioned" => Ok(Self::StepActioned),
            "hold_resumed" => Ok(Self::HoldResumed),
            "quote_exception_approved" => Ok(Self::QuoteExceptionApproved),
            "vendor_awarded" => Ok(Self::VendorAwarded),
            "nta_marked_as_sent" => Ok(Self::NtaMarkedAsSent),
            "po_marked_as_sent" => Ok(Self::PoMarkedAsSent),
            "goods_received" => Ok(Self::GoodsReceived),
            "sla_breach" => Ok(Self::SlaBreach),
            _ => Err(DomainError::Validation(format!("不明な監査アクション: {s}"))),
        }
    }
}

/// 監査対象の種別
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, IntoStaticStr, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuditEntityType {
    Requisition,
    PaymentRequest,
    ApprovalStep,
    VendorQuote,
    NoticeToAward,
    PurchaseOrder,
    GoodsReceipt,
}

impl std::str::FromStr for AuditEntityType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requisition" => Ok(Self::Requisition),
            "payment_request" => Ok(Self::PaymentRequest),
            "approval_step" => Ok(Self::ApprovalStep),
            "vendor_quote" => Ok(Self::VendorQuote),
            "notice_to_award" => Ok(Self::NoticeToAward),
            "purchase_order" => Ok(Self::PurchaseOrder),
            "goods_receipt" => Ok(Self::GoodsReceipt),
            _ => Err(DomainError::Validation(format!("不明な監査対象: {s}"))),
        }
    }
}

impl From<CaseKind> for AuditEntityType {
    fn from(kind: CaseKind) -> Self {
        match kind {
            CaseKind::Requisition => Self::Requisition,
            CaseKind::PaymentRequest => Self::PaymentRequest,
        }
    }
}

/// 監査ログエンティティ
///
/// 作成後は変更されない。`actor_id` が `None` のものはシステム処理（SLA 超過検知など）。
#[derive(Debug, Clone, PartialEq)]
pub struct AuditLog {
    pub id: AuditLogId,
    pub entity_type: AuditEntityType,
    pub entity_id: Uuid,
    pub action: AuditAction,
    pub actor_id: Option<UserId>,
    pub actor_role: Option<Role>,
    pub before_state: Option<serde_json::Value>,
    pub after_state: Option<serde_json::Value>,
    pub comment: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditLog {
    /// 案件に対する監査ログを作成する
    pub fn for_case(
        case: &CaseRef,
        action: AuditAction,
        actor: Option<&Actor>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AuditLogId::new(),
            entity_type: case.kind().into(),
            entity_id: *case.as_uuid(),
            action,
            actor_id: actor.map(|a| a.id().clone()),
            actor_role: actor.map(Actor::role),
            before_state: None,
            after_state: None,
            comment: None,
            ip_address: None,
            created_at: now,
        }
    }

    /// 案件ステータスの遷移を記録する
    pub fn status_changed(
        case: &CaseRef,
        actor: Option<&Actor>,
        from: CaseStatus,
        to: CaseStatus,
        comment: Option<&str>,
        now: DateTime<Utc>,
    ) -> Self {
        Self::for_case(case, AuditAction::StatusChanged, actor, now)
            .with_states(json!({ "status": from }), json!({ "status": to }))
            .with_comment(comment)
    }

    /// 承認ステップへの判断を記録する
    pub fn step_actioned(
        step: &ApprovalStep,
        actor: &Actor,
        from: CaseStatus,
        to: CaseStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self::for_case(step.case(), AuditAction::StepActioned, Some(actor), now)
            .with_states(
                json!({ "status": from, "step_number": step.step_number() }),
                json!({
                    "status": to,
                    "step_number": step.step_number(),
                    "action": step.action(),
                }),
            )
            .with_comment(step.comment())
    }

    /// SLA 超過を記録する（システム処理）
    pub fn sla_breach(step: &ApprovalStep, now: DateTime<Utc>) -> Self {
        Self {
            entity_type: AuditEntityType::ApprovalStep,
            entity_id: *step.id().as_uuid(),
            after_state: Some(json!({
                "case_kind": step.case().kind(),
                "case_id": step.case().as_uuid(),
                "step_number": step.step_number(),
                "role_required": step.role_required(),
                "sla_deadline": step.sla_deadline(),
            })),
            ..Self::for_case(step.case(), AuditAction::SlaBreach, None, now)
        }
    }

    pub fn with_states(self, before: serde_json::Value, after: serde_json::Value) -> Self {
        Self {
            before_state: Some(before),
            after_state: Some(after),
            ..self
        }
    }

    pub fn with_after_state(self, after: serde_json::Value) -> Self {
        Self {
            after_state: Some(after),
            ..self
        }
    }

    pub fn with_comment(self, comment: Option<&str>) -> Self {
        Self {
            comment: comment.map(str::to_string),
            ..self
        }
    }

    pub fn with_ip_address(self, ip_address: Option<String>) -> Self {
        Self { ip_address, ..self }
    }

    /// 記録された遷移前のステータス
    pub fn before_status(&self) -> Option<CaseStatus> {
        status_of(self.before_state.as_ref())
    }

    /// 記録された遷移後のステータス
    pub fn after_status(&self) -> Option<CaseStatus> {
        status_of(self.after_state.as_ref())
    }
}

fn status_of(state: Option<&serde_json::Value>) -> Option<CaseStatus> {
    state?
        .get("status")?
        .as_str()?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    use super::*;
    use crate::requisition::RequisitionId;

    #[fixture]
    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_アクションの文字列表現が相互に変換できる() {
        for action in [
            AuditAction::StatusChanged,
            AuditAction::QuoteExceptionApproved,
            AuditAction::NtaMarkedAsSent,
            AuditAction::GoodsReceived,
            AuditAction::SlaBreach,
        ] {
            assert_eq!(action.to_string().parse::<AuditAction>().unwrap(), action);
        }
        assert_eq!(AuditAction::PoMarkedAsSent.to_string(), "po_marked_as_sent");
    }

    #[test]
    fn test_不明なアクションはエラーになる() {
        assert!("user.create".parse::<AuditAction>().is_err());
    }

    #[rstest]
    fn test_ステータス遷移の前後を記録する(now: DateTime<Utc>) {
        let case = CaseRef::Requisition(RequisitionId::new());
        let actor = Actor::new(UserId::new(), Role::ProcOfficer);

        let sut = AuditLog::status_changed(
            &case,
            Some(&actor),
            CaseStatus::ForQuoting,
            CaseStatus::QuoteEvaluation,
            Some("3 社そろった"),
            now,
        );

        assert_eq!(sut.entity_type, AuditEntityType::Requisition);
        assert_eq!(&sut.entity_id, case.as_uuid());
        assert_eq!(sut.action, AuditAction::StatusChanged);
        assert_eq!(sut.actor_role, Some(Role::ProcOfficer));
        assert_eq!(sut.before_status(), Some(CaseStatus::ForQuoting));
        assert_eq!(sut.after_status(), Some(CaseStatus::QuoteEvaluation));
        assert_eq!(sut.comment.as_deref(), Some("3 社そろった"));
    }

    #[rstest]
    fn test_システム処理は操作者なしで記録する(now: DateTime<Utc>) {
        let case = CaseRef::Requisition(RequisitionId::new());

        let sut = AuditLog::for_case(&case, AuditAction::Created, None, now);

        assert_eq!(sut.actor_id, None);
        assert_eq!(sut.actor_role, None);
        assert_eq!(sut.before_status(), None);
    }
}
