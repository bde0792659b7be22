//! # 共通レスポンス DTO
//!
//! 購買申請・支払申請・調達の各ハンドラで共有するレスポンス型。

use chrono::{DateTime, NaiveDate, Utc};
use procureflow_domain::{
    approval::{ApprovalStep, StepAction},
    audit_log::{AuditAction, AuditEntityType, AuditLog},
    award::{AwardBasis, NoticeToAward, NtaStatus},
    case::{Case, CaseKind, CaseState, CaseStatus},
    purchase_order::{GoodsReceipt, PoStatus, PurchaseOrder},
    quote::VendorQuote,
    role::Role,
};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// 案件の状態 DTO
#[derive(Debug, Serialize)]
pub struct CaseStateDto {
    pub status:             CaseStatus,
    pub status_before_hold: Option<CaseStatus>,
    pub hold_reason:        Option<String>,
    pub sla_deadline:       Option<DateTime<Utc>>,
    pub sla_paused_at:      Option<DateTime<Utc>>,
    pub version:            i32,
    pub updated_at:         DateTime<Utc>,
}

impl From<&CaseState> for CaseStateDto {
    fn from(state: &CaseState) -> Self {
        Self {
            status:             state.status(),
            status_before_hold: state.status_before_hold(),
            hold_reason:        state.hold_reason().map(str::to_string),
            sla_deadline:       state.sla().deadline(),
            sla_paused_at:      state.sla().paused_at(),
            version:            state.version().as_i32(),
            updated_at:         state.updated_at(),
        }
    }
}

/// 案件の要約 DTO（承認操作の結果など、種別を問わない応答で使う）
#[derive(Debug, Serialize)]
pub struct CaseSummaryDto {
    pub kind:       CaseKind,
    pub id:         Uuid,
    pub ref_number: String,
    pub title:      String,
    pub state:      CaseStateDto,
}

impl From<&Case> for CaseSummaryDto {
    fn from(case: &Case) -> Self {
        Self {
            kind:       case.kind(),
            id:         *case.case_ref().as_uuid(),
            ref_number: case.ref_number().to_string(),
            title:      case.title().to_string(),
            state:      CaseStateDto::from(case.state()),
        }
    }
}

/// 承認ステップ DTO
#[derive(Debug, Serialize)]
pub struct ApprovalStepDto {
    pub id:              Uuid,
    pub step_number:     i32,
    pub cycle:           i32,
    pub position:        i32,
    pub step_label:      String,
    pub role_required:   Role,
    pub action:          StepAction,
    pub actor_id:        Option<Uuid>,
    pub comment:         Option<String>,
    pub actioned_at:     Option<DateTime<Utc>>,
    pub sla_deadline:    DateTime<Utc>,
    pub is_sla_breached: bool,
    pub version:         i32,
}

impl From<&ApprovalStep> for ApprovalStepDto {
    fn from(step: &ApprovalStep) -> Self {
        Self {
            id:              *step.id().as_uuid(),
            step_number:     step.step_number(),
            cycle:           step.cycle(),
            position:        step.position(),
            step_label:      step.step_label().to_string(),
            role_required:   step.role_required(),
            action:          step.action(),
            actor_id:        step.actor_id().map(|id| *id.as_uuid()),
            comment:         step.comment().map(str::to_string),
            actioned_at:     step.actioned_at(),
            sla_deadline:    step.sla_deadline(),
            is_sla_breached: step.is_sla_breached(),
            version:         step.version().as_i32(),
        }
    }
}

/// 監査ログ DTO
#[derive(Debug, Serialize)]
pub struct AuditLogDto {
    pub id:           Uuid,
    pub entity_type:  AuditEntityType,
    pub entity_id:    Uuid,
    pub action:       AuditAction,
    pub actor_id:     Option<Uuid>,
    pub actor_role:   Option<Role>,
    pub before_state: Option<serde_json::Value>,
    pub after_state:  Option<serde_json::Value>,
    pub comment:      Option<String>,
    pub created_at:   DateTime<Utc>,
}

impl From<AuditLog> for AuditLogDto {
    fn from(log: AuditLog) -> Self {
        Self {
            id:           *log.id.as_uuid(),
            entity_type:  log.entity_type,
            entity_id:    log.entity_id,
            action:       log.action,
            actor_id:     log.actor_id.map(|id| *id.as_uuid()),
            actor_role:   log.actor_role,
            before_state: log.before_state,
            after_state:  log.after_state,
            comment:      log.comment,
            created_at:   log.created_at,
        }
    }
}

/// 業者見積 DTO
#[derive(Debug, Serialize)]
pub struct VendorQuoteDto {
    pub id:               Uuid,
    pub requisition_id:   Uuid,
    pub vendor_id:        Uuid,
    pub lines:            Vec<QuoteLineDto>,
    pub grand_total:      Decimal,
    pub is_complete:      bool,
    pub is_compliant:     Option<bool>,
    pub compliance_notes: Option<String>,
    pub is_responsive:    bool,
    pub is_awarded:       bool,
    pub version:          i32,
    pub created_at:       DateTime<Utc>,
}

/// 見積明細 DTO
#[derive(Debug, Serialize)]
pub struct QuoteLineDto {
    pub line_item_id: Uuid,
    pub quantity:     Decimal,
    pub unit_price:   Decimal,
    pub line_total:   Decimal,
}

impl From<&VendorQuote> for VendorQuoteDto {
    fn from(quote: &VendorQuote) -> Self {
        Self {
            id:               *quote.id().as_uuid(),
            requisition_id:   *quote.requisition_id().as_uuid(),
            vendor_id:        *quote.vendor_id().as_uuid(),
            lines:            quote
                .lines()
                .iter()
                .map(|line| QuoteLineDto {
                    line_item_id: *line.line_item_id().as_uuid(),
                    quantity:     line.quantity(),
                    unit_price:   line.unit_price(),
                    line_total:   line.line_total(),
                })
                .collect(),
            grand_total:      quote.grand_total(),
            is_complete:      quote.is_complete(),
            is_compliant:     quote.is_compliant(),
            compliance_notes: quote.compliance_notes().map(str::to_string),
            is_responsive:    quote.is_responsive(),
            is_awarded:       quote.is_awarded(),
            version:          quote.version().as_i32(),
            created_at:       quote.created_at(),
        }
    }
}

/// 落札通知 DTO
#[derive(Debug, Serialize)]
pub struct NoticeToAwardDto {
    pub id:                     Uuid,
    pub ref_number:             String,
    pub requisition_id:         Uuid,
    pub vendor_id:              Uuid,
    pub awarded_quote_id:       Uuid,
    pub award_basis:            AwardBasis,
    pub override_justification: Option<String>,
    pub override_authorized_by: Option<Uuid>,
    pub issued_by:              Uuid,
    pub issued_at:              DateTime<Utc>,
    pub status:                 NtaStatus,
    pub sent_at:                Option<DateTime<Utc>>,
}

impl From<&NoticeToAward> for NoticeToAwardDto {
    fn from(notice: &NoticeToAward) -> Self {
        Self {
            id:                     *notice.id().as_uuid(),
            ref_number:             notice.ref_number().to_string(),
            requisition_id:         *notice.requisition_id().as_uuid(),
            vendor_id:              *notice.vendor_id().as_uuid(),
            awarded_quote_id:       *notice.awarded_quote_id().as_uuid(),
            award_basis:            notice.award_basis(),
            override_justification: notice.override_justification().map(str::to_string),
            override_authorized_by: notice.override_authorized_by().map(|id| *id.as_uuid()),
            issued_by:              *notice.issued_by().as_uuid(),
            issued_at:              notice.issued_at(),
            status:                 notice.status(),
            sent_at:                notice.sent_at(),
        }
    }
}

/// 発注書 DTO
#[derive(Debug, Serialize)]
pub struct PurchaseOrderDto {
    pub id:               Uuid,
    pub ref_number:       String,
    pub requisition_id:   Uuid,
    pub vendor_id:        Uuid,
    pub awarded_quote_id: Uuid,
    pub delivery_terms:   Option<String>,
    pub payment_terms:    Option<String>,
    pub grand_total:      Decimal,
    pub lines:            Vec<PurchaseOrderLineDto>,
    pub issued_by:        Uuid,
    pub issued_at:        DateTime<Utc>,
    pub status:           PoStatus,
    pub sent_at:          Option<DateTime<Utc>>,
    pub completed_at:     Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct PurchaseOrderLineDto {
    pub id:           Uuid,
    pub line_item_id: Uuid,
    pub description:  String,
    pub unit:         String,
    pub quantity:     Decimal,
    pub unit_price:   Decimal,
    pub line_total:   Decimal,
}

impl From<&PurchaseOrder> for PurchaseOrderDto {
    fn from(order: &PurchaseOrder) -> Self {
        Self {
            id:               *order.id().as_uuid(),
            ref_number:       order.ref_number().to_string(),
            requisition_id:   *order.requisition_id().as_uuid(),
            vendor_id:        *order.vendor_id().as_uuid(),
            awarded_quote_id: *order.awarded_quote_id().as_uuid(),
            delivery_terms:   order.terms().delivery_terms.clone(),
            payment_terms:    order.terms().payment_terms.clone(),
            grand_total:      order.grand_total(),
            lines:            order
                .lines()
                .iter()
                .map(|line| PurchaseOrderLineDto {
                    id:           *line.id().as_uuid(),
                    line_item_id: *line.line_item_id().as_uuid(),
                    description:  line.description().to_string(),
                    unit:         line.unit().to_string(),
                    quantity:     line.quantity(),
                    unit_price:   line.unit_price(),
                    line_total:   line.line_total(),
                })
                .collect(),
            issued_by:        *order.issued_by().as_uuid(),
            issued_at:        order.issued_at(),
            status:           order.status(),
            sent_at:          order.sent_at(),
            completed_at:     order.completed_at(),
        }
    }
}

/// 検収記録 DTO
#[derive(Debug, Serialize)]
pub struct GoodsReceiptDto {
    pub id:                Uuid,
    pub ref_number:        String,
    pub purchase_order_id: Uuid,
    pub received_date:     NaiveDate,
    pub received_by:       Uuid,
    pub remarks:           Option<String>,
    pub lines:             Vec<GoodsReceiptLineDto>,
    pub created_at:        DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct GoodsReceiptLineDto {
    pub po_line_id:        Uuid,
    pub quantity_received: Decimal,
    pub remarks:           Option<String>,
}

impl From<&GoodsReceipt> for GoodsReceiptDto {
    fn from(receipt: &GoodsReceipt) -> Self {
        Self {
            id:                *receipt.id().as_uuid(),
            ref_number:        receipt.ref_number().to_string(),
            purchase_order_id: *receipt.purchase_order_id().as_uuid(),
            received_date:     receipt.received_date(),
            received_by:       *receipt.received_by().as_uuid(),
            remarks:           receipt.remarks().map(str::to_string),
            lines:             receipt
                .lines()
                .iter()
                .map(|line| GoodsReceiptLineDto {
                    po_line_id:        *line.po_line_id.as_uuid(),
                    quantity_received: line.quantity_received,
                    remarks:           line.remarks.clone(),
                })
                .collect(),
            created_at:        receipt.created_at(),
        }
    }
}
