//! テスト用のデータ生成ヘルパー
//!
//! `test-support` feature を有効にすると他クレートのテストからも使える。
//!
//! ```toml
//! [dev-dependencies]
//! procureflow-domain = { workspace = true, features = ["test-support"] }
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::{
    approval::{
        ApprovalStep, StepActionInput, StepActionPlan, StepDecision, generate_chain,
        plan_step_action,
    },
    case::{Case, CaseState, CaseStateRecord, CaseStatus},
    payment_request::{
        Disbursement, PaymentLineInput, PaymentLineItem, PaymentLineItemId, PaymentRequest,
        PaymentRequestContent, PaymentRequestId, PaymentRequestRecord, RequestType,
    },
    quote::{QuoteLine, VendorQuote, VendorQuoteId, VendorQuoteRecord},
    requisition::{
        LineItemInput, Priority, Requisition, RequisitionContent, RequisitionId,
        RequisitionLineItem, RequisitionLineItemId, RequisitionLineItemRecord, RequisitionRecord,
    },
    role::{Actor, Role},
    user::UserId,
    value_objects::{CaseTitle, RefNumber, RefPrefix, Version},
    vendor::{AccreditationStatus, Vendor, VendorId},
};

/// 指定ロールの操作者
pub fn actor(role: Role) -> Actor {
    Actor::new(UserId::new(), role)
}

/// 購買申請の明細入力
pub fn line(description: &str, quantity: i64, unit_cost: i64) -> LineItemInput {
    LineItemInput {
        description:         description.to_string(),
        unit:                "台".to_string(),
        quantity:            Decimal::from(quantity),
        estimated_unit_cost: Decimal::from(unit_cost),
    }
}

/// 購買申請の編集内容
pub fn requisition_content(lines: Vec<LineItemInput>) -> RequisitionContent {
    RequisitionContent {
        title:       CaseTitle::new("ノート PC の購入").unwrap(),
        department:  "情報システム部".to_string(),
        date_needed: None,
        priority:    Priority::Normal,
        description: None,
        line_items:  lines,
    }
}

fn state_in(status: CaseStatus, now: DateTime<Utc>) -> CaseState {
    CaseState::from_db(CaseStateRecord {
        status,
        status_before_hold: None,
        hold_reason: None,
        sla_deadline: None,
        sla_paused_at: None,
        version: Version::initial(),
        updated_at: now,
    })
}

/// 指定ステータスの購買申請（数量 1 の明細 1 件、書類チェック済み）
pub fn requisition_in(status: CaseStatus, total: i64, now: DateTime<Utc>) -> Requisition {
    Requisition::from_db(requisition_record(status, total, now))
}

fn requisition_record(status: CaseStatus, total: i64, now: DateTime<Utc>) -> RequisitionRecord {
    let amount = Decimal::from(total);
    RequisitionRecord {
        id: RequisitionId::new(),
        ref_number: RefNumber::new(RefPrefix::Requisition, 2026, 1).unwrap(),
        title: CaseTitle::new("ノート PC の購入").unwrap(),
        department: "情報システム部".to_string(),
        requested_by: UserId::new(),
        date_needed: None,
        priority: Priority::Normal,
        description: None,
        line_items: vec![RequisitionLineItem::from_db(RequisitionLineItemRecord {
            id:                  RequisitionLineItemId::new(),
            description:         "ノート PC".to_string(),
            unit:                "台".to_string(),
            quantity:            Decimal::ONE,
            estimated_unit_cost: amount,
            line_total:          amount,
            sort_order:          1,
        })],
        estimated_total: amount,
        provided_document_types: vec!["purchase_request_form".to_string()],
        checklist_satisfied: true,
        state: state_in(status, now),
        created_at: now,
    }
}

/// 指定ステータスで複数明細の購買申請（品名, 数量, 見積単価）
pub fn requisition_with_lines(
    status: CaseStatus,
    lines: &[(&str, i64, i64)],
    now: DateTime<Utc>,
) -> Requisition {
    let line_items = lines
        .iter()
        .zip(1..)
        .map(|((description, quantity, unit_cost), sort_order)| {
            let quantity = Decimal::from(*quantity);
            let unit_cost = Decimal::from(*unit_cost);
            RequisitionLineItem::from_db(RequisitionLineItemRecord {
                id: RequisitionLineItemId::new(),
                description: description.to_string(),
                unit: "個".to_string(),
                quantity,
                estimated_unit_cost: unit_cost,
                line_total: quantity * unit_cost,
                sort_order,
            })
        })
        .collect::<Vec<_>>();
    let estimated_total = line_items.iter().map(RequisitionLineItem::line_total).sum();

    Requisition::from_db(RequisitionRecord {
        line_items,
        estimated_total,
        ..requisition_record(status, 0, now)
    })
}

/// 支払申請の明細入力
pub fn payment_line(description: &str, amount: i64) -> PaymentLineInput {
    PaymentLineInput {
        description: description.to_string(),
        amount:      Decimal::from(amount),
    }
}

/// 支払申請の編集内容（発注書によらない支払）
pub fn payment_content(lines: Vec<PaymentLineInput>) -> PaymentRequestContent {
    PaymentRequestContent {
        request_type:   RequestType::NonPo,
        requisition_id: None,
        title:          CaseTitle::new("出張旅費の精算").unwrap(),
        particulars:    None,
        payee_name:     "山田太郎".to_string(),
        due_date:       None,
        department:     "営業部".to_string(),
        line_items:     lines,
    }
}

/// 指定ステータスの支払申請（明細 1 件）
pub fn payment_request_in(status: CaseStatus, amount: i64, now: DateTime<Utc>) -> PaymentRequest {
    let amount = Decimal::from(amount);
    PaymentRequest::from_db(PaymentRequestRecord {
        id: PaymentRequestId::new(),
        ref_number: RefNumber::new(RefPrefix::PaymentRequest, 2026, 1).unwrap(),
        request_type: RequestType::NonPo,
        requisition_id: None,
        title: CaseTitle::new("出張旅費の精算").unwrap(),
        particulars: None,
        payee_name: "山田太郎".to_string(),
        amount,
        due_date: None,
        department: "営業部".to_string(),
        requested_by: UserId::new(),
        line_items: vec![PaymentLineItem::from_db(
            PaymentLineItemId::new(),
            "出張旅費".to_string(),
            amount,
            1,
        )],
        disbursement: Disbursement::default(),
        state: state_in(status, now),
        created_at: now,
    })
}

/// 認定済みの業者
pub fn active_vendor(name: &str) -> Vendor {
    Vendor::from_db(VendorId::new(), name.to_string(), AccreditationStatus::Active)
}

/// 合計金額を指定した完全な見積
///
/// 金額はすべて先頭明細に載せる。`compliant` が false なら仕様不適合として評価済み。
pub fn quote_with_total(
    requisition: &Requisition,
    total: i64,
    compliant: bool,
    now: DateTime<Utc>,
) -> VendorQuote {
    let total = Decimal::from(total);
    let lines = requisition
        .line_items()
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let line_total = if index == 0 { total } else { Decimal::ZERO };
            QuoteLine::from_db(
                item.id().clone(),
                item.quantity(),
                line_total / item.quantity(),
                line_total,
            )
        })
        .collect();

    VendorQuote::from_db(VendorQuoteRecord {
        id: VendorQuoteId::new(),
        requisition_id: requisition.id().clone(),
        vendor_id: VendorId::new(),
        lines,
        grand_total: total,
        is_complete: true,
        is_compliant: Some(compliant),
        compliance_notes: None,
        is_awarded: false,
        registered_by: UserId::new(),
        version: Version::initial(),
        created_at: now,
        updated_at: now,
    })
}

fn submitted(case: Case, now: DateTime<Utc>) -> (Case, Vec<ApprovalStep>) {
    let chain = generate_chain(&case.case_ref(), case.amount(), &[], now);
    let case = case.map_state(|s| s.submitted(chain.first_deadline, now));
    (case, chain.steps)
}

/// 申請済みの購買申請と生成済みの承認チェーン
pub fn submitted_requisition(total: i64, now: DateTime<Utc>) -> (Case, Vec<ApprovalStep>) {
    submitted(requisition_in(CaseStatus::Draft, total, now).into(), now)
}

/// 申請済みの支払申請と生成済みの承認チェーン
pub fn submitted_payment_request(amount: i64, now: DateTime<Utc>) -> (Case, Vec<ApprovalStep>) {
    submitted(payment_request_in(CaseStatus::Draft, amount, now).into(), now)
}

/// 処理計画をステップ一覧に反映する
pub fn apply_plan(steps: &[ApprovalStep], plan: &StepActionPlan) -> Vec<ApprovalStep> {
    steps
        .iter()
        .filter(|step| !plan.deleted_step_ids.contains(step.id()))
        .map(|step| {
            std::iter::once(&plan.acted_step)
                .chain(&plan.cancelled_steps)
                .find(|updated| updated.id() == step.id())
                .unwrap_or(step)
                .clone()
        })
        .collect()
}

/// 先頭から `count` 件のステップを順に承認する
pub fn approve_all(
    case: Case,
    steps: Vec<ApprovalStep>,
    count: usize,
    now: DateTime<Utc>,
) -> (Case, Vec<ApprovalStep>) {
    (0..count).fold((case, steps), |(case, steps), index| {
        let step = &steps[index];
        let plan = plan_step_action(
            case,
            &steps,
            &actor(step.role_required()),
            StepActionInput {
                step_id:          step.id(),
                decision:         StepDecision::Approved,
                comment:          None,
                expected_version: step.version(),
            },
            now,
        )
        .expect("前段の承認に失敗");
        let steps = apply_plan(&steps, &plan);
        (plan.case, steps)
    })
}
