//! # 案件ステータス遷移の検証
//!
//! 承認ステップを経由しない案件レベルのステータス遷移（申請、見積評価、落札、
//! 発注、完了、支払など）を検証する。
//!
//! 検証に必要な外部の事実（見積の件数や例外承認、発注書と検収の状況）は
//! [`TransitionFacts`] として呼び出し側が集めて渡す。
//!
//! ## ガード（判定順）
//!
//! 1. 呼び出し元が読んだバージョンが最新（`Conflict`）
//! 2. 案件種別が遷移先ステータスを持つ
//! 3. 現在のステータスが終端（`cancelled` / `closed`）でない
//! 4. 遷移先が現在のステータスと異なる
//! 5. 現在のステータスが遷移元として許されている（下表）
//! 6. 遷移先ごとの条件
//!
//! 保留からは保留前のステータスへ戻る遷移も許す。
//!
//! ## 遷移元（購買申請）
//!
//! | 遷移先 | 遷移元 |
//! |-------|-------|
//! | `submitted` | `draft` / `returned` |
//! | `under_review` | `submitted` |
//! | `for_quoting` | `under_review` |
//! | `quote_evaluation` | `for_quoting` |
//! | `for_approval` | `quote_evaluation` |
//! | `approved` | 承認中 |
//! | `rejected` / `returned` | 承認中、`on_hold` |
//! | `on_hold` | 承認中、`approved` / `awarded` / `po_issued` |
//! | `awarded` | `approved` |
//! | `po_issued` | `awarded` |
//! | `completed` | `po_issued` |
//! | `closed` | `completed` |
//! | `cancelled` | `draft` / `returned` / `rejected` / `on_hold` / `approved`、承認中 |
//!
//! 承認中は `submitted` / `under_review` / `for_quoting` / `quote_evaluation` / `for_approval`。
//!
//! ## 遷移元（支払申請）
//!
//! | 遷移先 | 遷移元 |
//! |-------|-------|
//! | `submitted` | `draft` / `returned` |
//! | `under_review` | `submitted` |
//! | `for_approval` | `submitted` / `under_review` |
//! | `approved` | 承認中 |
//! | `rejected` / `returned` | 承認中、`on_hold` |
//! | `on_hold` | 承認中、`approved` / `sap_synced` |
//! | `sap_synced` | `approved` |
//! | `paid` | `sap_synced` |
//! | `closed` | `paid` |
//! | `cancelled` | `draft` / `returned` / `rejected` / `on_hold` / `approved`、承認中 |
//!
//! 承認中は `submitted` / `under_review` / `for_approval`。
//!
//! ## 遷移先ごとの条件
//!
//! | 遷移先 | 条件 |
//! |-------|------|
//! | `submitted` | 明細あり、購買申請は書類チェック済み |
//! | `quote_evaluation` / `for_approval`（購買申請） | 有効見積 3 件以上か見積例外あり |
//! | `awarded` | 落札フラグ付きの見積がちょうど 1 件 |
//! | `paid` | 小切手番号あり |

use chrono::{DateTime, Utc};

use crate::{
    DomainError,
    award::ensure_rule_of_three,
    case::{Case, CaseKind, CaseStatus},
    value_objects::Version,
};

use crate::case::CaseStatus::{
    Approved,
    Awarded,
    Cancelled,
    Closed,
    Completed,
    Draft,
    ForApproval,
    ForQuoting,
    OnHold,
    Paid,
    PoIssued,
    QuoteEvaluation,
    Rejected,
    Returned,
    SapSynced,
    Submitted,
    UnderReview,
};

/// 遷移先ごとに許される遷移元
///
/// 種別が持たない遷移先は空を返す。
pub fn allowed_sources(kind: CaseKind, target: CaseStatus) -> &'static [CaseStatus] {
    match (kind, target) {
        (_, Submitted) => &[Draft, Returned],
        (_, UnderReview) => &[Submitted],
        (CaseKind::Requisition, ForQuoting) => &[UnderReview],
        (CaseKind::Requisition, QuoteEvaluation) => &[ForQuoting],
        (CaseKind::Requisition, ForApproval) => &[QuoteEvaluation],
        (CaseKind::Requisition, Approved) => {
            &[Submitted, UnderReview, ForQuoting, QuoteEvaluation, ForApproval]
        }
        (CaseKind::Requisition, Rejected | Returned) => {
            &[Submitted, UnderReview, ForQuoting, QuoteEvaluation, ForApproval, OnHold]
        }
        (CaseKind::Requisition, OnHold) => &[
            Submitted,
            UnderReview,
            ForQuoting,
            QuoteEvaluation,
            ForApproval,
            Approved,
            Awarded,
            PoIssued,
        ],
        (CaseKind::Requisition, Awarded) => &[Approved],
        (CaseKind::Requisition, PoIssued) => &[Awarded],
        (CaseKind::Requisition, Completed) => &[PoIssued],
        (CaseKind::Requisition, Closed) => &[Completed],
        (CaseKind::Requisition, Cancelled) => &[
            Draft,
            Returned,
            Rejected,
            OnHold,
            Approved,
            Submitted,
            UnderReview,
            ForQuoting,
            QuoteEvaluation,
            ForApproval,
        ],
        (CaseKind::PaymentRequest, ForApproval) => &[Submitted, UnderReview],
        (CaseKind::PaymentRequest, Approved) => &[Submitted, UnderReview, ForApproval],
        (CaseKind::PaymentRequest, Rejected | Returned) => {
            &[Submitted, UnderReview, ForApproval, OnHold]
        }
        (CaseKind::PaymentRequest, OnHold) => {
            &[Submitted, UnderReview, ForApproval, Approved, SapSynced]
        }
        (CaseKind::PaymentRequest, SapSynced) => &[Approved],
        (CaseKind::PaymentRequest, Paid) => &[SapSynced],
        (CaseKind::PaymentRequest, Closed) => &[Paid],
        (CaseKind::PaymentRequest, Cancelled) => &[
            Draft,
            Returned,
            Rejected,
            OnHold,
            Approved,
            Submitted,
            UnderReview,
            ForApproval,
        ],
        _ => &[],
    }
}

/// 遷移の検証に使う外部の事実
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionFacts {
    /// 有効見積の件数
    pub responsive_quote_count: usize,
    /// 見積例外の承認記録があるか
    pub has_quote_exception:    bool,
    /// 落札フラグ付きの見積件数
    pub awarded_quote_count:    usize,
    /// 発注書が発行されているか
    pub purchase_order_issued:  bool,
    /// 発注書の全明細が検収済みか
    pub fully_received:         bool,
}

/// 遷移を検証する
pub fn validate_transition(
    case: &Case,
    target: CaseStatus,
    expected_version: Version,
    facts: &TransitionFacts,
) -> Result<(), DomainError> {
    case.ensure_version(expected_version)?;

    let kind = case.kind();
    if !kind.supports(target) {
        return Err(DomainError::Validation(format!(
            "{kind} には {target} ステータスがありません"
        )));
    }

    let current = case.status();
    if current.is_terminal() {
        return Err(DomainError::Validation(format!(
            "{current} の案件は遷移できません"
        )));
    }
    if current == target {
        return Err(DomainError::Validation(format!(
            "すでに {current} です"
        )));
    }

    let resumes_from_hold =
        current == OnHold && case.state().status_before_hold() == Some(target);
    if !resumes_from_hold && !allowed_sources(kind, target).contains(&current) {
        return Err(DomainError::Validation(format!(
            "{current} から {target} へは遷移できません"
        )));
    }

    match target {
        Submitted => validate_submission(case),
        QuoteEvaluation | ForApproval if kind == CaseKind::Requisition => {
            ensure_rule_of_three(facts.responsive_quote_count, facts.has_quote_exception)
        }
        Awarded => {
            if facts.awarded_quote_count != 1 {
                return Err(DomainError::Validation(format!(
                    "落札済みの見積がちょうど 1 件必要です（現在: {} 件）",
                    facts.awarded_quote_count
                )));
            }
            Ok(())
        }
        PoIssued if !facts.purchase_order_issued => Err(DomainError::Validation(
            "発注書が発行されていません".to_string(),
        )),
        Completed if !facts.fully_received => Err(DomainError::Validation(
            "検収が済んでいない発注明細があります".to_string(),
        )),
        Paid => validate_payment(case),
        _ => Ok(()),
    }
}

fn validate_submission(case: &Case) -> Result<(), DomainError> {
    if !case.has_line_items() {
        return Err(DomainError::Validation(
            "明細のない案件は申請できません".to_string(),
        ));
    }
    if let Case::Requisition(requisition) = case
        && !requisition.checklist_satisfied()
    {
        return Err(DomainError::Validation(
            "必要書類がそろっていません".to_string(),
        ));
    }
    Ok(())
}

fn validate_payment(case: &Case) -> Result<(), DomainError> {
    let has_check_number = match case {
        Case::PaymentRequest(p) => p.disbursement().check_number.is_some(),
        Case::Requisition(_) => false,
    };
    if !has_check_number {
        return Err(DomainError::Validation(
            "支払済みにするには小切手番号が必要です".to_string(),
        ));
    }
    Ok(())
}

/// 検証済みの遷移を適用する
///
/// `on_hold` への遷移は SLA を停止し、`on_hold` からの遷移は SLA を再開する。
pub fn apply_transition(
    case: Case,
    target: CaseStatus,
    comment: Option<&str>,
    now: DateTime<Utc>,
) -> Case {
    case.map_state(|state| state.transitioned(target, comment, now))
}
