//! # 支払申請（Payment Request）
//!
//! 購買申請と同じ形の承認チェーンを通過した後、
//! 会計システム連携（`sap_synced`）、支払（`paid`）、完了（`closed`）へ進む。
//!
//! 支払の各段階で発行される伝票番号（APV、CV、小切手番号）は
//! ステータス遷移と同時に記録する。

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

use crate::{
    DomainError,
    case::{CaseState, CaseStatus},
    requisition::RequisitionId,
    user::UserId,
    value_objects::{CaseTitle, RefNumber},
};

define_uuid_id! {
    /// 支払申請 ID
    pub struct PaymentRequestId;
}

define_uuid_id! {
    /// 支払申請明細 ID
    pub struct PaymentLineItemId;
}

/// 支払申請の種別
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, IntoStaticStr, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RequestType {
    /// 発注書に基づく支払
    PoBased,
    /// 発注書なしの支払
    NonPo,
    /// 立替精算
    Reimbursement,
    /// 仮払
    CashAdvance,
}

impl std::str::FromStr for RequestType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "po_based" => Ok(Self::PoBased),
            "non_po" => Ok(Self::NonPo),
            "reimbursement" => Ok(Self::Reimbursement),
            "cash_advance" => Ok(Self::CashAdvance),
            _ => Err(DomainError::Validation(format!("不正な支払種別: {s}"))),
        }
    }
}

/// 支払明細の入力
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentLineInput {
    pub description: String,
    pub amount:      Decimal,
}

/// 支払明細
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentLineItem {
    id:          PaymentLineItemId,
    description: String,
    amount:      Decimal,
    sort_order:  i32,
}

impl PaymentLineItem {
    fn new(input: PaymentLineInput, sort_order: i32) -> Result<Self, DomainError> {
        let description = input.description.trim().to_string();
        if description.is_empty() {
            return Err(DomainError::Validation(format!(
                "明細 {sort_order} の摘要は必須です"
            )));
        }
        if input.amount <= Decimal::ZERO {
            return Err(DomainError::Validation(format!(
                "明細 {sort_order} の金額は 0 より大きい必要があります"
            )));
        }
        Ok(Self {
            id: PaymentLineItemId::new(),
            description,
            amount: input.amount,
            sort_order,
        })
    }

    pub fn from_db(
        id: PaymentLineItemId,
        description: String,
        amount: Decimal,
        sort_order: i32,
    ) -> Self {
        Self {
            id,
            description,
            amount,
            sort_order,
        }
    }

    pub fn id(&self) -> &PaymentLineItemId {
        &self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn sort_order(&self) -> i32 {
        self.sort_order
    }
}

/// 支払の伝票番号
///
/// 遷移リクエストで渡された項目のみ上書きする。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Disbursement {
    pub apv_number:   Option<String>,
    pub cv_number:    Option<String>,
    pub check_number: Option<String>,
}

impl Disbursement {
    fn merged(self, update: Disbursement) -> Self {
        fn pick(new: Option<String>, old: Option<String>) -> Option<String> {
            new.map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .or(old)
        }
        Self {
            apv_number:   pick(update.apv_number, self.apv_number),
            cv_number:    pick(update.cv_number, self.cv_number),
            check_number: pick(update.check_number, self.check_number),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.apv_number.is_none() && self.cv_number.is_none() && self.check_number.is_none()
    }
}

/// 支払申請の編集内容
#[derive(Debug, Clone)]
pub struct PaymentRequestContent {
    pub request_type:   RequestType,
    pub requisition_id: Option<RequisitionId>,
    pub title:          CaseTitle,
    pub particulars:    Option<String>,
    pub payee_name:     String,
    pub due_date:       Option<NaiveDate>,
    pub department:     String,
    pub line_items:     Vec<PaymentLineInput>,
}

/// 支払申請エンティティ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    id: PaymentRequestId,
    ref_number: RefNumber,
    request_type: RequestType,
    requisition_id: Option<RequisitionId>,
    title: CaseTitle,
    particulars: Option<String>,
    payee_name: String,
    amount: Decimal,
    due_date: Option<NaiveDate>,
    department: String,
    requested_by: UserId,
    line_items: Vec<PaymentLineItem>,
    disbursement: Disbursement,
    state: CaseState,
    created_at: DateTime<Utc>,
}

/// 支払申請の新規作成パラメータ
pub struct NewPaymentRequest {
    pub id:           PaymentRequestId,
    pub ref_number:   RefNumber,
    pub requested_by: UserId,
    pub content:      PaymentRequestContent,
    pub now:          DateTime<Utc>,
}

/// 支払申請の DB 復元パラメータ
pub struct PaymentRequestRecord {
    pub id: PaymentRequestId,
    pub ref_number: RefNumber,
    pub request_type: RequestType,
    pub requisition_id: Option<RequisitionId>,
    pub title: CaseTitle,
    pub particulars: Option<String>,
    pub payee_name: String,
    pub amount: Decimal,
    pub due_date: Option<NaiveDate>,
    pub department: String,
    pub requested_by: UserId,
    pub line_items: Vec<PaymentLineItem>,
    pub disbursement: Disbursement,
    pub state: CaseState,
    pub created_at: DateTime<Utc>,
}

fn build_line_items(inputs: Vec<PaymentLineInput>) -> Result<Vec<PaymentLineItem>, DomainError> {
    if inputs.is_empty() {
        return Err(DomainError::Validation(
            "明細は 1 件以上必要です".to_string(),
        ));
    }
    inputs
        .into_iter()
        .zip(1..)
        .map(|(input, sort_order)| PaymentLineItem::new(input, sort_order))
        .collect()
}

fn validate_content(content: &PaymentRequestContent) -> Result<(), DomainError> {
    if content.payee_name.trim().is_empty() {
        return Err(DomainError::Validation("支払先は必須です".to_string()));
    }
    if content.request_type == RequestType::PoBased && content.requisition_id.is_none() {
        return Err(DomainError::Validation(
            "発注書に基づく支払には購買申請の指定が必要です".to_string(),
        ));
    }
    Ok(())
}

impl PaymentRequest {
    /// 下書きとして起票する
    pub fn new(params: NewPaymentRequest) -> Result<Self, DomainError> {
        let content = params.content;
        validate_content(&content)?;
        let line_items = build_line_items(content.line_items)?;
        let amount = line_items.iter().map(PaymentLineItem::amount).sum();

        Ok(Self {
            id: params.id,
            ref_number: params.ref_number,
            request_type: content.request_type,
            requisition_id: content.requisition_id,
            title: content.title,
            particulars: content.particulars,
            payee_name: content.payee_name.trim().to_string(),
            amount,
            due_date: content.due_date,
            department: content.department,
            requested_by: params.requested_by,
            line_items,
            disbursement: Disbursement::default(),
            state: CaseState::draft(params.now),
            created_at: params.now,
        })
    }

    pub fn from_db(record: PaymentRequestRecord) -> Self {
        Self {
            id: record.id,
            ref_number: record.ref_number,
            request_type: record.request_type,
            requisition_id: record.requisition_id,
            title: record.title,
            particulars: record.particulars,
            payee_name: record.payee_name,
            amount: record.amount,
            due_date: record.due_date,
            department: record.department,
            requested_by: record.requested_by,
            line_items: record.line_items,
            disbursement: record.disbursement,
            state: record.state,
            created_at: record.created_at,
        }
    }

    // Getter メソッド

    pub fn id(&self) -> &PaymentRequestId {
        &self.id
    }

    pub fn ref_number(&self) -> RefNumber {
        self.ref_number
    }

    pub fn request_type(&self) -> RequestType {
        self.request_type
    }

    pub fn requisition_id(&self) -> Option<&RequisitionId> {
        self.requisition_id.as_ref()
    }

    pub fn title(&self) -> &CaseTitle {
        &self.title
    }

    pub fn particulars(&self) -> Option<&str> {
        self.particulars.as_deref()
    }

    pub fn payee_name(&self) -> &str {
        &self.payee_name
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    pub fn department(&self) -> &str {
        &self.department
    }

    pub fn requested_by(&self) -> &UserId {
        &self.requested_by
    }

    pub fn line_items(&self) -> &[PaymentLineItem] {
        &self.line_items
    }

    pub fn disbursement(&self) -> &Disbursement {
        &self.disbursement
    }

    pub fn state(&self) -> &CaseState {
        &self.state
    }

    pub fn status(&self) -> CaseStatus {
        self.state.status()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    // ビジネスロジックメソッド

    /// 下書き・差し戻し中の内容を編集する
    pub fn updated(
        self,
        content: PaymentRequestContent,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if !matches!(self.status(), CaseStatus::Draft | CaseStatus::Returned) {
            return Err(DomainError::Validation(format!(
                "下書きまたは差し戻し中の申請のみ編集できます（現在: {}）",
                self.status()
            )));
        }
        validate_content(&content)?;
        let line_items = build_line_items(content.line_items)?;
        let amount = line_items.iter().map(PaymentLineItem::amount).sum();

        Ok(Self {
            request_type: content.request_type,
            requisition_id: content.requisition_id,
            title: content.title,
            particulars: content.particulars,
            payee_name: content.payee_name.trim().to_string(),
            amount,
            due_date: content.due_date,
            department: content.department,
            line_items,
            state: self.state.touched(now),
            ..self
        })
    }

    /// 伝票番号を反映する（バージョンは遷移側で更新する）
    pub fn with_disbursement(self, update: Disbursement) -> Self {
        Self {
            disbursement: self.disbursement.merged(update),
            ..self
        }
    }

    pub(crate) fn map_state(self, f: impl FnOnce(CaseState) -> CaseState) -> Self {
        Self {
            state: f(self.state),
            ..self
        }
    }

    pub(crate) fn try_map_state<T>(
        self,
        f: impl FnOnce(CaseState) -> Result<(CaseState, T), DomainError>,
    ) -> Result<(Self, T), DomainError> {
        let (state, extra) = f(self.state)?;
        Ok((Self { state, ..self }, extra))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    use super::*;
    use crate::{
        test_support::{payment_content, payment_line, payment_request_in},
        value_objects::RefPrefix,
    };

    #[fixture]
    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn create(
        content: PaymentRequestContent,
        now: DateTime<Utc>,
    ) -> Result<PaymentRequest, DomainError> {
        PaymentRequest::new(NewPaymentRequest {
            id: PaymentRequestId::new(),
            ref_number: RefNumber::new(RefPrefix::PaymentRequest, 2026, 3).unwrap(),
            requested_by: UserId::new(),
            content,
            now,
        })
    }

    #[rstest]
    fn test_起票時に金額を明細から計算する(now: DateTime<Utc>) {
        let sut = create(
            payment_content(vec![
                payment_line("出張旅費", 45_000),
                payment_line("宿泊費", 12_000),
            ]),
            now,
        )
        .unwrap();

        assert_eq!(sut.amount(), Decimal::from(57_000));
        assert_eq!(sut.status(), CaseStatus::Draft);
        assert_eq!(sut.ref_number().to_string(), "RF-2026-00003");
    }

    #[rstest]
    fn test_発注書払いは購買申請の指定が必須(now: DateTime<Utc>) {
        let mut content = payment_content(vec![payment_line("機器代金", 100_000)]);
        content.request_type = RequestType::PoBased;
        content.requisition_id = None;

        let result = create(content, now);

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[rstest]
    fn test_明細なしはバリデーションエラー(now: DateTime<Utc>) {
        let result = create(payment_content(vec![]), now);

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[rstest]
    fn test_伝票番号は指定した項目のみ上書きする(now: DateTime<Utc>) {
        let sut = payment_request_in(CaseStatus::Approved, 10_000, now)
            .with_disbursement(Disbursement {
                apv_number: Some("APV-001".to_string()),
                ..Default::default()
            })
            .with_disbursement(Disbursement {
                check_number: Some(" 0012345 ".to_string()),
                apv_number: Some("   ".to_string()),
                ..Default::default()
            });

        assert_eq!(
            sut.disbursement(),
            &Disbursement {
                apv_number:   Some("APV-001".to_string()),
                cv_number:    None,
                check_number: Some("0012345".to_string()),
            }
        );
    }
}
