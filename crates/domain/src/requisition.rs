//! # 購買申請（Requisition）
//!
//! 明細付きで起票され、承認チェーン、見積、落札、発注、納品完了へと進む案件。
//!
//! ## 金額
//!
//! `estimated_total` は明細の `line_total`（数量 × 見積単価）の合計で、
//! 呼び出し元から受け取らずに常に再計算する。

use chrono::{DateTime, NaiveDate, Utc};
use itertools::Itertools;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

use crate::{
    DomainError,
    case::{CaseState, CaseStatus},
    user::UserId,
    value_objects::{CaseTitle, RefNumber},
};

define_uuid_id! {
    /// 購買申請 ID
    pub struct RequisitionId;
}

define_uuid_id! {
    /// 購買申請明細 ID
    pub struct RequisitionLineItemId;
}

/// 優先度
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, IntoStaticStr, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Priority {
    #[default]
    Normal,
    Urgent,
}

impl std::str::FromStr for Priority {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Self::Normal),
            "urgent" => Ok(Self::Urgent),
            _ => Err(DomainError::Validation(format!("不正な優先度: {s}"))),
        }
    }
}

// =========================================================================
// 明細
// =========================================================================

/// 明細の入力
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItemInput {
    pub description:         String,
    pub unit:                String,
    pub quantity:            Decimal,
    pub estimated_unit_cost: Decimal,
}

/// 購買申請明細
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequisitionLineItem {
    id:                  RequisitionLineItemId,
    description:         String,
    unit:                String,
    quantity:            Decimal,
    estimated_unit_cost: Decimal,
    line_total:          Decimal,
    sort_order:          i32,
}

/// 購買申請明細の DB 復元パラメータ
pub struct RequisitionLineItemRecord {
    pub id:                  RequisitionLineItemId,
    pub description:         String,
    pub unit:                String,
    pub quantity:            Decimal,
    pub estimated_unit_cost: Decimal,
    pub line_total:          Decimal,
    pub sort_order:          i32,
}

impl RequisitionLineItem {
    fn new(input: LineItemInput, sort_order: i32) -> Result<Self, DomainError> {
        let description = input.description.trim().to_string();
        if description.is_empty() {
            return Err(DomainError::Validation(format!(
                "明細 {sort_order} の品名は必須です"
            )));
        }
        if input.quantity <= Decimal::ZERO {
            return Err(DomainError::Validation(format!(
                "明細 {sort_order} の数量は 0 より大きい必要があります"
            )));
        }
        if input.estimated_unit_cost < Decimal::ZERO {
            return Err(DomainError::Validation(format!(
                "明細 {sort_order} の見積単価は 0 以上である必要があります"
            )));
        }

        Ok(Self {
            id: RequisitionLineItemId::new(),
            description,
            unit: input.unit.trim().to_string(),
            quantity: input.quantity,
            estimated_unit_cost: input.estimated_unit_cost,
            line_total: input.quantity * input.estimated_unit_cost,
            sort_order,
        })
    }

    pub fn from_db(record: RequisitionLineItemRecord) -> Self {
        Self {
            id:                  record.id,
            description:         record.description,
            unit:                record.unit,
            quantity:            record.quantity,
            estimated_unit_cost: record.estimated_unit_cost,
            line_total:          record.line_total,
            sort_order:          record.sort_order,
        }
    }

    pub fn id(&self) -> &RequisitionLineItemId {
        &self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn estimated_unit_cost(&self) -> Decimal {
        self.estimated_unit_cost
    }

    pub fn line_total(&self) -> Decimal {
        self.line_total
    }

    pub fn sort_order(&self) -> i32 {
        self.sort_order
    }
}

fn build_line_items(inputs: Vec<LineItemInput>) -> Result<Vec<RequisitionLineItem>, DomainError> {
    if inputs.is_empty() {
        return Err(DomainError::Validation(
            "明細は 1 件以上必要です".to_string(),
        ));
    }
    inputs
        .into_iter()
        .zip(1..)
        .map(|(input, sort_order)| RequisitionLineItem::new(input, sort_order))
        .collect()
}

fn sum_line_totals(items: &[RequisitionLineItem]) -> Decimal {
    items.iter().map(RequisitionLineItem::line_total).sum()
}

// =========================================================================
// 購買申請
// =========================================================================

/// 購買申請の編集内容
///
/// 起票と下書き編集の両方で使う。
#[derive(Debug, Clone)]
pub struct RequisitionContent {
    pub title:       CaseTitle,
    pub department:  String,
    pub date_needed: Option<NaiveDate>,
    pub priority:    Priority,
    pub description: Option<String>,
    pub line_items:  Vec<LineItemInput>,
}

/// 購買申請エンティティ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requisition {
    id: RequisitionId,
    ref_number: RefNumber,
    title: CaseTitle,
    department: String,
    requested_by: UserId,
    date_needed: Option<NaiveDate>,
    priority: Priority,
    description: Option<String>,
    line_items: Vec<RequisitionLineItem>,
    estimated_total: Decimal,
    provided_document_types: Vec<String>,
    checklist_satisfied: bool,
    state: CaseState,
    created_at: DateTime<Utc>,
}

/// 購買申請の新規作成パラメータ
pub struct NewRequisition {
    pub id: RequisitionId,
    pub ref_number: RefNumber,
    pub requested_by: UserId,
    pub content: RequisitionContent,
    pub required_document_types: Vec<String>,
    pub now: DateTime<Utc>,
}

/// 購買申請の DB 復元パラメータ
pub struct RequisitionRecord {
    pub id: RequisitionId,
    pub ref_number: RefNumber,
    pub title: CaseTitle,
    pub department: String,
    pub requested_by: UserId,
    pub date_needed: Option<NaiveDate>,
    pub priority: Priority,
    pub description: Option<String>,
    pub line_items: Vec<RequisitionLineItem>,
    pub estimated_total: Decimal,
    pub provided_document_types: Vec<String>,
    pub checklist_satisfied: bool,
    pub state: CaseState,
    pub created_at: DateTime<Utc>,
}

impl Requisition {
    /// 下書きとして起票する
    pub fn new(params: NewRequisition) -> Result<Self, DomainError> {
        let content = params.content;
        let line_items = build_line_items(content.line_items)?;
        let estimated_total = sum_line_totals(&line_items);

        Ok(Self {
            id: params.id,
            ref_number: params.ref_number,
            title: content.title,
            department: content.department,
            requested_by: params.requested_by,
            date_needed: content.date_needed,
            priority: content.priority,
            description: content.description,
            line_items,
            estimated_total,
            provided_document_types: Vec::new(),
            checklist_satisfied: checklist_satisfied(&[], &params.required_document_types),
            state: CaseState::draft(params.now),
            created_at: params.now,
        })
    }

    pub fn from_db(record: RequisitionRecord) -> Self {
        Self {
            id: record.id,
            ref_number: record.ref_number,
            title: record.title,
            department: record.department,
            requested_by: record.requested_by,
            date_needed: record.date_needed,
            priority: record.priority,
            description: record.description,
            line_items: record.line_items,
            estimated_total: record.estimated_total,
            provided_document_types: record.provided_document_types,
            checklist_satisfied: record.checklist_satisfied,
            state: record.state,
            created_at: record.created_at,
        }
    }

    // Getter メソッド

    pub fn id(&self) -> &RequisitionId {
        &self.id
    }

    pub fn ref_number(&self) -> RefNumber {
        self.ref_number
    }

    pub fn title(&self) -> &CaseTitle {
        &self.title
    }

    pub fn department(&self) -> &str {
        &self.department
    }

    pub fn requested_by(&self) -> &UserId {
        &self.requested_by
    }

    pub fn date_needed(&self) -> Option<NaiveDate> {
        self.date_needed
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn line_items(&self) -> &[RequisitionLineItem] {
        &self.line_items
    }

    pub fn estimated_total(&self) -> Decimal {
        self.estimated_total
    }

    pub fn provided_document_types(&self) -> &[String] {
        &self.provided_document_types
    }

    pub fn checklist_satisfied(&self) -> bool {
        self.checklist_satisfied
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
    ///
    /// 明細は丸ごと置き換え、合計を再計算する。
    pub fn updated(
        self,
        content: RequisitionContent,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        self.ensure_editable()?;
        let line_items = build_line_items(content.line_items)?;
        let estimated_total = sum_line_totals(&line_items);

        Ok(Self {
            title: content.title,
            department: content.department,
            date_needed: content.date_needed,
            priority: content.priority,
            description: content.description,
            line_items,
            estimated_total,
            state: self.state.touched(now),
            ..self
        })
    }

    /// 提出済み書類の種別を記録し、チェックリストの充足を再計算する
    pub fn checklist_updated(
        self,
        provided_document_types: Vec<String>,
        required_document_types: &[String],
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        self.ensure_editable()?;
        let provided = provided_document_types
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .sorted()
            .dedup()
            .collect::<Vec<_>>();
        let satisfied = checklist_satisfied(&provided, required_document_types);

        Ok(Self {
            provided_document_types: provided,
            checklist_satisfied: satisfied,
            state: self.state.touched(now),
            ..self
        })
    }

    fn ensure_editable(&self) -> Result<(), DomainError> {
        if !matches!(self.status(), CaseStatus::Draft | CaseStatus::Returned) {
            return Err(DomainError::Validation(format!(
                "下書きまたは差し戻し中の申請のみ編集できます（現在: {}）",
                self.status()
            )));
        }
        Ok(())
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

fn checklist_satisfied(provided: &[String], required: &[String]) -> bool {
    required.iter().all(|r| provided.contains(r))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    use super::*;
    use crate::{
        test_support::{line, requisition_content as content, requisition_in},
        value_objects::{RefPrefix, Version},
    };

    #[fixture]
    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn new_requisition(
        lines: Vec<LineItemInput>,
        required: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<Requisition, DomainError> {
        Requisition::new(NewRequisition {
            id: RequisitionId::new(),
            ref_number: RefNumber::new(RefPrefix::Requisition, 2026, 7).unwrap(),
            requested_by: UserId::new(),
            content: content(lines),
            required_document_types: required,
            now,
        })
    }

    #[rstest]
    fn test_起票時に合計金額を明細から計算する(now: DateTime<Utc>) {
        let sut = new_requisition(
            vec![line("ノート PC", 3, 150_000), line("マウス", 10, 2_500)],
            vec![],
            now,
        )
        .unwrap();

        assert_eq!(sut.estimated_total(), Decimal::from(475_000));
        assert_eq!(sut.line_items()[1].line_total(), Decimal::from(25_000));
        assert_eq!(sut.line_items()[1].sort_order(), 2);
        assert_eq!(sut.status(), CaseStatus::Draft);
        assert_eq!(sut.state().version(), Version::initial());
    }

    #[rstest]
    fn test_小数の数量と単価でも誤差なく計算する(now: DateTime<Utc>) {
        let sut = new_requisition(
            vec![LineItemInput {
                description:         "ケーブル".to_string(),
                unit:                "m".to_string(),
                quantity:            Decimal::new(15, 1),
                estimated_unit_cost: Decimal::new(3333, 2),
            }],
            vec![],
            now,
        )
        .unwrap();

        assert_eq!(sut.estimated_total(), Decimal::new(49995, 3));
    }

    #[rstest]
    #[case::明細なし(vec![])]
    #[case::数量ゼロ(vec![line("ノート PC", 0, 1000)])]
    #[case::単価が負(vec![line("ノート PC", 1, -1)])]
    #[case::品名が空白(vec![line("  ", 1, 1000)])]
    fn test_不正な明細はバリデーションエラー(
        #[case] lines: Vec<LineItemInput>,
        now: DateTime<Utc>,
    ) {
        let result = new_requisition(lines, vec![], now);

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[rstest]
    fn test_必須書類がある場合は起票直後のチェックリストは未充足(now: DateTime<Utc>) {
        let sut = new_requisition(
            vec![line("ノート PC", 1, 1000)],
            vec!["purchase_request_form".to_string()],
            now,
        )
        .unwrap();

        assert!(!sut.checklist_satisfied());
    }

    #[rstest]
    fn test_書類を登録するとチェックリストが充足する(now: DateTime<Utc>) {
        let required = vec!["purchase_request_form".to_string()];
        let sut = new_requisition(vec![line("ノート PC", 1, 1000)], required.clone(), now)
            .unwrap()
            .checklist_updated(
                vec![
                    "purchase_request_form".to_string(),
                    "quotation".to_string(),
                    "purchase_request_form".to_string(),
                ],
                &required,
                now,
            )
            .unwrap();

        assert!(sut.checklist_satisfied());
        assert_eq!(
            sut.provided_document_types(),
            ["purchase_request_form".to_string(), "quotation".to_string()]
        );
        assert_eq!(sut.state().version().as_u32(), 2);
    }

    #[rstest]
    fn test_編集で明細を置き換え合計を再計算する(now: DateTime<Utc>) {
        let draft = new_requisition(vec![line("ノート PC", 1, 1000)], vec![], now).unwrap();

        let sut = draft
            .updated(content(vec![line("デスクトップ PC", 2, 2000)]), now)
            .unwrap();

        assert_eq!(sut.line_items().len(), 1);
        assert_eq!(sut.estimated_total(), Decimal::from(4000));
        assert_eq!(sut.state().version().as_u32(), 2);
    }

    #[rstest]
    #[case(CaseStatus::Submitted)]
    #[case(CaseStatus::UnderReview)]
    #[case(CaseStatus::Approved)]
    fn test_提出後は編集できない(#[case] status: CaseStatus, now: DateTime<Utc>) {
        let sut = requisition_in(status, 1000, now);

        let result = sut.updated(content(vec![line("デスクトップ PC", 1, 1000)]), now);

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[rstest]
    fn test_差し戻し中は編集できる(now: DateTime<Utc>) {
        let sut = requisition_in(CaseStatus::Returned, 1000, now);

        let result = sut.updated(content(vec![line("デスクトップ PC", 1, 1000)]), now);

        assert!(result.is_ok());
    }
}
