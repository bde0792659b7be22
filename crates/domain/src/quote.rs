//! # 業者見積
//!
//! 購買申請の明細ごとに業者が単価を提示する。
//!
//! - `grand_total`: 単価が提示された明細の（数量 × 単価）の合計
//! - `is_complete`: 申請の全明細に単価が提示されている
//! - `is_compliant`: 調達担当が仕様適合を手動で確認した結果（未確認は `None`）
//!
//! 完全かつ適合の見積を「有効見積」と呼び、評価・承認・落札の判定に使う。

use chrono::{DateTime, Utc};
use itertools::Itertools;
use rust_decimal::Decimal;

use crate::{
    DomainError,
    case::CaseStatus,
    requisition::{Requisition, RequisitionId, RequisitionLineItemId},
    user::UserId,
    value_objects::Version,
    vendor::{Vendor, VendorId},
};

define_uuid_id! {
    /// 業者見積 ID
    pub struct VendorQuoteId;
}

/// 見積を登録・評価できる購買申請のステータス
const QUOTABLE_STATUSES: [CaseStatus; 3] = [
    CaseStatus::ForQuoting,
    CaseStatus::QuoteEvaluation,
    CaseStatus::Approved,
];

fn ensure_quotable(requisition: &Requisition) -> Result<(), DomainError> {
    if !QUOTABLE_STATUSES.contains(&requisition.status()) {
        return Err(DomainError::Validation(format!(
            "現在のステータス（{}）では見積を登録・評価できません",
            requisition.status()
        )));
    }
    Ok(())
}

/// 見積明細の入力
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteLineInput {
    pub line_item_id: RequisitionLineItemId,
    pub unit_price:   Decimal,
}

/// 見積明細
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteLine {
    line_item_id: RequisitionLineItemId,
    quantity:     Decimal,
    unit_price:   Decimal,
    line_total:   Decimal,
}

impl QuoteLine {
    pub fn from_db(
        line_item_id: RequisitionLineItemId,
        quantity: Decimal,
        unit_price: Decimal,
        line_total: Decimal,
    ) -> Self {
        Self {
            line_item_id,
            quantity,
            unit_price,
            line_total,
        }
    }

    pub fn line_item_id(&self) -> &RequisitionLineItemId {
        &self.line_item_id
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    pub fn line_total(&self) -> Decimal {
        self.line_total
    }
}

/// 業者見積エンティティ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorQuote {
    id: VendorQuoteId,
    requisition_id: RequisitionId,
    vendor_id: VendorId,
    lines: Vec<QuoteLine>,
    grand_total: Decimal,
    is_complete: bool,
    is_compliant: Option<bool>,
    compliance_notes: Option<String>,
    is_awarded: bool,
    registered_by: UserId,
    version: Version,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// 業者見積の DB 復元パラメータ
pub struct VendorQuoteRecord {
    pub id: VendorQuoteId,
    pub requisition_id: RequisitionId,
    pub vendor_id: VendorId,
    pub lines: Vec<QuoteLine>,
    pub grand_total: Decimal,
    pub is_complete: bool,
    pub is_compliant: Option<bool>,
    pub compliance_notes: Option<String>,
    pub is_awarded: bool,
    pub registered_by: UserId,
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VendorQuote {
    /// 見積を登録する
    ///
    /// 単価を提示しなかった明細は省略してよい（その場合 `is_complete` は false）。
    pub fn register(
        requisition: &Requisition,
        vendor: &Vendor,
        inputs: Vec<QuoteLineInput>,
        registered_by: UserId,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        ensure_quotable(requisition)?;
        vendor.ensure_can_quote()?;

        if let Some(duplicated) = inputs.iter().map(|i| &i.line_item_id).duplicates().next() {
            return Err(DomainError::Validation(format!(
                "同じ明細に複数の単価が指定されています: {duplicated}"
            )));
        }

        let lines = inputs
            .into_iter()
            .map(|input| {
                let item = requisition
                    .line_items()
                    .iter()
                    .find(|item| item.id() == &input.line_item_id)
                    .ok_or_else(|| {
                        DomainError::Validation(format!(
                            "申請に存在しない明細です: {}",
                            input.line_item_id
                        ))
                    })?;
                if input.unit_price < Decimal::ZERO {
                    return Err(DomainError::Validation(format!(
                        "単価は 0 以上である必要があります（明細 {}）",
                        item.sort_order()
                    )));
                }
                Ok(QuoteLine {
                    line_item_id: input.line_item_id,
                    quantity:     item.quantity(),
                    unit_price:   input.unit_price,
                    line_total:   item.quantity() * input.unit_price,
                })
            })
            .collect::<Result<Vec<_>, DomainError>>()?;

        let is_complete = !lines.is_empty()
            && requisition
                .line_items()
                .iter()
                .all(|item| lines.iter().any(|l| &l.line_item_id == item.id()));
        let grand_total = lines.iter().map(QuoteLine::line_total).sum();

        Ok(Self {
            id: VendorQuoteId::new(),
            requisition_id: requisition.id().clone(),
            vendor_id: vendor.id().clone(),
            lines,
            grand_total,
            is_complete,
            is_compliant: None,
            compliance_notes: None,
            is_awarded: false,
            registered_by,
            version: Version::initial(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn from_db(record: VendorQuoteRecord) -> Self {
        Self {
            id: record.id,
            requisition_id: record.requisition_id,
            vendor_id: record.vendor_id,
            lines: record.lines,
            grand_total: record.grand_total,
            is_complete: record.is_complete,
            is_compliant: record.is_compliant,
            compliance_notes: record.compliance_notes,
            is_awarded: record.is_awarded,
            registered_by: record.registered_by,
            version: record.version,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    // Getter メソッド

    pub fn id(&self) -> &VendorQuoteId {
        &self.id
    }

    pub fn requisition_id(&self) -> &RequisitionId {
        &self.requisition_id
    }

    pub fn vendor_id(&self) -> &VendorId {
        &self.vendor_id
    }

    pub fn lines(&self) -> &[QuoteLine] {
        &self.lines
    }

    pub fn grand_total(&self) -> Decimal {
        self.grand_total
    }

    pub fn is_complete(&self) -> bool {
        self.is_complete
    }

    pub fn is_compliant(&self) -> Option<bool> {
        self.is_compliant
    }

    pub fn compliance_notes(&self) -> Option<&str> {
        self.compliance_notes.as_deref()
    }

    pub fn is_awarded(&self) -> bool {
        self.is_awarded
    }

    pub fn registered_by(&self) -> &UserId {
        &self.registered_by
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// 有効見積（完全かつ適合）か
    pub fn is_responsive(&self) -> bool {
        self.is_complete && self.is_compliant == Some(true)
    }

    // ビジネスロジックメソッド

    /// 仕様適合の確認結果を記録する
    pub fn evaluated(
        self,
        requisition: &Requisition,
        is_compliant: bool,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        ensure_quotable(requisition)?;
        if &self.requisition_id != requisition.id() {
            return Err(DomainError::Validation(
                "見積が指定の購買申請に属していません".to_string(),
            ));
        }

        Ok(Self {
            is_compliant: Some(is_compliant),
            compliance_notes: notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            version: self.version.next(),
            updated_at: now,
            ..self
        })
    }

    /// 落札フラグを設定した新しいインスタンスを返す
    pub fn with_awarded(self, is_awarded: bool, now: DateTime<Utc>) -> Self {
        Self {
            is_awarded,
            version: self.version.next(),
            updated_at: now,
            ..self
        }
    }
}

/// 有効見積の件数
pub fn count_responsive(quotes: &[VendorQuote]) -> usize {
    quotes.iter().filter(|q| q.is_responsive()).count()
}

/// 最安の有効見積
///
/// 同額の場合は ID の小さい方（先に登録された方）を選ぶ。
pub fn lowest_responsive(quotes: &[VendorQuote]) -> Option<&VendorQuote> {
    quotes
        .iter()
        .filter(|q| q.is_responsive())
        .min_by(|a, b| {
            a.grand_total
                .cmp(&b.grand_total)
                .then_with(|| a.id.cmp(&b.id))
        })
}
