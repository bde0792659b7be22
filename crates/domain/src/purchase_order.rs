//! # 発注書と検収
//!
//! 落札した見積から発注書（Purchase Order）を作成し、業者からの納品を
//! 検収記録（Goods Receipt Note）として明細単位で積み上げる。
//!
//! ## ルール
//!
//! - 発注書は落札済みの見積から作る。明細・単価・合計は見積をそのまま写す
//! - 発注書は 1 申請に 1 件。送付と同時に発行し、状態は `mark_sent` から始まる
//! - 検収は発注明細ごとの数量で記録し、累計が発注数量を超えてはならない
//! - 全明細の検収が済んだ発注書だけが `completed` になれる
//!
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use procureflow_domain::purchase_order::PoStatus;
//!
//! assert_eq!("mark_sent".parse::<PoStatus>()?, PoStatus::MarkSent);
//! assert_eq!(PoStatus::Completed.to_string(), "completed");
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use itertools::Itertools;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

use crate::{
    DomainError,
    case::CaseStatus,
    quote::{VendorQuote, VendorQuoteId},
    requisition::{Requisition, RequisitionId, RequisitionLineItemId},
    user::UserId,
    value_objects::RefNumber,
    vendor::VendorId,
};

define_uuid_id! {
    /// 発注書 ID
    pub struct PurchaseOrderId;
}

define_uuid_id! {
    /// 発注明細 ID
    pub struct PurchaseOrderLineId;
}

define_uuid_id! {
    /// 検収記録 ID
    pub struct GoodsReceiptId;
}

/// 発注書の状態
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, IntoStaticStr, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PoStatus {
    Issued,
    MarkSent,
    Completed,
}

impl std::str::FromStr for PoStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "issued" => Ok(Self::Issued),
            "mark_sent" => Ok(Self::MarkSent),
            "completed" => Ok(Self::Completed),
            _ => Err(DomainError::Validation(format!("不正な発注書状態: {s}"))),
        }
    }
}

/// 発注書の取引条件
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurchaseOrderTerms {
    pub delivery_terms: Option<String>,
    pub payment_terms:  Option<String>,
}

/// 発注明細
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseOrderLine {
    id:           PurchaseOrderLineId,
    line_item_id: RequisitionLineItemId,
    description:  String,
    unit:         String,
    quantity:     Decimal,
    unit_price:   Decimal,
    line_total:   Decimal,
}

/// 発注明細の DB 復元パラメータ
pub struct PurchaseOrderLineRecord {
    pub id:           PurchaseOrderLineId,
    pub line_item_id: RequisitionLineItemId,
    pub description:  String,
    pub unit:         String,
    pub quantity:     Decimal,
    pub unit_price:   Decimal,
    pub line_total:   Decimal,
}

impl PurchaseOrderLine {
    pub fn from_db(record: PurchaseOrderLineRecord) -> Self {
        Self {
            id:           record.id,
            line_item_id: record.line_item_id,
            description:  record.description,
            unit:         record.unit,
            quantity:     record.quantity,
            unit_price:   record.unit_price,
            line_total:   record.line_total,
        }
    }

    pub fn id(&self) -> &PurchaseOrderLineId {
        &self.id
    }

    pub fn line_item_id(&self) -> &RequisitionLineItemId {
        &self.line_item_id
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

    pub fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    pub fn line_total(&self) -> Decimal {
        self.line_total
    }
}

/// 発注書エンティティ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseOrder {
    id: PurchaseOrderId,
    ref_number: RefNumber,
    requisition_id: RequisitionId,
    vendor_id: VendorId,
    awarded_quote_id: VendorQuoteId,
    terms: PurchaseOrderTerms,
    grand_total: Decimal,
    lines: Vec<PurchaseOrderLine>,
    issued_by: UserId,
    issued_at: DateTime<Utc>,
    status: PoStatus,
    sent_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

/// 発注書の DB 復元パラメータ
pub struct PurchaseOrderRecord {
    pub id: PurchaseOrderId,
    pub ref_number: RefNumber,
    pub requisition_id: RequisitionId,
    pub vendor_id: VendorId,
    pub awarded_quote_id: VendorQuoteId,
    pub terms: PurchaseOrderTerms,
    pub grand_total: Decimal,
    pub lines: Vec<PurchaseOrderLine>,
    pub issued_by: UserId,
    pub issued_at: DateTime<Utc>,
    pub status: PoStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PurchaseOrder {
    /// 落札済みの見積から発注書を発行する
    pub fn issue(
        ref_number: RefNumber,
        requisition: &Requisition,
        quote: &VendorQuote,
        terms: PurchaseOrderTerms,
        issued_by: UserId,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if requisition.status() != CaseStatus::Awarded {
            return Err(DomainError::Validation(format!(
                "発注書は落札済みの申請でのみ発行できます（現在: {}）",
                requisition.status()
            )));
        }
        if quote.requisition_id() != requisition.id() || !quote.is_awarded() {
            return Err(DomainError::Validation(
                "発注書は申請の落札見積からのみ発行できます".to_string(),
            ));
        }

        let lines = quote
            .lines()
            .iter()
            .map(|quote_line| {
                let item = requisition
                    .line_items()
                    .iter()
                    .find(|item| item.id() == quote_line.line_item_id())
                    .ok_or_else(|| {
                        DomainError::Validation(format!(
                            "申請に存在しない明細です: {}",
                            quote_line.line_item_id()
                        ))
                    })?;
                Ok(PurchaseOrderLine {
                    id:           PurchaseOrderLineId::new(),
                    line_item_id: item.id().clone(),
                    description:  item.description().to_string(),
                    unit:         item.unit().to_string(),
                    quantity:     quote_line.quantity(),
                    unit_price:   quote_line.unit_price(),
                    line_total:   quote_line.line_total(),
                })
            })
            .collect::<Result<Vec<_>, DomainError>>()?;

        Ok(Self {
            id: PurchaseOrderId::new(),
            ref_number,
            requisition_id: requisition.id().clone(),
            vendor_id: quote.vendor_id().clone(),
            awarded_quote_id: quote.id().clone(),
            terms: PurchaseOrderTerms {
                delivery_terms: normalize(terms.delivery_terms),
                payment_terms:  normalize(terms.payment_terms),
            },
            grand_total: quote.grand_total(),
            lines,
            issued_by,
            issued_at: now,
            status: PoStatus::Issued,
            sent_at: None,
            completed_at: None,
        })
    }

    pub fn from_db(record: PurchaseOrderRecord) -> Self {
        Self {
            id: record.id,
            ref_number: record.ref_number,
            requisition_id: record.requisition_id,
            vendor_id: record.vendor_id,
            awarded_quote_id: record.awarded_quote_id,
            terms: record.terms,
            grand_total: record.grand_total,
            lines: record.lines,
            issued_by: record.issued_by,
            issued_at: record.issued_at,
            status: record.status,
            sent_at: record.sent_at,
            completed_at: record.completed_at,
        }
    }

    // Getter メソッド

    pub fn id(&self) -> &PurchaseOrderId {
        &self.id
    }

    pub fn ref_number(&self) -> RefNumber {
        self.ref_number
    }

    pub fn requisition_id(&self) -> &RequisitionId {
        &self.requisition_id
    }

    pub fn vendor_id(&self) -> &VendorId {
        &self.vendor_id
    }

    pub fn awarded_quote_id(&self) -> &VendorQuoteId {
        &self.awarded_quote_id
    }

    pub fn terms(&self) -> &PurchaseOrderTerms {
        &self.terms
    }

    pub fn grand_total(&self) -> Decimal {
        self.grand_total
    }

    pub fn lines(&self) -> &[PurchaseOrderLine] {
        &self.lines
    }

    pub fn issued_by(&self) -> &UserId {
        &self.issued_by
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn status(&self) -> PoStatus {
        self.status
    }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        self.sent_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// 業者へ送付済みにする
    pub fn marked_sent(self, now: DateTime<Utc>) -> Result<Self, DomainError> {
        if self.status != PoStatus::Issued {
            return Err(DomainError::Validation(format!(
                "発行済みの発注書のみ送付済みにできます（現在: {}）",
                self.status
            )));
        }
        Ok(Self {
            status: PoStatus::MarkSent,
            sent_at: Some(now),
            ..self
        })
    }

    /// 納品完了にする
    ///
    /// `receipts` はこの発注書の検収記録全件。
    pub fn completed(
        self,
        receipts: &[GoodsReceipt],
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if self.status != PoStatus::MarkSent {
            return Err(DomainError::Validation(format!(
                "送付済みの発注書のみ完了にできます（現在: {}）",
                self.status
            )));
        }
        if !self.is_fully_received(receipts) {
            return Err(DomainError::Validation(
                "検収が済んでいない発注明細があります".to_string(),
            ));
        }
        Ok(Self {
            status: PoStatus::Completed,
            completed_at: Some(now),
            ..self
        })
    }

    /// 発注明細ごとの検収済み数量
    pub fn received_quantities(
        &self,
        receipts: &[GoodsReceipt],
    ) -> HashMap<PurchaseOrderLineId, Decimal> {
        let mut received: HashMap<PurchaseOrderLineId, Decimal> = self
            .lines
            .iter()
            .map(|line| (line.id.clone(), Decimal::ZERO))
            .collect();
        for line in receipts
            .iter()
            .filter(|r| r.purchase_order_id == self.id)
            .flat_map(|r| r.lines.iter())
        {
            if let Some(total) = received.get_mut(&line.po_line_id) {
                *total += line.quantity_received;
            }
        }
        received
    }

    /// 全明細が発注数量まで検収されているか
    pub fn is_fully_received(&self, receipts: &[GoodsReceipt]) -> bool {
        let received = self.received_quantities(receipts);
        self.lines.iter().all(|line| {
            received
                .get(&line.id)
                .is_some_and(|quantity| *quantity >= line.quantity)
        })
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// =========================================================================
// 検収記録
// =========================================================================

/// 検収明細の入力
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoodsReceiptLineInput {
    pub po_line_id:        PurchaseOrderLineId,
    pub quantity_received: Decimal,
    pub remarks:           Option<String>,
}

/// 検収明細
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoodsReceiptLine {
    pub po_line_id:        PurchaseOrderLineId,
    pub quantity_received: Decimal,
    pub remarks:           Option<String>,
}

/// 検収の内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoodsReceiptContent {
    pub received_date: NaiveDate,
    pub remarks:       Option<String>,
    pub lines:         Vec<GoodsReceiptLineInput>,
}

/// 検収記録エンティティ
///
/// 作成後は変更しない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoodsReceipt {
    id: GoodsReceiptId,
    ref_number: RefNumber,
    purchase_order_id: PurchaseOrderId,
    received_date: NaiveDate,
    received_by: UserId,
    remarks: Option<String>,
    lines: Vec<GoodsReceiptLine>,
    created_at: DateTime<Utc>,
}

/// 検収記録の DB 復元パラメータ
pub struct GoodsReceiptRecord {
    pub id: GoodsReceiptId,
    pub ref_number: RefNumber,
    pub purchase_order_id: PurchaseOrderId,
    pub received_date: NaiveDate,
    pub received_by: UserId,
    pub remarks: Option<String>,
    pub lines: Vec<GoodsReceiptLine>,
    pub created_at: DateTime<Utc>,
}

impl GoodsReceipt {
    /// 発注書に対する納品を記録する
    ///
    /// `previous` はこの発注書の既存の検収記録。
    pub fn record(
        ref_number: RefNumber,
        order: &PurchaseOrder,
        previous: &[GoodsReceipt],
        content: GoodsReceiptContent,
        received_by: UserId,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if order.status != PoStatus::MarkSent {
            return Err(DomainError::Validation(format!(
                "送付済みの発注書にのみ検収を記録できます（現在: {}）",
                order.status
            )));
        }
        if content.lines.is_empty() {
            return Err(DomainError::Validation(
                "検収明細が 1 件以上必要です".to_string(),
            ));
        }
        if let Some(duplicated) = content.lines.iter().map(|l| &l.po_line_id).duplicates().next() {
            return Err(DomainError::Validation(format!(
                "同じ発注明細が複数回指定されています: {duplicated}"
            )));
        }
        if content
            .lines
            .iter()
            .all(|l| l.quantity_received <= Decimal::ZERO)
        {
            return Err(DomainError::Validation(
                "検収数量が 0 より大きい明細が 1 件以上必要です".to_string(),
            ));
        }

        let received = order.received_quantities(previous);
        let lines = content
            .lines
            .into_iter()
            .map(|input| {
                let po_line = order
                    .lines
                    .iter()
                    .find(|line| line.id == input.po_line_id)
                    .ok_or_else(|| {
                        DomainError::Validation(format!(
                            "発注書に存在しない明細です: {}",
                            input.po_line_id
                        ))
                    })?;
                if input.quantity_received < Decimal::ZERO {
                    return Err(DomainError::Validation(format!(
                        "検収数量は 0 以上である必要があります（{}）",
                        po_line.description
                    )));
                }
                let already = received.get(&po_line.id).copied().unwrap_or_default();
                if already + input.quantity_received > po_line.quantity {
                    return Err(DomainError::Validation(format!(
                        "検収数量の累計が発注数量を超えます（{}: 発注 {} / 検収済み {} / 今回 {}）",
                        po_line.description, po_line.quantity, already, input.quantity_received
                    )));
                }
                Ok(GoodsReceiptLine {
                    po_line_id:        input.po_line_id,
                    quantity_received: input.quantity_received,
                    remarks:           normalize(input.remarks),
                })
            })
            .collect::<Result<Vec<_>, DomainError>>()?;

        Ok(Self {
            id: GoodsReceiptId::new(),
            ref_number,
            purchase_order_id: order.id.clone(),
            received_date: content.received_date,
            received_by,
            remarks: normalize(content.remarks),
            lines,
            created_at: now,
        })
    }

    pub fn from_db(record: GoodsReceiptRecord) -> Self {
        Self {
            id: record.id,
            ref_number: record.ref_number,
            purchase_order_id: record.purchase_order_id,
            received_date: record.received_date,
            received_by: record.received_by,
            remarks: record.remarks,
            lines: record.lines,
            created_at: record.created_at,
        }
    }

    pub fn id(&self) -> &GoodsReceiptId {
        &self.id
    }

    pub fn ref_number(&self) -> RefNumber {
        self.ref_number
    }

    pub fn purchase_order_id(&self) -> &PurchaseOrderId {
        &self.purchase_order_id
    }

    pub fn received_date(&self) -> NaiveDate {
        self.received_date
    }

    pub fn received_by(&self) -> &UserId {
        &self.received_by
    }

    pub fn remarks(&self) -> Option<&str> {
        self.remarks.as_deref()
    }

    pub fn lines(&self) -> &[GoodsReceiptLine] {
        &self.lines
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    use super::*;
    use crate::{
        test_support::{quote_with_total, requisition_in, requisition_with_lines},
        value_objects::RefPrefix,
    };

    #[fixture]
    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn po_number(sequence: i64) -> RefNumber {
        RefNumber::new(RefPrefix::PurchaseOrder, 2026, sequence).unwrap()
    }

    fn grn_number(sequence: i64) -> RefNumber {
        RefNumber::new(RefPrefix::GoodsReceipt, 2026, sequence).unwrap()
    }

    /// 2 明細の落札済み申請と、その落札見積
    fn awarded(now: DateTime<Utc>) -> (Requisition, VendorQuote) {
        let requisition = requisition_with_lines(
            CaseStatus::Awarded,
            &[("ノート PC", 4, 150_000), ("マウス", 10, 2_000)],
            now,
        );
        let quote = quote_with_total(&requisition, 560_000, true, now).with_awarded(true, now);
        (requisition, quote)
    }

    fn sent_order(now: DateTime<Utc>) -> PurchaseOrder {
        let (requisition, quote) = awarded(now);
        PurchaseOrder::issue(
            po_number(1),
            &requisition,
            &quote,
            PurchaseOrderTerms::default(),
            UserId::new(),
            now,
        )
        .unwrap()
        .marked_sent(now)
        .unwrap()
    }

    fn receive(
        order: &PurchaseOrder,
        previous: &[GoodsReceipt],
        quantities: &[i64],
        now: DateTime<Utc>,
    ) -> Result<GoodsReceipt, DomainError> {
        let lines = order
            .lines()
            .iter()
            .zip(quantities)
            .map(|(line, quantity)| GoodsReceiptLineInput {
                po_line_id:        line.id().clone(),
                quantity_received: Decimal::from(*quantity),
                remarks:           None,
            })
            .collect();
        GoodsReceipt::record(
            grn_number(previous.len() as i64 + 1),
            order,
            previous,
            GoodsReceiptContent {
                received_date: now.date_naive(),
                remarks: None,
                lines,
            },
            UserId::new(),
            now,
        )
    }

    #[rstest]
    fn test_落札見積の明細と合計が発注書に写される(now: DateTime<Utc>) {
        let (requisition, quote) = awarded(now);

        let sut = PurchaseOrder::issue(
            po_number(1),
            &requisition,
            &quote,
            PurchaseOrderTerms {
                delivery_terms: Some("  本社受付へ納品  ".to_string()),
                payment_terms:  Some(" ".to_string()),
            },
            UserId::new(),
            now,
        )
        .unwrap();

        assert_eq!(sut.status(), PoStatus::Issued);
        assert_eq!(sut.vendor_id(), quote.vendor_id());
        assert_eq!(sut.awarded_quote_id(), quote.id());
        assert_eq!(sut.grand_total(), quote.grand_total());
        assert_eq!(sut.lines().len(), 2);
        assert_eq!(sut.lines()[0].description(), "ノート PC");
        assert_eq!(sut.lines()[1].quantity(), Decimal::from(10));
        assert_eq!(sut.terms().delivery_terms.as_deref(), Some("本社受付へ納品"));
        assert_eq!(sut.terms().payment_terms, None);
    }

    #[rstest]
    fn test_落札されていない見積からは発行できない(now: DateTime<Utc>) {
        let (requisition, quote) = awarded(now);
        let not_awarded = quote.with_awarded(false, now);

        let result = PurchaseOrder::issue(
            po_number(1),
            &requisition,
            &not_awarded,
            PurchaseOrderTerms::default(),
            UserId::new(),
            now,
        );

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[rstest]
    fn test_落札前の申請には発行できない(now: DateTime<Utc>) {
        let requisition = requisition_in(CaseStatus::Approved, 10_000, now);
        let quote = quote_with_total(&requisition, 9_000, true, now).with_awarded(true, now);

        let result = PurchaseOrder::issue(
            po_number(1),
            &requisition,
            &quote,
            PurchaseOrderTerms::default(),
            UserId::new(),
            now,
        );

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[rstest]
    fn test_分納を積み上げて全数検収すると完了できる(now: DateTime<Utc>) {
        let order = sent_order(now);
        let first = receive(&order, &[], &[2, 10], now).unwrap();
        assert!(!order.is_fully_received(std::slice::from_ref(&first)));
        assert!(order.clone().completed(std::slice::from_ref(&first), now).is_err());

        let second = receive(&order, std::slice::from_ref(&first), &[2, 0], now).unwrap();
        let receipts = vec![first, second];

        assert!(order.is_fully_received(&receipts));
        let completed = order.completed(&receipts, now).unwrap();
        assert_eq!(completed.status(), PoStatus::Completed);
        assert_eq!(completed.completed_at(), Some(now));
    }

    #[rstest]
    fn test_発注数量を超える検収は拒否する(now: DateTime<Utc>) {
        let order = sent_order(now);
        let first = receive(&order, &[], &[3, 10], now).unwrap();

        let result = receive(&order, &[first], &[2, 0], now);

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[rstest]
    #[case(&[0, 0])]
    #[case(&[-1, 5])]
    #[case(&[])]
    fn test_不正な検収数量は拒否する(#[case] quantities: &[i64], now: DateTime<Utc>) {
        let order = sent_order(now);

        let result = receive(&order, &[], quantities, now);

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[rstest]
    fn test_他の発注書の明細や重複明細は拒否する(now: DateTime<Utc>) {
        let order = sent_order(now);
        let other = sent_order(now);
        let content = |lines: Vec<GoodsReceiptLineInput>| GoodsReceiptContent {
            received_date: now.date_naive(),
            remarks: None,
            lines,
        };
        let input = |line: &PurchaseOrderLine| GoodsReceiptLineInput {
            po_line_id:        line.id().clone(),
            quantity_received: Decimal::ONE,
            remarks:           None,
        };

        let foreign = GoodsReceipt::record(
            grn_number(1),
            &order,
            &[],
            content(vec![input(&other.lines()[0])]),
            UserId::new(),
            now,
        );
        let duplicated = GoodsReceipt::record(
            grn_number(1),
            &order,
            &[],
            content(vec![input(&order.lines()[0]), input(&order.lines()[0])]),
            UserId::new(),
            now,
        );

        assert!(matches!(foreign, Err(DomainError::Validation(_))));
        assert!(matches!(duplicated, Err(DomainError::Validation(_))));
    }

    #[rstest]
    fn test_未送付や完了済みの発注書には検収を記録できない(now: DateTime<Utc>) {
        let (requisition, quote) = awarded(now);
        let issued = PurchaseOrder::issue(
            po_number(1),
            &requisition,
            &quote,
            PurchaseOrderTerms::default(),
            UserId::new(),
            now,
        )
        .unwrap();
        let sent = issued.clone().marked_sent(now).unwrap();
        let full = receive(&sent, &[], &[4, 10], now).unwrap();
        let completed = sent.completed(std::slice::from_ref(&full), now).unwrap();

        assert!(matches!(receive(&issued, &[], &[1, 0], now), Err(DomainError::Validation(_))));
        assert!(matches!(
            receive(&completed, &[full], &[1, 0], now),
            Err(DomainError::Validation(_))
        ));
    }
}
