//! # 落札
//!
//! 承認済みの購買申請について、有効見積の中から落札業者を決め、
//! 落札通知（Notice to Award）を発行する。
//!
//! ## 判定ルール
//!
//! - 申請が `approved` であること
//! - 落札する見積がその申請に属し、有効見積であること
//! - 有効見積が 3 件以上あるか、見積例外の承認記録があること
//! - 最安の有効見積（同額は ID 順）以外を選ぶ場合は理由が必須で、
//!   根拠は `authorized_override`（承認者を記録）になる
//!
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use procureflow_domain::award::AwardBasis;
//!
//! assert_eq!("lowest_responsive_bid".parse::<AwardBasis>()?, AwardBasis::LowestResponsiveBid);
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

use crate::{
    DomainError,
    case::CaseStatus,
    quote::{VendorQuote, VendorQuoteId, count_responsive, lowest_responsive},
    requisition::{Requisition, RequisitionId},
    role::Actor,
    user::UserId,
    value_objects::{Justification, RefNumber},
    vendor::VendorId,
};

/// 評価・承認・落札に必要な有効見積の最低件数
pub const MIN_RESPONSIVE_QUOTES: usize = 3;

/// 見積件数の要件を満たすか確認する
pub fn ensure_rule_of_three(responsive: usize, has_exception: bool) -> Result<(), DomainError> {
    if responsive < MIN_RESPONSIVE_QUOTES && !has_exception {
        return Err(DomainError::Validation(format!(
            "有効見積が {MIN_RESPONSIVE_QUOTES} 件以上必要です（現在: {responsive} 件）。\
             例外承認を受けてください"
        )));
    }
    Ok(())
}

/// 落札の根拠
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, IntoStaticStr, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AwardBasis {
    /// 最安の有効見積
    LowestResponsiveBid,
    /// 理由付きの例外選定
    AuthorizedOverride,
}

impl std::str::FromStr for AwardBasis {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lowest_responsive_bid" => Ok(Self::LowestResponsiveBid),
            "authorized_override" => Ok(Self::AuthorizedOverride),
            _ => Err(DomainError::Validation(format!("不正な落札根拠: {s}"))),
        }
    }
}

/// 落札判定の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwardDecision {
    pub quote_id:               VendorQuoteId,
    pub vendor_id:              VendorId,
    pub basis:                  AwardBasis,
    pub override_justification: Option<Justification>,
    pub override_authorized_by: Option<UserId>,
}

/// 落札を判定する
///
/// `quotes` は申請に属する見積全件。
pub fn decide_award(
    requisition: &Requisition,
    quotes: &[VendorQuote],
    chosen: &VendorQuoteId,
    justification: Option<&str>,
    has_quote_exception: bool,
    actor: &Actor,
) -> Result<AwardDecision, DomainError> {
    if requisition.status() != CaseStatus::Approved {
        return Err(DomainError::Validation(format!(
            "落札は承認済みの申請でのみ可能です（現在: {}）",
            requisition.status()
        )));
    }

    let quote = quotes
        .iter()
        .find(|q| q.id() == chosen && q.requisition_id() == requisition.id())
        .ok_or_else(|| DomainError::NotFound {
            entity_type: "VendorQuote",
            id:          chosen.to_string(),
        })?;

    if !quote.is_responsive() {
        return Err(DomainError::Validation(
            "不完全または仕様不適合の見積は落札できません".to_string(),
        ));
    }

    ensure_rule_of_three(count_responsive(quotes), has_quote_exception)?;

    let is_lowest = lowest_responsive(quotes).is_some_and(|lowest| lowest.id() == quote.id());
    if is_lowest {
        return Ok(AwardDecision {
            quote_id:               quote.id().clone(),
            vendor_id:              quote.vendor_id().clone(),
            basis:                  AwardBasis::LowestResponsiveBid,
            override_justification: None,
            override_authorized_by: None,
        });
    }

    let justification = justification
        .filter(|j| !j.trim().is_empty())
        .ok_or_else(|| {
            DomainError::Validation(
                "最安の有効見積以外を落札する場合は理由が必須です".to_string(),
            )
        })
        .and_then(Justification::new)?;

    Ok(AwardDecision {
        quote_id:               quote.id().clone(),
        vendor_id:              quote.vendor_id().clone(),
        basis:                  AwardBasis::AuthorizedOverride,
        override_justification: Some(justification),
        override_authorized_by: Some(actor.id().clone()),
    })
}

// =========================================================================
// 落札通知
// =========================================================================

define_uuid_id! {
    /// 落札通知 ID
    pub struct NoticeToAwardId;
}

/// 落札通知の状態
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, IntoStaticStr, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NtaStatus {
    Draft,
    Issued,
    MarkSent,
}

impl std::str::FromStr for NtaStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "issued" => Ok(Self::Issued),
            "mark_sent" => Ok(Self::MarkSent),
            _ => Err(DomainError::Validation(format!("不正な落札通知状態: {s}"))),
        }
    }
}

/// 落札通知エンティティ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoticeToAward {
    id: NoticeToAwardId,
    ref_number: RefNumber,
    requisition_id: RequisitionId,
    vendor_id: VendorId,
    awarded_quote_id: VendorQuoteId,
    award_basis: AwardBasis,
    override_justification: Option<String>,
    override_authorized_by: Option<UserId>,
    issued_by: UserId,
    issued_at: DateTime<Utc>,
    status: NtaStatus,
    sent_at: Option<DateTime<Utc>>,
}

/// 落札通知の DB 復元パラメータ
pub struct NoticeToAwardRecord {
    pub id: NoticeToAwardId,
    pub ref_number: RefNumber,
    pub requisition_id: RequisitionId,
    pub vendor_id: VendorId,
    pub awarded_quote_id: VendorQuoteId,
    pub award_basis: AwardBasis,
    pub override_justification: Option<String>,
    pub override_authorized_by: Option<UserId>,
    pub issued_by: UserId,
    pub issued_at: DateTime<Utc>,
    pub status: NtaStatus,
    pub sent_at: Option<DateTime<Utc>>,
}

impl NoticeToAward {
    /// 落札判定から発行済みの通知を作成する
    pub fn issue(
        ref_number: RefNumber,
        requisition_id: RequisitionId,
        decision: &AwardDecision,
        issued_by: UserId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: NoticeToAwardId::new(),
            ref_number,
            requisition_id,
            vendor_id: decision.vendor_id.clone(),
            awarded_quote_id: decision.quote_id.clone(),
            award_basis: decision.basis,
            override_justification: decision
                .override_justification
                .as_ref()
                .map(|j| j.as_str().to_string()),
            override_authorized_by: decision.override_authorized_by.clone(),
            issued_by,
            issued_at: now,
            status: NtaStatus::Issued,
            sent_at: None,
        }
    }

    pub fn from_db(record: NoticeToAwardRecord) -> Self {
        Self {
            id: record.id,
            ref_number: record.ref_number,
            requisition_id: record.requisition_id,
            vendor_id: record.vendor_id,
            awarded_quote_id: record.awarded_quote_id,
            award_basis: record.award_basis,
            override_justification: record.override_justification,
            override_authorized_by: record.override_authorized_by,
            issued_by: record.issued_by,
            issued_at: record.issued_at,
            status: record.status,
            sent_at: record.sent_at,
        }
    }

    // Getter メソッド

    pub fn id(&self) -> &NoticeToAwardId {
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

    pub fn award_basis(&self) -> AwardBasis {
        self.award_basis
    }

    pub fn override_justification(&self) -> Option<&str> {
        self.override_justification.as_deref()
    }

    pub fn override_authorized_by(&self) -> Option<&UserId> {
        self.override_authorized_by.as_ref()
    }

    pub fn issued_by(&self) -> &UserId {
        &self.issued_by
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn status(&self) -> NtaStatus {
        self.status
    }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        self.sent_at
    }

    /// 業者へ送付済みにする
    pub fn marked_sent(self, now: DateTime<Utc>) -> Result<Self, DomainError> {
        if self.status != NtaStatus::Issued {
            return Err(DomainError::Validation(format!(
                "発行済みの落札通知のみ送付済みにできます（現在: {}）",
                self.status
            )));
        }
        Ok(Self {
            status: NtaStatus::MarkSent,
            sent_at: Some(now),
            ..self
        })
    }
}
