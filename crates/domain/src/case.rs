//! # 案件（Case）
//!
//! 承認チェーンを流れる業務案件の共通部分。
//! 購買申請（[`Requisition`]）と支払申請（[`PaymentRequest`]）の 2 種類があり、
//! どちらもステータス、バージョン、SLA 状態を [`CaseState`] として持つ。
//!
//! ## ドメイン用語
//!
//! | 型 | ドメイン用語 | 用途 |
//! |---|------------|------|
//! | [`CaseKind`] | 案件種別 | 購買申請 / 支払申請 |
//! | [`CaseRef`] | 案件参照 | 種別と ID の組。承認ステップの所属先 |
//! | [`CaseStatus`] | 案件ステータス | 両種別のステータスの和集合 |
//! | [`SlaState`] | SLA 状態 | 期限と一時停止時刻 |
//! | [`CaseState`] | 案件状態 | ステータス遷移の副作用（バージョン、SLA 停止・再開）を担う |
//! | [`Case`] | 案件 | 種別ごとのエンティティをまとめて扱うための列挙型 |
//!
//! ## 状態遷移の副作用
//!
//! すべての確定した遷移でバージョンが 1 増える。
//! `on_hold` に入ると SLA が停止し、`on_hold` から出ると停止していた時間だけ期限が延びる。

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;
use uuid::Uuid;

use crate::{
    DomainError,
    payment_request::{PaymentRequest, PaymentRequestId},
    requisition::{Requisition, RequisitionId},
    user::UserId,
    value_objects::{RefNumber, Version},
};

// =========================================================================
// CaseKind / CaseRef
// =========================================================================

/// 案件種別
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, IntoStaticStr, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CaseKind {
    /// 購買申請
    Requisition,
    /// 支払申請
    PaymentRequest,
}

impl std::str::FromStr for CaseKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requisition" => Ok(Self::Requisition),
            "payment_request" => Ok(Self::PaymentRequest),
            _ => Err(DomainError::Validation(format!("不正な案件種別: {s}"))),
        }
    }
}

impl CaseKind {
    /// この種別で使えるステータスか
    pub fn supports(&self, status: CaseStatus) -> bool {
        use CaseStatus::*;
        match self {
            Self::Requisition => !matches!(status, SapSynced | Paid),
            Self::PaymentRequest => !matches!(
                status,
                ForQuoting | QuoteEvaluation | Awarded | PoIssued | Completed
            ),
        }
    }
}

/// 案件参照
///
/// 承認ステップや監査ログが「どの案件に属するか」を型付きで表す。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CaseRef {
    Requisition(RequisitionId),
    PaymentRequest(PaymentRequestId),
}

impl CaseRef {
    /// 種別と UUID から復元する（DB 復元用）
    pub fn from_parts(kind: CaseKind, id: Uuid) -> Self {
        match kind {
            CaseKind::Requisition => Self::Requisition(RequisitionId::from_uuid(id)),
            CaseKind::PaymentRequest => Self::PaymentRequest(PaymentRequestId::from_uuid(id)),
        }
    }

    pub fn kind(&self) -> CaseKind {
        match self {
            Self::Requisition(_) => CaseKind::Requisition,
            Self::PaymentRequest(_) => CaseKind::PaymentRequest,
        }
    }

    pub fn as_uuid(&self) -> &Uuid {
        match self {
            Self::Requisition(id) => id.as_uuid(),
            Self::PaymentRequest(id) => id.as_uuid(),
        }
    }
}

impl std::fmt::Display for CaseRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind(), self.as_uuid())
    }
}

impl From<RequisitionId> for CaseRef {
    fn from(id: RequisitionId) -> Self {
        Self::Requisition(id)
    }
}

impl From<PaymentRequestId> for CaseRef {
    fn from(id: PaymentRequestId) -> Self {
        Self::PaymentRequest(id)
    }
}

// =========================================================================
// CaseStatus
// =========================================================================

/// 案件ステータス
///
/// 購買申請と支払申請のステータスの和集合。
/// 種別ごとに使えるものは [`CaseKind::supports`] で判定する。
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    IntoStaticStr,
    strum::Display,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CaseStatus {
    Draft,
    Submitted,
    UnderReview,
    ForQuoting,
    QuoteEvaluation,
    ForApproval,
    Approved,
    Rejected,
    OnHold,
    Returned,
    Awarded,
    PoIssued,
    Completed,
    SapSynced,
    Paid,
    Closed,
    Cancelled,
}

impl std::str::FromStr for CaseStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "submitted" => Ok(Self::Submitted),
            "under_review" => Ok(Self::UnderReview),
            "for_quoting" => Ok(Self::ForQuoting),
            "quote_evaluation" => Ok(Self::QuoteEvaluation),
            "for_approval" => Ok(Self::ForApproval),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "on_hold" => Ok(Self::OnHold),
            "returned" => Ok(Self::Returned),
            "awarded" => Ok(Self::Awarded),
            "po_issued" => Ok(Self::PoIssued),
            "completed" => Ok(Self::Completed),
            "sap_synced" => Ok(Self::SapSynced),
            "paid" => Ok(Self::Paid),
            "closed" => Ok(Self::Closed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(DomainError::Validation(format!("不正な案件ステータス: {s}"))),
        }
    }
}

impl CaseStatus {
    /// 以降の遷移を受け付けない終端ステータスか
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Closed)
    }

    /// 承認ステップを操作できるステータスか
    ///
    /// 下書き・差し戻し・保留中・終端、および承認チェーン完了後は操作できない。
    pub fn accepts_step_actions(&self) -> bool {
        matches!(
            self,
            Self::Submitted
                | Self::UnderReview
                | Self::ForQuoting
                | Self::QuoteEvaluation
                | Self::ForApproval
        )
    }
}

// =========================================================================
// SlaState
// =========================================================================

/// SLA 状態（値オブジェクト）
///
/// `paused_at` が `Some` の間は停止中。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlaState {
    deadline:  Option<DateTime<Utc>>,
    paused_at: Option<DateTime<Utc>>,
}

impl SlaState {
    pub fn new(deadline: Option<DateTime<Utc>>, paused_at: Option<DateTime<Utc>>) -> Self {
        Self {
            deadline,
            paused_at,
        }
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    pub fn paused_at(&self) -> Option<DateTime<Utc>> {
        self.paused_at
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    /// 期限を差し替える
    pub fn with_deadline(self, deadline: DateTime<Utc>) -> Self {
        Self {
            deadline: Some(deadline),
            ..self
        }
    }

    /// 停止する（停止中なら何もしない）
    pub fn paused(self, now: DateTime<Utc>) -> Self {
        if self.is_paused() {
            return self;
        }
        Self {
            paused_at: Some(now),
            ..self
        }
    }

    /// 再開し、停止していた時間を返す
    ///
    /// 期限は停止していた時間だけ後ろにずれる。停止していなければ 0。
    pub fn resumed(self, now: DateTime<Utc>) -> (Self, Duration) {
        let Some(paused_at) = self.paused_at else {
            return (self, Duration::zero());
        };
        let paused_for = (now - paused_at).max(Duration::zero());
        let resumed = Self {
            deadline:  self.deadline.map(|deadline| deadline + paused_for),
            paused_at: None,
        };
        (resumed, paused_for)
    }
}

// =========================================================================
// CaseState
// =========================================================================

/// 案件状態
///
/// 状態遷移メソッドはすべて新しいインスタンスを返し、バージョンを 1 増やす。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseState {
    status:             CaseStatus,
    status_before_hold: Option<CaseStatus>,
    hold_reason:        Option<String>,
    sla:                SlaState,
    version:            Version,
    updated_at:         DateTime<Utc>,
}

/// 案件状態の DB 復元パラメータ
pub struct CaseStateRecord {
    pub status:             CaseStatus,
    pub status_before_hold: Option<CaseStatus>,
    pub hold_reason:        Option<String>,
    pub sla_deadline:       Option<DateTime<Utc>>,
    pub sla_paused_at:      Option<DateTime<Utc>>,
    pub version:            Version,
    pub updated_at:         DateTime<Utc>,
}

const DEFAULT_HOLD_REASON: &str = "管理者による保留";

impl CaseState {
    /// 下書き状態を作成する
    pub fn draft(now: DateTime<Utc>) -> Self {
        Self {
            status:             CaseStatus::Draft,
            status_before_hold: None,
            hold_reason:        None,
            sla:                SlaState::default(),
            version:            Version::initial(),
            updated_at:         now,
        }
    }

    pub fn from_db(record: CaseStateRecord) -> Self {
        Self {
            status:             record.status,
            status_before_hold: record.status_before_hold,
            hold_reason:        record.hold_reason,
            sla:                SlaState::new(record.sla_deadline, record.sla_paused_at),
            version:            record.version,
            updated_at:         record.updated_at,
        }
    }

    pub fn status(&self) -> CaseStatus {
        self.status
    }

    pub fn status_before_hold(&self) -> Option<CaseStatus> {
        self.status_before_hold
    }

    pub fn hold_reason(&self) -> Option<&str> {
        self.hold_reason.as_deref()
    }

    pub fn sla(&self) -> SlaState {
        self.sla
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// 呼び出し元が最後に読んだバージョンと一致するか確認する
    pub fn ensure_version(&self, expected: Version) -> Result<(), DomainError> {
        if self.version != expected {
            return Err(DomainError::Conflict(format!(
                "案件は他のユーザーによって更新されています（期待: {expected}, 現在: {}）",
                self.version
            )));
        }
        Ok(())
    }

    /// ステータスを遷移させる
    ///
    /// - `on_hold` へ: 遷移前のステータスと保留理由を記録し、SLA を停止する
    /// - `on_hold` から: SLA を再開し、保留情報を消す
    pub fn transitioned(self, to: CaseStatus, comment: Option<&str>, now: DateTime<Utc>) -> Self {
        if to == CaseStatus::OnHold {
            return Self {
                status: CaseStatus::OnHold,
                status_before_hold: Some(self.status),
                hold_reason: Some(comment.unwrap_or(DEFAULT_HOLD_REASON).to_string()),
                sla: self.sla.paused(now),
                version: self.version.next(),
                updated_at: now,
            };
        }

        let (sla, status_before_hold, hold_reason) = if self.status == CaseStatus::OnHold {
            (self.sla.resumed(now).0, None, None)
        } else {
            (self.sla, self.status_before_hold, self.hold_reason)
        };

        Self {
            status: to,
            status_before_hold,
            hold_reason,
            sla,
            version: self.version.next(),
            updated_at: now,
        }
    }

    /// 保留を解除し、保留前のステータスに戻す
    ///
    /// 停止していた時間を返す（保留中ステップの期限延長に使う）。
    pub fn resumed(self, now: DateTime<Utc>) -> Result<(Self, Duration), DomainError> {
        if self.status != CaseStatus::OnHold {
            return Err(DomainError::Validation(format!(
                "保留中の案件のみ再開できます（現在: {}）",
                self.status
            )));
        }
        let Some(previous) = self.status_before_hold else {
            return Err(DomainError::Validation(
                "保留前のステータスが記録されていません".to_string(),
            ));
        };

        let (sla, paused_for) = self.sla.resumed(now);
        let resumed = Self {
            status: previous,
            status_before_hold: None,
            hold_reason: None,
            sla,
            version: self.version.next(),
            updated_at: now,
        };
        Ok((resumed, paused_for))
    }

    /// 承認チェーンの途中経過を反映する
    ///
    /// ステータスが変わらなくても SLA 期限の移動とバージョン更新は行う。
    pub fn advanced(self, to: CaseStatus, deadline: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            status: to,
            sla: self.sla.with_deadline(deadline),
            version: self.version.next(),
            updated_at: now,
            ..self
        }
    }

    /// 申請（承認チェーン開始）
    pub fn submitted(self, first_deadline: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            status: CaseStatus::Submitted,
            status_before_hold: None,
            hold_reason: None,
            sla: SlaState::new(Some(first_deadline), None),
            version: self.version.next(),
            updated_at: now,
        }
    }

    /// 内容のみの更新（ステータスは変えない）
    pub fn touched(self, now: DateTime<Utc>) -> Self {
        Self {
            version: self.version.next(),
            updated_at: now,
            ..self
        }
    }
}

// =========================================================================
// Case
// =========================================================================

/// 案件
///
/// 承認処理や遷移検証のように種別を問わない処理はこの型を受け取る。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Case {
    Requisition(Requisition),
    PaymentRequest(PaymentRequest),
}

impl Case {
    pub fn case_ref(&self) -> CaseRef {
        match self {
            Self::Requisition(r) => CaseRef::Requisition(r.id().clone()),
            Self::PaymentRequest(p) => CaseRef::PaymentRequest(p.id().clone()),
        }
    }

    pub fn kind(&self) -> CaseKind {
        match self {
            Self::Requisition(_) => CaseKind::Requisition,
            Self::PaymentRequest(_) => CaseKind::PaymentRequest,
        }
    }

    pub fn state(&self) -> &CaseState {
        match self {
            Self::Requisition(r) => r.state(),
            Self::PaymentRequest(p) => p.state(),
        }
    }

    pub fn status(&self) -> CaseStatus {
        self.state().status()
    }

    pub fn version(&self) -> Version {
        self.state().version()
    }

    pub fn ref_number(&self) -> RefNumber {
        match self {
            Self::Requisition(r) => r.ref_number(),
            Self::PaymentRequest(p) => p.ref_number(),
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Self::Requisition(r) => r.title().as_str(),
            Self::PaymentRequest(p) => p.title().as_str(),
        }
    }

    pub fn requested_by(&self) -> &UserId {
        match self {
            Self::Requisition(r) => r.requested_by(),
            Self::PaymentRequest(p) => p.requested_by(),
        }
    }

    /// 承認チェーンの分岐に使う金額
    pub fn amount(&self) -> Decimal {
        match self {
            Self::Requisition(r) => r.estimated_total(),
            Self::PaymentRequest(p) => p.amount(),
        }
    }

    pub fn has_line_items(&self) -> bool {
        match self {
            Self::Requisition(r) => !r.line_items().is_empty(),
            Self::PaymentRequest(p) => !p.line_items().is_empty(),
        }
    }

    pub fn ensure_version(&self, expected: Version) -> Result<(), DomainError> {
        self.state().ensure_version(expected)
    }

    /// 案件状態を差し替えた新しいインスタンスを返す
    pub fn map_state(self, f: impl FnOnce(CaseState) -> CaseState) -> Self {
        match self {
            Self::Requisition(r) => Self::Requisition(r.map_state(f)),
            Self::PaymentRequest(p) => Self::PaymentRequest(p.map_state(f)),
        }
    }

    /// 案件状態を差し替えた新しいインスタンスを返す（失敗しうる版）
    pub fn try_map_state<T>(
        self,
        f: impl FnOnce(CaseState) -> Result<(CaseState, T), DomainError>,
    ) -> Result<(Self, T), DomainError> {
        match self {
            Self::Requisition(r) => {
                let (r, extra) = r.try_map_state(f)?;
                Ok((Self::Requisition(r), extra))
            }
            Self::PaymentRequest(p) => {
                let (p, extra) = p.try_map_state(f)?;
                Ok((Self::PaymentRequest(p), extra))
            }
        }
    }

    pub fn into_requisition(self) -> Option<Requisition> {
        match self {
            Self::Requisition(r) => Some(r),
            Self::PaymentRequest(_) => None,
        }
    }

    pub fn into_payment_request(self) -> Option<PaymentRequest> {
        match self {
            Self::Requisition(_) => None,
            Self::PaymentRequest(p) => Some(p),
        }
    }
}

impl From<Requisition> for Case {
    fn from(value: Requisition) -> Self {
        Self::Requisition(value)
    }
}

impl From<PaymentRequest> for Case {
    fn from(value: PaymentRequest) -> Self {
        Self::PaymentRequest(value)
    }
}
