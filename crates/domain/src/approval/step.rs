//! # 承認ステップ
//!
//! 案件ごとの承認チェーンを構成する 1 ステップ。
//! ロールに割り当てられ、担当者の判断（承認・却下・差し戻し・保留）を保持する。
//!
//! ## 番号体系
//!
//! - `step_number`: 案件内で一意。再申請をまたいで単調に増える
//! - `cycle`: チェーンの世代。初回申請が 1、再申請ごとに 1 増える
//! - `position`: 世代内での 1 始まりの順序

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

use crate::{
    DomainError,
    case::CaseRef,
    role::Role,
    user::UserId,
    value_objects::{ActionComment, Version},
};

define_uuid_id! {
    /// 承認ステップ ID
    pub struct ApprovalStepId;
}

/// ステップの状態
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, IntoStaticStr, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StepAction {
    /// 未処理
    Pending,
    /// 承認
    Approved,
    /// 却下
    Rejected,
    /// 差し戻し
    Returned,
    /// 保留
    OnHold,
    /// 取消（却下に伴う強制終了）
    Cancelled,
}

impl std::str::FromStr for StepAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "returned" => Ok(Self::Returned),
            "on_hold" => Ok(Self::OnHold),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(DomainError::Validation(format!(
                "不正なステップ状態: {s}"
            ))),
        }
    }
}

/// 担当者の判断
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, IntoStaticStr, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StepDecision {
    Approved,
    Rejected,
    Returned,
    OnHold,
}

impl std::str::FromStr for StepDecision {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "returned" => Ok(Self::Returned),
            "on_hold" => Ok(Self::OnHold),
            _ => Err(DomainError::Validation(format!("不正なステップ判断: {s}"))),
        }
    }
}

impl StepDecision {
    /// コメント必須の判断か
    pub fn requires_comment(&self) -> bool {
        !matches!(self, Self::Approved)
    }

    pub fn as_action(&self) -> StepAction {
        match self {
            Self::Approved => StepAction::Approved,
            Self::Rejected => StepAction::Rejected,
            Self::Returned => StepAction::Returned,
            Self::OnHold => StepAction::OnHold,
        }
    }
}

/// 承認ステップエンティティ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalStep {
    id: ApprovalStepId,
    case: CaseRef,
    step_number: i32,
    cycle: i32,
    position: i32,
    step_label: String,
    role_required: Role,
    action: StepAction,
    actor_id: Option<UserId>,
    comment: Option<String>,
    actioned_at: Option<DateTime<Utc>>,
    sla_deadline: DateTime<Utc>,
    is_sla_breached: bool,
    version: Version,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// 承認ステップの新規作成パラメータ
pub struct NewApprovalStep {
    pub id: ApprovalStepId,
    pub case: CaseRef,
    pub step_number: i32,
    pub cycle: i32,
    pub position: i32,
    pub step_label: String,
    pub role_required: Role,
    pub sla_deadline: DateTime<Utc>,
    pub now: DateTime<Utc>,
}

/// 承認ステップの DB 復元パラメータ
pub struct ApprovalStepRecord {
    pub id: ApprovalStepId,
    pub case: CaseRef,
    pub step_number: i32,
    pub cycle: i32,
    pub position: i32,
    pub step_label: String,
    pub role_required: Role,
    pub action: StepAction,
    pub actor_id: Option<UserId>,
    pub comment: Option<String>,
    pub actioned_at: Option<DateTime<Utc>>,
    pub sla_deadline: DateTime<Utc>,
    pub is_sla_breached: bool,
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApprovalStep {
    /// 未処理のステップを作成する
    pub fn new(params: NewApprovalStep) -> Self {
        Self {
            id: params.id,
            case: params.case,
            step_number: params.step_number,
            cycle: params.cycle,
            position: params.position,
            step_label: params.step_label,
            role_required: params.role_required,
            action: StepAction::Pending,
            actor_id: None,
            comment: None,
            actioned_at: None,
            sla_deadline: params.sla_deadline,
            is_sla_breached: false,
            version: Version::initial(),
            created_at: params.now,
            updated_at: params.now,
        }
    }

    pub fn from_db(record: ApprovalStepRecord) -> Self {
        Self {
            id: record.id,
            case: record.case,
            step_number: record.step_number,
            cycle: record.cycle,
            position: record.position,
            step_label: record.step_label,
            role_required: record.role_required,
            action: record.action,
            actor_id: record.actor_id,
            comment: record.comment,
            actioned_at: record.actioned_at,
            sla_deadline: record.sla_deadline,
            is_sla_breached: record.is_sla_breached,
            version: record.version,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    // Getter メソッド

    pub fn id(&self) -> &ApprovalStepId {
        &self.id
    }

    pub fn case(&self) -> &CaseRef {
        &self.case
    }

    pub fn step_number(&self) -> i32 {
        self.step_number
    }

    pub fn cycle(&self) -> i32 {
        self.cycle
    }

    pub fn position(&self) -> i32 {
        self.position
    }

    pub fn step_label(&self) -> &str {
        &self.step_label
    }

    pub fn role_required(&self) -> Role {
        self.role_required
    }

    pub fn action(&self) -> StepAction {
        self.action
    }

    pub fn actor_id(&self) -> Option<&UserId> {
        self.actor_id.as_ref()
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn actioned_at(&self) -> Option<DateTime<Utc>> {
        self.actioned_at
    }

    pub fn sla_deadline(&self) -> DateTime<Utc> {
        self.sla_deadline
    }

    pub fn is_sla_breached(&self) -> bool {
        self.is_sla_breached
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

    pub fn is_pending(&self) -> bool {
        self.action == StepAction::Pending
    }

    /// 判断が確定していない（未処理か保留中）か
    pub fn is_open(&self) -> bool {
        matches!(self.action, StepAction::Pending | StepAction::OnHold)
    }

    // ビジネスロジックメソッド

    /// 担当者の判断を記録した新しいインスタンスを返す
    ///
    /// # Errors
    ///
    /// - `DomainError::Validation`: 未処理以外のステップ
    pub fn actioned(
        self,
        decision: StepDecision,
        actor_id: UserId,
        comment: Option<ActionComment>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        self.ensure_pending("処理")?;

        Ok(Self {
            action: decision.as_action(),
            actor_id: Some(actor_id),
            comment: comment.map(ActionComment::into_string),
            actioned_at: Some(now),
            version: self.version.next(),
            updated_at: now,
            ..self
        })
    }

    /// 却下・取消に伴い取消した新しいインスタンスを返す
    ///
    /// 保留中のステップも取消せる。
    pub fn cancelled(self, now: DateTime<Utc>) -> Result<Self, DomainError> {
        if !self.is_open() {
            return Err(DomainError::Validation(format!(
                "取消は未処理か保留中のステップでのみ可能です（ステップ {}: {}）",
                self.step_number, self.action
            )));
        }

        Ok(Self {
            action: StepAction::Cancelled,
            version: self.version.next(),
            updated_at: now,
            ..self
        })
    }

    /// 保留を解除して未処理に戻した新しいインスタンスを返す
    ///
    /// 期限は保留していた時間だけ延長する。判断の記録は監査ログに残るため消去する。
    pub fn reopened(self, paused_for: Duration, now: DateTime<Utc>) -> Result<Self, DomainError> {
        if self.action != StepAction::OnHold {
            return Err(DomainError::Validation(format!(
                "保留中のステップのみ再開できます（現在: {}）",
                self.action
            )));
        }

        Ok(Self {
            action: StepAction::Pending,
            actor_id: None,
            comment: None,
            actioned_at: None,
            sla_deadline: self.sla_deadline + paused_for,
            version: self.version.next(),
            updated_at: now,
            ..self
        })
    }

    /// SLA 超過を記録した新しいインスタンスを返す
    pub fn sla_breached(self, now: DateTime<Utc>) -> Result<Self, DomainError> {
        self.ensure_pending("SLA 超過の記録")?;
        if self.is_sla_breached {
            return Err(DomainError::Validation(
                "SLA 超過は記録済みです".to_string(),
            ));
        }

        Ok(Self {
            is_sla_breached: true,
            version: self.version.next(),
            updated_at: now,
            ..self
        })
    }

    /// 未処理のまま期限を過ぎ、まだ超過を記録していないか
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && !self.is_sla_breached && self.sla_deadline < now
    }

    fn ensure_pending(&self, operation: &str) -> Result<(), DomainError> {
        if self.action != StepAction::Pending {
            return Err(DomainError::Validation(format!(
                "{operation}は未処理のステップでのみ可能です（ステップ {}: {}）",
                self.step_number, self.action
            )));
        }
        Ok(())
    }
}
