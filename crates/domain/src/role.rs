//! # ロール（役割）
//!
//! 承認チェーンの各ステップは 1 つのロールに割り当てられる。
//! 操作者のロールはリクエストからではなく、保存済みのユーザー情報から解決する。
//!
//! ## ドメイン用語
//!
//! | 型 | ドメイン用語 | 用途 |
//! |---|------------|------|
//! | [`Role`] | ロール | 組織内の職務（部門長、経理担当など） |
//! | [`Actor`] | 操作者 | 操作を行うユーザーとそのロールの組 |
//!
//! ## 使用例
//!
//! ```rust
//! use procureflow_domain::{
//!     role::{Actor, Role},
//!     user::UserId,
//! };
//!
//! let head = Actor::new(UserId::new(), Role::DeptHead);
//! assert!(head.can_act_as(Role::DeptHead));
//! assert!(!head.can_act_as(Role::President));
//!
//! let admin = Actor::new(UserId::new(), Role::Admin);
//! assert!(admin.can_act_as(Role::President));
//! ```

use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

use crate::{DomainError, user::UserId};

/// ロール
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
pub enum Role {
    /// 申請者
    Requester,
    /// 部門長
    DeptHead,
    /// 調達担当
    ProcOfficer,
    /// 財務審査担当
    FinanceReviewer,
    /// 社長
    President,
    /// 経理担当
    AccountingStaff,
    /// 経理主任
    AccountingSupervisor,
    /// 経理部長
    AccountingManager,
    /// システム管理者
    Admin,
}

impl std::str::FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requester" => Ok(Self::Requester),
            "dept_head" => Ok(Self::DeptHead),
            "proc_officer" => Ok(Self::ProcOfficer),
            "finance_reviewer" => Ok(Self::FinanceReviewer),
            "president" => Ok(Self::President),
            "accounting_staff" => Ok(Self::AccountingStaff),
            "accounting_supervisor" => Ok(Self::AccountingSupervisor),
            "accounting_manager" => Ok(Self::AccountingManager),
            "admin" => Ok(Self::Admin),
            _ => Err(DomainError::Validation(format!("不正なロール: {s}"))),
        }
    }
}

impl Role {
    /// 画面・通知で使う表示名
    pub fn label(&self) -> &'static str {
        match self {
            Self::Requester => "Requester",
            Self::DeptHead => "Department Head",
            Self::ProcOfficer => "Procurement Officer",
            Self::FinanceReviewer => "Finance Reviewer",
            Self::President => "President/CEA",
            Self::AccountingStaff => "Accounting Staff",
            Self::AccountingSupervisor => "Accounting Supervisor",
            Self::AccountingManager => "Accounting Manager",
            Self::Admin => "Administrator",
        }
    }

    /// 部門を問わずすべての案件を閲覧できるか
    ///
    /// 申請者と部門長は自分の案件と自部門の案件に限られる。
    pub fn sees_all_departments(&self) -> bool {
        !matches!(self, Self::Requester | Self::DeptHead)
    }
}

/// 操作者
///
/// ユースケースの入口で、保存済みユーザーから組み立てる。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    id:   UserId,
    role: Role,
}

impl Actor {
    pub fn new(id: UserId, role: Role) -> Self {
        Self { id, role }
    }

    pub fn id(&self) -> &UserId {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// 指定ロールとして操作できるか
    ///
    /// 管理者はすべてのロールを代行できる。
    pub fn can_act_as(&self, required: Role) -> bool {
        self.is_admin() || self.role == required
    }

    /// 指定ロールとして操作できなければ `Forbidden` を返す
    pub fn require_role(&self, required: Role) -> Result<(), DomainError> {
        if self.can_act_as(required) {
            return Ok(());
        }
        Err(DomainError::Forbidden(format!(
            "この操作には {} ロールが必要です（現在: {}）",
            required, self.role
        )))
    }

    /// いずれかのロールとして操作できなければ `Forbidden` を返す
    pub fn require_any_role(&self, allowed: &[Role]) -> Result<(), DomainError> {
        if allowed.iter().any(|role| self.can_act_as(*role)) {
            return Ok(());
        }
        let names = allowed
            .iter()
            .map(|role| role.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Err(DomainError::Forbidden(format!(
            "この操作には {names} のいずれかのロールが必要です（現在: {}）",
            self.role
        )))
    }
}
