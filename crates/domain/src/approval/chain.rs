//! # 承認チェーン生成
//!
//! 申請された案件の金額から承認ステップ列を決定的に組み立てる。
//!
//! | 順 | ロール | ラベル | SLA |
//! |---|-------|-------|-----|
//! | 1 | `dept_head` | Department Head Approval | 24h |
//! | 2 | `president` | President/CEA Approval（金額が 1,000,000 超のみ） | 48h |
//! | 3 | `accounting_staff` | Accounting Staff - Documentation Check | 24h |
//! | 4 | `accounting_supervisor` | Accounting Supervisor - Budget Review | 24h |
//! | 5 | `accounting_manager` | Accounting Manager - Final Endorsement | 24h |
//!
//! 再申請時は未処理のステップだけを削除し、処理済みのステップは履歴として残す。
//! 新しいチェーンは次の世代（cycle）となり、`step_number` は既存の最大値から続ける。

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use super::step::{ApprovalStep, ApprovalStepId, NewApprovalStep};
use crate::{case::CaseRef, role::Role};

/// 社長承認が必要になる金額の閾値（この値を超える場合）
pub const HIGH_VALUE_THRESHOLD: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// チェーンの 1 段の定義
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainStepTemplate {
    pub role:      Role,
    pub label:     &'static str,
    pub sla_hours: i64,
}

const DEPT_HEAD: ChainStepTemplate = ChainStepTemplate {
    role:      Role::DeptHead,
    label:     "Department Head Approval",
    sla_hours: 24,
};

const PRESIDENT: ChainStepTemplate = ChainStepTemplate {
    role:      Role::President,
    label:     "President/CEA Approval",
    sla_hours: 48,
};

const ACCOUNTING: [ChainStepTemplate; 3] = [
    ChainStepTemplate {
        role:      Role::AccountingStaff,
        label:     "Accounting Staff - Documentation Check",
        sla_hours: 24,
    },
    ChainStepTemplate {
        role:      Role::AccountingSupervisor,
        label:     "Accounting Supervisor - Budget Review",
        sla_hours: 24,
    },
    ChainStepTemplate {
        role:      Role::AccountingManager,
        label:     "Accounting Manager - Final Endorsement",
        sla_hours: 24,
    },
];

/// 金額に応じたチェーン定義を返す
pub fn chain_templates(amount: Decimal) -> Vec<ChainStepTemplate> {
    let mut templates = vec![DEPT_HEAD];
    if amount > HIGH_VALUE_THRESHOLD {
        templates.push(PRESIDENT);
    }
    templates.extend(ACCOUNTING);
    templates
}

/// 生成されたチェーン
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedChain {
    /// 新しい世代番号
    pub cycle:            i32,
    /// 新規作成するステップ（position 順）
    pub steps:            Vec<ApprovalStep>,
    /// 削除する未処理ステップ
    pub removed_step_ids: Vec<ApprovalStepId>,
    /// 最初のステップの期限（案件の SLA 期限になる）
    pub first_deadline:   DateTime<Utc>,
}

/// 承認チェーンを生成する
///
/// `existing` は案件に属する既存ステップ全件。
pub fn generate_chain(
    case: &CaseRef,
    amount: Decimal,
    existing: &[ApprovalStep],
    now: DateTime<Utc>,
) -> GeneratedChain {
    let cycle = existing.iter().map(ApprovalStep::cycle).max().unwrap_or(0) + 1;

    let removed_step_ids = existing
        .iter()
        .filter(|step| step.is_pending())
        .map(|step| step.id().clone())
        .collect::<Vec<_>>();

    let base_number = existing
        .iter()
        .filter(|step| !step.is_pending())
        .map(ApprovalStep::step_number)
        .max()
        .unwrap_or(0);

    let steps = chain_templates(amount)
        .into_iter()
        .zip(1..)
        .map(|(template, position)| {
            ApprovalStep::new(NewApprovalStep {
                id: ApprovalStepId::new(),
                case: case.clone(),
                step_number: base_number + position,
                cycle,
                position,
                step_label: template.label.to_string(),
                role_required: template.role,
                sla_deadline: now + Duration::hours(template.sla_hours),
                now,
            })
        })
        .collect::<Vec<_>>();

    GeneratedChain {
        cycle,
        steps,
        removed_step_ids,
        first_deadline: now + Duration::hours(DEPT_HEAD.sla_hours),
    }
}
