//! # ステップ処理
//!
//! 承認ステップへの判断（承認・却下・差し戻し・保留）を検証し、
//! ステップと案件に起きる変化を [`StepActionPlan`] として組み立てる。
//!
//! 永続化は行わない。ユースケース層が計画を 1 トランザクションで保存する。
//!
//! ## 事前条件（判定順）
//!
//! 1. 呼び出し元が読んだステップのバージョンが最新（`Conflict`）
//! 2. ステップが未処理（`Validation`）
//! 3. 操作者がステップのロールを持つか管理者（`Forbidden`）
//! 4. 却下・差し戻し・保留ではコメント必須（`Validation`）
//! 5. 同じ世代の前段ステップがすべて承認済み（`Validation`）
//! 6. 案件がステップを処理できるステータス（`Validation`）
//!
//! ## 案件への影響
//!
//! | 判断 | 案件 | 他の未処理ステップ |
//! |------|------|------------------|
//! | 承認（途中段） | 段階に応じて進む。SLA 期限は次段の期限へ | そのまま |
//! | 承認（最終段） | `approved` | なし |
//! | 却下 | `rejected` | 取消 |
//! | 差し戻し | `returned` | 削除 |
//! | 保留 | `on_hold`（SLA 停止） | そのまま |

use chrono::{DateTime, Duration, Utc};

use super::step::{ApprovalStep, ApprovalStepId, StepAction, StepDecision};
use crate::{
    DomainError,
    case::{Case, CaseKind, CaseStatus},
    role::{Actor, Role},
    value_objects::{ActionComment, Version},
};

/// ステップ処理の入力
#[derive(Debug, Clone, Copy)]
pub struct StepActionInput<'a> {
    pub step_id:          &'a ApprovalStepId,
    pub decision:         StepDecision,
    pub comment:          Option<&'a str>,
    pub expected_version: Version,
}

/// ステップ処理の結果として保存すべき変更
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepActionPlan {
    /// 判断を記録したステップ
    pub acted_step:       ApprovalStep,
    /// 条件付き UPDATE で照合するステップのバージョン
    pub expected_version: Version,
    /// 更新後の案件
    pub case:             Case,
    /// 更新前の案件バージョン
    pub case_version:     Version,
    /// 更新前の案件ステータス
    pub previous_status:  CaseStatus,
    /// 却下により取消したステップ
    pub cancelled_steps:  Vec<ApprovalStep>,
    /// 差し戻しにより削除するステップ
    pub deleted_step_ids: Vec<ApprovalStepId>,
    /// 記録したコメント
    pub comment:          Option<ActionComment>,
}

impl StepActionPlan {
    pub fn status_changed(&self) -> bool {
        self.previous_status != self.case.status()
    }
}

/// 途中段の承認後の案件ステータス
///
/// - 購買申請: 1 段目 → `under_review`、2 段目 → `for_quoting`、以降は現状維持
/// - 支払申請: 1 段目 → `under_review`、以降 → `for_approval`
pub fn stage_after_approval(kind: CaseKind, position: i32, current: CaseStatus) -> CaseStatus {
    match (kind, position) {
        (_, 1) => CaseStatus::UnderReview,
        (CaseKind::Requisition, 2) => CaseStatus::ForQuoting,
        (CaseKind::Requisition, _) => current,
        (CaseKind::PaymentRequest, _) => CaseStatus::ForApproval,
    }
}

/// ステップへの判断を検証し、保存すべき変更を組み立てる
///
/// `steps` は案件に属するステップ全件。
pub fn plan_step_action(
    case: Case,
    steps: &[ApprovalStep],
    actor: &Actor,
    input: StepActionInput<'_>,
    now: DateTime<Utc>,
) -> Result<StepActionPlan, DomainError> {
    let case_ref = case.case_ref();
    let step = steps
        .iter()
        .find(|s| s.id() == input.step_id && s.case() == &case_ref)
        .ok_or_else(|| DomainError::NotFound {
            entity_type: "ApprovalStep",
            id:          input.step_id.to_string(),
        })?;

    if step.version() != input.expected_version {
        return Err(DomainError::Conflict(format!(
            "ステップ {} は他のユーザーによって更新されています",
            step.step_number()
        )));
    }

    if !step.is_pending() {
        return Err(DomainError::Validation(format!(
            "ステップ {} は処理済みです（{}）",
            step.step_number(),
            step.action()
        )));
    }

    actor.require_role(step.role_required())?;

    let comment = input
        .comment
        .filter(|c| !c.trim().is_empty())
        .map(ActionComment::new)
        .transpose()?;
    if input.decision.requires_comment() && comment.is_none() {
        return Err(DomainError::Validation(format!(
            "{}にはコメントが必須です",
            decision_label(input.decision)
        )));
    }

    if let Some(blocking) = steps.iter().find(|s| {
        s.cycle() == step.cycle()
            && s.position() < step.position()
            && s.action() != StepAction::Approved
    }) {
        return Err(DomainError::Validation(format!(
            "前段のステップ {}（{}）が承認されていません",
            blocking.step_number(),
            blocking.step_label()
        )));
    }

    let previous_status = case.status();
    if !previous_status.accepts_step_actions() {
        return Err(DomainError::Validation(format!(
            "現在の案件ステータス（{previous_status}）ではステップを処理できません"
        )));
    }

    let case_version = case.version();
    let acted_step = step.clone().actioned(
        input.decision,
        actor.id().clone(),
        comment.clone(),
        now,
    )?;

    let others_pending = || {
        steps
            .iter()
            .filter(move |s| s.is_pending() && s.id() != step.id())
    };

    let mut cancelled_steps = Vec::new();
    let mut deleted_step_ids = Vec::new();
    let comment_text = comment.as_ref().map(ActionComment::as_str);

    let case = match input.decision {
        StepDecision::Approved => {
            let next = steps
                .iter()
                .find(|s| s.cycle() == step.cycle() && s.position() == step.position() + 1);
            match next {
                Some(next) => {
                    let to = stage_after_approval(case.kind(), step.position(), previous_status);
                    let deadline = next.sla_deadline();
                    case.map_state(|state| state.advanced(to, deadline, now))
                }
                None => case.map_state(|state| state.transitioned(CaseStatus::Approved, None, now)),
            }
        }
        StepDecision::Rejected => {
            cancelled_steps = others_pending()
                .map(|s| s.clone().cancelled(now))
                .collect::<Result<Vec<_>, _>>()?;
            case.map_state(|state| state.transitioned(CaseStatus::Rejected, comment_text, now))
        }
        StepDecision::Returned => {
            deleted_step_ids = others_pending().map(|s| s.id().clone()).collect();
            case.map_state(|state| state.transitioned(CaseStatus::Returned, comment_text, now))
        }
        StepDecision::OnHold => {
            case.map_state(|state| state.transitioned(CaseStatus::OnHold, comment_text, now))
        }
    };

    Ok(StepActionPlan {
        acted_step,
        expected_version: input.expected_version,
        case,
        case_version,
        previous_status,
        cancelled_steps,
        deleted_step_ids,
        comment,
    })
}

fn decision_label(decision: StepDecision) -> &'static str {
    match decision {
        StepDecision::Approved => "承認",
        StepDecision::Rejected => "却下",
        StepDecision::Returned => "差し戻し",
        StepDecision::OnHold => "保留",
    }
}

/// 保留解除の結果として保存すべき変更
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumePlan {
    pub case:            Case,
    pub case_version:    Version,
    /// 再開したステップと、条件付き UPDATE で照合するバージョン
    pub reopened_step:   Option<(ApprovalStep, Version)>,
    pub paused_for:      Duration,
}

/// 保留中の案件を再開する計画を組み立てる
///
/// 保留中のステップがあればそのロール（または管理者）、
/// 遷移で保留にされた案件は管理者のみが再開できる。
pub fn plan_resume(
    case: Case,
    steps: &[ApprovalStep],
    actor: &Actor,
    expected_version: Version,
    now: DateTime<Utc>,
) -> Result<ResumePlan, DomainError> {
    case.ensure_version(expected_version)?;
    if case.status() != CaseStatus::OnHold {
        return Err(DomainError::Validation(format!(
            "保留中の案件のみ再開できます（現在: {}）",
            case.status()
        )));
    }

    let held = steps
        .iter()
        .filter(|s| s.action() == StepAction::OnHold)
        .max_by_key(|s| s.step_number());
    match held {
        Some(step) => actor.require_role(step.role_required())?,
        None => actor.require_role(Role::Admin)?,
    }

    let case_version = case.version();
    let (case, paused_for) = case.try_map_state(|state| state.resumed(now))?;
    let reopened_step = held
        .map(|step| {
            step.clone()
                .reopened(paused_for, now)
                .map(|reopened| (reopened, step.version()))
        })
        .transpose()?;

    Ok(ResumePlan {
        case,
        case_version,
        reopened_step,
        paused_for,
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    use super::*;
    use crate::{
        test_support::{
            actor, apply_plan as apply, approve_all, submitted_payment_request,
            submitted_requisition,
        },
        user::UserId,
    };

    #[fixture]
    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn act<'a>(
        case: Case,
        steps: &[ApprovalStep],
        index: usize,
        role: Role,
        decision: StepDecision,
        comment: Option<&'a str>,
        now: DateTime<Utc>,
    ) -> Result<StepActionPlan, DomainError> {
        let step = &steps[index];
        plan_step_action(
            case,
            steps,
            &actor(role),
            StepActionInput {
                step_id: step.id(),
                decision,
                comment,
                expected_version: step.version(),
            },
            now,
        )
    }

    mod 事前条件 {
        use super::*;

        #[rstest]
        fn test_古いバージョンはconflict(now: DateTime<Utc>) {
            let (case, steps) = submitted_requisition(10_000, now);

            let result = plan_step_action(
                case,
                &steps,
                &actor(Role::DeptHead),
                StepActionInput {
                    step_id:          steps[0].id(),
                    decision:         StepDecision::Approved,
                    comment:          None,
                    expected_version: steps[0].version().next(),
                },
                now,
            );

            assert!(matches!(result, Err(DomainError::Conflict(_))));
        }

        #[rstest]
        fn test_処理済みステップはバリデーションエラー(now: DateTime<Utc>) {
            let (case, steps) = submitted_requisition(10_000, now);
            let plan = act(case, &steps, 0, Role::DeptHead, StepDecision::Approved, None, now)
                .unwrap();
            let steps = apply(&steps, &plan);

            let result = act(plan.case, &steps, 0, Role::DeptHead, StepDecision::Approved, None, now);

            assert!(matches!(result, Err(DomainError::Validation(_))));
        }

        #[rstest]
        #[case(Role::Requester)]
        #[case(Role::AccountingStaff)]
        #[case(Role::President)]
        fn test_ロール不一致はforbidden(#[case] role: Role, now: DateTime<Utc>) {
            let (case, steps) = submitted_requisition(10_000, now);

            let result = act(case, &steps, 0, role, StepDecision::Approved, None, now);

            assert!(matches!(result, Err(DomainError::Forbidden(_))));
        }

        #[rstest]
        fn test_管理者はどのステップも処理できる(now: DateTime<Utc>) {
            let (case, steps) = submitted_requisition(10_000, now);

            let result = act(case, &steps, 0, Role::Admin, StepDecision::Approved, None, now);

            assert!(result.is_ok());
        }

        #[rstest]
        #[case(StepDecision::Rejected, None)]
        #[case(StepDecision::Returned, Some("   "))]
        #[case(StepDecision::OnHold, Some(""))]
        fn test_コメント必須の判断でコメントなしはバリデーションエラー(
            #[case] decision: StepDecision,
            #[case] comment: Option<&str>,
            now: DateTime<Utc>,
        ) {
            let (case, steps) = submitted_requisition(10_000, now);

            let result = act(case, &steps, 0, Role::DeptHead, decision, comment, now);

            assert!(matches!(result, Err(DomainError::Validation(_))));
        }

        #[rstest]
        fn test_前段未承認のステップは処理できない(now: DateTime<Utc>) {
            let (case, steps) = submitted_requisition(10_000, now);

            let result = act(case, &steps, 1, Role::AccountingStaff, StepDecision::Approved, None, now);

            assert!(matches!(result, Err(DomainError::Validation(_))));
        }

        #[rstest]
        fn test_保留中の案件ではステップを処理できない(now: DateTime<Utc>) {
            let (case, steps) = submitted_requisition(10_000, now);
            let case = case.map_state(|s| s.transitioned(CaseStatus::OnHold, Some("確認中"), now));

            let result = act(case, &steps, 0, Role::DeptHead, StepDecision::Approved, None, now);

            assert!(matches!(result, Err(DomainError::Validation(_))));
        }

        #[rstest]
        fn test_存在しないステップはnot_found(now: DateTime<Utc>) {
            let (case, steps) = submitted_requisition(10_000, now);
            let unknown = ApprovalStepId::new();

            let result = plan_step_action(
                case,
                &steps,
                &actor(Role::DeptHead),
                StepActionInput {
                    step_id:          &unknown,
                    decision:         StepDecision::Approved,
                    comment:          None,
                    expected_version: Version::initial(),
                },
                now,
            );

            assert!(matches!(result, Err(DomainError::NotFound { .. })));
        }
    }

    mod 承認 {
        use pretty_assertions::assert_eq;

        use super::*;

        #[rstest]
        fn test_購買申請は段階に応じてステータスが進む(now: DateTime<Utc>) {
            let (case, steps) = submitted_requisition(10_000, now);
            let later = now + Duration::hours(1);

            let first = act(case, &steps, 0, Role::DeptHead, StepDecision::Approved, None, later)
                .unwrap();
            assert_eq!(first.case.status(), CaseStatus::UnderReview);
            assert_eq!(first.case.state().sla().deadline(), Some(steps[1].sla_deadline()));
            assert_eq!(first.case.version(), first.case_version.next());
            let steps = apply(&steps, &first);

            let second = act(first.case, &steps, 1, Role::AccountingStaff, StepDecision::Approved, None, later)
                .unwrap();
            assert_eq!(second.case.status(), CaseStatus::ForQuoting);
            let steps = apply(&steps, &second);

            let third = act(second.case, &steps, 2, Role::AccountingSupervisor, StepDecision::Approved, None, later)
                .unwrap();
            assert_eq!(third.case.status(), CaseStatus::ForQuoting);
            assert!(!third.status_changed());
            assert_eq!(third.case.version(), third.case_version.next());
        }

        #[rstest]
        fn test_最終段の承認で案件が承認済みになる(now: DateTime<Utc>) {
            let (case, steps) = submitted_requisition(10_000, now);
            let (case, steps) = approve_all(case, steps, 3, now);

            let plan = act(case, &steps, 3, Role::AccountingManager, StepDecision::Approved, None, now)
                .unwrap();

            assert_eq!(plan.case.status(), CaseStatus::Approved);
            assert!(plan.status_changed());
        }

        #[rstest]
        #[case(0, CaseStatus::UnderReview)]
        #[case(1, CaseStatus::ForApproval)]
        #[case(2, CaseStatus::ForApproval)]
        fn test_支払申請は2段目以降でfor_approvalになる(
            #[case] index: usize,
            #[case] expected: CaseStatus,
            now: DateTime<Utc>,
        ) {
            let (case, steps) = submitted_payment_request(10_000, now);
            let (case, steps) = approve_all(case, steps, index, now);
            let role = steps[index].role_required();

            let plan = act(case, &steps, index, role, StepDecision::Approved, None, now).unwrap();

            assert_eq!(plan.case.status(), expected);
        }
    }

    mod 却下_差し戻し_保留 {
        use pretty_assertions::assert_eq;

        use super::*;

        #[rstest]
        fn test_却下で他の未処理ステップを取消す(now: DateTime<Utc>) {
            let (case, steps) = submitted_requisition(10_000, now);

            let plan = act(case, &steps, 0, Role::DeptHead, StepDecision::Rejected, Some("予算超過"), now)
                .unwrap();

            assert_eq!(plan.case.status(), CaseStatus::Rejected);
            assert_eq!(plan.cancelled_steps.len(), 3);
            assert!(plan.cancelled_steps.iter().all(|s| s.action() == StepAction::Cancelled));
            assert!(plan.deleted_step_ids.is_empty());
            assert_eq!(plan.acted_step.comment(), Some("予算超過"));
        }

        #[rstest]
        fn test_差し戻しで他の未処理ステップを削除する(now: DateTime<Utc>) {
            let (case, steps) = submitted_requisition(10_000, now);
            let (case, steps) = approve_all(case, steps, 1, now);

            let plan = act(case, &steps, 1, Role::AccountingStaff, StepDecision::Returned, Some("見積書を添付"), now)
                .unwrap();

            assert_eq!(plan.case.status(), CaseStatus::Returned);
            assert_eq!(
                plan.deleted_step_ids,
                vec![steps[2].id().clone(), steps[3].id().clone()]
            );
            assert!(plan.cancelled_steps.is_empty());
        }

        #[rstest]
        fn test_保留でslaを停止し理由を記録する(now: DateTime<Utc>) {
            let (case, steps) = submitted_requisition(10_000, now);

            let plan = act(case, &steps, 0, Role::DeptHead, StepDecision::OnHold, Some("仕様確認中"), now)
                .unwrap();

            let state = plan.case.state();
            assert_eq!(state.status(), CaseStatus::OnHold);
            assert_eq!(state.hold_reason(), Some("仕様確認中"));
            assert_eq!(state.sla().paused_at(), Some(now));
            assert_eq!(state.status_before_hold(), Some(CaseStatus::Submitted));
            assert_eq!(plan.acted_step.action(), StepAction::OnHold);
        }
    }

    mod 保留解除 {
        use pretty_assertions::assert_eq;

        use super::*;

        #[rstest]
        fn test_保留解除で案件とステップが再開する(now: DateTime<Utc>) {
            let (case, steps) = submitted_requisition(10_000, now);
            let held = act(case, &steps, 0, Role::DeptHead, StepDecision::OnHold, Some("仕様確認中"), now)
                .unwrap();
            let steps = apply(&steps, &held);
            let later = now + Duration::hours(6);

            let plan = plan_resume(
                held.case.clone(),
                &steps,
                &actor(Role::DeptHead),
                held.case.version(),
                later,
            )
            .unwrap();

            assert_eq!(plan.case.status(), CaseStatus::Submitted);
            assert_eq!(plan.paused_for, Duration::hours(6));
            assert_eq!(plan.case.state().sla().paused_at(), None);
            let (reopened, expected) = plan.reopened_step.unwrap();
            assert_eq!(reopened.action(), StepAction::Pending);
            assert_eq!(reopened.sla_deadline(), steps[0].sla_deadline() + Duration::hours(6));
            assert_eq!(expected, steps[0].version());
        }

        #[rstest]
        fn test_保留ステップのロール以外は再開できない(now: DateTime<Utc>) {
            let (case, steps) = submitted_requisition(10_000, now);
            let held = act(case, &steps, 0, Role::DeptHead, StepDecision::OnHold, Some("仕様確認中"), now)
                .unwrap();
            let steps = apply(&steps, &held);

            let result = plan_resume(
                held.case.clone(),
                &steps,
                &actor(Role::Requester),
                held.case.version(),
                now,
            );

            assert!(matches!(result, Err(DomainError::Forbidden(_))));
        }

        #[rstest]
        fn test_保留中でない案件の再開はバリデーションエラー(now: DateTime<Utc>) {
            let (case, steps) = submitted_requisition(10_000, now);
            let version = case.version();

            let result = plan_resume(case, &steps, &actor(Role::Admin), version, now);

            assert!(matches!(result, Err(DomainError::Validation(_))));
        }

        #[rstest]
        fn test_再開時のバージョン不一致はconflict(now: DateTime<Utc>) {
            let (case, steps) = submitted_requisition(10_000, now);
            let case = case.map_state(|s| s.transitioned(CaseStatus::OnHold, None, now));

            let result = plan_resume(case, &steps, &actor(Role::Admin), Version::initial(), now);

            assert!(matches!(result, Err(DomainError::Conflict(_))));
        }
    }

    #[rstest]
    fn test_判断者が記録される(now: DateTime<Utc>) {
        let (case, steps) = submitted_requisition(10_000, now);
        let approver = Actor::new(UserId::new(), Role::DeptHead);

        let plan = plan_step_action(
            case,
            &steps,
            &approver,
            StepActionInput {
                step_id:          steps[0].id(),
                decision:         StepDecision::Approved,
                comment:          Some("問題ありません"),
                expected_version: steps[0].version(),
            },
            now,
        )
        .unwrap();

        assert_eq!(plan.acted_step.actor_id(), Some(approver.id()));
        assert_eq!(plan.acted_step.comment(), Some("問題ありません"));
    }
}
