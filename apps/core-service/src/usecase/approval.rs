//! # 承認ユースケース
//!
//! 承認ステップへの判断（承認・却下・差し戻し・保留）と、保留の再開を実装する。
//! 判定はドメインの [`plan_step_action`] / [`plan_resume`] が行い、
//! ここでは読み込み → 判定 → 1 トランザクションでの保存 → 通知の順に進める。
//!
//! ステップの更新は `action = 'pending' AND version = 期待値` の条件付きで行うため、
//! 同じステップへの同時操作は片方だけが成功し、もう片方は Conflict になる。

use std::collections::HashMap;

use procureflow_domain::{
    approval::{
        ApprovalStep,
        ApprovalStepId,
        StepActionInput,
        StepDecision,
        plan_resume,
        plan_step_action,
    },
    audit_log::{AuditAction, AuditLog},
    case::{Case, CaseRef, CaseStatus},
    user::UserId,
    value_objects::Version,
};
use procureflow_shared::{event_log::event, log_business_event};
use serde_json::json;

use super::{UseCaseDeps, helpers::save_error, lifecycle::entity_type_label};
use crate::error::CoreError;

/// ステップへの判断の入力
#[derive(Debug, Clone)]
pub struct ActInput {
    pub case:             CaseRef,
    pub step_id:          ApprovalStepId,
    pub decision:         StepDecision,
    pub comment:          Option<String>,
    /// 呼び出し元が読んだステップのバージョン
    pub expected_version: Version,
    pub actor_id:         UserId,
}

/// ステップへの判断の結果
#[derive(Debug, Clone)]
pub struct ActResult {
    pub case: Case,
    pub step: ApprovalStep,
}

/// 承認ユースケースの実装
pub struct ApprovalUseCaseImpl {
    deps: UseCaseDeps,
}

impl ApprovalUseCaseImpl {
    pub fn new(deps: UseCaseDeps) -> Self {
        Self { deps }
    }

    /// 承認ステップに判断を記録する
    ///
    /// ## 処理フロー
    ///
    /// 1. 操作者・案件・ステップ一覧を読み込む
    /// 2. ドメインで判定し、保存すべき変更を組み立てる
    /// 3. ステップ・取消/削除されるステップ・案件・監査ログを 1 トランザクションで保存
    /// 4. 案件のステータスが変わった場合は申請者に通知
    #[tracing::instrument(
        skip_all,
        fields(case = %input.case, step_id = %input.step_id, decision = %input.decision)
    )]
    pub async fn act(&self, input: ActInput) -> Result<ActResult, CoreError> {
        // 1. 読み込み
        let actor = self.deps.load_actor(&input.actor_id).await?;
        let case = self.deps.load_case(&input.case).await?;
        let steps = self.deps.fetch_steps(&input.case).await?;
        let versions = steps
            .iter()
            .map(|s| (s.id().clone(), s.version()))
            .collect::<HashMap<_, _>>();

        // 2. 判定
        let now = self.deps.clock.now();
        let plan = plan_step_action(
            case,
            &steps,
            &actor,
            StepActionInput {
                step_id:          &input.step_id,
                decision:         input.decision,
                comment:          input.comment.as_deref(),
                expected_version: input.expected_version,
            },
            now,
        )?;
        let new_status = plan.case.status();

        // 3. 保存
        let mut tx = self.deps.begin_tx().await?;
        self.deps
            .step_repo
            .record_action(&mut tx, &plan.acted_step, plan.expected_version)
            .await
            .map_err(save_error("承認ステップ"))?;
        for cancelled in &plan.cancelled_steps {
            let expected = versions
                .get(cancelled.id())
                .copied()
                .ok_or_else(|| CoreError::Internal("取消対象のステップが見つかりません".to_string()))?;
            self.deps
                .step_repo
                .update_with_version_check(&mut tx, cancelled, expected)
                .await
                .map_err(save_error("承認ステップ"))?;
        }
        if !plan.deleted_step_ids.is_empty() {
            self.deps
                .step_repo
                .delete_pending(&mut tx, &plan.deleted_step_ids)
                .await
                .map_err(save_error("承認ステップ"))?;
        }
        self.deps
            .save_case(&mut tx, &plan.case, plan.case_version)
            .await?;
        self.deps
            .audit_log_repo
            .insert(
                &mut tx,
                &AuditLog::step_actioned(
                    &plan.acted_step,
                    &actor,
                    plan.previous_status,
                    new_status,
                    now,
                ),
            )
            .await?;
        self.deps.commit_tx(tx).await?;

        log_business_event!(
            event.category = event::category::APPROVAL,
            event.action = decision_event_action(input.decision),
            event.entity_type = entity_type_label(input.case.kind()),
            event.entity_id = %input.case.as_uuid(),
            event.actor_id = %actor.id(),
            event.result = event::result::SUCCESS,
            step.number = plan.acted_step.step_number(),
            case.from = %plan.previous_status,
            case.to = %new_status,
            "承認ステップを処理"
        );

        // 4. 通知
        if plan.status_changed() {
            let comment = plan.comment.as_ref().map(|c| c.as_str());
            self.deps
                .notify_status_changed(&plan.case, plan.previous_status, new_status, comment)
                .await;
        }

        Ok(ActResult {
            case: plan.case,
            step: plan.acted_step,
        })
    }

    /// 保留中の案件を再開する
    ///
    /// 保留前のステータスに戻し、SLA と保留中ステップの期限を保留時間だけ延長する。
    #[tracing::instrument(skip_all, fields(%case_ref, %expected_version))]
    pub async fn resume(
        &self,
        case_ref: &CaseRef,
        expected_version: Version,
        actor_id: &UserId,
    ) -> Result<Case, CoreError> {
        let actor = self.deps.load_actor(actor_id).await?;
        let case = self.deps.load_case(case_ref).await?;
        let steps = self.deps.fetch_steps(case_ref).await?;

        let now = self.deps.clock.now();
        let plan = plan_resume(case, &steps, &actor, expected_version, now)?;
        let resumed_status = plan.case.status();
        let audit = AuditLog::for_case(case_ref, AuditAction::HoldResumed, Some(&actor), now)
            .with_states(
                json!({ "status": CaseStatus::OnHold }),
                json!({
                    "status": resumed_status,
                    "paused_seconds": plan.paused_for.num_seconds(),
                }),
            );

        let mut tx = self.deps.begin_tx().await?;
        self.deps
            .save_case(&mut tx, &plan.case, plan.case_version)
            .await?;
        if let Some((step, expected)) = &plan.reopened_step {
            self.deps
                .step_repo
                .update_with_version_check(&mut tx, step, *expected)
                .await
                .map_err(save_error("承認ステップ"))?;
        }
        self.deps.audit_log_repo.insert(&mut tx, &audit).await?;
        self.deps.commit_tx(tx).await?;

        log_business_event!(
            event.category = event::category::CASE,
            event.action = event::action::CASE_RESUMED,
            event.entity_type = entity_type_label(case_ref.kind()),
            event.entity_id = %case_ref.as_uuid(),
            event.actor_id = %actor.id(),
            event.result = event::result::SUCCESS,
            hold.paused_seconds = plan.paused_for.num_seconds(),
            "保留中の案件を再開"
        );

        self.deps
            .notify_status_changed(&plan.case, CaseStatus::OnHold, resumed_status, None)
            .await;

        Ok(plan.case)
    }
}

fn decision_event_action(decision: StepDecision) -> &'static str {
    match decision {
        StepDecision::Approved => event::action::STEP_APPROVED,
        StepDecision::Rejected => event::action::STEP_REJECTED,
        StepDecision::Returned => event::action::STEP_RETURNED,
        StepDecision::OnHold => event::action::STEP_ON_HOLD,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use procureflow_domain::{
        approval::StepAction,
        role::Role,
        test_support::{approve_all, submitted_payment_request, submitted_requisition},
    };

    use super::*;
    use crate::{test_utils::TestContext, usecase::RequisitionUseCaseImpl};

    fn setup() -> (TestContext, ApprovalUseCaseImpl) {
        let ctx = TestContext::new();
        let sut = ApprovalUseCaseImpl::new(ctx.deps());
        (ctx, sut)
    }

    /// 案件とステップをモックに投入し、申請者を登録する
    fn seed(ctx: &TestContext, case: Case, steps: Vec<ApprovalStep>) -> CaseRef {
        ctx.add_user_with_id(case.requested_by().clone(), Role::Requester, true);
        let case_ref = case.case_ref();
        match case {
            Case::Requisition(r) => ctx.requisitions.add(r),
            Case::PaymentRequest(p) => ctx.payment_requests.add(p),
        }
        for step in steps {
            ctx.steps.add(step);
        }
        case_ref
    }

    fn input(
        case: &CaseRef,
        step: &ApprovalStep,
        decision: StepDecision,
        comment: Option<&str>,
        actor_id: &UserId,
    ) -> ActInput {
        ActInput {
            case: case.clone(),
            step_id: step.id().clone(),
            decision,
            comment: comment.map(str::to_string),
            expected_version: step.version(),
            actor_id: actor_id.clone(),
        }
    }

    #[tokio::test]
    async fn test_部門長が承認すると審査中に進む() {
        let (ctx, sut) = setup();
        let (case, steps) = submitted_requisition(50_000, ctx.now);
        let case_ref = seed(&ctx, case, steps.clone());
        let head = ctx.add_user(Role::DeptHead);

        let result = sut
            .act(input(&case_ref, &steps[0], StepDecision::Approved, None, head.id()))
            .await
            .unwrap();

        assert_eq!(result.case.status(), CaseStatus::UnderReview);
        assert_eq!(result.step.action(), StepAction::Approved);
        assert_eq!(
            result.case.state().sla().deadline(),
            Some(steps[1].sla_deadline())
        );
        assert_eq!(ctx.audit_logs.with_action(AuditAction::StepActioned).len(), 1);
        assert_eq!(ctx.sender.sent_emails().len(), 1);
    }

    #[tokio::test]
    async fn test_担当外のロールは処理できない() {
        let (ctx, sut) = setup();
        let (case, steps) = submitted_requisition(50_000, ctx.now);
        let case_ref = seed(&ctx, case, steps.clone());
        let officer = ctx.add_user(Role::ProcOfficer);

        let result = sut
            .act(input(&case_ref, &steps[0], StepDecision::Approved, None, officer.id()))
            .await;

        assert!(matches!(result, Err(CoreError::Forbidden(_))));
        assert!(ctx.audit_logs.all().is_empty());
    }

    #[tokio::test]
    async fn test_前段が未承認のステップは処理できない() {
        let (ctx, sut) = setup();
        let (case, steps) = submitted_requisition(50_000, ctx.now);
        let case_ref = seed(&ctx, case, steps.clone());
        let accounting = ctx.add_user(Role::AccountingStaff);

        let result = sut
            .act(input(&case_ref, &steps[1], StepDecision::Approved, None, accounting.id()))
            .await;

        assert!(matches!(result, Err(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_古いバージョンでの処理は競合になる() {
        let (ctx, sut) = setup();
        let (case, steps) = submitted_requisition(50_000, ctx.now);
        let case_ref = seed(&ctx, case, steps.clone());
        let head = ctx.add_user(Role::DeptHead);
        sut.act(input(&case_ref, &steps[0], StepDecision::Approved, None, head.id()))
            .await
            .unwrap();

        let result = sut
            .act(input(&case_ref, &steps[0], StepDecision::Approved, None, head.id()))
            .await;

        assert!(matches!(result, Err(CoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_却下にはコメントが必須() {
        let (ctx, sut) = setup();
        let (case, steps) = submitted_requisition(50_000, ctx.now);
        let case_ref = seed(&ctx, case, steps.clone());
        let head = ctx.add_user(Role::DeptHead);

        let result = sut
            .act(input(&case_ref, &steps[0], StepDecision::Rejected, Some("  "), head.id()))
            .await;

        assert!(matches!(result, Err(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_却下すると残りのステップが取消される() {
        let (ctx, sut) = setup();
        let (case, steps) = submitted_requisition(50_000, ctx.now);
        let case_ref = seed(&ctx, case, steps.clone());
        let head = ctx.add_user(Role::DeptHead);

        let result = sut
            .act(input(
                &case_ref,
                &steps[0],
                StepDecision::Rejected,
                Some("予算超過"),
                head.id(),
            ))
            .await
            .unwrap();

        assert_eq!(result.case.status(), CaseStatus::Rejected);
        let actions = ctx
            .steps
            .all()
            .iter()
            .map(ApprovalStep::action)
            .collect::<Vec<_>>();
        assert_eq!(
            actions,
            vec![
                StepAction::Rejected,
                StepAction::Cancelled,
                StepAction::Cancelled,
                StepAction::Cancelled,
            ]
        );
        let sent = ctx.sender.sent_emails();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text_body.contains("予算超過"));
    }

    #[tokio::test]
    async fn test_差し戻すと未処理ステップが削除される() {
        let (ctx, sut) = setup();
        let (case, steps) = submitted_payment_request(30_000, ctx.now);
        let case_ref = seed(&ctx, case, steps.clone());
        let head = ctx.add_user(Role::DeptHead);

        let result = sut
            .act(input(
                &case_ref,
                &steps[0],
                StepDecision::Returned,
                Some("領収書を添付してください"),
                head.id(),
            ))
            .await
            .unwrap();

        assert_eq!(result.case.status(), CaseStatus::Returned);
        let remaining = ctx.steps.all();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].action(), StepAction::Returned);
    }

    #[tokio::test]
    async fn test_最終ステップを承認すると承認済みになる() {
        let (ctx, sut) = setup();
        let (case, steps) = submitted_requisition(50_000, ctx.now);
        let (case, steps) = approve_all(case, steps, 3, ctx.now);
        let case_ref = seed(&ctx, case, steps.clone());
        let manager = ctx.add_user(Role::AccountingManager);

        let result = sut
            .act(input(&case_ref, &steps[3], StepDecision::Approved, None, manager.id()))
            .await
            .unwrap();

        assert_eq!(result.case.status(), CaseStatus::Approved);
    }

    #[tokio::test]
    async fn test_保留から再開すると期限が保留時間だけ延びる() {
        let (ctx, sut) = setup();
        let (case, steps) = submitted_requisition(50_000, ctx.now);
        let case_ref = seed(&ctx, case, steps.clone());
        let head = ctx.add_user(Role::DeptHead);
        let held = sut
            .act(input(
                &case_ref,
                &steps[0],
                StepDecision::OnHold,
                Some("見積の確認待ち"),
                head.id(),
            ))
            .await
            .unwrap();
        assert_eq!(held.case.status(), CaseStatus::OnHold);
        assert_eq!(held.case.state().hold_reason(), Some("見積の確認待ち"));

        ctx.clock.advance(Duration::hours(6));
        let resumed = sut
            .resume(&case_ref, held.case.version(), head.id())
            .await
            .unwrap();

        assert_eq!(resumed.status(), CaseStatus::Submitted);
        assert_eq!(resumed.state().hold_reason(), None);
        assert_eq!(
            resumed.state().sla().deadline(),
            Some(steps[0].sla_deadline() + Duration::hours(6))
        );
        let reopened = ctx.steps.all().into_iter().next().unwrap();
        assert_eq!(reopened.action(), StepAction::Pending);
        assert_eq!(reopened.sla_deadline(), steps[0].sla_deadline() + Duration::hours(6));
        assert_eq!(ctx.audit_logs.with_action(AuditAction::HoldResumed).len(), 1);
    }

    #[tokio::test]
    async fn test_保留中でない案件は再開できない() {
        let (ctx, sut) = setup();
        let (case, steps) = submitted_requisition(50_000, ctx.now);
        let version = case.version();
        let case_ref = seed(&ctx, case, steps);
        let admin = ctx.add_user(Role::Admin);

        let result = sut.resume(&case_ref, version, admin.id()).await;

        assert!(matches!(result, Err(CoreError::Validation(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_同じステップへの同時承認は1件だけ成功する() {
        let (ctx, sut) = setup();
        let (case, steps) = submitted_requisition(50_000, ctx.now);
        let case_ref = seed(&ctx, case, steps.clone());
        let head = ctx.add_user(Role::DeptHead);
        let sut = std::sync::Arc::new(sut);

        let handles = (0..4)
            .map(|_| {
                let sut = std::sync::Arc::clone(&sut);
                let act = input(&case_ref, &steps[0], StepDecision::Approved, None, head.id());
                tokio::spawn(async move { sut.act(act).await })
            })
            .collect::<Vec<_>>();
        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(CoreError::Conflict(_))))
            .count();
        assert_eq!(succeeded, 1);
        assert_eq!(conflicts, 3);
        assert_eq!(ctx.audit_logs.with_action(AuditAction::StepActioned).len(), 1);
        let stored = ctx.steps.all().into_iter().next().unwrap();
        assert_eq!(stored.action(), StepAction::Approved);
        assert_eq!(stored.version(), steps[0].version().next());
    }

    #[tokio::test]
    async fn test_判断でバージョンが1増え監査ログに前後のステータスが残る() {
        let (ctx, sut) = setup();
        let (case, steps) = submitted_requisition(50_000, ctx.now);
        let case_version = case.version();
        let case_ref = seed(&ctx, case, steps.clone());
        let head = ctx.add_user(Role::DeptHead);

        let result = sut
            .act(input(&case_ref, &steps[0], StepDecision::Approved, None, head.id()))
            .await
            .unwrap();

        assert_eq!(result.case.version(), case_version.next());
        assert_eq!(result.step.version(), steps[0].version().next());
        let audits = ctx.audit_logs.with_action(AuditAction::StepActioned);
        assert_eq!(audits.len(), 1);
        let before = audits[0].before_state.as_ref().unwrap();
        let after = audits[0].after_state.as_ref().unwrap();
        assert_eq!(before["status"], json!(CaseStatus::Submitted));
        assert_eq!(after["status"], json!(CaseStatus::UnderReview));
        assert_eq!(after["action"], json!(StepAction::Approved));
    }

    #[tokio::test]
    async fn test_案件の遷移でバージョンが1増え監査ログに前後のステータスが残る() {
        let (ctx, _sut) = setup();
        let (case, steps) = submitted_requisition(50_000, ctx.now);
        let (case, steps) = approve_all(case, steps, 1, ctx.now);
        let case_version = case.version();
        let case_ref = seed(&ctx, case, steps);
        let CaseRef::Requisition(id) = case_ref else {
            panic!("購買申請ではありません");
        };
        let officer = ctx.add_user(Role::ProcOfficer);
        let requisitions = RequisitionUseCaseImpl::new(ctx.deps());

        let moved = requisitions
            .transition(&id, CaseStatus::ForQuoting, case_version, officer.id(), None)
            .await
            .unwrap();

        assert_eq!(moved.state().version(), case_version.next());
        let audits = ctx.audit_logs.with_action(AuditAction::StatusChanged);
        assert_eq!(audits.len(), 1);
        assert_eq!(
            audits[0].before_state.as_ref().unwrap()["status"],
            json!(CaseStatus::UnderReview)
        );
        assert_eq!(
            audits[0].after_state.as_ref().unwrap()["status"],
            json!(CaseStatus::ForQuoting)
        );
    }

    #[tokio::test]
    async fn test_保留中のステップは却下で取消される() {
        let (ctx, sut) = setup();
        let (case, steps) = submitted_requisition(50_000, ctx.now);
        let case_ref = seed(&ctx, case, steps.clone());
        let CaseRef::Requisition(id) = case_ref.clone() else {
            panic!("購買申請ではありません");
        };
        let head = ctx.add_user(Role::DeptHead);
        let admin = ctx.add_user(Role::Admin);
        let held = sut
            .act(input(
                &case_ref,
                &steps[0],
                StepDecision::OnHold,
                Some("仕様確認中"),
                head.id(),
            ))
            .await
            .unwrap();
        let requisitions = RequisitionUseCaseImpl::new(ctx.deps());

        let rejected = requisitions
            .transition(
                &id,
                CaseStatus::Rejected,
                held.case.version(),
                admin.id(),
                Some("要件変更"),
            )
            .await
            .unwrap();

        assert_eq!(rejected.status(), CaseStatus::Rejected);
        let actions = ctx
            .steps
            .all()
            .iter()
            .map(ApprovalStep::action)
            .collect::<Vec<_>>();
        assert!(actions.iter().all(|a| *a == StepAction::Cancelled));
        assert!(!actions.contains(&StepAction::OnHold));
    }

    #[tokio::test]
    async fn test_通知の失敗は処理を失敗させない() {
        let (ctx, sut) = setup();
        ctx.sender.fail_with("SMTP 接続拒否");
        let (case, steps) = submitted_requisition(50_000, ctx.now);
        let case_ref = seed(&ctx, case, steps.clone());
        let head = ctx.add_user(Role::DeptHead);

        let result = sut
            .act(input(&case_ref, &steps[0], StepDecision::Approved, None, head.id()))
            .await;

        assert!(result.is_ok());
    }
}
