//! # SLA 監視ユースケース
//!
//! 期限を過ぎた未処理ステップに SLA 超過を記録し、担当ロールのユーザーへ通知する。
//! 対象は各世代で前段がすべて承認済みの、いま判断を待っているステップに限る。
//!
//! 定期タスクと内部エンドポイントの両方から呼ばれる。記録済みのステップは
//! 超過候補に含まれないため、何度実行しても同じステップを二重に記録しない。
//! 保留中の案件のステップは期限が止まっているので対象外。

use procureflow_domain::{
    approval::ApprovalStep,
    audit_log::AuditLog,
    notification::CaseNotification,
};
use procureflow_shared::{
    event_log::{error as log_error, event},
    log_business_event,
};
use serde::Serialize;

use super::{UseCaseDeps, helpers::save_error};
use crate::error::CoreError;

/// SLA チェックの集計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SlaCheckSummary {
    /// 期限超過の候補として読み込んだステップ数
    pub checked: usize,
    /// 今回新たに SLA 超過を記録したステップ数
    pub flagged: usize,
}

/// SLA 監視ユースケースの実装
pub struct SlaUseCaseImpl {
    deps: UseCaseDeps,
}

impl SlaUseCaseImpl {
    pub fn new(deps: UseCaseDeps) -> Self {
        Self { deps }
    }

    /// 期限を過ぎた未処理ステップに SLA 超過を記録する
    ///
    /// ステップごとに個別のトランザクションで記録する。1 件の失敗で残りを止めない。
    /// 並行して承認されたステップ（バージョン競合）は黙ってスキップする。
    #[tracing::instrument(skip_all)]
    pub async fn check_sla_breaches(&self) -> Result<SlaCheckSummary, CoreError> {
        let now = self.deps.clock.now();
        let overdue = self.deps.step_repo.find_overdue(now).await?;
        let mut summary = SlaCheckSummary {
            checked: overdue.len(),
            flagged: 0,
        };

        for step in overdue {
            let step_id = step.id().clone();
            match self.flag_step(step).await {
                Ok(flagged) => {
                    summary.flagged += 1;
                    self.notify_role(&flagged).await;
                }
                Err(CoreError::Conflict(_)) => {
                    tracing::debug!(%step_id, "並行して更新されたステップをスキップ");
                }
                Err(e) => {
                    tracing::error!(
                        error.category = log_error::category::INFRASTRUCTURE,
                        error.kind = log_error::kind::SLA_CHECK,
                        %step_id,
                        "SLA 超過の記録に失敗: {}",
                        e
                    );
                }
            }
        }

        if summary.flagged > 0 {
            tracing::info!(
                sla.checked = summary.checked,
                sla.flagged = summary.flagged,
                "SLA チェック完了"
            );
        }

        Ok(summary)
    }

    async fn flag_step(&self, step: ApprovalStep) -> Result<ApprovalStep, CoreError> {
        let now = self.deps.clock.now();
        let expected_version = step.version();
        let flagged = step.sla_breached(now)?;
        let audit = AuditLog::sla_breach(&flagged, now);

        let mut tx = self.deps.begin_tx().await?;
        self.deps
            .step_repo
            .update_with_version_check(&mut tx, &flagged, expected_version)
            .await
            .map_err(save_error("承認ステップ"))?;
        self.deps.audit_log_repo.insert(&mut tx, &audit).await?;
        self.deps.commit_tx(tx).await?;

        log_business_event!(
            event.category = event::category::SLA,
            event.action = event::action::SLA_BREACHED,
            event.entity_type = event::entity_type::APPROVAL_STEP,
            event.entity_id = %flagged.id(),
            event.result = event::result::SUCCESS,
            step.case = %flagged.case(),
            step.role = %flagged.role_required(),
            step.sla_deadline = %flagged.sla_deadline(),
            "SLA 超過を記録"
        );

        Ok(flagged)
    }

    /// 超過したステップのロールを持つ有効ユーザー全員に通知する
    async fn notify_role(&self, step: &ApprovalStep) {
        let case = match self.deps.load_case(step.case()).await {
            Ok(case) => case,
            Err(e) => {
                tracing::warn!(step_id = %step.id(), error = %e, "SLA 超過通知の案件取得に失敗");
                return;
            }
        };
        let recipients = match self
            .deps
            .user_repo
            .find_active_by_role(step.role_required())
            .await
        {
            Ok(users) => users,
            Err(e) => {
                tracing::warn!(step_id = %step.id(), error = %e, "SLA 超過通知の宛先取得に失敗");
                return;
            }
        };

        for recipient in recipients {
            self.deps
                .notifier
                .notify(CaseNotification::SlaBreached {
                    case_kind:         case.kind(),
                    ref_number:        case.ref_number(),
                    case_title:        case.title().to_string(),
                    step_label:        step.step_label().to_string(),
                    sla_deadline:      step.sla_deadline(),
                    recipient_email:   recipient.email().as_str().to_string(),
                    recipient_user_id: recipient.id().clone(),
                })
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use procureflow_domain::{
        audit_log::AuditAction,
        case::Case,
        role::Role,
        test_support::{approve_all, submitted_payment_request, submitted_requisition},
    };

    use super::*;
    use crate::test_utils::TestContext;

    fn seed(ctx: &TestContext, case: Case, steps: Vec<ApprovalStep>) {
        match case {
            Case::Requisition(r) => ctx.requisitions.add(r),
            Case::PaymentRequest(p) => ctx.payment_requests.add(p),
        }
        for step in steps {
            ctx.steps.add(step);
        }
    }

    #[tokio::test]
    async fn test_期限内のステップは記録しない() {
        let ctx = TestContext::new();
        let (case, steps) = submitted_requisition(50_000, ctx.now);
        seed(&ctx, case, steps);
        ctx.clock.advance(Duration::hours(23));
        let sut = SlaUseCaseImpl::new(ctx.deps());

        let summary = sut.check_sla_breaches().await.unwrap();

        assert_eq!(summary, SlaCheckSummary::default());
        assert!(ctx.audit_logs.with_action(AuditAction::SlaBreach).is_empty());
    }

    #[tokio::test]
    async fn test_期限を過ぎた現在のステップにsla超過を記録する() {
        let ctx = TestContext::new();
        let (case, steps) = submitted_requisition(2_000_000, ctx.now);
        seed(&ctx, case, steps);
        ctx.clock.advance(Duration::hours(25));
        let sut = SlaUseCaseImpl::new(ctx.deps());

        let summary = sut.check_sla_breaches().await.unwrap();

        assert_eq!(summary, SlaCheckSummary { checked: 1, flagged: 1 });
        let breached = ctx
            .steps
            .all()
            .into_iter()
            .filter(ApprovalStep::is_sla_breached)
            .collect::<Vec<_>>();
        assert_eq!(breached.len(), 1);
        assert_eq!(breached[0].role_required(), Role::DeptHead);
        assert_eq!(ctx.audit_logs.with_action(AuditAction::SlaBreach).len(), 1);
    }

    #[tokio::test]
    async fn test_前段が未承認のステップは期限を過ぎても記録しない() {
        let ctx = TestContext::new();
        let (case, steps) = submitted_requisition(50_000, ctx.now);
        let (case, steps) = approve_all(case, steps, 1, ctx.now);
        seed(&ctx, case, steps.clone());
        ctx.clock.advance(Duration::hours(200));
        let sut = SlaUseCaseImpl::new(ctx.deps());

        let summary = sut.check_sla_breaches().await.unwrap();

        assert_eq!(summary.flagged, 1);
        let breached = ctx
            .steps
            .all()
            .into_iter()
            .filter(ApprovalStep::is_sla_breached)
            .map(|s| s.id().clone())
            .collect::<Vec<_>>();
        assert_eq!(breached, vec![steps[1].id().clone()]);
    }

    #[tokio::test]
    async fn test_二度目の実行では何も記録しない() {
        let ctx = TestContext::new();
        let (case, steps) = submitted_payment_request(30_000, ctx.now);
        seed(&ctx, case, steps);
        ctx.clock.advance(Duration::hours(30));
        let sut = SlaUseCaseImpl::new(ctx.deps());
        let first = sut.check_sla_breaches().await.unwrap();

        let second = sut.check_sla_breaches().await.unwrap();

        assert_eq!(first.flagged, 1);
        assert_eq!(second, SlaCheckSummary::default());
        assert_eq!(ctx.audit_logs.with_action(AuditAction::SlaBreach).len(), 1);
    }

    #[tokio::test]
    async fn test_担当ロールの有効ユーザーに通知する() {
        let ctx = TestContext::new();
        let (case, steps) = submitted_requisition(50_000, ctx.now);
        let dept_step = steps[0].clone();
        seed(&ctx, case, steps);
        let dept_head = ctx.add_user(Role::DeptHead);
        ctx.add_user_with_id(procureflow_domain::user::UserId::new(), Role::DeptHead, false);
        ctx.clock.advance(Duration::hours(25));
        let sut = SlaUseCaseImpl::new(ctx.deps());

        sut.check_sla_breaches().await.unwrap();

        let to_dept_head = ctx
            .sender
            .sent_emails()
            .into_iter()
            .filter(|email| email.to == dept_head.email().as_str())
            .collect::<Vec<_>>();
        assert_eq!(to_dept_head.len(), 1);
        assert!(to_dept_head[0].subject.contains("PR-2026-00001"));
        assert!(to_dept_head[0].text_body.contains(dept_step.step_label()));
    }

    #[tokio::test]
    async fn test_通知に失敗しても記録は残る() {
        let ctx = TestContext::new();
        let (case, steps) = submitted_requisition(50_000, ctx.now);
        seed(&ctx, case, steps);
        ctx.add_user(Role::DeptHead);
        ctx.sender.fail_with("SMTP 接続エラー");
        ctx.clock.advance(Duration::hours(25));
        let sut = SlaUseCaseImpl::new(ctx.deps());

        let summary = sut.check_sla_breaches().await.unwrap();

        assert_eq!(summary.flagged, 1);
        assert!(ctx.sender.sent_emails().is_empty());
    }
}
