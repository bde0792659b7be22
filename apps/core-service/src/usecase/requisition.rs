//! # 購買申請ユースケース
//!
//! 購買申請の起票・編集・書類チェック・申請・遷移と参照を実装する。
//! 申請と遷移の本体は種別共通の [`lifecycle`](super::lifecycle) に委ねる。

use chrono::Datelike;
use procureflow_domain::{
    approval::ApprovalStep,
    audit_log::{AuditAction, AuditEntityType, AuditLog},
    award::NoticeToAward,
    case::{Case, CaseRef, CaseStatus},
    purchase_order::PurchaseOrder,
    quote::VendorQuote,
    requisition::{NewRequisition, Requisition, RequisitionContent, RequisitionId},
    user::UserId,
    value_objects::{RefPrefix, Version},
};
use procureflow_shared::{event_log::event, log_business_event};
use serde_json::json;

use super::{
    UseCaseDeps,
    helpers::{FindResultExt, ensure_can_view, ensure_owner_or_admin, save_error},
};
use crate::error::CoreError;

/// 購買申請の詳細（明細・承認ステップ・見積・落札通知・発注書）
#[derive(Debug, Clone)]
pub struct RequisitionDetail {
    pub requisition:    Requisition,
    pub steps:          Vec<ApprovalStep>,
    pub quotes:         Vec<VendorQuote>,
    pub notice:         Option<NoticeToAward>,
    pub purchase_order: Option<PurchaseOrder>,
}

/// 購買申請ユースケースの実装
pub struct RequisitionUseCaseImpl {
    deps: UseCaseDeps,
}

impl RequisitionUseCaseImpl {
    pub fn new(deps: UseCaseDeps) -> Self {
        Self { deps }
    }

    async fn load(&self, id: &RequisitionId) -> Result<Requisition, CoreError> {
        self.deps
            .requisition_repo
            .find_by_id(id)
            .await
            .or_not_found("購買申請")
    }

    /// 購買申請を下書きとして起票する
    #[tracing::instrument(skip_all, fields(%actor_id))]
    pub async fn create(
        &self,
        content: RequisitionContent,
        actor_id: &UserId,
    ) -> Result<Requisition, CoreError> {
        let actor = self.deps.load_actor(actor_id).await?;
        let now = self.deps.clock.now();

        let ref_number = self
            .deps
            .ref_counter_repo
            .next_ref_number(RefPrefix::Requisition, now.year())
            .await?;
        let requisition = Requisition::new(NewRequisition {
            id: RequisitionId::new(),
            ref_number,
            requested_by: actor.id().clone(),
            content,
            required_document_types: self.deps.required_document_types.clone(),
            now,
        })?;

        let case_ref = CaseRef::from(requisition.id().clone());
        let audit = AuditLog::for_case(&case_ref, AuditAction::Created, Some(&actor), now)
            .with_after_state(json!({
                "status": requisition.status(),
                "estimated_total": requisition.estimated_total(),
            }));

        let mut tx = self.deps.begin_tx().await?;
        self.deps.requisition_repo.insert(&mut tx, &requisition).await?;
        self.deps.audit_log_repo.insert(&mut tx, &audit).await?;
        self.deps.commit_tx(tx).await?;

        log_business_event!(
            event.category = event::category::CASE,
            event.action = event::action::CASE_CREATED,
            event.entity_type = event::entity_type::REQUISITION,
            event.entity_id = %requisition.id(),
            event.actor_id = %actor.id(),
            event.result = event::result::SUCCESS,
            case.ref_number = %requisition.ref_number(),
            "購買申請を起票"
        );

        Ok(requisition)
    }

    /// 下書き・差し戻し中の購買申請を編集する
    ///
    /// 明細は丸ごと置き換え、見積合計を再計算する。
    #[tracing::instrument(skip_all, fields(%id, %expected_version))]
    pub async fn update(
        &self,
        id: &RequisitionId,
        content: RequisitionContent,
        expected_version: Version,
        actor_id: &UserId,
    ) -> Result<Requisition, CoreError> {
        let actor = self.deps.load_actor(actor_id).await?;
        let requisition = self.load(id).await?;
        ensure_owner_or_admin(requisition.requested_by(), &actor)?;
        requisition.state().ensure_version(expected_version)?;

        let now = self.deps.clock.now();
        let before_total = requisition.estimated_total();
        let updated = requisition.updated(content, now)?;
        let audit = AuditLog::for_case(
            &CaseRef::from(updated.id().clone()),
            AuditAction::Updated,
            Some(&actor),
            now,
        )
        .with_states(
            json!({ "estimated_total": before_total }),
            json!({ "estimated_total": updated.estimated_total() }),
        );

        let mut tx = self.deps.begin_tx().await?;
        self.deps
            .requisition_repo
            .update_with_version_check(&mut tx, &updated, expected_version)
            .await
            .map_err(save_error("購買申請"))?;
        self.deps
            .requisition_repo
            .replace_line_items(&mut tx, &updated)
            .await?;
        self.deps.audit_log_repo.insert(&mut tx, &audit).await?;
        self.deps.commit_tx(tx).await?;

        log_business_event!(
            event.category = event::category::CASE,
            event.action = event::action::CASE_UPDATED,
            event.entity_type = event::entity_type::REQUISITION,
            event.entity_id = %updated.id(),
            event.actor_id = %actor.id(),
            event.result = event::result::SUCCESS,
            "購買申請を編集"
        );

        Ok(updated)
    }

    /// 提出済み書類の種別を記録する
    ///
    /// 書類そのものは扱わず、種別だけを設定済みの必要書類と突き合わせる。
    #[tracing::instrument(skip_all, fields(%id, %expected_version))]
    pub async fn update_checklist(
        &self,
        id: &RequisitionId,
        provided_document_types: Vec<String>,
        expected_version: Version,
        actor_id: &UserId,
    ) -> Result<Requisition, CoreError> {
        let actor = self.deps.load_actor(actor_id).await?;
        let requisition = self.load(id).await?;
        ensure_owner_or_admin(requisition.requested_by(), &actor)?;
        requisition.state().ensure_version(expected_version)?;

        let now = self.deps.clock.now();
        let updated = requisition.checklist_updated(
            provided_document_types,
            &self.deps.required_document_types,
            now,
        )?;
        let audit = AuditLog::for_case(
            &CaseRef::from(updated.id().clone()),
            AuditAction::Updated,
            Some(&actor),
            now,
        )
        .with_after_state(json!({
            "provided_document_types": updated.provided_document_types(),
            "checklist_satisfied": updated.checklist_satisfied(),
        }));

        let mut tx = self.deps.begin_tx().await?;
        self.deps
            .requisition_repo
            .update_with_version_check(&mut tx, &updated, expected_version)
            .await
            .map_err(save_error("購買申請"))?;
        self.deps.audit_log_repo.insert(&mut tx, &audit).await?;
        self.deps.commit_tx(tx).await?;

        Ok(updated)
    }

    /// 購買申請を申請し、承認チェーンを開始する
    pub async fn submit(
        &self,
        id: &RequisitionId,
        expected_version: Version,
        actor_id: &UserId,
    ) -> Result<Requisition, CoreError> {
        let actor = self.deps.load_actor(actor_id).await?;
        let case = Case::from(self.load(id).await?);

        let case = self.deps.submit_case(case, expected_version, &actor).await?;
        into_requisition(case)
    }

    /// 案件レベルのステータス遷移を行う
    pub async fn transition(
        &self,
        id: &RequisitionId,
        target: CaseStatus,
        expected_version: Version,
        actor_id: &UserId,
        comment: Option<&str>,
    ) -> Result<Requisition, CoreError> {
        let actor = self.deps.load_actor(actor_id).await?;
        let case = Case::from(self.load(id).await?);

        let case = self
            .deps
            .transition_case(case, target, expected_version, &actor, comment)
            .await?;
        into_requisition(case)
    }

    /// 購買申請の詳細を取得する
    ///
    /// 閲覧者が自分の申請でも自部門の申請でもなく、全部門を見るロールでもなければ Forbidden。
    pub async fn get(
        &self,
        id: &RequisitionId,
        viewer_id: &UserId,
    ) -> Result<RequisitionDetail, CoreError> {
        let viewer = self.deps.load_viewer(viewer_id).await?;
        let requisition = self.load(id).await?;
        ensure_can_view(&viewer, requisition.requested_by(), requisition.department())?;

        let steps = self
            .deps
            .fetch_steps(&CaseRef::from(id.clone()))
            .await?;
        let quotes = self.deps.quote_repo.find_by_requisition(id).await?;
        let notice = self.deps.nta_repo.find_by_requisition(id).await?;
        let purchase_order = self.deps.po_repo.find_by_requisition(id).await?;

        Ok(RequisitionDetail {
            requisition,
            steps,
            quotes,
            notice,
            purchase_order,
        })
    }

    /// 閲覧者が見られる購買申請の一覧を取得する
    pub async fn list(
        &self,
        status: Option<CaseStatus>,
        viewer_id: &UserId,
    ) -> Result<Vec<Requisition>, CoreError> {
        let viewer = self.deps.load_viewer(viewer_id).await?;
        let requisitions = self.deps.requisition_repo.find_all(status).await?;
        Ok(requisitions
            .into_iter()
            .filter(|r| viewer.can_view(r.requested_by(), r.department()))
            .collect())
    }

    /// 購買申請の監査証跡を取得する
    ///
    /// 見積・落札通知・発注書・検収の記録も含めて古い順に並べる。
    pub async fn audit_trail(
        &self,
        id: &RequisitionId,
        viewer_id: &UserId,
    ) -> Result<Vec<AuditLog>, CoreError> {
        let detail = self.get(id, viewer_id).await?;
        let receipts = match &detail.purchase_order {
            Some(order) => self.deps.grn_repo.find_by_purchase_order(order.id()).await?,
            None => Vec::new(),
        };
        let related = detail
            .quotes
            .iter()
            .map(|q| (AuditEntityType::VendorQuote, *q.id().as_uuid()))
            .chain(
                detail
                    .notice
                    .iter()
                    .map(|n| (AuditEntityType::NoticeToAward, *n.id().as_uuid())),
            )
            .chain(
                detail
                    .purchase_order
                    .iter()
                    .map(|o| (AuditEntityType::PurchaseOrder, *o.id().as_uuid())),
            )
            .chain(
                receipts
                    .iter()
                    .map(|r| (AuditEntityType::GoodsReceipt, *r.id().as_uuid())),
            )
            .collect();

        self.deps
            .audit_trail(&CaseRef::from(id.clone()), related)
            .await
    }
}

fn into_requisition(case: Case) -> Result<Requisition, CoreError> {
    case.into_requisition()
        .ok_or_else(|| CoreError::Internal("購買申請ではない案件が返されました".to_string()))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use procureflow_domain::{
        approval::StepAction,
        role::Role,
        test_support::{line, requisition_content, requisition_in},
    };
    use rust_decimal::Decimal;

    use super::*;
    use crate::test_utils::TestContext;

    fn setup() -> (TestContext, RequisitionUseCaseImpl) {
        let ctx = TestContext::new();
        let sut = RequisitionUseCaseImpl::new(ctx.deps());
        (ctx, sut)
    }

    #[tokio::test]
    async fn test_起票すると下書きになり参照番号が振られる() {
        let (ctx, sut) = setup();
        let requester = ctx.add_user(Role::Requester);

        let requisition = sut
            .create(
                requisition_content(vec![line("ノート PC", 2, 150_000), line("マウス", 2, 3_000)]),
                requester.id(),
            )
            .await
            .unwrap();

        assert_eq!(requisition.status(), CaseStatus::Draft);
        assert_eq!(requisition.estimated_total(), Decimal::from(306_000));
        assert_eq!(requisition.ref_number().to_string(), "PR-2026-00001");
        assert_eq!(requisition.requested_by(), requester.id());
        assert_eq!(ctx.audit_logs.with_action(AuditAction::Created).len(), 1);
    }

    #[tokio::test]
    async fn test_明細がなければ起票できない() {
        let (ctx, sut) = setup();
        let requester = ctx.add_user(Role::Requester);

        let result = sut.create(requisition_content(vec![]), requester.id()).await;

        assert!(matches!(result, Err(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_未登録ユーザーは起票できない() {
        let (_ctx, sut) = setup();

        let result = sut
            .create(requisition_content(vec![line("PC", 1, 100)]), &UserId::new())
            .await;

        assert!(matches!(result, Err(CoreError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_編集すると合計を再計算しバージョンが上がる() {
        let (ctx, sut) = setup();
        let requisition = requisition_in(CaseStatus::Draft, 1_000, ctx.now);
        let owner = ctx.add_user_with_id(requisition.requested_by().clone(), Role::Requester, true);
        ctx.requisitions.add(requisition.clone());

        let updated = sut
            .update(
                requisition.id(),
                requisition_content(vec![line("モニター", 3, 20_000)]),
                requisition.state().version(),
                owner.id(),
            )
            .await
            .unwrap();

        assert_eq!(updated.estimated_total(), Decimal::from(60_000));
        assert_eq!(updated.state().version(), requisition.state().version().next());
        assert_eq!(
            ctx.requisitions.get(requisition.id()).unwrap().estimated_total(),
            Decimal::from(60_000)
        );
    }

    #[tokio::test]
    async fn test_古いバージョンでの編集は競合になる() {
        let (ctx, sut) = setup();
        let requisition = requisition_in(CaseStatus::Draft, 1_000, ctx.now);
        let owner = ctx.add_user_with_id(requisition.requested_by().clone(), Role::Requester, true);
        ctx.requisitions.add(requisition.clone());

        let result = sut
            .update(
                requisition.id(),
                requisition_content(vec![line("モニター", 1, 20_000)]),
                requisition.state().version().next(),
                owner.id(),
            )
            .await;

        assert!(matches!(result, Err(CoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_申請済みの購買申請は編集できない() {
        let (ctx, sut) = setup();
        let requisition = requisition_in(CaseStatus::Submitted, 1_000, ctx.now);
        let owner = ctx.add_user_with_id(requisition.requested_by().clone(), Role::Requester, true);
        ctx.requisitions.add(requisition.clone());

        let result = sut
            .update(
                requisition.id(),
                requisition_content(vec![line("モニター", 1, 20_000)]),
                requisition.state().version(),
                owner.id(),
            )
            .await;

        assert!(matches!(result, Err(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_必要書類がそろうとチェックリストが充足する() {
        let (ctx, sut) = setup();
        let requester = ctx.add_user(Role::Requester);
        let created = sut
            .create(requisition_content(vec![line("PC", 1, 100_000)]), requester.id())
            .await
            .unwrap();
        assert!(!created.checklist_satisfied());

        let updated = sut
            .update_checklist(
                created.id(),
                vec!["purchase_request_form".to_string()],
                created.state().version(),
                requester.id(),
            )
            .await
            .unwrap();

        assert!(updated.checklist_satisfied());
    }

    #[tokio::test]
    async fn test_申請すると承認チェーンが生成される() {
        let (ctx, sut) = setup();
        let requisition = requisition_in(CaseStatus::Draft, 50_000, ctx.now);
        let owner = ctx.add_user_with_id(requisition.requested_by().clone(), Role::Requester, true);
        ctx.requisitions.add(requisition.clone());

        let submitted = sut
            .submit(requisition.id(), requisition.state().version(), owner.id())
            .await
            .unwrap();

        assert_eq!(submitted.status(), CaseStatus::Submitted);
        let steps = ctx.steps.all();
        assert_eq!(steps.len(), 4);
        assert!(steps.iter().all(|s| s.action() == StepAction::Pending));
        assert_eq!(
            submitted.state().sla().deadline(),
            Some(steps[0].sla_deadline())
        );
        assert_eq!(ctx.audit_logs.with_action(AuditAction::StatusChanged).len(), 1);
        assert_eq!(ctx.sender.sent_emails().len(), 1);
    }

    #[tokio::test]
    async fn test_高額な申請には社長承認が入る() {
        let (ctx, sut) = setup();
        let requisition = requisition_in(CaseStatus::Draft, 1_500_000, ctx.now);
        let owner = ctx.add_user_with_id(requisition.requested_by().clone(), Role::Requester, true);
        ctx.requisitions.add(requisition.clone());

        sut.submit(requisition.id(), requisition.state().version(), owner.id())
            .await
            .unwrap();

        let roles = ctx
            .steps
            .all()
            .iter()
            .map(ApprovalStep::role_required)
            .collect::<Vec<_>>();
        assert_eq!(
            roles,
            vec![
                Role::DeptHead,
                Role::President,
                Role::AccountingStaff,
                Role::AccountingSupervisor,
                Role::AccountingManager,
            ]
        );
    }

    #[tokio::test]
    async fn test_他人の購買申請は申請できない() {
        let (ctx, sut) = setup();
        let requisition = requisition_in(CaseStatus::Draft, 50_000, ctx.now);
        ctx.requisitions.add(requisition.clone());
        let other = ctx.add_user(Role::Requester);

        let result = sut
            .submit(requisition.id(), requisition.state().version(), other.id())
            .await;

        assert!(matches!(result, Err(CoreError::Forbidden(_))));
        assert!(ctx.steps.all().is_empty());
    }

    #[tokio::test]
    async fn test_有効見積が3件未満なら見積評価へ進めない() {
        let (ctx, sut) = setup();
        let requisition = requisition_in(CaseStatus::ForQuoting, 50_000, ctx.now);
        ctx.requisitions.add(requisition.clone());
        let officer = ctx.add_user(Role::ProcOfficer);

        let result = sut
            .transition(
                requisition.id(),
                CaseStatus::QuoteEvaluation,
                requisition.state().version(),
                officer.id(),
                None,
            )
            .await;

        assert!(matches!(result, Err(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_発注書がなければ発注済みへ遷移できない() {
        let (ctx, sut) = setup();
        let requisition = requisition_in(CaseStatus::Awarded, 50_000, ctx.now);
        ctx.requisitions.add(requisition.clone());
        let officer = ctx.add_user(Role::ProcOfficer);

        let result = sut
            .transition(
                requisition.id(),
                CaseStatus::PoIssued,
                requisition.state().version(),
                officer.id(),
                None,
            )
            .await;

        assert!(matches!(result, Err(CoreError::Validation(_))));
        assert!(ctx.audit_logs.all().is_empty());
    }

    #[tokio::test]
    async fn test_取消すると未処理ステップも取消される() {
        let (ctx, sut) = setup();
        let requisition = requisition_in(CaseStatus::Draft, 50_000, ctx.now);
        let owner = ctx.add_user_with_id(requisition.requested_by().clone(), Role::Requester, true);
        ctx.requisitions.add(requisition.clone());
        let submitted = sut
            .submit(requisition.id(), requisition.state().version(), owner.id())
            .await
            .unwrap();

        let cancelled = sut
            .transition(
                requisition.id(),
                CaseStatus::Cancelled,
                submitted.state().version(),
                owner.id(),
                Some("不要になった"),
            )
            .await
            .unwrap();

        assert_eq!(cancelled.status(), CaseStatus::Cancelled);
        assert!(
            ctx.steps
                .all()
                .iter()
                .all(|s| s.action() == StepAction::Cancelled)
        );
    }

    #[tokio::test]
    async fn test_存在しない購買申請はnotfound() {
        let (ctx, sut) = setup();
        let admin = ctx.add_user(Role::Admin);

        let result = sut.get(&RequisitionId::new(), admin.id()).await;

        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_他部門の購買申請は参照できない() {
        let (ctx, sut) = setup();
        let requisition = requisition_in(CaseStatus::Submitted, 100_000, ctx.now);
        ctx.requisitions.add(requisition.clone());
        let same_dept = ctx.add_user_in(Role::DeptHead, requisition.department());
        let other_dept = ctx.add_user_in(Role::Requester, "営業部");
        let officer = ctx.add_user(Role::ProcOfficer);

        let by_same_dept = sut.get(requisition.id(), same_dept.id()).await;
        let by_other_dept = sut.get(requisition.id(), other_dept.id()).await;
        let by_officer = sut.get(requisition.id(), officer.id()).await;
        let trail_by_other_dept = sut.audit_trail(requisition.id(), other_dept.id()).await;

        assert!(by_same_dept.is_ok());
        assert!(matches!(by_other_dept, Err(CoreError::Forbidden(_))));
        assert!(by_officer.is_ok());
        assert!(matches!(trail_by_other_dept, Err(CoreError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_一覧は閲覧できる購買申請に絞られる() {
        let (ctx, sut) = setup();
        let ours = requisition_in(CaseStatus::Submitted, 100_000, ctx.now);
        ctx.requisitions.add(ours.clone());
        let requester = ctx.add_user_in(Role::Requester, "営業部");
        let mine = sut
            .create(requisition_content(vec![line("名刺", 1, 3_000)]), requester.id())
            .await
            .unwrap();
        let officer = ctx.add_user(Role::ProcOfficer);

        let for_requester = sut.list(None, requester.id()).await.unwrap();
        let for_officer = sut.list(None, officer.id()).await.unwrap();

        assert_eq!(
            for_requester.iter().map(|r| r.id()).collect::<Vec<_>>(),
            vec![mine.id()]
        );
        assert_eq!(for_officer.len(), 2);
    }

    #[tokio::test]
    async fn test_監査証跡は古い順に並ぶ() {
        let (ctx, sut) = setup();
        let requester = ctx.add_user(Role::Requester);
        let created = sut
            .create(requisition_content(vec![line("PC", 1, 100_000)]), requester.id())
            .await
            .unwrap();
        ctx.clock.advance(chrono::Duration::minutes(5));
        let updated = sut
            .update_checklist(
                created.id(),
                vec!["purchase_request_form".to_string()],
                created.state().version(),
                requester.id(),
            )
            .await
            .unwrap();
        ctx.clock.advance(chrono::Duration::minutes(5));
        sut.submit(created.id(), updated.state().version(), requester.id())
            .await
            .unwrap();

        let trail = sut.audit_trail(created.id(), requester.id()).await.unwrap();

        let actions = trail.iter().map(|l| l.action).collect::<Vec<_>>();
        assert_eq!(
            actions,
            vec![AuditAction::Created, AuditAction::Updated, AuditAction::StatusChanged]
        );
    }
}
