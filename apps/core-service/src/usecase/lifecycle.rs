//! # 案件ライフサイクルの共通処理
//!
//! 購買申請・支払申請に共通する申請（承認チェーン生成）と
//! 案件レベルのステータス遷移を実装する。
//!
//! ## 遷移の権限
//!
//! | 案件 | 遷移先 | 操作できるロール |
//! |-----|-------|----------------|
//! | 共通 | `submitted` / `cancelled` | 申請者本人 |
//! | 購買申請 | `for_quoting` / `quote_evaluation` / `for_approval` / `awarded` / `po_issued` / `completed` | `proc_officer` |
//! | 支払申請 | `sap_synced` / `paid` / `closed` | 経理ロール |
//! | 共通 | 上記以外 | `admin` のみ |
//!
//! 管理者はすべての遷移を代行できる。

use chrono::{DateTime, Duration, Utc};
use itertools::Itertools;
use procureflow_domain::{
    approval::{StepAction, generate_chain},
    audit_log::{AuditAction, AuditEntityType, AuditLog},
    case::{Case, CaseKind, CaseRef, CaseStatus},
    purchase_order::{PoStatus, PurchaseOrder},
    quote::count_responsive,
    role::{Actor, Role},
    transition::{TransitionFacts, apply_transition, validate_transition},
    value_objects::Version,
};
use procureflow_shared::{event_log::event, log_business_event};
use serde_json::json;
use uuid::Uuid;

use super::{
    UseCaseDeps,
    helpers::{ensure_owner_or_admin, save_error},
};
use crate::error::CoreError;

const ACCOUNTING_ROLES: [Role; 3] = [
    Role::AccountingStaff,
    Role::AccountingSupervisor,
    Role::AccountingManager,
];

/// 遷移先ごとの権限を確認する
pub(crate) fn ensure_can_transition(
    case: &Case,
    target: CaseStatus,
    actor: &Actor,
) -> Result<(), CoreError> {
    match (case.kind(), target) {
        (_, CaseStatus::Submitted | CaseStatus::Cancelled) => {
            ensure_owner_or_admin(case.requested_by(), actor)
        }
        (
            CaseKind::Requisition,
            CaseStatus::ForQuoting
            | CaseStatus::QuoteEvaluation
            | CaseStatus::ForApproval
            | CaseStatus::Awarded
            | CaseStatus::PoIssued
            | CaseStatus::Completed,
        ) => Ok(actor.require_role(Role::ProcOfficer)?),
        (
            CaseKind::PaymentRequest,
            CaseStatus::SapSynced | CaseStatus::Paid | CaseStatus::Closed,
        ) => Ok(actor.require_any_role(&ACCOUNTING_ROLES)?),
        _ => Ok(actor.require_role(Role::Admin)?),
    }
}

/// 遷移と同じトランザクションで行う追加の書き込み
#[derive(Debug, Clone)]
pub(crate) enum TransitionWrite {
    Audit(AuditLog),
    /// 発注書を発行する（`po_issued` への遷移の前提になる）
    IssuePurchaseOrder(PurchaseOrder),
    UpdatePurchaseOrder {
        order:           PurchaseOrder,
        expected_status: PoStatus,
    },
}

pub(crate) fn entity_type_label(kind: CaseKind) -> &'static str {
    match kind {
        CaseKind::Requisition => event::entity_type::REQUISITION,
        CaseKind::PaymentRequest => event::entity_type::PAYMENT_REQUEST,
    }
}

impl UseCaseDeps {
    /// 遷移の検証に使う事実を集める
    ///
    /// 支払申請は見積・発注書を持たないため常に既定値。
    pub(crate) async fn transition_facts(&self, case: &Case) -> Result<TransitionFacts, CoreError> {
        let Case::Requisition(requisition) = case else {
            return Ok(TransitionFacts::default());
        };

        let quotes = self.quote_repo.find_by_requisition(requisition.id()).await?;
        let has_quote_exception = self
            .audit_log_repo
            .exists(
                AuditEntityType::Requisition,
                requisition.id().as_uuid(),
                AuditAction::QuoteExceptionApproved,
            )
            .await?;

        let order = self.po_repo.find_by_requisition(requisition.id()).await?;
        let fully_received = match &order {
            Some(order) => {
                let receipts = self.grn_repo.find_by_purchase_order(order.id()).await?;
                order.is_fully_received(&receipts)
            }
            None => false,
        };

        Ok(TransitionFacts {
            responsive_quote_count: count_responsive(&quotes),
            has_quote_exception,
            awarded_quote_count: quotes.iter().filter(|q| q.is_awarded()).count(),
            purchase_order_issued: order.is_some(),
            fully_received,
        })
    }

    /// 購買申請の完了に合わせて発注書を完了にする書き込み
    ///
    /// 全明細の検収が済んでいなければ Validation を返す。
    async fn purchase_order_completion(
        &self,
        case: &CaseRef,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Vec<TransitionWrite>, CoreError> {
        let CaseRef::Requisition(requisition_id) = case else {
            return Ok(Vec::new());
        };
        let Some(order) = self.po_repo.find_by_requisition(requisition_id).await? else {
            return Ok(Vec::new());
        };

        let receipts = self.grn_repo.find_by_purchase_order(order.id()).await?;
        let expected_status = order.status();
        let completed = order.completed(&receipts, now)?;
        let audit = AuditLog {
            entity_type: AuditEntityType::PurchaseOrder,
            entity_id: *completed.id().as_uuid(),
            ..AuditLog::for_case(case, AuditAction::Updated, Some(actor), now)
        }
        .with_states(
            json!({ "status": expected_status }),
            json!({ "status": completed.status(), "completed_at": completed.completed_at() }),
        );

        Ok(vec![
            TransitionWrite::UpdatePurchaseOrder {
                order: completed,
                expected_status,
            },
            TransitionWrite::Audit(audit),
        ])
    }

    /// 案件の監査証跡を古い順に取得する
    ///
    /// 案件自体の記録に、ステップ・見積・落札通知など関連エンティティの記録を合わせる。
    pub(crate) async fn audit_trail(
        &self,
        case: &CaseRef,
        related: Vec<(AuditEntityType, Uuid)>,
    ) -> Result<Vec<AuditLog>, CoreError> {
        let steps = self.fetch_steps(case).await?;
        let entities = std::iter::once((AuditEntityType::from(case.kind()), *case.as_uuid()))
            .chain(
                steps
                    .iter()
                    .map(|s| (AuditEntityType::ApprovalStep, *s.id().as_uuid())),
            )
            .chain(related);

        let mut logs = Vec::new();
        for (entity_type, entity_id) in entities {
            logs.extend(
                self.audit_log_repo
                    .find_by_entity(entity_type, &entity_id)
                    .await?,
            );
        }

        Ok(logs
            .into_iter()
            .sorted_by_key(|log| log.created_at)
            .collect())
    }

    /// 案件を申請し、承認チェーンを開始する
    ///
    /// 再申請時は未処理のステップを削除して新しい世代のチェーンを作る。
    #[tracing::instrument(skip_all, fields(case = %case.case_ref(), %expected_version))]
    pub(crate) async fn submit_case(
        &self,
        case: Case,
        expected_version: Version,
        actor: &Actor,
    ) -> Result<Case, CoreError> {
        // 1. 権限と遷移条件を検証
        ensure_owner_or_admin(case.requested_by(), actor)?;
        validate_transition(
            &case,
            CaseStatus::Submitted,
            expected_version,
            &TransitionFacts::default(),
        )?;

        // 2. 承認チェーンを生成
        let now = self.clock.now();
        let case_ref = case.case_ref();
        let existing = self.fetch_steps(&case_ref).await?;
        let chain = generate_chain(&case_ref, case.amount(), &existing, now);

        let from = case.status();
        let case_version = case.version();
        let case = case.map_state(|state| state.submitted(chain.first_deadline, now));

        // 3. 1 トランザクションで保存
        let mut tx = self.begin_tx().await?;
        self.save_case(&mut tx, &case, case_version).await?;
        if !chain.removed_step_ids.is_empty() {
            self.step_repo
                .delete_pending(&mut tx, &chain.removed_step_ids)
                .await
                .map_err(save_error("承認ステップ"))?;
        }
        for step in &chain.steps {
            self.step_repo.insert(&mut tx, step).await?;
        }
        self.audit_log_repo
            .insert(
                &mut tx,
                &AuditLog::status_changed(
                    &case_ref,
                    Some(actor),
                    from,
                    CaseStatus::Submitted,
                    None,
                    now,
                ),
            )
            .await?;
        self.commit_tx(tx).await?;

        log_business_event!(
            event.category = event::category::CASE,
            event.action = event::action::CASE_SUBMITTED,
            event.entity_type = entity_type_label(case.kind()),
            event.entity_id = %case_ref.as_uuid(),
            event.actor_id = %actor.id(),
            event.result = event::result::SUCCESS,
            chain.cycle = chain.cycle,
            chain.steps = chain.steps.len(),
            "案件を申請"
        );

        // 4. コミット後に通知
        self.notify_status_changed(&case, from, CaseStatus::Submitted, None)
            .await;

        Ok(case)
    }

    /// 案件レベルのステータス遷移を行う
    ///
    /// - `submitted` への遷移は [`Self::submit_case`] と同じ処理になる
    /// - `cancelled` / `rejected` への遷移は未処理・保留中のステップを取消す
    /// - 保留からの遷移は保留中のステップを再開し、期限を保留時間だけ延長する
    /// - 購買申請の `completed` への遷移は発注書も完了にする
    pub(crate) async fn transition_case(
        &self,
        case: Case,
        target: CaseStatus,
        expected_version: Version,
        actor: &Actor,
        comment: Option<&str>,
    ) -> Result<Case, CoreError> {
        self.transition_case_with(case, target, expected_version, actor, comment, Vec::new())
            .await
    }

    /// 遷移と同じトランザクションで追加の書き込みを行う
    #[tracing::instrument(skip_all, fields(case = %case.case_ref(), %target, %expected_version))]
    pub(crate) async fn transition_case_with(
        &self,
        case: Case,
        target: CaseStatus,
        expected_version: Version,
        actor: &Actor,
        comment: Option<&str>,
        mut writes: Vec<TransitionWrite>,
    ) -> Result<Case, CoreError> {
        if target == CaseStatus::Submitted {
            return self.submit_case(case, expected_version, actor).await;
        }

        // 1. 権限と遷移条件を検証
        ensure_can_transition(&case, target, actor)?;
        let mut facts = self.transition_facts(&case).await?;
        if writes
            .iter()
            .any(|w| matches!(w, TransitionWrite::IssuePurchaseOrder(_)))
        {
            facts.purchase_order_issued = true;
        }
        validate_transition(&case, target, expected_version, &facts)?;

        // 2. 遷移を適用し、ステップへの影響を求める
        let now = self.clock.now();
        let case_ref = case.case_ref();
        let from = case.status();
        let case_version = case.version();
        let paused_for = case
            .state()
            .sla()
            .paused_at()
            .map_or_else(Duration::zero, |paused_at| now - paused_at);
        let comment = comment.map(str::trim).filter(|c| !c.is_empty());
        let case = apply_transition(case, target, comment, now);
        if target == CaseStatus::Completed {
            writes.extend(self.purchase_order_completion(&case_ref, actor, now).await?);
        }

        let steps = self.fetch_steps(&case_ref).await?;
        let step_updates = if matches!(target, CaseStatus::Cancelled | CaseStatus::Rejected) {
            steps
                .into_iter()
                .filter(|s| s.is_open())
                .map(|s| {
                    let version = s.version();
                    s.cancelled(now).map(|cancelled| (cancelled, version))
                })
                .collect::<Result<Vec<_>, _>>()?
        } else if from == CaseStatus::OnHold {
            steps
                .into_iter()
                .filter(|s| s.action() == StepAction::OnHold)
                .map(|s| {
                    let version = s.version();
                    s.reopened(paused_for, now).map(|reopened| (reopened, version))
                })
                .collect::<Result<Vec<_>, _>>()?
        } else {
            Vec::new()
        };

        // 3. 1 トランザクションで保存
        let mut tx = self.begin_tx().await?;
        self.save_case(&mut tx, &case, case_version).await?;
        for (step, version) in &step_updates {
            self.step_repo
                .update_with_version_check(&mut tx, step, *version)
                .await
                .map_err(save_error("承認ステップ"))?;
        }
        self.audit_log_repo
            .insert(
                &mut tx,
                &AuditLog::status_changed(&case_ref, Some(actor), from, target, comment, now),
            )
            .await?;
        for write in &writes {
            match write {
                TransitionWrite::Audit(audit) => {
                    self.audit_log_repo.insert(&mut tx, audit).await?;
                }
                TransitionWrite::IssuePurchaseOrder(order) => {
                    self.po_repo.insert(&mut tx, order).await?;
                }
                TransitionWrite::UpdatePurchaseOrder {
                    order,
                    expected_status,
                } => {
                    self.po_repo
                        .update_status(&mut tx, order, *expected_status)
                        .await
                        .map_err(save_error("発注書"))?;
                }
            }
        }
        self.commit_tx(tx).await?;

        log_business_event!(
            event.category = event::category::CASE,
            event.action = event::action::CASE_TRANSITIONED,
            event.entity_type = entity_type_label(case.kind()),
            event.entity_id = %case_ref.as_uuid(),
            event.actor_id = %actor.id(),
            event.result = event::result::SUCCESS,
            case.from = %from,
            case.to = %target,
            "案件のステータスを遷移"
        );

        // 4. コミット後に通知
        self.notify_status_changed(&case, from, target, comment).await;

        Ok(case)
    }
}

#[cfg(test)]
mod tests {
    use procureflow_domain::test_support::{actor, payment_request_in, requisition_in};
    use rstest::rstest;

    use super::*;

    fn now() -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[rstest]
    #[case(CaseStatus::ForQuoting, Role::ProcOfficer, true)]
    #[case(CaseStatus::PoIssued, Role::ProcOfficer, true)]
    #[case(CaseStatus::ForQuoting, Role::DeptHead, false)]
    #[case(CaseStatus::OnHold, Role::ProcOfficer, false)]
    #[case(CaseStatus::OnHold, Role::Admin, true)]
    #[case(CaseStatus::Cancelled, Role::Admin, true)]
    #[case(CaseStatus::Cancelled, Role::ProcOfficer, false)]
    fn test_購買申請の遷移権限(
        #[case] target: CaseStatus,
        #[case] role: Role,
        #[case] allowed: bool,
    ) {
        let case: Case = requisition_in(CaseStatus::Approved, 1_000, now()).into();

        let result = ensure_can_transition(&case, target, &actor(role));

        assert_eq!(result.is_ok(), allowed);
    }

    #[rstest]
    #[case(CaseStatus::Paid, Role::AccountingStaff, true)]
    #[case(CaseStatus::SapSynced, Role::AccountingManager, true)]
    #[case(CaseStatus::Closed, Role::AccountingSupervisor, true)]
    #[case(CaseStatus::Paid, Role::ProcOfficer, false)]
    #[case(CaseStatus::Approved, Role::AccountingStaff, false)]
    fn test_支払申請の遷移権限(
        #[case] target: CaseStatus,
        #[case] role: Role,
        #[case] allowed: bool,
    ) {
        let case: Case = payment_request_in(CaseStatus::Approved, 1_000, now()).into();

        let result = ensure_can_transition(&case, target, &actor(role));

        assert_eq!(result.is_ok(), allowed);
    }

    #[test]
    fn test_申請者本人は取消できる() {
        let case: Case = requisition_in(CaseStatus::Draft, 1_000, now()).into();
        let owner = Actor::new(case.requested_by().clone(), Role::Requester);

        assert!(ensure_can_transition(&case, CaseStatus::Cancelled, &owner).is_ok());
    }
}
