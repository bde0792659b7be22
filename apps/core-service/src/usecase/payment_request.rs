//! # 支払申請ユースケース
//!
//! 支払申請の起票・編集・申請・遷移と参照を実装する。
//! 承認ステップへの判断は購買申請と同じ [`approval`](super::approval) を通す。

use chrono::Datelike;
use procureflow_domain::{
    approval::ApprovalStep,
    audit_log::{AuditAction, AuditLog},
    case::{Case, CaseRef, CaseStatus},
    payment_request::{
        Disbursement,
        NewPaymentRequest,
        PaymentRequest,
        PaymentRequestContent,
        PaymentRequestId,
    },
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

/// 支払申請の詳細（明細・承認ステップ）
#[derive(Debug, Clone)]
pub struct PaymentRequestDetail {
    pub payment_request: PaymentRequest,
    pub steps:           Vec<ApprovalStep>,
}

/// 支払申請ユースケースの実装
pub struct PaymentRequestUseCaseImpl {
    deps: UseCaseDeps,
}

impl PaymentRequestUseCaseImpl {
    pub fn new(deps: UseCaseDeps) -> Self {
        Self { deps }
    }

    async fn load(&self, id: &PaymentRequestId) -> Result<PaymentRequest, CoreError> {
        self.deps
            .payment_request_repo
            .find_by_id(id)
            .await
            .or_not_found("支払申請")
    }

    /// 紐づく購買申請が存在することを確認する
    async fn ensure_linked_requisition(
        &self,
        content: &PaymentRequestContent,
    ) -> Result<(), CoreError> {
        if let Some(requisition_id) = &content.requisition_id {
            self.deps
                .requisition_repo
                .find_by_id(requisition_id)
                .await
                .or_not_found("紐づく購買申請")?;
        }
        Ok(())
    }

    /// 支払申請を下書きとして起票する
    #[tracing::instrument(skip_all, fields(%actor_id))]
    pub async fn create(
        &self,
        content: PaymentRequestContent,
        actor_id: &UserId,
    ) -> Result<PaymentRequest, CoreError> {
        let actor = self.deps.load_actor(actor_id).await?;
        self.ensure_linked_requisition(&content).await?;
        let now = self.deps.clock.now();

        let ref_number = self
            .deps
            .ref_counter_repo
            .next_ref_number(RefPrefix::PaymentRequest, now.year())
            .await?;
        let payment_request = PaymentRequest::new(NewPaymentRequest {
            id: PaymentRequestId::new(),
            ref_number,
            requested_by: actor.id().clone(),
            content,
            now,
        })?;

        let audit = AuditLog::for_case(
            &CaseRef::from(payment_request.id().clone()),
            AuditAction::Created,
            Some(&actor),
            now,
        )
        .with_after_state(json!({
            "status": payment_request.status(),
            "amount": payment_request.amount(),
        }));

        let mut tx = self.deps.begin_tx().await?;
        self.deps
            .payment_request_repo
            .insert(&mut tx, &payment_request)
            .await?;
        self.deps.audit_log_repo.insert(&mut tx, &audit).await?;
        self.deps.commit_tx(tx).await?;

        log_business_event!(
            event.category = event::category::CASE,
            event.action = event::action::CASE_CREATED,
            event.entity_type = event::entity_type::PAYMENT_REQUEST,
            event.entity_id = %payment_request.id(),
            event.actor_id = %actor.id(),
            event.result = event::result::SUCCESS,
            case.ref_number = %payment_request.ref_number(),
            "支払申請を起票"
        );

        Ok(payment_request)
    }

    /// 下書き・差し戻し中の支払申請を編集する
    #[tracing::instrument(skip_all, fields(%id, %expected_version))]
    pub async fn update(
        &self,
        id: &PaymentRequestId,
        content: PaymentRequestContent,
        expected_version: Version,
        actor_id: &UserId,
    ) -> Result<PaymentRequest, CoreError> {
        let actor = self.deps.load_actor(actor_id).await?;
        let payment_request = self.load(id).await?;
        ensure_owner_or_admin(payment_request.requested_by(), &actor)?;
        payment_request.state().ensure_version(expected_version)?;
        self.ensure_linked_requisition(&content).await?;

        let now = self.deps.clock.now();
        let before_amount = payment_request.amount();
        let updated = payment_request.updated(content, now)?;
        let audit = AuditLog::for_case(
            &CaseRef::from(updated.id().clone()),
            AuditAction::Updated,
            Some(&actor),
            now,
        )
        .with_states(
            json!({ "amount": before_amount }),
            json!({ "amount": updated.amount() }),
        );

        let mut tx = self.deps.begin_tx().await?;
        self.deps
            .payment_request_repo
            .update_with_version_check(&mut tx, &updated, expected_version)
            .await
            .map_err(save_error("支払申請"))?;
        self.deps
            .payment_request_repo
            .replace_line_items(&mut tx, &updated)
            .await?;
        self.deps.audit_log_repo.insert(&mut tx, &audit).await?;
        self.deps.commit_tx(tx).await?;

        log_business_event!(
            event.category = event::category::CASE,
            event.action = event::action::CASE_UPDATED,
            event.entity_type = event::entity_type::PAYMENT_REQUEST,
            event.entity_id = %updated.id(),
            event.actor_id = %actor.id(),
            event.result = event::result::SUCCESS,
            "支払申請を編集"
        );

        Ok(updated)
    }

    /// 支払申請を申請し、承認チェーンを開始する
    pub async fn submit(
        &self,
        id: &PaymentRequestId,
        expected_version: Version,
        actor_id: &UserId,
    ) -> Result<PaymentRequest, CoreError> {
        let actor = self.deps.load_actor(actor_id).await?;
        let case = Case::from(self.load(id).await?);

        let case = self.deps.submit_case(case, expected_version, &actor).await?;
        into_payment_request(case)
    }

    /// 案件レベルのステータス遷移を行う
    ///
    /// 伝票番号（APV / CV / 小切手番号）は遷移の検証前に反映する。
    /// `paid` への遷移は小切手番号が必要なため、同じリクエストで渡せる。
    pub async fn transition(
        &self,
        id: &PaymentRequestId,
        target: CaseStatus,
        expected_version: Version,
        actor_id: &UserId,
        comment: Option<&str>,
        disbursement: Disbursement,
    ) -> Result<PaymentRequest, CoreError> {
        let actor = self.deps.load_actor(actor_id).await?;
        let payment_request = self.load(id).await?;
        let payment_request = if disbursement.is_empty() {
            payment_request
        } else {
            payment_request.with_disbursement(disbursement)
        };

        let case = self
            .deps
            .transition_case(
                Case::from(payment_request),
                target,
                expected_version,
                &actor,
                comment,
            )
            .await?;
        into_payment_request(case)
    }

    /// 支払申請の詳細を取得する
    pub async fn get(
        &self,
        id: &PaymentRequestId,
        viewer_id: &UserId,
    ) -> Result<PaymentRequestDetail, CoreError> {
        let viewer = self.deps.load_viewer(viewer_id).await?;
        let payment_request = self.load(id).await?;
        ensure_can_view(
            &viewer,
            payment_request.requested_by(),
            payment_request.department(),
        )?;
        let steps = self
            .deps
            .fetch_steps(&CaseRef::from(id.clone()))
            .await?;

        Ok(PaymentRequestDetail {
            payment_request,
            steps,
        })
    }

    /// 閲覧者が見られる支払申請の一覧を取得する
    pub async fn list(
        &self,
        status: Option<CaseStatus>,
        viewer_id: &UserId,
    ) -> Result<Vec<PaymentRequest>, CoreError> {
        let viewer = self.deps.load_viewer(viewer_id).await?;
        let payment_requests = self.deps.payment_request_repo.find_all(status).await?;
        Ok(payment_requests
            .into_iter()
            .filter(|p| viewer.can_view(p.requested_by(), p.department()))
            .collect())
    }

    /// 支払申請の監査証跡を取得する
    pub async fn audit_trail(
        &self,
        id: &PaymentRequestId,
        viewer_id: &UserId,
    ) -> Result<Vec<AuditLog>, CoreError> {
        let viewer = self.deps.load_viewer(viewer_id).await?;
        let payment_request = self.load(id).await?;
        ensure_can_view(
            &viewer,
            payment_request.requested_by(),
            payment_request.department(),
        )?;
        self.deps
            .audit_trail(&CaseRef::from(id.clone()), Vec::new())
            .await
    }
}

fn into_payment_request(case: Case) -> Result<PaymentRequest, CoreError> {
    case.into_payment_request()
        .ok_or_else(|| CoreError::Internal("支払申請ではない案件が返されました".to_string()))
}
