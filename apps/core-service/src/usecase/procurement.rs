//! # 調達ユースケース
//!
//! 承認済み購買申請の調達工程（見積 → 落札 → 発注 → 検収 → 完了）を実装する。
//!
//! | 操作 | 操作できるロール |
//! |------|----------------|
//! | 見積の登録・評価、落札、送付、検収、完了 | `proc_officer` |
//! | 見積例外の承認 | `president` |
//! | 発注書と検収記録の参照 | 購買申請を閲覧できるユーザー |
//!
//! 管理者はすべての操作を代行できる。

use chrono::Datelike;
use procureflow_domain::{
    audit_log::{AuditAction, AuditEntityType, AuditLog},
    award::{NoticeToAward, NtaStatus, decide_award},
    case::{Case, CaseRef, CaseStatus},
    purchase_order::{GoodsReceipt, GoodsReceiptContent, PurchaseOrder, PurchaseOrderTerms},
    quote::{QuoteLineInput, VendorQuote, VendorQuoteId, count_responsive},
    requisition::{Requisition, RequisitionId},
    role::{Actor, Role},
    transition::{TransitionFacts, apply_transition, validate_transition},
    user::UserId,
    value_objects::{Justification, RefPrefix, Version},
    vendor::VendorId,
};
use procureflow_shared::{event_log::event, log_business_event};
use serde_json::json;

use super::{
    UseCaseDeps,
    helpers::{FindResultExt, ensure_can_view, save_error},
    lifecycle::TransitionWrite,
};
use crate::error::CoreError;

/// 見積登録の入力
#[derive(Debug, Clone)]
pub struct RegisterQuoteInput {
    pub requisition_id: RequisitionId,
    pub vendor_id:      VendorId,
    pub lines:          Vec<QuoteLineInput>,
    pub actor_id:       UserId,
}

/// 落札の入力
#[derive(Debug, Clone)]
pub struct AwardInput {
    pub requisition_id:   RequisitionId,
    pub quote_id:         VendorQuoteId,
    /// 最安の有効見積以外を選ぶ場合の理由
    pub justification:    Option<String>,
    /// 呼び出し元が読んだ購買申請のバージョン
    pub expected_version: Version,
    pub actor_id:         UserId,
}

/// 落札の結果
#[derive(Debug, Clone)]
pub struct AwardResult {
    pub requisition: Requisition,
    pub notice:      NoticeToAward,
}

/// 送付済みにする書類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkSentDocument {
    /// 落札通知
    Nta,
    /// 発注書（購買申請を `po_issued` に進める）
    PurchaseOrder,
}

impl std::str::FromStr for MarkSentDocument {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nta" => Ok(Self::Nta),
            "purchase_order" => Ok(Self::PurchaseOrder),
            _ => Err(CoreError::BadRequest(format!("不正な書類種別: {s}"))),
        }
    }
}

/// 送付の入力
#[derive(Debug, Clone)]
pub struct MarkSentInput {
    pub requisition_id:   RequisitionId,
    pub document:         MarkSentDocument,
    /// 発注書に記載する取引条件（落札通知では使わない）
    pub terms:            PurchaseOrderTerms,
    pub expected_version: Version,
    pub actor_id:         UserId,
}

/// 送付の結果
#[derive(Debug, Clone)]
pub struct MarkSentResult {
    pub requisition:    Requisition,
    pub notice:         Option<NoticeToAward>,
    pub purchase_order: Option<PurchaseOrder>,
}

/// 検収記録の入力
#[derive(Debug, Clone)]
pub struct RecordGoodsReceiptInput {
    pub requisition_id: RequisitionId,
    pub content:        GoodsReceiptContent,
    pub actor_id:       UserId,
}

/// 発注書と検収記録
#[derive(Debug, Clone)]
pub struct PurchaseOrderDetail {
    pub order:    PurchaseOrder,
    pub receipts: Vec<GoodsReceipt>,
}

/// 調達ユースケースの実装
pub struct ProcurementUseCaseImpl {
    deps: UseCaseDeps,
}

impl ProcurementUseCaseImpl {
    pub fn new(deps: UseCaseDeps) -> Self {
        Self { deps }
    }

    async fn load_requisition(&self, id: &RequisitionId) -> Result<Requisition, CoreError> {
        self.deps
            .requisition_repo
            .find_by_id(id)
            .await
            .or_not_found("購買申請")
    }

    async fn load_officer(&self, actor_id: &UserId) -> Result<Actor, CoreError> {
        let actor = self.deps.load_actor(actor_id).await?;
        actor.require_role(Role::ProcOfficer)?;
        Ok(actor)
    }

    async fn has_quote_exception(&self, id: &RequisitionId) -> Result<bool, CoreError> {
        Ok(self
            .deps
            .audit_log_repo
            .exists(
                AuditEntityType::Requisition,
                id.as_uuid(),
                AuditAction::QuoteExceptionApproved,
            )
            .await?)
    }

    /// 業者の見積を登録する
    ///
    /// 同じ業者の見積は 1 件まで（重複は 422）。
    #[tracing::instrument(skip_all, fields(requisition_id = %input.requisition_id, vendor_id = %input.vendor_id))]
    pub async fn register_quote(&self, input: RegisterQuoteInput) -> Result<VendorQuote, CoreError> {
        let actor = self.load_officer(&input.actor_id).await?;
        let requisition = self.load_requisition(&input.requisition_id).await?;
        let vendor = self
            .deps
            .vendor_repo
            .find_by_id(&input.vendor_id)
            .await
            .or_not_found("業者")?;

        let now = self.deps.clock.now();
        let quote =
            VendorQuote::register(&requisition, &vendor, input.lines, actor.id().clone(), now)?;
        let audit = AuditLog {
            entity_type: AuditEntityType::VendorQuote,
            entity_id: *quote.id().as_uuid(),
            ..AuditLog::for_case(
                &CaseRef::from(requisition.id().clone()),
                AuditAction::Created,
                Some(&actor),
                now,
            )
        }
        .with_after_state(json!({
            "requisition_id": requisition.id(),
            "vendor_id": vendor.id(),
            "grand_total": quote.grand_total(),
            "is_complete": quote.is_complete(),
        }));

        let mut tx = self.deps.begin_tx().await?;
        self.deps.quote_repo.insert(&mut tx, &quote).await?;
        self.deps.audit_log_repo.insert(&mut tx, &audit).await?;
        self.deps.commit_tx(tx).await?;

        log_business_event!(
            event.category = event::category::PROCUREMENT,
            event.action = event::action::QUOTE_REGISTERED,
            event.entity_type = event::entity_type::VENDOR_QUOTE,
            event.entity_id = %quote.id(),
            event.actor_id = %actor.id(),
            event.result = event::result::SUCCESS,
            quote.grand_total = %quote.grand_total(),
            quote.is_complete = quote.is_complete(),
            "業者見積を登録"
        );

        Ok(quote)
    }

    /// 見積の仕様適合を評価する
    #[tracing::instrument(skip_all, fields(%requisition_id, %quote_id, is_compliant))]
    pub async fn evaluate_quote(
        &self,
        requisition_id: &RequisitionId,
        quote_id: &VendorQuoteId,
        is_compliant: bool,
        notes: Option<String>,
        expected_version: Version,
        actor_id: &UserId,
    ) -> Result<VendorQuote, CoreError> {
        let actor = self.load_officer(actor_id).await?;
        let requisition = self.load_requisition(requisition_id).await?;
        let quote = self
            .deps
            .quote_repo
            .find_by_id(quote_id)
            .await
            .or_not_found("業者見積")?;
        if quote.version() != expected_version {
            return Err(CoreError::Conflict(
                "業者見積は既に更新されています。最新の情報を取得してください。".to_string(),
            ));
        }

        let now = self.deps.clock.now();
        let before = quote.is_compliant();
        let evaluated = quote.evaluated(&requisition, is_compliant, notes, now)?;
        let audit = AuditLog {
            entity_type: AuditEntityType::VendorQuote,
            entity_id: *evaluated.id().as_uuid(),
            ..AuditLog::for_case(
                &CaseRef::from(requisition.id().clone()),
                AuditAction::Updated,
                Some(&actor),
                now,
            )
        }
        .with_states(
            json!({ "is_compliant": before }),
            json!({ "is_compliant": evaluated.is_compliant() }),
        )
        .with_comment(evaluated.compliance_notes());

        let mut tx = self.deps.begin_tx().await?;
        self.deps
            .quote_repo
            .update_with_version_check(&mut tx, &evaluated, expected_version)
            .await
            .map_err(save_error("業者見積"))?;
        self.deps.audit_log_repo.insert(&mut tx, &audit).await?;
        self.deps.commit_tx(tx).await?;

        log_business_event!(
            event.category = event::category::PROCUREMENT,
            event.action = event::action::QUOTE_EVALUATED,
            event.entity_type = event::entity_type::VENDOR_QUOTE,
            event.entity_id = %evaluated.id(),
            event.actor_id = %actor.id(),
            event.result = event::result::SUCCESS,
            quote.is_compliant = is_compliant,
            "業者見積を評価"
        );

        Ok(evaluated)
    }

    /// 見積 3 件未満での進行を例外として承認する
    #[tracing::instrument(skip_all, fields(%requisition_id))]
    pub async fn approve_quote_exception(
        &self,
        requisition_id: &RequisitionId,
        justification: &str,
        actor_id: &UserId,
    ) -> Result<AuditLog, CoreError> {
        let actor = self.deps.load_actor(actor_id).await?;
        actor.require_role(Role::President)?;
        let requisition = self.load_requisition(requisition_id).await?;
        if requisition.status().is_terminal() {
            return Err(CoreError::Validation(format!(
                "{} の購買申請には例外を承認できません",
                requisition.status()
            )));
        }
        if self.has_quote_exception(requisition_id).await? {
            return Err(CoreError::Validation(
                "見積例外は承認済みです".to_string(),
            ));
        }
        let justification = Justification::new(justification)?;

        let now = self.deps.clock.now();
        let quotes = self.deps.quote_repo.find_by_requisition(requisition_id).await?;
        let audit = AuditLog::for_case(
            &CaseRef::from(requisition_id.clone()),
            AuditAction::QuoteExceptionApproved,
            Some(&actor),
            now,
        )
        .with_after_state(json!({ "responsive_quote_count": count_responsive(&quotes) }))
        .with_comment(Some(justification.as_str()));

        let mut tx = self.deps.begin_tx().await?;
        self.deps.audit_log_repo.insert(&mut tx, &audit).await?;
        self.deps.commit_tx(tx).await?;

        log_business_event!(
            event.category = event::category::PROCUREMENT,
            event.action = event::action::QUOTE_EXCEPTION_APPROVED,
            event.entity_type = event::entity_type::REQUISITION,
            event.entity_id = %requisition_id,
            event.actor_id = %actor.id(),
            event.result = event::result::SUCCESS,
            "見積例外を承認"
        );

        Ok(audit)
    }

    /// 業者を落札し、落札通知を発行する
    ///
    /// ## 処理フロー
    ///
    /// 1. ドメインで落札を判定（最安以外は理由必須）
    /// 2. 他の見積の落札フラグを外し、選んだ見積に付ける
    /// 3. 落札通知を発行し、購買申請を `awarded` に遷移
    /// 4. 見積・落札通知・申請・監査ログを 1 トランザクションで保存
    #[tracing::instrument(skip_all, fields(requisition_id = %input.requisition_id, quote_id = %input.quote_id))]
    pub async fn award_vendor(&self, input: AwardInput) -> Result<AwardResult, CoreError> {
        // 1. 判定
        let actor = self.load_officer(&input.actor_id).await?;
        let requisition = self.load_requisition(&input.requisition_id).await?;
        requisition.state().ensure_version(input.expected_version)?;
        let quotes = self
            .deps
            .quote_repo
            .find_by_requisition(&input.requisition_id)
            .await?;
        let has_exception = self.has_quote_exception(&input.requisition_id).await?;
        let decision = decide_award(
            &requisition,
            &quotes,
            &input.quote_id,
            input.justification.as_deref(),
            has_exception,
            &actor,
        )?;

        // 2. 落札フラグの付け替え（外す方を先に保存する）
        let now = self.deps.clock.now();
        let mut flag_updates = quotes
            .iter()
            .filter(|q| q.is_awarded() && q.id() != &decision.quote_id)
            .map(|q| (q.clone().with_awarded(false, now), q.version()))
            .collect::<Vec<_>>();
        if let Some(chosen) = quotes.iter().find(|q| q.id() == &decision.quote_id) {
            flag_updates.push((chosen.clone().with_awarded(true, now), chosen.version()));
        }

        // 3. 落札通知と遷移
        let ref_number = self
            .deps
            .ref_counter_repo
            .next_ref_number(RefPrefix::NoticeToAward, now.year())
            .await?;
        let notice = NoticeToAward::issue(
            ref_number,
            requisition.id().clone(),
            &decision,
            actor.id().clone(),
            now,
        );

        let case = Case::from(requisition);
        let case_ref = case.case_ref();
        let facts = TransitionFacts {
            responsive_quote_count: count_responsive(&quotes),
            has_quote_exception:    has_exception,
            awarded_quote_count:    1,
            ..TransitionFacts::default()
        };
        validate_transition(&case, CaseStatus::Awarded, input.expected_version, &facts)?;
        let from = case.status();
        let justification = decision.override_justification.as_ref().map(|j| j.as_str());
        let case = apply_transition(case, CaseStatus::Awarded, justification, now);

        let awarded_audit =
            AuditLog::for_case(&case_ref, AuditAction::VendorAwarded, Some(&actor), now)
                .with_after_state(json!({
                    "quote_id": decision.quote_id,
                    "vendor_id": decision.vendor_id,
                    "award_basis": decision.basis,
                    "nta_ref_number": notice.ref_number().to_string(),
                }))
                .with_comment(justification);
        let status_audit = AuditLog::status_changed(
            &case_ref,
            Some(&actor),
            from,
            CaseStatus::Awarded,
            justification,
            now,
        );

        // 4. 保存
        let mut tx = self.deps.begin_tx().await?;
        for (quote, expected) in &flag_updates {
            self.deps
                .quote_repo
                .update_with_version_check(&mut tx, quote, *expected)
                .await
                .map_err(save_error("業者見積"))?;
        }
        self.deps.nta_repo.insert(&mut tx, &notice).await?;
        self.deps
            .save_case(&mut tx, &case, input.expected_version)
            .await?;
        self.deps.audit_log_repo.insert(&mut tx, &awarded_audit).await?;
        self.deps.audit_log_repo.insert(&mut tx, &status_audit).await?;
        self.deps.commit_tx(tx).await?;

        log_business_event!(
            event.category = event::category::PROCUREMENT,
            event.action = event::action::VENDOR_AWARDED,
            event.entity_type = event::entity_type::REQUISITION,
            event.entity_id = %case_ref.as_uuid(),
            event.actor_id = %actor.id(),
            event.result = event::result::SUCCESS,
            award.basis = %decision.basis,
            award.quote_id = %decision.quote_id,
            nta.ref_number = %notice.ref_number(),
            "業者を落札"
        );

        self.deps
            .notify_status_changed(&case, from, CaseStatus::Awarded, justification)
            .await;

        let requisition = case
            .into_requisition()
            .ok_or_else(|| CoreError::Internal("購買申請ではない案件が返されました".to_string()))?;
        Ok(AwardResult {
            requisition,
            notice,
        })
    }

    /// 落札通知または発注書を業者へ送付済みにする
    ///
    /// - 落札通知: 通知を `mark_sent` にする。申請のバージョンは変わらない
    /// - 発注書: 落札見積から発注書を発行して送付済みにし、購買申請を
    ///   `awarded` から `po_issued` に遷移する（1 トランザクション）
    #[tracing::instrument(skip_all, fields(requisition_id = %input.requisition_id, document = ?input.document))]
    pub async fn mark_sent(&self, input: MarkSentInput) -> Result<MarkSentResult, CoreError> {
        let actor = self.load_officer(&input.actor_id).await?;
        let requisition = self.load_requisition(&input.requisition_id).await?;
        let requisition_id = &input.requisition_id;
        let case_ref = CaseRef::from(requisition_id.clone());
        let now = self.deps.clock.now();

        match input.document {
            MarkSentDocument::Nta => {
                let notice = self
                    .deps
                    .nta_repo
                    .find_by_requisition(requisition_id)
                    .await
                    .or_not_found("落札通知")?;
                let sent = notice.marked_sent(now)?;
                let audit = AuditLog {
                    entity_type: AuditEntityType::NoticeToAward,
                    entity_id: *sent.id().as_uuid(),
                    ..AuditLog::for_case(
                        &case_ref,
                        AuditAction::NtaMarkedAsSent,
                        Some(&actor),
                        now,
                    )
                }
                .with_states(
                    json!({ "status": NtaStatus::Issued }),
                    json!({ "status": sent.status(), "sent_at": sent.sent_at() }),
                );

                let mut tx = self.deps.begin_tx().await?;
                self.deps
                    .nta_repo
                    .update_status(&mut tx, &sent, NtaStatus::Issued)
                    .await
                    .map_err(save_error("落札通知"))?;
                self.deps.audit_log_repo.insert(&mut tx, &audit).await?;
                self.deps.commit_tx(tx).await?;

                log_business_event!(
                    event.category = event::category::PROCUREMENT,
                    event.action = event::action::NTA_MARKED_SENT,
                    event.entity_type = event::entity_type::NOTICE_TO_AWARD,
                    event.entity_id = %sent.id(),
                    event.actor_id = %actor.id(),
                    event.result = event::result::SUCCESS,
                    "落札通知を送付済みにした"
                );

                let purchase_order = self.deps.po_repo.find_by_requisition(requisition_id).await?;
                Ok(MarkSentResult {
                    requisition,
                    notice: Some(sent),
                    purchase_order,
                })
            }
            MarkSentDocument::PurchaseOrder => {
                requisition.state().ensure_version(input.expected_version)?;
                let quote = self
                    .deps
                    .quote_repo
                    .find_by_requisition(requisition_id)
                    .await?
                    .into_iter()
                    .find(VendorQuote::is_awarded)
                    .ok_or_else(|| {
                        CoreError::Validation("落札された見積がありません".to_string())
                    })?;

                let ref_number = self
                    .deps
                    .ref_counter_repo
                    .next_ref_number(RefPrefix::PurchaseOrder, now.year())
                    .await?;
                let order = PurchaseOrder::issue(
                    ref_number,
                    &requisition,
                    &quote,
                    input.terms,
                    actor.id().clone(),
                    now,
                )?
                .marked_sent(now)?;

                let issued_audit = AuditLog {
                    entity_type: AuditEntityType::PurchaseOrder,
                    entity_id: *order.id().as_uuid(),
                    ..AuditLog::for_case(&case_ref, AuditAction::Created, Some(&actor), now)
                }
                .with_after_state(json!({
                    "ref_number": order.ref_number().to_string(),
                    "vendor_id": order.vendor_id(),
                    "awarded_quote_id": order.awarded_quote_id(),
                    "grand_total": order.grand_total(),
                    "delivery_terms": order.terms().delivery_terms,
                    "payment_terms": order.terms().payment_terms,
                }));
                let sent_audit =
                    AuditLog::for_case(&case_ref, AuditAction::PoMarkedAsSent, Some(&actor), now)
                        .with_after_state(json!({
                            "po_ref_number": order.ref_number().to_string(),
                            "sent_at": order.sent_at(),
                        }));

                let case = self
                    .deps
                    .transition_case_with(
                        Case::from(requisition),
                        CaseStatus::PoIssued,
                        input.expected_version,
                        &actor,
                        None,
                        vec![
                            TransitionWrite::IssuePurchaseOrder(order.clone()),
                            TransitionWrite::Audit(issued_audit),
                            TransitionWrite::Audit(sent_audit),
                        ],
                    )
                    .await?;

                log_business_event!(
                    event.category = event::category::PROCUREMENT,
                    event.action = event::action::PO_MARKED_SENT,
                    event.entity_type = event::entity_type::PURCHASE_ORDER,
                    event.entity_id = %order.id(),
                    event.actor_id = %actor.id(),
                    event.result = event::result::SUCCESS,
                    po.ref_number = %order.ref_number(),
                    po.grand_total = %order.grand_total(),
                    "発注書を発行し送付済みにした"
                );

                let requisition = case.into_requisition().ok_or_else(|| {
                    CoreError::Internal("購買申請ではない案件が返されました".to_string())
                })?;
                let notice = self.deps.nta_repo.find_by_requisition(requisition_id).await?;
                Ok(MarkSentResult {
                    requisition,
                    notice,
                    purchase_order: Some(order),
                })
            }
        }
    }

    /// 発注書に対する納品を検収として記録する
    ///
    /// 分納を受け付ける。明細ごとの検収累計は発注数量を超えられない。
    /// 購買申請のバージョンは変わらない。
    #[tracing::instrument(skip_all, fields(requisition_id = %input.requisition_id))]
    pub async fn record_goods_receipt(
        &self,
        input: RecordGoodsReceiptInput,
    ) -> Result<GoodsReceipt, CoreError> {
        let actor = self.load_officer(&input.actor_id).await?;
        let requisition = self.load_requisition(&input.requisition_id).await?;
        if requisition.status() != CaseStatus::PoIssued {
            return Err(CoreError::Validation(format!(
                "検収は発注済みの購買申請にのみ記録できます（現在: {}）",
                requisition.status()
            )));
        }
        let order = self
            .deps
            .po_repo
            .find_by_requisition(&input.requisition_id)
            .await
            .or_not_found("発注書")?;
        let previous = self.deps.grn_repo.find_by_purchase_order(order.id()).await?;

        let now = self.deps.clock.now();
        let ref_number = self
            .deps
            .ref_counter_repo
            .next_ref_number(RefPrefix::GoodsReceipt, now.year())
            .await?;
        let receipt = GoodsReceipt::record(
            ref_number,
            &order,
            &previous,
            input.content,
            actor.id().clone(),
            now,
        )?;

        let all_receipts = previous
            .iter()
            .cloned()
            .chain(std::iter::once(receipt.clone()))
            .collect::<Vec<_>>();
        let fully_received = order.is_fully_received(&all_receipts);
        let audit = AuditLog {
            entity_type: AuditEntityType::GoodsReceipt,
            entity_id: *receipt.id().as_uuid(),
            ..AuditLog::for_case(
                &CaseRef::from(input.requisition_id.clone()),
                AuditAction::GoodsReceived,
                Some(&actor),
                now,
            )
        }
        .with_after_state(json!({
            "ref_number": receipt.ref_number().to_string(),
            "purchase_order_id": order.id(),
            "received_date": receipt.received_date(),
            "lines": receipt
                .lines()
                .iter()
                .map(|line| json!({
                    "po_line_id": line.po_line_id,
                    "quantity_received": line.quantity_received,
                }))
                .collect::<Vec<_>>(),
            "fully_received": fully_received,
        }))
        .with_comment(receipt.remarks());

        let mut tx = self.deps.begin_tx().await?;
        self.deps
            .grn_repo
            .insert(&mut tx, &receipt)
            .await
            .map_err(save_error("発注書"))?;
        self.deps.audit_log_repo.insert(&mut tx, &audit).await?;
        self.deps.commit_tx(tx).await?;

        log_business_event!(
            event.category = event::category::PROCUREMENT,
            event.action = event::action::GOODS_RECEIVED,
            event.entity_type = event::entity_type::GOODS_RECEIPT,
            event.entity_id = %receipt.id(),
            event.actor_id = %actor.id(),
            event.result = event::result::SUCCESS,
            grn.ref_number = %receipt.ref_number(),
            po.ref_number = %order.ref_number(),
            po.fully_received = fully_received,
            "検収を記録"
        );

        Ok(receipt)
    }

    /// 購買申請の発注書と検収記録を取得する
    #[tracing::instrument(skip_all, fields(%requisition_id))]
    pub async fn purchase_order(
        &self,
        requisition_id: &RequisitionId,
        viewer_id: &UserId,
    ) -> Result<PurchaseOrderDetail, CoreError> {
        let viewer = self.deps.load_viewer(viewer_id).await?;
        let requisition = self.load_requisition(requisition_id).await?;
        ensure_can_view(&viewer, requisition.requested_by(), requisition.department())?;

        let order = self
            .deps
            .po_repo
            .find_by_requisition(requisition_id)
            .await
            .or_not_found("発注書")?;
        let receipts = self.deps.grn_repo.find_by_purchase_order(order.id()).await?;

        Ok(PurchaseOrderDetail { order, receipts })
    }

    /// 納品完了として購買申請を `completed` にする
    ///
    /// 発注書の全明細が検収済みであることが前提。発注書も同じトランザクションで完了にする。
    #[tracing::instrument(skip_all, fields(%requisition_id, %expected_version))]
    pub async fn complete_fulfillment(
        &self,
        requisition_id: &RequisitionId,
        comment: Option<&str>,
        expected_version: Version,
        actor_id: &UserId,
    ) -> Result<Requisition, CoreError> {
        let actor = self.load_officer(actor_id).await?;
        let requisition = self.load_requisition(requisition_id).await?;

        let case = self
            .deps
            .transition_case(
                Case::from(requisition),
                CaseStatus::Completed,
                expected_version,
                &actor,
                comment,
            )
            .await?;

        log_business_event!(
            event.category = event::category::CASE,
            event.action = event::action::CASE_COMPLETED,
            event.entity_type = event::entity_type::REQUISITION,
            event.entity_id = %requisition_id,
            event.actor_id = %actor.id(),
            event.result = event::result::SUCCESS,
            "購買申請が完了"
        );

        case.into_requisition()
            .ok_or_else(|| CoreError::Internal("購買申請ではない案件が返されました".to_string()))
    }
}
