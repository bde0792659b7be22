//! # テスト用モック
//!
//! ユースケーステストで使用するインメモリのリポジトリ・送信口。
//! `test-utils` feature を有効にすることで、他クレートからも利用可能。
//!
//! ```toml
//! [dev-dependencies]
//! procureflow-infra = { workspace = true, features = ["test-utils"] }
//! ```
//!
//! 条件付き UPDATE の 0 行更新は、PostgreSQL 実装と同じく Conflict を返す。
//! トランザクションは模倣しないため、途中で失敗した操作の書き込みは残る。

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use procureflow_domain::{
    approval::{ApprovalStep, ApprovalStepId, StepAction},
    audit_log::{AuditAction, AuditEntityType, AuditLog},
    award::{NoticeToAward, NtaStatus},
    case::{CaseRef, CaseStatus},
    notification::{EmailMessage, NotificationError},
    payment_request::{PaymentRequest, PaymentRequestId},
    purchase_order::{GoodsReceipt, PoStatus, PurchaseOrder, PurchaseOrderId},
    quote::{VendorQuote, VendorQuoteId},
    requisition::{Requisition, RequisitionId},
    role::Role,
    user::{User, UserId},
    value_objects::{RefNumber, RefPrefix, Version},
    vendor::{Vendor, VendorId},
};
use uuid::Uuid;

use crate::{
    db::{TransactionManager, TxContext},
    error::InfraError,
    notification::NotificationSender,
    repository::{
        ApprovalStepRepository,
        AuditLogRepository,
        GoodsReceiptRepository,
        NoticeToAwardRepository,
        PaymentRequestRepository,
        PurchaseOrderRepository,
        RefNumberCounterRepository,
        RequisitionRepository,
        UserRepository,
        VendorQuoteRepository,
        VendorRepository,
    },
};

// ===== MockTransactionManager =====

#[derive(Clone, Copy, Default)]
pub struct MockTransactionManager;

#[async_trait]
impl TransactionManager for MockTransactionManager {
    async fn begin(&self) -> Result<TxContext, InfraError> {
        Ok(TxContext::mock())
    }
}

// ===== MockRequisitionRepository =====

#[derive(Clone, Default)]
pub struct MockRequisitionRepository {
    requisitions: Arc<Mutex<Vec<Requisition>>>,
}

impl MockRequisitionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, requisition: Requisition) {
        self.requisitions.lock().unwrap().push(requisition);
    }

    pub fn get(&self, id: &RequisitionId) -> Option<Requisition> {
        self.requisitions
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id() == id)
            .cloned()
    }
}

#[async_trait]
impl RequisitionRepository for MockRequisitionRepository {
    async fn insert(
        &self,
        _tx: &mut TxContext,
        requisition: &Requisition,
    ) -> Result<(), InfraError> {
        self.requisitions.lock().unwrap().push(requisition.clone());
        Ok(())
    }

    async fn update_with_version_check(
        &self,
        _tx: &mut TxContext,
        requisition: &Requisition,
        expected_version: Version,
    ) -> Result<(), InfraError> {
        let mut requisitions = self.requisitions.lock().unwrap();
        let Some(stored) = requisitions
            .iter_mut()
            .find(|r| r.id() == requisition.id() && r.state().version() == expected_version)
        else {
            return Err(InfraError::conflict(
                "Requisition",
                requisition.id().to_string(),
            ));
        };
        *stored = requisition.clone();
        Ok(())
    }

    async fn replace_line_items(
        &self,
        _tx: &mut TxContext,
        requisition: &Requisition,
    ) -> Result<(), InfraError> {
        let mut requisitions = self.requisitions.lock().unwrap();
        if let Some(stored) = requisitions.iter_mut().find(|r| r.id() == requisition.id()) {
            *stored = requisition.clone();
        }
        Ok(())
    }

    async fn find_by_id(&self, id: &RequisitionId) -> Result<Option<Requisition>, InfraError> {
        Ok(self.get(id))
    }

    async fn find_all(&self, status: Option<CaseStatus>) -> Result<Vec<Requisition>, InfraError> {
        let requisitions = self.requisitions.lock().unwrap();
        Ok(requisitions
            .iter()
            .filter(|r| status.is_none_or(|s| r.status() == s))
            .cloned()
            .collect())
    }
}

// ===== MockPaymentRequestRepository =====

#[derive(Clone, Default)]
pub struct MockPaymentRequestRepository {
    payment_requests: Arc<Mutex<Vec<PaymentRequest>>>,
}

impl MockPaymentRequestRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, payment_request: PaymentRequest) {
        self.payment_requests.lock().unwrap().push(payment_request);
    }

    pub fn get(&self, id: &PaymentRequestId) -> Option<PaymentRequest> {
        self.payment_requests
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id() == id)
            .cloned()
    }
}

#[async_trait]
impl PaymentRequestRepository for MockPaymentRequestRepository {
    async fn insert(
        &self,
        _tx: &mut TxContext,
        payment_request: &PaymentRequest,
    ) -> Result<(), InfraError> {
        self.payment_requests
            .lock()
            .unwrap()
            .push(payment_request.clone());
        Ok(())
    }

    async fn update_with_version_check(
        &self,
        _tx: &mut TxContext,
        payment_request: &PaymentRequest,
        expected_version: Version,
    ) -> Result<(), InfraError> {
        let mut payment_requests = self.payment_requests.lock().unwrap();
        let Some(stored) = payment_requests.iter_mut().find(|p| {
            p.id() == payment_request.id() && p.state().version() == expected_version
        }) else {
            return Err(InfraError::conflict(
                "PaymentRequest",
                payment_request.id().to_string(),
            ));
        };
        *stored = payment_request.clone();
        Ok(())
    }

    async fn replace_line_items(
        &self,
        _tx: &mut TxContext,
        payment_request: &PaymentRequest,
    ) -> Result<(), InfraError> {
        let mut payment_requests = self.payment_requests.lock().unwrap();
        if let Some(stored) = payment_requests
            .iter_mut()
            .find(|p| p.id() == payment_request.id())
        {
            *stored = payment_request.clone();
        }
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &PaymentRequestId,
    ) -> Result<Option<PaymentRequest>, InfraError> {
        Ok(self.get(id))
    }

    async fn find_all(
        &self,
        status: Option<CaseStatus>,
    ) -> Result<Vec<PaymentRequest>, InfraError> {
        let payment_requests = self.payment_requests.lock().unwrap();
        Ok(payment_requests
            .iter()
            .filter(|p| status.is_none_or(|s| p.status() == s))
            .cloned()
            .collect())
    }
}

// ===== MockApprovalStepRepository =====

/// 保留中の案件は [`MockApprovalStepRepository::find_overdue`] の対象外にするため、
/// 案件リポジトリを参照できるようにしている。
#[derive(Clone, Default)]
pub struct MockApprovalStepRepository {
    steps:            Arc<Mutex<Vec<ApprovalStep>>>,
    requisitions:     Option<MockRequisitionRepository>,
    payment_requests: Option<MockPaymentRequestRepository>,
}

impl MockApprovalStepRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 案件のステータスを見て SLA 超過の対象を絞る
    pub fn with_cases(
        requisitions: MockRequisitionRepository,
        payment_requests: MockPaymentRequestRepository,
    ) -> Self {
        Self {
            steps:            Arc::default(),
            requisitions:     Some(requisitions),
            payment_requests: Some(payment_requests),
        }
    }

    pub fn add(&self, step: ApprovalStep) {
        self.steps.lock().unwrap().push(step);
    }

    pub fn all(&self) -> Vec<ApprovalStep> {
        let mut steps = self.steps.lock().unwrap().clone();
        steps.sort_by_key(ApprovalStep::step_number);
        steps
    }

    fn case_on_hold(&self, case: &CaseRef) -> bool {
        let status = match case {
            CaseRef::Requisition(id) => self
                .requisitions
                .as_ref()
                .and_then(|repo| repo.get(id))
                .map(|r| r.status()),
            CaseRef::PaymentRequest(id) => self
                .payment_requests
                .as_ref()
                .and_then(|repo| repo.get(id))
                .map(|p| p.status()),
        };
        status == Some(CaseStatus::OnHold)
    }
}

#[async_trait]
impl ApprovalStepRepository for MockApprovalStepRepository {
    async fn insert(&self, _tx: &mut TxContext, step: &ApprovalStep) -> Result<(), InfraError> {
        let mut steps = self.steps.lock().unwrap();
        if steps
            .iter()
            .any(|s| s.case() == step.case() && s.step_number() == step.step_number())
        {
            return Err(InfraError::invalid_input("ステップ番号が重複しています"));
        }
        steps.push(step.clone());
        Ok(())
    }

    async fn record_action(
        &self,
        _tx: &mut TxContext,
        step: &ApprovalStep,
        expected_version: Version,
    ) -> Result<(), InfraError> {
        let mut steps = self.steps.lock().unwrap();
        let Some(stored) = steps.iter_mut().find(|s| {
            s.id() == step.id() && s.action() == StepAction::Pending && s.version() == expected_version
        }) else {
            return Err(InfraError::conflict("ApprovalStep", step.id().to_string()));
        };
        *stored = step.clone();
        Ok(())
    }

    async fn update_with_version_check(
        &self,
        _tx: &mut TxContext,
        step: &ApprovalStep,
        expected_version: Version,
    ) -> Result<(), InfraError> {
        let mut steps = self.steps.lock().unwrap();
        let Some(stored) = steps
            .iter_mut()
            .find(|s| s.id() == step.id() && s.version() == expected_version)
        else {
            return Err(InfraError::conflict("ApprovalStep", step.id().to_string()));
        };
        *stored = step.clone();
        Ok(())
    }

    async fn delete_pending(
        &self,
        _tx: &mut TxContext,
        ids: &[ApprovalStepId],
    ) -> Result<(), InfraError> {
        let mut steps = self.steps.lock().unwrap();
        let deletable = steps
            .iter()
            .filter(|s| ids.contains(s.id()) && s.is_pending())
            .count();
        if deletable != ids.len() {
            let ids = ids.iter().map(ToString::to_string).collect::<Vec<_>>();
            return Err(InfraError::conflict("ApprovalStep", ids.join(",")));
        }
        steps.retain(|s| !ids.contains(s.id()));
        Ok(())
    }

    async fn find_by_id(&self, id: &ApprovalStepId) -> Result<Option<ApprovalStep>, InfraError> {
        let steps = self.steps.lock().unwrap();
        Ok(steps.iter().find(|s| s.id() == id).cloned())
    }

    async fn find_by_case(&self, case: &CaseRef) -> Result<Vec<ApprovalStep>, InfraError> {
        Ok(self
            .all()
            .into_iter()
            .filter(|s| s.case() == case)
            .collect())
    }

    async fn find_overdue(&self, now: DateTime<Utc>) -> Result<Vec<ApprovalStep>, InfraError> {
        let steps = self.all();
        let awaiting_predecessor = |step: &ApprovalStep| {
            steps.iter().any(|e| {
                e.case() == step.case()
                    && e.cycle() == step.cycle()
                    && e.position() < step.position()
                    && e.action() != StepAction::Approved
            })
        };
        let mut overdue = steps
            .iter()
            .filter(|s| {
                s.is_overdue(now) && !self.case_on_hold(s.case()) && !awaiting_predecessor(s)
            })
            .cloned()
            .collect::<Vec<_>>();
        overdue.sort_by_key(|s| (s.sla_deadline(), s.step_number()));
        Ok(overdue)
    }
}

// ===== MockVendorRepository =====

#[derive(Clone, Default)]
pub struct MockVendorRepository {
    vendors: Arc<Mutex<Vec<Vendor>>>,
}

impl MockVendorRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, vendor: Vendor) {
        self.vendors.lock().unwrap().push(vendor);
    }
}

#[async_trait]
impl VendorRepository for MockVendorRepository {
    async fn insert(&self, _tx: &mut TxContext, vendor: &Vendor) -> Result<(), InfraError> {
        self.add(vendor.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &VendorId) -> Result<Option<Vendor>, InfraError> {
        let vendors = self.vendors.lock().unwrap();
        Ok(vendors.iter().find(|v| v.id() == id).cloned())
    }

    async fn find_by_ids(&self, ids: &[VendorId]) -> Result<Vec<Vendor>, InfraError> {
        let vendors = self.vendors.lock().unwrap();
        Ok(vendors
            .iter()
            .filter(|v| ids.contains(v.id()))
            .cloned()
            .collect())
    }
}

// ===== MockVendorQuoteRepository =====

#[derive(Clone, Default)]
pub struct MockVendorQuoteRepository {
    quotes: Arc<Mutex<Vec<VendorQuote>>>,
}

impl MockVendorQuoteRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, quote: VendorQuote) {
        self.quotes.lock().unwrap().push(quote);
    }

    pub fn all(&self) -> Vec<VendorQuote> {
        self.quotes.lock().unwrap().clone()
    }
}

#[async_trait]
impl VendorQuoteRepository for MockVendorQuoteRepository {
    async fn insert(&self, _tx: &mut TxContext, quote: &VendorQuote) -> Result<(), InfraError> {
        let mut quotes = self.quotes.lock().unwrap();
        if quotes.iter().any(|q| {
            q.requisition_id() == quote.requisition_id() && q.vendor_id() == quote.vendor_id()
        }) {
            return Err(InfraError::invalid_input("この業者の見積は登録済みです"));
        }
        quotes.push(quote.clone());
        Ok(())
    }

    async fn update_with_version_check(
        &self,
        _tx: &mut TxContext,
        quote: &VendorQuote,
        expected_version: Version,
    ) -> Result<(), InfraError> {
        let mut quotes = self.quotes.lock().unwrap();
        if quote.is_awarded()
            && quotes.iter().any(|q| {
                q.requisition_id() == quote.requisition_id() && q.id() != quote.id() && q.is_awarded()
            })
        {
            return Err(InfraError::invalid_input("落札済みの見積が既にあります"));
        }
        let Some(stored) = quotes
            .iter_mut()
            .find(|q| q.id() == quote.id() && q.version() == expected_version)
        else {
            return Err(InfraError::conflict("VendorQuote", quote.id().to_string()));
        };
        *stored = quote.clone();
        Ok(())
    }

    async fn find_by_id(&self, id: &VendorQuoteId) -> Result<Option<VendorQuote>, InfraError> {
        let quotes = self.quotes.lock().unwrap();
        Ok(quotes.iter().find(|q| q.id() == id).cloned())
    }

    async fn find_by_requisition(
        &self,
        requisition_id: &RequisitionId,
    ) -> Result<Vec<VendorQuote>, InfraError> {
        let quotes = self.quotes.lock().unwrap();
        Ok(quotes
            .iter()
            .filter(|q| q.requisition_id() == requisition_id)
            .cloned()
            .collect())
    }
}

// ===== MockNoticeToAwardRepository =====

#[derive(Clone, Default)]
pub struct MockNoticeToAwardRepository {
    notices: Arc<Mutex<Vec<NoticeToAward>>>,
}

impl MockNoticeToAwardRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<NoticeToAward> {
        self.notices.lock().unwrap().clone()
    }
}

#[async_trait]
impl NoticeToAwardRepository for MockNoticeToAwardRepository {
    async fn insert(&self, _tx: &mut TxContext, notice: &NoticeToAward) -> Result<(), InfraError> {
        let mut notices = self.notices.lock().unwrap();
        if notices
            .iter()
            .any(|n| n.requisition_id() == notice.requisition_id())
        {
            return Err(InfraError::invalid_input(
                "この購買申請の落札通知は発行済みです",
            ));
        }
        notices.push(notice.clone());
        Ok(())
    }

    async fn update_status(
        &self,
        _tx: &mut TxContext,
        notice: &NoticeToAward,
        expected_status: NtaStatus,
    ) -> Result<(), InfraError> {
        let mut notices = self.notices.lock().unwrap();
        let Some(stored) = notices
            .iter_mut()
            .find(|n| n.id() == notice.id() && n.status() == expected_status)
        else {
            return Err(InfraError::conflict("NoticeToAward", notice.id().to_string()));
        };
        *stored = notice.clone();
        Ok(())
    }

    async fn find_by_requisition(
        &self,
        requisition_id: &RequisitionId,
    ) -> Result<Option<NoticeToAward>, InfraError> {
        let notices = self.notices.lock().unwrap();
        Ok(notices
            .iter()
            .find(|n| n.requisition_id() == requisition_id)
            .cloned())
    }
}

// ===== MockPurchaseOrderRepository =====

#[derive(Clone, Default)]
pub struct MockPurchaseOrderRepository {
    orders: Arc<Mutex<Vec<PurchaseOrder>>>,
}

impl MockPurchaseOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, order: PurchaseOrder) {
        self.orders.lock().unwrap().push(order);
    }

    pub fn all(&self) -> Vec<PurchaseOrder> {
        self.orders.lock().unwrap().clone()
    }

    fn find_by_id(&self, id: &PurchaseOrderId) -> Option<PurchaseOrder> {
        let orders = self.orders.lock().unwrap();
        orders.iter().find(|o| o.id() == id).cloned()
    }
}

#[async_trait]
impl PurchaseOrderRepository for MockPurchaseOrderRepository {
    async fn insert(&self, _tx: &mut TxContext, order: &PurchaseOrder) -> Result<(), InfraError> {
        let mut orders = self.orders.lock().unwrap();
        if orders
            .iter()
            .any(|o| o.requisition_id() == order.requisition_id())
        {
            return Err(InfraError::invalid_input(
                "この購買申請の発注書は発行済みです",
            ));
        }
        orders.push(order.clone());
        Ok(())
    }

    async fn update_status(
        &self,
        _tx: &mut TxContext,
        order: &PurchaseOrder,
        expected_status: PoStatus,
    ) -> Result<(), InfraError> {
        let mut orders = self.orders.lock().unwrap();
        let Some(stored) = orders
            .iter_mut()
            .find(|o| o.id() == order.id() && o.status() == expected_status)
        else {
            return Err(InfraError::conflict("PurchaseOrder", order.id().to_string()));
        };
        *stored = order.clone();
        Ok(())
    }

    async fn find_by_requisition(
        &self,
        requisition_id: &RequisitionId,
    ) -> Result<Option<PurchaseOrder>, InfraError> {
        let orders = self.orders.lock().unwrap();
        Ok(orders
            .iter()
            .find(|o| o.requisition_id() == requisition_id)
            .cloned())
    }
}

// ===== MockGoodsReceiptRepository =====

/// 検収累計の確認のため、発注書リポジトリを参照する。
#[derive(Clone, Default)]
pub struct MockGoodsReceiptRepository {
    receipts: Arc<Mutex<Vec<GoodsReceipt>>>,
    orders:   MockPurchaseOrderRepository,
}

impl MockGoodsReceiptRepository {
    pub fn new(orders: MockPurchaseOrderRepository) -> Self {
        Self {
            receipts: Arc::default(),
            orders,
        }
    }

    pub fn all(&self) -> Vec<GoodsReceipt> {
        self.receipts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GoodsReceiptRepository for MockGoodsReceiptRepository {
    async fn insert(&self, _tx: &mut TxContext, receipt: &GoodsReceipt) -> Result<(), InfraError> {
        let mut receipts = self.receipts.lock().unwrap();
        if let Some(order) = self.orders.find_by_id(receipt.purchase_order_id()) {
            let mut merged = receipts
                .iter()
                .filter(|r| r.purchase_order_id() == order.id())
                .cloned()
                .collect::<Vec<_>>();
            merged.push(receipt.clone());
            let received = order.received_quantities(&merged);
            let over_received = order
                .lines()
                .iter()
                .any(|line| received.get(line.id()).is_some_and(|q| *q > line.quantity()));
            if over_received {
                return Err(InfraError::conflict("PurchaseOrder", order.id().to_string()));
            }
        }
        receipts.push(receipt.clone());
        Ok(())
    }

    async fn find_by_purchase_order(
        &self,
        purchase_order_id: &PurchaseOrderId,
    ) -> Result<Vec<GoodsReceipt>, InfraError> {
        let receipts = self.receipts.lock().unwrap();
        Ok(receipts
            .iter()
            .filter(|r| r.purchase_order_id() == purchase_order_id)
            .cloned()
            .collect())
    }
}

// ===== MockAuditLogRepository =====

#[derive(Clone, Default)]
pub struct MockAuditLogRepository {
    logs: Arc<Mutex<Vec<AuditLog>>>,
}

impl MockAuditLogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, log: AuditLog) {
        self.logs.lock().unwrap().push(log);
    }

    pub fn all(&self) -> Vec<AuditLog> {
        self.logs.lock().unwrap().clone()
    }

    pub fn with_action(&self, action: AuditAction) -> Vec<AuditLog> {
        self.all()
            .into_iter()
            .filter(|log| log.action == action)
            .collect()
    }
}

#[async_trait]
impl AuditLogRepository for MockAuditLogRepository {
    async fn insert(&self, _tx: &mut TxContext, log: &AuditLog) -> Result<(), InfraError> {
        self.add(log.clone());
        Ok(())
    }

    async fn find_by_entity(
        &self,
        entity_type: AuditEntityType,
        entity_id: &Uuid,
    ) -> Result<Vec<AuditLog>, InfraError> {
        Ok(self
            .all()
            .into_iter()
            .filter(|log| log.entity_type == entity_type && &log.entity_id == entity_id)
            .collect())
    }

    async fn exists(
        &self,
        entity_type: AuditEntityType,
        entity_id: &Uuid,
        action: AuditAction,
    ) -> Result<bool, InfraError> {
        let logs = self.logs.lock().unwrap();
        Ok(logs.iter().any(|log| {
            log.entity_type == entity_type && &log.entity_id == entity_id && log.action == action
        }))
    }
}

// ===== MockUserRepository =====

#[derive(Clone, Default)]
pub struct MockUserRepository {
    users: Arc<Mutex<Vec<User>>>,
}

impl MockUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, user: User) {
        self.users.lock().unwrap().push(user);
    }
}

#[async_trait]
impl UserRepository for MockUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, InfraError> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().find(|u| u.id() == id).cloned())
    }

    async fn find_active_by_role(&self, role: Role) -> Result<Vec<User>, InfraError> {
        let users = self.users.lock().unwrap();
        Ok(users
            .iter()
            .filter(|u| u.role() == role && u.is_active())
            .cloned()
            .collect())
    }
}

// ===== MockRefNumberCounterRepository =====

/// 呼び出しごとに種別 × 年のカウンターをインクリメントして返す。
#[derive(Clone, Default)]
pub struct MockRefNumberCounterRepository {
    counters: Arc<Mutex<Vec<(RefPrefix, i32, i64)>>>,
}

impl MockRefNumberCounterRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RefNumberCounterRepository for MockRefNumberCounterRepository {
    async fn next_ref_number(
        &self,
        prefix: RefPrefix,
        year: i32,
    ) -> Result<RefNumber, InfraError> {
        let mut counters = self.counters.lock().unwrap();
        let sequence = match counters
            .iter_mut()
            .find(|(p, y, _)| *p == prefix && *y == year)
        {
            Some((_, _, last)) => {
                *last += 1;
                *last
            }
            None => {
                counters.push((prefix, year, 1));
                1
            }
        };
        Ok(RefNumber::new(prefix, year, sequence).unwrap())
    }
}

// ===== MockNotificationSender =====

/// 送信したメールを記録する。`fail_with` で送信失敗を再現できる。
#[derive(Clone, Default)]
pub struct MockNotificationSender {
    sent:    Arc<Mutex<Vec<EmailMessage>>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl MockNotificationSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn sent_emails(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSender for MockNotificationSender {
    async fn send_email(&self, email: &EmailMessage) -> Result<(), NotificationError> {
        if let Some(message) = self.failure.lock().unwrap().clone() {
            return Err(NotificationError::SendFailed(message));
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}
