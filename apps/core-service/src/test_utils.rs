//! ユースケーステストのセットアップ
//!
//! インメモリのモックリポジトリと固定時刻で [`UseCaseDeps`] を組み立てる。
//! モックは `Clone` で状態を共有するため、テストから直接データを投入・検証できる。
//!
//! ```ignore
//! let ctx = TestContext::new();
//! let requester = ctx.add_user(Role::Requester);
//! let sut = RequisitionUseCaseImpl::new(ctx.deps());
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use procureflow_domain::{
    clock::FixedClock,
    role::Role,
    user::{Email, User, UserId, UserRecord},
};
use procureflow_infra::mock::{
    MockApprovalStepRepository,
    MockAuditLogRepository,
    MockGoodsReceiptRepository,
    MockNoticeToAwardRepository,
    MockNotificationSender,
    MockPaymentRequestRepository,
    MockPurchaseOrderRepository,
    MockRefNumberCounterRepository,
    MockRequisitionRepository,
    MockTransactionManager,
    MockUserRepository,
    MockVendorQuoteRepository,
    MockVendorRepository,
};

use crate::usecase::{NotificationService, TemplateRenderer, UseCaseDeps};

/// テスト開始時刻（2026-03-02 09:00 UTC）
pub const TEST_NOW: i64 = 1_772_442_000;

/// ユースケーステストの共有状態
pub struct TestContext {
    pub now:              DateTime<Utc>,
    pub clock:            Arc<FixedClock>,
    pub requisitions:     MockRequisitionRepository,
    pub payment_requests: MockPaymentRequestRepository,
    pub steps:            MockApprovalStepRepository,
    pub quotes:           MockVendorQuoteRepository,
    pub vendors:          MockVendorRepository,
    pub notices:          MockNoticeToAwardRepository,
    pub purchase_orders:  MockPurchaseOrderRepository,
    pub goods_receipts:   MockGoodsReceiptRepository,
    pub audit_logs:       MockAuditLogRepository,
    pub users:            MockUserRepository,
    pub ref_counter:      MockRefNumberCounterRepository,
    pub sender:           MockNotificationSender,
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TestContext {
    pub fn new() -> Self {
        let now = DateTime::from_timestamp(TEST_NOW, 0).expect("有効な時刻");
        let requisitions = MockRequisitionRepository::new();
        let payment_requests = MockPaymentRequestRepository::new();
        let steps =
            MockApprovalStepRepository::with_cases(requisitions.clone(), payment_requests.clone());
        let purchase_orders = MockPurchaseOrderRepository::new();
        let goods_receipts = MockGoodsReceiptRepository::new(purchase_orders.clone());

        Self {
            now,
            clock: Arc::new(FixedClock::new(now)),
            requisitions,
            payment_requests,
            steps,
            quotes: MockVendorQuoteRepository::new(),
            vendors: MockVendorRepository::new(),
            notices: MockNoticeToAwardRepository::new(),
            purchase_orders,
            goods_receipts,
            audit_logs: MockAuditLogRepository::new(),
            users: MockUserRepository::new(),
            ref_counter: MockRefNumberCounterRepository::new(),
            sender: MockNotificationSender::new(),
        }
    }

    /// モックを注入した依存一式
    pub fn deps(&self) -> UseCaseDeps {
        let notifier = NotificationService::new(
            Arc::new(self.sender.clone()),
            TemplateRenderer::new().expect("テンプレートの読み込みに失敗"),
            "http://localhost:5173".to_string(),
        );

        UseCaseDeps {
            requisition_repo:        Arc::new(self.requisitions.clone()),
            payment_request_repo:    Arc::new(self.payment_requests.clone()),
            step_repo:               Arc::new(self.steps.clone()),
            quote_repo:              Arc::new(self.quotes.clone()),
            vendor_repo:             Arc::new(self.vendors.clone()),
            nta_repo:                Arc::new(self.notices.clone()),
            po_repo:                 Arc::new(self.purchase_orders.clone()),
            grn_repo:                Arc::new(self.goods_receipts.clone()),
            audit_log_repo:          Arc::new(self.audit_logs.clone()),
            user_repo:               Arc::new(self.users.clone()),
            ref_counter_repo:        Arc::new(self.ref_counter.clone()),
            clock:                   self.clock.clone(),
            tx_manager:              Arc::new(MockTransactionManager),
            notifier:                Arc::new(notifier),
            required_document_types: vec!["purchase_request_form".to_string()],
        }
    }

    /// 有効なユーザーを登録する
    pub fn add_user(&self, role: Role) -> User {
        self.add_user_with_id(UserId::new(), role, true)
    }

    /// ID を指定してユーザーを登録する（既存案件の申請者を用意する場合）
    pub fn add_user_with_id(&self, id: UserId, role: Role, is_active: bool) -> User {
        self.insert_user(id, role, is_active, None)
    }

    /// 部門に所属する有効なユーザーを登録する
    pub fn add_user_in(&self, role: Role, department: &str) -> User {
        self.insert_user(UserId::new(), role, true, Some(department.to_string()))
    }

    fn insert_user(
        &self,
        id: UserId,
        role: Role,
        is_active: bool,
        department: Option<String>,
    ) -> User {
        let user = User::from_db(UserRecord {
            email: Email::new(format!("{}@example.com", id)).expect("有効なメールアドレス"),
            id,
            name: role.label().to_string(),
            role,
            is_active,
            department,
        });
        self.users.add(user.clone());
        user
    }
}
