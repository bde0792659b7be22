//! # ユースケース層
//!
//! Core Service のビジネスロジックを実装する。
//!
//! ## 設計方針
//!
//! - **依存性注入**: リポジトリ、時刻、トランザクションを [`UseCaseDeps`] にまとめて注入
//! - **薄いハンドラ**: ハンドラは薄く保ち、ロジックはユースケースに集約
//! - **判定はドメインで**: ユースケースは読み込み → ドメインで判定 → 1 トランザクションで保存
//! - **通知はコミット後**: 送信失敗は業務処理を失敗させない
//!
//! ## モジュール構成
//!
//! - `requisition`: 購買申請の起票・編集・申請・遷移・参照
//! - `payment_request`: 支払申請の起票・編集・申請・遷移・参照
//! - `approval`: 承認ステップへの判断と保留の再開
//! - `procurement`: 見積、落札、送付、発注書、検収、完了
//! - `sla`: SLA 超過チェック
//! - `notification`: メール通知

pub(crate) mod helpers;

pub mod approval;
pub mod lifecycle;
pub mod notification;
pub mod payment_request;
pub mod procurement;
pub mod requisition;
pub mod sla;

use std::sync::Arc;

pub use approval::{ActInput, ApprovalUseCaseImpl};
pub use notification::{NotificationService, TemplateRenderer};
pub use payment_request::{PaymentRequestDetail, PaymentRequestUseCaseImpl};
pub use procurement::{
    AwardInput,
    AwardResult,
    MarkSentDocument,
    MarkSentInput,
    MarkSentResult,
    ProcurementUseCaseImpl,
    PurchaseOrderDetail,
    RecordGoodsReceiptInput,
    RegisterQuoteInput,
};
use procureflow_domain::clock::Clock;
use procureflow_infra::{
    db::TransactionManager,
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
pub use requisition::{RequisitionDetail, RequisitionUseCaseImpl};
pub use sla::{SlaCheckSummary, SlaUseCaseImpl};

/// ユースケース共通の依存
///
/// 各ユースケースはこれを保持し、リポジトリ・時刻・トランザクション・通知を共有する。
#[derive(Clone)]
pub struct UseCaseDeps {
    pub requisition_repo:        Arc<dyn RequisitionRepository>,
    pub payment_request_repo:    Arc<dyn PaymentRequestRepository>,
    pub step_repo:               Arc<dyn ApprovalStepRepository>,
    pub quote_repo:              Arc<dyn VendorQuoteRepository>,
    pub vendor_repo:             Arc<dyn VendorRepository>,
    pub nta_repo:                Arc<dyn NoticeToAwardRepository>,
    pub po_repo:                 Arc<dyn PurchaseOrderRepository>,
    pub grn_repo:                Arc<dyn GoodsReceiptRepository>,
    pub audit_log_repo:          Arc<dyn AuditLogRepository>,
    pub user_repo:               Arc<dyn UserRepository>,
    pub ref_counter_repo:        Arc<dyn RefNumberCounterRepository>,
    pub clock:                   Arc<dyn Clock>,
    pub tx_manager:              Arc<dyn TransactionManager>,
    pub notifier:                Arc<NotificationService>,
    /// 購買申請に必要な書類の種別
    pub required_document_types: Vec<String>,
}
