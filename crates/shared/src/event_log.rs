//! # ビジネスイベントログとエラーコンテキストの構造化ヘルパー
//!
//! `jq` で絞り込めるよう、ログフィールドの命名規約とヘルパーマクロを提供する。
//!
//! ## ビジネスイベント
//!
//! [`log_business_event!`] マクロで出力する。`event.kind = "business_event"` マーカーが
//! 自動付与され、`jq 'select(.["event.kind"] == "business_event")'` でフィルタできる。
//!
//! ## エラーコンテキスト
//!
//! `tracing::error!` に `error.category` と `error.kind` フィールドを直接追加する。
//! 定数は [`error`] モジュールで提供。
//!
//! ## フィールド命名規約
//!
//! ドット記法（`event.category`、`error.kind`）を使用する。JSON 出力ではフラットなキーになる。

/// ビジネスイベントを構造化ログとして出力する。
///
/// `event.kind = "business_event"` を付与し、INFO レベルで出力する。
///
/// ## 必須フィールド（慣例）
///
/// - `event.category`: [`event::category`] の定数
/// - `event.action`: [`event::action`] の定数
/// - `event.result`: [`event::result`] の定数
///
/// ## 推奨フィールド
///
/// - `event.entity_type`: [`event::entity_type`] の定数
/// - `event.entity_id`: エンティティ ID
/// - `event.actor_id`: 操作者 ID（システム処理では省略）
///
/// ```
/// use procureflow_shared::{event_log::event, log_business_event};
///
/// log_business_event!(
///     event.category = event::category::APPROVAL,
///     event.action = event::action::STEP_APPROVED,
///     event.entity_type = event::entity_type::REQUISITION,
///     event.entity_id = "6f1c0d8e-0000-0000-0000-000000000000",
///     event.result = event::result::SUCCESS,
///     "承認ステップを承認"
/// );
/// ```
#[macro_export]
macro_rules! log_business_event {
    ($($args:tt)*) => {
        ::tracing::info!(
            event.kind = "business_event",
            $($args)*
        )
    };
}

/// イベントフィールドの定数
pub mod event {
    /// イベントカテゴリ
    pub mod category {
        /// 起票・申請・ステータス遷移
        pub const CASE: &str = "case";
        /// 承認ステップへの判断
        pub const APPROVAL: &str = "approval";
        /// 見積・落札・発注
        pub const PROCUREMENT: &str = "procurement";
        pub const SLA: &str = "sla";
        pub const NOTIFICATION: &str = "notification";
    }

    /// イベントアクション
    pub mod action {
        // 案件
        pub const CASE_CREATED: &str = "case.created";
        pub const CASE_UPDATED: &str = "case.updated";
        pub const CASE_SUBMITTED: &str = "case.submitted";
        pub const CASE_TRANSITIONED: &str = "case.transitioned";
        pub const CASE_RESUMED: &str = "case.resumed";
        pub const CASE_COMPLETED: &str = "case.completed";

        // 承認ステップ
        pub const STEP_APPROVED: &str = "step.approved";
        pub const STEP_REJECTED: &str = "step.rejected";
        pub const STEP_RETURNED: &str = "step.returned";
        pub const STEP_ON_HOLD: &str = "step.on_hold";

        // 調達
        pub const QUOTE_REGISTERED: &str = "quote.registered";
        pub const QUOTE_EVALUATED: &str = "quote.evaluated";
        pub const QUOTE_EXCEPTION_APPROVED: &str = "quote.exception_approved";
        pub const VENDOR_AWARDED: &str = "vendor.awarded";
        pub const NTA_MARKED_SENT: &str = "nta.marked_sent";
        pub const PO_MARKED_SENT: &str = "po.marked_sent";
        pub const GOODS_RECEIVED: &str = "po.goods_received";

        // SLA
        pub const SLA_BREACHED: &str = "sla.breached";

        // 通知
        pub const NOTIFICATION_SENT: &str = "notification.sent";
        pub const NOTIFICATION_FAILED: &str = "notification.failed";
    }

    /// エンティティ種別
    pub mod entity_type {
        pub const REQUISITION: &str = "requisition";
        pub const PAYMENT_REQUEST: &str = "payment_request";
        pub const APPROVAL_STEP: &str = "approval_step";
        pub const VENDOR_QUOTE: &str = "vendor_quote";
        pub const NOTICE_TO_AWARD: &str = "notice_to_award";
        pub const PURCHASE_ORDER: &str = "purchase_order";
        pub const GOODS_RECEIPT: &str = "goods_receipt";
    }

    /// イベント結果
    pub mod result {
        pub const SUCCESS: &str = "success";
        pub const FAILURE: &str = "failure";
    }
}

/// エラーコンテキストフィールドの定数
pub mod error {
    /// エラーカテゴリ
    pub mod category {
        /// DB などのインフラストラクチャ
        pub const INFRASTRUCTURE: &str = "infrastructure";
        /// メール送信などの外部サービス
        pub const EXTERNAL_SERVICE: &str = "external_service";
    }

    /// エラー種別
    pub mod kind {
        pub const DATABASE: &str = "database";
        pub const INTERNAL: &str = "internal";
        pub const NOTIFICATION: &str = "notification";
        pub const TEMPLATE: &str = "template";
        pub const SLA_CHECK: &str = "sla_check";
    }
}
