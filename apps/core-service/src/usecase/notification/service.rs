//! # 通知サービス
//!
//! テンプレートレンダリング → メール送信を統合するサービス。
//!
//! `notify()` は送信に失敗してもエラーを返さない。失敗はログに残すだけで、
//! 呼び出し元の業務処理（コミット済み）には影響させない。

use std::sync::Arc;

use procureflow_domain::notification::CaseNotification;
use procureflow_infra::notification::NotificationSender;
use procureflow_shared::{
    event_log::{error as log_error, event},
    log_business_event,
};

use super::TemplateRenderer;

/// 通知サービス
pub struct NotificationService {
    sender:            Arc<dyn NotificationSender>,
    template_renderer: TemplateRenderer,
    base_url:          String,
}

impl NotificationService {
    pub fn new(
        sender: Arc<dyn NotificationSender>,
        template_renderer: TemplateRenderer,
        base_url: String,
    ) -> Self {
        Self {
            sender,
            template_renderer,
            base_url,
        }
    }

    /// 通知を送信する（fire-and-forget）
    pub async fn notify(&self, notification: CaseNotification) {
        let event_type: &str = notification.event_type().into();
        let ref_number = notification.ref_number().to_string();
        let recipient_user_id = notification.recipient_user_id().clone();

        let email = match self.template_renderer.render(&notification, &self.base_url) {
            Ok(email) => email,
            Err(e) => {
                tracing::error!(
                    error.category = log_error::category::INFRASTRUCTURE,
                    error.kind = log_error::kind::TEMPLATE,
                    error = %e,
                    notification.event_type = event_type,
                    "通知テンプレートのレンダリングに失敗"
                );
                return;
            }
        };

        match self.sender.send_email(&email).await {
            Ok(()) => {
                log_business_event!(
                    event.category = event::category::NOTIFICATION,
                    event.action = event::action::NOTIFICATION_SENT,
                    event.result = event::result::SUCCESS,
                    notification.event_type = event_type,
                    notification.ref_number = %ref_number,
                    notification.recipient = %recipient_user_id,
                    "通知メール送信成功"
                );
            }
            Err(e) => {
                log_business_event!(
                    event.category = event::category::NOTIFICATION,
                    event.action = event::action::NOTIFICATION_FAILED,
                    event.result = event::result::FAILURE,
                    notification.event_type = event_type,
                    notification.ref_number = %ref_number,
                    notification.recipient = %recipient_user_id,
                    error.category = log_error::category::EXTERNAL_SERVICE,
                    error.kind = log_error::kind::NOTIFICATION,
                    error = %e,
                    "通知メール送信失敗"
                );
            }
        }
    }
}
