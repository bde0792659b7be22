//! 送信しない実装。宛先と件名だけをログに残す。

use async_trait::async_trait;
use procureflow_domain::notification::{EmailMessage, NotificationError};

use super::NotificationSender;

#[derive(Debug, Clone, Default)]
pub struct NoopNotificationSender;

#[async_trait]
impl NotificationSender for NoopNotificationSender {
    async fn send_email(&self, email: &EmailMessage) -> Result<(), NotificationError> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            "通知バックエンドが noop のため送信をスキップ"
        );
        Ok(())
    }
}
