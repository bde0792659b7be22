//! # メール送信
//!
//! 案件のステータス変更と SLA 超過をメールで知らせる送信口。
//!
//! - **SMTP**: lettre の非同期トランスポート（開発環境では Mailpit）
//! - **Noop**: 送信せずログだけ出す（既定）
//!
//! どちらを使うかは `NOTIFICATION_BACKEND` で選ぶ。
//! 送信失敗は呼び出し側でログに残すだけで、業務処理は失敗させない。

mod noop;
mod smtp;

use async_trait::async_trait;
pub use noop::NoopNotificationSender;
use procureflow_domain::notification::{EmailMessage, NotificationError};
pub use smtp::SmtpNotificationSender;

/// メール送信トレイト
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send_email(&self, email: &EmailMessage) -> Result<(), NotificationError>;
}
