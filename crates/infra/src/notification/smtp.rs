//! SMTP 送信実装
//!
//! `lettre::AsyncSmtpTransport<Tokio1Executor>` でテキストと HTML の
//! multipart/alternative メールを送る。

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport,
    AsyncTransport,
    Tokio1Executor,
    message::{Mailbox, Message, MultiPart, SinglePart, header::ContentType},
};
use procureflow_domain::notification::{EmailMessage, NotificationError};

use super::NotificationSender;

pub struct SmtpNotificationSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from:      Mailbox,
}

impl SmtpNotificationSender {
    /// 送信元アドレスが不正な場合は起動時にエラーにする
    pub fn new(host: &str, port: u16, from_address: &str) -> Result<Self, NotificationError> {
        let from = from_address
            .parse::<Mailbox>()
            .map_err(|e| NotificationError::SendFailed(format!("送信元アドレス不正: {e}")))?;

        // TLS なし（Mailpit などローカルの SMTP 向け）
        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
            .port(port)
            .build();

        Ok(Self { transport, from })
    }

    fn build_message(&self, email: &EmailMessage) -> Result<Message, NotificationError> {
        let to = email
            .to
            .parse::<Mailbox>()
            .map_err(|e| NotificationError::SendFailed(format!("宛先アドレス不正: {e}")))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&email.subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(email.text_body.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(email.html_body.clone()),
                    ),
            )
            .map_err(|e| NotificationError::SendFailed(format!("メッセージ構築失敗: {e}")))
    }
}

#[async_trait]
impl NotificationSender for SmtpNotificationSender {
    #[tracing::instrument(skip_all, level = "debug", fields(to = %email.to))]
    async fn send_email(&self, email: &EmailMessage) -> Result<(), NotificationError> {
        let message = self.build_message(email)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| NotificationError::SendFailed(format!("SMTP 送信失敗: {e}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email_to(to: &str) -> EmailMessage {
        EmailMessage {
            to:        to.to_string(),
            subject:   "[ProcureFlow] SLA 超過".to_string(),
            html_body: "<p>期限超過</p>".to_string(),
            text_body: "期限超過".to_string(),
        }
    }

    #[test]
    fn test_トレイトはsendとsyncを実装している() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SmtpNotificationSender>();
    }

    #[test]
    fn test_送信元アドレスが不正なら作成に失敗する() {
        let result = SmtpNotificationSender::new("localhost", 1025, "not-an-address");

        assert!(matches!(result, Err(NotificationError::SendFailed(_))));
    }

    #[test]
    fn test_宛先アドレスが不正ならメッセージを組み立てない() {
        let sender =
            SmtpNotificationSender::new("localhost", 1025, "noreply@procureflow.example").unwrap();

        let result = sender.build_message(&email_to("broken"));

        assert!(matches!(result, Err(NotificationError::SendFailed(_))));
    }

    #[test]
    fn test_テキストとhtmlの両方を含むメッセージを組み立てる() {
        let sender =
            SmtpNotificationSender::new("localhost", 1025, "noreply@procureflow.example").unwrap();

        let message = sender.build_message(&email_to("head@example.com")).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("text/plain"));
        assert!(raw.contains("text/html"));
    }
}
