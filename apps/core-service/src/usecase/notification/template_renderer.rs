//! # テンプレートレンダラー
//!
//! tera テンプレートエンジンで通知メールを HTML/plaintext 両形式で生成する。
//!
//! - テンプレートは `include_str!` でバイナリに埋め込む
//! - 件名は `[ProcureFlow] {イベント種別}: {件名} {参照番号}`
//! - 案件へのリンクは `{base_url}/{requisitions|payment-requests}/{参照番号}`

use procureflow_domain::{
    case::CaseKind,
    notification::{CaseNotification, EmailMessage, NotificationError},
};
use tera::{Context, Tera};

/// テンプレートレンダラー
pub struct TemplateRenderer {
    engine: Tera,
}

impl TemplateRenderer {
    pub fn new() -> Result<Self, NotificationError> {
        let mut engine = Tera::default();

        engine
            .add_raw_templates(vec![
                (
                    "status_changed.html",
                    include_str!("../../../templates/notifications/status_changed.html"),
                ),
                (
                    "status_changed.txt",
                    include_str!("../../../templates/notifications/status_changed.txt"),
                ),
                (
                    "sla_breached.html",
                    include_str!("../../../templates/notifications/sla_breached.html"),
                ),
                (
                    "sla_breached.txt",
                    include_str!("../../../templates/notifications/sla_breached.txt"),
                ),
            ])
            .map_err(|e| NotificationError::TemplateFailed(e.to_string()))?;

        Ok(Self { engine })
    }

    /// 通知イベントからメールメッセージを生成する
    pub fn render(
        &self,
        notification: &CaseNotification,
        base_url: &str,
    ) -> Result<EmailMessage, NotificationError> {
        let (template_name, subject, context) = build_template_params(notification, base_url);

        let html_body = self
            .engine
            .render(&format!("{template_name}.html"), &context)
            .map_err(|e| NotificationError::TemplateFailed(e.to_string()))?;

        let text_body = self
            .engine
            .render(&format!("{template_name}.txt"), &context)
            .map_err(|e| NotificationError::TemplateFailed(e.to_string()))?;

        Ok(EmailMessage {
            to: notification.recipient_email().to_string(),
            subject,
            html_body,
            text_body,
        })
    }
}

fn case_path(kind: CaseKind) -> &'static str {
    match kind {
        CaseKind::Requisition => "requisitions",
        CaseKind::PaymentRequest => "payment-requests",
    }
}

fn case_kind_label(kind: CaseKind) -> &'static str {
    match kind {
        CaseKind::Requisition => "購買申請",
        CaseKind::PaymentRequest => "支払申請",
    }
}

/// テンプレート名、件名、コンテキストを構築する
fn build_template_params(
    notification: &CaseNotification,
    base_url: &str,
) -> (&'static str, String, Context) {
    let kind = notification.case_kind();
    let ref_number = notification.ref_number().to_string();
    let base_url = base_url.trim_end_matches('/');

    let mut context = Context::new();
    context.insert("ref_number", &ref_number);
    context.insert("case_kind_label", case_kind_label(kind));
    context.insert(
        "case_url",
        &format!("{base_url}/{}/{ref_number}", case_path(kind)),
    );

    match notification {
        CaseNotification::StatusChanged {
            case_title,
            from,
            to,
            comment,
            ..
        } => {
            context.insert("case_title", case_title);
            context.insert("from_status", &from.to_string());
            context.insert("to_status", &to.to_string());
            context.insert("comment", comment);
            (
                "status_changed",
                format!("[ProcureFlow] ステータス変更: {case_title} {ref_number}"),
                context,
            )
        }
        CaseNotification::SlaBreached {
            case_title,
            step_label,
            sla_deadline,
            ..
        } => {
            context.insert("case_title", case_title);
            context.insert("step_label", step_label);
            context.insert(
                "sla_deadline",
                &sla_deadline.format("%Y-%m-%d %H:%M UTC").to_string(),
            );
            (
                "sla_breached",
                format!("[ProcureFlow] SLA 超過: {case_title} {ref_number}"),
                context,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use pretty_assertions::assert_eq;
    use procureflow_domain::{
        case::CaseStatus,
        user::UserId,
        value_objects::{RefNumber, RefPrefix},
    };

    use super::*;

    fn status_changed(comment: Option<&str>) -> CaseNotification {
        CaseNotification::StatusChanged {
            case_kind:         CaseKind::Requisition,
            ref_number:        RefNumber::new(RefPrefix::Requisition, 2026, 42).unwrap(),
            case_title:        "ノート PC の購入".to_string(),
            from:              CaseStatus::Submitted,
            to:                CaseStatus::Returned,
            comment:           comment.map(str::to_string),
            recipient_email:   "requester@example.com".to_string(),
            recipient_user_id: UserId::new(),
        }
    }

    #[test]
    fn test_ステータス変更メールを生成する() {
        let renderer = TemplateRenderer::new().unwrap();

        let email = renderer
            .render(&status_changed(Some("見積書を添付してください")), "http://localhost:5173/")
            .unwrap();

        assert_eq!(email.to, "requester@example.com");
        assert_eq!(
            email.subject,
            "[ProcureFlow] ステータス変更: ノート PC の購入 PR-2026-00042"
        );
        assert!(email.text_body.contains("変更前: submitted"));
        assert!(email.text_body.contains("変更後: returned"));
        assert!(email.text_body.contains("コメント: 見積書を添付してください"));
        assert!(
            email
                .html_body
                .contains("http://localhost:5173/requisitions/PR-2026-00042")
        );
    }

    #[test]
    fn test_コメントがなければコメント行を出さない() {
        let renderer = TemplateRenderer::new().unwrap();

        let email = renderer.render(&status_changed(None), "http://localhost:5173").unwrap();

        assert!(!email.text_body.contains("コメント:"));
    }

    #[test]
    fn test_sla超過メールを生成する() {
        let renderer = TemplateRenderer::new().unwrap();
        let deadline = DateTime::<Utc>::from_timestamp(1_772_442_000, 0).unwrap();
        let notification = CaseNotification::SlaBreached {
            case_kind:         CaseKind::PaymentRequest,
            ref_number:        RefNumber::new(RefPrefix::PaymentRequest, 2026, 7).unwrap(),
            case_title:        "出張旅費の精算".to_string(),
            step_label:        "Department Head Approval".to_string(),
            sla_deadline:      deadline,
            recipient_email:   "head@example.com".to_string(),
            recipient_user_id: UserId::new(),
        };

        let email = renderer.render(&notification, "https://p2p.example.com").unwrap();

        assert_eq!(
            email.subject,
            "[ProcureFlow] SLA 超過: 出張旅費の精算 RF-2026-00007"
        );
        assert!(email.text_body.contains("ステップ: Department Head Approval"));
        assert!(email.text_body.contains(&deadline.format("%Y-%m-%d %H:%M UTC").to_string()));
        assert!(
            email
                .html_body
                .contains("https://p2p.example.com/payment-requests/RF-2026-00007")
        );
    }
}
