//! # 通知
//!
//! メール通知に関するドメインモデルを定義する。
//!
//! ## ドメイン用語
//!
//! | 型 | ドメイン用語 | 送信先 |
//! |---|------------|------|
//! | [`CaseNotification::StatusChanged`] | ステータス変更通知 | 申請者 |
//! | [`CaseNotification::SlaBreached`] | SLA 超過通知 | ステップのロールを持つ有効ユーザー |
//!
//! 通知はコミット後に送信する。送信の失敗はログに残すだけで、操作自体は失敗させない。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;
use thiserror::Error;

use crate::{
    case::{CaseKind, CaseStatus},
    user::UserId,
    value_objects::RefNumber,
};

/// 通知送信エラー
#[derive(Debug, Error)]
pub enum NotificationError {
    /// メール送信に失敗
    #[error("メール送信に失敗: {0}")]
    SendFailed(String),

    /// テンプレートレンダリングに失敗
    #[error("テンプレートレンダリングに失敗: {0}")]
    TemplateFailed(String),
}

/// 通知イベント種別
///
/// テンプレート名にも使う。
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    IntoStaticStr,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum NotificationEventType {
    StatusChanged,
    SlaBreached,
}

/// メールメッセージ
///
/// テンプレートレンダリングの出力。NotificationSender に渡される。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    /// 送信先メールアドレス
    pub to:        String,
    /// 件名
    pub subject:   String,
    /// HTML 本文
    pub html_body: String,
    /// プレーンテキスト本文
    pub text_body: String,
}

/// 案件通知イベント
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseNotification {
    StatusChanged {
        case_kind:         CaseKind,
        ref_number:        RefNumber,
        case_title:        String,
        from:              CaseStatus,
        to:                CaseStatus,
        comment:           Option<String>,
        recipient_email:   String,
        recipient_user_id: UserId,
    },
    SlaBreached {
        case_kind:         CaseKind,
        ref_number:        RefNumber,
        case_title:        String,
        step_label:        String,
        sla_deadline:      DateTime<Utc>,
        recipient_email:   String,
        recipient_user_id: UserId,
    },
}

impl CaseNotification {
    pub fn event_type(&self) -> NotificationEventType {
        match self {
            Self::StatusChanged { .. } => NotificationEventType::StatusChanged,
            Self::SlaBreached { .. } => NotificationEventType::SlaBreached,
        }
    }

    pub fn recipient_email(&self) -> &str {
        match self {
            Self::StatusChanged {
                recipient_email, ..
            }
            | Self::SlaBreached {
                recipient_email, ..
            } => recipient_email,
        }
    }

    pub fn recipient_user_id(&self) -> &UserId {
        match self {
            Self::StatusChanged {
                recipient_user_id, ..
            }
            | Self::SlaBreached {
                recipient_user_id, ..
            } => recipient_user_id,
        }
    }

    pub fn ref_number(&self) -> RefNumber {
        match self {
            Self::StatusChanged { ref_number, .. } | Self::SlaBreached { ref_number, .. } => {
                *ref_number
            }
        }
    }

    pub fn case_kind(&self) -> CaseKind {
        match self {
            Self::StatusChanged { case_kind, .. } | Self::SlaBreached { case_kind, .. } => {
                *case_kind
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::value_objects::RefPrefix;

    fn status_changed(user_id: UserId) -> CaseNotification {
        CaseNotification::StatusChanged {
            case_kind:         CaseKind::Requisition,
            ref_number:        RefNumber::new(RefPrefix::Requisition, 2026, 42).unwrap(),
            case_title:        "ノート PC 購入".to_string(),
            from:              CaseStatus::Submitted,
            to:                CaseStatus::Rejected,
            comment:           Some("予算超過".to_string()),
            recipient_email:   "tanaka@example.com".to_string(),
            recipient_user_id: user_id,
        }
    }

    #[test]
    fn test_イベント種別の文字列変換() {
        assert_eq!(NotificationEventType::SlaBreached.to_string(), "sla_breached");
        assert_eq!(
            NotificationEventType::from_str("status_changed").unwrap(),
            NotificationEventType::StatusChanged
        );
    }

    #[test]
    fn test_受信者と参照番号を返す() {
        let user_id = UserId::new();
        let sut = status_changed(user_id.clone());

        assert_eq!(sut.event_type(), NotificationEventType::StatusChanged);
        assert_eq!(sut.recipient_email(), "tanaka@example.com");
        assert_eq!(sut.recipient_user_id(), &user_id);
        assert_eq!(sut.ref_number().to_string(), "PR-2026-00042");
    }
}
