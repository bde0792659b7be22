//! # Core Service 設定
//!
//! 環境変数から Core Service サーバーの設定を読み込む。
//!
//! | 変数名 | 必須 | 既定値 |
//! |--------|------|--------|
//! | `CORE_HOST` | No | `0.0.0.0` |
//! | `CORE_PORT` | **Yes** | |
//! | `DATABASE_URL` | **Yes** | |
//! | `SLA_CHECK_INTERVAL_SECS` | No | `300`（`0` で定期実行しない） |
//! | `REQUIRED_DOCUMENT_TYPES` | No | `purchase_request_form` |
//! | `NOTIFICATION_BACKEND` | No | `noop` |
//! | `SMTP_HOST` / `SMTP_PORT` | No | `localhost` / `1025` |
//! | `NOTIFICATION_FROM_ADDRESS` | No | `noreply@procureflow.example.com` |
//! | `NOTIFICATION_BASE_URL` | No | `http://localhost:5173` |

use std::{env, time::Duration};

use thiserror::Error;

const DEFAULT_SLA_CHECK_INTERVAL_SECS: u64 = 300;
const DEFAULT_REQUIRED_DOCUMENT_TYPES: &str = "purchase_request_form";

/// 設定読み込みのエラー
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} が設定されていません")]
    Missing(&'static str),

    #[error("{name} の値が不正です: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Core Service サーバーの設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// バインドアドレス
    pub host: String,
    /// ポート番号
    pub port: u16,
    /// データベース接続 URL
    pub database_url: String,
    /// SLA 超過チェックの間隔（`None` なら定期実行しない）
    pub sla_check_interval: Option<Duration>,
    /// 申請に必要な書類の種別
    pub required_document_types: Vec<String>,
    /// 通知設定
    pub notification: NotificationConfig,
}

/// メール送信バックエンド
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationBackend {
    Smtp,
    Noop,
}

/// 通知機能の設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationConfig {
    pub backend:      NotificationBackend,
    pub smtp_host:    String,
    pub smtp_port:    u16,
    /// 送信元メールアドレス
    pub from_address: String,
    /// フロントエンド URL（メール内リンク用）
    pub base_url:     String,
}

impl CoreConfig {
    /// 環境変数から設定を読み込む
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// 任意の取得関数から設定を組み立てる
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let interval_secs = match lookup("SLA_CHECK_INTERVAL_SECS") {
            Some(value) => parse("SLA_CHECK_INTERVAL_SECS", &value)?,
            None => DEFAULT_SLA_CHECK_INTERVAL_SECS,
        };

        Ok(Self {
            host: lookup("CORE_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse("CORE_PORT", &required("CORE_PORT")?)?,
            database_url: required("DATABASE_URL")?,
            sla_check_interval: (interval_secs > 0).then(|| Duration::from_secs(interval_secs)),
            required_document_types: parse_list(
                &lookup("REQUIRED_DOCUMENT_TYPES")
                    .unwrap_or_else(|| DEFAULT_REQUIRED_DOCUMENT_TYPES.to_string()),
            ),
            notification: NotificationConfig::from_lookup(&lookup)?,
        })
    }
}

impl NotificationConfig {
    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let backend = match lookup("NOTIFICATION_BACKEND").as_deref() {
            None | Some("noop") => NotificationBackend::Noop,
            Some("smtp") => NotificationBackend::Smtp,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name:  "NOTIFICATION_BACKEND",
                    value: other.to_string(),
                });
            }
        };
        let smtp_port = match lookup("SMTP_PORT") {
            Some(value) => parse("SMTP_PORT", &value)?,
            None => 1025,
        };

        Ok(Self {
            backend,
            smtp_host: lookup("SMTP_HOST").unwrap_or_else(|| "localhost".to_string()),
            smtp_port,
            from_address: lookup("NOTIFICATION_FROM_ADDRESS")
                .unwrap_or_else(|| "noreply@procureflow.example.com".to_string()),
            base_url: lookup("NOTIFICATION_BASE_URL")
                .unwrap_or_else(|| "http://localhost:5173".to_string()),
        })
    }
}

fn parse<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        value: value.to_string(),
    })
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}
