//! # ProcureFlow 共有ユーティリティ
//!
//! サービス間で共通の API レスポンス型、エラーボディ、ログ出力の補助を提供する。
//!
//! ## 設計方針
//!
//! - domain / infra / core-service のいずれからも依存できる
//! - ビジネスロジックは置かない
//! - トレーシング関連の依存は `observability` feature の内側に閉じる

pub mod api_response;
pub mod error_response;
pub mod event_log;
pub mod health;
pub mod observability;

pub use api_response::ApiResponse;
pub use error_response::ErrorResponse;
pub use health::HealthResponse;
