//! # Core Service エラー定義
//!
//! Core Service 固有のエラーと、HTTP レスポンスへの変換を定義する。
//!
//! | バリアント | HTTP |
//! |-----------|------|
//! | `BadRequest` | 400 |
//! | `Forbidden` | 403 |
//! | `NotFound` | 404 |
//! | `Conflict` | 409 |
//! | `Validation` | 422 |
//! | `Database` / `Internal` | 500（Conflict / InvalidInput は 409 / 422） |

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use procureflow_domain::DomainError;
use procureflow_infra::{InfraError, InfraErrorKind};
use procureflow_shared::{ErrorResponse, event_log::error as log_error};
use thiserror::Error;

/// Core Service で発生するエラー
#[derive(Debug, Error)]
pub enum CoreError {
    /// リソースが見つからない
    #[error("リソースが見つかりません: {0}")]
    NotFound(String),

    /// 不正なリクエスト（形式不正、未知の列挙値）
    #[error("不正なリクエスト: {0}")]
    BadRequest(String),

    /// 権限不足
    #[error("権限がありません: {0}")]
    Forbidden(String),

    /// 競合（楽観的ロック失敗）
    #[error("競合が発生しました: {0}")]
    Conflict(String),

    /// 業務ルール違反
    #[error("業務ルール違反: {0}")]
    Validation(String),

    /// データベースエラー
    #[error("データベースエラー: {0}")]
    Database(#[from] InfraError),

    /// 内部エラー
    #[error("内部エラー: {0}")]
    Internal(String),
}

impl From<DomainError> for CoreError {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::Validation(msg) => Self::Validation(msg),
            DomainError::NotFound { entity_type, id } => {
                Self::NotFound(format!("{entity_type}(id={id})"))
            }
            DomainError::Conflict(msg) => Self::Conflict(msg),
            DomainError::Forbidden(msg) => Self::Forbidden(msg),
        }
    }
}

impl CoreError {
    fn to_error_response(&self) -> ErrorResponse {
        match self {
            CoreError::NotFound(msg) => ErrorResponse::not_found(msg.clone()),
            CoreError::BadRequest(msg) => ErrorResponse::bad_request(msg.clone()),
            CoreError::Forbidden(msg) => ErrorResponse::forbidden(msg.clone()),
            CoreError::Conflict(msg) => ErrorResponse::conflict(msg.clone()),
            CoreError::Validation(msg) => ErrorResponse::validation_error(msg.clone()),
            CoreError::Database(e) => match e.kind() {
                InfraErrorKind::Conflict { .. } => ErrorResponse::conflict(
                    "他の操作によって更新されています。最新の情報を取得してください。",
                ),
                InfraErrorKind::InvalidInput(msg) => ErrorResponse::validation_error(msg.clone()),
                _ => {
                    tracing::error!(
                        error.category = log_error::category::INFRASTRUCTURE,
                        error.kind = log_error::kind::DATABASE,
                        span_trace = %e.span_trace(),
                        "データベースエラー: {}",
                        e
                    );
                    ErrorResponse::internal_error()
                }
            },
            CoreError::Internal(msg) => {
                tracing::error!(
                    error.category = log_error::category::INFRASTRUCTURE,
                    error.kind = log_error::kind::INTERNAL,
                    "内部エラー: {}",
                    msg
                );
                ErrorResponse::internal_error()
            }
        }
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let body = self.to_error_response();
        let status =
            StatusCode::from_u16(body.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(CoreError::NotFound("案件".to_string()), 404)]
    #[case(CoreError::BadRequest("形式不正".to_string()), 400)]
    #[case(CoreError::Forbidden("ロール不一致".to_string()), 403)]
    #[case(CoreError::Conflict("バージョン不一致".to_string()), 409)]
    #[case(CoreError::Validation("コメント必須".to_string()), 422)]
    #[case(CoreError::Internal("想定外".to_string()), 500)]
    fn test_エラー種別ごとのステータスコード(#[case] error: CoreError, #[case] expected: u16) {
        let response = error.into_response();

        assert_eq!(response.status().as_u16(), expected);
    }

    #[rstest]
    #[case(DomainError::Validation("未処理ではありません".to_string()), 422)]
    #[case(DomainError::Conflict("古いバージョン".to_string()), 409)]
    #[case(DomainError::Forbidden("ロール不一致".to_string()), 403)]
    #[case(DomainError::NotFound { entity_type: "ApprovalStep", id: "x".to_string() }, 404)]
    fn test_ドメインエラーをhttpステータスに変換する(
        #[case] error: DomainError,
        #[case] expected: u16,
    ) {
        let response = CoreError::from(error).into_response();

        assert_eq!(response.status().as_u16(), expected);
    }

    #[test]
    fn test_インフラのconflictは409になる() {
        let error = CoreError::from(InfraError::conflict("ApprovalStep", "S-1"));

        assert_eq!(error.to_error_response().status, 409);
    }

    #[test]
    fn test_インフラの入力エラーは422になる() {
        let error = CoreError::from(InfraError::invalid_input("この業者の見積は登録済みです"));

        let body = error.to_error_response();

        assert_eq!(body.status, 422);
        assert_eq!(body.detail, "この業者の見積は登録済みです");
    }

    #[test]
    fn test_内部エラーの詳細は隠す() {
        let error = CoreError::Database(InfraError::unexpected("接続が切れました"));

        let body = error.to_error_response();

        assert_eq!(body.status, 500);
        assert_eq!(body.detail, "内部エラーが発生しました");
    }
}
