//! # ドメイン層エラー定義
//!
//! 業務ルール違反や権限不足、同時更新の競合を表現するエラー型。
//!
//! ## エラーの種類と HTTP ステータスの対応
//!
//! | エラー種別 | HTTP ステータス | 用途 |
//! |-----------|----------------|------|
//! | `Validation` | 422 Unprocessable Entity | 業務ルール違反（コメント未入力、見積不足など） |
//! | `NotFound` | 404 Not Found | エンティティが存在しない |
//! | `Conflict` | 409 Conflict | 楽観的ロックの失敗 |
//! | `Forbidden` | 403 Forbidden | ロール不一致 |
//!
//! `Conflict` は呼び出し側が最新状態を再取得すれば回復できる。
//! `Validation` と `Forbidden` は同じ入力で再試行しても成功しない。
//!
//! ## 使用例
//!
//! ```rust
//! use procureflow_domain::DomainError;
//!
//! fn require_comment(comment: &str) -> Result<(), DomainError> {
//!     if comment.trim().is_empty() {
//!         return Err(DomainError::Validation("コメントは必須です".to_string()));
//!     }
//!     Ok(())
//! }
//!
//! assert!(require_comment("  ").is_err());
//! ```

use thiserror::Error;

/// ドメイン層で発生するエラー
///
/// API 層でこのエラーを受け取り、適切な HTTP レスポンスに変換する。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    /// 業務ルール違反
    ///
    /// - 処理済みステップへの再操作
    /// - 却下・差し戻し・保留時のコメント未入力
    /// - 有効見積 3 件未満での評価・承認への遷移
    /// - 最安値以外の落札で理由が未入力
    #[error("バリデーションエラー: {0}")]
    Validation(String),

    /// エンティティが見つからない
    #[error("{entity_type} が見つかりません: {id}")]
    NotFound {
        /// エンティティの種類（"Requisition", "ApprovalStep" など）
        entity_type: &'static str,
        /// 検索に使用した識別子
        id:          String,
    },

    /// 競合エラー（楽観的ロック失敗）
    ///
    /// クライアントは最新データを再取得してから再度更新を試みる必要がある。
    #[error("競合が発生しました: {0}")]
    Conflict(String),

    /// 権限エラー
    ///
    /// 操作者のロールがステップの要求ロールと一致しない場合など。
    #[error("権限がありません: {0}")]
    Forbidden(String),
}
