//! # ProcureFlow ドメイン層
//!
//! 購買から支払までの承認ワークフローの中核となるドメインモデルを定義する。
//!
//! ## 設計方針
//!
//! - **エンティティ**: 購買申請、支払申請、承認ステップ、業者見積、落札通知、発注書、検収記録
//! - **値オブジェクト**: バージョン、参照番号、コメントなど
//! - **ドメインサービス**: 承認チェーン生成、ステップ処理、遷移検証、落札判定
//! - **ドメインエラー**: ビジネスルール違反を表現するエラー型
//!
//! 永続化や外部サービスには依存しない。状態を変える処理は新しいインスタンスを返し、
//! 保存はユースケース層がトランザクション内で行う。
//!
//! ## 依存関係の方向
//!
//! ```text
//! core-service → infra → domain
//! ```
//!
//! ## モジュール構成
//!
//! - [`case`] - 案件の共通部分（ステータス、SLA、バージョン）
//! - [`requisition`] / [`payment_request`] - 案件の 2 種類
//! - [`approval`] - 承認チェーンとステップ処理
//! - [`transition`] - 案件レベルのステータス遷移の検証
//! - [`quote`] / [`award`] - 見積と落札
//! - [`purchase_order`] - 発注書と検収
//! - [`audit_log`] - 監査ログ
//!
//! ## 使用例
//!
//! ```rust
//! use procureflow_domain::{DomainError, requisition::RequisitionId};
//!
//! let id = RequisitionId::new();
//!
//! let error = DomainError::NotFound {
//!     entity_type: "Requisition",
//!     id:          id.to_string(),
//! };
//! assert!(error.to_string().contains("Requisition"));
//! ```

#[macro_use]
mod macros;

pub mod approval;
pub mod audit_log;
pub mod award;
pub mod case;
pub mod clock;
pub mod error;
pub mod notification;
pub mod payment_request;
pub mod purchase_order;
pub mod quote;
pub mod requisition;
pub mod role;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod transition;
pub mod user;
pub mod value_objects;
pub mod vendor;

pub use error::DomainError;
