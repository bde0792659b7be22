//! # ProcureFlow インフラ層
//!
//! 外部システムとの接続・通信を担当するインフラストラクチャ層。
//!
//! ## 責務
//!
//! - **データベース接続**: PostgreSQL への接続プール管理とマイグレーション
//! - **トランザクション**: [`db::TxContext`] を書き込みメソッドの必須引数にする
//! - **リポジトリ実装**: 案件、承認ステップ、見積、落札通知、監査ログの永続化
//! - **メール送信**: SMTP / Noop の切り替え
//!
//! ## 依存関係
//!
//! ```text
//! core-service → infra → domain
//! ```
//!
//! ## モジュール構成
//!
//! - [`db`] - PostgreSQL 接続管理とトランザクション
//! - [`error`] - インフラ層エラー定義
//! - [`repository`] - リポジトリ実装
//! - [`notification`] - メール送信
//! - `mock` - インメモリのモック（`test-utils` feature）
//!
//! ## 使用例
//!
//! ```rust,ignore
//! use procureflow_infra::{db, repository::PostgresRequisitionRepository};
//!
//! async fn setup() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = db::create_pool("postgres://localhost/procureflow").await?;
//!     db::run_migrations(&pool).await?;
//!     let requisitions = PostgresRequisitionRepository::new(pool.clone());
//!     Ok(())
//! }
//! ```

pub mod db;
pub mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod notification;
pub mod repository;

pub use error::{InfraError, InfraErrorKind};
