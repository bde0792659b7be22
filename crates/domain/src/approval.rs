//! # 承認
//!
//! 承認ステップ、チェーン生成、ステップ処理を管理する。
//!
//! ## 概念モデル
//!
//! - **ApprovalStep**: 案件に属する 1 段の承認タスク
//! - **チェーン生成**: 申請時に金額からステップ列を組み立てる
//! - **ステップ処理**: 担当者の判断を検証し、ステップと案件の変化を計画する
//!
//! ## 使用例
//!
//! ```rust
//! use chrono::Utc;
//! use procureflow_domain::{
//!     approval::generate_chain,
//!     case::CaseRef,
//!     requisition::RequisitionId,
//!     role::Role,
//! };
//! use rust_decimal::Decimal;
//!
//! let case = CaseRef::Requisition(RequisitionId::new());
//! let chain = generate_chain(&case, Decimal::from(1_500_000), &[], Utc::now());
//!
//! assert_eq!(chain.steps.len(), 5);
//! assert_eq!(chain.steps[1].role_required(), Role::President);
//! ```

mod chain;
mod processor;
mod step;

pub use chain::*;
pub use processor::*;
pub use step::*;
