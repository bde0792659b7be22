//! # Core Service ライブラリ
//!
//! ProcureFlow の承認ワークフローを実行するユースケースとハンドラを公開する。
//! バイナリ（`main.rs`）と結合テストの両方から使う。

pub mod config;
pub mod error;
pub mod handler;
pub mod usecase;

// テストユーティリティ（内部実装、ドキュメントからは隠す）
#[cfg(any(test, feature = "test-utils"))]
#[doc(hidden)]
pub mod test_utils;
