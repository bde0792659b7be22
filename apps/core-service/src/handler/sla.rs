//! # SLA ハンドラ
//!
//! ```text
//! POST /internal/sla/check
//! ```
//!
//! 定期タスクを待たずに SLA 超過チェックを実行する。何度呼んでも結果は変わらない。

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use procureflow_shared::ApiResponse;

use crate::{error::CoreError, usecase::SlaUseCaseImpl};

/// SLA API の共有状態
pub struct SlaState {
    pub usecase: SlaUseCaseImpl,
}

/// POST /internal/sla/check
pub async fn check_sla_breaches(
    State(state): State<Arc<SlaState>>,
) -> Result<impl IntoResponse, CoreError> {
    let summary = state.usecase.check_sla_breaches().await?;

    Ok((StatusCode::OK, Json(ApiResponse::new(summary))))
}
