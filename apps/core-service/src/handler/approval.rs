//! # 承認ハンドラ
//!
//! ## エンドポイント
//!
//! - `POST /internal/requisitions/{id}/steps/{step_id}/act` - 購買申請のステップ操作
//! - `POST /internal/payment-requests/{id}/steps/{step_id}/act` - 支払申請のステップ操作
//! - `POST /internal/requisitions/{id}/resume` - 保留の解除
//! - `POST /internal/payment-requests/{id}/resume` - 保留の解除

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use procureflow_domain::{
    approval::{ApprovalStepId, StepDecision},
    case::CaseRef,
    payment_request::PaymentRequestId,
    requisition::RequisitionId,
    user::UserId,
};
use procureflow_shared::ApiResponse;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{
    dto::{ApprovalStepDto, CaseSummaryDto},
    parse_enum,
    parse_version,
    requisition::SubmitRequest,
    validate_request,
};
use crate::{
    error::CoreError,
    usecase::{ActInput, ApprovalUseCaseImpl},
};

/// 承認 API の共有状態
pub struct ApprovalState {
    pub usecase: ApprovalUseCaseImpl,
}

/// ステップ操作のパスパラメータ
#[derive(Debug, Deserialize)]
pub struct StepPathParams {
    pub id:      Uuid,
    pub step_id: Uuid,
}

/// ステップ操作リクエスト
#[derive(Debug, Deserialize, Validate)]
pub struct ActRequest {
    /// 操作するユーザー ID (内部 API 用)
    pub actor_id: Uuid,
    /// `approved` / `rejected` / `returned` / `on_hold`
    pub decision: String,
    /// 却下・差戻し・保留では必須
    #[validate(length(max = 2000))]
    pub comment:  Option<String>,
    /// 楽観的ロック用のステップのバージョン
    pub version:  i32,
}

/// ステップ操作の結果 DTO
#[derive(Debug, Serialize)]
pub struct ActResultDto {
    pub case: CaseSummaryDto,
    pub step: ApprovalStepDto,
}

/// POST /internal/requisitions/{id}/steps/{step_id}/act
pub async fn act_on_requisition_step(
    State(state): State<Arc<ApprovalState>>,
    Path(params): Path<StepPathParams>,
    Json(req): Json<ActRequest>,
) -> Result<impl IntoResponse, CoreError> {
    let case = CaseRef::from(RequisitionId::from_uuid(params.id));
    act(&state, case, params.step_id, req).await
}

/// POST /internal/payment-requests/{id}/steps/{step_id}/act
pub async fn act_on_payment_request_step(
    State(state): State<Arc<ApprovalState>>,
    Path(params): Path<StepPathParams>,
    Json(req): Json<ActRequest>,
) -> Result<impl IntoResponse, CoreError> {
    let case = CaseRef::from(PaymentRequestId::from_uuid(params.id));
    act(&state, case, params.step_id, req).await
}

async fn act(
    state: &ApprovalState,
    case: CaseRef,
    step_id: Uuid,
    req: ActRequest,
) -> Result<(StatusCode, Json<ApiResponse<ActResultDto>>), CoreError> {
    validate_request(&req)?;
    let input = ActInput {
        case,
        step_id: ApprovalStepId::from_uuid(step_id),
        decision: parse_enum::<StepDecision>("decision", &req.decision)?,
        comment: req.comment,
        expected_version: parse_version(req.version)?,
        actor_id: UserId::from_uuid(req.actor_id),
    };

    let result = state.usecase.act(input).await?;

    let response = ApiResponse::new(ActResultDto {
        case: CaseSummaryDto::from(&result.case),
        step: ApprovalStepDto::from(&result.step),
    });
    Ok((StatusCode::OK, Json(response)))
}

/// POST /internal/requisitions/{id}/resume
pub async fn resume_requisition(
    State(state): State<Arc<ApprovalState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<SubmitRequest>,
) -> Result<impl IntoResponse, CoreError> {
    resume(&state, CaseRef::from(RequisitionId::from_uuid(id)), req).await
}

/// POST /internal/payment-requests/{id}/resume
pub async fn resume_payment_request(
    State(state): State<Arc<ApprovalState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<SubmitRequest>,
) -> Result<impl IntoResponse, CoreError> {
    resume(&state, CaseRef::from(PaymentRequestId::from_uuid(id)), req).await
}

async fn resume(
    state: &ApprovalState,
    case: CaseRef,
    req: SubmitRequest,
) -> Result<(StatusCode, Json<ApiResponse<CaseSummaryDto>>), CoreError> {
    let version = parse_version(req.version)?;

    let case = state
        .usecase
        .resume(&case, version, &UserId::from_uuid(req.actor_id))
        .await?;

    let response = ApiResponse::new(CaseSummaryDto::from(&case));
    Ok((StatusCode::OK, Json(response)))
}
