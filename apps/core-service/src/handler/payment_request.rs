//! # 支払申請ハンドラ
//!
//! ## エンドポイント
//!
//! - `GET /internal/payment-requests` - 一覧（`status` で絞り込み）
//! - `POST /internal/payment-requests` - 起票
//! - `GET /internal/payment-requests/{id}` - 詳細（ステップ付き）
//! - `PUT /internal/payment-requests/{id}` - 下書き・差戻しの編集
//! - `POST /internal/payment-requests/{id}/submit` - 申請
//! - `POST /internal/payment-requests/{id}/transition` - ステータス遷移（伝票番号の記録を含む）
//! - `GET /internal/payment-requests/{id}/audit-logs` - 監査証跡

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, NaiveDate, Utc};
use procureflow_domain::{
    case::CaseStatus,
    payment_request::{
        Disbursement,
        PaymentLineInput,
        PaymentRequest,
        PaymentRequestContent,
        PaymentRequestId,
        RequestType,
    },
    requisition::RequisitionId,
    user::UserId,
    value_objects::CaseTitle,
};
use procureflow_shared::ApiResponse;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{
    dto::{ApprovalStepDto, AuditLogDto, CaseStateDto},
    parse_enum,
    parse_version,
    requisition::{ListQuery, SubmitRequest, ViewerQuery},
    validate_request,
};
use crate::{
    error::CoreError,
    usecase::{PaymentRequestDetail, PaymentRequestUseCaseImpl},
};

/// 支払申請 API の共有状態
pub struct PaymentRequestState {
    pub usecase: PaymentRequestUseCaseImpl,
}

// --- リクエスト/レスポンス型 ---

/// 支払明細の入力
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct PaymentLineRequest {
    #[validate(length(min = 1, max = 500))]
    pub description: String,
    pub amount:      Decimal,
}

/// 起票・編集で共通の入力
#[derive(Debug, Deserialize, Validate)]
pub struct PaymentRequestContentRequest {
    /// `po_based` / `non_po` / `reimbursement` / `cash_advance`
    pub request_type:   String,
    /// 発注書に基づく支払の場合は必須
    pub requisition_id: Option<Uuid>,
    #[validate(length(min = 1, max = 200))]
    pub title:          String,
    pub particulars:    Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub payee_name:     String,
    pub due_date:       Option<NaiveDate>,
    #[validate(length(min = 1, max = 100))]
    pub department:     String,
    #[validate(length(min = 1), nested)]
    pub line_items:     Vec<PaymentLineRequest>,
}

impl PaymentRequestContentRequest {
    fn into_content(self) -> Result<PaymentRequestContent, CoreError> {
        Ok(PaymentRequestContent {
            request_type:   parse_enum::<RequestType>("request_type", &self.request_type)?,
            requisition_id: self.requisition_id.map(RequisitionId::from_uuid),
            title:          CaseTitle::new(self.title)?,
            particulars:    self.particulars,
            payee_name:     self.payee_name,
            due_date:       self.due_date,
            department:     self.department,
            line_items:     self
                .line_items
                .into_iter()
                .map(|line| PaymentLineInput {
                    description: line.description,
                    amount:      line.amount,
                })
                .collect(),
        })
    }
}

/// 起票リクエスト
#[derive(Debug, Deserialize, Validate)]
pub struct CreatePaymentRequestRequest {
    pub actor_id: Uuid,
    #[serde(flatten)]
    #[validate(nested)]
    pub content:  PaymentRequestContentRequest,
}

/// 編集リクエスト
#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePaymentRequestRequest {
    pub actor_id: Uuid,
    pub version:  i32,
    #[serde(flatten)]
    #[validate(nested)]
    pub content:  PaymentRequestContentRequest,
}

/// ステータス遷移リクエスト
///
/// `sap_synced` / `paid` への遷移時は伝票番号を同時に記録できる。
#[derive(Debug, Deserialize, Validate)]
pub struct PaymentTransitionRequest {
    pub actor_id:     Uuid,
    pub version:      i32,
    pub target:       String,
    #[validate(length(max = 2000))]
    pub comment:      Option<String>,
    #[validate(length(max = 50))]
    pub apv_number:   Option<String>,
    #[validate(length(max = 50))]
    pub cv_number:    Option<String>,
    #[validate(length(max = 50))]
    pub check_number: Option<String>,
}

/// 支払明細 DTO
#[derive(Debug, Serialize)]
pub struct PaymentLineDto {
    pub id:          Uuid,
    pub description: String,
    pub amount:      Decimal,
    pub sort_order:  i32,
}

/// 支払申請 DTO
#[derive(Debug, Serialize)]
pub struct PaymentRequestDto {
    pub id:             Uuid,
    pub ref_number:     String,
    pub request_type:   RequestType,
    pub requisition_id: Option<Uuid>,
    pub title:          String,
    pub particulars:    Option<String>,
    pub payee_name:     String,
    pub amount:         Decimal,
    pub due_date:       Option<NaiveDate>,
    pub department:     String,
    pub requested_by:   Uuid,
    pub line_items:     Vec<PaymentLineDto>,
    pub apv_number:     Option<String>,
    pub cv_number:      Option<String>,
    pub check_number:   Option<String>,
    pub state:          CaseStateDto,
    pub created_at:     DateTime<Utc>,
}

impl From<&PaymentRequest> for PaymentRequestDto {
    fn from(payment: &PaymentRequest) -> Self {
        let disbursement = payment.disbursement();
        Self {
            id:             *payment.id().as_uuid(),
            ref_number:     payment.ref_number().to_string(),
            request_type:   payment.request_type(),
            requisition_id: payment.requisition_id().map(|id| *id.as_uuid()),
            title:          payment.title().as_str().to_string(),
            particulars:    payment.particulars().map(str::to_string),
            payee_name:     payment.payee_name().to_string(),
            amount:         payment.amount(),
            due_date:       payment.due_date(),
            department:     payment.department().to_string(),
            requested_by:   *payment.requested_by().as_uuid(),
            line_items:     payment
                .line_items()
                .iter()
                .map(|line| PaymentLineDto {
                    id:          *line.id().as_uuid(),
                    description: line.description().to_string(),
                    amount:      line.amount(),
                    sort_order:  line.sort_order(),
                })
                .collect(),
            apv_number:     disbursement.apv_number.clone(),
            cv_number:      disbursement.cv_number.clone(),
            check_number:   disbursement.check_number.clone(),
            state:          CaseStateDto::from(payment.state()),
            created_at:     payment.created_at(),
        }
    }
}

/// 支払申請詳細 DTO
#[derive(Debug, Serialize)]
pub struct PaymentRequestDetailDto {
    #[serde(flatten)]
    pub payment_request: PaymentRequestDto,
    pub steps:           Vec<ApprovalStepDto>,
}

impl From<PaymentRequestDetail> for PaymentRequestDetailDto {
    fn from(detail: PaymentRequestDetail) -> Self {
        Self {
            payment_request: PaymentRequestDto::from(&detail.payment_request),
            steps:           detail.steps.iter().map(ApprovalStepDto::from).collect(),
        }
    }
}

// --- ハンドラ ---

/// GET /internal/payment-requests
pub async fn list_payment_requests(
    State(state): State<Arc<PaymentRequestState>>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, CoreError> {
    let status = query
        .status
        .as_deref()
        .map(|s| parse_enum::<CaseStatus>("status", s))
        .transpose()?;

    let payments = state
        .usecase
        .list(status, &UserId::from_uuid(query.actor_id))
        .await?;

    let items: Vec<PaymentRequestDto> = payments.iter().map(PaymentRequestDto::from).collect();
    Ok((StatusCode::OK, Json(ApiResponse::new(items))))
}

/// POST /internal/payment-requests
pub async fn create_payment_request(
    State(state): State<Arc<PaymentRequestState>>,
    Json(req): Json<CreatePaymentRequestRequest>,
) -> Result<impl IntoResponse, CoreError> {
    validate_request(&req)?;
    let actor_id = UserId::from_uuid(req.actor_id);

    let payment = state
        .usecase
        .create(req.content.into_content()?, &actor_id)
        .await?;

    let response = ApiResponse::new(PaymentRequestDto::from(&payment));
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /internal/payment-requests/{id}
pub async fn get_payment_request(
    State(state): State<Arc<PaymentRequestState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<ViewerQuery>,
) -> Result<impl IntoResponse, CoreError> {
    let detail = state
        .usecase
        .get(&PaymentRequestId::from_uuid(id), &UserId::from_uuid(query.actor_id))
        .await?;

    let response = ApiResponse::new(PaymentRequestDetailDto::from(detail));
    Ok((StatusCode::OK, Json(response)))
}

/// PUT /internal/payment-requests/{id}
pub async fn update_payment_request(
    State(state): State<Arc<PaymentRequestState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdatePaymentRequestRequest>,
) -> Result<impl IntoResponse, CoreError> {
    validate_request(&req)?;
    let version = parse_version(req.version)?;
    let actor_id = UserId::from_uuid(req.actor_id);

    let payment = state
        .usecase
        .update(
            &PaymentRequestId::from_uuid(id),
            req.content.into_content()?,
            version,
            &actor_id,
        )
        .await?;

    let response = ApiResponse::new(PaymentRequestDto::from(&payment));
    Ok((StatusCode::OK, Json(response)))
}

/// POST /internal/payment-requests/{id}/submit
pub async fn submit_payment_request(
    State(state): State<Arc<PaymentRequestState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<SubmitRequest>,
) -> Result<impl IntoResponse, CoreError> {
    let version = parse_version(req.version)?;
    let id = PaymentRequestId::from_uuid(id);
    let actor_id = UserId::from_uuid(req.actor_id);

    state.usecase.submit(&id, version, &actor_id).await?;
    let detail = state.usecase.get(&id, &actor_id).await?;

    let response = ApiResponse::new(PaymentRequestDetailDto::from(detail));
    Ok((StatusCode::OK, Json(response)))
}

/// POST /internal/payment-requests/{id}/transition
pub async fn transition_payment_request(
    State(state): State<Arc<PaymentRequestState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<PaymentTransitionRequest>,
) -> Result<impl IntoResponse, CoreError> {
    validate_request(&req)?;
    let version = parse_version(req.version)?;
    let target = parse_enum::<CaseStatus>("target", &req.target)?;
    let disbursement = Disbursement {
        apv_number:   req.apv_number,
        cv_number:    req.cv_number,
        check_number: req.check_number,
    };

    let payment = state
        .usecase
        .transition(
            &PaymentRequestId::from_uuid(id),
            target,
            version,
            &UserId::from_uuid(req.actor_id),
            req.comment.as_deref(),
            disbursement,
        )
        .await?;

    let response = ApiResponse::new(PaymentRequestDto::from(&payment));
    Ok((StatusCode::OK, Json(response)))
}

/// GET /internal/payment-requests/{id}/audit-logs
pub async fn get_payment_request_audit_trail(
    State(state): State<Arc<PaymentRequestState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<ViewerQuery>,
) -> Result<impl IntoResponse, CoreError> {
    let logs = state
        .usecase
        .audit_trail(&PaymentRequestId::from_uuid(id), &UserId::from_uuid(query.actor_id))
        .await?;

    let items: Vec<AuditLogDto> = logs.into_iter().map(AuditLogDto::from).collect();
    Ok((StatusCode::OK, Json(ApiResponse::new(items))))
}
