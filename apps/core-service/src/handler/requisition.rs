//! # 購買申請ハンドラ
//!
//! ## エンドポイント
//!
//! - `GET /internal/requisitions` - 一覧（`status` で絞り込み）
//! - `POST /internal/requisitions` - 起票
//! - `GET /internal/requisitions/{id}` - 詳細（ステップ・見積・落札通知付き）
//! - `PUT /internal/requisitions/{id}` - 下書き・差戻しの編集
//! - `POST /internal/requisitions/{id}/checklist` - 提出書類の更新
//! - `POST /internal/requisitions/{id}/submit` - 申請
//! - `POST /internal/requisitions/{id}/transition` - ステータス遷移
//! - `GET /internal/requisitions/{id}/audit-logs` - 監査証跡

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
    requisition::{LineItemInput, Priority, Requisition, RequisitionContent, RequisitionId},
    user::UserId,
    value_objects::CaseTitle,
};
use procureflow_shared::ApiResponse;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{
    dto::{
        ApprovalStepDto,
        AuditLogDto,
        CaseStateDto,
        NoticeToAwardDto,
        PurchaseOrderDto,
        VendorQuoteDto,
    },
    parse_enum,
    parse_version,
    validate_request,
};
use crate::{
    error::CoreError,
    usecase::{RequisitionDetail, RequisitionUseCaseImpl},
};

/// 購買申請 API の共有状態
pub struct RequisitionState {
    pub usecase: RequisitionUseCaseImpl,
}

// --- リクエスト/レスポンス型 ---

/// 明細の入力
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct LineItemRequest {
    #[validate(length(min = 1, max = 500))]
    pub description:         String,
    #[validate(length(max = 50))]
    #[serde(default)]
    pub unit:                String,
    pub quantity:            Decimal,
    pub estimated_unit_cost: Decimal,
}

/// 起票・編集で共通の入力
#[derive(Debug, Deserialize, Validate)]
pub struct RequisitionContentRequest {
    #[validate(length(min = 1, max = 200))]
    pub title:       String,
    #[validate(length(min = 1, max = 100))]
    pub department:  String,
    pub date_needed: Option<NaiveDate>,
    /// `normal` / `urgent`（省略時は `normal`）
    pub priority:    Option<String>,
    pub description: Option<String>,
    #[validate(length(min = 1), nested)]
    pub line_items:  Vec<LineItemRequest>,
}

impl RequisitionContentRequest {
    fn into_content(self) -> Result<RequisitionContent, CoreError> {
        let priority = match self.priority.as_deref() {
            Some(value) => parse_enum::<Priority>("priority", value)?,
            None => Priority::default(),
        };
        Ok(RequisitionContent {
            title: CaseTitle::new(self.title)?,
            department: self.department,
            date_needed: self.date_needed,
            priority,
            description: self.description,
            line_items: self
                .line_items
                .into_iter()
                .map(|line| LineItemInput {
                    description:         line.description,
                    unit:                line.unit,
                    quantity:            line.quantity,
                    estimated_unit_cost: line.estimated_unit_cost,
                })
                .collect(),
        })
    }
}

/// 起票リクエスト
#[derive(Debug, Deserialize, Validate)]
pub struct CreateRequisitionRequest {
    /// 操作するユーザー ID (内部 API 用)
    pub actor_id: Uuid,
    #[serde(flatten)]
    #[validate(nested)]
    pub content:  RequisitionContentRequest,
}

/// 編集リクエスト
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateRequisitionRequest {
    pub actor_id: Uuid,
    /// 楽観的ロック用バージョン
    pub version:  i32,
    #[serde(flatten)]
    #[validate(nested)]
    pub content:  RequisitionContentRequest,
}

/// 提出書類の更新リクエスト
#[derive(Debug, Deserialize)]
pub struct UpdateChecklistRequest {
    pub actor_id:                Uuid,
    pub version:                 i32,
    pub provided_document_types: Vec<String>,
}

/// 申請リクエスト
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub actor_id: Uuid,
    pub version:  i32,
}

/// ステータス遷移リクエスト
#[derive(Debug, Deserialize, Validate)]
pub struct TransitionRequest {
    pub actor_id: Uuid,
    pub version:  i32,
    /// 遷移先ステータス（snake_case）
    pub target:   String,
    #[validate(length(max = 2000))]
    pub comment:  Option<String>,
}

/// 一覧のクエリパラメータ
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// 閲覧者（部門による閲覧範囲の判定に使う）
    pub actor_id: Uuid,
    pub status:   Option<String>,
}

/// 参照系のクエリパラメータ
#[derive(Debug, Deserialize)]
pub struct ViewerQuery {
    pub actor_id: Uuid,
}

/// 明細 DTO
#[derive(Debug, Serialize)]
pub struct LineItemDto {
    pub id:                  Uuid,
    pub description:         String,
    pub unit:                String,
    pub quantity:            Decimal,
    pub estimated_unit_cost: Decimal,
    pub line_total:          Decimal,
    pub sort_order:          i32,
}

/// 購買申請 DTO
#[derive(Debug, Serialize)]
pub struct RequisitionDto {
    pub id:                      Uuid,
    pub ref_number:              String,
    pub title:                   String,
    pub department:              String,
    pub requested_by:            Uuid,
    pub date_needed:             Option<NaiveDate>,
    pub priority:                Priority,
    pub description:             Option<String>,
    pub line_items:              Vec<LineItemDto>,
    pub estimated_total:         Decimal,
    pub provided_document_types: Vec<String>,
    pub checklist_satisfied:     bool,
    pub state:                   CaseStateDto,
    pub created_at:              DateTime<Utc>,
}

impl From<&Requisition> for RequisitionDto {
    fn from(requisition: &Requisition) -> Self {
        Self {
            id:                      *requisition.id().as_uuid(),
            ref_number:              requisition.ref_number().to_string(),
            title:                   requisition.title().as_str().to_string(),
            department:              requisition.department().to_string(),
            requested_by:            *requisition.requested_by().as_uuid(),
            date_needed:             requisition.date_needed(),
            priority:                requisition.priority(),
            description:             requisition.description().map(str::to_string),
            line_items:              requisition
                .line_items()
                .iter()
                .map(|item| LineItemDto {
                    id:                  *item.id().as_uuid(),
                    description:         item.description().to_string(),
                    unit:                item.unit().to_string(),
                    quantity:            item.quantity(),
                    estimated_unit_cost: item.estimated_unit_cost(),
                    line_total:          item.line_total(),
                    sort_order:          item.sort_order(),
                })
                .collect(),
            estimated_total:         requisition.estimated_total(),
            provided_document_types: requisition.provided_document_types().to_vec(),
            checklist_satisfied:     requisition.checklist_satisfied(),
            state:                   CaseStateDto::from(requisition.state()),
            created_at:              requisition.created_at(),
        }
    }
}

/// 購買申請詳細 DTO
#[derive(Debug, Serialize)]
pub struct RequisitionDetailDto {
    #[serde(flatten)]
    pub requisition:    RequisitionDto,
    pub steps:          Vec<ApprovalStepDto>,
    pub quotes:         Vec<VendorQuoteDto>,
    pub notice:         Option<NoticeToAwardDto>,
    pub purchase_order: Option<PurchaseOrderDto>,
}

impl From<RequisitionDetail> for RequisitionDetailDto {
    fn from(detail: RequisitionDetail) -> Self {
        Self {
            requisition:    RequisitionDto::from(&detail.requisition),
            steps:          detail.steps.iter().map(ApprovalStepDto::from).collect(),
            quotes:         detail.quotes.iter().map(VendorQuoteDto::from).collect(),
            notice:         detail.notice.as_ref().map(NoticeToAwardDto::from),
            purchase_order: detail.purchase_order.as_ref().map(PurchaseOrderDto::from),
        }
    }
}

// --- ハンドラ ---

/// GET /internal/requisitions
pub async fn list_requisitions(
    State(state): State<Arc<RequisitionState>>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, CoreError> {
    let status = query
        .status
        .as_deref()
        .map(|s| parse_enum::<CaseStatus>("status", s))
        .transpose()?;

    let requisitions = state
        .usecase
        .list(status, &UserId::from_uuid(query.actor_id))
        .await?;

    let items: Vec<RequisitionDto> = requisitions.iter().map(RequisitionDto::from).collect();
    Ok((StatusCode::OK, Json(ApiResponse::new(items))))
}

/// POST /internal/requisitions
pub async fn create_requisition(
    State(state): State<Arc<RequisitionState>>,
    Json(req): Json<CreateRequisitionRequest>,
) -> Result<impl IntoResponse, CoreError> {
    validate_request(&req)?;
    let actor_id = UserId::from_uuid(req.actor_id);

    let requisition = state
        .usecase
        .create(req.content.into_content()?, &actor_id)
        .await?;

    let response = ApiResponse::new(RequisitionDto::from(&requisition));
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /internal/requisitions/{id}
pub async fn get_requisition(
    State(state): State<Arc<RequisitionState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<ViewerQuery>,
) -> Result<impl IntoResponse, CoreError> {
    let detail = state
        .usecase
        .get(&RequisitionId::from_uuid(id), &UserId::from_uuid(query.actor_id))
        .await?;

    let response = ApiResponse::new(RequisitionDetailDto::from(detail));
    Ok((StatusCode::OK, Json(response)))
}

/// PUT /internal/requisitions/{id}
pub async fn update_requisition(
    State(state): State<Arc<RequisitionState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateRequisitionRequest>,
) -> Result<impl IntoResponse, CoreError> {
    validate_request(&req)?;
    let version = parse_version(req.version)?;
    let actor_id = UserId::from_uuid(req.actor_id);

    let requisition = state
        .usecase
        .update(
            &RequisitionId::from_uuid(id),
            req.content.into_content()?,
            version,
            &actor_id,
        )
        .await?;

    let response = ApiResponse::new(RequisitionDto::from(&requisition));
    Ok((StatusCode::OK, Json(response)))
}

/// POST /internal/requisitions/{id}/checklist
pub async fn update_checklist(
    State(state): State<Arc<RequisitionState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateChecklistRequest>,
) -> Result<impl IntoResponse, CoreError> {
    let version = parse_version(req.version)?;

    let requisition = state
        .usecase
        .update_checklist(
            &RequisitionId::from_uuid(id),
            req.provided_document_types,
            version,
            &UserId::from_uuid(req.actor_id),
        )
        .await?;

    let response = ApiResponse::new(RequisitionDto::from(&requisition));
    Ok((StatusCode::OK, Json(response)))
}

/// POST /internal/requisitions/{id}/submit
///
/// 承認チェーンを生成して `submitted` にする。
pub async fn submit_requisition(
    State(state): State<Arc<RequisitionState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<SubmitRequest>,
) -> Result<impl IntoResponse, CoreError> {
    let version = parse_version(req.version)?;
    let id = RequisitionId::from_uuid(id);
    let actor_id = UserId::from_uuid(req.actor_id);

    state.usecase.submit(&id, version, &actor_id).await?;
    let detail = state.usecase.get(&id, &actor_id).await?;

    let response = ApiResponse::new(RequisitionDetailDto::from(detail));
    Ok((StatusCode::OK, Json(response)))
}

/// POST /internal/requisitions/{id}/transition
pub async fn transition_requisition(
    State(state): State<Arc<RequisitionState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<TransitionRequest>,
) -> Result<impl IntoResponse, CoreError> {
    validate_request(&req)?;
    let version = parse_version(req.version)?;
    let target = parse_enum::<CaseStatus>("target", &req.target)?;

    let requisition = state
        .usecase
        .transition(
            &RequisitionId::from_uuid(id),
            target,
            version,
            &UserId::from_uuid(req.actor_id),
            req.comment.as_deref(),
        )
        .await?;

    let response = ApiResponse::new(RequisitionDto::from(&requisition));
    Ok((StatusCode::OK, Json(response)))
}

/// GET /internal/requisitions/{id}/audit-logs
///
/// 申請・ステップ・見積・落札通知・発注書・検収の監査ログを時系列で返す。
pub async fn get_requisition_audit_trail(
    State(state): State<Arc<RequisitionState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<ViewerQuery>,
) -> Result<impl IntoResponse, CoreError> {
    let logs = state
        .usecase
        .audit_trail(&RequisitionId::from_uuid(id), &UserId::from_uuid(query.actor_id))
        .await?;

    let items: Vec<AuditLogDto> = logs.into_iter().map(AuditLogDto::from).collect();
    Ok((StatusCode::OK, Json(ApiResponse::new(items))))
}
