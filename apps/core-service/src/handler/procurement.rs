//! # 調達ハンドラ
//!
//! ## エンドポイント
//!
//! - `POST /internal/requisitions/{id}/quotes` - 業者見積の登録
//! - `POST /internal/requisitions/{id}/quotes/{quote_id}/evaluate` - 仕様適合の評価
//! - `POST /internal/requisitions/{id}/quote-exception` - 見積 3 件未満の例外承認
//! - `POST /internal/requisitions/{id}/award` - 落札と落札通知の発行
//! - `POST /internal/requisitions/{id}/mark-sent` - 落札通知の送付記録、発注書の発行と送付記録
//! - `GET /internal/requisitions/{id}/purchase-order` - 発注書と検収記録
//! - `POST /internal/requisitions/{id}/goods-receipts` - 検収の記録
//! - `POST /internal/requisitions/{id}/complete` - 納品完了

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::NaiveDate;
use procureflow_domain::{
    purchase_order::{
        GoodsReceiptContent,
        GoodsReceiptLineInput,
        PurchaseOrderLineId,
        PurchaseOrderTerms,
    },
    quote::{QuoteLineInput, VendorQuoteId},
    requisition::{RequisitionId, RequisitionLineItemId},
    user::UserId,
    vendor::VendorId,
};
use procureflow_shared::ApiResponse;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{
    dto::{AuditLogDto, GoodsReceiptDto, NoticeToAwardDto, PurchaseOrderDto, VendorQuoteDto},
    parse_enum,
    parse_version,
    requisition::{RequisitionDto, ViewerQuery},
    validate_request,
};
use crate::{
    error::CoreError,
    usecase::{
        AwardInput,
        MarkSentDocument,
        MarkSentInput,
        ProcurementUseCaseImpl,
        PurchaseOrderDetail,
        RecordGoodsReceiptInput,
        RegisterQuoteInput,
    },
};

/// 調達 API の共有状態
pub struct ProcurementState {
    pub usecase: ProcurementUseCaseImpl,
}

// --- リクエスト/レスポンス型 ---

/// 見積明細の入力
#[derive(Debug, Deserialize)]
pub struct QuoteLineRequest {
    pub line_item_id: Uuid,
    pub unit_price:   Decimal,
}

/// 見積登録リクエスト
#[derive(Debug, Deserialize)]
pub struct RegisterQuoteRequest {
    pub actor_id:  Uuid,
    pub vendor_id: Uuid,
    /// 単価を提示しなかった明細は省略する
    pub lines:     Vec<QuoteLineRequest>,
}

/// 見積のパスパラメータ
#[derive(Debug, Deserialize)]
pub struct QuotePathParams {
    pub id:       Uuid,
    pub quote_id: Uuid,
}

/// 見積評価リクエスト
#[derive(Debug, Deserialize, Validate)]
pub struct EvaluateQuoteRequest {
    pub actor_id:     Uuid,
    pub is_compliant: bool,
    #[validate(length(max = 2000))]
    pub notes:        Option<String>,
    /// 見積のバージョン
    pub version:      i32,
}

/// 見積例外の承認リクエスト
#[derive(Debug, Deserialize, Validate)]
pub struct QuoteExceptionRequest {
    pub actor_id:      Uuid,
    #[validate(length(min = 1, max = 2000))]
    pub justification: String,
}

/// 落札リクエスト
#[derive(Debug, Deserialize, Validate)]
pub struct AwardRequest {
    pub actor_id:      Uuid,
    pub quote_id:      Uuid,
    /// 最安の有効見積以外を選ぶ場合は必須
    #[validate(length(max = 2000))]
    pub justification: Option<String>,
    /// 購買申請のバージョン
    pub version:       i32,
}

/// 送付記録リクエスト
#[derive(Debug, Deserialize, Validate)]
pub struct MarkSentRequest {
    pub actor_id:       Uuid,
    /// `nta` / `purchase_order`
    pub document:       String,
    pub version:        i32,
    /// 発注書の納品条件
    #[validate(length(max = 2000))]
    pub delivery_terms: Option<String>,
    /// 発注書の支払条件
    #[validate(length(max = 2000))]
    pub payment_terms:  Option<String>,
}

/// 検収明細の入力
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct GoodsReceiptLineRequest {
    pub po_line_id:        Uuid,
    pub quantity_received: Decimal,
    #[validate(length(max = 500))]
    pub remarks:           Option<String>,
}

/// 検収記録リクエスト
#[derive(Debug, Deserialize, Validate)]
pub struct RecordGoodsReceiptRequest {
    pub actor_id:      Uuid,
    pub received_date: NaiveDate,
    #[validate(length(max = 2000))]
    pub remarks:       Option<String>,
    #[validate(nested)]
    pub lines:         Vec<GoodsReceiptLineRequest>,
}

/// 納品完了リクエスト
#[derive(Debug, Deserialize, Validate)]
pub struct CompleteRequest {
    pub actor_id: Uuid,
    #[validate(length(max = 2000))]
    pub comment:  Option<String>,
    pub version:  i32,
}

/// 落札・送付の結果 DTO
#[derive(Debug, Serialize)]
pub struct ProcurementResultDto {
    pub requisition:    RequisitionDto,
    pub notice:         Option<NoticeToAwardDto>,
    pub purchase_order: Option<PurchaseOrderDto>,
}

/// 発注明細ごとの検収状況
#[derive(Debug, Serialize)]
pub struct ReceivedQuantityDto {
    pub po_line_id: Uuid,
    pub ordered:    Decimal,
    pub received:   Decimal,
}

/// 発注書と検収記録 DTO
#[derive(Debug, Serialize)]
pub struct PurchaseOrderDetailDto {
    pub purchase_order: PurchaseOrderDto,
    pub receipts:       Vec<GoodsReceiptDto>,
    pub received:       Vec<ReceivedQuantityDto>,
    pub fully_received: bool,
}

impl From<PurchaseOrderDetail> for PurchaseOrderDetailDto {
    fn from(detail: PurchaseOrderDetail) -> Self {
        let received = detail.order.received_quantities(&detail.receipts);
        Self {
            purchase_order: PurchaseOrderDto::from(&detail.order),
            receipts:       detail.receipts.iter().map(GoodsReceiptDto::from).collect(),
            received:       detail
                .order
                .lines()
                .iter()
                .map(|line| ReceivedQuantityDto {
                    po_line_id: *line.id().as_uuid(),
                    ordered:    line.quantity(),
                    received:   received.get(line.id()).copied().unwrap_or_default(),
                })
                .collect(),
            fully_received: detail.order.is_fully_received(&detail.receipts),
        }
    }
}

// --- ハンドラ ---

/// POST /internal/requisitions/{id}/quotes
pub async fn register_quote(
    State(state): State<Arc<ProcurementState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<RegisterQuoteRequest>,
) -> Result<impl IntoResponse, CoreError> {
    let input = RegisterQuoteInput {
        requisition_id: RequisitionId::from_uuid(id),
        vendor_id:      VendorId::from_uuid(req.vendor_id),
        lines:          req
            .lines
            .into_iter()
            .map(|line| QuoteLineInput {
                line_item_id: RequisitionLineItemId::from_uuid(line.line_item_id),
                unit_price:   line.unit_price,
            })
            .collect(),
        actor_id:       UserId::from_uuid(req.actor_id),
    };

    let quote = state.usecase.register_quote(input).await?;

    let response = ApiResponse::new(VendorQuoteDto::from(&quote));
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /internal/requisitions/{id}/quotes/{quote_id}/evaluate
pub async fn evaluate_quote(
    State(state): State<Arc<ProcurementState>>,
    Path(params): Path<QuotePathParams>,
    Json(req): Json<EvaluateQuoteRequest>,
) -> Result<impl IntoResponse, CoreError> {
    validate_request(&req)?;
    let version = parse_version(req.version)?;

    let quote = state
        .usecase
        .evaluate_quote(
            &RequisitionId::from_uuid(params.id),
            &VendorQuoteId::from_uuid(params.quote_id),
            req.is_compliant,
            req.notes,
            version,
            &UserId::from_uuid(req.actor_id),
        )
        .await?;

    let response = ApiResponse::new(VendorQuoteDto::from(&quote));
    Ok((StatusCode::OK, Json(response)))
}

/// POST /internal/requisitions/{id}/quote-exception
///
/// 社長（または管理者）のみ。
pub async fn approve_quote_exception(
    State(state): State<Arc<ProcurementState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<QuoteExceptionRequest>,
) -> Result<impl IntoResponse, CoreError> {
    validate_request(&req)?;

    let audit = state
        .usecase
        .approve_quote_exception(
            &RequisitionId::from_uuid(id),
            &req.justification,
            &UserId::from_uuid(req.actor_id),
        )
        .await?;

    let response = ApiResponse::new(AuditLogDto::from(audit));
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /internal/requisitions/{id}/award
pub async fn award_vendor(
    State(state): State<Arc<ProcurementState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<AwardRequest>,
) -> Result<impl IntoResponse, CoreError> {
    validate_request(&req)?;
    let input = AwardInput {
        requisition_id:   RequisitionId::from_uuid(id),
        quote_id:         VendorQuoteId::from_uuid(req.quote_id),
        justification:    req.justification,
        expected_version: parse_version(req.version)?,
        actor_id:         UserId::from_uuid(req.actor_id),
    };

    let result = state.usecase.award_vendor(input).await?;

    let response = ApiResponse::new(ProcurementResultDto {
        requisition:    RequisitionDto::from(&result.requisition),
        notice:         Some(NoticeToAwardDto::from(&result.notice)),
        purchase_order: None,
    });
    Ok((StatusCode::OK, Json(response)))
}

/// POST /internal/requisitions/{id}/mark-sent
///
/// `purchase_order` の場合は落札見積から発注書を発行し、購買申請を `po_issued` にする。
pub async fn mark_sent(
    State(state): State<Arc<ProcurementState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<MarkSentRequest>,
) -> Result<impl IntoResponse, CoreError> {
    validate_request(&req)?;
    let input = MarkSentInput {
        requisition_id:   RequisitionId::from_uuid(id),
        document:         parse_enum::<MarkSentDocument>("document", &req.document)?,
        terms:            PurchaseOrderTerms {
            delivery_terms: req.delivery_terms,
            payment_terms:  req.payment_terms,
        },
        expected_version: parse_version(req.version)?,
        actor_id:         UserId::from_uuid(req.actor_id),
    };

    let result = state.usecase.mark_sent(input).await?;

    let response = ApiResponse::new(ProcurementResultDto {
        requisition:    RequisitionDto::from(&result.requisition),
        notice:         result.notice.as_ref().map(NoticeToAwardDto::from),
        purchase_order: result.purchase_order.as_ref().map(PurchaseOrderDto::from),
    });
    Ok((StatusCode::OK, Json(response)))
}

/// GET /internal/requisitions/{id}/purchase-order
pub async fn get_purchase_order(
    State(state): State<Arc<ProcurementState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<ViewerQuery>,
) -> Result<impl IntoResponse, CoreError> {
    let detail = state
        .usecase
        .purchase_order(&RequisitionId::from_uuid(id), &UserId::from_uuid(query.actor_id))
        .await?;

    let response = ApiResponse::new(PurchaseOrderDetailDto::from(detail));
    Ok((StatusCode::OK, Json(response)))
}

/// POST /internal/requisitions/{id}/goods-receipts
pub async fn record_goods_receipt(
    State(state): State<Arc<ProcurementState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<RecordGoodsReceiptRequest>,
) -> Result<impl IntoResponse, CoreError> {
    validate_request(&req)?;
    let input = RecordGoodsReceiptInput {
        requisition_id: RequisitionId::from_uuid(id),
        content:        GoodsReceiptContent {
            received_date: req.received_date,
            remarks:       req.remarks,
            lines:         req
                .lines
                .into_iter()
                .map(|line| GoodsReceiptLineInput {
                    po_line_id:        PurchaseOrderLineId::from_uuid(line.po_line_id),
                    quantity_received: line.quantity_received,
                    remarks:           line.remarks,
                })
                .collect(),
        },
        actor_id:       UserId::from_uuid(req.actor_id),
    };

    let receipt = state.usecase.record_goods_receipt(input).await?;

    let response = ApiResponse::new(GoodsReceiptDto::from(&receipt));
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /internal/requisitions/{id}/complete
pub async fn complete_fulfillment(
    State(state): State<Arc<ProcurementState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<CompleteRequest>,
) -> Result<impl IntoResponse, CoreError> {
    validate_request(&req)?;
    let version = parse_version(req.version)?;

    let requisition = state
        .usecase
        .complete_fulfillment(
            &RequisitionId::from_uuid(id),
            req.comment.as_deref(),
            version,
            &UserId::from_uuid(req.actor_id),
        )
        .await?;

    let response = ApiResponse::new(RequisitionDto::from(&requisition));
    Ok((StatusCode::OK, Json(response)))
}
