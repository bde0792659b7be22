//! # HTTP リクエストハンドラ
//!
//! axum のルートに対応するハンドラ関数と、ルーターの組み立てを定義する。
//!
//! ## 設計方針
//!
//! - 各ハンドラはサブモジュールに配置し、State はユースケースごとに分ける
//! - ハンドラは入力の形式検証と DTO 変換だけを行い、判断はユースケースに委譲する
//! - 操作者は内部 API のため `actor_id` としてリクエストで受け取る（参照系はクエリパラメータ）
//! - 形式不正（必須項目の欠落、未知の列挙値、範囲外のバージョン）は 400

pub mod approval;
pub mod dto;
pub mod health;
pub mod payment_request;
pub mod procurement;
pub mod requisition;
pub mod sla;

use std::{str::FromStr, sync::Arc};

use axum::{
    Router,
    routing::{get, post},
};
use procureflow_domain::value_objects::Version;
use validator::Validate;

pub use self::{
    approval::{ApprovalState, act_on_payment_request_step, act_on_requisition_step},
    health::health_check,
    payment_request::PaymentRequestState,
    procurement::ProcurementState,
    requisition::RequisitionState,
    sla::{SlaState, check_sla_breaches},
};
use crate::{
    error::CoreError,
    usecase::{
        ApprovalUseCaseImpl,
        PaymentRequestUseCaseImpl,
        ProcurementUseCaseImpl,
        RequisitionUseCaseImpl,
        SlaUseCaseImpl,
        UseCaseDeps,
    },
};

/// 全エンドポイントを持つルーターを組み立てる
///
/// レイヤー（トレース、リクエスト ID）は呼び出し側で付与する。
pub fn build_router(deps: UseCaseDeps) -> Router {
    let requisition_state = Arc::new(RequisitionState {
        usecase: RequisitionUseCaseImpl::new(deps.clone()),
    });
    let payment_request_state = Arc::new(PaymentRequestState {
        usecase: PaymentRequestUseCaseImpl::new(deps.clone()),
    });
    let approval_state = Arc::new(ApprovalState {
        usecase: ApprovalUseCaseImpl::new(deps.clone()),
    });
    let procurement_state = Arc::new(ProcurementState {
        usecase: ProcurementUseCaseImpl::new(deps.clone()),
    });
    let sla_state = Arc::new(SlaState {
        usecase: SlaUseCaseImpl::new(deps),
    });

    Router::new()
        .route("/health", get(health_check))
        // 購買申請 API
        .merge(
            Router::new()
                .route(
                    "/internal/requisitions",
                    get(requisition::list_requisitions).post(requisition::create_requisition),
                )
                .route(
                    "/internal/requisitions/{id}",
                    get(requisition::get_requisition).put(requisition::update_requisition),
                )
                .route(
                    "/internal/requisitions/{id}/checklist",
                    post(requisition::update_checklist),
                )
                .route(
                    "/internal/requisitions/{id}/submit",
                    post(requisition::submit_requisition),
                )
                .route(
                    "/internal/requisitions/{id}/transition",
                    post(requisition::transition_requisition),
                )
                .route(
                    "/internal/requisitions/{id}/audit-logs",
                    get(requisition::get_requisition_audit_trail),
                )
                .with_state(requisition_state),
        )
        // 支払申請 API
        .merge(
            Router::new()
                .route(
                    "/internal/payment-requests",
                    get(payment_request::list_payment_requests)
                        .post(payment_request::create_payment_request),
                )
                .route(
                    "/internal/payment-requests/{id}",
                    get(payment_request::get_payment_request)
                        .put(payment_request::update_payment_request),
                )
                .route(
                    "/internal/payment-requests/{id}/submit",
                    post(payment_request::submit_payment_request),
                )
                .route(
                    "/internal/payment-requests/{id}/transition",
                    post(payment_request::transition_payment_request),
                )
                .route(
                    "/internal/payment-requests/{id}/audit-logs",
                    get(payment_request::get_payment_request_audit_trail),
                )
                .with_state(payment_request_state),
        )
        // 承認 API
        .merge(
            Router::new()
                .route(
                    "/internal/requisitions/{id}/steps/{step_id}/act",
                    post(act_on_requisition_step),
                )
                .route(
                    "/internal/payment-requests/{id}/steps/{step_id}/act",
                    post(act_on_payment_request_step),
                )
                .route(
                    "/internal/requisitions/{id}/resume",
                    post(approval::resume_requisition),
                )
                .route(
                    "/internal/payment-requests/{id}/resume",
                    post(approval::resume_payment_request),
                )
                .with_state(approval_state),
        )
        // 調達 API
        .merge(
            Router::new()
                .route(
                    "/internal/requisitions/{id}/quotes",
                    post(procurement::register_quote),
                )
                .route(
                    "/internal/requisitions/{id}/quotes/{quote_id}/evaluate",
                    post(procurement::evaluate_quote),
                )
                .route(
                    "/internal/requisitions/{id}/quote-exception",
                    post(procurement::approve_quote_exception),
                )
                .route(
                    "/internal/requisitions/{id}/award",
                    post(procurement::award_vendor),
                )
                .route(
                    "/internal/requisitions/{id}/mark-sent",
                    post(procurement::mark_sent),
                )
                .route(
                    "/internal/requisitions/{id}/purchase-order",
                    get(procurement::get_purchase_order),
                )
                .route(
                    "/internal/requisitions/{id}/goods-receipts",
                    post(procurement::record_goods_receipt),
                )
                .route(
                    "/internal/requisitions/{id}/complete",
                    post(procurement::complete_fulfillment),
                )
                .with_state(procurement_state),
        )
        // SLA API
        .merge(
            Router::new()
                .route("/internal/sla/check", post(check_sla_breaches))
                .with_state(sla_state),
        )
}

/// リクエストボディの形式を検証する
pub(crate) fn validate_request(request: &impl Validate) -> Result<(), CoreError> {
    request
        .validate()
        .map_err(|e| CoreError::BadRequest(e.to_string()))
}

/// 文字列の列挙値を解釈する（未知の値は 400）
pub(crate) fn parse_enum<T: FromStr>(field: &str, value: &str) -> Result<T, CoreError> {
    value
        .parse()
        .map_err(|_| CoreError::BadRequest(format!("{field} の値が不正です: {value}")))
}

/// リクエストのバージョン番号を値オブジェクトに変換する
pub(crate) fn parse_version(value: i32) -> Result<Version, CoreError> {
    u32::try_from(value)
        .ok()
        .and_then(|v| Version::new(v).ok())
        .ok_or_else(|| CoreError::BadRequest(format!("version の値が不正です: {value}")))
}

#[cfg(test)]
mod tests {
    use procureflow_domain::case::CaseStatus;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(1, true)]
    #[case(42, true)]
    #[case(0, false)]
    #[case(-1, false)]
    fn test_バージョン番号の変換(#[case] value: i32, #[case] ok: bool) {
        assert_eq!(parse_version(value).is_ok(), ok);
    }

    #[test]
    fn test_未知の列挙値は400() {
        let result = parse_enum::<CaseStatus>("target", "archived");

        assert!(matches!(result, Err(CoreError::BadRequest(_))));
    }

    #[test]
    fn test_既知の列挙値を解釈できる() {
        let status: CaseStatus = parse_enum("target", "for_quoting").unwrap();

        assert_eq!(status, CaseStatus::ForQuoting);
    }
}
