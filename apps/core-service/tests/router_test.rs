//! ルーター結合テスト
//!
//! モックリポジトリで組み立てたルーターに HTTP リクエストを送り、
//! ルーティング、入力検証、ステータスコード、レスポンス形式を確認する。

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use pretty_assertions::assert_eq;
use procureflow_core_service::{handler::build_router, test_utils::TestContext};
use procureflow_domain::role::Role;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

fn router(ctx: &TestContext) -> Router {
    build_router(ctx.deps())
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn requisition_body(actor_id: &Uuid) -> Value {
    json!({
        "actor_id": actor_id,
        "title": "事務用品の購入",
        "department": "総務部",
        "date_needed": "2026-03-20",
        "line_items": [
            { "description": "コピー用紙", "unit": "箱", "quantity": "10", "estimated_unit_cost": "2500" },
            { "description": "トナー", "unit": "本", "quantity": "2", "estimated_unit_cost": "12000" }
        ]
    })
}

#[tokio::test]
async fn test_ヘルスチェックはhealthyを返す() {
    let ctx = TestContext::new();
    let app = router(&ctx);

    let (status, body) = send(&app, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_購買申請を起票すると201で参照番号が振られる() {
    let ctx = TestContext::new();
    let requester = ctx.add_user(Role::Requester);
    let app = router(&ctx);

    let (status, body) = send(
        &app,
        Method::POST,
        "/internal/requisitions",
        Some(requisition_body(requester.id().as_uuid())),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["ref_number"], "PR-2026-00001");
    assert_eq!(body["data"]["state"]["status"], "draft");
    assert_eq!(body["data"]["line_items"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_明細が空の起票は400() {
    let ctx = TestContext::new();
    let requester = ctx.add_user(Role::Requester);
    let app = router(&ctx);
    let mut body = requisition_body(requester.id().as_uuid());
    body["line_items"] = json!([]);

    let (status, body) = send(&app, Method::POST, "/internal/requisitions", Some(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);
}

#[tokio::test]
async fn test_明細の説明が長すぎる起票は400() {
    let ctx = TestContext::new();
    let requester = ctx.add_user(Role::Requester);
    let app = router(&ctx);
    let mut body = requisition_body(requester.id().as_uuid());
    body["line_items"][0]["description"] = json!("あ".repeat(501));

    let (status, _) = send(&app, Method::POST, "/internal/requisitions", Some(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_明細が空の支払申請は400() {
    let ctx = TestContext::new();
    let requester = ctx.add_user(Role::Requester);
    let app = router(&ctx);

    let (status, body) = send(
        &app,
        Method::POST,
        "/internal/payment-requests",
        Some(json!({
            "actor_id": requester.id().as_uuid(),
            "request_type": "reimbursement",
            "title": "出張旅費の精算",
            "payee_name": "山田太郎",
            "department": "営業部",
            "line_items": []
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);
}

#[tokio::test]
async fn test_下書きの支払申請を支払済みにすると422() {
    let ctx = TestContext::new();
    let requester = ctx.add_user(Role::Requester);
    let accounting = ctx.add_user(Role::AccountingStaff);
    let app = router(&ctx);
    let (status, created) = send(
        &app,
        Method::POST,
        "/internal/payment-requests",
        Some(json!({
            "actor_id": requester.id().as_uuid(),
            "request_type": "reimbursement",
            "title": "出張旅費の精算",
            "payee_name": "山田太郎",
            "department": "営業部",
            "line_items": [{ "description": "交通費", "amount": "12000" }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["data"]["id"].as_str().unwrap();

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/internal/payment-requests/{id}/transition"),
        Some(json!({
            "actor_id": accounting.id().as_uuid(),
            "version": created["data"]["state"]["version"],
            "target": "paid",
            "check_number": "CHK-0042"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_未知の遷移先は400() {
    let ctx = TestContext::new();
    let requester = ctx.add_user(Role::Requester);
    let app = router(&ctx);
    let (_, created) = send(
        &app,
        Method::POST,
        "/internal/requisitions",
        Some(requisition_body(requester.id().as_uuid())),
    )
    .await;
    let id = created["data"]["id"].as_str().unwrap();

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/internal/requisitions/{id}/transition"),
        Some(json!({ "actor_id": requester.id().as_uuid(), "version": 1, "target": "teleported" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_存在しない購買申請は404() {
    let ctx = TestContext::new();
    let admin = ctx.add_user(Role::Admin);
    let app = router(&ctx);

    let (status, body) = send(
        &app,
        Method::GET,
        &format!(
            "/internal/requisitions/{}?actor_id={}",
            Uuid::now_v7(),
            admin.id().as_uuid()
        ),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn test_閲覧者を指定しない参照は400() {
    let ctx = TestContext::new();
    let app = router(&ctx);

    let (status, _) = send(&app, Method::GET, "/internal/requisitions", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_他部門の購買申請は403() {
    let ctx = TestContext::new();
    let requester = ctx.add_user_in(Role::Requester, "総務部");
    let outsider = ctx.add_user_in(Role::Requester, "営業部");
    let colleague = ctx.add_user_in(Role::DeptHead, "総務部");
    let app = router(&ctx);
    let (_, created) = send(
        &app,
        Method::POST,
        "/internal/requisitions",
        Some(requisition_body(requester.id().as_uuid())),
    )
    .await;
    let id = created["data"]["id"].as_str().unwrap();

    let (forbidden, body) = send(
        &app,
        Method::GET,
        &format!("/internal/requisitions/{id}?actor_id={}", outsider.id().as_uuid()),
        None,
    )
    .await;
    let (allowed, _) = send(
        &app,
        Method::GET,
        &format!("/internal/requisitions/{id}?actor_id={}", colleague.id().as_uuid()),
        None,
    )
    .await;
    let (_, listed) = send(
        &app,
        Method::GET,
        &format!("/internal/requisitions?actor_id={}", outsider.id().as_uuid()),
        None,
    )
    .await;

    assert_eq!(forbidden, StatusCode::FORBIDDEN);
    assert_eq!(body["status"], 403);
    assert_eq!(allowed, StatusCode::OK);
    assert_eq!(listed["data"], json!([]));
}

#[tokio::test]
async fn test_発注書のない購買申請の発注書参照は404() {
    let ctx = TestContext::new();
    let requester = ctx.add_user(Role::Requester);
    let app = router(&ctx);
    let (_, created) = send(
        &app,
        Method::POST,
        "/internal/requisitions",
        Some(requisition_body(requester.id().as_uuid())),
    )
    .await;
    let id = created["data"]["id"].as_str().unwrap();

    let (status, _) = send(
        &app,
        Method::GET,
        &format!(
            "/internal/requisitions/{id}/purchase-order?actor_id={}",
            requester.id().as_uuid()
        ),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_発注前の検収記録は422() {
    let ctx = TestContext::new();
    let requester = ctx.add_user(Role::Requester);
    let officer = ctx.add_user(Role::ProcOfficer);
    let app = router(&ctx);
    let (_, created) = send(
        &app,
        Method::POST,
        "/internal/requisitions",
        Some(requisition_body(requester.id().as_uuid())),
    )
    .await;
    let id = created["data"]["id"].as_str().unwrap();

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/internal/requisitions/{id}/goods-receipts"),
        Some(json!({
            "actor_id": officer.id().as_uuid(),
            "received_date": "2026-03-10",
            "lines": [{ "po_line_id": Uuid::now_v7(), "quantity_received": "1" }]
        })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_古いバージョンでの編集は409() {
    let ctx = TestContext::new();
    let requester = ctx.add_user(Role::Requester);
    let app = router(&ctx);
    let (_, created) = send(
        &app,
        Method::POST,
        "/internal/requisitions",
        Some(requisition_body(requester.id().as_uuid())),
    )
    .await;
    let id = created["data"]["id"].as_str().unwrap();
    let mut update = requisition_body(requester.id().as_uuid());
    update["version"] = json!(5);

    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/internal/requisitions/{id}"),
        Some(update),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_申請から部門長の承認まで() {
    let ctx = TestContext::new();
    let requester = ctx.add_user(Role::Requester);
    let head = ctx.add_user(Role::DeptHead);
    let app = router(&ctx);
    let actor = requester.id().as_uuid();

    let (_, created) = send(
        &app,
        Method::POST,
        "/internal/requisitions",
        Some(requisition_body(actor)),
    )
    .await;
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let (status, checklist) = send(
        &app,
        Method::POST,
        &format!("/internal/requisitions/{id}/checklist"),
        Some(json!({
            "actor_id": actor,
            "version": created["data"]["state"]["version"],
            "provided_document_types": ["purchase_request_form"]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, submitted) = send(
        &app,
        Method::POST,
        &format!("/internal/requisitions/{id}/submit"),
        Some(json!({ "actor_id": actor, "version": checklist["data"]["state"]["version"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let steps = submitted["data"]["steps"].as_array().unwrap();
    // 100 万以下なので社長ステップは含まれない
    let roles: Vec<&str> = steps
        .iter()
        .map(|s| s["role_required"].as_str().unwrap())
        .collect();
    assert!(!roles.contains(&"president"));
    assert_eq!(roles[0], "dept_head");

    let first = &steps[0];
    let (status, acted) = send(
        &app,
        Method::POST,
        &format!(
            "/internal/requisitions/{id}/steps/{}/act",
            first["id"].as_str().unwrap()
        ),
        Some(json!({
            "actor_id": head.id().as_uuid(),
            "decision": "approved",
            "version": first["version"]
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(acted["data"]["step"]["action"], "approved");
    assert_eq!(acted["data"]["case"]["state"]["status"], "under_review");
}

#[tokio::test]
async fn test_未知の判断は400() {
    let ctx = TestContext::new();
    let head = ctx.add_user(Role::DeptHead);
    let app = router(&ctx);

    let (status, _) = send(
        &app,
        Method::POST,
        &format!(
            "/internal/requisitions/{}/steps/{}/act",
            Uuid::now_v7(),
            Uuid::now_v7()
        ),
        Some(json!({ "actor_id": head.id().as_uuid(), "decision": "maybe", "version": 1 })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_未知の送付書類は400() {
    let ctx = TestContext::new();
    let officer = ctx.add_user(Role::ProcOfficer);
    let app = router(&ctx);

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/internal/requisitions/{}/mark-sent", Uuid::now_v7()),
        Some(json!({ "actor_id": officer.id().as_uuid(), "document": "fax", "version": 1 })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_slaチェックは対象がなければ0件() {
    let ctx = TestContext::new();
    let app = router(&ctx);

    let (status, body) = send(&app, Method::POST, "/internal/sla/check", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({ "checked": 0, "flagged": 0 }));
}
