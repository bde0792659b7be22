//! テスト共通フィクスチャ
//!
//! DB を使用する統合テストで共通利用するシード・エンティティ生成ヘルパー。

// 各テストファイルが独立したクレートとしてコンパイルされるため、
// 使用しない関数に dead_code 警告が出る。モジュール全体で抑制する。
#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use procureflow_domain::{
    approval::ApprovalStep,
    case::Case,
    quote::{VendorQuote, VendorQuoteRecord},
    requisition::{Requisition, RequisitionRecord},
    role::{Actor, Role},
    test_support,
    user::UserId,
    value_objects::{RefNumber, RefPrefix},
    vendor::Vendor,
};
use procureflow_infra::{
    db::{PgTransactionManager, TransactionManager},
    repository::{
        ApprovalStepRepository,
        PostgresApprovalStepRepository,
        PostgresRequisitionRepository,
        PostgresVendorRepository,
        RequisitionRepository,
        VendorRepository,
    },
};
use sqlx::PgPool;

/// テスト用の固定日時
pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

/// 指定 ID・ロールのユーザーを登録する
pub async fn insert_user_with_id(pool: &PgPool, id: &UserId, role: Role) {
    let role: &str = role.into();
    sqlx::query("INSERT INTO users (id, name, email, role) VALUES ($1, $2, $3, $4)")
        .bind(id.as_uuid())
        .bind(format!("user-{role}"))
        .bind(format!("{}@example.com", id.as_uuid()))
        .bind(role)
        .execute(pool)
        .await
        .unwrap();
}

/// 指定ロールのユーザーを登録し、操作者として返す
pub async fn insert_actor(pool: &PgPool, role: Role) -> Actor {
    let actor = test_support::actor(role);
    insert_user_with_id(pool, actor.id(), role).await;
    actor
}

/// 認定済みの業者を登録する
pub async fn insert_vendor(pool: &PgPool, name: &str) -> Vendor {
    let vendor = test_support::active_vendor(name);
    let tx_manager = PgTransactionManager::new(pool.clone());
    let mut tx = tx_manager.begin().await.unwrap();
    PostgresVendorRepository::new(pool.clone())
        .insert(&mut tx, &vendor)
        .await
        .unwrap();
    tx.commit().await.unwrap();
    vendor
}

/// 購買申請を申請者とともに登録する
pub async fn insert_requisition(pool: &PgPool, requisition: &Requisition) {
    insert_user_with_id(pool, requisition.requested_by(), Role::Requester).await;

    let tx_manager = PgTransactionManager::new(pool.clone());
    let mut tx = tx_manager.begin().await.unwrap();
    PostgresRequisitionRepository::new(pool.clone())
        .insert(&mut tx, requisition)
        .await
        .unwrap();
    tx.commit().await.unwrap();
}

/// 参照番号だけを差し替えた購買申請を返す
pub fn with_ref_sequence(requisition: Requisition, sequence: i64) -> Requisition {
    Requisition::from_db(RequisitionRecord {
        id: requisition.id().clone(),
        ref_number: RefNumber::new(RefPrefix::Requisition, 2026, sequence).unwrap(),
        title: requisition.title().clone(),
        department: requisition.department().to_string(),
        requested_by: requisition.requested_by().clone(),
        date_needed: requisition.date_needed(),
        priority: requisition.priority(),
        description: requisition.description().map(str::to_string),
        line_items: requisition.line_items().to_vec(),
        estimated_total: requisition.estimated_total(),
        provided_document_types: requisition.provided_document_types().to_vec(),
        checklist_satisfied: requisition.checklist_satisfied(),
        state: requisition.state().clone(),
        created_at: requisition.created_at(),
    })
}

/// 申請済みの購買申請と承認チェーンを登録する
///
/// 参照番号は登録済みの件数から連番で振る。
pub async fn insert_submitted_requisition(pool: &PgPool, total: i64) -> (Case, Vec<ApprovalStep>) {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM requisitions")
        .fetch_one(pool)
        .await
        .unwrap();
    let (case, steps) = test_support::submitted_requisition(total, test_now());
    let requisition = with_ref_sequence(case.into_requisition().unwrap(), count + 1);
    insert_requisition(pool, &requisition).await;

    let tx_manager = PgTransactionManager::new(pool.clone());
    let mut tx = tx_manager.begin().await.unwrap();
    let step_repo = PostgresApprovalStepRepository::new(pool.clone());
    for step in &steps {
        step_repo.insert(&mut tx, step).await.unwrap();
    }
    tx.commit().await.unwrap();

    (Case::from(requisition), steps)
}

/// 業者・登録者を登録したうえで、購買申請に対する見積を組み立てる
pub async fn build_quote(
    pool: &PgPool,
    requisition: &Requisition,
    vendor_name: &str,
    total: i64,
) -> VendorQuote {
    let vendor = insert_vendor(pool, vendor_name).await;
    let officer = insert_actor(pool, Role::ProcOfficer).await;
    let base = test_support::quote_with_total(requisition, total, true, test_now());

    VendorQuote::from_db(VendorQuoteRecord {
        id: base.id().clone(),
        requisition_id: requisition.id().clone(),
        vendor_id: vendor.id().clone(),
        lines: base.lines().to_vec(),
        grand_total: base.grand_total(),
        is_complete: base.is_complete(),
        is_compliant: base.is_compliant(),
        compliance_notes: None,
        is_awarded: false,
        registered_by: officer.id().clone(),
        version: base.version(),
        created_at: test_now(),
        updated_at: test_now(),
    })
}
