//! トランザクションと楽観的ロックの統合テスト
//!
//! 同じ承認ステップへの二重操作と、途中失敗時のロールバックを検証する。
//! 2 つのトランザクションを順に実行し、後続が先行のコミット結果を見て
//! Conflict になることを確認する。
//!
//! 実行方法:
//! ```bash
//! DATABASE_URL=postgres://... cargo test -p procureflow-infra --features db-tests
//! ```

#![cfg(feature = "db-tests")]

mod common;

use common::{insert_actor, insert_submitted_requisition, test_now};
use pretty_assertions::assert_eq;
use procureflow_domain::{
    approval::{StepAction, StepDecision},
    case::CaseStatus,
    role::Role,
};
use procureflow_infra::{
    InfraErrorKind,
    db::{PgTransactionManager, TransactionManager},
    repository::{
        ApprovalStepRepository,
        PostgresApprovalStepRepository,
        PostgresRequisitionRepository,
        RequisitionRepository,
    },
};
use sqlx::PgPool;

#[sqlx::test(migrations = "../../migrations")]
async fn test_同じステップへの二重操作は1件だけ成功する(pool: PgPool) {
    let (_, steps) = insert_submitted_requisition(&pool, 100_000).await;
    let approver = insert_actor(&pool, Role::DeptHead).await;
    let tx_manager = PgTransactionManager::new(pool.clone());
    let step_repo = PostgresApprovalStepRepository::new(pool.clone());
    let step = steps[0].clone();
    let expected_version = step.version();

    // TX_A: 承認
    let approved = step
        .clone()
        .actioned(StepDecision::Approved, approver.id().clone(), None, test_now())
        .unwrap();
    let mut tx_a = tx_manager.begin().await.unwrap();
    step_repo
        .record_action(&mut tx_a, &approved, expected_version)
        .await
        .unwrap();
    tx_a.commit().await.unwrap();

    // TX_B: 同じバージョンを前提に承認
    let mut tx_b = tx_manager.begin().await.unwrap();
    let result = step_repo
        .record_action(&mut tx_b, &approved, expected_version)
        .await;

    let err = result.unwrap_err();
    assert!(matches!(err.kind(), InfraErrorKind::Conflict { .. }));

    let stored = step_repo.find_by_id(step.id()).await.unwrap().unwrap();
    assert_eq!(stored.action(), StepAction::Approved);
    assert_eq!(stored.actor_id(), Some(approver.id()));
    assert_eq!(stored.version(), expected_version.next());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_処理済みステップへの判断はバージョンが一致してもconflictになる(pool: PgPool) {
    let (_, steps) = insert_submitted_requisition(&pool, 100_000).await;
    let approver = insert_actor(&pool, Role::DeptHead).await;
    let tx_manager = PgTransactionManager::new(pool.clone());
    let step_repo = PostgresApprovalStepRepository::new(pool.clone());
    let step = steps[0].clone();

    // バージョンは据え置いたまま action だけを処理済みにする
    sqlx::query("UPDATE approval_steps SET action = 'cancelled' WHERE id = $1")
        .bind(step.id().as_uuid())
        .execute(&pool)
        .await
        .unwrap();

    let approved = step
        .clone()
        .actioned(StepDecision::Approved, approver.id().clone(), None, test_now())
        .unwrap();
    let mut tx = tx_manager.begin().await.unwrap();
    let result = step_repo.record_action(&mut tx, &approved, step.version()).await;

    assert!(matches!(result.unwrap_err().kind(), InfraErrorKind::Conflict { .. }));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_途中でconflictになると案件の更新もロールバックされる(pool: PgPool) {
    let (case, steps) = insert_submitted_requisition(&pool, 100_000).await;
    let approver = insert_actor(&pool, Role::DeptHead).await;
    let tx_manager = PgTransactionManager::new(pool.clone());
    let step_repo = PostgresApprovalStepRepository::new(pool.clone());
    let requisition_repo = PostgresRequisitionRepository::new(pool.clone());
    let step = steps[0].clone();
    let requisition = case.clone().into_requisition().unwrap();

    // 先行: 別経路でステップを処理済みにする
    let approved = step
        .clone()
        .actioned(StepDecision::Approved, approver.id().clone(), None, test_now())
        .unwrap();
    let mut tx_a = tx_manager.begin().await.unwrap();
    step_repo
        .record_action(&mut tx_a, &approved, step.version())
        .await
        .unwrap();
    tx_a.commit().await.unwrap();

    // 後続: 案件を先に更新し、ステップ更新で Conflict
    let advanced = case
        .map_state(|s| s.transitioned(CaseStatus::UnderReview, None, test_now()))
        .into_requisition()
        .unwrap();
    let mut tx_b = tx_manager.begin().await.unwrap();
    requisition_repo
        .update_with_version_check(&mut tx_b, &advanced, requisition.state().version())
        .await
        .unwrap();
    let result = step_repo
        .record_action(&mut tx_b, &approved, step.version())
        .await;
    assert!(result.is_err());
    drop(tx_b);

    let stored = requisition_repo
        .find_by_id(requisition.id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.state().status(), CaseStatus::Submitted);
    assert_eq!(stored.state().version(), requisition.state().version());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_古いバージョンでの案件更新はconflictになる(pool: PgPool) {
    let (case, _) = insert_submitted_requisition(&pool, 100_000).await;
    let tx_manager = PgTransactionManager::new(pool.clone());
    let requisition_repo = PostgresRequisitionRepository::new(pool.clone());
    let requisition = case.clone().into_requisition().unwrap();
    let stale_version = requisition.state().version();

    let held = case
        .map_state(|s| s.transitioned(CaseStatus::OnHold, Some("予算確認中"), test_now()))
        .into_requisition()
        .unwrap();
    let mut tx_a = tx_manager.begin().await.unwrap();
    requisition_repo
        .update_with_version_check(&mut tx_a, &held, stale_version)
        .await
        .unwrap();
    tx_a.commit().await.unwrap();

    let mut tx_b = tx_manager.begin().await.unwrap();
    let result = requisition_repo
        .update_with_version_check(&mut tx_b, &held, stale_version)
        .await;

    assert!(matches!(result.unwrap_err().kind(), InfraErrorKind::Conflict { .. }));
    let stored = requisition_repo
        .find_by_id(requisition.id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.state().status(), CaseStatus::OnHold);
    assert_eq!(stored.state().hold_reason(), Some("予算確認中"));
    assert_eq!(stored.state().status_before_hold(), Some(CaseStatus::Submitted));
}
