//! PostgresApprovalStepRepository の統合テスト

#![cfg(feature = "db-tests")]

mod common;

use chrono::Duration;
use common::{insert_submitted_requisition, test_now};
use pretty_assertions::assert_eq;
use procureflow_domain::{
    approval::{ApprovalStep, ApprovalStepId, NewApprovalStep, StepAction},
    case::CaseStatus,
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
async fn test_案件のステップを番号順に取得できる(pool: PgPool) {
    let (case, steps) = insert_submitted_requisition(&pool, 600_000).await;
    let repo = PostgresApprovalStepRepository::new(pool);

    let stored = repo.find_by_case(&case.case_ref()).await.unwrap();

    assert_eq!(stored, steps);
    assert!(stored.iter().all(|step| step.action() == StepAction::Pending));
    assert_eq!(
        stored.iter().map(|step| step.step_number()).collect::<Vec<_>>(),
        (1..=steps.len() as i32).collect::<Vec<_>>()
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_同じステップ番号の登録は入力エラーになる(pool: PgPool) {
    let (_, steps) = insert_submitted_requisition(&pool, 100_000).await;
    let repo = PostgresApprovalStepRepository::new(pool.clone());

    let tx_manager = PgTransactionManager::new(pool.clone());
    let mut tx = tx_manager.begin().await.unwrap();
    let duplicate = ApprovalStep::new(NewApprovalStep {
        id: ApprovalStepId::new(),
        case: steps[0].case().clone(),
        step_number: steps[0].step_number(),
        cycle: steps[0].cycle(),
        position: steps[0].position(),
        step_label: steps[0].step_label().to_string(),
        role_required: steps[0].role_required(),
        sla_deadline: steps[0].sla_deadline(),
        now: test_now(),
    });
    let result = repo.insert(&mut tx, &duplicate).await;

    assert!(matches!(result.unwrap_err().kind(), InfraErrorKind::InvalidInput(_)));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_未処理ステップのみ削除できる(pool: PgPool) {
    let (case, steps) = insert_submitted_requisition(&pool, 100_000).await;
    let repo = PostgresApprovalStepRepository::new(pool.clone());
    let ids = steps.iter().map(|step| step.id().clone()).collect::<Vec<_>>();

    let tx_manager = PgTransactionManager::new(pool.clone());
    let mut tx = tx_manager.begin().await.unwrap();
    repo.delete_pending(&mut tx, &ids).await.unwrap();
    tx.commit().await.unwrap();

    assert!(repo.find_by_case(&case.case_ref()).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_処理済みステップを含む削除はconflictになる(pool: PgPool) {
    let (case, steps) = insert_submitted_requisition(&pool, 100_000).await;
    let repo = PostgresApprovalStepRepository::new(pool.clone());
    sqlx::query("UPDATE approval_steps SET action = 'cancelled' WHERE id = $1")
        .bind(steps[0].id().as_uuid())
        .execute(&pool)
        .await
        .unwrap();
    let ids = steps.iter().map(|step| step.id().clone()).collect::<Vec<_>>();

    let tx_manager = PgTransactionManager::new(pool.clone());
    let mut tx = tx_manager.begin().await.unwrap();
    let result = repo.delete_pending(&mut tx, &ids).await;
    assert!(matches!(result.unwrap_err().kind(), InfraErrorKind::Conflict { .. }));
    drop(tx);

    assert_eq!(repo.find_by_case(&case.case_ref()).await.unwrap().len(), steps.len());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_期限切れの未処理ステップを取得できる(pool: PgPool) {
    let (_, steps) = insert_submitted_requisition(&pool, 100_000).await;
    let repo = PostgresApprovalStepRepository::new(pool);
    let after_deadline = steps[0].sla_deadline() + Duration::minutes(1);

    let overdue = repo.find_overdue(after_deadline).await.unwrap();

    assert!(overdue.iter().any(|step| step.id() == steps[0].id()));
    assert!(overdue.iter().all(|step| step.sla_deadline() < after_deadline));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_前段が未承認のステップは期限切れに含めない(pool: PgPool) {
    let (_, steps) = insert_submitted_requisition(&pool, 100_000).await;
    let repo = PostgresApprovalStepRepository::new(pool);
    let all_passed = steps
        .iter()
        .map(ApprovalStep::sla_deadline)
        .max()
        .unwrap()
        + Duration::minutes(1);

    let overdue = repo.find_overdue(all_passed).await.unwrap();

    let ids = overdue.iter().map(|step| step.id().clone()).collect::<Vec<_>>();
    assert_eq!(ids, vec![steps[0].id().clone()]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_超過記録済みと保留中案件のステップは期限切れに含めない(pool: PgPool) {
    let (breached_case, breached_steps) = insert_submitted_requisition(&pool, 100_000).await;
    let repo = PostgresApprovalStepRepository::new(pool.clone());
    let requisition_repo = PostgresRequisitionRepository::new(pool.clone());
    let after_deadline = breached_steps[0].sla_deadline() + Duration::minutes(1);

    // 1 件目: 超過を記録済み
    let tx_manager = PgTransactionManager::new(pool.clone());
    let mut tx = tx_manager.begin().await.unwrap();
    let flagged = breached_steps[0].clone().sla_breached(after_deadline).unwrap();
    repo.update_with_version_check(&mut tx, &flagged, breached_steps[0].version())
        .await
        .unwrap();
    tx.commit().await.unwrap();

    // 2 件目: 案件が保留中
    let (held_case, _) = insert_submitted_requisition(&pool, 100_000).await;
    let held = held_case
        .clone()
        .map_state(|s| s.transitioned(CaseStatus::OnHold, None, test_now()))
        .into_requisition()
        .unwrap();
    let mut tx = tx_manager.begin().await.unwrap();
    requisition_repo
        .update_with_version_check(&mut tx, &held, held_case.version())
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let overdue = repo.find_overdue(after_deadline).await.unwrap();

    assert!(overdue.iter().all(|step| step.id() != breached_steps[0].id()));
    assert!(overdue.iter().all(|step| step.case() != &held_case.case_ref()));
    assert!(overdue.iter().all(|step| step.case() == &breached_case.case_ref()));
}
