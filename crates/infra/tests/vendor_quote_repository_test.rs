//! PostgresVendorQuoteRepository / PostgresNoticeToAwardRepository の統合テスト

#![cfg(feature = "db-tests")]

mod common;

use common::{build_quote, insert_actor, insert_submitted_requisition, test_now};
use pretty_assertions::assert_eq;
use procureflow_domain::{
    award::{AwardBasis, AwardDecision, NoticeToAward, NtaStatus},
    requisition::Requisition,
    quote::{VendorQuote, VendorQuoteId, VendorQuoteRecord},
    role::Role,
    value_objects::{RefNumber, RefPrefix},
};
use procureflow_infra::{
    InfraErrorKind,
    db::{PgTransactionManager, TransactionManager},
    repository::{
        NoticeToAwardRepository,
        PostgresNoticeToAwardRepository,
        PostgresVendorQuoteRepository,
        VendorQuoteRepository,
    },
};
use sqlx::PgPool;

async fn submitted_requisition(pool: &PgPool) -> Requisition {
    let (case, _) = insert_submitted_requisition(pool, 300_000).await;
    case.into_requisition().unwrap()
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_見積を明細ごと登録順に取得できる(pool: PgPool) {
    let requisition = submitted_requisition(&pool).await;
    let first = build_quote(&pool, &requisition, "A 商事", 280_000).await;
    let second = build_quote(&pool, &requisition, "B 物産", 260_000).await;
    let repo = PostgresVendorQuoteRepository::new(pool.clone());

    let tx_manager = PgTransactionManager::new(pool.clone());
    let mut tx = tx_manager.begin().await.unwrap();
    repo.insert(&mut tx, &first).await.unwrap();
    repo.insert(&mut tx, &second).await.unwrap();
    tx.commit().await.unwrap();

    let quotes = repo.find_by_requisition(requisition.id()).await.unwrap();

    assert_eq!(quotes.len(), 2);
    assert!(quotes.contains(&first));
    assert!(quotes.contains(&second));
    assert_eq!(quotes[0].lines().len(), requisition.line_items().len());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_同じ業者の見積の二重登録は入力エラーになる(pool: PgPool) {
    let requisition = submitted_requisition(&pool).await;
    let quote = build_quote(&pool, &requisition, "A 商事", 280_000).await;
    let repo = PostgresVendorQuoteRepository::new(pool.clone());
    let tx_manager = PgTransactionManager::new(pool.clone());

    let mut tx = tx_manager.begin().await.unwrap();
    repo.insert(&mut tx, &quote).await.unwrap();
    tx.commit().await.unwrap();

    let duplicate = VendorQuote::from_db(VendorQuoteRecord {
        id: VendorQuoteId::new(),
        requisition_id: quote.requisition_id().clone(),
        vendor_id: quote.vendor_id().clone(),
        lines: quote.lines().to_vec(),
        grand_total: quote.grand_total(),
        is_complete: true,
        is_compliant: None,
        compliance_notes: None,
        is_awarded: false,
        registered_by: quote.registered_by().clone(),
        version: quote.version(),
        created_at: test_now(),
        updated_at: test_now(),
    });
    let mut tx = tx_manager.begin().await.unwrap();
    let result = repo.insert(&mut tx, &duplicate).await;

    assert!(matches!(result.unwrap_err().kind(), InfraErrorKind::InvalidInput(_)));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_落札フラグは申請ごとに1件までしか立たない(pool: PgPool) {
    let requisition = submitted_requisition(&pool).await;
    let first = build_quote(&pool, &requisition, "A 商事", 280_000).await;
    let second = build_quote(&pool, &requisition, "B 物産", 260_000).await;
    let repo = PostgresVendorQuoteRepository::new(pool.clone());
    let tx_manager = PgTransactionManager::new(pool.clone());

    let mut tx = tx_manager.begin().await.unwrap();
    repo.insert(&mut tx, &first).await.unwrap();
    repo.insert(&mut tx, &second).await.unwrap();
    let awarded = first.clone().with_awarded(true, test_now());
    repo.update_with_version_check(&mut tx, &awarded, first.version())
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let mut tx = tx_manager.begin().await.unwrap();
    let result = repo
        .update_with_version_check(
            &mut tx,
            &second.clone().with_awarded(true, test_now()),
            second.version(),
        )
        .await;
    assert!(result.is_err());
    drop(tx);

    let stored = repo.find_by_id(first.id()).await.unwrap().unwrap();
    assert!(stored.is_awarded());
    assert_eq!(stored.version(), first.version().next());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_通知書の送付は発行済みのときだけ記録できる(pool: PgPool) {
    let requisition = submitted_requisition(&pool).await;
    let quote = build_quote(&pool, &requisition, "A 商事", 280_000).await;
    let officer = insert_actor(&pool, Role::ProcOfficer).await;
    let quote_repo = PostgresVendorQuoteRepository::new(pool.clone());
    let repo = PostgresNoticeToAwardRepository::new(pool.clone());
    let tx_manager = PgTransactionManager::new(pool.clone());

    let decision = AwardDecision {
        quote_id:               quote.id().clone(),
        vendor_id:              quote.vendor_id().clone(),
        basis:                  AwardBasis::LowestResponsiveBid,
        override_justification: None,
        override_authorized_by: None,
    };
    let notice = NoticeToAward::issue(
        RefNumber::new(RefPrefix::NoticeToAward, 2026, 1).unwrap(),
        requisition.id().clone(),
        &decision,
        officer.id().clone(),
        test_now(),
    );
    let mut tx = tx_manager.begin().await.unwrap();
    quote_repo.insert(&mut tx, &quote).await.unwrap();
    repo.insert(&mut tx, &notice).await.unwrap();
    tx.commit().await.unwrap();

    let sent = notice.clone().marked_sent(test_now()).unwrap();
    let mut tx = tx_manager.begin().await.unwrap();
    repo.update_status(&mut tx, &sent, NtaStatus::Issued)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let mut tx = tx_manager.begin().await.unwrap();
    let again = repo.update_status(&mut tx, &sent, NtaStatus::Issued).await;
    assert!(matches!(again.unwrap_err().kind(), InfraErrorKind::Conflict { .. }));
    drop(tx);

    let stored = repo
        .find_by_requisition(requisition.id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status(), NtaStatus::MarkSent);
    assert_eq!(stored.sent_at(), Some(test_now()));
}
