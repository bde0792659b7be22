//! # Core Service サーバー
//!
//! 購買申請・支払申請の承認ワークフローを実行する内部サービス。
//!
//! ## 役割
//!
//! - **承認チェーン**: 申請時に承認ステップを生成し、判断を受けて案件を進める
//! - **調達**: 見積の登録・評価、落札、落札通知・発注書の送付、納品完了
//! - **SLA 監視**: 期限を過ぎた承認ステップを定期的に検出し、担当ロールへ通知する
//! - **データ永続化**: PostgreSQL へのエンティティと監査ログの保存
//!
//! ## アクセス制御
//!
//! 内部ネットワークからのみアクセス可能とする。操作者は各リクエストの `actor_id` で受け取る。
//!
//! ## 環境変数
//!
//! [`procureflow_core_service::config`] を参照。
//!
//! ## 起動方法
//!
//! ```bash
//! # 開発環境
//! cargo run -p procureflow-core-service
//!
//! # 本番環境
//! CORE_PORT=3001 DATABASE_URL=postgres://... NOTIFICATION_BACKEND=smtp \
//!   cargo run -p procureflow-core-service --release
//! ```

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use procureflow_core_service::{
    config::{CoreConfig, NotificationBackend, NotificationConfig},
    handler::build_router,
    usecase::{NotificationService, SlaUseCaseImpl, TemplateRenderer, UseCaseDeps},
};
use procureflow_domain::clock::SystemClock;
use procureflow_infra::{
    db::{self, PgTransactionManager},
    notification::{NoopNotificationSender, NotificationSender, SmtpNotificationSender},
    repository::{
        PostgresApprovalStepRepository,
        PostgresAuditLogRepository,
        PostgresGoodsReceiptRepository,
        PostgresNoticeToAwardRepository,
        PostgresPaymentRequestRepository,
        PostgresPurchaseOrderRepository,
        PostgresRefNumberCounterRepository,
        PostgresRequisitionRepository,
        PostgresUserRepository,
        PostgresVendorQuoteRepository,
        PostgresVendorRepository,
    },
};
use procureflow_shared::observability::{
    MakeRequestUuidV7,
    TracingConfig,
    init_tracing,
    make_request_span,
};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

/// Core Service サーバーのエントリーポイント
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env ファイルを読み込む（存在する場合）
    dotenvy::dotenv().ok();

    // トレーシング初期化
    let tracing_config = TracingConfig::from_env("core-service");
    init_tracing(tracing_config);
    let _tracing_guard = tracing::info_span!("app", service = "core-service").entered();

    // 設定読み込み
    let config = CoreConfig::from_env().context("設定の読み込みに失敗しました")?;

    tracing::info!(
        "Core Service サーバーを起動します: {}:{}",
        config.host,
        config.port
    );

    // データベース接続プールを作成し、マイグレーションを適用
    let pool = db::create_pool(&config.database_url)
        .await
        .context("データベース接続に失敗しました")?;
    db::run_migrations(&pool)
        .await
        .context("マイグレーションの適用に失敗しました")?;
    tracing::info!("データベースに接続しました");

    // 通知
    let sender = build_sender(&config.notification)?;
    let notifier = NotificationService::new(
        sender,
        TemplateRenderer::new().context("メールテンプレートの読み込みに失敗しました")?,
        config.notification.base_url.clone(),
    );

    // 依存コンポーネントを初期化
    let deps = UseCaseDeps {
        requisition_repo:        Arc::new(PostgresRequisitionRepository::new(pool.clone())),
        payment_request_repo:    Arc::new(PostgresPaymentRequestRepository::new(pool.clone())),
        step_repo:               Arc::new(PostgresApprovalStepRepository::new(pool.clone())),
        quote_repo:              Arc::new(PostgresVendorQuoteRepository::new(pool.clone())),
        vendor_repo:             Arc::new(PostgresVendorRepository::new(pool.clone())),
        nta_repo:                Arc::new(PostgresNoticeToAwardRepository::new(pool.clone())),
        po_repo:                 Arc::new(PostgresPurchaseOrderRepository::new(pool.clone())),
        grn_repo:                Arc::new(PostgresGoodsReceiptRepository::new(pool.clone())),
        audit_log_repo:          Arc::new(PostgresAuditLogRepository::new(pool.clone())),
        user_repo:               Arc::new(PostgresUserRepository::new(pool.clone())),
        ref_counter_repo:        Arc::new(PostgresRefNumberCounterRepository::new(pool.clone())),
        clock:                   Arc::new(SystemClock),
        tx_manager:              Arc::new(PgTransactionManager::new(pool)),
        notifier:                Arc::new(notifier),
        required_document_types: config.required_document_types.clone(),
    };

    // SLA 超過チェックの定期実行
    if let Some(interval) = config.sla_check_interval {
        spawn_sla_checker(SlaUseCaseImpl::new(deps.clone()), interval);
    }

    // ルーター構築
    let app = build_router(deps)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7));

    // サーバー起動
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("アドレスのパースに失敗しました")?;

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Core Service サーバーが起動しました: {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// 設定に応じてメール送信の実装を選ぶ
fn build_sender(config: &NotificationConfig) -> anyhow::Result<Arc<dyn NotificationSender>> {
    match config.backend {
        NotificationBackend::Smtp => {
            let sender =
                SmtpNotificationSender::new(&config.smtp_host, config.smtp_port, &config.from_address)
                    .context("SMTP 送信の初期化に失敗しました")?;
            tracing::info!(
                smtp_host = %config.smtp_host,
                smtp_port = config.smtp_port,
                "SMTP でメールを送信します"
            );
            Ok(Arc::new(sender))
        }
        NotificationBackend::Noop => {
            tracing::info!("メール送信は無効です（noop）");
            Ok(Arc::new(NoopNotificationSender))
        }
    }
}

/// SLA 超過チェックを一定間隔で実行するタスクを起動する
///
/// 失敗してもタスクは止めず、次の周期で再試行する。
fn spawn_sla_checker(usecase: SlaUseCaseImpl, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // 初回は起動直後ではなく 1 周期後に実行する
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match usecase.check_sla_breaches().await {
                Ok(summary) => {
                    tracing::debug!(
                        checked = summary.checked,
                        flagged = summary.flagged,
                        "SLA 超過チェックを実行しました"
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "SLA 超過チェックに失敗しました");
                }
            }
        }
    });
}
