//! ユースケース層の共通ヘルパー
//!
//! リポジトリ呼び出し結果の変換、トランザクション操作、案件の読み書き、
//! 操作者の解決など、複数のユースケースで繰り返されるパターンを共通化する。

use procureflow_domain::{
    approval::ApprovalStep,
    case::{Case, CaseRef, CaseStatus},
    notification::CaseNotification,
    role::Actor,
    user::{User, UserId},
    value_objects::Version,
};
use procureflow_infra::{InfraError, InfraErrorKind, db::TxContext};

use super::UseCaseDeps;
use crate::error::CoreError;

/// リポジトリの `Result<Option<T>, InfraError>` を `Result<T, CoreError>` に変換する
///
/// ```ignore
/// let step = self.deps.step_repo.find_by_id(&step_id).await
///     .or_not_found("承認ステップ")?;
/// ```
pub(crate) trait FindResultExt<T> {
    /// `None` の場合は `CoreError::NotFound`、`InfraError` の場合は `CoreError::Database` を返す
    fn or_not_found(self, entity_name: &str) -> Result<T, CoreError>;
}

impl<T> FindResultExt<T> for Result<Option<T>, InfraError> {
    fn or_not_found(self, entity_name: &str) -> Result<T, CoreError> {
        self?
            .ok_or_else(|| CoreError::NotFound(format!("{entity_name}が見つかりません")))
    }
}

/// 楽観的ロック付き更新のエラーを変換する
///
/// 0 行更新（Conflict）は利用者に再読み込みを促すメッセージにする。
pub(crate) fn save_error(entity_name: &str) -> impl FnOnce(InfraError) -> CoreError + '_ {
    move |e| match e.kind() {
        InfraErrorKind::Conflict { .. } => CoreError::Conflict(format!(
            "{entity_name}は既に更新されています。最新の情報を取得してください。"
        )),
        _ => CoreError::Database(e),
    }
}

/// 申請者本人か管理者でなければ `Forbidden` を返す
pub(crate) fn ensure_owner_or_admin(requested_by: &UserId, actor: &Actor) -> Result<(), CoreError> {
    if actor.is_admin() || requested_by == actor.id() {
        return Ok(());
    }
    Err(CoreError::Forbidden(
        "申請者本人または管理者のみ操作できます".to_string(),
    ))
}

/// 閲覧できない案件なら `Forbidden` を返す
pub(crate) fn ensure_can_view(
    viewer: &User,
    requested_by: &UserId,
    department: &str,
) -> Result<(), CoreError> {
    if viewer.can_view(requested_by, department) {
        return Ok(());
    }
    Err(CoreError::Forbidden(
        "この案件を閲覧する権限がありません".to_string(),
    ))
}

impl UseCaseDeps {
    /// トランザクションを開始する
    pub(crate) async fn begin_tx(&self) -> Result<TxContext, CoreError> {
        Ok(self.tx_manager.begin().await?)
    }

    /// トランザクションをコミットする
    pub(crate) async fn commit_tx(&self, tx: TxContext) -> Result<(), CoreError> {
        Ok(tx.commit().await?)
    }

    /// 操作者を解決する
    ///
    /// 未登録・無効化されたユーザーは操作できない。
    pub(crate) async fn load_actor(&self, user_id: &UserId) -> Result<Actor, CoreError> {
        let user = self
            .user_repo
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| CoreError::Forbidden(format!("未登録のユーザーです: {user_id}")))?;
        Ok(user.active_actor()?)
    }

    /// 閲覧者を解決する
    ///
    /// 部門による閲覧範囲の判定に使うため、ロールだけでなくユーザー全体を返す。
    pub(crate) async fn load_viewer(&self, user_id: &UserId) -> Result<User, CoreError> {
        let user = self
            .user_repo
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| CoreError::Forbidden(format!("未登録のユーザーです: {user_id}")))?;
        user.active_actor()?;
        Ok(user)
    }

    /// 案件を読み込む
    pub(crate) async fn load_case(&self, case: &CaseRef) -> Result<Case, CoreError> {
        match case {
            CaseRef::Requisition(id) => self
                .requisition_repo
                .find_by_id(id)
                .await
                .or_not_found("購買申請")
                .map(Case::from),
            CaseRef::PaymentRequest(id) => self
                .payment_request_repo
                .find_by_id(id)
                .await
                .or_not_found("支払申請")
                .map(Case::from),
        }
    }

    /// 案件を version check 付きで更新する
    pub(crate) async fn save_case(
        &self,
        tx: &mut TxContext,
        case: &Case,
        expected_version: Version,
    ) -> Result<(), CoreError> {
        match case {
            Case::Requisition(requisition) => self
                .requisition_repo
                .update_with_version_check(tx, requisition, expected_version)
                .await
                .map_err(save_error("購買申請")),
            Case::PaymentRequest(payment_request) => self
                .payment_request_repo
                .update_with_version_check(tx, payment_request, expected_version)
                .await
                .map_err(save_error("支払申請")),
        }
    }

    /// 案件に属するステップ一覧を取得する
    pub(crate) async fn fetch_steps(&self, case: &CaseRef) -> Result<Vec<ApprovalStep>, CoreError> {
        Ok(self.step_repo.find_by_case(case).await?)
    }

    /// 申請者にステータス変更を通知する
    ///
    /// コミット後に呼ぶ。申請者が見つからない・無効化されている場合は送らない。
    pub(crate) async fn notify_status_changed(
        &self,
        case: &Case,
        from: CaseStatus,
        to: CaseStatus,
        comment: Option<&str>,
    ) {
        let requester = match self.user_repo.find_by_id(case.requested_by()).await {
            Ok(Some(user)) if user.is_active() => user,
            Ok(_) => {
                tracing::debug!(
                    case.ref_number = %case.ref_number(),
                    "申請者が無効なため通知を送りません"
                );
                return;
            }
            Err(e) => {
                tracing::warn!(
                    case.ref_number = %case.ref_number(),
                    error = %e,
                    "通知先の取得に失敗したため通知を送りません"
                );
                return;
            }
        };

        self.notifier
            .notify(CaseNotification::StatusChanged {
                case_kind: case.kind(),
                ref_number: case.ref_number(),
                case_title: case.title().to_string(),
                from,
                to,
                comment: comment.map(str::to_string),
                recipient_email: requester.email().as_str().to_string(),
                recipient_user_id: requester.id().clone(),
            })
            .await;
    }
}
