//! # API レスポンスエンベロープ
//!
//! 成功レスポンスの統一形式 `{ "data": T }` を提供する。

use serde::{Deserialize, Serialize};

/// 成功レスポンスの統一型
///
/// Core Service のハンドラはすべてこの型で包んで返す。
///
/// ## 使用例
///
/// ```
/// use procureflow_shared::ApiResponse;
///
/// let response = ApiResponse::new("PR-2026-00001");
/// assert_eq!(response.data, "PR-2026-00001");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_dataキーで包んでシリアライズする() {
        let response = ApiResponse::new(serde_json::json!({ "ref_number": "PR-2026-00001" }));
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(
            json,
            serde_json::json!({ "data": { "ref_number": "PR-2026-00001" } })
        );
    }

    #[test]
    fn test_一覧はdata配下の配列になる() {
        let response = ApiResponse::new(vec!["PR-2026-00001", "PR-2026-00002"]);
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(
            json,
            serde_json::json!({ "data": ["PR-2026-00001", "PR-2026-00002"] })
        );
    }

    #[test]
    fn test_jsonから復元できる() {
        let response: ApiResponse<i32> = serde_json::from_str(r#"{"data": 42}"#).unwrap();

        assert_eq!(response, ApiResponse::new(42));
    }
}
