//! # ユーザー
//!
//! 承認者・申請者として操作する社内ユーザー。
//! ユーザーの作成・編集は外部の管理機能が担い、このクレートは参照のみ行う。
//!
//! ## 使用例
//!
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use procureflow_domain::{
//!     role::Role,
//!     user::{Email, User, UserId, UserRecord},
//! };
//!
//! let user = User::from_db(UserRecord {
//!     id:         UserId::new(),
//!     name:       "山田太郎".to_string(),
//!     email:      Email::new("yamada@example.com")?,
//!     role:       Role::DeptHead,
//!     department: Some("総務部".to_string()),
//!     is_active:  true,
//! });
//!
//! assert_eq!(user.actor().role(), Role::DeptHead);
//! assert!(user.can_view(&UserId::new(), "総務部"));
//! assert!(!user.can_view(&UserId::new(), "営業部"));
//! # Ok(())
//! # }
//! ```

use crate::{
    DomainError,
    role::{Actor, Role},
};

define_uuid_id! {
    /// ユーザー ID
    pub struct UserId;
}

/// メールアドレス（値オブジェクト）
///
/// `local@domain` 形式のみ受け付ける。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Email(String);

impl Email {
    /// # バリデーション
    ///
    /// - 空文字列ではない
    /// - `@` の前後が空でない
    /// - 最大 255 文字
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();

        if value.is_empty() {
            return Err(DomainError::Validation(
                "メールアドレスは必須です".to_string(),
            ));
        }

        let Some((local, domain)) = value.split_once('@') else {
            return Err(DomainError::Validation(
                "メールアドレスの形式が不正です".to_string(),
            ));
        };

        if local.is_empty() || domain.is_empty() {
            return Err(DomainError::Validation(
                "メールアドレスの形式が不正です".to_string(),
            ));
        }

        if value.len() > 255 {
            return Err(DomainError::Validation(
                "メールアドレスは255文字以内である必要があります".to_string(),
            ));
        }

        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Email {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ユーザーエンティティ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    id:         UserId,
    name:       String,
    email:      Email,
    role:       Role,
    department: Option<String>,
    is_active:  bool,
}

/// ユーザーの DB 復元パラメータ
pub struct UserRecord {
    pub id:         UserId,
    pub name:       String,
    pub email:      Email,
    pub role:       Role,
    pub department: Option<String>,
    pub is_active:  bool,
}

impl User {
    pub fn from_db(record: UserRecord) -> Self {
        Self {
            id:         record.id,
            name:       record.name,
            email:      record.email,
            role:       record.role,
            department: record.department,
            is_active:  record.is_active,
        }
    }

    pub fn id(&self) -> &UserId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &Email {
        &self.email
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// 所属部門（部門に属さないユーザーは `None`）
    pub fn department(&self) -> Option<&str> {
        self.department.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// 案件を閲覧できるか
    ///
    /// 部門を問わず閲覧できるロール以外は、自分が申請した案件と自部門の案件に限る。
    pub fn can_view(&self, requested_by: &UserId, department: &str) -> bool {
        self.role.sees_all_departments()
            || requested_by == &self.id
            || self.department.as_deref() == Some(department)
    }

    /// 操作者として扱う
    pub fn actor(&self) -> Actor {
        Actor::new(self.id.clone(), self.role)
    }

    /// 有効なユーザーのみ操作者になれる
    pub fn active_actor(&self) -> Result<Actor, DomainError> {
        if !self.is_active {
            return Err(DomainError::Forbidden(
                "無効化されたユーザーは操作できません".to_string(),
            ));
        }
        Ok(self.actor())
    }
}
