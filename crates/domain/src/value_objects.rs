//! # 共通値オブジェクト
//!
//! 複数のエンティティで共有される値オブジェクトを定義する。
//!
//! | 型 | ラップ対象 | 用途 |
//! |---|-----------|------|
//! | [`Version`] | `u32` | 楽観的ロック用のバージョン番号 |
//! | [`RefNumber`] | `prefix + year + sequence` | 参照番号（`PR-2026-00042` 形式） |
//! | [`RefPrefix`] | enum | 参照番号の種別 |
//! | [`CaseTitle`] | `String` | 申請件名 |
//! | [`ActionComment`] | `String` | 承認操作・状態遷移のコメント |
//! | [`Justification`] | `String` | 最安値以外の落札や見積例外の理由 |

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

use crate::DomainError;

// =========================================================================
// Version（バージョン番号）
// =========================================================================

/// バージョン番号（値オブジェクト）
///
/// 1 から始まり、確定した更新のたびに 1 ずつ増える。
/// 書き込み時は「読み取った時点のバージョン」と DB 上のバージョンを比較し、
/// 一致した場合のみ更新する（compare-and-swap）。
///
/// # 不変条件
///
/// - 1 以上、`i32::MAX` 以下（DB の INTEGER 列に収まる）
///
/// ```rust
/// use procureflow_domain::value_objects::Version;
///
/// let v1 = Version::initial();
/// assert_eq!(v1.next().as_i32(), 2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u32);

const VERSION_MAX: u32 = i32::MAX as u32;

impl Version {
    /// 初期バージョン（1）を作成する
    pub fn initial() -> Self {
        Self(1)
    }

    /// 指定した値からバージョンを作成する
    pub fn new(value: u32) -> Result<Self, DomainError> {
        if value == 0 || value > VERSION_MAX {
            return Err(DomainError::Validation(format!(
                "バージョン番号は 1 以上 {VERSION_MAX} 以下である必要があります"
            )));
        }
        Ok(Self(value))
    }

    /// 次のバージョンを返す
    ///
    /// 上限に達した場合は上限のまま（実運用では到達しない）。
    pub fn next(&self) -> Self {
        Self((self.0 + 1).min(VERSION_MAX))
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// i32 に変換する（DB 互換用）
    pub fn as_i32(&self) -> i32 {
        self.0 as i32
    }
}

impl TryFrom<i32> for Version {
    type Error = DomainError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        let value = u32::try_from(value).map_err(|_| {
            DomainError::Validation("バージョン番号は 1 以上である必要があります".to_string())
        })?;
        Self::new(value)
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::initial()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

// =========================================================================
// RefNumber（参照番号）
// =========================================================================

/// 参照番号の種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr, strum::Display)]
pub enum RefPrefix {
    /// 購買申請（Purchase Request）
    #[strum(serialize = "PR")]
    Requisition,
    /// 支払申請（Request for Fund）
    #[strum(serialize = "RF")]
    PaymentRequest,
    /// 落札通知（Notice to Award）
    #[strum(serialize = "NTA")]
    NoticeToAward,
    /// 発注書（Purchase Order）
    #[strum(serialize = "PO")]
    PurchaseOrder,
    /// 検収記録（Goods Receipt Note）
    #[strum(serialize = "GRN")]
    GoodsReceipt,
}

impl RefPrefix {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "PR" => Some(Self::Requisition),
            "RF" => Some(Self::PaymentRequest),
            "NTA" => Some(Self::NoticeToAward),
            "PO" => Some(Self::PurchaseOrder),
            "GRN" => Some(Self::GoodsReceipt),
            _ => None,
        }
    }
}

/// 参照番号（値オブジェクト）
///
/// `{prefix}-{year}-{5 桁連番}` 形式。連番は種別 × 年ごとに採番される。
///
/// ```rust
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use procureflow_domain::value_objects::{RefNumber, RefPrefix};
///
/// let number = RefNumber::new(RefPrefix::Requisition, 2026, 42)?;
/// assert_eq!(number.to_string(), "PR-2026-00042");
/// assert_eq!("PR-2026-00042".parse::<RefNumber>()?, number);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RefNumber {
    prefix:   RefPrefix,
    year:     i32,
    sequence: i64,
}

impl RefNumber {
    pub fn new(prefix: RefPrefix, year: i32, sequence: i64) -> Result<Self, DomainError> {
        if sequence <= 0 {
            return Err(DomainError::Validation(
                "参照番号の連番は 1 以上である必要があります".to_string(),
            ));
        }
        if !(1000..=9999).contains(&year) {
            return Err(DomainError::Validation(format!(
                "参照番号の年が不正です: {year}"
            )));
        }
        Ok(Self {
            prefix,
            year,
            sequence,
        })
    }

    pub fn prefix(&self) -> RefPrefix {
        self.prefix
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn sequence(&self) -> i64 {
        self.sequence
    }
}

impl fmt::Display for RefNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{:05}", self.prefix, self.year, self.sequence)
    }
}

impl FromStr for RefNumber {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::Validation(format!("不正な参照番号: {s}"));

        let mut parts = s.splitn(3, '-');
        let (Some(prefix), Some(year), Some(sequence)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        let prefix = RefPrefix::parse(prefix).ok_or_else(invalid)?;
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let sequence = sequence.parse::<i64>().map_err(|_| invalid())?;

        Self::new(prefix, year, sequence)
    }
}

impl Serialize for RefNumber {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RefNumber {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// =========================================================================
// 検証付き文字列
// =========================================================================

define_validated_string! {
    /// 申請件名
    pub struct CaseTitle {
        label: "件名",
        max_length: 255,
    }
}

define_validated_string! {
    /// 承認操作・状態遷移のコメント
    ///
    /// 却下・差し戻し・保留では必須。空白のみは未入力として扱う。
    pub struct ActionComment {
        label: "コメント",
        max_length: 2000,
    }
}

define_validated_string! {
    /// 理由（最安値以外の落札、見積 3 件未満の例外承認）
    pub struct Justification {
        label: "理由",
        max_length: 2000,
    }
}
