//! # 業者
//!
//! 見積を提出できるのは認定状態が `active` の業者のみ。

use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

use crate::DomainError;

define_uuid_id! {
    /// 業者 ID
    pub struct VendorId;
}

/// 認定状態
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, IntoStaticStr, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AccreditationStatus {
    Active,
    Suspended,
    Blacklisted,
}

impl std::str::FromStr for AccreditationStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "suspended" => Ok(Self::Suspended),
            "blacklisted" => Ok(Self::Blacklisted),
            _ => Err(DomainError::Validation(format!("不正な認定状態: {s}"))),
        }
    }
}

/// 業者エンティティ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vendor {
    id:                   VendorId,
    name:                 String,
    accreditation_status: AccreditationStatus,
}

impl Vendor {
    pub fn from_db(id: VendorId, name: String, accreditation_status: AccreditationStatus) -> Self {
        Self {
            id,
            name,
            accreditation_status,
        }
    }

    pub fn id(&self) -> &VendorId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn accreditation_status(&self) -> AccreditationStatus {
        self.accreditation_status
    }

    /// 見積を提出できる状態か確認する
    pub fn ensure_can_quote(&self) -> Result<(), DomainError> {
        if self.accreditation_status != AccreditationStatus::Active {
            return Err(DomainError::Validation(format!(
                "業者「{}」は見積を提出できません（認定状態: {}）",
                self.name, self.accreditation_status
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(AccreditationStatus::Active, true)]
    #[case(AccreditationStatus::Suspended, false)]
    #[case(AccreditationStatus::Blacklisted, false)]
    fn test_見積提出は認定済み業者のみ(
        #[case] status: AccreditationStatus,
        #[case] allowed: bool,
    ) {
        let vendor = Vendor::from_db(VendorId::new(), "ABC 商事".to_string(), status);

        assert_eq!(vendor.ensure_can_quote().is_ok(), allowed);
    }
}
