use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub i64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identity handed to us by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(pub String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        OwnerId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    Checking,
    Savings,
    CreditCard,
    Investment,
    Cash,
    #[default]
    Unknown,
}

impl AccountKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AccountKind::Checking => "checking",
            AccountKind::Savings => "savings",
            AccountKind::CreditCard => "credit_card",
            AccountKind::Investment => "investment",
            AccountKind::Cash => "cash",
            AccountKind::Unknown => "unknown",
        }
    }

    /// Human label used when naming a new account, e.g. "Credit Card".
    pub fn title(self) -> &'static str {
        match self {
            AccountKind::Checking => "Checking",
            AccountKind::Savings => "Savings",
            AccountKind::CreditCard => "Credit Card",
            AccountKind::Investment => "Investment",
            AccountKind::Cash => "Cash",
            AccountKind::Unknown => "Unknown",
        }
    }

    /// Lenient parse for free text coming from statements and model output.
    /// Anything unrecognised is `Unknown`.
    pub fn parse_lenient(s: &str) -> Self {
        let norm: String = s
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .collect();
        match norm.as_str() {
            "checking" | "chequing" | "current" => AccountKind::Checking,
            "savings" | "saving" => AccountKind::Savings,
            "creditcard" | "credit" | "card" => AccountKind::CreditCard,
            "investment" | "brokerage" => AccountKind::Investment,
            "cash" => AccountKind::Cash,
            _ => AccountKind::Unknown,
        }
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AccountKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "checking" => Ok(AccountKind::Checking),
            "savings" => Ok(AccountKind::Savings),
            "credit_card" => Ok(AccountKind::CreditCard),
            "investment" => Ok(AccountKind::Investment),
            "cash" => Ok(AccountKind::Cash),
            "unknown" => Ok(AccountKind::Unknown),
            other => Err(format!("Unknown account type: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub owner_id: OwnerId,
    pub name: String,
    pub account_type: AccountKind,
    pub institution: Option<String>,
    pub last4: Option<String>,
    pub currency: String,
    pub is_active: bool,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Recency used to break ties between equally good matches.
    pub fn activity_key(&self) -> DateTime<Utc> {
        self.last_activity_at.unwrap_or(self.created_at)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAccount {
    pub name: String,
    pub account_type: AccountKind,
    pub institution: Option<String>,
    pub last4: Option<String>,
    pub currency: String,
}

impl NewAccount {
    pub fn new(name: &str, account_type: AccountKind) -> Self {
        NewAccount {
            name: name.to_string(),
            account_type,
            institution: None,
            last4: None,
            currency: "USD".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn kind_roundtrip_through_str() {
        for kind in [
            AccountKind::Checking,
            AccountKind::Savings,
            AccountKind::CreditCard,
            AccountKind::Investment,
            AccountKind::Cash,
            AccountKind::Unknown,
        ] {
            assert_eq!(AccountKind::from_str(kind.as_str()).unwrap(), kind);
        }
    }

    #[test]
    fn lenient_parse_handles_spacing_and_case() {
        assert_eq!(AccountKind::parse_lenient("Credit Card"), AccountKind::CreditCard);
        assert_eq!(AccountKind::parse_lenient(" CHECKING "), AccountKind::Checking);
        assert_eq!(AccountKind::parse_lenient("mortgage"), AccountKind::Unknown);
    }

    #[test]
    fn title_is_title_cased() {
        assert_eq!(AccountKind::CreditCard.title(), "Credit Card");
        assert_eq!(AccountKind::Checking.title(), "Checking");
    }
}
