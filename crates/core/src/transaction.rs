use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::account::{AccountId, OwnerId};
use super::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CategorizationMethod {
    Rule,
    Ai,
    #[default]
    None,
}

impl CategorizationMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            CategorizationMethod::Rule => "rule",
            CategorizationMethod::Ai => "ai",
            CategorizationMethod::None => "none",
        }
    }
}

impl fmt::Display for CategorizationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CategorizationMethod {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rule" => Ok(CategorizationMethod::Rule),
            "ai" => Ok(CategorizationMethod::Ai),
            "none" => Ok(CategorizationMethod::None),
            other => Err(format!("Unknown categorization method: '{other}'")),
        }
    }
}

/// An extracted transaction that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionDraft {
    pub date: NaiveDate,
    pub amount: Money,
    pub currency: String,
    pub description: String,
    pub merchant_name: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub is_recurring: bool,
    pub confidence: Option<f32>,
    pub method: CategorizationMethod,
    /// Always false on ingestion.
    pub user_verified: bool,
}

impl TransactionDraft {
    pub fn new(date: NaiveDate, amount: Money, description: &str) -> Self {
        TransactionDraft {
            date,
            amount,
            currency: "USD".to_string(),
            description: description.to_string(),
            merchant_name: None,
            category: None,
            subcategory: None,
            is_recurring: false,
            confidence: None,
            method: CategorizationMethod::None,
            user_verified: false,
        }
    }

    pub fn with_merchant(mut self, merchant: &str) -> Self {
        let merchant = merchant.trim();
        self.merchant_name = (!merchant.is_empty()).then(|| merchant.to_string());
        self
    }

    pub fn is_categorized(&self) -> bool {
        self.category.is_some()
    }

    pub fn set_category(
        &mut self,
        category: String,
        subcategory: Option<String>,
        confidence: f32,
        method: CategorizationMethod,
    ) {
        self.category = Some(category);
        self.subcategory = subcategory;
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self.method = method;
    }
}

/// A transaction already in the store, as seen by duplicate detection and
/// re-categorisation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTransaction {
    pub id: i64,
    pub account_id: AccountId,
    pub owner_id: OwnerId,
    pub date: NaiveDate,
    pub amount: Money,
    pub currency: String,
    pub description: String,
    pub merchant_name: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub is_recurring: bool,
    pub confidence: Option<f32>,
    pub method: CategorizationMethod,
    pub user_verified: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl StoredTransaction {
    /// Draft view of this record, used when re-running categorisation.
    pub fn to_draft(&self) -> TransactionDraft {
        TransactionDraft {
            date: self.date,
            amount: self.amount,
            currency: self.currency.clone(),
            description: self.description.clone(),
            merchant_name: self.merchant_name.clone(),
            category: None,
            subcategory: None,
            is_recurring: self.is_recurring,
            confidence: None,
            method: CategorizationMethod::None,
            user_verified: self.user_verified,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn new_draft_is_uncategorized_and_unverified() {
        let d = TransactionDraft::new(date(2024, 1, 2), Money::from_cents(-1250), "STARBUCKS #4821");
        assert!(!d.is_categorized());
        assert!(!d.user_verified);
        assert_eq!(d.method, CategorizationMethod::None);
        assert_eq!(d.currency, "USD");
    }

    #[test]
    fn blank_merchant_becomes_none() {
        let d = TransactionDraft::new(date(2024, 1, 2), Money::zero(), "X").with_merchant("  ");
        assert!(d.merchant_name.is_none());
    }

    #[test]
    fn set_category_clamps_confidence() {
        let mut d = TransactionDraft::new(date(2024, 1, 2), Money::zero(), "X");
        d.set_category("Food".into(), None, 1.7, CategorizationMethod::Ai);
        assert_eq!(d.confidence, Some(1.0));
        assert_eq!(d.method, CategorizationMethod::Ai);
    }

    #[test]
    fn method_parses() {
        assert_eq!(CategorizationMethod::from_str("rule").unwrap(), CategorizationMethod::Rule);
        assert!(CategorizationMethod::from_str("magic").is_err());
    }
}
