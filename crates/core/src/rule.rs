use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::account::OwnerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    MerchantExact,
    MerchantContains,
    DescriptionPattern,
}

impl PatternType {
    pub fn as_str(self) -> &'static str {
        match self {
            PatternType::MerchantExact => "merchant_exact",
            PatternType::MerchantContains => "merchant_contains",
            PatternType::DescriptionPattern => "description_pattern",
        }
    }

    /// Lower is more specific; used to order candidate rules.
    pub fn specificity(self) -> u8 {
        match self {
            PatternType::MerchantExact => 0,
            PatternType::MerchantContains => 1,
            PatternType::DescriptionPattern => 2,
        }
    }
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PatternType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "merchant_exact" => Ok(PatternType::MerchantExact),
            "merchant_contains" => Ok(PatternType::MerchantContains),
            "description_pattern" => Ok(PatternType::DescriptionPattern),
            other => Err(format!("Unknown pattern type: '{other}'")),
        }
    }
}

/// A learned merchant/description → category mapping.
///
/// Unique per `(owner_id, pattern_type, pattern_value)`. `pattern_value` is
/// stored lowercased with whitespace collapsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorizationRule {
    pub id: Option<i64>,
    pub owner_id: OwnerId,
    pub pattern_type: PatternType,
    pub pattern_value: String,
    pub category: String,
    pub subcategory: Option<String>,
    pub confidence: f32,
    pub usage_count: i64,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl CategorizationRule {
    pub fn new(
        owner_id: OwnerId,
        pattern_type: PatternType,
        pattern_value: &str,
        category: &str,
        subcategory: Option<&str>,
        confidence: f32,
    ) -> Self {
        CategorizationRule {
            id: None,
            owner_id,
            pattern_type,
            pattern_value: normalize_pattern(pattern_value),
            category: category.to_string(),
            subcategory: subcategory.map(str::to_string),
            confidence: confidence.clamp(0.0, 1.0),
            usage_count: 0,
            last_used_at: None,
        }
    }

    pub fn matches(&self, merchant: Option<&str>, description: &str) -> bool {
        if self.pattern_value.is_empty() {
            return false;
        }
        match self.pattern_type {
            PatternType::MerchantExact => {
                merchant.is_some_and(|m| normalize_pattern(m) == self.pattern_value)
            }
            PatternType::MerchantContains => {
                merchant.is_some_and(|m| normalize_pattern(m).contains(&self.pattern_value))
            }
            PatternType::DescriptionPattern => {
                normalize_pattern(description).contains(&self.pattern_value)
            }
        }
    }
}

/// Lowercase and collapse runs of whitespace.
pub fn normalize_pattern(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
