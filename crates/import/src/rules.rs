use fins_core::{normalize_pattern, CategorizationRule, PatternType};

use crate::normalize::clean_merchant_name;

const DESCRIPTION_PATTERN_WORDS: usize = 3;

/// An owner's learned rules, ordered for lookup.
///
/// Exact merchant rules beat merchant substring rules, which beat description
/// rules. Within a tier the higher-confidence rule wins, then the most used.
pub struct RuleSet {
    rules: Vec<CategorizationRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<CategorizationRule>) -> Self {
        let mut rules = rules;
        rules.sort_by(|a, b| {
            a.pattern_type
                .specificity()
                .cmp(&b.pattern_type.specificity())
                .then_with(|| b.confidence.total_cmp(&a.confidence))
                .then_with(|| b.usage_count.cmp(&a.usage_count))
        });
        Self { rules }
    }

    /// First rule matching the transaction whose confidence is strictly above `min_confidence`.
    pub fn best_match(
        &self,
        merchant: Option<&str>,
        description: &str,
        min_confidence: f32,
    ) -> Option<&CategorizationRule> {
        self.rules
            .iter()
            .filter(|r| r.confidence > min_confidence)
            .find(|r| r.matches(merchant, description))
    }

    /// Makes a freshly learned or re-confirmed rule visible to later lookups.
    pub fn insert(&mut self, rule: CategorizationRule) {
        let existing = self.rules.iter_mut().find(|r| {
            r.owner_id == rule.owner_id
                && r.pattern_type == rule.pattern_type
                && r.pattern_value == rule.pattern_value
        });
        match existing {
            Some(r) if rule.confidence > r.confidence => *r = rule,
            Some(_) => {}
            None => {
                self.rules.push(rule);
                let rules = std::mem::take(&mut self.rules);
                *self = RuleSet::new(rules);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Pattern a rule should be learned under for this transaction.
///
/// Prefers the merchant name; otherwise the first few alphabetic words of the
/// cleaned description. `None` when neither yields anything usable.
pub fn derive_rule_pattern(merchant: Option<&str>, description: &str) -> Option<(PatternType, String)> {
    if let Some(merchant) = merchant {
        let value = normalize_pattern(merchant);
        if !value.is_empty() {
            return Some((PatternType::MerchantExact, value));
        }
    }

    let cleaned = clean_merchant_name(description);
    let words: Vec<&str> = cleaned
        .split_whitespace()
        .filter(|w| w.chars().all(char::is_alphabetic))
        .take(DESCRIPTION_PATTERN_WORDS)
        .collect();
    if words.is_empty() {
        return None;
    }
    Some((PatternType::DescriptionPattern, normalize_pattern(&words.join(" "))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fins_core::OwnerId;

    fn rule(pattern_type: PatternType, value: &str, category: &str, confidence: f32) -> CategorizationRule {
        CategorizationRule::new(OwnerId::new("u1"), pattern_type, value, category, None, confidence)
    }

    #[test]
    fn exact_beats_contains_beats_description() {
        let set = RuleSet::new(vec![
            rule(PatternType::DescriptionPattern, "coffee", "Shopping", 0.99),
            rule(PatternType::MerchantContains, "star", "Entertainment", 0.99),
            rule(PatternType::MerchantExact, "starbucks", "Food & Dining", 0.85),
        ]);
        let hit = set.best_match(Some("STARBUCKS"), "STARBUCKS COFFEE", 0.8).unwrap();
        assert_eq!(hit.category, "Food & Dining");

        let hit = set.best_match(Some("STARLIGHT CINEMA"), "coffee", 0.8).unwrap();
        assert_eq!(hit.category, "Entertainment");

        let hit = set.best_match(None, "morning coffee", 0.8).unwrap();
        assert_eq!(hit.category, "Shopping");
    }

    #[test]
    fn threshold_is_strict() {
        let set = RuleSet::new(vec![rule(PatternType::MerchantExact, "shell", "Transportation", 0.8)]);
        assert!(set.best_match(Some("Shell"), "SHELL OIL", 0.8).is_none());
        assert!(set.best_match(Some("Shell"), "SHELL OIL", 0.5).is_some());
    }

    #[test]
    fn higher_confidence_wins_within_tier() {
        let set = RuleSet::new(vec![
            rule(PatternType::MerchantContains, "amazon", "Shopping", 0.85),
            rule(PatternType::MerchantContains, "amazon prime", "Entertainment", 0.95),
        ]);
        let hit = set.best_match(Some("Amazon Prime Video"), "", 0.8).unwrap();
        assert_eq!(hit.category, "Entertainment");
    }

    #[test]
    fn insert_keeps_higher_confidence() {
        let mut set = RuleSet::new(vec![rule(PatternType::MerchantExact, "uber", "Transportation", 0.95)]);
        set.insert(rule(PatternType::MerchantExact, "UBER", "Food & Dining", 0.91));
        assert_eq!(set.len(), 1);
        assert_eq!(set.best_match(Some("uber"), "", 0.8).unwrap().category, "Transportation");

        set.insert(rule(PatternType::MerchantExact, "lyft", "Transportation", 0.92));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn derive_prefers_merchant() {
        assert_eq!(
            derive_rule_pattern(Some("  Whole   Foods "), "WHOLE FOODS #123"),
            Some((PatternType::MerchantExact, "whole foods".to_string()))
        );
    }

    #[test]
    fn derive_from_description_words() {
        assert_eq!(
            derive_rule_pattern(None, "POS PURCHASE CORNER DELI 4471 #99"),
            Some((PatternType::DescriptionPattern, "pos purchase corner".to_string()))
        );
        assert_eq!(derive_rule_pattern(Some("  "), "12345"), None);
    }
}
