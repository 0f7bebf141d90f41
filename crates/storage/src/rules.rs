use chrono::{DateTime, Utc};
use fins_core::{CategorizationRule, OwnerId};

use crate::db::{DbPool, StorageError};

#[derive(sqlx::FromRow)]
struct RuleRow {
    id: i64,
    owner_id: String,
    pattern_type: String,
    pattern_value: String,
    category: String,
    subcategory: Option<String>,
    confidence: f32,
    usage_count: i64,
    last_used_at: Option<DateTime<Utc>>,
}

fn rule_from_row(r: RuleRow) -> Result<CategorizationRule, StorageError> {
    Ok(CategorizationRule {
        id: Some(r.id),
        owner_id: OwnerId(r.owner_id),
        pattern_type: r.pattern_type.parse().map_err(StorageError::Corrupt)?,
        pattern_value: r.pattern_value,
        category: r.category,
        subcategory: r.subcategory,
        confidence: r.confidence,
        usage_count: r.usage_count,
        last_used_at: r.last_used_at,
    })
}

pub async fn list_rules(pool: &DbPool, owner: &OwnerId) -> Result<Vec<CategorizationRule>, StorageError> {
    let rows = sqlx::query_as::<_, RuleRow>(
        "SELECT id, owner_id, pattern_type, pattern_value, category, subcategory, confidence, usage_count, last_used_at \
         FROM categorization_rules WHERE owner_id = ? ORDER BY id",
    )
    .bind(owner.as_str())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(rule_from_row).collect()
}

/// Inserts a rule or, on an `(owner, pattern_type, pattern_value)` collision,
/// keeps whichever side has the higher confidence. Returns the stored rule.
pub async fn upsert_rule(pool: &DbPool, rule: &CategorizationRule) -> Result<CategorizationRule, StorageError> {
    let row = sqlx::query_as::<_, RuleRow>(
        r#"
        INSERT INTO categorization_rules
            (owner_id, pattern_type, pattern_value, category, subcategory, confidence, usage_count)
        VALUES (?, ?, ?, ?, ?, ?, 0)
        ON CONFLICT (owner_id, pattern_type, pattern_value) DO UPDATE SET
            category = CASE WHEN excluded.confidence > confidence THEN excluded.category ELSE category END,
            subcategory = CASE WHEN excluded.confidence > confidence THEN excluded.subcategory ELSE subcategory END,
            confidence = MAX(confidence, excluded.confidence)
        RETURNING id, owner_id, pattern_type, pattern_value, category, subcategory, confidence, usage_count, last_used_at
        "#,
    )
    .bind(rule.owner_id.as_str())
    .bind(rule.pattern_type.as_str())
    .bind(&rule.pattern_value)
    .bind(&rule.category)
    .bind(&rule.subcategory)
    .bind(rule.confidence)
    .fetch_one(pool)
    .await?;

    rule_from_row(row)
}

/// Bumps the usage counter of a rule that just resolved a transaction.
pub async fn record_rule_use(pool: &DbPool, id: i64, at: DateTime<Utc>) -> Result<(), StorageError> {
    sqlx::query(
        "UPDATE categorization_rules SET usage_count = usage_count + 1, last_used_at = ? WHERE id = ?",
    )
    .bind(at)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_db;
    use fins_core::PatternType;

    async fn pool() -> (tempfile::TempDir, DbPool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("fins.db")).await.unwrap();
        (dir, pool)
    }

    fn rule(category: &str, confidence: f32) -> CategorizationRule {
        CategorizationRule::new(
            OwnerId::new("u1"),
            PatternType::MerchantExact,
            "Starbucks",
            category,
            Some("Coffee Shops"),
            confidence,
        )
    }

    #[tokio::test]
    async fn upsert_keeps_higher_confidence() {
        let (_dir, pool) = pool().await;
        let first = upsert_rule(&pool, &rule("Food", 0.92)).await.unwrap();
        assert_eq!(first.pattern_value, "starbucks");

        let lower = upsert_rule(&pool, &rule("Shopping", 0.91)).await.unwrap();
        assert_eq!(lower.id, first.id);
        assert_eq!(lower.category, "Food");

        let higher = upsert_rule(&pool, &rule("Entertainment", 0.97)).await.unwrap();
        assert_eq!(higher.category, "Entertainment");
        assert!((higher.confidence - 0.97).abs() < 1e-6);

        assert_eq!(list_rules(&pool, &OwnerId::new("u1")).await.unwrap().len(), 1);
        assert!(list_rules(&pool, &OwnerId::new("u2")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn usage_is_counted() {
        let (_dir, pool) = pool().await;
        let stored = upsert_rule(&pool, &rule("Food", 0.95)).await.unwrap();
        let id = stored.id.unwrap();
        record_rule_use(&pool, id, Utc::now()).await.unwrap();
        record_rule_use(&pool, id, Utc::now()).await.unwrap();

        let rules = list_rules(&pool, &OwnerId::new("u1")).await.unwrap();
        assert_eq!(rules[0].usage_count, 2);
        assert!(rules[0].last_used_at.is_some());
    }
}
