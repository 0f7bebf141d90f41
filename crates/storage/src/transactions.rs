use chrono::{DateTime, NaiveDate, Utc};
use fins_core::{
    AccountId, CategorizationMethod, DateRange, Money, OwnerId, StoredTransaction, TransactionDraft,
};

use crate::db::{DbPool, StorageError};

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: i64,
    account_id: i64,
    owner_id: String,
    date: NaiveDate,
    amount_cents: i64,
    currency: String,
    description: String,
    merchant_name: Option<String>,
    category: Option<String>,
    subcategory: Option<String>,
    is_recurring: bool,
    confidence: Option<f32>,
    categorization_method: String,
    user_verified: bool,
    created_at: DateTime<Utc>,
}

const TRANSACTION_COLUMNS: &str = "id, account_id, owner_id, date, amount_cents, currency, description, \
     merchant_name, category, subcategory, is_recurring, confidence, categorization_method, \
     user_verified, created_at";

fn transaction_from_row(r: TransactionRow) -> StoredTransaction {
    StoredTransaction {
        id: r.id,
        account_id: AccountId(r.account_id),
        owner_id: OwnerId(r.owner_id),
        date: r.date,
        amount: Money::from_cents(r.amount_cents),
        currency: r.currency,
        description: r.description,
        merchant_name: r.merchant_name,
        category: r.category,
        subcategory: r.subcategory,
        is_recurring: r.is_recurring,
        confidence: r.confidence,
        method: r.categorization_method.parse().unwrap_or_default(),
        user_verified: r.user_verified,
        created_at: Some(r.created_at),
    }
}

/// Stored transactions of `account` dated within `range`, inclusive.
pub async fn find_in_range(
    pool: &DbPool,
    account: AccountId,
    range: DateRange,
) -> Result<Vec<StoredTransaction>, StorageError> {
    let rows = sqlx::query_as::<_, TransactionRow>(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions \
         WHERE account_id = ? AND date >= ? AND date <= ? ORDER BY date, id"
    ))
    .bind(account.0)
    .bind(range.start)
    .bind(range.end)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(transaction_from_row).collect())
}

pub async fn list_transactions(
    pool: &DbPool,
    account: AccountId,
) -> Result<Vec<StoredTransaction>, StorageError> {
    let rows = sqlx::query_as::<_, TransactionRow>(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE account_id = ? ORDER BY date, id"
    ))
    .bind(account.0)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(transaction_from_row).collect())
}

/// Transactions eligible for re-categorisation: not user-verified.
pub async fn list_unverified(
    pool: &DbPool,
    owner: &OwnerId,
    account: AccountId,
) -> Result<Vec<StoredTransaction>, StorageError> {
    let rows = sqlx::query_as::<_, TransactionRow>(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions \
         WHERE owner_id = ? AND account_id = ? AND user_verified = 0 ORDER BY date, id"
    ))
    .bind(owner.as_str())
    .bind(account.0)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(transaction_from_row).collect())
}

/// Inserts every draft in one database transaction and stamps the account's
/// last activity. Returns the number of rows written.
pub async fn save_batch(
    pool: &DbPool,
    owner: &OwnerId,
    account: AccountId,
    drafts: &[TransactionDraft],
) -> Result<usize, StorageError> {
    if drafts.is_empty() {
        return Ok(0);
    }

    let now = Utc::now();
    let mut tx = pool.begin().await?;

    for draft in drafts {
        sqlx::query(
            "INSERT INTO transactions (account_id, owner_id, date, amount_cents, currency, description, \
             merchant_name, category, subcategory, is_recurring, confidence, categorization_method, \
             user_verified, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(account.0)
        .bind(owner.as_str())
        .bind(draft.date)
        .bind(draft.amount.to_cents())
        .bind(&draft.currency)
        .bind(&draft.description)
        .bind(&draft.merchant_name)
        .bind(&draft.category)
        .bind(&draft.subcategory)
        .bind(draft.is_recurring)
        .bind(draft.confidence)
        .bind(draft.method.as_str())
        .bind(draft.user_verified)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query("UPDATE accounts SET last_activity_at = ? WHERE id = ?")
        .bind(now)
        .bind(account.0)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(drafts.len())
}

/// Writes a new categorisation onto a stored transaction unless the user has
/// verified it since it was read.
pub async fn update_categorization(
    pool: &DbPool,
    id: i64,
    draft: &TransactionDraft,
) -> Result<bool, StorageError> {
    let result = sqlx::query(
        "UPDATE transactions SET category = ?, subcategory = ?, is_recurring = ?, confidence = ?, \
         categorization_method = ? WHERE id = ? AND user_verified = 0",
    )
    .bind(&draft.category)
    .bind(&draft.subcategory)
    .bind(draft.is_recurring)
    .bind(draft.confidence)
    .bind(draft.method.as_str())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn mark_verified(pool: &DbPool, id: i64) -> Result<(), StorageError> {
    sqlx::query("UPDATE transactions SET user_verified = 1 WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{create_account, get_account};
    use crate::db::create_db;
    use fins_core::{AccountKind, NewAccount};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    async fn setup() -> (tempfile::TempDir, DbPool, OwnerId, AccountId) {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("fins.db")).await.unwrap();
        let owner = OwnerId::new("u1");
        let account = create_account(&pool, &owner, &NewAccount::new("Checking", AccountKind::Checking))
            .await
            .unwrap();
        (dir, pool, owner, account.id)
    }

    #[tokio::test]
    async fn save_batch_roundtrips_and_stamps_activity() {
        let (_dir, pool, owner, account) = setup().await;
        let mut coffee = TransactionDraft::new(d(2024, 1, 2), Money::from_cents(-1250), "STARBUCKS #4821")
            .with_merchant("STARBUCKS");
        coffee.set_category("Food".into(), Some("Coffee Shops".into()), 0.95, CategorizationMethod::Ai);
        let pay = TransactionDraft::new(d(2024, 1, 3), Money::from_cents(200000), "PAYROLL");

        assert_eq!(save_batch(&pool, &owner, account, &[coffee, pay]).await.unwrap(), 2);

        let stored = list_transactions(&pool, account).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].amount.to_cents(), -1250);
        assert_eq!(stored[0].method, CategorizationMethod::Ai);
        assert_eq!(stored[0].subcategory.as_deref(), Some("Coffee Shops"));
        assert_eq!(stored[1].method, CategorizationMethod::None);
        assert!(!stored[1].user_verified);

        let acct = get_account(&pool, &owner, account).await.unwrap().unwrap();
        assert!(acct.last_activity_at.is_some());
    }

    #[tokio::test]
    async fn find_in_range_is_inclusive() {
        let (_dir, pool, owner, account) = setup().await;
        let drafts: Vec<_> = [9, 10, 11, 12]
            .iter()
            .map(|day| TransactionDraft::new(d(2024, 3, *day), Money::from_cents(-100), "X"))
            .collect();
        save_batch(&pool, &owner, account, &drafts).await.unwrap();

        let found = find_in_range(&pool, account, DateRange::around(d(2024, 3, 10), 1)).await.unwrap();
        let days: Vec<NaiveDate> = found.iter().map(|t| t.date).collect();
        assert_eq!(days, vec![d(2024, 3, 9), d(2024, 3, 10), d(2024, 3, 11)]);
    }

    #[tokio::test]
    async fn verified_rows_are_not_recategorized() {
        let (_dir, pool, owner, account) = setup().await;
        let drafts = vec![
            TransactionDraft::new(d(2024, 1, 1), Money::from_cents(-500), "A"),
            TransactionDraft::new(d(2024, 1, 2), Money::from_cents(-600), "B"),
        ];
        save_batch(&pool, &owner, account, &drafts).await.unwrap();
        let stored = list_transactions(&pool, account).await.unwrap();
        mark_verified(&pool, stored[0].id).await.unwrap();

        let unverified = list_unverified(&pool, &owner, account).await.unwrap();
        assert_eq!(unverified.len(), 1);
        assert_eq!(unverified[0].description, "B");

        let mut update = stored[0].to_draft();
        update.set_category("Other".into(), None, 0.5, CategorizationMethod::Ai);
        assert!(!update_categorization(&pool, stored[0].id, &update).await.unwrap());
        assert!(update_categorization(&pool, stored[1].id, &update).await.unwrap());
    }
}
