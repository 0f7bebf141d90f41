use chrono::{DateTime, Utc};
use fins_core::{Account, AccountId, AccountKind, NewAccount, OwnerId};

use crate::db::{DbPool, StorageError};

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: i64,
    owner_id: String,
    name: String,
    account_type: String,
    institution: Option<String>,
    last4: Option<String>,
    currency: String,
    is_active: bool,
    last_activity_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

const ACCOUNT_COLUMNS: &str = "id, owner_id, name, account_type, institution, last4, currency, is_active, last_activity_at, created_at";

fn account_from_row(r: AccountRow) -> Account {
    Account {
        id: AccountId(r.id),
        owner_id: OwnerId(r.owner_id),
        name: r.name,
        account_type: AccountKind::parse_lenient(&r.account_type),
        institution: r.institution,
        last4: r.last4,
        currency: r.currency,
        is_active: r.is_active,
        last_activity_at: r.last_activity_at,
        created_at: r.created_at,
    }
}

/// Active accounts of `owner`, most recently active first.
pub async fn list_accounts(pool: &DbPool, owner: &OwnerId) -> Result<Vec<Account>, StorageError> {
    let rows = sqlx::query_as::<_, AccountRow>(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE owner_id = ? AND is_active = 1 \
         ORDER BY COALESCE(last_activity_at, created_at) DESC, id DESC"
    ))
    .bind(owner.as_str())
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(account_from_row).collect())
}

/// Looks up an account only if `owner` owns it.
pub async fn get_account(
    pool: &DbPool,
    owner: &OwnerId,
    id: AccountId,
) -> Result<Option<Account>, StorageError> {
    let row = sqlx::query_as::<_, AccountRow>(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ? AND owner_id = ?"
    ))
    .bind(id.0)
    .bind(owner.as_str())
    .fetch_optional(pool)
    .await?;

    Ok(row.map(account_from_row))
}

pub async fn create_account(
    pool: &DbPool,
    owner: &OwnerId,
    account: &NewAccount,
) -> Result<Account, StorageError> {
    let now = Utc::now();
    let id = sqlx::query(
        "INSERT INTO accounts (owner_id, name, account_type, institution, last4, currency, is_active, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, 1, ?)",
    )
    .bind(owner.as_str())
    .bind(&account.name)
    .bind(account.account_type.as_str())
    .bind(&account.institution)
    .bind(&account.last4)
    .bind(&account.currency)
    .bind(now)
    .execute(pool)
    .await?
    .last_insert_rowid();

    Ok(Account {
        id: AccountId(id),
        owner_id: owner.clone(),
        name: account.name.clone(),
        account_type: account.account_type,
        institution: account.institution.clone(),
        last4: account.last4.clone(),
        currency: account.currency.clone(),
        is_active: true,
        last_activity_at: None,
        created_at: now,
    })
}
