use chrono::Duration;
use fins_core::{AccountId, DateRange, TransactionDraft};
use fins_import::{partition_duplicates, DUPLICATE_WINDOW_DAYS};
use fins_storage::{find_in_range, DbPool, StorageError};

/// Splits `drafts` into `(duplicates, new)` against what `account` already
/// holds. Drafts are never compared with each other.
pub async fn check_duplicates(
    pool: &DbPool,
    account: AccountId,
    drafts: Vec<TransactionDraft>,
) -> Result<(Vec<TransactionDraft>, Vec<TransactionDraft>), StorageError> {
    let Some(span) = DateRange::spanning(drafts.iter().map(|d| d.date)) else {
        return Ok((Vec::new(), drafts));
    };
    let window = Duration::days(DUPLICATE_WINDOW_DAYS);
    let range = DateRange::new(span.start - window, span.end + window);

    let existing = find_in_range(pool, account, range).await?;
    if existing.is_empty() {
        return Ok((Vec::new(), drafts));
    }
    Ok(partition_duplicates(drafts, &existing))
}
