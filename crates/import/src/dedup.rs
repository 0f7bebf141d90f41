use fins_core::{StoredTransaction, TransactionDraft};

/// Dates within this many days of each other can be the same transaction.
pub const DUPLICATE_WINDOW_DAYS: i64 = 1;

fn text_overlaps(a: &str, b: &str) -> bool {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a == b || a.contains(&b) || b.contains(&a)
}

/// Whether `draft` is already recorded as `existing`.
///
/// Requires the exact same amount, dates at most one day apart, and a textual
/// overlap: the draft description equals or contains (or is contained in) the
/// stored description or merchant, or both merchants are identical.
pub fn is_duplicate(draft: &TransactionDraft, existing: &StoredTransaction) -> bool {
    if draft.amount.to_cents() != existing.amount.to_cents() {
        return false;
    }
    if (draft.date - existing.date).num_days().abs() > DUPLICATE_WINDOW_DAYS {
        return false;
    }

    let description_hit = text_overlaps(&draft.description, &existing.description)
        || existing
            .merchant_name
            .as_deref()
            .is_some_and(|m| text_overlaps(&draft.description, m));

    let merchant_hit = match (&draft.merchant_name, &existing.merchant_name) {
        (Some(a), Some(b)) => {
            let a = a.trim();
            !a.is_empty() && a.eq_ignore_ascii_case(b.trim())
        }
        _ => false,
    };

    description_hit || merchant_hit
}

/// Splits drafts into `(duplicates, new)`, preserving input order in both.
pub fn partition_duplicates(
    drafts: Vec<TransactionDraft>,
    existing: &[StoredTransaction],
) -> (Vec<TransactionDraft>, Vec<TransactionDraft>) {
    drafts
        .into_iter()
        .partition(|draft| existing.iter().any(|e| is_duplicate(draft, e)))
}
