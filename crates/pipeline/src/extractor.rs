use fins_core::{
    coerce_category, CategorizationMethod, DocumentContent, Money, OwnerId, ParsedStatement,
    StatementMetadata, TabularRow, TransactionDraft,
};
use fins_import::{clean_merchant_name, parse_amount, parse_date};
use fins_llm::{parse_json_response, prompts, ExtractedRow};
use fins_storage::StorageError;
use serde_json::Value;
use tracing::{debug, warn};

use crate::categorize::{CategorizationOutcome, Categorizer};

const UNSTATED_CONFIDENCE: f32 = 0.5;

/// Turns a parsed statement into categorised drafts.
///
/// Tabular rows are taken as they are. Document text goes through one
/// completion call; rows the reply gets wrong are dropped, and a failed call
/// yields no drafts rather than an error.
pub async fn extract(
    statement: &ParsedStatement,
    metadata: &StatementMetadata,
    categorizer: &Categorizer,
    owner: &OwnerId,
) -> Result<CategorizationOutcome, StorageError> {
    let drafts = match statement {
        ParsedStatement::Tabular { rows, .. } => rows.iter().map(draft_from_row).collect(),
        ParsedStatement::Document(doc) => extract_document(doc, metadata, categorizer).await,
    };
    categorizer.categorize(owner, drafts).await
}

fn draft_from_row(row: &TabularRow) -> TransactionDraft {
    let draft = TransactionDraft::new(row.date, row.amount, &row.description);
    match row.merchant_name.as_deref() {
        Some(merchant) => draft.with_merchant(merchant),
        None => draft,
    }
}

async fn extract_document(
    doc: &DocumentContent,
    metadata: &StatementMetadata,
    categorizer: &Categorizer,
) -> Vec<TransactionDraft> {
    let settings = categorizer.settings();
    let messages = prompts::extraction_prompt(doc, metadata);
    let reply = match categorizer
        .llm()
        .complete(&messages, settings.analysis_temperature, settings.extraction_max_tokens)
        .await
    {
        Ok(text) => parse_json_response::<Vec<Value>>(&text),
        Err(e) => Err(e),
    };

    let values = match reply {
        Ok(values) => values,
        Err(e) => {
            warn!("transaction extraction produced nothing: {e}");
            return Vec::new();
        }
    };

    let total = values.len();
    let drafts: Vec<TransactionDraft> = values
        .into_iter()
        .filter_map(|v| serde_json::from_value::<ExtractedRow>(v).ok())
        .filter_map(draft_from_extracted)
        .collect();

    if drafts.len() < total {
        debug!(dropped = total - drafts.len(), "dropped malformed extracted rows");
    }
    drafts
}

fn amount_from_value(value: &Value) -> Option<Money> {
    match value {
        Value::Number(n) => n.as_f64().and_then(Money::from_f64),
        Value::String(s) => parse_amount(s),
        _ => None,
    }
}

fn draft_from_extracted(row: ExtractedRow) -> Option<TransactionDraft> {
    let date = parse_date(row.date.as_deref()?)?;
    let amount = amount_from_value(&row.amount)?;

    let merchant = row
        .merchant_name
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string);
    let description = row
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .or_else(|| merchant.clone())?;

    let merchant = merchant.unwrap_or_else(|| clean_merchant_name(&description));
    let mut draft = TransactionDraft::new(date, amount, &description).with_merchant(&merchant);

    if let Some(category) = row.category.as_deref().filter(|c| !c.trim().is_empty()) {
        let (category, subcategory) = coerce_category(category, row.subcategory.as_deref());
        draft.set_category(
            category,
            subcategory,
            row.confidence.unwrap_or(UNSTATED_CONFIDENCE),
            CategorizationMethod::Ai,
        );
    }
    Some(draft)
}
