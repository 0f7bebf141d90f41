//! Prompt builders for each completion call site. Each returns the message
//! list to send; the matching reply shape lives in [`crate::response`].

use fins_core::{Account, DocumentContent, StatementMetadata, TransactionDraft, CATEGORY_TAXONOMY};
use serde_json::{json, Map, Value};

use crate::ChatMessage;

const STRUCTURE_TEXT_CHARS: usize = 2_000;
const STRUCTURE_SECTION_CHARS: usize = 1_500;
const EXTRACTION_TABLES: usize = 2;

fn head(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

fn taxonomy_json() -> Value {
    let map: Map<String, Value> = CATEGORY_TAXONOMY
        .iter()
        .map(|(name, subs)| (name.to_string(), json!(subs)))
        .collect();
    Value::Object(map)
}

fn metadata_json(metadata: &StatementMetadata) -> Value {
    json!({
        "institution": metadata.institution,
        "account_number_last4": metadata.last4,
        "account_type": metadata.account_type.as_str(),
        "statement_period": metadata.period.map(|p| json!({
            "start_date": p.start.to_string(),
            "end_date": p.end.to_string(),
        })),
        "format_type": metadata.layout,
        "confidence": metadata.confidence,
    })
}

/// Metadata extraction for a document statement.
pub fn structure_prompt(doc: &DocumentContent) -> Vec<ChatMessage> {
    let detected = serde_json::to_string(&doc.account_info).unwrap_or_default();
    let prompt = format!(
        r#"Analyze this bank statement and extract metadata.

Statement content:
- Full text sample: {full_text}
- Transaction section: {section}
- Has tables: {has_tables}
- Detected account info: {detected}

Return JSON with this structure:
{{
  "institution": "bank name (e.g., Chase, Bank of America)",
  "account_number_last4": "last 4 digits or null",
  "account_type": "checking|savings|credit_card|unknown",
  "statement_period": {{"start_date": "YYYY-MM-DD", "end_date": "YYYY-MM-DD"}},
  "format_type": "pdf_tabular|pdf_text",
  "confidence": 0.95
}}

Guidelines:
- Use detected account info if available
- Look for common bank names in headers
- Identify account type from keywords (checking, savings, credit card)
- Extract the statement date range
- Set confidence based on how much information you can extract"#,
        full_text = head(&doc.full_text, STRUCTURE_TEXT_CHARS),
        section = head(&doc.transaction_section, STRUCTURE_SECTION_CHARS),
        has_tables = doc.has_tables,
    );
    vec![ChatMessage::user(prompt)]
}

/// Transaction extraction from document text and detected tables.
pub fn extraction_prompt(doc: &DocumentContent, metadata: &StatementMetadata) -> Vec<ChatMessage> {
    let tables: Vec<_> = doc.tables.iter().take(EXTRACTION_TABLES).collect();
    let categories: Vec<&str> = CATEGORY_TAXONOMY.iter().map(|(name, _)| *name).collect();
    let prompt = format!(
        r#"Extract transactions from this bank statement.

Statement info: {info}

Content:
- Transaction section: {section}
- Tables: {tables}

Return a JSON array of transactions:
[{{
  "date": "YYYY-MM-DD",
  "amount": -50.00,
  "description": "original description",
  "merchant_name": "cleaned merchant name",
  "category": "Food",
  "subcategory": "Restaurants",
  "confidence": 0.85
}}]

Guidelines:
- Skip headers, totals, and balance rows
- Normalize dates to YYYY-MM-DD
- Clean merchant names (remove IDs, locations, reference numbers)
- Negative amounts for debits/expenses, positive for credits/income
- Suggest category and subcategory
- Set confidence based on clarity of data

Categories: {categories}"#,
        info = metadata_json(metadata),
        section = doc.transaction_section,
        tables = serde_json::to_string(&tables).unwrap_or_default(),
        categories = categories.join(", "),
    );
    vec![ChatMessage::user(prompt)]
}

/// Classification of one batch. Rows are keyed by their position in `batch`.
pub fn categorization_prompt(batch: &[TransactionDraft]) -> Vec<ChatMessage> {
    let rows: Vec<Value> = batch
        .iter()
        .enumerate()
        .map(|(index, t)| {
            json!({
                "index": index,
                "date": t.date.to_string(),
                "amount": t.amount.to_f64(),
                "description": t.description,
                "merchant_name": t.merchant_name,
            })
        })
        .collect();

    let prompt = format!(
        r#"You are a financial transaction categorization expert. Analyze these transactions and categorize each one.

Available categories and subcategories:
{taxonomy}

Transactions to categorize:
{rows}

For each transaction, determine:
1. The most appropriate category and subcategory
2. Whether it looks like a recurring charge or deposit
3. Your confidence level (0.0 to 1.0)

Return ONLY a JSON array with one entry per transaction:
[
  {{
    "index": 0,
    "category": "category_name",
    "subcategory": "subcategory_name",
    "is_recurring": false,
    "confidence": 0.95
  }}
]

Guidelines:
- Use merchant name as primary signal
- Consider transaction amount patterns
- Be conservative with confidence scores
- If truly unclear, use confidence < 0.5 and suggest "Other""#,
        taxonomy = pretty(&taxonomy_json()),
        rows = pretty(&Value::Array(rows)),
    );
    vec![ChatMessage::user(prompt)]
}

/// Which of the owner's accounts a statement belongs to.
pub fn account_match_prompt(metadata: &StatementMetadata, accounts: &[Account]) -> Vec<ChatMessage> {
    let accounts: Vec<Value> = accounts
        .iter()
        .map(|a| {
            json!({
                "id": a.id.0,
                "name": a.name,
                "institution": a.institution,
                "account_type": a.account_type.as_str(),
                "account_number_last4": a.last4,
                "last_activity_at": a.last_activity_at.map(|t| t.to_rfc3339()),
            })
        })
        .collect();

    let prompt = format!(
        r#"You are a financial account matching expert. Determine which account this statement belongs to.

Statement metadata:
{metadata}

User's existing accounts:
{accounts}

Analyze and return JSON:
{{
  "suggested_account_id": "id of best match or null",
  "confidence": 0.95,
  "reasoning": "explanation of why this account matches",
  "should_create_new": true,
  "suggested_account_name": "name for new account if creating"
}}

Matching criteria (in order of importance):
1. Institution name + account_number_last4 = EXACT match (confidence 1.0)
2. Institution name + account_type = STRONG match (confidence 0.8)
3. Account_type only = WEAK match (confidence 0.5)
4. No matches = suggest creating new account

Guidelines:
- If multiple accounts match, choose the most recently active one
- If no good match (confidence < 0.7), suggest creating a new account
- For new accounts, suggest a descriptive name like "Chase Checking (...1234)""#,
        metadata = pretty(&metadata_json(metadata)),
        accounts = pretty(&Value::Array(accounts)),
    );
    vec![ChatMessage::user(prompt)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use fins_core::{AccountInfoGuess, AccountKind, Money, StatementLayout};

    fn doc() -> DocumentContent {
        DocumentContent {
            full_text: "x".repeat(4_000),
            transaction_section: "TRANSACTIONS 01/02 COFFEE -4.00".into(),
            tables: vec![vec![vec!["a".into()]]; 3],
            has_tables: true,
            account_info: AccountInfoGuess {
                last4: Some("1234".into()),
                ..AccountInfoGuess::default()
            },
            requires_external_analysis: true,
        }
    }

    fn metadata() -> StatementMetadata {
        StatementMetadata {
            institution: Some("Chase".into()),
            account_type: AccountKind::Checking,
            last4: Some("1234".into()),
            period: None,
            layout: StatementLayout::DocumentText,
            confidence: 0.9,
        }
    }

    #[test]
    fn structure_prompt_truncates_text() {
        let msgs = structure_prompt(&doc());
        assert_eq!(msgs.len(), 1);
        assert!(!msgs[0].content.contains(&"x".repeat(2_001)));
        assert!(msgs[0].content.contains(&"x".repeat(2_000)));
        assert!(msgs[0].content.contains("\"last4\":\"1234\""));
    }

    #[test]
    fn extraction_prompt_sends_two_tables() {
        let msgs = extraction_prompt(&doc(), &metadata());
        assert!(msgs[0].content.contains(r#"Tables: [[["a"]],[["a"]]]"#));
        assert!(msgs[0].content.contains("\"pdf_text\""));
    }

    #[test]
    fn categorization_prompt_embeds_taxonomy_and_indexes() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let batch = vec![
            TransactionDraft::new(date, Money::from_cents(-1250), "STARBUCKS #4821").with_merchant("STARBUCKS"),
            TransactionDraft::new(date, Money::from_cents(200000), "PAYROLL"),
        ];
        let content = &categorization_prompt(&batch)[0].content;
        assert!(content.contains("Coffee Shops"));
        assert!(content.contains("\"index\": 1"));
        assert!(content.contains("STARBUCKS #4821"));
    }

    #[test]
    fn account_match_prompt_lists_accounts() {
        let content = &account_match_prompt(&metadata(), &[])[0].content;
        assert!(content.contains("\"institution\": \"Chase\""));
        assert!(content.contains("[]"));
    }
}
