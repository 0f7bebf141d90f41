use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::CompletionError;

/// Decodes a JSON payload out of model text.
///
/// Accepts bare JSON, JSON wrapped in a Markdown code fence, or JSON embedded
/// in surrounding prose.
pub fn parse_json_response<T: DeserializeOwned>(text: &str) -> Result<T, CompletionError> {
    let trimmed = strip_code_fence(text.trim());
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    let start = trimmed
        .find(['[', '{'])
        .ok_or_else(|| CompletionError::Decode("no JSON found in response".to_string()))?;
    let close = if trimmed[start..].starts_with('[') { ']' } else { '}' };
    let end = trimmed
        .rfind(close)
        .filter(|end| *end > start)
        .ok_or_else(|| CompletionError::Decode("unterminated JSON in response".to_string()))?;

    serde_json::from_str(&trimmed[start..=end]).map_err(|e| CompletionError::Decode(e.to_string()))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the language tag line.
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PeriodReply {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Structure-analysis answer for document statements.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StructureReply {
    pub institution: Option<String>,
    pub account_number_last4: Option<String>,
    pub account_type: Option<String>,
    pub statement_period: Option<PeriodReply>,
    pub format_type: Option<String>,
    pub confidence: Option<f32>,
}

/// One transaction extracted from document text.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedRow {
    #[serde(default)]
    pub date: Option<String>,
    /// Number or string; the model is inconsistent about which.
    #[serde(default)]
    pub amount: Value,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub merchant_name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
}

/// One classification in a categorisation batch reply.
#[derive(Debug, Clone, Deserialize)]
pub struct CategorizedRow {
    #[serde(default)]
    pub index: Option<usize>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub is_recurring: Option<bool>,
    #[serde(default)]
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AccountMatchReply {
    /// Id as the model echoed it back: a number or a numeric string.
    pub suggested_account_id: Value,
    pub confidence: Option<f32>,
    pub reasoning: Option<String>,
    pub should_create_new: Option<bool>,
    pub suggested_account_name: Option<String>,
}

impl AccountMatchReply {
    pub fn account_id(&self) -> Option<i64> {
        match &self.suggested_account_id {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_json() {
        let reply: StructureReply = parse_json_response(r#"{"institution":"Chase","confidence":0.9}"#).unwrap();
        assert_eq!(reply.institution.as_deref(), Some("Chase"));
        assert_eq!(reply.confidence, Some(0.9));
    }

    #[test]
    fn parses_fenced_json() {
        let text = "```json\n[{\"index\":0,\"category\":\"Food\"}]\n```";
        let rows: Vec<CategorizedRow> = parse_json_response(text).unwrap();
        assert_eq!(rows[0].category.as_deref(), Some("Food"));
    }

    #[test]
    fn parses_json_inside_prose() {
        let text = "Sure! Here you go: [{\"date\":\"2024-01-02\",\"amount\":-12.5}] Hope that helps.";
        let rows: Vec<ExtractedRow> = parse_json_response(text).unwrap();
        assert_eq!(rows[0].date.as_deref(), Some("2024-01-02"));
        assert_eq!(rows[0].amount.as_f64(), Some(-12.5));
    }

    #[test]
    fn rejects_non_json() {
        let result: Result<Vec<CategorizedRow>, _> = parse_json_response("I cannot help with that");
        assert!(matches!(result, Err(CompletionError::Decode(_))));
    }

    #[test]
    fn account_id_from_number_or_string() {
        let reply: AccountMatchReply = parse_json_response(r#"{"suggested_account_id":"42"}"#).unwrap();
        assert_eq!(reply.account_id(), Some(42));
        let reply: AccountMatchReply = parse_json_response(r#"{"suggested_account_id":7}"#).unwrap();
        assert_eq!(reply.account_id(), Some(7));
        let reply: AccountMatchReply = parse_json_response(r#"{"suggested_account_id":null}"#).unwrap();
        assert_eq!(reply.account_id(), None);
    }
}
