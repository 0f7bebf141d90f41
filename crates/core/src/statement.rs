use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::account::{AccountId, AccountKind};
use super::money::Money;
use super::period::DateRange;

/// What the uploaded bytes turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    Csv,
    Pdf,
    Text,
}

impl SourceFormat {
    pub fn extension(self) -> &'static str {
        match self {
            SourceFormat::Csv => "csv",
            SourceFormat::Pdf => "pdf",
            SourceFormat::Text => "txt",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" | "tsv" => Some(SourceFormat::Csv),
            "pdf" => Some(SourceFormat::Pdf),
            "txt" => Some(SourceFormat::Text),
            _ => None,
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// One normalised data row of a tabular statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabularRow {
    pub date: NaiveDate,
    pub amount: Money,
    pub description: String,
    pub merchant_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementBounds {
    pub period: DateRange,
    pub row_count: usize,
}

/// Cheap deterministic guess pulled straight from document text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfoGuess {
    pub last4: Option<String>,
    pub account_type: Option<AccountKind>,
    pub institution: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentContent {
    /// First 5,000 characters of the extracted text.
    pub full_text: String,
    /// First 3,000 characters from the transaction section onward.
    pub transaction_section: String,
    /// At most three detected tables, each a list of rows of cells.
    pub tables: Vec<Vec<Vec<String>>>,
    pub has_tables: bool,
    pub account_info: AccountInfoGuess,
    pub requires_external_analysis: bool,
}

/// In-memory intermediate representation produced by the parsers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum ParsedStatement {
    Tabular {
        rows: Vec<TabularRow>,
        bounds: Option<StatementBounds>,
    },
    Document(DocumentContent),
}

impl ParsedStatement {
    pub fn is_tabular(&self) -> bool {
        matches!(self, ParsedStatement::Tabular { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatementLayout {
    #[serde(rename = "csv")]
    Csv,
    #[serde(rename = "pdf_tabular")]
    DocumentTabular,
    #[serde(rename = "pdf_text")]
    DocumentText,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementMetadata {
    pub institution: Option<String>,
    pub account_type: AccountKind,
    pub last4: Option<String>,
    pub period: Option<DateRange>,
    pub layout: StatementLayout,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountMatch {
    pub account_id: Option<AccountId>,
    pub confidence: f32,
    pub reasoning: String,
    pub should_create_new: bool,
    pub suggested_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_format_from_extension() {
        assert_eq!(SourceFormat::from_extension("CSV"), Some(SourceFormat::Csv));
        assert_eq!(SourceFormat::from_extension("tsv"), Some(SourceFormat::Csv));
        assert_eq!(SourceFormat::from_extension("pdf"), Some(SourceFormat::Pdf));
        assert_eq!(SourceFormat::from_extension("xlsx"), None);
    }

    #[test]
    fn parsed_statement_is_tagged_by_format() {
        let parsed = ParsedStatement::Tabular { rows: vec![], bounds: None };
        let json = serde_json::to_value(&parsed).unwrap();
        assert_eq!(json["format"], "tabular");
        assert!(parsed.is_tabular());
    }

    #[test]
    fn layout_serializes_with_wire_names() {
        let json = serde_json::to_string(&StatementLayout::DocumentText).unwrap();
        assert_eq!(json, "\"pdf_text\"");
    }
}
