#[macro_use]
mod util;

pub mod csv;
pub mod dedup;
pub mod document;
pub mod normalize;
pub mod rules;
pub mod sniff;

pub use csv::{parse_tabular, CsvError};
pub use dedup::{is_duplicate, partition_duplicates, DUPLICATE_WINDOW_DAYS};
pub use document::{parse_document, DocumentError};
pub use normalize::{clean_merchant_name, parse_amount, parse_date};
pub use rules::{derive_rule_pattern, RuleSet};
pub use sniff::{sniff_format, SniffError};

use fins_core::{ParsedStatement, SourceFormat};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error(transparent)]
    Csv(#[from] CsvError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error(transparent)]
    Sniff(#[from] SniffError),
}

/// Routes sniffed bytes to the tabular or document parser.
pub fn parse_statement(data: &[u8], format: SourceFormat) -> Result<ParsedStatement, ImportError> {
    match format {
        SourceFormat::Csv => Ok(parse_tabular(data)?),
        SourceFormat::Pdf | SourceFormat::Text => Ok(parse_document(data, format)?),
    }
}
