use fins_core::{AccountInfoGuess, AccountKind, DocumentContent, ParsedStatement, SourceFormat};
use thiserror::Error;
use tracing::warn;

const FULL_TEXT_CHARS: usize = 5_000;
const SECTION_CHARS: usize = 3_000;
const MAX_TABLES: usize = 3;
const MIN_TABLE_COLUMNS: usize = 3;
const MIN_TABLE_ROWS: usize = 2;

const KNOWN_INSTITUTIONS: &[&str] = &[
    "Chase",
    "Bank of America",
    "Wells Fargo",
    "Citibank",
    "Capital One",
    "US Bank",
    "PNC",
    "TD Bank",
    "American Express",
    "Discover",
    "Ally",
    "Charles Schwab",
    "Fidelity",
];

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Text extraction failed: {0}")]
    Extraction(String),
    #[error("No extractable text in document")]
    Empty,
    #[error("Unsupported document format: {0}")]
    Unsupported(SourceFormat),
}

re!(re_section_transactions, r"(?i)transactions?\s*(?:history)?");
re!(re_section_activity, r"(?i)account\s+activity");
re!(re_section_details, r"(?i)transaction\s+details?");
re!(re_section_summary, r"(?i)activity\s+summary");
re!(re_account_number, r"(?i)account\s*(?:number|#|no\.?)[ \t]*:?[ \t]*[*xX\- ]*(\d[\d\- ]{2,})");
re!(re_account_colon, r"(?i)account[ \t]*:[ \t]*[*xX\- ]*(\d[\d\- ]{2,})");
re!(re_acct_short, r"(?i)\b(?:acct|a/c)\.?[ \t]*#?[ \t]*:?[ \t]*[*xX\- ]*(\d[\d\- ]{2,})");
re!(re_ending_in, r"(?i)ending\s+in\s*:?\s*(\d{4})");
re!(re_cell_split, r"\t|\s{2,}");
re!(re_type_checking, r"(?i)\bchecking\b");
re!(re_type_savings, r"(?i)\bsavings\b");
re!(re_type_credit_card, r"(?i)\bcredit\s+card\b|\bcard\s*member\b");

/// Extracts document text and the cheap structure hints used downstream.
///
/// PDFs go through `pdf-extract`; plain text is decoded lossily. Table
/// detection failures degrade to no tables rather than failing the parse.
pub fn parse_document(data: &[u8], format: SourceFormat) -> Result<ParsedStatement, DocumentError> {
    let text = match format {
        SourceFormat::Pdf => extract_pdf_text(data)?,
        SourceFormat::Text => String::from_utf8_lossy(data).into_owned(),
        SourceFormat::Csv => return Err(DocumentError::Unsupported(format)),
    };

    if text.trim().is_empty() {
        return Err(DocumentError::Empty);
    }

    let tables = match std::panic::catch_unwind(|| detect_tables(&text)) {
        Ok(tables) => tables,
        Err(_) => {
            warn!("table detection panicked, continuing without tables");
            Vec::new()
        }
    };
    let has_tables = !tables.is_empty();

    let section = transaction_section(&text);

    Ok(ParsedStatement::Document(DocumentContent {
        full_text: truncate_chars(&text, FULL_TEXT_CHARS),
        transaction_section: truncate_chars(section, SECTION_CHARS),
        tables: tables.into_iter().take(MAX_TABLES).collect(),
        has_tables,
        account_info: guess_account_info(&text),
        requires_external_analysis: true,
    }))
}

fn extract_pdf_text(data: &[u8]) -> Result<String, DocumentError> {
    // pdf-extract panics on some malformed inputs.
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(data)) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(DocumentError::Extraction(format!("PDF: {e}"))),
        Err(_) => Err(DocumentError::Extraction(
            "PDF extraction panicked (malformed file)".to_string(),
        )),
    }
}

pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Text from the first transaction-section heading onward, or the whole text.
pub fn transaction_section(text: &str) -> &str {
    let patterns = [
        re_section_transactions(),
        re_section_activity(),
        re_section_details(),
        re_section_summary(),
    ];
    patterns
        .iter()
        .find_map(|re| re.find(text))
        .map(|m| &text[m.start()..])
        .unwrap_or(text)
}

/// Groups runs of column-aligned lines into tables.
pub fn detect_tables(text: &str) -> Vec<Vec<Vec<String>>> {
    let mut tables = Vec::new();
    let mut current: Vec<Vec<String>> = Vec::new();

    for line in text.lines() {
        let cells: Vec<String> = re_cell_split()
            .split(line.trim())
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();

        if cells.len() >= MIN_TABLE_COLUMNS {
            current.push(cells);
        } else if !current.is_empty() {
            flush_table(&mut tables, &mut current);
        }
    }
    flush_table(&mut tables, &mut current);
    tables
}

fn flush_table(tables: &mut Vec<Vec<Vec<String>>>, current: &mut Vec<Vec<String>>) {
    if current.len() >= MIN_TABLE_ROWS {
        tables.push(std::mem::take(current));
    } else {
        current.clear();
    }
}

/// Best-effort account number, type and institution from raw text.
pub fn guess_account_info(text: &str) -> AccountInfoGuess {
    let number_patterns = [re_account_number(), re_account_colon(), re_acct_short(), re_ending_in()];
    let last4 = number_patterns.iter().find_map(|re| {
        let caps = re.captures(text)?;
        let digits: String = caps.get(1)?.as_str().chars().filter(char::is_ascii_digit).collect();
        (digits.len() >= 4).then(|| digits[digits.len() - 4..].to_string())
    });

    let account_type = if re_type_checking().is_match(text) {
        Some(AccountKind::Checking)
    } else if re_type_savings().is_match(text) {
        Some(AccountKind::Savings)
    } else if re_type_credit_card().is_match(text) {
        Some(AccountKind::CreditCard)
    } else {
        None
    };

    let lower = text.to_lowercase();

    let institution = KNOWN_INSTITUTIONS
        .iter()
        .find(|name| contains_word(&lower, &name.to_lowercase()))
        .map(|name| name.to_string());

    AccountInfoGuess {
        last4,
        account_type,
        institution,
    }
}

/// Substring match that refuses to land inside a longer word ("chase" in "purchase").
fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATEMENT: &str = "CHASE\nTotal Checking Statement\nAccount Number: XXXX-XXXX-1234\n\
        Statement period 01/01/2024 to 01/31/2024\n\nTRANSACTION DETAILS\n\
        01/02   STARBUCKS #4821   -12.50\n\
        01/03   PAYROLL DEPOSIT   2000.00\n\
        01/05   SHELL OIL   -40.00\n\nThank you for banking with us\n";

    fn content(parsed: ParsedStatement) -> DocumentContent {
        match parsed {
            ParsedStatement::Document(doc) => doc,
            other => panic!("expected document, got {other:?}"),
        }
    }

    #[test]
    fn parses_text_statement() {
        let doc = content(parse_document(STATEMENT.as_bytes(), SourceFormat::Text).unwrap());
        assert!(doc.requires_external_analysis);
        assert!(doc.has_tables);
        assert_eq!(doc.tables.len(), 1);
        assert_eq!(doc.tables[0].len(), 3);
        assert_eq!(doc.tables[0][0], vec!["01/02", "STARBUCKS #4821", "-12.50"]);
        assert!(doc.transaction_section.starts_with("TRANSACTION"));
        assert_eq!(doc.account_info.last4.as_deref(), Some("1234"));
        assert_eq!(doc.account_info.account_type, Some(AccountKind::Checking));
        assert_eq!(doc.account_info.institution.as_deref(), Some("Chase"));
    }

    #[test]
    fn whitespace_only_text_is_empty() {
        assert!(matches!(
            parse_document(b"   \n\t  ", SourceFormat::Text),
            Err(DocumentError::Empty)
        ));
    }

    #[test]
    fn csv_format_is_rejected() {
        assert!(matches!(
            parse_document(b"a,b", SourceFormat::Csv),
            Err(DocumentError::Unsupported(SourceFormat::Csv))
        ));
    }

    #[test]
    fn garbage_pdf_is_an_extraction_error() {
        let result = parse_document(b"%PDF-1.4 this is not really a pdf", SourceFormat::Pdf);
        assert!(result.is_err());
    }

    #[test]
    fn truncates_by_characters() {
        let text = "é".repeat(6_000);
        let doc = content(parse_document(text.as_bytes(), SourceFormat::Text).unwrap());
        assert_eq!(doc.full_text.chars().count(), 5_000);
        assert_eq!(doc.transaction_section.chars().count(), 3_000);
    }

    #[test]
    fn keeps_at_most_three_tables() {
        let block = "a  b  c\nd  e  f\n\nsingle line\n";
        let text = block.repeat(5);
        let doc = content(parse_document(text.as_bytes(), SourceFormat::Text).unwrap());
        assert!(doc.has_tables);
        assert_eq!(doc.tables.len(), 3);
    }

    #[test]
    fn section_falls_back_to_whole_text() {
        assert_eq!(transaction_section("nothing here"), "nothing here");
    }

    #[test]
    fn account_info_ending_in() {
        let info = guess_account_info("Capital One Quicksilver credit card ending in 9876");
        assert_eq!(info.last4.as_deref(), Some("9876"));
        assert_eq!(info.account_type, Some(AccountKind::CreditCard));
        assert_eq!(info.institution.as_deref(), Some("Capital One"));
    }

    #[test]
    fn checking_wins_over_credit_card_mentions() {
        let info = guess_account_info("Premier Checking statement. Pay your credit card online.");
        assert_eq!(info.account_type, Some(AccountKind::Checking));

        let info = guess_account_info("Savings summary; credit card offers inside");
        assert_eq!(info.account_type, Some(AccountKind::Savings));

        let info = guess_account_info("Rechecking your cardholder terms");
        assert_eq!(info.account_type, None);
    }

    #[test]
    fn institution_needs_whole_word() {
        let info = guess_account_info("Your purchases this month, totally normal");
        assert_eq!(info.institution, None);
    }

    #[test]
    fn account_info_absent() {
        assert_eq!(guess_account_info("hello world"), AccountInfoGuess::default());
    }
}
