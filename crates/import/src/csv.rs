use fins_core::{DateRange, Money, ParsedStatement, StatementBounds, TabularRow};
use thiserror::Error;

use crate::normalize::{clean_merchant_name, parse_amount, parse_date};

const HEADER_SCAN_ROWS: usize = 10;
const HEADER_KEYWORDS: &[&str] = &["date", "amount", "description", "transaction", "debit", "credit"];

/// Canonical column a raw header maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Date,
    Amount,
    Debit,
    Credit,
    Description,
    Merchant,
}

const COLUMN_SYNONYMS: &[(&str, Column)] = &[
    ("date", Column::Date),
    ("transaction date", Column::Date),
    ("trans date", Column::Date),
    ("posting date", Column::Date),
    ("post date", Column::Date),
    ("posted date", Column::Date),
    ("amount", Column::Amount),
    ("transaction amount", Column::Amount),
    ("amt", Column::Amount),
    ("debit", Column::Debit),
    ("debit amount", Column::Debit),
    ("withdrawal", Column::Debit),
    ("withdrawals", Column::Debit),
    ("credit", Column::Credit),
    ("credit amount", Column::Credit),
    ("deposit", Column::Credit),
    ("deposits", Column::Credit),
    ("description", Column::Description),
    ("desc", Column::Description),
    ("transaction description", Column::Description),
    ("memo", Column::Description),
    ("details", Column::Description),
    ("narrative", Column::Description),
    ("merchant", Column::Merchant),
    ("merchant name", Column::Merchant),
    ("payee", Column::Merchant),
    ("vendor", Column::Merchant),
];

#[derive(Error, Debug)]
pub enum CsvError {
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Missing required column: {0}")]
    MissingColumn(String),
    #[error("Empty file")]
    Empty,
}

/// Resolved column positions for one statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    pub date: Option<usize>,
    pub amount: Option<usize>,
    pub debit: Option<usize>,
    pub credit: Option<usize>,
    pub description: Option<usize>,
    pub merchant: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &[String]) -> Self {
        let mut map = ColumnMap::default();
        for (idx, raw) in headers.iter().enumerate() {
            let Some(column) = normalize_column(raw) else {
                continue;
            };
            let slot = match column {
                Column::Date => &mut map.date,
                Column::Amount => &mut map.amount,
                Column::Debit => &mut map.debit,
                Column::Credit => &mut map.credit,
                Column::Description => &mut map.description,
                Column::Merchant => &mut map.merchant,
            };
            // First matching header wins.
            if slot.is_none() {
                *slot = Some(idx);
            }
        }
        map
    }

    fn has_amount(&self) -> bool {
        self.amount.is_some() || self.debit.is_some() || self.credit.is_some()
    }
}

/// Maps a raw header onto a canonical column after lowercasing and trimming.
pub fn normalize_column(raw: &str) -> Option<Column> {
    let key = raw.trim().trim_matches('"').trim().to_lowercase();
    COLUMN_SYNONYMS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, column)| *column)
}

/// Picks the most frequent of comma, semicolon and tab in the first line.
/// Ties resolve in that order.
pub fn detect_delimiter(first_line: &str) -> u8 {
    let candidates = [b',', b';', b'\t'];
    let mut best = b',';
    let mut best_count = 0;
    for delim in candidates {
        let count = first_line.bytes().filter(|b| *b == delim).count();
        if count > best_count {
            best = delim;
            best_count = count;
        }
    }
    best
}

/// Index of the first of the leading rows that mentions a header keyword, else 0.
pub fn detect_header_row(records: &[Vec<String>]) -> usize {
    records
        .iter()
        .take(HEADER_SCAN_ROWS)
        .position(|row| {
            let joined = row.join(" ").to_lowercase();
            HEADER_KEYWORDS.iter().any(|kw| joined.contains(kw))
        })
        .unwrap_or(0)
}

fn field<'a>(row: &'a [String], idx: Option<usize>) -> Option<&'a str> {
    idx.and_then(|i| row.get(i))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

fn row_amount(row: &[String], map: &ColumnMap) -> Option<Money> {
    if let Some(raw) = field(row, map.amount) {
        return parse_amount(raw);
    }
    // Split debit/credit columns fold into one signed amount.
    let debit = field(row, map.debit).and_then(parse_amount);
    let credit = field(row, map.credit).and_then(parse_amount);
    match (debit, credit) {
        (Some(d), None) => Some(-d.abs()),
        (None, Some(c)) => Some(c.abs()),
        (Some(d), Some(c)) if d.is_zero() => Some(c.abs()),
        (Some(d), Some(_)) => Some(-d.abs()),
        (None, None) => None,
    }
}

fn read_records(text: &str, delimiter: u8) -> Result<Vec<Vec<String>>, CsvError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let mut records = Vec::new();
    for result in reader.records() {
        let record = result?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        records.push(record.iter().map(str::to_string).collect());
    }
    Ok(records)
}

/// Parses delimited statement bytes into normalised rows.
///
/// Rows missing a date or an amount, or whose date/amount cannot be parsed,
/// are skipped, so a statement with no usable rows parses to an empty list.
/// Fails when no date column or no amount column (including a debit/credit
/// pair) can be identified.
pub fn parse_tabular(data: &[u8]) -> Result<ParsedStatement, CsvError> {
    let text = String::from_utf8_lossy(data);
    let text = text.trim_start_matches('\u{feff}');
    let first_line = text.lines().find(|l| !l.trim().is_empty()).ok_or(CsvError::Empty)?;
    let delimiter = detect_delimiter(first_line);

    let records = read_records(text, delimiter)?;
    if records.is_empty() {
        return Err(CsvError::Empty);
    }

    let header_idx = detect_header_row(&records);
    let map = ColumnMap::from_headers(&records[header_idx]);
    if map.date.is_none() {
        return Err(CsvError::MissingColumn("date".to_string()));
    }
    if !map.has_amount() {
        return Err(CsvError::MissingColumn("amount".to_string()));
    }

    let mut rows = Vec::new();
    for record in &records[header_idx + 1..] {
        let Some(date) = field(record, map.date).and_then(parse_date) else {
            continue;
        };
        let Some(amount) = row_amount(record, &map) else {
            continue;
        };

        let description = field(record, map.description).unwrap_or_default().to_string();
        let merchant = match field(record, map.merchant) {
            Some(raw) => clean_merchant_name(raw),
            None => clean_merchant_name(&description),
        };

        rows.push(TabularRow {
            date,
            amount,
            description,
            merchant_name: (!merchant.is_empty()).then_some(merchant),
        });
    }

    let bounds = DateRange::spanning(rows.iter().map(|r| r.date)).map(|period| StatementBounds {
        period,
        row_count: rows.len(),
    });

    Ok(ParsedStatement::Tabular { rows, bounds })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn rows_of(parsed: ParsedStatement) -> (Vec<TabularRow>, Option<StatementBounds>) {
        match parsed {
            ParsedStatement::Tabular { rows, bounds } => (rows, bounds),
            other => panic!("expected tabular, got {other:?}"),
        }
    }

    #[test]
    fn scenario_three_row_statement() {
        let data = b"Date,Amount,Description\n\
            01/02/2024, -12.50, STARBUCKS #4821\n\
            01/03/2024, 2000.00, PAYROLL DEPOSIT\n\
            02/02/2024, -12.50, STARBUCKS #9910\n";
        let (rows, bounds) = rows_of(parse_tabular(data).unwrap());

        let cents: Vec<i64> = rows.iter().map(|r| r.amount.to_cents()).collect();
        assert_eq!(cents, vec![-1250, 200000, -1250]);
        assert_eq!(rows[0].merchant_name.as_deref(), Some("STARBUCKS"));
        assert_eq!(rows[2].merchant_name.as_deref(), Some("STARBUCKS"));
        assert_eq!(rows[1].merchant_name.as_deref(), Some("PAYROLL DEPOSIT"));
        assert_eq!(rows[0].description, "STARBUCKS #4821");

        let bounds = bounds.unwrap();
        assert_eq!(bounds.row_count, 3);
        assert_eq!(bounds.period.start, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(bounds.period.end, NaiveDate::from_ymd_opt(2024, 2, 2).unwrap());
    }

    #[test]
    fn skips_rows_missing_or_unparseable_fields() {
        let data = b"Date,Amount,Description\n\
            2024-01-02,-5.00,KEEP ME\n\
            ,-5.00,NO DATE\n\
            2024-01-03,,NO AMOUNT\n\
            garbage,-1.00,BAD DATE\n\
            2024-01-04,abc,BAD AMOUNT\n\
            2024-01-05,7.00,KEEP ME TOO\n";
        let (rows, _) = rows_of(parse_tabular(data).unwrap());
        let descs: Vec<&str> = rows.iter().map(|r| r.description.as_str()).collect();
        assert_eq!(descs, vec!["KEEP ME", "KEEP ME TOO"]);
    }

    #[test]
    fn detects_semicolon_delimiter_and_synonyms() {
        let data = b"Trans Date;Payee;Transaction Amount\n2024-03-01;Corner Shop #12;-3.50\n";
        let (rows, _) = rows_of(parse_tabular(data).unwrap());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].merchant_name.as_deref(), Some("Corner Shop"));
        assert_eq!(rows[0].amount.to_cents(), -350);
    }

    #[test]
    fn detects_tab_delimiter() {
        let data = b"Date\tAmount\tDescription\n2024-03-01\t10.00\tREFUND\n";
        let (rows, _) = rows_of(parse_tabular(data).unwrap());
        assert_eq!(rows[0].amount.to_cents(), 1000);
    }

    #[test]
    fn header_after_preamble_rows() {
        let data = b"Account Statement,,\nGenerated 2024-04-01,,\n\
            Posting Date,Details,Amount\n2024-03-30,COFFEE,-4.00\n";
        let (rows, _) = rows_of(parse_tabular(data).unwrap());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].description, "COFFEE");
    }

    #[test]
    fn folds_debit_credit_columns() {
        let data = b"Date,Description,Debit,Credit\n\
            2024-01-15,PAYMENT,,100.00\n\
            2024-01-16,CHARGE,50.00,\n";
        let (rows, _) = rows_of(parse_tabular(data).unwrap());
        assert_eq!(rows[0].amount.to_cents(), 10000);
        assert_eq!(rows[1].amount.to_cents(), -5000);
    }

    #[test]
    fn missing_amount_column_is_an_error() {
        let data = b"Date,Description\n2024-01-15,PAYMENT\n";
        assert!(matches!(parse_tabular(data), Err(CsvError::MissingColumn(c)) if c == "amount"));
    }

    #[test]
    fn missing_date_column_is_an_error() {
        let data = b"When,Amount\n2024-01-15,1.00\n";
        assert!(matches!(parse_tabular(data), Err(CsvError::MissingColumn(c)) if c == "date"));
    }

    #[test]
    fn header_without_usable_rows_parses_empty() {
        let data = b"Date,Amount,Description\nsoon,lots,COFFEE\n,1.00,TEA\n";
        let (rows, bounds) = rows_of(parse_tabular(data).unwrap());
        assert!(rows.is_empty());
        assert!(bounds.is_none());

        let (rows, _) = rows_of(parse_tabular(b"Date,Amount,Description\n").unwrap());
        assert!(rows.is_empty());
    }

    #[test]
    fn utf8_bom_is_ignored() {
        let data = "\u{feff}Date,Amount\n2024-01-01,1.00\n";
        let (rows, _) = rows_of(parse_tabular(data.as_bytes()).unwrap());
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn delimiter_tie_prefers_comma() {
        assert_eq!(detect_delimiter("a,b;c"), b',');
        assert_eq!(detect_delimiter("a;b;c,d"), b';');
        assert_eq!(detect_delimiter("plain"), b',');
    }

    #[test]
    fn header_row_defaults_to_zero() {
        let records = vec![vec!["x".to_string()], vec!["y".to_string()]];
        assert_eq!(detect_header_row(&records), 0);
    }
}
