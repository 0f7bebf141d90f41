use fins_core::{
    AccountKind, DateRange, DocumentContent, ParsedStatement, StatementLayout, StatementMetadata,
};
use fins_import::parse_date;
use fins_llm::{parse_json_response, prompts, CompletionService, StructureReply};
use tracing::{debug, warn};

use crate::settings::PipelineSettings;

const TABULAR_CONFIDENCE: f32 = 0.7;
const FALLBACK_CONFIDENCE: f32 = 0.3;
const UNSTATED_CONFIDENCE: f32 = 0.5;

/// Infers statement-level metadata. Never fails: completion problems degrade
/// to a low-confidence record built from the deterministic guess.
pub async fn analyze(
    statement: &ParsedStatement,
    llm: &dyn CompletionService,
    settings: &PipelineSettings,
) -> StatementMetadata {
    match statement {
        ParsedStatement::Tabular { bounds, .. } => StatementMetadata {
            institution: None,
            account_type: AccountKind::Unknown,
            last4: None,
            period: bounds.map(|b| b.period),
            layout: StatementLayout::Csv,
            confidence: TABULAR_CONFIDENCE,
        },
        ParsedStatement::Document(doc) => analyze_document(doc, llm, settings).await,
    }
}

async fn analyze_document(
    doc: &DocumentContent,
    llm: &dyn CompletionService,
    settings: &PipelineSettings,
) -> StatementMetadata {
    let messages = prompts::structure_prompt(doc);
    let reply = match llm
        .complete(&messages, settings.analysis_temperature, settings.analysis_max_tokens)
        .await
    {
        Ok(text) => parse_json_response::<StructureReply>(&text),
        Err(e) => Err(e),
    };

    match reply {
        Ok(reply) => {
            debug!(confidence = ?reply.confidence, "structure analysis reply");
            from_reply(doc, reply)
        }
        Err(e) => {
            warn!("structure analysis degraded: {e}");
            fallback(doc)
        }
    }
}

fn layout_for(doc: &DocumentContent) -> StatementLayout {
    if doc.has_tables {
        StatementLayout::DocumentTabular
    } else {
        StatementLayout::DocumentText
    }
}

fn fallback(doc: &DocumentContent) -> StatementMetadata {
    let guess = &doc.account_info;
    StatementMetadata {
        institution: guess.institution.clone(),
        account_type: guess.account_type.unwrap_or_default(),
        last4: guess.last4.clone(),
        period: None,
        layout: layout_for(doc),
        confidence: FALLBACK_CONFIDENCE,
    }
}

/// Models answer "null" or "" as often as they omit a field.
fn meaningful(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("null") && !v.eq_ignore_ascii_case("unknown"))
}

fn normalize_last4(value: Option<String>) -> Option<String> {
    let digits: String = meaningful(value)?.chars().filter(char::is_ascii_digit).collect();
    (digits.len() >= 4).then(|| digits[digits.len() - 4..].to_string())
}

fn from_reply(doc: &DocumentContent, reply: StructureReply) -> StatementMetadata {
    let guess = &doc.account_info;

    let account_type = match meaningful(reply.account_type).map(|t| AccountKind::parse_lenient(&t)) {
        Some(kind) if kind != AccountKind::Unknown => kind,
        _ => guess.account_type.unwrap_or_default(),
    };

    let period = reply.statement_period.and_then(|p| {
        let start = parse_date(p.start_date.as_deref()?)?;
        let end = parse_date(p.end_date.as_deref()?)?;
        Some(DateRange::new(start, end))
    });

    let layout = match reply.format_type.as_deref() {
        Some("pdf_tabular") => StatementLayout::DocumentTabular,
        Some("pdf_text") => StatementLayout::DocumentText,
        _ => layout_for(doc),
    };

    StatementMetadata {
        institution: meaningful(reply.institution).or_else(|| guess.institution.clone()),
        account_type,
        last4: normalize_last4(reply.account_number_last4).or_else(|| guess.last4.clone()),
        period,
        layout,
        confidence: reply.confidence.unwrap_or(UNSTATED_CONFIDENCE).clamp(0.0, 1.0),
    }
}
