use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use super::account::{AccountId, OwnerId};
use super::error::IngestError;
use super::statement::{AccountMatch, ParsedStatement, SourceFormat, StatementMetadata};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        JobId(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(JobId)
            .map_err(|e| format!("Invalid job id '{s}': {e}"))
    }
}

/// Pipeline stages in execution order. `Failed` is reachable from any
/// non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Uploading,
    Parsing,
    Analyzing,
    MatchingAccount,
    AwaitingConfirmation,
    ExtractingTransactions,
    CheckingDuplicates,
    Saving,
    Completed,
    Failed,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Uploading => "uploading",
            Stage::Parsing => "parsing",
            Stage::Analyzing => "analyzing",
            Stage::MatchingAccount => "matching_account",
            Stage::AwaitingConfirmation => "awaiting_confirmation",
            Stage::ExtractingTransactions => "extracting_transactions",
            Stage::CheckingDuplicates => "checking_duplicates",
            Stage::Saving => "saving",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
        }
    }

    fn ordinal(self) -> u8 {
        match self {
            Stage::Uploading => 0,
            Stage::Parsing => 1,
            Stage::Analyzing => 2,
            Stage::MatchingAccount => 3,
            Stage::AwaitingConfirmation => 4,
            Stage::ExtractingTransactions => 5,
            Stage::CheckingDuplicates => 6,
            Stage::Saving => 7,
            Stage::Completed => 8,
            Stage::Failed => 9,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }

    /// Forward-only; staying in the same stage is allowed for progress updates.
    pub fn can_transition_to(self, next: Stage) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == Stage::Failed || next.ordinal() >= self.ordinal()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploading" => Ok(Stage::Uploading),
            "parsing" => Ok(Stage::Parsing),
            "analyzing" => Ok(Stage::Analyzing),
            "matching_account" => Ok(Stage::MatchingAccount),
            "awaiting_confirmation" => Ok(Stage::AwaitingConfirmation),
            "extracting_transactions" => Ok(Stage::ExtractingTransactions),
            "checking_duplicates" => Ok(Stage::CheckingDuplicates),
            "saving" => Ok(Stage::Saving),
            "completed" => Ok(Stage::Completed),
            "failed" => Ok(Stage::Failed),
            other => Err(format!("Unknown stage: '{other}'")),
        }
    }
}

/// The staged upload on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: PathBuf,
    pub format: SourceFormat,
    pub original_name: String,
    /// Hex SHA-256 of the uploaded bytes.
    pub sha256: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedPayload {
    pub source: SourceFile,
    pub statement: ParsedStatement,
}

impl ParsedPayload {
    pub fn into_matched(self, metadata: StatementMetadata, account_match: AccountMatch) -> MatchedPayload {
        MatchedPayload {
            source: self.source,
            statement: self.statement,
            metadata,
            account_match,
        }
    }
}

/// Everything accumulated up to the confirmation suspend point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedPayload {
    pub source: SourceFile,
    pub statement: ParsedStatement,
    pub metadata: StatementMetadata,
    pub account_match: AccountMatch,
}

impl MatchedPayload {
    pub fn confirm(self, choice: AccountChoice) -> ConfirmedPayload {
        ConfirmedPayload {
            source: self.source,
            statement: self.statement,
            metadata: self.metadata,
            account_match: self.account_match,
            choice,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AccountChoice {
    Existing { account_id: AccountId },
    CreateNew { name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedPayload {
    pub source: SourceFile,
    pub statement: ParsedStatement,
    pub metadata: StatementMetadata,
    pub account_match: AccountMatch,
    pub choice: AccountChoice,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub account_id: AccountId,
    pub transactions_extracted: usize,
    pub transactions_imported: usize,
    pub duplicates_skipped: usize,
    pub rules_learned: usize,
}

/// Stage outputs carried on the job record. Each variant is the precondition
/// of the stage that consumes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    Received { source: SourceFile },
    Parsed(ParsedPayload),
    Matched(MatchedPayload),
    Confirmed(ConfirmedPayload),
    Finished {
        metadata: Option<StatementMetadata>,
        account_match: Option<AccountMatch>,
        summary: ImportSummary,
    },
}

impl JobPayload {
    pub fn source(&self) -> Option<&SourceFile> {
        match self {
            JobPayload::Received { source } => Some(source),
            JobPayload::Parsed(p) => Some(&p.source),
            JobPayload::Matched(p) => Some(&p.source),
            JobPayload::Confirmed(p) => Some(&p.source),
            JobPayload::Finished { .. } => None,
        }
    }

    pub fn metadata(&self) -> Option<&StatementMetadata> {
        match self {
            JobPayload::Matched(p) => Some(&p.metadata),
            JobPayload::Confirmed(p) => Some(&p.metadata),
            JobPayload::Finished { metadata, .. } => metadata.as_ref(),
            _ => None,
        }
    }

    pub fn account_match(&self) -> Option<&AccountMatch> {
        match self {
            JobPayload::Matched(p) => Some(&p.account_match),
            JobPayload::Confirmed(p) => Some(&p.account_match),
            JobPayload::Finished { account_match, .. } => account_match.as_ref(),
            _ => None,
        }
    }

    pub fn summary(&self) -> Option<&ImportSummary> {
        match self {
            JobPayload::Finished { summary, .. } => Some(summary),
            _ => None,
        }
    }
}

/// One ingestion attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub owner_id: OwnerId,
    pub stage: Stage,
    pub progress: u8,
    pub message: String,
    pub error: Option<String>,
    pub payload: JobPayload,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(id: JobId, owner_id: OwnerId, source: SourceFile) -> Self {
        let now = Utc::now();
        Job {
            id,
            owner_id,
            stage: Stage::Uploading,
            progress: 0,
            message: "File uploaded, initializing processing...".to_string(),
            error: None,
            payload: JobPayload::Received { source },
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Moves the job to `stage`, rejecting backwards moves.
    pub fn advance(&mut self, stage: Stage, progress: u8, message: impl Into<String>) -> Result<(), IngestError> {
        if !self.stage.can_transition_to(stage) {
            return Err(IngestError::State {
                job_id: self.id.to_string(),
                expected: stage,
                actual: self.stage,
            });
        }
        self.stage = stage;
        self.progress = progress.min(100);
        self.message = message.into();
        self.updated_at = Utc::now();
        if stage.is_terminal() {
            self.completed_at = Some(self.updated_at);
        }
        Ok(())
    }

    /// Terminal failure. Returns false if the job had already finished.
    pub fn fail(&mut self, error: &str) -> bool {
        if self.stage.is_terminal() {
            return false;
        }
        let now = Utc::now();
        self.stage = Stage::Failed;
        self.error = Some(error.to_string());
        self.message = format!("Processing failed: {error}");
        self.updated_at = now;
        self.completed_at = Some(now);
        true
    }

    pub fn ensure_stage(&self, expected: Stage) -> Result<(), IngestError> {
        if self.stage == expected {
            Ok(())
        } else {
            Err(IngestError::State {
                job_id: self.id.to_string(),
                expected,
                actual: self.stage,
            })
        }
    }

    pub fn status(&self) -> JobStatus {
        JobStatus {
            job_id: self.id,
            stage: self.stage,
            progress: self.progress,
            message: self.message.clone(),
            error: self.error.clone(),
            statement_metadata: self.payload.metadata().cloned(),
            account_match: self.payload.account_match().cloned(),
            summary: self.payload.summary().cloned(),
        }
    }
}

/// Read-only view returned to pollers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: JobId,
    pub stage: Stage,
    pub progress: u8,
    pub message: String,
    pub error: Option<String>,
    pub statement_metadata: Option<StatementMetadata>,
    pub account_match: Option<AccountMatch>,
    pub summary: Option<ImportSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn source() -> SourceFile {
        SourceFile {
            path: PathBuf::from("/tmp/fins-uploads/x.csv"),
            format: SourceFormat::Csv,
            original_name: "statement.csv".to_string(),
            sha256: "00".repeat(32),
            size_bytes: 42,
        }
    }

    fn job() -> Job {
        Job::new(JobId::new(), OwnerId::new("owner-1"), source())
    }

    const ORDER: [Stage; 9] = [
        Stage::Uploading,
        Stage::Parsing,
        Stage::Analyzing,
        Stage::MatchingAccount,
        Stage::AwaitingConfirmation,
        Stage::ExtractingTransactions,
        Stage::CheckingDuplicates,
        Stage::Saving,
        Stage::Completed,
    ];

    #[test]
    fn stages_only_move_forward() {
        for (i, from) in ORDER.iter().enumerate() {
            for (j, to) in ORDER.iter().enumerate() {
                let allowed = from.can_transition_to(*to);
                if from.is_terminal() {
                    assert!(!allowed, "{from} -> {to}");
                } else {
                    assert_eq!(allowed, j >= i, "{from} -> {to}");
                }
            }
        }
    }

    #[test]
    fn failed_reachable_from_every_non_terminal_stage() {
        for stage in ORDER.iter().filter(|s| !s.is_terminal()) {
            assert!(stage.can_transition_to(Stage::Failed));
        }
        assert!(!Stage::Completed.can_transition_to(Stage::Failed));
        assert!(!Stage::Failed.can_transition_to(Stage::Failed));
    }

    #[test]
    fn stage_string_roundtrip() {
        for stage in ORDER.iter().chain(std::iter::once(&Stage::Failed)) {
            assert_eq!(Stage::from_str(stage.as_str()).unwrap(), *stage);
        }
    }

    #[test]
    fn advance_rejects_backwards_move() {
        let mut j = job();
        j.advance(Stage::Analyzing, 30, "Analyzing").unwrap();
        let err = j.advance(Stage::Parsing, 10, "again").unwrap_err();
        assert!(matches!(err, IngestError::State { actual: Stage::Analyzing, .. }));
        assert_eq!(j.stage, Stage::Analyzing);
    }

    #[test]
    fn fail_is_terminal_and_records_error() {
        let mut j = job();
        assert!(j.fail("boom"));
        assert_eq!(j.stage, Stage::Failed);
        assert_eq!(j.error.as_deref(), Some("boom"));
        assert!(j.completed_at.is_some());
        assert!(!j.fail("again"));
        assert_eq!(j.error.as_deref(), Some("boom"));
    }

    #[test]
    fn ensure_stage_reports_mismatch() {
        let j = job();
        let err = j.ensure_stage(Stage::AwaitingConfirmation).unwrap_err();
        assert_eq!(
            err,
            IngestError::State {
                job_id: j.id.to_string(),
                expected: Stage::AwaitingConfirmation,
                actual: Stage::Uploading,
            }
        );
    }

    #[test]
    fn payload_roundtrips_through_json() {
        let payload = JobPayload::Received { source: source() };
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"kind\":\"received\""));
        let back: JobPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn job_id_parses() {
        let id = JobId::new();
        assert_eq!(JobId::from_str(&id.to_string()).unwrap(), id);
        assert!(JobId::from_str("not-a-uuid").is_err());
    }
}
