pub mod account;
pub mod category;
pub mod error;
pub mod job;
pub mod money;
pub mod period;
pub mod rule;
pub mod statement;
pub mod transaction;

pub use account::{Account, AccountId, AccountKind, NewAccount, OwnerId};
pub use category::{coerce_category, is_known_category, CATEGORY_TAXONOMY, OTHER_CATEGORY, UNCATEGORIZED};
pub use error::IngestError;
pub use job::{
    AccountChoice, ConfirmedPayload, ImportSummary, Job, JobId, JobPayload, JobStatus,
    MatchedPayload, ParsedPayload, SourceFile, Stage,
};
pub use money::Money;
pub use period::DateRange;
pub use rule::{normalize_pattern, CategorizationRule, PatternType};
pub use statement::{
    AccountInfoGuess, AccountMatch, DocumentContent, ParsedStatement, SourceFormat,
    StatementBounds, StatementLayout, StatementMetadata, TabularRow,
};
pub use transaction::{CategorizationMethod, StoredTransaction, TransactionDraft};
