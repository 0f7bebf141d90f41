use std::sync::Arc;

use fins_core::{
    AccountChoice, AccountId, ConfirmedPayload, ImportSummary, IngestError, Job, JobId, JobPayload,
    JobStatus, NewAccount, OwnerId, ParsedPayload, SourceFile, Stage,
};
use fins_import::{parse_statement, sniff_format};
use fins_llm::CompletionService;
use fins_storage::{
    create_account, get_account, insert_job, list_accounts, list_unfinished_jobs, load_job,
    save_batch, save_job, save_job_guarded, DbPool,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::analyzer::analyze;
use crate::categorize::Categorizer;
use crate::duplicates::check_duplicates;
use crate::error::PipelineError;
use crate::extractor::extract;
use crate::matcher::match_account;
use crate::settings::PipelineSettings;
use crate::upload::{discard_upload, stage_upload};

const QUEUE_DEPTH: usize = 64;
const CONFIRMED_PROGRESS: u8 = 60;
const DEFAULT_ACCOUNT_NAME: &str = "New Account";

/// Work items for the background worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobCommand {
    /// Run a freshly uploaded job up to the confirmation point.
    Start(JobId),
    /// Continue a confirmed job through to completion.
    Resume(JobId),
}

struct Inner {
    pool: DbPool,
    categorizer: Categorizer,
    settings: PipelineSettings,
}

/// Entry point for statement ingestion.
///
/// Calls return as soon as the job record is written; stages run on a
/// background worker that spawns one task per command. The job row is the
/// only state shared between callers and the worker.
#[derive(Clone)]
pub struct IngestionService {
    inner: Arc<Inner>,
    queue: mpsc::Sender<JobCommand>,
}

impl IngestionService {
    /// Starts the worker loop. Must be called inside a tokio runtime.
    pub fn spawn(pool: DbPool, llm: Arc<dyn CompletionService>, settings: PipelineSettings) -> Self {
        let categorizer = Categorizer::new(pool.clone(), llm, settings.clone());
        let inner = Arc::new(Inner {
            pool,
            categorizer,
            settings,
        });

        let (queue, mut commands) = mpsc::channel::<JobCommand>(QUEUE_DEPTH);
        let worker = inner.clone();
        tokio::spawn(async move {
            while let Some(command) = commands.recv().await {
                let inner = worker.clone();
                let (kind, job_id) = match command {
                    JobCommand::Start(id) => ("start", id),
                    JobCommand::Resume(id) => ("resume", id),
                };
                let span = info_span!("ingest", job_id = %job_id, command = kind);
                tokio::spawn(
                    async move {
                        match command {
                            JobCommand::Start(id) => inner.run_start(id).await,
                            JobCommand::Resume(id) => inner.run_resume(id).await,
                        }
                    }
                    .instrument(span),
                );
            }
            debug!("ingestion queue closed");
        });

        Self { inner, queue }
    }

    /// Validates and stages an upload, records the job, and queues it.
    pub async fn start_ingestion(&self, owner: &OwnerId, data: &[u8], filename: &str) -> Result<JobId, IngestError> {
        let settings = &self.inner.settings;
        if data.len() as u64 > settings.max_upload_bytes {
            return Err(IngestError::Rejected(format!(
                "File is {} bytes; the limit is {} bytes",
                data.len(),
                settings.max_upload_bytes
            )));
        }

        let format = sniff_format(data, filename).map_err(|e| IngestError::Rejected(e.to_string()))?;
        if !settings
            .supported_formats
            .iter()
            .any(|f| f.eq_ignore_ascii_case(format.extension()))
        {
            return Err(IngestError::Rejected(format!("Unsupported file format: {format}")));
        }

        let job_id = JobId::new();
        let source = stage_upload(&settings.upload_dir, job_id, format, filename, data)
            .await
            .map_err(PipelineError::from)?;
        let job = Job::new(job_id, owner.clone(), source);

        if let Err(e) = insert_job(&self.inner.pool, &job).await {
            if let Some(source) = job.payload.source() {
                discard_upload(source).await;
            }
            return Err(e.into());
        }

        info!(job_id = %job_id, format = %format, size = data.len(), "Upload accepted");
        self.enqueue(JobCommand::Start(job_id)).await?;
        Ok(job_id)
    }

    /// Read-only snapshot. Jobs owned by someone else are reported as missing.
    pub async fn get_status(&self, job_id: JobId, owner: &OwnerId) -> Result<JobStatus, IngestError> {
        Ok(self.inner.owned_job(job_id, owner).await?.status())
    }

    /// Supplies the account for a job suspended at `AwaitingConfirmation` and
    /// resumes it.
    ///
    /// With `create_new`, the account is created when the job resumes, named
    /// `new_name` or the matcher's suggestion. Otherwise `account_id` must
    /// name one of the owner's accounts. Of two racing confirmations only one
    /// wins; the other gets a state error.
    pub async fn confirm_account(
        &self,
        job_id: JobId,
        owner: &OwnerId,
        account_id: Option<AccountId>,
        create_new: bool,
        new_name: Option<String>,
    ) -> Result<(), IngestError> {
        let pool = &self.inner.pool;
        let mut job = self.inner.owned_job(job_id, owner).await?;
        job.ensure_stage(Stage::AwaitingConfirmation)?;

        let JobPayload::Matched(matched) = job.payload.clone() else {
            return Err(IngestError::Internal(format!(
                "Job {job_id} is awaiting confirmation without an account match"
            )));
        };

        let choice = if create_new {
            let name = new_name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .or_else(|| matched.account_match.suggested_name.clone())
                .unwrap_or_else(|| DEFAULT_ACCOUNT_NAME.to_string());
            AccountChoice::CreateNew { name }
        } else {
            let account_id = account_id.ok_or_else(|| {
                IngestError::Rejected("account_id is required unless create_new is set".to_string())
            })?;
            if get_account(pool, owner, account_id).await?.is_none() {
                return Err(IngestError::NotFound(format!("Account {account_id}")));
            }
            AccountChoice::Existing { account_id }
        };

        let expected_progress = job.progress;
        job.payload = JobPayload::Confirmed(matched.confirm(choice));
        job.advance(
            Stage::ExtractingTransactions,
            CONFIRMED_PROGRESS,
            "Account confirmed, extracting transactions...",
        )?;

        if !save_job_guarded(pool, &job, Stage::AwaitingConfirmation, expected_progress).await? {
            let actual = load_job(pool, job_id)
                .await?
                .map(|j| j.stage)
                .unwrap_or(Stage::ExtractingTransactions);
            return Err(IngestError::State {
                job_id: job_id.to_string(),
                expected: Stage::AwaitingConfirmation,
                actual,
            });
        }

        info!(job_id = %job_id, "Account confirmed");
        self.enqueue(JobCommand::Resume(job_id)).await
    }

    /// Re-runs categorisation over an account's unverified transactions.
    pub async fn recategorize(&self, owner: &OwnerId, account_id: AccountId) -> Result<usize, IngestError> {
        if get_account(&self.inner.pool, owner, account_id).await?.is_none() {
            return Err(IngestError::NotFound(format!("Account {account_id}")));
        }
        Ok(self.inner.categorizer.recategorize_account(owner, account_id).await?)
    }

    /// Picks up jobs left mid-flight by a previous process.
    ///
    /// Queued uploads are started again and confirmed jobs resumed; anything
    /// stopped between stages is failed and its file removed. Returns the
    /// number of jobs queued.
    pub async fn recover_interrupted(&self) -> Result<usize, IngestError> {
        let mut queued = 0;
        for mut job in list_unfinished_jobs(&self.inner.pool).await? {
            let command = match (job.stage, job.progress) {
                (Stage::Uploading, _) => Some(JobCommand::Start(job.id)),
                (Stage::ExtractingTransactions, CONFIRMED_PROGRESS) => Some(JobCommand::Resume(job.id)),
                _ => None,
            };

            match command {
                Some(command) => {
                    self.enqueue(command).await?;
                    queued += 1;
                }
                None => {
                    warn!(job_id = %job.id, stage = %job.stage, "failing interrupted job");
                    let source = job.payload.source().cloned();
                    if job.fail("Processing was interrupted before completion") {
                        save_job(&self.inner.pool, &job).await?;
                    }
                    if let Some(source) = source {
                        discard_upload(&source).await;
                    }
                }
            }
        }
        Ok(queued)
    }

    async fn enqueue(&self, command: JobCommand) -> Result<(), IngestError> {
        self.queue
            .send(command)
            .await
            .map_err(|_| IngestError::Internal("ingestion worker has stopped".to_string()))
    }
}

impl Inner {
    async fn owned_job(&self, job_id: JobId, owner: &OwnerId) -> Result<Job, IngestError> {
        load_job(&self.pool, job_id)
            .await?
            .filter(|job| &job.owner_id == owner)
            .ok_or_else(|| IngestError::NotFound(format!("Job {job_id}")))
    }

    async fn load(&self, job_id: JobId) -> Option<Job> {
        match load_job(&self.pool, job_id).await {
            Ok(Some(job)) => Some(job),
            Ok(None) => {
                warn!("queued job no longer exists");
                None
            }
            Err(e) => {
                error!("could not load job: {e}");
                None
            }
        }
    }

    async fn run_start(&self, job_id: JobId) {
        let Some(mut job) = self.load(job_id).await else {
            return;
        };
        if job.stage != Stage::Uploading {
            debug!(stage = %job.stage, "job already started");
            return;
        }
        let JobPayload::Received { source } = job.payload.clone() else {
            self.fail(job, None, IngestError::Internal("uploaded job has no source file".into()).into())
                .await;
            return;
        };

        if let Err(e) = self.process_upload(&mut job, source.clone()).await {
            self.fail(job, Some(&source), e).await;
        }
    }

    async fn run_resume(&self, job_id: JobId) {
        let Some(mut job) = self.load(job_id).await else {
            return;
        };
        if job.stage != Stage::ExtractingTransactions || job.progress != CONFIRMED_PROGRESS {
            debug!(stage = %job.stage, progress = job.progress, "job already resumed");
            return;
        }
        let JobPayload::Confirmed(confirmed) = job.payload.clone() else {
            self.fail(job, None, IngestError::Internal("confirmed job has no confirmation".into()).into())
                .await;
            return;
        };
        let source = confirmed.source.clone();

        if let Err(e) = job.advance(Stage::ExtractingTransactions, 65, "Extracting transactions...") {
            self.fail(job, Some(&source), e.into()).await;
            return;
        }
        match save_job_guarded(&self.pool, &job, Stage::ExtractingTransactions, CONFIRMED_PROGRESS).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("job claimed by another worker");
                return;
            }
            Err(e) => {
                self.fail(job, Some(&source), e.into()).await;
                return;
            }
        }
        info!(stage = %job.stage, progress = job.progress, "{}", job.message);

        if let Err(e) = self.process_confirmed(&mut job, confirmed).await {
            self.fail(job, Some(&source), e).await;
        }
    }

    async fn transition(
        &self,
        job: &mut Job,
        stage: Stage,
        progress: u8,
        message: impl Into<String>,
    ) -> Result<(), PipelineError> {
        let entering = job.stage != stage;
        job.advance(stage, progress, message)?;
        save_job(&self.pool, job).await?;
        if entering {
            info!(stage = %stage, progress, "{}", job.message);
        } else {
            debug!(stage = %stage, progress, "{}", job.message);
        }
        Ok(())
    }

    /// Parsing through account matching, then suspend.
    async fn process_upload(&self, job: &mut Job, source: SourceFile) -> Result<(), PipelineError> {
        self.transition(job, Stage::Parsing, 10, "Parsing statement...").await?;
        let data = tokio::fs::read(&source.path).await?;
        let format = source.format;
        let statement = tokio::task::spawn_blocking(move || parse_statement(&data, format))
            .await
            .map_err(|e| IngestError::Internal(format!("parser task failed: {e}")))??;

        let parsed = ParsedPayload { source, statement };
        job.payload = JobPayload::Parsed(parsed.clone());
        self.transition(job, Stage::Parsing, 25, "Statement parsed").await?;

        self.transition(job, Stage::Analyzing, 30, "Analyzing statement structure...").await?;
        let metadata = analyze(&parsed.statement, self.categorizer.llm(), &self.settings).await;
        self.transition(
            job,
            Stage::Analyzing,
            40,
            format!("Statement analyzed (confidence {:.2})", metadata.confidence),
        )
        .await?;

        self.transition(job, Stage::MatchingAccount, 45, "Matching to an account...").await?;
        let accounts = list_accounts(&self.pool, &job.owner_id).await?;
        let account_match = match_account(&metadata, &accounts, self.categorizer.llm(), &self.settings).await;
        let message = if account_match.should_create_new {
            "No matching account found".to_string()
        } else {
            format!("Matched account with confidence {:.2}", account_match.confidence)
        };
        self.transition(job, Stage::MatchingAccount, 55, message).await?;

        job.payload = JobPayload::Matched(parsed.into_matched(metadata, account_match));
        self.transition(job, Stage::AwaitingConfirmation, 60, "Please confirm the account").await
    }

    /// Extraction through saving.
    async fn process_confirmed(&self, job: &mut Job, confirmed: ConfirmedPayload) -> Result<(), PipelineError> {
        let owner = job.owner_id.clone();
        let account_id = self.resolve_account(job, &confirmed).await?;

        let outcome = extract(&confirmed.statement, &confirmed.metadata, &self.categorizer, &owner).await?;
        let extracted = outcome.drafts.len();
        self.transition(
            job,
            Stage::ExtractingTransactions,
            75,
            format!("Extracted {extracted} transactions"),
        )
        .await?;

        self.transition(job, Stage::CheckingDuplicates, 80, "Checking for duplicates...").await?;
        let (duplicates, fresh) = check_duplicates(&self.pool, account_id, outcome.drafts).await?;
        self.transition(
            job,
            Stage::CheckingDuplicates,
            85,
            format!("Found {} duplicates", duplicates.len()),
        )
        .await?;

        self.transition(job, Stage::Saving, 90, "Saving transactions...").await?;
        let imported = save_batch(&self.pool, &owner, account_id, &fresh).await?;

        job.payload = JobPayload::Finished {
            metadata: Some(confirmed.metadata),
            account_match: Some(confirmed.account_match),
            summary: ImportSummary {
                account_id,
                transactions_extracted: extracted,
                transactions_imported: imported,
                duplicates_skipped: duplicates.len(),
                rules_learned: outcome.rules_learned,
            },
        };
        self.transition(
            job,
            Stage::Completed,
            100,
            format!("Successfully imported {imported} transactions"),
        )
        .await?;

        discard_upload(&confirmed.source).await;
        Ok(())
    }

    /// The confirmed account id, creating the account first if asked to.
    async fn resolve_account(&self, job: &mut Job, confirmed: &ConfirmedPayload) -> Result<AccountId, PipelineError> {
        match &confirmed.choice {
            AccountChoice::Existing { account_id } => {
                if get_account(&self.pool, &job.owner_id, *account_id).await?.is_none() {
                    return Err(IngestError::NotFound(format!("Account {account_id}")).into());
                }
                Ok(*account_id)
            }
            AccountChoice::CreateNew { name } => {
                let metadata = &confirmed.metadata;
                let mut new_account = NewAccount::new(name, metadata.account_type);
                new_account.institution = metadata.institution.clone();
                new_account.last4 = metadata.last4.clone();
                let account = create_account(&self.pool, &job.owner_id, &new_account).await?;
                info!(account = %account.id, name = %account.name, "Created account");

                // Recorded so a resumed job does not create the account twice.
                let mut confirmed = confirmed.clone();
                confirmed.choice = AccountChoice::Existing { account_id: account.id };
                job.payload = JobPayload::Confirmed(confirmed);
                save_job(&self.pool, job).await?;
                Ok(account.id)
            }
        }
    }

    async fn fail(&self, mut job: Job, source: Option<&SourceFile>, err: PipelineError) {
        let err = IngestError::from(err);
        error!(stage = %job.stage, "ingestion failed: {err}");

        if job.fail(&err.to_string()) {
            if let Err(e) = save_job(&self.pool, &job).await {
                error!("could not record job failure: {e}");
            }
        }
        if let Some(source) = source.or(job.payload.source()) {
            discard_upload(source).await;
        }
    }
}
