use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use fins_core::{
    coerce_category, AccountId, CategorizationMethod, CategorizationRule, OwnerId, PatternType,
    TransactionDraft, OTHER_CATEGORY, UNCATEGORIZED,
};
use fins_import::{derive_rule_pattern, RuleSet};
use fins_llm::{parse_json_response, prompts, CategorizedRow, CompletionService};
use fins_storage::{
    list_rules, list_unverified, record_rule_use, update_categorization, upsert_rule, DbPool,
    StorageError,
};
use tracing::{debug, info, warn};

use crate::settings::PipelineSettings;

const UNSTATED_CONFIDENCE: f32 = 0.5;

/// Drafts after categorisation, plus what the rule tier did along the way.
#[derive(Debug, Default)]
pub struct CategorizationOutcome {
    pub drafts: Vec<TransactionDraft>,
    pub rules_learned: usize,
    pub rule_hits: usize,
}

/// Two-tier categorisation: learned rules first, then batched completion
/// calls for whatever is left.
#[derive(Clone)]
pub struct Categorizer {
    pool: DbPool,
    llm: Arc<dyn CompletionService>,
    settings: PipelineSettings,
}

impl Categorizer {
    pub fn new(pool: DbPool, llm: Arc<dyn CompletionService>, settings: PipelineSettings) -> Self {
        Self { pool, llm, settings }
    }

    pub fn llm(&self) -> &dyn CompletionService {
        self.llm.as_ref()
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Categorises every draft. Completion failures degrade the affected
    /// batch to `Other`; only storage errors are returned.
    pub async fn categorize(
        &self,
        owner: &OwnerId,
        drafts: Vec<TransactionDraft>,
    ) -> Result<CategorizationOutcome, StorageError> {
        self.run(owner, drafts, self.settings.analysis_temperature).await
    }

    async fn run(
        &self,
        owner: &OwnerId,
        drafts: Vec<TransactionDraft>,
        temperature: f32,
    ) -> Result<CategorizationOutcome, StorageError> {
        let mut drafts = drafts;
        let mut rules = RuleSet::new(list_rules(&self.pool, owner).await?);
        let mut learned: HashSet<(PatternType, String)> = HashSet::new();
        let mut rule_hits = 0;

        for draft in drafts.iter_mut() {
            if self.apply_rule(&rules, draft).await? {
                rule_hits += 1;
            }
        }

        // Drafts that arrived with an extraction-time category are AI results too.
        for draft in drafts.iter().filter(|d| d.method == CategorizationMethod::Ai) {
            self.learn(owner, draft, &mut rules, &mut learned).await?;
        }

        let pending: Vec<usize> = (0..drafts.len()).filter(|&i| !drafts[i].is_categorized()).collect();
        let batch_size = self.settings.categorization_batch_size.max(1);

        for (batch_no, chunk) in pending.chunks(batch_size).enumerate() {
            // Rules learned from earlier batches may already cover part of this one.
            let mut remaining = Vec::with_capacity(chunk.len());
            for &i in chunk {
                if self.apply_rule(&rules, &mut drafts[i]).await? {
                    rule_hits += 1;
                } else {
                    remaining.push(i);
                }
            }
            if remaining.is_empty() {
                continue;
            }

            let batch: Vec<TransactionDraft> = remaining.iter().map(|&i| drafts[i].clone()).collect();
            let results = self.classify_batch(batch_no, &batch, temperature).await;

            for (&i, result) in remaining.iter().zip(results) {
                let draft = &mut drafts[i];
                match result {
                    Some(row) => apply_row(draft, row),
                    None => degrade(draft),
                }
            }

            for &i in &remaining {
                self.learn(owner, &drafts[i], &mut rules, &mut learned).await?;
            }
        }

        Ok(CategorizationOutcome {
            drafts,
            rules_learned: learned.len(),
            rule_hits,
        })
    }

    /// Re-runs categorisation over an account's stored transactions that the
    /// user has not verified. Returns how many rows were rewritten.
    pub async fn recategorize_account(&self, owner: &OwnerId, account: AccountId) -> Result<usize, StorageError> {
        let stored = list_unverified(&self.pool, owner, account).await?;
        if stored.is_empty() {
            return Ok(0);
        }

        let drafts = stored.iter().map(|t| t.to_draft()).collect();
        let outcome = self.run(owner, drafts, self.settings.recategorize_temperature).await?;

        let mut updated = 0;
        for (record, draft) in stored.iter().zip(&outcome.drafts) {
            if update_categorization(&self.pool, record.id, draft).await? {
                updated += 1;
            }
        }
        info!(account = %account, updated, "Re-categorized transactions");
        Ok(updated)
    }

    async fn apply_rule(&self, rules: &RuleSet, draft: &mut TransactionDraft) -> Result<bool, StorageError> {
        let Some(rule) = rules.best_match(
            draft.merchant_name.as_deref(),
            &draft.description,
            self.settings.rule_apply_threshold,
        ) else {
            return Ok(false);
        };

        draft.set_category(
            rule.category.clone(),
            rule.subcategory.clone(),
            rule.confidence,
            CategorizationMethod::Rule,
        );
        if let Some(id) = rule.id {
            record_rule_use(&self.pool, id, Utc::now()).await?;
        }
        Ok(true)
    }

    /// One completion call for `batch`. Every slot of the result lines up
    /// with `batch`; `None` means no usable classification.
    async fn classify_batch(
        &self,
        batch_no: usize,
        batch: &[TransactionDraft],
        temperature: f32,
    ) -> Vec<Option<CategorizedRow>> {
        let messages = prompts::categorization_prompt(batch);
        let reply = match self
            .llm
            .complete(&messages, temperature, self.settings.extraction_max_tokens)
            .await
        {
            Ok(text) => parse_json_response::<Vec<CategorizedRow>>(&text),
            Err(e) => Err(e),
        };

        let rows = match reply {
            Ok(rows) => rows,
            Err(e) => {
                warn!(batch = batch_no, size = batch.len(), "categorization batch degraded: {e}");
                return vec![None; batch.len()];
            }
        };

        let mut slots: Vec<Option<CategorizedRow>> = vec![None; batch.len()];
        for (position, row) in rows.into_iter().enumerate() {
            let index = row.index.unwrap_or(position);
            if index < slots.len() && slots[index].is_none() && row.category.is_some() {
                slots[index] = Some(row);
            }
        }

        let missing = slots.iter().filter(|s| s.is_none()).count();
        if missing > 0 {
            warn!(batch = batch_no, missing, "categorization reply skipped transactions");
        }
        debug!(batch = batch_no, size = batch.len(), "categorized batch");
        slots
    }

    /// Persists a rule for a confident AI result. Returns whether one was written.
    async fn learn(
        &self,
        owner: &OwnerId,
        draft: &TransactionDraft,
        rules: &mut RuleSet,
        learned: &mut HashSet<(PatternType, String)>,
    ) -> Result<bool, StorageError> {
        if draft.method != CategorizationMethod::Ai {
            return Ok(false);
        }
        let (Some(category), Some(confidence)) = (draft.category.as_deref(), draft.confidence) else {
            return Ok(false);
        };
        if confidence <= self.settings.rule_learn_threshold {
            return Ok(false);
        }
        let Some((pattern_type, pattern_value)) =
            derive_rule_pattern(draft.merchant_name.as_deref(), &draft.description)
        else {
            return Ok(false);
        };

        let rule = CategorizationRule::new(
            owner.clone(),
            pattern_type,
            &pattern_value,
            category,
            draft.subcategory.as_deref(),
            confidence,
        );
        match upsert_rule(&self.pool, &rule).await {
            Ok(stored) => {
                debug!(pattern = %stored.pattern_value, category = %stored.category, "learned rule");
                learned.insert((stored.pattern_type, stored.pattern_value.clone()));
                rules.insert(stored);
                Ok(true)
            }
            Err(StorageError::Duplicate(msg)) => {
                warn!("skipping rule {pattern_value}: {msg}");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

fn apply_row(draft: &mut TransactionDraft, row: CategorizedRow) {
    let (category, subcategory) = coerce_category(
        row.category.as_deref().unwrap_or(OTHER_CATEGORY),
        row.subcategory.as_deref(),
    );
    draft.is_recurring = row.is_recurring.unwrap_or(false);
    draft.set_category(
        category,
        subcategory,
        row.confidence.unwrap_or(UNSTATED_CONFIDENCE),
        CategorizationMethod::Ai,
    );
}

fn degrade(draft: &mut TransactionDraft) {
    draft.set_category(
        OTHER_CATEGORY.to_string(),
        Some(UNCATEGORIZED.to_string()),
        0.0,
        CategorizationMethod::None,
    );
}
