use fins_core::{Account, AccountId, AccountKind, AccountMatch, StatementMetadata};
use fins_llm::{parse_json_response, prompts, AccountMatchReply, CompletionService};
use tracing::{debug, warn};

use crate::settings::PipelineSettings;

const EXACT_MATCH: f32 = 1.0;
const STRONG_MATCH: f32 = 0.8;
const WEAK_MATCH: f32 = 0.5;

/// Suggests which of `accounts` the statement belongs to.
///
/// Asks the completion service first; any failure or unusable answer falls
/// back to [`local_match`]. An answer naming an account outside `accounts`
/// is never trusted.
pub async fn match_account(
    metadata: &StatementMetadata,
    accounts: &[Account],
    llm: &dyn CompletionService,
    settings: &PipelineSettings,
) -> AccountMatch {
    if accounts.is_empty() {
        return local_match(metadata, accounts, settings.create_new_threshold);
    }

    let messages = prompts::account_match_prompt(metadata, accounts);
    let reply = match llm
        .complete(&messages, settings.analysis_temperature, settings.analysis_max_tokens)
        .await
    {
        Ok(text) => parse_json_response::<AccountMatchReply>(&text),
        Err(e) => Err(e),
    };

    match reply {
        Ok(reply) => match from_reply(metadata, accounts, reply, settings.create_new_threshold) {
            Some(m) => m,
            None => {
                debug!("account match reply unusable, using local tiers");
                local_match(metadata, accounts, settings.create_new_threshold)
            }
        },
        Err(e) => {
            warn!("account matching degraded to local tiers: {e}");
            local_match(metadata, accounts, settings.create_new_threshold)
        }
    }
}

fn from_reply(
    metadata: &StatementMetadata,
    accounts: &[Account],
    reply: AccountMatchReply,
    threshold: f32,
) -> Option<AccountMatch> {
    let confidence = reply.confidence?.clamp(0.0, 1.0);
    let account_id = reply
        .account_id()
        .map(AccountId)
        .filter(|id| accounts.iter().any(|a| a.id == *id));

    // A named account we don't own means the reply can't be trusted at all.
    if reply.account_id().is_some() && account_id.is_none() {
        return None;
    }

    let should_create_new =
        account_id.is_none() || confidence < threshold || reply.should_create_new.unwrap_or(false);
    let suggested_name = if should_create_new {
        reply
            .suggested_account_name
            .filter(|n| !n.trim().is_empty())
            .or_else(|| Some(suggested_account_name(metadata)))
    } else {
        None
    };

    Some(AccountMatch {
        account_id: if should_create_new { None } else { account_id },
        confidence,
        reasoning: reply.reasoning.unwrap_or_default(),
        should_create_new,
        suggested_name,
    })
}

fn same_text(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => !a.trim().is_empty() && a.trim().eq_ignore_ascii_case(b.trim()),
        _ => false,
    }
}

fn tier_score(metadata: &StatementMetadata, account: &Account) -> f32 {
    let known_type = metadata.account_type != AccountKind::Unknown;
    let same_type = known_type && metadata.account_type == account.account_type;
    let same_institution = same_text(metadata.institution.as_deref(), account.institution.as_deref());
    let same_last4 = same_text(metadata.last4.as_deref(), account.last4.as_deref());

    if same_institution && same_type && same_last4 {
        EXACT_MATCH
    } else if same_institution && same_type {
        STRONG_MATCH
    } else if same_type {
        WEAK_MATCH
    } else {
        0.0
    }
}

/// Pure tier logic, no completion service.
///
/// Institution + type + last-4 scores 1.0, institution + type 0.8, type alone
/// 0.5. Ties go to the most recently active account. Below `threshold`, or
/// with no candidates, a new account is proposed.
pub fn local_match(metadata: &StatementMetadata, accounts: &[Account], threshold: f32) -> AccountMatch {
    let best = accounts
        .iter()
        .map(|a| (tier_score(metadata, a), a))
        .filter(|(score, _)| *score > 0.0)
        .max_by(|(sa, a), (sb, b)| {
            sa.total_cmp(sb)
                .then_with(|| a.activity_key().cmp(&b.activity_key()))
        });

    match best {
        Some((score, account)) if score >= threshold => AccountMatch {
            account_id: Some(account.id),
            confidence: score,
            reasoning: reasoning_for(score, account),
            should_create_new: false,
            suggested_name: None,
        },
        Some((score, account)) => AccountMatch {
            account_id: None,
            confidence: score,
            reasoning: format!(
                "Closest account \"{}\" only matches on account type; suggesting a new account",
                account.name
            ),
            should_create_new: true,
            suggested_name: Some(suggested_account_name(metadata)),
        },
        None => AccountMatch {
            account_id: None,
            confidence: 0.0,
            reasoning: if accounts.is_empty() {
                "No existing accounts; suggesting a new account".to_string()
            } else {
                "No existing account matches this statement; suggesting a new account".to_string()
            },
            should_create_new: true,
            suggested_name: Some(suggested_account_name(metadata)),
        },
    }
}

fn reasoning_for(score: f32, account: &Account) -> String {
    if score >= EXACT_MATCH {
        format!("Institution, account type and last 4 digits match \"{}\"", account.name)
    } else {
        format!("Institution and account type match \"{}\"", account.name)
    }
}

/// `"{institution} {Type}"`, plus `" (...1234)"` when the last 4 are known.
pub fn suggested_account_name(metadata: &StatementMetadata) -> String {
    let institution = metadata
        .institution
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("Unknown");
    let mut name = format!("{institution} {}", metadata.account_type.title());
    if let Some(last4) = metadata.last4.as_deref().filter(|s| !s.is_empty()) {
        name.push_str(&format!(" (...{last4})"));
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use fins_core::{OwnerId, StatementLayout};
    use fins_llm::MockCompletion;

    fn metadata(institution: Option<&str>, kind: AccountKind, last4: Option<&str>) -> StatementMetadata {
        StatementMetadata {
            institution: institution.map(str::to_string),
            account_type: kind,
            last4: last4.map(str::to_string),
            period: None,
            layout: StatementLayout::DocumentText,
            confidence: 0.9,
        }
    }

    fn account(id: i64, institution: &str, kind: AccountKind, last4: Option<&str>, active_days_ago: i64) -> Account {
        let now = Utc::now();
        Account {
            id: AccountId(id),
            owner_id: OwnerId::new("u1"),
            name: format!("{institution} {}", kind.title()),
            account_type: kind,
            institution: Some(institution.to_string()),
            last4: last4.map(str::to_string),
            currency: "USD".into(),
            is_active: true,
            last_activity_at: Some(now - Duration::days(active_days_ago)),
            created_at: now - Duration::days(365),
        }
    }

    #[test]
    fn exact_tier_match() {
        let meta = metadata(Some("Chase"), AccountKind::Checking, Some("1234"));
        let accounts = vec![account(7, "Chase", AccountKind::Checking, Some("1234"), 3)];
        let m = local_match(&meta, &accounts, 0.7);
        assert_eq!(m.account_id, Some(AccountId(7)));
        assert_eq!(m.confidence, 1.0);
        assert!(!m.should_create_new);
    }

    #[test]
    fn strong_tier_prefers_most_recent() {
        let meta = metadata(Some("chase"), AccountKind::Savings, None);
        let accounts = vec![
            account(1, "Chase", AccountKind::Savings, Some("1111"), 30),
            account(2, "Chase", AccountKind::Savings, Some("2222"), 2),
            account(3, "Chase", AccountKind::Checking, Some("3333"), 0),
        ];
        let m = local_match(&meta, &accounts, 0.7);
        assert_eq!(m.account_id, Some(AccountId(2)));
        assert_eq!(m.confidence, 0.8);
    }

    #[test]
    fn weak_tier_proposes_new_account() {
        let meta = metadata(Some("Wells Fargo"), AccountKind::Checking, Some("9876"));
        let accounts = vec![account(1, "Chase", AccountKind::Checking, None, 1)];
        let m = local_match(&meta, &accounts, 0.7);
        assert!(m.should_create_new);
        assert_eq!(m.account_id, None);
        assert_eq!(m.confidence, 0.5);
        assert_eq!(m.suggested_name.as_deref(), Some("Wells Fargo Checking (...9876)"));
    }

    #[test]
    fn no_candidates_proposes_new_account() {
        let meta = metadata(Some("Capital One"), AccountKind::CreditCard, None);
        let m = local_match(&meta, &[], 0.7);
        assert!(m.should_create_new);
        assert_eq!(m.suggested_name.as_deref(), Some("Capital One Credit Card"));
    }

    #[test]
    fn unknown_type_never_matches() {
        let meta = metadata(None, AccountKind::Unknown, None);
        let accounts = vec![account(1, "Chase", AccountKind::Unknown, None, 1)];
        let m = local_match(&meta, &accounts, 0.7);
        assert!(m.should_create_new);
        assert_eq!(m.suggested_name.as_deref(), Some("Unknown Unknown"));
    }

    #[tokio::test]
    async fn completion_reply_is_used() {
        let meta = metadata(Some("Chase"), AccountKind::Checking, Some("1234"));
        let accounts = vec![account(7, "Chase", AccountKind::Checking, Some("1234"), 3)];
        let llm = MockCompletion::fixed(
            r#"{"suggested_account_id":"7","confidence":1.0,"reasoning":"exact","should_create_new":false}"#,
        );
        let m = match_account(&meta, &accounts, &llm, &PipelineSettings::default()).await;
        assert_eq!(m.account_id, Some(AccountId(7)));
        assert_eq!(m.reasoning, "exact");
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn foreign_account_id_is_rejected() {
        let meta = metadata(Some("Chase"), AccountKind::Checking, Some("1234"));
        let accounts = vec![account(7, "Chase", AccountKind::Checking, Some("1234"), 3)];
        let llm = MockCompletion::fixed(r#"{"suggested_account_id":99,"confidence":0.99}"#);
        let m = match_account(&meta, &accounts, &llm, &PipelineSettings::default()).await;
        assert_eq!(m.account_id, Some(AccountId(7)));
        assert_eq!(m.confidence, 1.0);
    }

    #[tokio::test]
    async fn unavailable_service_matches_locally() {
        let meta = metadata(Some("Chase"), AccountKind::Checking, Some("1234"));
        let accounts = vec![account(7, "Chase", AccountKind::Checking, Some("1234"), 3)];
        let local = local_match(&meta, &accounts, 0.7);
        let remote = match_account(&meta, &accounts, &MockCompletion::unavailable(), &PipelineSettings::default()).await;
        assert_eq!(local, remote);
    }

    #[tokio::test]
    async fn no_accounts_skips_the_service() {
        let llm = MockCompletion::unavailable();
        let meta = metadata(Some("Chase"), AccountKind::Checking, None);
        let m = match_account(&meta, &[], &llm, &PipelineSettings::default()).await;
        assert!(m.should_create_new);
        assert_eq!(llm.call_count(), 0);
    }
}
