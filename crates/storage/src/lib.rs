pub mod accounts;
pub mod db;
pub mod jobs;
pub mod rules;
pub mod transactions;

pub use accounts::{create_account, get_account, list_accounts};
pub use db::{create_db, DbPool, StorageError};
pub use jobs::{insert_job, list_unfinished_jobs, load_job, save_job, save_job_guarded};
pub use rules::{list_rules, record_rule_use, upsert_rule};
pub use transactions::{
    find_in_range, list_transactions, list_unverified, mark_verified, save_batch,
    update_categorization,
};
