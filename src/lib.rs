// Ledger Core - double-entry posting engine for personal finance data
// Exposes all modules for use in the CLI, reporting layers, and tests

pub mod error;
pub mod models;
pub mod store;
pub mod registry;
pub mod posting;
pub mod ledger;
pub mod rules;
pub mod importer;

// Re-export commonly used types
pub use error::{CoreError, CoreResult};
pub use models::{Account, AccountType, Category, Posting, Transaction};
pub use store::{
    count_postings, count_transactions, count_uncategorized, delete_transaction,
    get_all_accounts, get_all_transactions, get_transaction, get_unposted_transactions,
    insert_transaction, postings_for_account, postings_for_transaction, seed_minimal,
    setup_database, TransactionDraft,
};
pub use registry::{
    category_account_name, category_account_type, resolve_category_account, resolve_or_create,
    RegistryConfig, UNCATEGORIZED,
};
pub use posting::{
    generate_missing, generate_postings, regenerate_all, BatchFailure, BatchOutcome,
};
pub use ledger::{
    account_balance, account_balance_through, cashflow_by_month, category_breakdown,
    reconciliation_report, CategoryExpense, MonthlyCashflow, ReconciliationReport,
};
pub use rules::{apply_rules, dry_run_matches, insert_rule, CategoryRule, RuleEngine, RuleMatch};
pub use importer::{import_transactions, ImportMapping, ImportSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
