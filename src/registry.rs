// 🏦 Account registry - resolve-or-create by (type, name) natural key
//
// Category accounts are provisioned lazily with names derived from the
// transaction sign and the category display name ("Expense:Groceries",
// "Income:Salary"). The derivation is a pure function, so repeated posting
// runs always land on the same account.

use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;
use crate::models::{Account, AccountType, Category};
use crate::store;

/// Fallback category name for transactions that reach the posting
/// generator uncategorized. Every transaction must be postable, so the
/// fallback is policy, not an option.
pub const UNCATEGORIZED: &str = "Uncategorized";

// ============================================================================
// REGISTRY CONFIG
// ============================================================================

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Match account names case-insensitively when resolving the natural
    /// key. Default is an exact match.
    pub case_insensitive: bool,
}

// ============================================================================
// NAMING CONVENTION (pure functions)
// ============================================================================

/// Account class a category account takes, decided by the transaction sign:
/// outflows hit an expense account, inflows an income account.
pub fn category_account_type(amount: Decimal) -> AccountType {
    if amount < Decimal::ZERO {
        AccountType::Expense
    } else {
        AccountType::Income
    }
}

/// Derived category-account name, e.g. "Expense:Groceries".
pub fn category_account_name(account_type: AccountType, category_name: &str) -> String {
    format!("{}:{}", account_type.display_name(), category_name.trim())
}

// ============================================================================
// RESOLVE OR CREATE
// ============================================================================

/// Return the existing account matching (type, trimmed name), or create it.
///
/// Idempotent by natural key: calling this repeatedly with the same
/// arguments never produces duplicates. The only failure mode is storage.
pub fn resolve_or_create(
    conn: &Connection,
    config: RegistryConfig,
    account_type: AccountType,
    name: &str,
) -> CoreResult<Account> {
    let name = name.trim();
    if let Some(existing) =
        store::find_account(conn, account_type, name, config.case_insensitive)?
    {
        return Ok(existing);
    }
    store::insert_account(conn, account_type, name)
}

/// Resolve the category account for a transaction amount and an optional
/// category, creating it on first use.
///
/// Uncategorized transactions map to "Expense:Uncategorized" or
/// "Income:Uncategorized" by sign, so postings can always be generated.
pub fn resolve_category_account(
    conn: &Connection,
    config: RegistryConfig,
    amount: Decimal,
    category: Option<&Category>,
) -> CoreResult<Account> {
    let account_type = category_account_type(amount);
    let category_name = category.map(|c| c.name.as_str()).unwrap_or(UNCATEGORIZED);
    let name = category_account_name(account_type, category_name);
    resolve_or_create(conn, config, account_type, &name)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        store::setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn naming_convention_is_stable() {
        assert_eq!(
            category_account_name(AccountType::Expense, "Groceries"),
            "Expense:Groceries"
        );
        assert_eq!(
            category_account_name(AccountType::Income, " Salary "),
            "Income:Salary"
        );
        assert_eq!(category_account_type(dec!(-50)), AccountType::Expense);
        assert_eq!(category_account_type(dec!(1000)), AccountType::Income);
    }

    #[test]
    fn resolve_or_create_is_idempotent() {
        let conn = test_conn();
        let config = RegistryConfig::default();

        let first = resolve_or_create(&conn, config, AccountType::Expense, "Expense:Rent").unwrap();
        let second =
            resolve_or_create(&conn, config, AccountType::Expense, "Expense:Rent").unwrap();
        let trimmed =
            resolve_or_create(&conn, config, AccountType::Expense, "  Expense:Rent  ").unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.id, trimmed.id);
        assert_eq!(store::get_all_accounts(&conn).unwrap().len(), 1);
    }

    #[test]
    fn case_sensitive_by_default() {
        let conn = test_conn();
        let config = RegistryConfig::default();

        let upper = resolve_or_create(&conn, config, AccountType::Asset, "Checking").unwrap();
        let lower = resolve_or_create(&conn, config, AccountType::Asset, "checking").unwrap();
        assert_ne!(upper.id, lower.id);
    }

    #[test]
    fn case_insensitive_when_configured() {
        let conn = test_conn();
        let config = RegistryConfig {
            case_insensitive: true,
        };

        let upper = resolve_or_create(&conn, config, AccountType::Asset, "Checking").unwrap();
        let lower = resolve_or_create(&conn, config, AccountType::Asset, "checking").unwrap();
        assert_eq!(upper.id, lower.id);
    }

    #[test]
    fn uncategorized_fallback_by_sign() {
        let conn = test_conn();
        let config = RegistryConfig::default();

        let expense = resolve_category_account(&conn, config, dec!(-25), None).unwrap();
        assert_eq!(expense.name, "Expense:Uncategorized");
        assert_eq!(expense.account_type, AccountType::Expense);

        let income = resolve_category_account(&conn, config, dec!(25), None).unwrap();
        assert_eq!(income.name, "Income:Uncategorized");
        assert_eq!(income.account_type, AccountType::Income);
    }

    #[test]
    fn categorized_transactions_get_sign_specific_accounts() {
        let conn = test_conn();
        let config = RegistryConfig::default();
        let groceries = store::insert_category(&conn, "Groceries", None).unwrap();

        let account =
            resolve_category_account(&conn, config, dec!(-82.17), Some(&groceries)).unwrap();
        assert_eq!(account.name, "Expense:Groceries");

        // A refund in the same category lands on the income-side account
        let refund = resolve_category_account(&conn, config, dec!(15), Some(&groceries)).unwrap();
        assert_eq!(refund.name, "Income:Groceries");
        assert_ne!(account.id, refund.id);
    }
}
