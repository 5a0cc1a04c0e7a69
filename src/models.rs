// 📒 Core data model - chart of accounts, transactions, postings
//
// Double-entry rules enforced by the posting generator:
// - every transaction owns exactly two postings (one debit, one credit)
// - per posting, exactly one of debit/credit is positive, the other zero
// - per transaction, sum(debit) == sum(credit)

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ============================================================================
// ACCOUNT TYPE
// ============================================================================

/// Closed set of account classes for double-entry bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    /// Cash, bank accounts, investments
    Asset,

    /// Debts, loans, credit cards
    Liability,

    /// Revenue, salary, interest
    Income,

    /// Costs, bills, purchases
    Expense,

    /// Net worth, internal transfers
    Equity,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Asset => "asset",
            AccountType::Liability => "liability",
            AccountType::Income => "income",
            AccountType::Expense => "expense",
            AccountType::Equity => "equity",
        }
    }

    /// Parse the stored string form back into the enum.
    pub fn parse(s: &str) -> Option<AccountType> {
        match s {
            "asset" => Some(AccountType::Asset),
            "liability" => Some(AccountType::Liability),
            "income" => Some(AccountType::Income),
            "expense" => Some(AccountType::Expense),
            "equity" => Some(AccountType::Equity),
            _ => None,
        }
    }

    /// Display name used in derived category-account names
    /// (e.g. "Expense:Groceries").
    pub fn display_name(&self) -> &'static str {
        match self {
            AccountType::Asset => "Asset",
            AccountType::Liability => "Liability",
            AccountType::Income => "Income",
            AccountType::Expense => "Expense",
            AccountType::Equity => "Equity",
        }
    }
}

// ============================================================================
// ACCOUNT
// ============================================================================

/// One entry in the chart of accounts.
///
/// Created once, either user-declared (e.g. "Checking") or auto-provisioned
/// as a category account (e.g. "Expense:Groceries"). The natural key is
/// (type, name); the database enforces its uniqueness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub name: String,
    pub account_type: AccountType,
}

// ============================================================================
// CATEGORY
// ============================================================================

/// Spending/earning category assigned to transactions by the rules engine
/// or by hand. Supports one level of nesting via `parent_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub parent_id: Option<i64>,
}

// ============================================================================
// TRANSACTION
// ============================================================================

/// A validated bank transaction handed over by the import subsystem.
///
/// Amount sign convention: positive = inflow/income, negative =
/// outflow/expense. A zero amount is rejected upstream and guarded against
/// again by the posting generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub date: NaiveDate,
    pub description: String,
    pub amount: Decimal,
    pub source_account_id: i64,
    pub normalized_memo: Option<String>,
    pub category_id: Option<i64>,
}

impl Transaction {
    pub fn is_expense(&self) -> bool {
        self.amount < Decimal::ZERO
    }

    pub fn is_income(&self) -> bool {
        self.amount > Decimal::ZERO
    }
}

// ============================================================================
// POSTING
// ============================================================================

/// One side (debit or credit) of a balanced ledger entry.
///
/// Owned exclusively by the posting generator: created in pairs, replaced
/// as a pair, removed by cascade when the owning transaction is deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub id: i64,
    pub transaction_id: i64,
    pub account_id: i64,
    pub debit: Decimal,
    pub credit: Decimal,
}

impl Posting {
    pub fn is_debit(&self) -> bool {
        self.debit > Decimal::ZERO
    }

    /// The nonzero side of this posting.
    pub fn amount(&self) -> Decimal {
        if self.is_debit() {
            self.debit
        } else {
            self.credit
        }
    }

    /// Structural check: exactly one of debit/credit positive, both
    /// non-negative.
    pub fn is_well_formed(&self) -> bool {
        let debit_side = self.debit > Decimal::ZERO && self.credit == Decimal::ZERO;
        let credit_side = self.credit > Decimal::ZERO && self.debit == Decimal::ZERO;
        debit_side || credit_side
    }
}
