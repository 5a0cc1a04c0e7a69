// 🗄️ SQLite storage layer - schema setup and repository functions
//
// Every function takes an explicit `&Connection`; there is no global handle.
// Referential integrity is enforced by the database itself:
// - postings → transactions: ON DELETE CASCADE (delete a transaction, its
//   posting pair goes with it)
// - postings → accounts: RESTRICT (an account cannot vanish while referenced)
//
// Amounts are stored as TEXT and parsed into `Decimal` on read so ledger
// math never goes through floating point.

use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::{params, Connection, Row};
use rust_decimal::Decimal;

use crate::error::CoreResult;
use crate::models::{Account, AccountType, Category, Posting, Transaction};

/// Date format used for all persisted dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn setup_database(conn: &Connection) -> CoreResult<()> {
    // WAL for crash recovery, foreign keys for referential integrity
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Accounts - chart of accounts, natural key (type, name)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS accounts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            type TEXT NOT NULL,
            UNIQUE(type, name)
        )",
        [],
    )?;

    // ==========================================================================
    // Categories
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            parent_id INTEGER REFERENCES categories(id)
        )",
        [],
    )?;

    // ==========================================================================
    // Transactions - validated rows handed over by the importer
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            date TEXT NOT NULL,
            description TEXT NOT NULL,
            amount TEXT NOT NULL,
            source_account_id INTEGER NOT NULL REFERENCES accounts(id),
            normalized_memo TEXT,
            category_id INTEGER REFERENCES categories(id),
            import_hash TEXT UNIQUE
        )",
        [],
    )?;

    // ==========================================================================
    // Postings - balanced debit/credit pairs, one pair per transaction
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS postings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            transaction_id INTEGER NOT NULL
                REFERENCES transactions(id) ON DELETE CASCADE,
            account_id INTEGER NOT NULL REFERENCES accounts(id),
            debit TEXT NOT NULL DEFAULT '0',
            credit TEXT NOT NULL DEFAULT '0',
            CHECK (CAST(debit AS REAL) >= 0 AND CAST(credit AS REAL) >= 0)
        )",
        [],
    )?;

    // ==========================================================================
    // Categorization rules
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS rules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pattern TEXT NOT NULL,
            category_id INTEGER NOT NULL REFERENCES categories(id),
            amount_min TEXT,
            amount_max TEXT,
            priority INTEGER NOT NULL DEFAULT 100,
            active INTEGER NOT NULL DEFAULT 1
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_postings_transaction ON postings(transaction_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_postings_account ON postings(account_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(date)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// ROW MAPPING HELPERS
// ============================================================================

pub(crate) fn read_decimal(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn read_date(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn read_account_type(row: &Row<'_>, idx: usize) -> rusqlite::Result<AccountType> {
    let raw: String = row.get(idx)?;
    AccountType::parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("unknown account type: {raw}").into(),
        )
    })
}

fn map_transaction(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: row.get(0)?,
        date: read_date(row, 1)?,
        description: row.get(2)?,
        amount: read_decimal(row, 3)?,
        source_account_id: row.get(4)?,
        normalized_memo: row.get(5)?,
        category_id: row.get(6)?,
    })
}

fn map_posting(row: &Row<'_>) -> rusqlite::Result<Posting> {
    Ok(Posting {
        id: row.get(0)?,
        transaction_id: row.get(1)?,
        account_id: row.get(2)?,
        debit: read_decimal(row, 3)?,
        credit: read_decimal(row, 4)?,
    })
}

const TRANSACTION_COLUMNS: &str =
    "id, date, description, amount, source_account_id, normalized_memo, category_id";

const POSTING_COLUMNS: &str = "id, transaction_id, account_id, debit, credit";

// ============================================================================
// ACCOUNTS
// ============================================================================

pub fn insert_account(
    conn: &Connection,
    account_type: AccountType,
    name: &str,
) -> CoreResult<Account> {
    conn.execute(
        "INSERT INTO accounts (name, type) VALUES (?1, ?2)",
        params![name, account_type.as_str()],
    )?;
    Ok(Account {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        account_type,
    })
}

pub fn get_account(conn: &Connection, id: i64) -> CoreResult<Option<Account>> {
    let mut stmt = conn.prepare("SELECT id, name, type FROM accounts WHERE id = ?1")?;
    let mut rows = stmt.query_map(params![id], |row| {
        Ok(Account {
            id: row.get(0)?,
            name: row.get(1)?,
            account_type: read_account_type(row, 2)?,
        })
    })?;
    rows.next().transpose().map_err(Into::into)
}

/// Look up an account by its (type, name) natural key.
///
/// `case_insensitive` switches the name comparison to `COLLATE NOCASE`;
/// the default registry policy is an exact match.
pub fn find_account(
    conn: &Connection,
    account_type: AccountType,
    name: &str,
    case_insensitive: bool,
) -> CoreResult<Option<Account>> {
    let sql = if case_insensitive {
        "SELECT id, name, type FROM accounts WHERE type = ?1 AND name = ?2 COLLATE NOCASE"
    } else {
        "SELECT id, name, type FROM accounts WHERE type = ?1 AND name = ?2"
    };
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query_map(params![account_type.as_str(), name], |row| {
        Ok(Account {
            id: row.get(0)?,
            name: row.get(1)?,
            account_type: read_account_type(row, 2)?,
        })
    })?;
    rows.next().transpose().map_err(Into::into)
}

pub fn get_all_accounts(conn: &Connection) -> CoreResult<Vec<Account>> {
    let mut stmt = conn.prepare("SELECT id, name, type FROM accounts ORDER BY type, name")?;
    let accounts = stmt
        .query_map([], |row| {
            Ok(Account {
                id: row.get(0)?,
                name: row.get(1)?,
                account_type: read_account_type(row, 2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(accounts)
}

// ============================================================================
// CATEGORIES
// ============================================================================

pub fn insert_category(
    conn: &Connection,
    name: &str,
    parent_id: Option<i64>,
) -> CoreResult<Category> {
    conn.execute(
        "INSERT INTO categories (name, parent_id) VALUES (?1, ?2)",
        params![name, parent_id],
    )?;
    Ok(Category {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        parent_id,
    })
}

pub fn get_category(conn: &Connection, id: i64) -> CoreResult<Option<Category>> {
    let mut stmt = conn.prepare("SELECT id, name, parent_id FROM categories WHERE id = ?1")?;
    let mut rows = stmt.query_map(params![id], |row| {
        Ok(Category {
            id: row.get(0)?,
            name: row.get(1)?,
            parent_id: row.get(2)?,
        })
    })?;
    rows.next().transpose().map_err(Into::into)
}

pub fn find_category_by_name(conn: &Connection, name: &str) -> CoreResult<Option<Category>> {
    let mut stmt = conn.prepare("SELECT id, name, parent_id FROM categories WHERE name = ?1")?;
    let mut rows = stmt.query_map(params![name], |row| {
        Ok(Category {
            id: row.get(0)?,
            name: row.get(1)?,
            parent_id: row.get(2)?,
        })
    })?;
    rows.next().transpose().map_err(Into::into)
}

// ============================================================================
// TRANSACTIONS
// ============================================================================

/// Fields for a new transaction row (the id is assigned by the database).
#[derive(Debug, Clone)]
pub struct TransactionDraft {
    pub date: NaiveDate,
    pub description: String,
    pub amount: Decimal,
    pub source_account_id: i64,
    pub normalized_memo: Option<String>,
    pub category_id: Option<i64>,
    /// Deduplication hash assigned by the importer; None for rows created
    /// by hand or in tests.
    pub import_hash: Option<String>,
}

pub fn insert_transaction(conn: &Connection, draft: &TransactionDraft) -> CoreResult<Transaction> {
    conn.execute(
        "INSERT INTO transactions (
            date, description, amount, source_account_id,
            normalized_memo, category_id, import_hash
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            draft.date.format(DATE_FORMAT).to_string(),
            draft.description,
            draft.amount.to_string(),
            draft.source_account_id,
            draft.normalized_memo,
            draft.category_id,
            draft.import_hash,
        ],
    )?;
    Ok(Transaction {
        id: conn.last_insert_rowid(),
        date: draft.date,
        description: draft.description.clone(),
        amount: draft.amount,
        source_account_id: draft.source_account_id,
        normalized_memo: draft.normalized_memo.clone(),
        category_id: draft.category_id,
    })
}

pub fn get_transaction(conn: &Connection, id: i64) -> CoreResult<Option<Transaction>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?1"
    ))?;
    let mut rows = stmt.query_map(params![id], map_transaction)?;
    rows.next().transpose().map_err(Into::into)
}

pub fn get_all_transactions(conn: &Connection) -> CoreResult<Vec<Transaction>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions ORDER BY date, id"
    ))?;
    let transactions = stmt
        .query_map([], map_transaction)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(transactions)
}

/// Transactions that have no postings yet (bulk-posting work list).
pub fn get_unposted_transactions(conn: &Connection) -> CoreResult<Vec<Transaction>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions t
         WHERE NOT EXISTS (SELECT 1 FROM postings p WHERE p.transaction_id = t.id)
         ORDER BY t.date, t.id"
    ))?;
    let transactions = stmt
        .query_map([], map_transaction)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(transactions)
}

pub fn get_uncategorized_transactions(conn: &Connection) -> CoreResult<Vec<Transaction>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions
         WHERE category_id IS NULL ORDER BY date, id"
    ))?;
    let transactions = stmt
        .query_map([], map_transaction)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(transactions)
}

pub fn set_transaction_category(
    conn: &Connection,
    transaction_id: i64,
    category_id: i64,
) -> CoreResult<()> {
    conn.execute(
        "UPDATE transactions SET category_id = ?1 WHERE id = ?2",
        params![category_id, transaction_id],
    )?;
    Ok(())
}

/// Delete a transaction; its posting pair is removed by the cascade
/// constraint in the same statement.
pub fn delete_transaction(conn: &Connection, id: i64) -> CoreResult<bool> {
    let deleted = conn.execute("DELETE FROM transactions WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}

pub fn count_transactions(conn: &Connection) -> CoreResult<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
    Ok(count)
}

/// How many transactions still need a category (rules backlog).
pub fn count_uncategorized(conn: &Connection) -> CoreResult<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM transactions WHERE category_id IS NULL",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ============================================================================
// POSTINGS (read side - writes live in the posting generator)
// ============================================================================

pub fn postings_for_transaction(
    conn: &Connection,
    transaction_id: i64,
) -> CoreResult<Vec<Posting>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {POSTING_COLUMNS} FROM postings WHERE transaction_id = ?1 ORDER BY id"
    ))?;
    let postings = stmt
        .query_map(params![transaction_id], map_posting)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(postings)
}

pub fn postings_for_account(conn: &Connection, account_id: i64) -> CoreResult<Vec<Posting>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {POSTING_COLUMNS} FROM postings WHERE account_id = ?1 ORDER BY id"
    ))?;
    let postings = stmt
        .query_map(params![account_id], map_posting)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(postings)
}

pub fn count_postings(conn: &Connection) -> CoreResult<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM postings", [], |row| row.get(0))?;
    Ok(count)
}

// ============================================================================
// SEED DATA
// ============================================================================

/// Seed the minimal chart of accounts and starter categories.
///
/// Idempotent: running it again creates nothing new.
pub fn seed_minimal(conn: &Connection) -> CoreResult<()> {
    let accounts = [
        (AccountType::Asset, "Checking"),
        (AccountType::Asset, "Savings"),
        (AccountType::Income, "Income"),
        (AccountType::Expense, "Expenses"),
        (AccountType::Equity, "Transfers"),
    ];
    for (account_type, name) in accounts {
        if find_account(conn, account_type, name, false)?.is_none() {
            insert_account(conn, account_type, name)?;
        }
    }

    let categories = ["Groceries", "Rent", "Utilities", "Dining", "Salary", "Misc"];
    for name in categories {
        if find_category_by_name(conn, name)?.is_none() {
            insert_category(conn, name, None)?;
        }
    }

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
