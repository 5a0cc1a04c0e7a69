// ⚖️ Posting generator - balanced double-entry pairs per transaction
//
// Double-entry rules:
// - Expense (amount < 0): credit source account, debit category account
// - Income  (amount > 0): debit source account, credit category account
// - Zero amounts are rejected; they should never reach this module
//
// Replace semantics: generating postings for a transaction that already has
// them deletes the old pair and inserts the new one inside a single SQLite
// transaction. A reader never observes a half-posted transaction, and
// repeated runs with unchanged data always leave exactly two rows.

use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::models::{Posting, Transaction};
use crate::registry::{self, RegistryConfig};
use crate::store;

// ============================================================================
// SINGLE TRANSACTION
// ============================================================================

/// Generate (or regenerate) the balanced posting pair for one transaction.
///
/// Returns the two rows as written: first the source-account posting, then
/// the category-account posting.
pub fn generate_postings(
    conn: &Connection,
    config: RegistryConfig,
    transaction: &Transaction,
) -> CoreResult<(Posting, Posting)> {
    if transaction.amount == Decimal::ZERO {
        return Err(CoreError::validation(format!(
            "transaction {} has zero amount, no postings generated",
            transaction.id
        )));
    }

    let category = match transaction.category_id {
        Some(id) => Some(store::get_category(conn, id)?.ok_or_else(|| {
            CoreError::validation(format!(
                "transaction {} references missing category {}",
                transaction.id, id
            ))
        })?),
        None => None,
    };

    // One atomic unit of work: account provisioning, delete of the old
    // pair, insert of the new pair. Commit-or-rollback as a whole.
    let tx = conn.unchecked_transaction()?;

    let category_account = registry::resolve_category_account(
        &tx,
        config,
        transaction.amount,
        category.as_ref(),
    )?;

    tx.execute(
        "DELETE FROM postings WHERE transaction_id = ?1",
        params![transaction.id],
    )?;

    let magnitude = transaction.amount.abs();
    let source_id = transaction.source_account_id;
    let (source, category_side) = if transaction.is_expense() {
        // Money out of the bank: credit source, debit the expense account
        let source = insert_posting(&tx, transaction.id, source_id, Decimal::ZERO, magnitude)?;
        let category_side =
            insert_posting(&tx, transaction.id, category_account.id, magnitude, Decimal::ZERO)?;
        (source, category_side)
    } else {
        // Money into the bank: debit source, credit the income account
        let source = insert_posting(&tx, transaction.id, source_id, magnitude, Decimal::ZERO)?;
        let category_side =
            insert_posting(&tx, transaction.id, category_account.id, Decimal::ZERO, magnitude)?;
        (source, category_side)
    };

    verify_balanced(transaction.id, &[source.clone(), category_side.clone()])?;

    tx.commit()?;
    Ok((source, category_side))
}

fn insert_posting(
    conn: &Connection,
    transaction_id: i64,
    account_id: i64,
    debit: Decimal,
    credit: Decimal,
) -> CoreResult<Posting> {
    conn.execute(
        "INSERT INTO postings (transaction_id, account_id, debit, credit)
         VALUES (?1, ?2, ?3, ?4)",
        params![transaction_id, account_id, debit.to_string(), credit.to_string()],
    )?;
    Ok(Posting {
        id: conn.last_insert_rowid(),
        transaction_id,
        account_id,
        debit,
        credit,
    })
}

/// Internal assertion of the double-entry invariant. A failure here means a
/// bug in generation; the surrounding unit of work is rolled back.
fn verify_balanced(transaction_id: i64, postings: &[Posting]) -> CoreResult<()> {
    let mut debit_total = Decimal::ZERO;
    let mut credit_total = Decimal::ZERO;

    for posting in postings {
        if !posting.is_well_formed() {
            return Err(CoreError::consistency(format!(
                "transaction {transaction_id}: posting {} has both or neither side set",
                posting.id
            )));
        }
        debit_total += posting.debit;
        credit_total += posting.credit;
    }

    if debit_total != credit_total {
        return Err(CoreError::consistency(format!(
            "transaction {transaction_id}: debits {debit_total} != credits {credit_total}"
        )));
    }

    Ok(())
}

// ============================================================================
// BATCH PROCESSING
// ============================================================================

/// One transaction the batch could not post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchFailure {
    pub transaction_id: i64,
    pub error: String,
}

/// Result of a batch posting run: how many transactions were posted, plus
/// the per-transaction failures. Partial progress is committed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub processed: usize,
    pub failures: Vec<BatchFailure>,
}

impl BatchOutcome {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Regenerate postings for every transaction in the slice, sequentially.
///
/// Atomic per transaction, not across the batch: a failure leaves that
/// transaction's previous pair intact (or absent) and processing continues.
pub fn regenerate_all(
    conn: &Connection,
    config: RegistryConfig,
    transactions: &[Transaction],
) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();

    for transaction in transactions {
        match generate_postings(conn, config, transaction) {
            Ok(_) => outcome.processed += 1,
            Err(e) => outcome.failures.push(BatchFailure {
                transaction_id: transaction.id,
                error: e.to_string(),
            }),
        }
    }

    outcome
}

/// Post every transaction that has no postings yet (the bulk path after an
/// import). Already-posted transactions are left untouched.
pub fn generate_missing(conn: &Connection, config: RegistryConfig) -> CoreResult<BatchOutcome> {
    let unposted = store::get_unposted_transactions(conn)?;
    Ok(regenerate_all(conn, config, &unposted))
}

// ============================================================================
// TESTS
// ============================================================================
