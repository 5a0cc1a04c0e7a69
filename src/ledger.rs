// 📊 Ledger aggregator - balances, reconciliation, monthly cashflow
//
// All balances use the raw debit-minus-credit convention. Flipping the sign
// for liability/income/equity display is a presentation concern and does not
// happen here.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;
use crate::store::{read_date, read_decimal, DATE_FORMAT};

// ============================================================================
// ACCOUNT BALANCE
// ============================================================================

/// Raw balance of an account: sum(debit) - sum(credit) over all its
/// postings. Accounts with no postings balance to zero.
pub fn account_balance(conn: &Connection, account_id: i64) -> CoreResult<Decimal> {
    balance_filtered(conn, account_id, None)
}

/// Balance over postings whose transaction date is on or before `through`.
pub fn account_balance_through(
    conn: &Connection,
    account_id: i64,
    through: NaiveDate,
) -> CoreResult<Decimal> {
    balance_filtered(conn, account_id, Some(through))
}

fn balance_filtered(
    conn: &Connection,
    account_id: i64,
    through: Option<NaiveDate>,
) -> CoreResult<Decimal> {
    // Amounts live as TEXT; summing happens in Decimal, never in SQL floats
    let mut stmt = conn.prepare(
        "SELECT p.debit, p.credit, t.date
         FROM postings p
         JOIN transactions t ON t.id = p.transaction_id
         WHERE p.account_id = ?1",
    )?;

    let mut balance = Decimal::ZERO;
    let rows = stmt.query_map(params![account_id], |row| {
        Ok((read_decimal(row, 0)?, read_decimal(row, 1)?, read_date(row, 2)?))
    })?;
    for row in rows {
        let (debit, credit, date) = row?;
        if let Some(cutoff) = through {
            if date > cutoff {
                continue;
            }
        }
        balance += debit - credit;
    }

    Ok(balance)
}

// ============================================================================
// RECONCILIATION REPORT
// ============================================================================

/// Period-bounded summary for one account.
///
/// Invariant: `closing_balance` equals `account_balance_through(period_end)`,
/// since opening covers everything strictly before the window and
/// inflows/outflows cover the window itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub account_id: i64,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    /// Balance over postings dated strictly before the period.
    pub opening_balance: Decimal,
    /// Sum of debit postings dated within the period.
    pub inflows: Decimal,
    /// Sum of credit postings dated within the period.
    pub outflows: Decimal,
    pub closing_balance: Decimal,
    /// Distinct transactions contributing postings in the period.
    pub transaction_count: i64,
}

pub fn reconciliation_report(
    conn: &Connection,
    account_id: i64,
    period_start: NaiveDate,
    period_end: NaiveDate,
) -> CoreResult<ReconciliationReport> {
    let mut stmt = conn.prepare(
        "SELECT p.debit, p.credit, t.date, t.id
         FROM postings p
         JOIN transactions t ON t.id = p.transaction_id
         WHERE p.account_id = ?1",
    )?;

    let mut opening_balance = Decimal::ZERO;
    let mut inflows = Decimal::ZERO;
    let mut outflows = Decimal::ZERO;
    let mut transactions_in_window = std::collections::BTreeSet::new();

    let rows = stmt.query_map(params![account_id], |row| {
        Ok((
            read_decimal(row, 0)?,
            read_decimal(row, 1)?,
            read_date(row, 2)?,
            row.get::<_, i64>(3)?,
        ))
    })?;
    for row in rows {
        let (debit, credit, date, transaction_id) = row?;
        if date < period_start {
            opening_balance += debit - credit;
        } else if date <= period_end {
            inflows += debit;
            outflows += credit;
            transactions_in_window.insert(transaction_id);
        }
    }

    Ok(ReconciliationReport {
        account_id,
        period_start,
        period_end,
        opening_balance,
        inflows,
        outflows,
        closing_balance: opening_balance + inflows - outflows,
        transaction_count: transactions_in_window.len() as i64,
    })
}

// ============================================================================
// MONTHLY CASHFLOW
// ============================================================================

/// Cashflow totals for one calendar month, aggregated over transaction
/// amounts (not postings).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyCashflow {
    /// "YYYY-MM"
    pub month: String,
    pub income: Decimal,
    pub expenses: Decimal,
    pub net: Decimal,
}

/// Group transactions in the window by calendar month, ascending.
///
/// income = sum of positive amounts, expenses = sum of |negative amounts|.
pub fn cashflow_by_month(
    conn: &Connection,
    period_start: NaiveDate,
    period_end: NaiveDate,
) -> CoreResult<Vec<MonthlyCashflow>> {
    let mut stmt = conn.prepare(
        "SELECT date, amount FROM transactions WHERE date >= ?1 AND date <= ?2",
    )?;

    let mut months: BTreeMap<String, (Decimal, Decimal)> = BTreeMap::new();
    let rows = stmt.query_map(
        params![
            period_start.format(DATE_FORMAT).to_string(),
            period_end.format(DATE_FORMAT).to_string(),
        ],
        |row| Ok((read_date(row, 0)?, read_decimal(row, 1)?)),
    )?;
    for row in rows {
        let (date, amount) = row?;
        let key = format!("{:04}-{:02}", date.year(), date.month());
        let entry = months.entry(key).or_default();
        if amount > Decimal::ZERO {
            entry.0 += amount;
        } else {
            entry.1 += amount.abs();
        }
    }

    Ok(months
        .into_iter()
        .map(|(month, (income, expenses))| MonthlyCashflow {
            month,
            income,
            expenses,
            net: income - expenses,
        })
        .collect())
}

// ============================================================================
// CATEGORY BREAKDOWN
// ============================================================================

/// Expense total for one category over a reporting window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryExpense {
    pub category: String,
    pub amount: Decimal,
}

/// Expense totals per category for a date range, largest first.
///
/// Only outflows count (positive amounts are ignored), summed as absolute
/// values. Uncategorized transactions are not part of the breakdown.
pub fn category_breakdown(
    conn: &Connection,
    period_start: NaiveDate,
    period_end: NaiveDate,
) -> CoreResult<Vec<CategoryExpense>> {
    let mut stmt = conn.prepare(
        "SELECT c.name, t.amount
         FROM transactions t
         JOIN categories c ON c.id = t.category_id
         WHERE t.date >= ?1 AND t.date <= ?2",
    )?;

    let mut totals: BTreeMap<String, Decimal> = BTreeMap::new();
    let rows = stmt.query_map(
        params![
            period_start.format(DATE_FORMAT).to_string(),
            period_end.format(DATE_FORMAT).to_string(),
        ],
        |row| Ok((row.get::<_, String>(0)?, read_decimal(row, 1)?)),
    )?;
    for row in rows {
        let (category, amount) = row?;
        if amount < Decimal::ZERO {
            *totals.entry(category).or_default() += amount.abs();
        }
    }

    let mut breakdown: Vec<CategoryExpense> = totals
        .into_iter()
        .map(|(category, amount)| CategoryExpense { category, amount })
        .collect();
    breakdown.sort_by(|a, b| b.amount.cmp(&a.amount));
    Ok(breakdown)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AccountType;
    use crate::posting::generate_postings;
    use crate::registry::RegistryConfig;
    use crate::store::{self, TransactionDraft};
    use rust_decimal_macros::dec;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        store::setup_database(&conn).unwrap();
        conn
    }

    fn post_tx(
        conn: &Connection,
        date: &str,
        amount: Decimal,
        source_account_id: i64,
        category: Option<&str>,
    ) {
        let category_id = category.map(|name| {
            match store::find_category_by_name(conn, name).unwrap() {
                Some(c) => c.id,
                None => store::insert_category(conn, name, None).unwrap().id,
            }
        });
        let tx = store::insert_transaction(
            conn,
            &TransactionDraft {
                date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
                description: format!("{} {}", date, amount),
                amount,
                source_account_id,
                normalized_memo: None,
                category_id,
                import_hash: None,
            },
        )
        .unwrap();
        generate_postings(conn, RegistryConfig::default(), &tx).unwrap();
    }

    fn account_id(conn: &Connection, account_type: AccountType, name: &str) -> i64 {
        store::find_account(conn, account_type, name, false)
            .unwrap()
            .unwrap()
            .id
    }

    #[test]
    fn balances_follow_raw_debit_minus_credit_convention() {
        let conn = test_conn();
        let checking = store::insert_account(&conn, AccountType::Asset, "Checking").unwrap();
        post_tx(&conn, "2024-09-05", dec!(-50), checking.id, Some("Groceries"));
        post_tx(&conn, "2024-09-06", dec!(1000), checking.id, Some("Salary"));

        assert_eq!(account_balance(&conn, checking.id).unwrap(), dec!(950));
        assert_eq!(
            account_balance(&conn, account_id(&conn, AccountType::Expense, "Expense:Groceries"))
                .unwrap(),
            dec!(50)
        );
        assert_eq!(
            account_balance(&conn, account_id(&conn, AccountType::Income, "Income:Salary"))
                .unwrap(),
            dec!(-1000)
        );
    }

    #[test]
    fn empty_account_balances_to_zero() {
        let conn = test_conn();
        let checking = store::insert_account(&conn, AccountType::Asset, "Checking").unwrap();
        assert_eq!(account_balance(&conn, checking.id).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn reconciliation_closing_matches_balance_through_period_end() {
        let conn = test_conn();
        let checking = store::insert_account(&conn, AccountType::Asset, "Checking").unwrap();
        post_tx(&conn, "2024-09-15", dec!(2500), checking.id, Some("Salary"));
        post_tx(&conn, "2024-09-28", dec!(-400), checking.id, Some("Rent"));
        post_tx(&conn, "2024-10-01", dec!(-1200), checking.id, Some("Rent"));
        post_tx(&conn, "2024-10-02", dec!(3000), checking.id, Some("Salary"));
        post_tx(&conn, "2024-11-03", dec!(-75), checking.id, Some("Dining"));

        let start = NaiveDate::from_ymd_opt(2024, 10, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 10, 31).unwrap();
        let report = reconciliation_report(&conn, checking.id, start, end).unwrap();

        assert_eq!(report.opening_balance, dec!(2100)); // 2500 - 400
        assert_eq!(report.inflows, dec!(3000));
        assert_eq!(report.outflows, dec!(1200));
        assert_eq!(report.closing_balance, dec!(3900));
        assert_eq!(report.transaction_count, 2);

        // Cross-check property: closing == balance through period end
        assert_eq!(
            report.closing_balance,
            account_balance_through(&conn, checking.id, end).unwrap()
        );
    }

    #[test]
    fn end_to_end_october_example() {
        let conn = test_conn();
        let checking = store::insert_account(&conn, AccountType::Asset, "Checking").unwrap();
        post_tx(&conn, "2024-10-01", dec!(-1200), checking.id, Some("Rent"));
        post_tx(&conn, "2024-10-02", dec!(3000), checking.id, Some("Salary"));

        assert_eq!(account_balance(&conn, checking.id).unwrap(), dec!(1800));
        assert_eq!(
            account_balance(&conn, account_id(&conn, AccountType::Expense, "Expense:Rent"))
                .unwrap(),
            dec!(1200)
        );
        assert_eq!(
            account_balance(&conn, account_id(&conn, AccountType::Income, "Income:Salary"))
                .unwrap(),
            dec!(-3000)
        );

        let months = cashflow_by_month(
            &conn,
            NaiveDate::from_ymd_opt(2024, 10, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 10, 31).unwrap(),
        )
        .unwrap();
        assert_eq!(months.len(), 1);
        assert_eq!(months[0].month, "2024-10");
        assert_eq!(months[0].income, dec!(3000));
        assert_eq!(months[0].expenses, dec!(1200));
        assert_eq!(months[0].net, dec!(1800));
    }

    #[test]
    fn category_breakdown_sums_expenses_descending() {
        let conn = test_conn();
        let checking = store::insert_account(&conn, AccountType::Asset, "Checking").unwrap();
        post_tx(&conn, "2024-10-01", dec!(-1200), checking.id, Some("Rent"));
        post_tx(&conn, "2024-10-05", dec!(-60), checking.id, Some("Groceries"));
        post_tx(&conn, "2024-10-12", dec!(-40), checking.id, Some("Groceries"));
        post_tx(&conn, "2024-10-15", dec!(3000), checking.id, Some("Salary")); // income, ignored
        post_tx(&conn, "2024-10-20", dec!(-25), checking.id, None); // uncategorized, ignored
        post_tx(&conn, "2024-11-02", dec!(-500), checking.id, Some("Rent")); // outside window

        let breakdown = category_breakdown(
            &conn,
            NaiveDate::from_ymd_opt(2024, 10, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 10, 31).unwrap(),
        )
        .unwrap();

        assert_eq!(
            breakdown,
            vec![
                CategoryExpense {
                    category: "Rent".to_string(),
                    amount: dec!(1200),
                },
                CategoryExpense {
                    category: "Groceries".to_string(),
                    amount: dec!(100),
                },
            ]
        );
    }

    #[test]
    fn cashflow_months_are_ascending_and_window_bounded() {
        let conn = test_conn();
        let checking = store::insert_account(&conn, AccountType::Asset, "Checking").unwrap();
        post_tx(&conn, "2024-12-10", dec!(-20), checking.id, None);
        post_tx(&conn, "2024-11-10", dec!(500), checking.id, None);
        post_tx(&conn, "2025-01-10", dec!(-30), checking.id, None); // outside window

        let months = cashflow_by_month(
            &conn,
            NaiveDate::from_ymd_opt(2024, 11, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        )
        .unwrap();

        assert_eq!(months.len(), 2);
        assert_eq!(months[0].month, "2024-11");
        assert_eq!(months[0].net, dec!(500));
        assert_eq!(months[1].month, "2024-12");
        assert_eq!(months[1].net, dec!(-20));
    }
}
