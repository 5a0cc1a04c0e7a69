use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use rusqlite::Connection;
use std::env;
use std::path::Path;

use ledger_core::{
    account_balance, apply_rules, cashflow_by_month, category_breakdown, count_transactions,
    count_uncategorized, generate_missing, get_all_accounts, get_all_transactions,
    import_transactions, reconciliation_report, regenerate_all, seed_minimal, setup_database,
    AccountType, ImportMapping, RegistryConfig,
};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("init") => run_init(&args[2..]),
        Some("import") => run_import(&args[2..]),
        Some("post") => run_post(&args[2..]),
        Some("repost") => run_repost(&args[2..]),
        Some("balances") => run_balances(&args[2..]),
        Some("report") => run_report(&args[2..]),
        Some("cashflow") => run_cashflow(&args[2..]),
        Some("categories") => run_categories(&args[2..]),
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!("ledger-core {}", ledger_core::VERSION);
    println!();
    println!("Usage:");
    println!("  ledger-core init <db>");
    println!("  ledger-core import <db> <csv> <account> [date_col desc_col amount_col]");
    println!("  ledger-core post <db>");
    println!("  ledger-core repost <db>");
    println!("  ledger-core balances <db>");
    println!("  ledger-core report <db> <account> <start> <end>");
    println!("  ledger-core cashflow <db> <start> <end>");
    println!("  ledger-core categories <db> <start> <end>");
}

fn open(db_path: &str) -> Result<Connection> {
    let conn = Connection::open(Path::new(db_path))
        .with_context(|| format!("failed to open database {db_path}"))?;
    setup_database(&conn)?;
    Ok(conn)
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("expected YYYY-MM-DD date, got {value:?}"))
}

fn run_init(args: &[String]) -> Result<()> {
    let [db_path] = args else {
        bail!("usage: ledger-core init <db>");
    };

    let conn = open(db_path)?;
    seed_minimal(&conn)?;

    println!("✓ Database initialized with WAL mode and foreign keys");
    println!("✓ Seeded chart of accounts and starter categories");
    Ok(())
}

fn run_import(args: &[String]) -> Result<()> {
    let (db_path, csv_path, account) = match args {
        [db, csv, account, ..] => (db, csv, account),
        _ => bail!("usage: ledger-core import <db> <csv> <account> [date_col desc_col amount_col]"),
    };
    let mapping = ImportMapping {
        date_col: args.get(3).cloned().unwrap_or_else(|| "Date".to_string()),
        description_col: args.get(4).cloned().unwrap_or_else(|| "Description".to_string()),
        amount_col: args.get(5).cloned().unwrap_or_else(|| "Amount".to_string()),
        source_account_name: account.clone(),
    };

    let conn = open(db_path)?;
    println!("📂 Importing {csv_path} into account {account:?}...");
    let summary =
        import_transactions(&conn, Path::new(csv_path), &mapping, RegistryConfig::default())?;

    println!("✓ Imported: {} transactions", summary.imported);
    println!("✓ Skipped duplicates: {}", summary.duplicates);
    for (line, reason) in &summary.skipped {
        println!("  ! row {line}: {reason}");
    }
    println!("✓ Database contains {} transactions", count_transactions(&conn)?);
    Ok(())
}

fn run_post(args: &[String]) -> Result<()> {
    let [db_path] = args else {
        bail!("usage: ledger-core post <db>");
    };
    let conn = open(db_path)?;

    let categorized = apply_rules(&conn)?;
    println!("✓ Categorized {categorized} transactions via rules");

    let outcome = generate_missing(&conn, RegistryConfig::default())?;
    println!("✓ Posted {} transactions", outcome.processed);
    for failure in &outcome.failures {
        println!("  ! transaction {}: {}", failure.transaction_id, failure.error);
    }
    Ok(())
}

fn run_repost(args: &[String]) -> Result<()> {
    let [db_path] = args else {
        bail!("usage: ledger-core repost <db>");
    };
    let conn = open(db_path)?;

    let transactions = get_all_transactions(&conn)?;
    let outcome = regenerate_all(&conn, RegistryConfig::default(), &transactions);
    println!(
        "✓ Regenerated postings for {} of {} transactions",
        outcome.processed,
        transactions.len()
    );
    for failure in &outcome.failures {
        println!("  ! transaction {}: {}", failure.transaction_id, failure.error);
    }
    Ok(())
}

fn run_balances(args: &[String]) -> Result<()> {
    let [db_path] = args else {
        bail!("usage: ledger-core balances <db>");
    };
    let conn = open(db_path)?;

    for account in get_all_accounts(&conn)? {
        let balance = account_balance(&conn, account.id)?;
        println!(
            "{:<10} {:<32} {:>14}",
            account.account_type.as_str(),
            account.name,
            balance
        );
    }
    Ok(())
}

fn run_report(args: &[String]) -> Result<()> {
    let [db_path, account_name, start, end] = args else {
        bail!("usage: ledger-core report <db> <account> <start> <end>");
    };
    let conn = open(db_path)?;

    let account = find_named_account(&conn, account_name)?;
    let report = reconciliation_report(&conn, account.id, parse_date(start)?, parse_date(end)?)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_cashflow(args: &[String]) -> Result<()> {
    let [db_path, start, end] = args else {
        bail!("usage: ledger-core cashflow <db> <start> <end>");
    };
    let conn = open(db_path)?;

    let months = cashflow_by_month(&conn, parse_date(start)?, parse_date(end)?)?;
    println!("{}", serde_json::to_string_pretty(&months)?);
    Ok(())
}

fn run_categories(args: &[String]) -> Result<()> {
    let [db_path, start, end] = args else {
        bail!("usage: ledger-core categories <db> <start> <end>");
    };
    let conn = open(db_path)?;

    let breakdown = category_breakdown(&conn, parse_date(start)?, parse_date(end)?)?;
    println!("{}", serde_json::to_string_pretty(&breakdown)?);

    let backlog = count_uncategorized(&conn)?;
    if backlog > 0 {
        println!("! {backlog} transactions are still uncategorized");
    }
    Ok(())
}

fn find_named_account(conn: &Connection, name: &str) -> Result<ledger_core::Account> {
    // Account names are unique per type; search the types in display order
    for account_type in [
        AccountType::Asset,
        AccountType::Liability,
        AccountType::Income,
        AccountType::Expense,
        AccountType::Equity,
    ] {
        if let Some(account) = ledger_core::store::find_account(conn, account_type, name, false)? {
            return Ok(account);
        }
    }
    bail!("no account named {name:?}")
}
