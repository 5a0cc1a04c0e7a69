// 🏷️ Categorization rules - regex patterns assign categories
//
// Rules are evaluated in ascending priority order (lower number = higher
// precedence); the first matching rule wins. Matching is case-insensitive
// regex search over the transaction description, narrowed by an optional
// amount range. Only uncategorized transactions are touched.

use regex::{Regex, RegexBuilder};
use rusqlite::{params, Connection, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::models::Transaction;
use crate::store::{self, read_decimal};

// ============================================================================
// RULE DEFINITION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub id: i64,

    /// Regex matched against transaction descriptions (case-insensitive).
    pub pattern: String,

    /// Category assigned when the rule matches.
    pub category_id: i64,

    /// Optional amount bounds; a transaction outside them is not matched.
    pub amount_min: Option<Decimal>,
    pub amount_max: Option<Decimal>,

    /// Evaluation order, ascending (lower = higher precedence).
    pub priority: i32,

    pub active: bool,
}

/// One transaction a rule would categorize, from a dry run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleMatch {
    pub transaction_id: i64,
    pub rule_id: i64,
    pub category_id: i64,
}

// ============================================================================
// PERSISTENCE
// ============================================================================

fn map_rule(row: &Row<'_>) -> rusqlite::Result<CategoryRule> {
    let amount_min: Option<String> = row.get(3)?;
    let amount_max: Option<String> = row.get(4)?;
    Ok(CategoryRule {
        id: row.get(0)?,
        pattern: row.get(1)?,
        category_id: row.get(2)?,
        amount_min: amount_min.map(|_| read_decimal(row, 3)).transpose()?,
        amount_max: amount_max.map(|_| read_decimal(row, 4)).transpose()?,
        priority: row.get(5)?,
        active: row.get::<_, i64>(6)? != 0,
    })
}

pub fn insert_rule(
    conn: &Connection,
    pattern: &str,
    category_id: i64,
    amount_min: Option<Decimal>,
    amount_max: Option<Decimal>,
    priority: i32,
) -> CoreResult<CategoryRule> {
    // Reject malformed patterns up front, before they reach classification
    compile_pattern(pattern)?;
    conn.execute(
        "INSERT INTO rules (pattern, category_id, amount_min, amount_max, priority, active)
         VALUES (?1, ?2, ?3, ?4, ?5, 1)",
        params![
            pattern,
            category_id,
            amount_min.map(|d| d.to_string()),
            amount_max.map(|d| d.to_string()),
            priority,
        ],
    )?;
    Ok(CategoryRule {
        id: conn.last_insert_rowid(),
        pattern: pattern.to_string(),
        category_id,
        amount_min,
        amount_max,
        priority,
        active: true,
    })
}

/// Active rules in evaluation order.
pub fn get_active_rules(conn: &Connection) -> CoreResult<Vec<CategoryRule>> {
    let mut stmt = conn.prepare(
        "SELECT id, pattern, category_id, amount_min, amount_max, priority, active
         FROM rules WHERE active = 1 ORDER BY priority ASC, id ASC",
    )?;
    let rules = stmt.query_map([], map_rule)?.collect::<Result<Vec<_>, _>>()?;
    Ok(rules)
}

// ============================================================================
// RULE ENGINE
// ============================================================================

fn compile_pattern(pattern: &str) -> CoreResult<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| CoreError::validation(format!("malformed rule pattern {pattern:?}: {e}")))
}

pub struct RuleEngine {
    rules: Vec<(CategoryRule, Regex)>,
}

impl RuleEngine {
    /// Load and compile the active rules. A malformed stored pattern is a
    /// validation error; nothing is silently skipped.
    pub fn load(conn: &Connection) -> CoreResult<RuleEngine> {
        let mut rules = Vec::new();
        for rule in get_active_rules(conn)? {
            let regex = compile_pattern(&rule.pattern)?;
            rules.push((rule, regex));
        }
        Ok(RuleEngine { rules })
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// First rule matching the transaction, by priority.
    pub fn classify(&self, transaction: &Transaction) -> Option<&CategoryRule> {
        self.rules
            .iter()
            .find(|(rule, regex)| rule_matches(rule, regex, transaction))
            .map(|(rule, _)| rule)
    }
}

fn rule_matches(rule: &CategoryRule, regex: &Regex, transaction: &Transaction) -> bool {
    if !regex.is_match(&transaction.description) {
        return false;
    }
    if let Some(min) = rule.amount_min {
        if transaction.amount < min {
            return false;
        }
    }
    if let Some(max) = rule.amount_max {
        if transaction.amount > max {
            return false;
        }
    }
    true
}

// ============================================================================
// BATCH APPLICATION
// ============================================================================

/// Preview which uncategorized transactions the rules would claim, without
/// writing anything.
pub fn dry_run_matches(conn: &Connection) -> CoreResult<Vec<RuleMatch>> {
    let engine = RuleEngine::load(conn)?;
    let mut matches = Vec::new();
    for transaction in store::get_uncategorized_transactions(conn)? {
        if let Some(rule) = engine.classify(&transaction) {
            matches.push(RuleMatch {
                transaction_id: transaction.id,
                rule_id: rule.id,
                category_id: rule.category_id,
            });
        }
    }
    Ok(matches)
}

/// Categorize uncategorized transactions; returns how many were updated.
pub fn apply_rules(conn: &Connection) -> CoreResult<usize> {
    let engine = RuleEngine::load(conn)?;
    let mut updated = 0;
    for transaction in store::get_uncategorized_transactions(conn)? {
        if let Some(rule) = engine.classify(&transaction) {
            store::set_transaction_category(conn, transaction.id, rule.category_id)?;
            updated += 1;
        }
    }
    Ok(updated)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AccountType;
    use crate::store::TransactionDraft;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        store::setup_database(&conn).unwrap();
        conn
    }

    fn insert_tx(
        conn: &Connection,
        description: &str,
        amount: Decimal,
        account_id: i64,
    ) -> Transaction {
        store::insert_transaction(
            conn,
            &TransactionDraft {
                date: NaiveDate::from_ymd_opt(2024, 10, 5).unwrap(),
                description: description.to_string(),
                amount,
                source_account_id: account_id,
                normalized_memo: None,
                category_id: None,
                import_hash: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn first_matching_rule_by_priority_wins() {
        let conn = test_conn();
        let checking = store::insert_account(&conn, AccountType::Asset, "Checking").unwrap();
        let groceries = store::insert_category(&conn, "Groceries", None).unwrap();
        let misc = store::insert_category(&conn, "Misc", None).unwrap();

        // Broad catch-all at low precedence, specific rule ahead of it
        insert_rule(&conn, ".*", misc.id, None, None, 100).unwrap();
        insert_rule(&conn, "walmart|kroger", groceries.id, None, None, 10).unwrap();

        let tx = insert_tx(&conn, "WALMART STORE #42", dec!(-63.20), checking.id);
        let engine = RuleEngine::load(&conn).unwrap();
        assert_eq!(engine.classify(&tx).unwrap().category_id, groceries.id);
    }

    #[test]
    fn matching_is_case_insensitive_regex_search() {
        let conn = test_conn();
        let checking = store::insert_account(&conn, AccountType::Asset, "Checking").unwrap();
        let dining = store::insert_category(&conn, "Dining", None).unwrap();
        insert_rule(&conn, "starbucks", dining.id, None, None, 10).unwrap();

        let engine = RuleEngine::load(&conn).unwrap();
        let hit = insert_tx(&conn, "STARBUCKS #12345 SEATTLE", dec!(-4.50), checking.id);
        let miss = insert_tx(&conn, "SHELL GAS", dec!(-40), checking.id);
        assert!(engine.classify(&hit).is_some());
        assert!(engine.classify(&miss).is_none());
    }

    #[test]
    fn amount_bounds_narrow_the_match() {
        let conn = test_conn();
        let checking = store::insert_account(&conn, AccountType::Asset, "Checking").unwrap();
        let rent = store::insert_category(&conn, "Rent", None).unwrap();
        insert_rule(&conn, "transfer", rent.id, Some(dec!(-1500)), Some(dec!(-1000)), 10).unwrap();

        let engine = RuleEngine::load(&conn).unwrap();
        let in_range = insert_tx(&conn, "TRANSFER TO LANDLORD", dec!(-1200), checking.id);
        let out_of_range = insert_tx(&conn, "TRANSFER TO LANDLORD", dec!(-50), checking.id);
        assert!(engine.classify(&in_range).is_some());
        assert!(engine.classify(&out_of_range).is_none());
    }

    #[test]
    fn malformed_pattern_is_rejected() {
        let conn = test_conn();
        let misc = store::insert_category(&conn, "Misc", None).unwrap();
        let err = insert_rule(&conn, "(unclosed", misc.id, None, None, 10).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn apply_rules_only_touches_uncategorized_transactions() {
        let conn = test_conn();
        let checking = store::insert_account(&conn, AccountType::Asset, "Checking").unwrap();
        let groceries = store::insert_category(&conn, "Groceries", None).unwrap();
        let dining = store::insert_category(&conn, "Dining", None).unwrap();
        insert_rule(&conn, "kroger", groceries.id, None, None, 10).unwrap();

        let uncategorized = insert_tx(&conn, "KROGER #12", dec!(-30), checking.id);
        let precategorized = insert_tx(&conn, "KROGER #12", dec!(-30), checking.id);
        store::set_transaction_category(&conn, precategorized.id, dining.id).unwrap();

        let updated = apply_rules(&conn).unwrap();
        assert_eq!(updated, 1);

        let t1 = store::get_transaction(&conn, uncategorized.id).unwrap().unwrap();
        let t2 = store::get_transaction(&conn, precategorized.id).unwrap().unwrap();
        assert_eq!(t1.category_id, Some(groceries.id));
        assert_eq!(t2.category_id, Some(dining.id), "existing category preserved");
    }

    #[test]
    fn dry_run_reports_without_writing() {
        let conn = test_conn();
        let checking = store::insert_account(&conn, AccountType::Asset, "Checking").unwrap();
        let groceries = store::insert_category(&conn, "Groceries", None).unwrap();
        let rule = insert_rule(&conn, "kroger", groceries.id, None, None, 10).unwrap();
        let tx = insert_tx(&conn, "KROGER #12", dec!(-30), checking.id);

        let matches = dry_run_matches(&conn).unwrap();
        assert_eq!(
            matches,
            vec![RuleMatch {
                transaction_id: tx.id,
                rule_id: rule.id,
                category_id: groceries.id,
            }]
        );

        let reloaded = store::get_transaction(&conn, tx.id).unwrap().unwrap();
        assert_eq!(reloaded.category_id, None);
    }
}
