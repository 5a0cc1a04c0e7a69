// 📂 CSV import - bank statements → validated transaction rows
//
// Column mapping is caller-supplied so statements from different banks can
// be imported without code changes. Each row gets a SHA-256 idempotency
// hash (date + description + amount + account); re-importing the same file
// skips the duplicates instead of inserting them twice.

use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CoreError, CoreResult};
use crate::models::AccountType;
use crate::registry::{self, RegistryConfig};
use crate::store::{self, TransactionDraft};

/// Date formats accepted in statement files, tried in order.
pub const SUPPORTED_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

// ============================================================================
// IMPORT MAPPING
// ============================================================================

/// Which CSV columns feed which transaction fields, plus the source account
/// the imported rows belong to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportMapping {
    pub date_col: String,
    pub description_col: String,
    pub amount_col: String,
    pub source_account_name: String,
}

/// Outcome of one import run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportSummary {
    pub imported: usize,
    /// Rows whose idempotency hash already existed.
    pub duplicates: usize,
    /// Rows dropped with the reason, 1-based data row number first.
    pub skipped: Vec<(usize, String)>,
}

// ============================================================================
// PARSING HELPERS
// ============================================================================

/// Parse a statement date, trying each supported format.
pub fn parse_import_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    SUPPORTED_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

fn parse_amount(value: &str) -> Option<Decimal> {
    Decimal::from_str(value.trim().replace(['$', ','], "").as_str()).ok()
}

/// Deduplication hash for one statement row.
///
/// This identifies the row for idempotent re-import; it is not the
/// transaction's identity (the database id is).
pub fn compute_import_hash(
    date: NaiveDate,
    description: &str,
    amount: Decimal,
    account_name: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{date}{description}{amount}{account_name}"));
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// IMPORT
// ============================================================================

pub fn import_transactions(
    conn: &Connection,
    csv_path: &Path,
    mapping: &ImportMapping,
    config: RegistryConfig,
) -> CoreResult<ImportSummary> {
    let file = std::fs::File::open(csv_path).map_err(|e| {
        CoreError::validation(format!("cannot open {}: {e}", csv_path.display()))
    })?;
    import_from_reader(conn, file, mapping, config)
}

/// Import statement rows from any CSV source.
///
/// Unparseable rows are skipped and reported, never fatal; the source
/// account is provisioned on first use.
pub fn import_from_reader<R: Read>(
    conn: &Connection,
    reader: R,
    mapping: &ImportMapping,
    config: RegistryConfig,
) -> CoreResult<ImportSummary> {
    let mut rdr = csv::Reader::from_reader(reader);

    let headers = rdr
        .headers()
        .map_err(|e| CoreError::validation(format!("cannot read CSV header: {e}")))?
        .clone();
    let date_idx = column_index(&headers, &mapping.date_col)?;
    let description_idx = column_index(&headers, &mapping.description_col)?;
    let amount_idx = column_index(&headers, &mapping.amount_col)?;

    let source_account = registry::resolve_or_create(
        conn,
        config,
        AccountType::Asset,
        &mapping.source_account_name,
    )?;

    let mut summary = ImportSummary::default();

    for (row_number, record) in rdr.records().enumerate() {
        let line = row_number + 1;
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                summary.skipped.push((line, format!("unreadable row: {e}")));
                continue;
            }
        };

        let raw_date = record.get(date_idx).unwrap_or_default();
        let date = match parse_import_date(raw_date) {
            Some(d) => d,
            None => {
                summary
                    .skipped
                    .push((line, format!("unrecognized date: {raw_date:?}")));
                continue;
            }
        };

        let raw_amount = record.get(amount_idx).unwrap_or_default();
        let amount = match parse_amount(raw_amount) {
            Some(a) => a,
            None => {
                summary
                    .skipped
                    .push((line, format!("unparseable amount: {raw_amount:?}")));
                continue;
            }
        };
        if amount == Decimal::ZERO {
            summary.skipped.push((line, "zero amount".to_string()));
            continue;
        }

        let description = record.get(description_idx).unwrap_or_default().trim().to_string();
        let hash = compute_import_hash(date, &description, amount, &source_account.name);

        let result = store::insert_transaction(
            conn,
            &TransactionDraft {
                date,
                description,
                amount,
                source_account_id: source_account.id,
                normalized_memo: None,
                category_id: None,
                import_hash: Some(hash),
            },
        );
        match result {
            Ok(_) => summary.imported += 1,
            Err(CoreError::Storage(rusqlite::Error::SqliteFailure(err, _)))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                summary.duplicates += 1;
            }
            Err(e) => return Err(e),
        }
    }

    Ok(summary)
}

fn column_index(headers: &csv::StringRecord, name: &str) -> CoreResult<usize> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| CoreError::validation(format!("CSV is missing mapped column {name:?}")))
}

// ============================================================================
// TESTS
// ============================================================================
