use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::Path;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sql_query;
use diesel::sql_types::{BigInt, Text};
use droidex_proc_macro::wraps_base_error;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::errors::ErrorKind;
use crate::result::VerificationRecord;
use crate::utils::{bytes_to_hex, is_hex_digest, open_file};

const HASH_CHUNK_SIZE: usize = 64 * 1024;

/// Prefix marking a failed [hash_file] call
pub const HASH_ERROR_PREFIX: &'static str = "Error: ";

#[wraps_base_error]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to open {path} as a database: {reason}")]
    DatabaseOpenFailed { path: String, reason: String },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::DatabaseOpenFailed
    }
}

#[derive(QueryableByName, Debug)]
struct TableRow {
    #[diesel(sql_type = Text)]
    name: String,
}

#[derive(QueryableByName, Debug)]
struct CountRow {
    #[diesel(sql_type = BigInt)]
    n: i64,
}

/// SQLite URI opening `path` read only, acquired evidence is never written
fn read_only_uri(path: &Path) -> String {
    let mut uri = String::from("file:");
    for c in path.to_string_lossy().chars() {
        match c {
            '%' => uri.push_str("%25"),
            '?' => uri.push_str("%3f"),
            '#' => uri.push_str("%23"),
            '\\' => uri.push('/'),
            c => uri.push(c),
        }
    }
    uri.push_str("?mode=ro");
    uri
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn list_tables(conn: &mut SqliteConnection) -> QueryResult<Vec<String>> {
    let rows: Vec<TableRow> =
        sql_query("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .load(conn)?;
    Ok(rows.into_iter().map(|it| it.name).collect())
}

fn count_rows(conn: &mut SqliteConnection, table: &str) -> QueryResult<i64> {
    let row: CountRow = sql_query(format!("SELECT COUNT(*) AS n FROM {}", quote_ident(table)))
        .get_result(conn)?;
    Ok(row.n)
}

/// Open `path` as a SQLite database and check it holds `expected` tables.
///
/// Missing tables are reported with a row count of 0 rather than failing.
pub fn verify<S: AsRef<str>>(path: &Path, expected: &[S]) -> Result<VerificationRecord, Error> {
    let expected: Vec<String> = expected.iter().map(|it| it.as_ref().to_string()).collect();
    let path_str = path.to_string_lossy().to_string();
    let open_failed = |reason: String| Error::DatabaseOpenFailed {
        path: path_str.clone(),
        reason,
    };

    let meta = fs::metadata(path).map_err(|e| open_failed(e.to_string()))?;
    if !meta.is_file() {
        return Err(open_failed(String::from("not a regular file")));
    }

    let mut conn = SqliteConnection::establish(&read_only_uri(path))
        .map_err(|e| open_failed(e.to_string()))?;
    let tables_found = list_tables(&mut conn).map_err(|e| open_failed(e.to_string()))?;

    let mut row_counts = BTreeMap::new();
    let mut tables_present = true;

    for table in &expected {
        if !tables_found.contains(table) {
            log::debug!("{:?} is missing table {}", path, table);
            tables_present = false;
            row_counts.insert(table.clone(), 0);
            continue;
        }
        let count = count_rows(&mut conn, table).map_err(|e| open_failed(e.to_string()))?;
        row_counts.insert(table.clone(), count);
    }

    Ok(VerificationRecord {
        file_exists: true,
        file_size: meta.len(),
        tables_found,
        expected_tables: expected,
        tables_present,
        row_counts,
        error: None,
    })
}

/// Existence only record for artifacts that aren't databases.
///
/// Directories report the total size of the files below them.
pub fn verify_existence(path: &Path) -> VerificationRecord {
    let file_size = match fs::metadata(path) {
        Ok(m) if m.is_dir() => WalkDir::new(path)
            .into_iter()
            .filter_map(|it| it.ok())
            .filter(|it| it.file_type().is_file())
            .filter_map(|it| it.metadata().ok())
            .map(|it| it.len())
            .sum(),
        Ok(m) => m.len(),
        Err(_) => {
            return VerificationRecord::default();
        }
    };

    VerificationRecord {
        file_exists: true,
        file_size,
        tables_present: true,
        ..Default::default()
    }
}

/// Stream `path` through SHA-256
pub fn try_hash_file(path: &Path) -> crate::Result<String> {
    let mut f = open_file(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_CHUNK_SIZE];

    loop {
        let n = f.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(bytes_to_hex(&hasher.finalize()))
}

/// Hex SHA-256 digest of `path`, or an `Error: ...` marker on failure.
///
/// Check the value with [is_hash_error] before treating it as a digest.
pub fn hash_file(path: &Path) -> String {
    match try_hash_file(path) {
        Ok(v) => v,
        Err(e) => {
            log::warn!("failed to hash {:?}: {}", path, e);
            format!("{}{}", HASH_ERROR_PREFIX, e)
        }
    }
}

pub fn is_hash_error(value: &str) -> bool {
    value.starts_with(HASH_ERROR_PREFIX) || !is_hex_digest(value, 32)
}

/// Create a database at `path` and run `sql` against it, test fixtures only
#[cfg(test)]
pub(crate) fn make_db(path: &Path, sql: &str) {
    let mut conn = SqliteConnection::establish(&path.to_string_lossy()).expect("create db");
    conn.batch_execute(sql).expect("populate db");
}
