//! Console progress: table name on start, a dot per notification, newline when done.

use mssql_copydb::{CopyObserver, TableIdentifier};
use std::io::Write;

pub struct ConsoleObserver;

impl CopyObserver for ConsoleObserver {
    fn table_started(&self, table: &TableIdentifier) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{}", table);
    }

    fn rows_copied(&self, _table: &TableIdentifier, _rows: u64) {
        let mut out = std::io::stdout().lock();
        let _ = write!(out, ".");
        let _ = out.flush();
    }

    fn table_completed(&self, _table: &TableIdentifier, _rows: u64) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out);
    }
}
