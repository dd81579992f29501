//! Database handle and statement execution

use chrono::{DateTime, Utc};
use rusqlite::types::{Value, ValueRef};
use rusqlite::Connection;
use std::time::Duration;

use vellum_bridge::{ActionResult, Row, SqlValue};

use crate::config::StoreConfig;
use crate::error::StorageError;
use crate::transaction::TxState;
use crate::Result;

/// The single handle to the store. Deliberately neither `Clone` nor shared:
/// it lives inside one storage worker.
pub(crate) struct Database {
    conn: Connection,
    tx_state: TxState,
    opened_at: DateTime<Utc>,
}

impl Database {
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let conn = match config.path() {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let conn = Connection::open(&path)?;

                // WAL mode so a crash mid-write never tears committed pages
                let _: String =
                    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
                conn
            }
            None => Connection::open_in_memory()?,
        };

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;

        tracing::info!(store = %config.location(), "Opened store");

        Ok(Self {
            conn,
            tx_state: TxState::Idle,
            opened_at: Utc::now(),
        })
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn tx_state(&self) -> TxState {
        self.tx_state
    }

    /// Run one statement and collect every row it produces
    pub fn exec(&mut self, sql: &str, params: &[SqlValue]) -> Result<ActionResult> {
        let result = self.run_statement(sql, params);
        self.sync_tx_state();
        result
    }

    fn run_statement(&self, sql: &str, params: &[SqlValue]) -> Result<ActionResult> {
        let before = self.conn.total_changes();

        let rows = {
            let mut stmt = self.conn.prepare(sql)?;
            let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

            let mut out = Vec::new();
            let mut rows = stmt.query(rusqlite::params_from_iter(params.iter().map(to_sql)))?;
            while let Some(row) = rows.next()? {
                let mut record = Row::with_capacity(columns.len());
                for (i, column) in columns.iter().enumerate() {
                    record.push(column.clone(), from_sql(row.get_ref(i)?));
                }
                out.push(record);
            }
            out
        };

        // sqlite3_changes() is not reset by DDL, so diff the running total
        Ok(ActionResult {
            rows,
            changes: self.conn.total_changes().saturating_sub(before),
            last_insert_rowid: self.conn.last_insert_rowid(),
        })
    }

    pub fn begin(&mut self) -> Result<()> {
        self.transition(TxState::InTransaction, "BEGIN", "a transaction is already open")
    }

    pub fn commit(&mut self) -> Result<()> {
        self.transition(TxState::Idle, "COMMIT", "no transaction is open")
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.transition(TxState::Idle, "ROLLBACK", "no transaction is open")
    }

    fn transition(&mut self, target: TxState, sql: &str, refusal: &str) -> Result<()> {
        if !self.tx_state.can_transition_to(target) {
            return Err(StorageError::TransactionState(refusal.to_string()));
        }

        let result = self.conn.execute_batch(sql);
        self.sync_tx_state();
        result?;

        tracing::debug!(to = %self.tx_state, "Transaction state transition");
        Ok(())
    }

    /// SQLite is the source of truth: a raw `COMMIT` sent through `exec`,
    /// or a failed `COMMIT`, must not leave the tracked state stale.
    fn sync_tx_state(&mut self) {
        let actual = if self.conn.is_autocommit() {
            TxState::Idle
        } else {
            TxState::InTransaction
        };

        if actual != self.tx_state {
            tracing::debug!(from = %self.tx_state, to = %actual, "Transaction state resynced");
            self.tx_state = actual;
        }
    }
}

fn to_sql(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(v) => Value::Integer(*v),
        SqlValue::Real(v) => Value::Real(*v),
        SqlValue::Text(v) => Value::Text(v.clone()),
        SqlValue::Blob(v) => Value::Blob(v.clone()),
    }
}

fn from_sql(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(v) => SqlValue::Integer(v),
        ValueRef::Real(v) => SqlValue::Real(v),
        ValueRef::Text(v) => SqlValue::Text(String::from_utf8_lossy(v).into_owned()),
        ValueRef::Blob(v) => SqlValue::Blob(v.to_vec()),
    }
}
