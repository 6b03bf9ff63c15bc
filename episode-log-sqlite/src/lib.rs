//! SQLite-backed [`DurableStore`].
use anyhow::{bail, Context, Result};
use episode_log_core::{DurableStore, EpisodeLog, EpisodeLogConfig, EpisodeLogError, LastError, Record};
use log::{debug, info};
use rusqlite::{params, types::Type, Connection, Row};
use std::{
    convert::TryFrom,
    path::Path,
    sync::{Mutex, MutexGuard, PoisonError},
};

const COLUMNS: &str = "TIME, GAME_ID, MACHINE, SEQ, PRI, REWARD, CONTENT";

/// Stores records in a table of an SQLite database.
///
/// The table is created on open if it does not exist:
///
/// | column    | type                  |
/// |-----------|-----------------------|
/// | `TIME`    | `INTEGER PRIMARY KEY` |
/// | `GAME_ID` | `INTEGER`             |
/// | `MACHINE` | `TEXT`                |
/// | `SEQ`     | `INTEGER`             |
/// | `PRI`     | `REAL`, indexed       |
/// | `REWARD`  | `REAL`, indexed       |
/// | `CONTENT` | `TEXT`                |
///
/// `TIME` holds the record timestamp in milliseconds, so appending two records with the
/// same timestamp fails on the second one.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    table_name: String,
    verbose: bool,
    last_error: LastError,
}

impl SqliteStore {
    /// Opens the database file at `path`, creating it and the table if needed.
    ///
    /// If `verbose` is `true`, every statement is logged at debug level.
    pub fn open(path: impl AsRef<Path>, table_name: &str, verbose: bool) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("cannot open database {:?}", path))?;
        let store = Self::with_connection(conn, table_name, verbose)?;
        info!("Opened table {:?} in {:?}", table_name, path);
        Ok(store)
    }

    /// Opens a database living in memory.
    pub fn open_in_memory(table_name: &str, verbose: bool) -> Result<Self> {
        let conn = Connection::open_in_memory().context("cannot open in-memory database")?;
        Self::with_connection(conn, table_name, verbose)
    }

    /// Opens the database at the location given in `config`.
    pub fn from_config(config: &EpisodeLogConfig) -> Result<Self> {
        Self::open(&config.path, &config.table_name, config.verbose)
    }

    /// Name of the table.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    fn with_connection(conn: Connection, table_name: &str, verbose: bool) -> Result<Self> {
        check_table_name(table_name)?;
        let store = Self {
            conn: Mutex::new(conn),
            table_name: table_name.to_string(),
            verbose,
            last_error: LastError::default(),
        };
        if !store.table_exists()? {
            store.create_table()?;
        }
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn log_sql(&self, sql: &str) {
        if self.verbose {
            debug!("SQL: {}", sql);
        }
    }

    fn table_exists(&self) -> Result<bool> {
        // Table names are case-insensitive in SQLite
        let sql =
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE";
        self.log_sql(sql);
        let n: i64 = self
            .conn()
            .query_row(sql, params![self.table_name], |row| row.get(0))?;
        Ok(n > 0)
    }

    fn create_table(&self) -> Result<()> {
        let t = &self.table_name;
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {t} (
                TIME    INTEGER PRIMARY KEY NOT NULL,
                GAME_ID INTEGER NOT NULL,
                MACHINE TEXT    NOT NULL,
                SEQ     INTEGER NOT NULL,
                PRI     REAL    NOT NULL,
                REWARD  REAL    NOT NULL,
                CONTENT TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_{t}_pri ON {t} (PRI);
            CREATE INDEX IF NOT EXISTS idx_{t}_reward ON {t} (REWARD);",
            t = t
        );
        self.log_sql(&sql);

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute_batch(&sql)
            .with_context(|| format!("cannot create table {:?}", t))?;
        tx.commit()?;
        info!("Created table {:?}", t);
        Ok(())
    }

    fn append_inner(&self, record: &Record) -> Result<()> {
        if record.timestamp() == 0 {
            bail!("record has no timestamp");
        }
        let sql = format!(
            "INSERT INTO {} ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            self.table_name, COLUMNS
        );
        self.log_sql(&sql);

        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&sql)?;
        stmt.execute(params![
            i64::try_from(record.timestamp())?,
            i64::try_from(record.game_id())?,
            record.machine(),
            record.seq(),
            record.priority() as f64,
            record.reward() as f64,
            record.content(),
        ])
        .with_context(|| format!("cannot insert record {}", record.timestamp()))?;
        Ok(())
    }

    fn load_recent_inner(&self, max_n: usize) -> Result<Vec<Record>> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY TIME DESC LIMIT ?1",
            COLUMNS, self.table_name
        );
        self.log_sql(&sql);

        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&sql)?;
        let limit = i64::try_from(max_n).unwrap_or(i64::MAX);
        let records = stmt
            .query_map(params![limit], row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("cannot read table {:?}", self.table_name))?;
        Ok(records)
    }

    fn len_inner(&self) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.table_name);
        self.log_sql(&sql);
        let n: i64 = self.conn().query_row(&sql, [], |row| row.get(0))?;
        Ok(usize::try_from(n)?)
    }
}

impl DurableStore for SqliteStore {
    fn append(&self, record: &Record) -> Result<()> {
        self.last_error.track(self.append_inner(record))
    }

    fn load_recent(&self, max_n: usize) -> Result<Vec<Record>> {
        self.last_error.track(self.load_recent_inner(max_n))
    }

    fn len(&self) -> Result<usize> {
        self.last_error.track(self.len_inner())
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.get()
    }
}

/// Opens an [`EpisodeLog`] on the SQLite database given in `config`.
pub fn open_episode_log(config: EpisodeLogConfig) -> Result<EpisodeLog<SqliteStore>> {
    let store = SqliteStore::from_config(&config)?;
    EpisodeLog::new(store, config)
}

/// Table names are spliced into statements, so only `[A-Za-z0-9_]` is accepted.
fn check_table_name(table_name: &str) -> Result<(), EpisodeLogError> {
    let valid = table_name
        .chars()
        .next()
        .map_or(false, |c| c.is_ascii_alphabetic() || c == '_')
        && table_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(EpisodeLogError::InvalidTableName(table_name.to_string()))
    }
}

fn get_u64(row: &Row, ix: usize) -> rusqlite::Result<u64> {
    let v: i64 = row.get(ix)?;
    u64::try_from(v)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(ix, Type::Integer, Box::new(e)))
}

fn row_to_record(row: &Row) -> rusqlite::Result<Record> {
    let machine: String = row.get(2)?;
    let content: Option<String> = row.get(6)?;
    Ok(
        Record::new(get_u64(row, 1)?, machine, content.unwrap_or_default())
            .with_timestamp(get_u64(row, 0)?)
            .with_seq(row.get(3)?)
            .with_priority(row.get::<_, f64>(4)? as f32)
            .with_reward(row.get::<_, f64>(5)? as f32),
    )
}
