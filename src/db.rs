use std::{
    error::Error,
    fs,
    path::{Path, PathBuf},
};

use rusqlite::Connection;

type AnyResult<T> = Result<T, Box<dyn Error>>;

fn db_path(data_dir: &Path) -> AnyResult<PathBuf> {
    fs::create_dir_all(data_dir)?;
    Ok(data_dir.join("poisha.sqlite"))
}

pub fn open_connection(data_dir: &Path) -> AnyResult<Connection> {
    let path = db_path(data_dir)?;
    let conn = Connection::open(path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> AnyResult<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
        CREATE TABLE IF NOT EXISTS events (
          id TEXT PRIMARY KEY,
          title TEXT NOT NULL,
          description TEXT,
          start_date TEXT NOT NULL,
          end_date TEXT,
          start_time TEXT,
          is_all_day INTEGER NOT NULL DEFAULT 1,
          event_type TEXT NOT NULL DEFAULT 'PERSONAL',
          recurrence TEXT NOT NULL DEFAULT 'NONE',
          recurrence_days TEXT NOT NULL DEFAULT '[]',
          color TEXT,
          icon TEXT
        );
        CREATE TABLE IF NOT EXISTS loans (
          id TEXT PRIMARY KEY,
          name TEXT NOT NULL,
          provider TEXT NOT NULL,
          principal INTEGER NOT NULL,
          outstanding INTEGER NOT NULL,
          emi INTEGER,
          start_date TEXT NOT NULL,
          payment_day INTEGER,
          status TEXT NOT NULL DEFAULT 'ACTIVE'
        );
        CREATE TABLE IF NOT EXISTS debts (
          id TEXT PRIMARY KEY,
          kind TEXT NOT NULL,
          counterparty TEXT NOT NULL,
          amount INTEGER NOT NULL,
          start_date TEXT NOT NULL,
          due_date TEXT,
          status TEXT NOT NULL DEFAULT 'PENDING'
        );",
    )?;

    ensure_event_columns(conn)?;
    ensure_loan_columns(conn)?;
    Ok(())
}

fn ensure_event_columns(conn: &Connection) -> AnyResult<()> {
    if !table_has_column(conn, "events", "start_time")? {
        conn.execute("ALTER TABLE events ADD COLUMN start_time TEXT", [])?;
    }
    if !table_has_column(conn, "events", "recurrence_days")? {
        conn.execute(
            "ALTER TABLE events ADD COLUMN recurrence_days TEXT NOT NULL DEFAULT '[]'",
            [],
        )?;
    }
    Ok(())
}

fn ensure_loan_columns(conn: &Connection) -> AnyResult<()> {
    if !table_has_column(conn, "loans", "payment_day")? {
        conn.execute("ALTER TABLE loans ADD COLUMN payment_day INTEGER", [])?;
    }
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> AnyResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
