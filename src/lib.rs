mod calendar;
mod db;

use chrono::NaiveDate;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use calendar::{
    agenda_range, events_for_date, merged_events, month_grid, occurs_on,
    project_financial_events,
};
pub use db::{init_schema, open_connection};

use calendar::SYSTEM_EVENT_PREFIX;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start_date: String,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    pub is_all_day: bool,
    #[serde(rename = "type")]
    pub event_type: String,
    pub recurrence: String,
    #[serde(default)]
    pub recurrence_days: Vec<u32>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub is_system: bool,
    #[serde(default)]
    pub related_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub principal: i64,
    pub outstanding: i64,
    #[serde(default)]
    pub emi: Option<i64>,
    pub start_date: String,
    #[serde(default)]
    pub payment_day: Option<u32>,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Debt {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub counterparty: String,
    pub amount: i64,
    pub start_date: String,
    #[serde(default)]
    pub due_date: Option<String>,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct EventPayload {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start_date: String,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default = "default_all_day")]
    pub is_all_day: bool,
    #[serde(rename = "type", default = "default_event_type")]
    pub event_type: String,
    #[serde(default = "default_recurrence")]
    pub recurrence: String,
    #[serde(default)]
    pub recurrence_days: Vec<u32>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoanPayload {
    pub name: String,
    pub provider: String,
    pub principal: i64,
    #[serde(default)]
    pub outstanding: Option<i64>,
    #[serde(default)]
    pub emi: Option<i64>,
    pub start_date: String,
    #[serde(default)]
    pub payment_day: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct DebtPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub counterparty: String,
    pub amount: i64,
    pub start_date: String,
    #[serde(default)]
    pub due_date: Option<String>,
}

fn default_all_day() -> bool {
    true
}

fn default_event_type() -> String {
    "PERSONAL".to_string()
}

fn default_recurrence() -> String {
    "NONE".to_string()
}

fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn validate_date(label: &str, value: &str) -> Result<(), String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| format!("{} must be a valid YYYY-MM-DD date, got '{}'", label, value))
}

fn reject_system_id(event_id: &str) -> Result<(), String> {
    if event_id.starts_with(SYSTEM_EVENT_PREFIX) {
        return Err(
            "system events are generated from loans and debts and are read-only".to_string(),
        );
    }
    Ok(())
}

fn default_event_color(event_type: &str) -> &'static str {
    match event_type {
        "FINANCE" => "#10b981",
        "WORK" => "#3b82f6",
        "HEALTH" => "#f97316",
        "EDUCATION" => "#eab308",
        "HOLIDAY" => "#ef4444",
        _ => "#8b5cf6",
    }
}

fn default_event_icon(event_type: &str) -> &'static str {
    match event_type {
        "FINANCE" => "Banknote",
        "WORK" => "Briefcase",
        "HEALTH" => "Heart",
        "EDUCATION" => "Book",
        "HOLIDAY" => "Plane",
        _ => "Calendar",
    }
}

fn event_from_row(row: &rusqlite::Row) -> rusqlite::Result<CalendarEvent> {
    let all_day: i64 = row.get(6)?;
    let days_json: String = row.get(9)?;
    Ok(CalendarEvent {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        start_date: row.get(3)?,
        end_date: row.get(4)?,
        start_time: row.get(5)?,
        is_all_day: all_day != 0,
        event_type: row.get(7)?,
        recurrence: row.get(8)?,
        recurrence_days: serde_json::from_str(&days_json).unwrap_or_default(),
        color: row.get(10)?,
        icon: row.get(11)?,
        is_system: false,
        related_id: None,
    })
}

fn fetch_event(conn: &Connection, event_id: &str) -> Result<CalendarEvent, String> {
    conn.query_row(
        "SELECT id, title, description, start_date, end_date, start_time, is_all_day,
                event_type, recurrence, recurrence_days, color, icon
         FROM events WHERE id = ?1",
        [event_id],
        event_from_row,
    )
    .map_err(|err| err.to_string())
}

pub fn add_event(conn: &Connection, payload: EventPayload) -> Result<CalendarEvent, String> {
    validate_date("start_date", &payload.start_date)?;
    if let Some(end_date) = payload.end_date.as_deref() {
        validate_date("end_date", end_date)?;
    }

    let id = generate_id();
    let color = payload
        .color
        .unwrap_or_else(|| default_event_color(&payload.event_type).to_string());
    let icon = payload
        .icon
        .unwrap_or_else(|| default_event_icon(&payload.event_type).to_string());
    let days_json =
        serde_json::to_string(&payload.recurrence_days).map_err(|err| err.to_string())?;

    conn.execute(
        "INSERT INTO events (id, title, description, start_date, end_date, start_time,
                             is_all_day, event_type, recurrence, recurrence_days, color, icon)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            id,
            payload.title,
            payload.description,
            payload.start_date,
            payload.end_date,
            payload.start_time,
            payload.is_all_day as i64,
            payload.event_type,
            payload.recurrence,
            days_json,
            color,
            icon
        ],
    )
    .map_err(|err| err.to_string())?;

    fetch_event(conn, &id)
}

pub fn list_events(conn: &Connection) -> Result<Vec<CalendarEvent>, String> {
    let mut stmt = conn
        .prepare(
            "SELECT id, title, description, start_date, end_date, start_time, is_all_day,
                    event_type, recurrence, recurrence_days, color, icon
             FROM events ORDER BY start_date ASC",
        )
        .map_err(|err| err.to_string())?;

    let rows = stmt
        .query_map([], event_from_row)
        .map_err(|err| err.to_string())?;

    let mut events = Vec::new();
    for row in rows {
        events.push(row.map_err(|err| err.to_string())?);
    }

    Ok(events)
}

pub fn update_event(
    conn: &Connection,
    event_id: &str,
    payload: EventPayload,
) -> Result<CalendarEvent, String> {
    reject_system_id(event_id)?;
    validate_date("start_date", &payload.start_date)?;
    if let Some(end_date) = payload.end_date.as_deref() {
        validate_date("end_date", end_date)?;
    }

    let days_json =
        serde_json::to_string(&payload.recurrence_days).map_err(|err| err.to_string())?;
    let changed = conn
        .execute(
            "UPDATE events SET title = ?1, description = ?2, start_date = ?3, end_date = ?4,
                    start_time = ?5, is_all_day = ?6, event_type = ?7, recurrence = ?8,
                    recurrence_days = ?9, color = COALESCE(?10, color), icon = COALESCE(?11, icon)
             WHERE id = ?12",
            params![
                payload.title,
                payload.description,
                payload.start_date,
                payload.end_date,
                payload.start_time,
                payload.is_all_day as i64,
                payload.event_type,
                payload.recurrence,
                days_json,
                payload.color,
                payload.icon,
                event_id
            ],
        )
        .map_err(|err| err.to_string())?;
    if changed == 0 {
        return Err(format!("event '{}' not found", event_id));
    }

    fetch_event(conn, event_id)
}

pub fn delete_event(conn: &Connection, event_id: &str) -> Result<(), String> {
    reject_system_id(event_id)?;
    conn.execute("DELETE FROM events WHERE id = ?1", params![event_id])
        .map_err(|err| err.to_string())?;
    Ok(())
}

fn loan_from_row(row: &rusqlite::Row) -> rusqlite::Result<Loan> {
    Ok(Loan {
        id: row.get(0)?,
        name: row.get(1)?,
        provider: row.get(2)?,
        principal: row.get(3)?,
        outstanding: row.get(4)?,
        emi: row.get(5)?,
        start_date: row.get(6)?,
        payment_day: row.get(7)?,
        status: row.get(8)?,
    })
}

fn fetch_loan(conn: &Connection, loan_id: &str) -> Result<Loan, String> {
    conn.query_row(
        "SELECT id, name, provider, principal, outstanding, emi, start_date, payment_day, status
         FROM loans WHERE id = ?1",
        [loan_id],
        loan_from_row,
    )
    .map_err(|err| err.to_string())
}

pub fn add_loan(conn: &Connection, payload: LoanPayload) -> Result<Loan, String> {
    validate_date("start_date", &payload.start_date)?;
    if let Some(day) = payload.payment_day {
        if !(1..=31).contains(&day) {
            return Err("payment_day must be between 1 and 31".to_string());
        }
    }

    let id = generate_id();
    let outstanding = payload.outstanding.unwrap_or(payload.principal);
    conn.execute(
        "INSERT INTO loans (id, name, provider, principal, outstanding, emi, start_date, payment_day, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'ACTIVE')",
        params![
            id,
            payload.name,
            payload.provider,
            payload.principal,
            outstanding,
            payload.emi,
            payload.start_date,
            payload.payment_day
        ],
    )
    .map_err(|err| err.to_string())?;

    fetch_loan(conn, &id)
}

pub fn list_loans(conn: &Connection) -> Result<Vec<Loan>, String> {
    let mut stmt = conn
        .prepare(
            "SELECT id, name, provider, principal, outstanding, emi, start_date, payment_day, status
             FROM loans ORDER BY start_date ASC",
        )
        .map_err(|err| err.to_string())?;

    let rows = stmt
        .query_map([], loan_from_row)
        .map_err(|err| err.to_string())?;

    let mut loans = Vec::new();
    for row in rows {
        loans.push(row.map_err(|err| err.to_string())?);
    }

    Ok(loans)
}

pub fn close_loan(conn: &Connection, loan_id: &str) -> Result<Loan, String> {
    let changed = conn
        .execute(
            "UPDATE loans SET status = 'CLOSED' WHERE id = ?1",
            params![loan_id],
        )
        .map_err(|err| err.to_string())?;
    if changed == 0 {
        return Err(format!("loan '{}' not found", loan_id));
    }
    fetch_loan(conn, loan_id)
}

pub fn delete_loan(conn: &Connection, loan_id: &str) -> Result<(), String> {
    conn.execute("DELETE FROM loans WHERE id = ?1", params![loan_id])
        .map_err(|err| err.to_string())?;
    Ok(())
}

fn debt_from_row(row: &rusqlite::Row) -> rusqlite::Result<Debt> {
    Ok(Debt {
        id: row.get(0)?,
        kind: row.get(1)?,
        counterparty: row.get(2)?,
        amount: row.get(3)?,
        start_date: row.get(4)?,
        due_date: row.get(5)?,
        status: row.get(6)?,
    })
}

fn fetch_debt(conn: &Connection, debt_id: &str) -> Result<Debt, String> {
    conn.query_row(
        "SELECT id, kind, counterparty, amount, start_date, due_date, status
         FROM debts WHERE id = ?1",
        [debt_id],
        debt_from_row,
    )
    .map_err(|err| err.to_string())
}

pub fn add_debt(conn: &Connection, payload: DebtPayload) -> Result<Debt, String> {
    if payload.kind != "PAYABLE" && payload.kind != "RECEIVABLE" {
        return Err("debt type must be PAYABLE or RECEIVABLE".to_string());
    }
    validate_date("start_date", &payload.start_date)?;
    if let Some(due_date) = payload.due_date.as_deref() {
        validate_date("due_date", due_date)?;
    }

    let id = generate_id();
    conn.execute(
        "INSERT INTO debts (id, kind, counterparty, amount, start_date, due_date, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'PENDING')",
        params![
            id,
            payload.kind,
            payload.counterparty,
            payload.amount,
            payload.start_date,
            payload.due_date
        ],
    )
    .map_err(|err| err.to_string())?;

    fetch_debt(conn, &id)
}

pub fn list_debts(conn: &Connection) -> Result<Vec<Debt>, String> {
    let mut stmt = conn
        .prepare(
            "SELECT id, kind, counterparty, amount, start_date, due_date, status
             FROM debts ORDER BY start_date ASC",
        )
        .map_err(|err| err.to_string())?;

    let rows = stmt
        .query_map([], debt_from_row)
        .map_err(|err| err.to_string())?;

    let mut debts = Vec::new();
    for row in rows {
        debts.push(row.map_err(|err| err.to_string())?);
    }

    Ok(debts)
}

pub fn settle_debt(conn: &Connection, debt_id: &str) -> Result<Debt, String> {
    let changed = conn
        .execute(
            "UPDATE debts SET status = 'PAID' WHERE id = ?1",
            params![debt_id],
        )
        .map_err(|err| err.to_string())?;
    if changed == 0 {
        return Err(format!("debt '{}' not found", debt_id));
    }
    fetch_debt(conn, debt_id)
}

pub fn delete_debt(conn: &Connection, debt_id: &str) -> Result<(), String> {
    conn.execute("DELETE FROM debts WHERE id = ?1", params![debt_id])
        .map_err(|err| err.to_string())?;
    Ok(())
}

/// User events merged with system events projected around `pivot_date`.
pub fn calendar_view(conn: &Connection, pivot_date: &str) -> Result<Vec<CalendarEvent>, String> {
    let events = list_events(conn)?;
    let loans = list_loans(conn)?;
    let debts = list_debts(conn)?;
    Ok(merged_events(&events, &loans, &debts, pivot_date))
}

/// All events occurring on `date`, with `date` doubling as the pivot.
pub fn day_events(conn: &Connection, date: &str) -> Result<Vec<CalendarEvent>, String> {
    let merged = calendar_view(conn, date)?;
    Ok(merged.into_iter().filter(|e| occurs_on(e, date)).collect())
}

/// Dashboard agenda: occurrences per day for `days` days starting at `from_date`.
pub fn upcoming_events(
    conn: &Connection,
    from_date: &str,
    days: u32,
) -> Result<Vec<(String, Vec<CalendarEvent>)>, String> {
    let from = NaiveDate::parse_from_str(from_date, "%Y-%m-%d").map_err(|_| {
        format!(
            "from_date must be a valid YYYY-MM-DD date, got '{}'",
            from_date
        )
    })?;
    let to = from
        .checked_add_days(chrono::Days::new(u64::from(days)))
        .ok_or_else(|| "date overflow".to_string())?;

    let merged = calendar_view(conn, from_date)?;
    let agenda = agenda_range(&merged, from_date, &to.format("%Y-%m-%d").to_string());
    Ok(agenda
        .into_iter()
        .map(|(date, hits)| (date, hits.into_iter().cloned().collect()))
        .collect())
}
