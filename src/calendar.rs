use std::collections::HashSet;

use chrono::{Datelike, NaiveDate};

use crate::{CalendarEvent, Debt, Loan};

pub(crate) const SYSTEM_EVENT_PREFIX: &str = "sys_";

const FINANCE_COLOR: &str = "#10b981";
const PAYABLE_COLOR: &str = "#ef4444";

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

fn shift_month(year: i32, month: u32, offset: i32) -> (i32, u32) {
    let index = year * 12 + month as i32 - 1 + offset;
    (index.div_euclid(12), (index.rem_euclid(12) + 1) as u32)
}

/// Whether `event` has an occurrence on `date` (both `YYYY-MM-DD`).
///
/// Unparseable `date` or `start_date` never occurs; an unparseable
/// `end_date` is treated as no upper bound. Unrecognized recurrence
/// values fall back to exact-date matching.
pub fn occurs_on(event: &CalendarEvent, date: &str) -> bool {
    let Some(current) = parse_date(date) else {
        return false;
    };
    let Some(start) = parse_date(&event.start_date) else {
        return false;
    };
    if current < start {
        return false;
    }
    if let Some(end) = event.end_date.as_deref().and_then(parse_date) {
        if current > end {
            return false;
        }
    }

    match event.recurrence.as_str() {
        "DAILY" => true,
        "WEEKLY" => {
            let weekday = current.weekday().num_days_from_sunday();
            if event.recurrence_days.is_empty() {
                start.weekday().num_days_from_sunday() == weekday
            } else {
                event.recurrence_days.contains(&weekday)
            }
        }
        // Day 31 anchors simply skip shorter months, no clamping.
        "MONTHLY" => current.day() == start.day(),
        "YEARLY" => current.month() == start.month() && current.day() == start.day(),
        _ => current == start,
    }
}

/// Synthesizes calendar events from the current loan/debt state.
///
/// Loan installments cover the four months pivot-1..pivot+2 with the
/// payment day clamped to each month's length; installments always land
/// somewhere, unlike MONTHLY user events. Pending debts with a due date
/// yield one event each regardless of the pivot.
pub fn project_financial_events(
    loans: &[Loan],
    debts: &[Debt],
    pivot_date: &str,
) -> Vec<CalendarEvent> {
    let mut events: Vec<CalendarEvent> = Vec::new();

    if let Some(pivot) = parse_date(pivot_date) {
        for loan in loans.iter().filter(|l| l.status == "ACTIVE") {
            let Some(start) = parse_date(&loan.start_date) else {
                continue;
            };
            let pay_day = match loan.payment_day {
                Some(day) if (1..=31).contains(&day) => day,
                _ => start.day(),
            };

            for offset in -1..=2 {
                let (year, month) = shift_month(pivot.year(), pivot.month(), offset);
                let day = pay_day.min(days_in_month(year, month));
                let Some(due) = NaiveDate::from_ymd_opt(year, month, day) else {
                    continue;
                };
                if due < start {
                    continue;
                }
                let due_str = format_date(due);
                let event_id = format!("{}loan_{}_{}", SYSTEM_EVENT_PREFIX, loan.id, due_str);
                if events.iter().any(|e| e.id == event_id) {
                    continue;
                }
                events.push(CalendarEvent {
                    id: event_id,
                    title: format!("EMI: {}", loan.name),
                    description: Some(format!("Provider: {}", loan.provider)),
                    start_date: due_str,
                    end_date: None,
                    start_time: None,
                    is_all_day: true,
                    event_type: "FINANCE".to_string(),
                    recurrence: "NONE".to_string(),
                    recurrence_days: Vec::new(),
                    color: Some(FINANCE_COLOR.to_string()),
                    icon: Some("CreditCard".to_string()),
                    is_system: true,
                    related_id: Some(loan.id.clone()),
                });
            }
        }
    }

    for debt in debts.iter().filter(|d| d.status == "PENDING") {
        let Some(due_date) = debt.due_date.clone() else {
            continue;
        };
        let event_id = format!("{}debt_{}", SYSTEM_EVENT_PREFIX, debt.id);
        if events.iter().any(|e| e.id == event_id) {
            continue;
        }
        let payable = debt.kind == "PAYABLE";
        events.push(CalendarEvent {
            id: event_id,
            title: format!(
                "{}: {}",
                if payable { "Pay" } else { "Collect" },
                debt.counterparty
            ),
            description: Some(format!("Amount: {}", debt.amount)),
            start_date: due_date,
            end_date: None,
            start_time: None,
            is_all_day: true,
            event_type: "FINANCE".to_string(),
            recurrence: "NONE".to_string(),
            recurrence_days: Vec::new(),
            color: Some(if payable { PAYABLE_COLOR } else { FINANCE_COLOR }.to_string()),
            icon: Some("Wallet".to_string()),
            is_system: true,
            related_id: Some(debt.id.clone()),
        });
    }

    events
}

/// User events merged with freshly projected system events, keyed by id.
/// User events win on id collision. Result is sorted by start date
/// (stable, so insertion order breaks ties).
pub fn merged_events(
    user_events: &[CalendarEvent],
    loans: &[Loan],
    debts: &[Debt],
    pivot_date: &str,
) -> Vec<CalendarEvent> {
    let mut merged: Vec<CalendarEvent> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for event in user_events {
        if seen.insert(event.id.clone()) {
            merged.push(event.clone());
        }
    }
    for event in project_financial_events(loans, debts, pivot_date) {
        if seen.insert(event.id.clone()) {
            merged.push(event);
        }
    }

    merged.sort_by(|a, b| a.start_date.cmp(&b.start_date));
    merged
}

pub fn events_for_date<'a>(events: &'a [CalendarEvent], date: &str) -> Vec<&'a CalendarEvent> {
    events.iter().filter(|e| occurs_on(e, date)).collect()
}

pub fn month_grid<'a>(
    events: &'a [CalendarEvent],
    year: i32,
    month: u32,
) -> Vec<(String, Vec<&'a CalendarEvent>)> {
    let mut grid = Vec::new();
    for day in 1..=days_in_month(year, month) {
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            let date_str = format_date(date);
            let hits = events_for_date(events, &date_str);
            grid.push((date_str, hits));
        }
    }
    grid
}

pub fn agenda_range<'a>(
    events: &'a [CalendarEvent],
    from: &str,
    to: &str,
) -> Vec<(String, Vec<&'a CalendarEvent>)> {
    let (Some(mut current), Some(end)) = (parse_date(from), parse_date(to)) else {
        return Vec::new();
    };
    let mut agenda = Vec::new();
    while current <= end {
        let date_str = format_date(current);
        let hits = events_for_date(events, &date_str);
        if !hits.is_empty() {
            agenda.push((date_str, hits));
        }
        let Some(next) = current.succ_opt() else {
            break;
        };
        current = next;
    }
    agenda
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_event(id: &str, start_date: &str, recurrence: &str) -> CalendarEvent {
        CalendarEvent {
            id: id.to_string(),
            title: format!("Event {}", id),
            description: None,
            start_date: start_date.to_string(),
            end_date: None,
            start_time: None,
            is_all_day: true,
            event_type: "PERSONAL".to_string(),
            recurrence: recurrence.to_string(),
            recurrence_days: Vec::new(),
            color: None,
            icon: None,
            is_system: false,
            related_id: None,
        }
    }

    fn active_loan(id: &str, start_date: &str, payment_day: Option<u32>) -> Loan {
        Loan {
            id: id.to_string(),
            name: format!("Loan {}", id),
            provider: "City Bank".to_string(),
            principal: 100_000,
            outstanding: 80_000,
            emi: Some(5_000),
            start_date: start_date.to_string(),
            payment_day,
            status: "ACTIVE".to_string(),
        }
    }

    fn pending_debt(id: &str, kind: &str, due_date: Option<&str>) -> Debt {
        Debt {
            id: id.to_string(),
            kind: kind.to_string(),
            counterparty: "Rahim".to_string(),
            amount: 2_500,
            start_date: "2024-01-01".to_string(),
            due_date: due_date.map(str::to_string),
            status: "PENDING".to_string(),
        }
    }

    #[test]
    fn none_matches_exact_date_only() {
        let event = user_event("e1", "2024-03-15", "NONE");
        assert!(occurs_on(&event, "2024-03-15"));
        assert!(!occurs_on(&event, "2024-03-14"));
        assert!(!occurs_on(&event, "2024-03-16"));
    }

    #[test]
    fn daily_bounded_by_start_and_end() {
        let mut event = user_event("e1", "2024-01-01", "DAILY");
        event.end_date = Some("2024-01-05".to_string());
        assert!(!occurs_on(&event, "2023-12-31"));
        assert!(occurs_on(&event, "2024-01-01"));
        assert!(occurs_on(&event, "2024-01-05"));
        assert!(!occurs_on(&event, "2024-01-06"));
    }

    #[test]
    fn weekly_with_explicit_days() {
        // 2024-01-01 is a Monday.
        let mut event = user_event("e1", "2024-01-01", "WEEKLY");
        event.recurrence_days = vec![1, 3, 5];
        assert!(occurs_on(&event, "2024-01-01")); // Mon
        assert!(!occurs_on(&event, "2024-01-02")); // Tue
        assert!(occurs_on(&event, "2024-01-03")); // Wed
        assert!(occurs_on(&event, "2024-01-05")); // Fri
        assert!(!occurs_on(&event, "2024-01-06")); // Sat
        assert!(!occurs_on(&event, "2024-01-07")); // Sun
        assert!(occurs_on(&event, "2024-02-12")); // a later Monday
    }

    #[test]
    fn weekly_without_days_uses_anchor_weekday() {
        // 2024-01-02 is a Tuesday.
        let event = user_event("e1", "2024-01-02", "WEEKLY");
        assert!(occurs_on(&event, "2024-01-02"));
        assert!(occurs_on(&event, "2024-01-09"));
        assert!(!occurs_on(&event, "2024-01-08"));
    }

    #[test]
    fn monthly_skips_short_months() {
        let event = user_event("e1", "2024-01-31", "MONTHLY");
        for day in 1..=29 {
            assert!(!occurs_on(&event, &format!("2024-02-{:02}", day)));
        }
        assert!(occurs_on(&event, "2024-03-31"));
        assert!(!occurs_on(&event, "2024-04-30"));
        assert!(occurs_on(&event, "2024-05-31"));
    }

    #[test]
    fn yearly_skips_non_leap_years() {
        let event = user_event("e1", "2024-02-29", "YEARLY");
        assert!(occurs_on(&event, "2024-02-29"));
        assert!(!occurs_on(&event, "2025-02-28"));
        assert!(!occurs_on(&event, "2025-03-01"));
        assert!(occurs_on(&event, "2028-02-29"));
    }

    #[test]
    fn unknown_recurrence_falls_back_to_exact_match() {
        let event = user_event("e1", "2024-03-15", "FORTNIGHTLY");
        assert!(occurs_on(&event, "2024-03-15"));
        assert!(!occurs_on(&event, "2024-03-29"));
    }

    #[test]
    fn malformed_dates_never_occur() {
        let event = user_event("e1", "2024-13-40", "DAILY");
        assert!(!occurs_on(&event, "2024-03-15"));

        let event = user_event("e2", "2024-03-15", "NONE");
        assert!(!occurs_on(&event, "not-a-date"));
    }

    #[test]
    fn loan_window_clamps_payment_day() {
        let loans = vec![active_loan("L9", "2024-01-15", Some(31))];
        let events = project_financial_events(&loans, &[], "2024-02-01");

        let dates: Vec<&str> = events.iter().map(|e| e.start_date.as_str()).collect();
        assert_eq!(dates, vec!["2024-01-31", "2024-02-29", "2024-03-31", "2024-04-30"]);
        assert!(events.iter().all(|e| e.is_system));
        assert!(events.iter().all(|e| e.related_id.as_deref() == Some("L9")));
    }

    #[test]
    fn loan_events_excluded_before_start_date() {
        let loans = vec![active_loan("L2", "2024-06-10", Some(5))];
        let events = project_financial_events(&loans, &[], "2024-06-01");

        assert!(events.iter().all(|e| e.start_date.as_str() >= "2024-06-10"));
        let dates: Vec<&str> = events.iter().map(|e| e.start_date.as_str()).collect();
        assert_eq!(dates, vec!["2024-07-05", "2024-08-05"]);
    }

    #[test]
    fn loan_payment_day_defaults_to_start_day() {
        let loans = vec![active_loan("L3", "2024-03-10", None)];
        let events = project_financial_events(&loans, &[], "2024-04-01");
        assert!(events.iter().all(|e| e.start_date.ends_with("-10")));

        // Out-of-range payment day falls back the same way.
        let loans = vec![active_loan("L4", "2024-03-10", Some(0))];
        let events = project_financial_events(&loans, &[], "2024-04-01");
        assert!(events.iter().all(|e| e.start_date.ends_with("-10")));
    }

    #[test]
    fn closed_loans_and_paid_debts_are_ignored() {
        let mut loan = active_loan("L5", "2024-01-05", Some(5));
        loan.status = "CLOSED".to_string();
        let mut debt = pending_debt("D5", "PAYABLE", Some("2024-05-01"));
        debt.status = "PAID".to_string();

        let events = project_financial_events(&[loan], &[debt], "2024-03-01");
        assert!(events.is_empty());
    }

    #[test]
    fn loan_with_malformed_start_date_is_skipped() {
        let loans = vec![
            active_loan("L6", "2024-13-40", Some(5)),
            active_loan("L7", "2024-01-05", Some(5)),
        ];
        let events = project_financial_events(&loans, &[], "2024-03-01");
        assert_eq!(events.len(), 4);
        assert!(events.iter().all(|e| e.related_id.as_deref() == Some("L7")));
    }

    #[test]
    fn malformed_pivot_still_emits_debt_events() {
        let loans = vec![active_loan("L8", "2024-01-05", Some(5))];
        let debts = vec![pending_debt("D8", "PAYABLE", Some("2024-05-01"))];
        let events = project_financial_events(&loans, &debts, "garbage");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "sys_debt_D8");
    }

    #[test]
    fn debt_event_id_is_stable_across_pivots() {
        let debts = vec![pending_debt("D1", "PAYABLE", Some("2024-05-01"))];
        let a = project_financial_events(&[], &debts, "2024-01-01");
        let b = project_financial_events(&[], &debts, "2024-09-01");
        assert_eq!(a, b);
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].id, "sys_debt_D1");
        assert_eq!(a[0].start_date, "2024-05-01");
    }

    #[test]
    fn debt_without_due_date_is_skipped() {
        let debts = vec![pending_debt("D2", "PAYABLE", None)];
        assert!(project_financial_events(&[], &debts, "2024-01-01").is_empty());
    }

    #[test]
    fn debt_kind_drives_title_and_color() {
        let debts = vec![
            pending_debt("D3", "PAYABLE", Some("2024-05-01")),
            pending_debt("D4", "RECEIVABLE", Some("2024-05-02")),
        ];
        let events = project_financial_events(&[], &debts, "2024-05-01");
        assert_eq!(events[0].title, "Pay: Rahim");
        assert_eq!(events[0].color.as_deref(), Some("#ef4444"));
        assert_eq!(events[1].title, "Collect: Rahim");
        assert_eq!(events[1].color.as_deref(), Some("#10b981"));
    }

    #[test]
    fn merge_is_idempotent() {
        let user = vec![user_event("u1", "2024-03-02", "NONE")];
        let loans = vec![active_loan("L1", "2024-01-05", Some(5))];
        let debts = vec![pending_debt("D1", "PAYABLE", Some("2024-03-20"))];

        let a = merged_events(&user, &loans, &debts, "2024-03-01");
        let b = merged_events(&user, &loans, &debts, "2024-03-01");
        assert_eq!(a, b);
    }

    #[test]
    fn merge_prefers_user_events_on_id_collision() {
        let mut shadow = user_event("sys_debt_D1", "2024-03-20", "NONE");
        shadow.title = "My own note".to_string();
        let debts = vec![pending_debt("D1", "PAYABLE", Some("2024-03-20"))];

        let merged = merged_events(&[shadow], &[], &debts, "2024-03-01");
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].title, "My own note");
        assert!(!merged[0].is_system);
    }

    #[test]
    fn merge_sorts_by_start_date() {
        let user = vec![
            user_event("u1", "2024-03-25", "NONE"),
            user_event("u2", "2024-03-01", "NONE"),
        ];
        let merged = merged_events(&user, &[], &[], "2024-03-01");
        let dates: Vec<&str> = merged.iter().map(|e| e.start_date.as_str()).collect();
        assert_eq!(dates, vec!["2024-03-01", "2024-03-25"]);
    }

    #[test]
    fn end_to_end_projection_scenario() {
        let loans = vec![active_loan("L1", "2024-01-05", Some(5))];
        let debts = vec![pending_debt("D1", "PAYABLE", Some("2024-03-20"))];

        let merged = merged_events(&[], &loans, &debts, "2024-03-01");
        let dates: Vec<&str> = merged.iter().map(|e| e.start_date.as_str()).collect();
        assert_eq!(
            dates,
            vec!["2024-02-05", "2024-03-05", "2024-03-20", "2024-04-05", "2024-05-05"]
        );

        let ids: HashSet<&str> = merged.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids.len(), merged.len());
        assert!(ids.contains("sys_debt_D1"));
    }

    #[test]
    fn month_grid_covers_every_day() {
        let events = vec![user_event("u1", "2024-02-10", "DAILY")];
        let grid = month_grid(&events, 2024, 2);
        assert_eq!(grid.len(), 29);
        assert_eq!(grid[0].0, "2024-02-01");
        assert!(grid[0].1.is_empty());
        assert_eq!(grid[9].0, "2024-02-10");
        assert_eq!(grid[9].1.len(), 1);
        assert_eq!(grid[28].1.len(), 1);
    }

    #[test]
    fn agenda_range_keeps_only_days_with_events() {
        let events = vec![
            user_event("u1", "2024-03-10", "NONE"),
            user_event("u2", "2024-03-12", "NONE"),
        ];
        let agenda = agenda_range(&events, "2024-03-09", "2024-03-13");
        let days: Vec<&str> = agenda.iter().map(|(d, _)| d.as_str()).collect();
        assert_eq!(days, vec!["2024-03-10", "2024-03-12"]);
    }

    #[test]
    fn agenda_range_with_malformed_bounds_is_empty() {
        let events = vec![user_event("u1", "2024-03-10", "DAILY")];
        assert!(agenda_range(&events, "junk", "2024-03-13").is_empty());
    }

    #[test]
    fn shift_month_handles_year_boundaries() {
        assert_eq!(shift_month(2024, 1, -1), (2023, 12));
        assert_eq!(shift_month(2024, 12, 2), (2025, 2));
        assert_eq!(shift_month(2024, 6, 0), (2024, 6));
    }

    #[test]
    fn days_in_month_knows_leap_years() {
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2025, 2), 28);
        assert_eq!(days_in_month(2024, 4), 30);
        assert_eq!(days_in_month(2024, 12), 31);
    }
}
