use crate::attendance;
use crate::error::{EngineError, EngineResult};
use crate::store::{Store, StudentFilter};
use chrono::Month;
use rusqlite::Connection;
use serde::Serialize;
use std::str::FromStr;
use tracing::debug;

/// Which attendance rows define the working days of a month.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkingDaysScope {
    /// Any date with a record anywhere in the store.
    #[default]
    All,
    /// Only dates with a record for a student of the reported class.
    Class,
}

impl FromStr for WorkingDaysScope {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" | "global" => Ok(WorkingDaysScope::All),
            "class" => Ok(WorkingDaysScope::Class),
            other => Err(EngineError::InvalidInput(format!(
                "working days scope must be all or class, got {:?}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyRow {
    pub student_id: i64,
    pub name: String,
    pub total_working_days: u32,
    pub recorded: u32,
    pub present: u32,
    pub absent: u32,
    pub percentage: f64,
    pub percentage_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyReport {
    pub class_id: i64,
    pub class_name: String,
    pub year: i32,
    pub month: u32,
    pub scope: WorkingDaysScope,
    pub total_working_days: u32,
    pub rows: Vec<MonthlyRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearlySummary {
    pub student_id: i64,
    pub student_name: String,
    pub year: i32,
    pub total: u32,
    pub present: u32,
    pub absent: u32,
    pub percentage: f64,
    pub percentage_text: String,
}

/// `numerator / denominator * 100`, or 0 when there is nothing to divide by.
pub fn percentage(numerator: u32, denominator: u32) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    (numerator as f64 / denominator as f64 * 100.0).clamp(0.0, 100.0)
}

pub fn format_percentage(p: f64) -> String {
    format!("{:.2}%", p)
}

/// Accepts `1..=12`, a full English month name, or its three-letter abbreviation.
pub fn parse_month(raw: &str) -> EngineResult<u32> {
    let t = raw.trim();
    if let Ok(n) = t.parse::<u32>() {
        if (1..=12).contains(&n) {
            return Ok(n);
        }
        return Err(EngineError::InvalidInput(
            "month must be between 1 and 12".to_string(),
        ));
    }
    Month::from_str(t)
        .map(|m| m.number_from_month())
        .map_err(|_| EngineError::InvalidInput(format!("unknown month {:?}", raw)))
}

fn year_key(year: i32) -> EngineResult<String> {
    if !attendance::YEAR_RANGE.contains(&year) {
        return Err(EngineError::InvalidInput(format!(
            "year out of range: {}",
            year
        )));
    }
    Ok(format!("{:04}", year))
}

fn working_days(
    conn: &Connection,
    scope: WorkingDaysScope,
    class_id: i64,
    year: &str,
    month: &str,
) -> rusqlite::Result<u32> {
    match scope {
        WorkingDaysScope::All => conn.query_row(
            "SELECT COUNT(DISTINCT date)
             FROM attendance
             WHERE strftime('%Y', date) = ? AND strftime('%m', date) = ?",
            (year, month),
            |r| r.get(0),
        ),
        WorkingDaysScope::Class => conn.query_row(
            "SELECT COUNT(DISTINCT a.date)
             FROM attendance a
             JOIN students s ON s.id = a.student_id
             WHERE s.class_id = ? AND strftime('%Y', a.date) = ? AND strftime('%m', a.date) = ?",
            (class_id, year, month),
            |r| r.get(0),
        ),
    }
}

/// Per-student attendance for one month of a class, ordered by student name.
pub fn class_monthly_report(
    store: &Store,
    class_name: &str,
    year: i32,
    month: u32,
    scope: WorkingDaysScope,
) -> EngineResult<MonthlyReport> {
    if !(1..=12).contains(&month) {
        return Err(EngineError::InvalidInput(
            "month must be between 1 and 12".to_string(),
        ));
    }
    let class_name = class_name.trim();
    let class_id = store
        .class_id_by_name(class_name)?
        .ok_or_else(|| EngineError::not_found("class", class_name))?;

    let mut students = store.list_students(StudentFilter::Class(class_id))?;
    if students.is_empty() {
        return Err(EngineError::NoStudents(class_name.to_string()));
    }
    students.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

    let conn = store.conn();
    let y = year_key(year)?;
    let m = format!("{:02}", month);
    let total_working_days = working_days(conn, scope, class_id, &y, &m)?;

    let mut counts = conn.prepare(
        "SELECT COUNT(*),
                COALESCE(SUM(CASE WHEN status = 'Present' THEN 1 ELSE 0 END), 0)
         FROM attendance
         WHERE student_id = ? AND strftime('%Y', date) = ? AND strftime('%m', date) = ?",
    )?;

    let mut rows = Vec::with_capacity(students.len());
    for student in students {
        let (recorded, present): (u32, u32) =
            counts.query_row((student.id, &y, &m), |r| Ok((r.get(0)?, r.get(1)?)))?;
        let pct = percentage(present, total_working_days);
        rows.push(MonthlyRow {
            student_id: student.id,
            name: student.name,
            total_working_days,
            recorded,
            present,
            absent: total_working_days.saturating_sub(present),
            percentage: pct,
            percentage_text: format_percentage(pct),
        });
    }

    debug!(
        class_id,
        year,
        month,
        ?scope,
        total_working_days,
        students = rows.len(),
        "monthly report computed"
    );
    Ok(MonthlyReport {
        class_id,
        class_name: class_name.to_string(),
        year,
        month,
        scope,
        total_working_days,
        rows,
    })
}

/// Recorded days and presents for one student over a calendar year.
pub fn student_yearly_summary(store: &Store, student_id: i64, year: i32) -> EngineResult<YearlySummary> {
    let student = store.get_student(student_id)?;
    let y = year_key(year)?;
    let (total, present): (u32, u32) = store.conn().query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(CASE WHEN status = 'Present' THEN 1 ELSE 0 END), 0)
         FROM attendance
         WHERE student_id = ? AND strftime('%Y', date) = ?",
        (student_id, &y),
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    let pct = percentage(present, total);
    debug!(student_id, year, total, present, "yearly summary computed");
    Ok(YearlySummary {
        student_id,
        student_name: student.name,
        year,
        total,
        present,
        absent: total.saturating_sub(present),
        percentage: pct,
        percentage_text: format_percentage(pct),
    })
}
