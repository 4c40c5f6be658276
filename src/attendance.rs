use crate::error::{EngineError, EngineResult};
use crate::store::{self, Store, StudentFilter};
use chrono::{Datelike, NaiveDate};
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use tracing::{debug, info};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Years a stored date or a report key can carry: four digits, no sign.
pub const YEAR_RANGE: RangeInclusive<i32> = 0..=9999;

/// Deserialized with the same lenient parse as `FromStr`; always serialized
/// as `Present` or `Absent`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum AttendanceStatus {
    #[default]
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Absent => "Absent",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            AttendanceStatus::Present => AttendanceStatus::Absent,
            AttendanceStatus::Absent => AttendanceStatus::Present,
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "present" => Ok(AttendanceStatus::Present),
            "absent" => Ok(AttendanceStatus::Absent),
            other => Err(EngineError::InvalidInput(format!(
                "status must be Present or Absent, got {:?}",
                other
            ))),
        }
    }
}

impl TryFrom<String> for AttendanceStatus {
    type Error = EngineError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

pub fn parse_date(raw: &str) -> EngineResult<NaiveDate> {
    let bad = || EngineError::InvalidInput(format!("date must be yyyy-mm-dd, got {:?}", raw));
    let date = NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).map_err(|_| bad())?;
    if !YEAR_RANGE.contains(&date.year()) {
        return Err(bad());
    }
    Ok(date)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceEntry {
    pub student_id: i64,
    pub status: AttendanceStatus,
}

impl AttendanceEntry {
    pub fn new(student_id: i64, status: AttendanceStatus) -> Self {
        AttendanceEntry { student_id, status }
    }
}

/// A section's students prepared for marking on one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterRow {
    pub student_id: i64,
    pub name: String,
    pub status: AttendanceStatus,
    pub saved: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    pub inserted: usize,
    pub updated: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecordRow {
    pub id: i64,
    pub student_id: i64,
    pub student_name: String,
    pub class_name: String,
    pub section_name: String,
    pub date: String,
    pub status: AttendanceStatus,
}

fn status_from_sql(raw: String) -> rusqlite::Result<AttendanceStatus> {
    raw.parse::<AttendanceStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            e.to_string().into(),
        )
    })
}

/// Sets `status` on every row whose student is in `selected`. Pure; no storage access.
pub fn apply_status(
    mut rows: Vec<RosterRow>,
    selected: &[i64],
    status: AttendanceStatus,
) -> Vec<RosterRow> {
    let selected: HashSet<i64> = selected.iter().copied().collect();
    for row in rows.iter_mut().filter(|r| selected.contains(&r.student_id)) {
        row.status = status;
    }
    rows
}

/// Flips the status of `student_id`'s row; other rows are returned as given.
pub fn toggle_status(mut rows: Vec<RosterRow>, student_id: i64) -> Vec<RosterRow> {
    for row in rows.iter_mut().filter(|r| r.student_id == student_id) {
        row.status = row.status.toggled();
    }
    rows
}

/// Students of a section ordered by name. Each carries the status saved for
/// `date`, or Present when nothing is saved yet.
pub fn load_roster(store: &Store, section_id: i64, date: NaiveDate) -> EngineResult<Vec<RosterRow>> {
    store.get_section(section_id)?;
    let day = date.format(DATE_FORMAT).to_string();
    let conn = store.conn();
    let mut lookup =
        conn.prepare("SELECT status FROM attendance WHERE student_id = ? AND date = ? LIMIT 1")?;

    let mut rows = Vec::new();
    for student in store.list_students(StudentFilter::Section(section_id))? {
        let saved: Option<String> = lookup
            .query_row((student.id, &day), |r| r.get(0))
            .optional()?;
        let (status, saved) = match saved {
            Some(raw) => (status_from_sql(raw)?, true),
            None => (AttendanceStatus::default(), false),
        };
        rows.push(RosterRow {
            student_id: student.id,
            name: student.name,
            status,
            saved,
        });
    }
    debug!(section_id, date = %day, count = rows.len(), "roster loaded");
    Ok(rows)
}

/// Writes one record per (student, date), updating an existing record in place.
///
/// The batch is all-or-nothing: an unknown student or a storage fault rolls
/// back every row written so far.
pub fn save_attendance(
    store: &Store,
    date: NaiveDate,
    entries: &[AttendanceEntry],
) -> EngineResult<SaveOutcome> {
    let day = date.format(DATE_FORMAT).to_string();
    let tx = store.conn().unchecked_transaction()?;
    let mut outcome = SaveOutcome::default();
    {
        let mut student_exists = tx.prepare("SELECT 1 FROM students WHERE id = ?")?;
        let mut find = tx.prepare("SELECT id FROM attendance WHERE student_id = ? AND date = ?")?;
        let mut update = tx.prepare("UPDATE attendance SET status = ? WHERE id = ?")?;
        let mut insert =
            tx.prepare("INSERT INTO attendance(student_id, date, status) VALUES(?, ?, ?)")?;

        for entry in entries {
            let exists = student_exists
                .query_row([entry.student_id], |r| r.get::<_, i64>(0))
                .optional()?
                .is_some();
            if !exists {
                return Err(EngineError::not_found("student", entry.student_id));
            }
            let existing: Option<i64> = find
                .query_row((entry.student_id, &day), |r| r.get(0))
                .optional()?;
            match existing {
                Some(record_id) => {
                    update.execute((entry.status.as_str(), record_id))?;
                    outcome.updated += 1;
                }
                None => {
                    insert.execute((entry.student_id, &day, entry.status.as_str()))?;
                    outcome.inserted += 1;
                }
            }
        }
    }
    tx.commit()?;
    info!(
        date = %day,
        inserted = outcome.inserted,
        updated = outcome.updated,
        "attendance saved"
    );
    Ok(outcome)
}

pub fn list_records(store: &Store) -> EngineResult<Vec<AttendanceRecordRow>> {
    let mut stmt = store.conn().prepare(
        "SELECT a.id, s.id, s.name, c.class_name, se.section_name, a.date, a.status
         FROM attendance a
         JOIN students s ON a.student_id = s.id
         JOIN classes c ON s.class_id = c.id
         JOIN sections se ON s.section_id = se.id
         ORDER BY a.date DESC, c.class_name, se.section_name, s.name",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(AttendanceRecordRow {
                id: r.get(0)?,
                student_id: r.get(1)?,
                student_name: r.get(2)?,
                class_name: r.get(3)?,
                section_name: r.get(4)?,
                date: r.get(5)?,
                status: status_from_sql(r.get(6)?)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn set_record_status(
    store: &Store,
    record_id: i64,
    status: AttendanceStatus,
) -> EngineResult<()> {
    let changed = store.conn().execute(
        "UPDATE attendance SET status = ? WHERE id = ?",
        (status.as_str(), record_id),
    )?;
    if changed == 0 {
        return Err(EngineError::not_found("attendance record", record_id));
    }
    info!(record_id, %status, "attendance record updated");
    Ok(())
}

pub fn delete_record(store: &Store, record_id: i64) -> EngineResult<()> {
    if store::delete_attendance_row(store.conn(), record_id)? == 0 {
        return Err(EngineError::not_found("attendance record", record_id));
    }
    info!(record_id, "attendance record deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        store: Store,
        section: i64,
        asha: i64,
        bela: i64,
    }

    fn fixture() -> Fixture {
        let store = Store::open_in_memory().expect("store");
        let class_id = store.create_class("10th").expect("class");
        let section = store.create_section(class_id, "A").expect("section");
        let bela = store.create_student("Bela", class_id, section).expect("bela");
        let asha = store.create_student("Asha", class_id, section).expect("asha");
        Fixture {
            store,
            section,
            asha,
            bela,
        }
    }

    fn record_count(store: &Store, student_id: i64, day: &str) -> i64 {
        store
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM attendance WHERE student_id = ? AND date = ?",
                (student_id, day),
                |r| r.get(0),
            )
            .expect("count")
    }

    fn d(s: &str) -> NaiveDate {
        parse_date(s).expect("date")
    }

    #[test]
    fn status_parsing_and_toggle() {
        assert_eq!("present".parse::<AttendanceStatus>().unwrap(), AttendanceStatus::Present);
        assert_eq!(" Absent ".parse::<AttendanceStatus>().unwrap(), AttendanceStatus::Absent);
        assert!("Late".parse::<AttendanceStatus>().is_err());
        assert_eq!(AttendanceStatus::Present.toggled(), AttendanceStatus::Absent);
        assert_eq!(AttendanceStatus::Absent.toggled().toggled(), AttendanceStatus::Absent);
    }

    #[test]
    fn dates_must_be_iso() {
        assert!(parse_date("2024-05-01").is_ok());
        assert!(parse_date("01/05/2024").is_err());
        assert!(parse_date("2024-02-30").is_err());
        assert!(parse_date("-0001-01-01").is_err());
        assert!(parse_date("+10000-01-01").is_err());
        assert!(parse_date("0000-01-01").is_ok());
    }

    #[test]
    fn row_status_reads_like_the_status_param() {
        let row: RosterRow = serde_json::from_value(serde_json::json!({
            "studentId": 1,
            "name": "Asha",
            "status": "absent",
            "saved": false
        }))
        .expect("row");
        assert_eq!(row.status, AttendanceStatus::Absent);
        assert_eq!(serde_json::to_value(&row).expect("json")["status"], "Absent");

        let bad = serde_json::from_value::<RosterRow>(serde_json::json!({
            "studentId": 1,
            "name": "Asha",
            "status": "Late",
            "saved": false
        }));
        assert!(bad.is_err());
    }

    #[test]
    fn resaving_updates_in_place() {
        let f = fixture();
        let first = save_attendance(
            &f.store,
            d("2024-05-01"),
            &[AttendanceEntry::new(f.asha, AttendanceStatus::Present)],
        )
        .expect("first save");
        assert_eq!(first, SaveOutcome { inserted: 1, updated: 0 });

        let second = save_attendance(
            &f.store,
            d("2024-05-01"),
            &[AttendanceEntry::new(f.asha, AttendanceStatus::Absent)],
        )
        .expect("second save");
        assert_eq!(second, SaveOutcome { inserted: 0, updated: 1 });

        assert_eq!(record_count(&f.store, f.asha, "2024-05-01"), 1);
        let records = list_records(&f.store).expect("list");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, AttendanceStatus::Absent);
    }

    #[test]
    fn same_batch_twice_converges() {
        let f = fixture();
        let batch = [
            AttendanceEntry::new(f.asha, AttendanceStatus::Present),
            AttendanceEntry::new(f.bela, AttendanceStatus::Absent),
        ];
        save_attendance(&f.store, d("2024-05-02"), &batch).expect("once");
        let after_once = list_records(&f.store).expect("list");
        save_attendance(&f.store, d("2024-05-02"), &batch).expect("twice");
        let after_twice = list_records(&f.store).expect("list");
        assert_eq!(after_once, after_twice);
    }

    #[test]
    fn repeated_student_in_batch_keeps_one_row_last_wins() {
        let f = fixture();
        save_attendance(
            &f.store,
            d("2024-05-03"),
            &[
                AttendanceEntry::new(f.asha, AttendanceStatus::Present),
                AttendanceEntry::new(f.asha, AttendanceStatus::Absent),
            ],
        )
        .expect("save");
        assert_eq!(record_count(&f.store, f.asha, "2024-05-03"), 1);
        assert_eq!(list_records(&f.store).expect("list")[0].status, AttendanceStatus::Absent);
    }

    #[test]
    fn unknown_student_rolls_back_whole_batch() {
        let f = fixture();
        let e = save_attendance(
            &f.store,
            d("2024-05-04"),
            &[
                AttendanceEntry::new(f.asha, AttendanceStatus::Present),
                AttendanceEntry::new(4242, AttendanceStatus::Present),
            ],
        )
        .unwrap_err();
        assert_eq!(e.code(), "not_found");
        assert!(list_records(&f.store).expect("list").is_empty());
    }

    #[test]
    fn roster_defaults_to_present_and_shows_saved_status() {
        let f = fixture();
        let fresh = load_roster(&f.store, f.section, d("2024-05-01")).expect("roster");
        assert_eq!(
            fresh.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            vec!["Asha", "Bela"]
        );
        assert!(fresh
            .iter()
            .all(|r| r.status == AttendanceStatus::Present && !r.saved));

        save_attendance(
            &f.store,
            d("2024-05-01"),
            &[AttendanceEntry::new(f.bela, AttendanceStatus::Absent)],
        )
        .expect("save");
        let reloaded = load_roster(&f.store, f.section, d("2024-05-01")).expect("roster");
        let bela = reloaded.iter().find(|r| r.student_id == f.bela).expect("bela");
        assert_eq!(bela.status, AttendanceStatus::Absent);
        assert!(bela.saved);
    }

    #[test]
    fn apply_status_touches_selected_rows_only() {
        let rows = vec![
            RosterRow {
                student_id: 1,
                name: "Asha".into(),
                status: AttendanceStatus::Present,
                saved: false,
            },
            RosterRow {
                student_id: 2,
                name: "Bela".into(),
                status: AttendanceStatus::Present,
                saved: false,
            },
        ];
        let out = apply_status(rows, &[2, 99], AttendanceStatus::Absent);
        assert_eq!(out[0].status, AttendanceStatus::Present);
        assert_eq!(out[1].status, AttendanceStatus::Absent);

        let out = toggle_status(out, 2);
        assert_eq!(out[1].status, AttendanceStatus::Present);
        let out = toggle_status(out, 1);
        assert_eq!(out[0].status, AttendanceStatus::Absent);
        assert_eq!(out[1].status, AttendanceStatus::Present);
        assert_eq!(toggle_status(out.clone(), 99), out);
    }

    #[test]
    fn single_record_edit_and_delete() {
        let f = fixture();
        save_attendance(
            &f.store,
            d("2024-05-01"),
            &[AttendanceEntry::new(f.asha, AttendanceStatus::Present)],
        )
        .expect("save");
        let id = list_records(&f.store).expect("list")[0].id;

        set_record_status(&f.store, id, AttendanceStatus::Absent).expect("edit");
        assert_eq!(list_records(&f.store).expect("list")[0].status, AttendanceStatus::Absent);

        delete_record(&f.store, id).expect("delete");
        assert!(list_records(&f.store).expect("list").is_empty());
        assert_eq!(delete_record(&f.store, id).unwrap_err().code(), "not_found");
        assert_eq!(
            set_record_status(&f.store, id, AttendanceStatus::Present)
                .unwrap_err()
                .code(),
            "not_found"
        );
    }
}
