//! Root deletions for classes, sections and students.
//!
//! Storage never cascades on its own, so each delete walks the dependents
//! explicitly: attendance first, then students, then sections, then the root.
//! One transaction covers the whole walk; any failure drops the transaction
//! and nothing is removed.

use crate::error::{EngineError, EngineResult};
use crate::store::{self, Store};
use rusqlite::Connection;
use serde::Serialize;
use tracing::info;

/// Rows a root deletion removes, the root itself excluded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionImpact {
    pub sections: usize,
    pub students: usize,
    pub attendance_records: usize,
}

fn count(conn: &Connection, sql: &str, id: i64) -> rusqlite::Result<usize> {
    conn.query_row(sql, [id], |r| r.get::<_, i64>(0))
        .map(|n| n as usize)
}

fn student_ids_where(conn: &Connection, column: &str, id: i64) -> rusqlite::Result<Vec<i64>> {
    let sql = format!("SELECT id FROM students WHERE {} = ? ORDER BY id", column);
    let mut stmt = conn.prepare(&sql)?;
    let ids = stmt
        .query_map([id], |r| r.get::<_, i64>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

fn delete_attendance_for(conn: &Connection, student_ids: &[i64]) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare("DELETE FROM attendance WHERE student_id = ?")?;
    let mut removed = 0;
    for sid in student_ids {
        removed += stmt.execute([sid])?;
    }
    Ok(removed)
}

fn delete_students(conn: &Connection, student_ids: &[i64]) -> rusqlite::Result<usize> {
    let mut removed = 0;
    for sid in student_ids {
        removed += store::delete_student_row(conn, *sid)?;
    }
    Ok(removed)
}

pub fn class_impact(store: &Store, class_id: i64) -> EngineResult<DeletionImpact> {
    let conn = store.conn();
    store.get_class(class_id)?;
    Ok(DeletionImpact {
        sections: count(conn, "SELECT COUNT(*) FROM sections WHERE class_id = ?", class_id)?,
        students: count(conn, "SELECT COUNT(*) FROM students WHERE class_id = ?", class_id)?,
        attendance_records: count(
            conn,
            "SELECT COUNT(*) FROM attendance a
             JOIN students s ON s.id = a.student_id
             WHERE s.class_id = ?",
            class_id,
        )?,
    })
}

pub fn section_impact(store: &Store, section_id: i64) -> EngineResult<DeletionImpact> {
    let conn = store.conn();
    store.get_section(section_id)?;
    Ok(DeletionImpact {
        sections: 0,
        students: count(
            conn,
            "SELECT COUNT(*) FROM students WHERE section_id = ?",
            section_id,
        )?,
        attendance_records: count(
            conn,
            "SELECT COUNT(*) FROM attendance a
             JOIN students s ON s.id = a.student_id
             WHERE s.section_id = ?",
            section_id,
        )?,
    })
}

pub fn student_impact(store: &Store, student_id: i64) -> EngineResult<DeletionImpact> {
    store.get_student(student_id)?;
    Ok(DeletionImpact {
        sections: 0,
        students: 0,
        attendance_records: count(
            store.conn(),
            "SELECT COUNT(*) FROM attendance WHERE student_id = ?",
            student_id,
        )?,
    })
}

/// Removes the class, its sections, their students and all of their attendance.
pub fn delete_class(store: &Store, class_id: i64) -> EngineResult<DeletionImpact> {
    store.get_class(class_id)?;
    let tx = store.conn().unchecked_transaction()?;

    let student_ids = student_ids_where(&tx, "class_id", class_id)?;
    let attendance_records = delete_attendance_for(&tx, &student_ids)?;
    let students = delete_students(&tx, &student_ids)?;
    let sections = tx.execute("DELETE FROM sections WHERE class_id = ?", [class_id])?;
    if store::delete_class_row(&tx, class_id)? == 0 {
        return Err(EngineError::not_found("class", class_id));
    }
    tx.commit()?;

    let impact = DeletionImpact {
        sections,
        students,
        attendance_records,
    };
    info!(class_id, ?impact, "class deleted");
    Ok(impact)
}

/// Removes the section, its students and their attendance. The class stays.
pub fn delete_section(store: &Store, section_id: i64) -> EngineResult<DeletionImpact> {
    store.get_section(section_id)?;
    let tx = store.conn().unchecked_transaction()?;

    let student_ids = student_ids_where(&tx, "section_id", section_id)?;
    let attendance_records = delete_attendance_for(&tx, &student_ids)?;
    let students = delete_students(&tx, &student_ids)?;
    if store::delete_section_row(&tx, section_id)? == 0 {
        return Err(EngineError::not_found("section", section_id));
    }
    tx.commit()?;

    let impact = DeletionImpact {
        sections: 0,
        students,
        attendance_records,
    };
    info!(section_id, ?impact, "section deleted");
    Ok(impact)
}

pub fn delete_student(store: &Store, student_id: i64) -> EngineResult<DeletionImpact> {
    store.get_student(student_id)?;
    let tx = store.conn().unchecked_transaction()?;

    let attendance_records = delete_attendance_for(&tx, &[student_id])?;
    if store::delete_student_row(&tx, student_id)? == 0 {
        return Err(EngineError::not_found("student", student_id));
    }
    tx.commit()?;

    let impact = DeletionImpact {
        attendance_records,
        ..DeletionImpact::default()
    };
    info!(student_id, ?impact, "student deleted");
    Ok(impact)
}
