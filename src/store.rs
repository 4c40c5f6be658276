use crate::db;
use crate::error::{EngineError, EngineResult};
use rusqlite::{Connection, ErrorCode, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

/// Owns the single connection every service in the process shares.
pub struct Store {
    conn: Connection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRow {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionRow {
    pub id: i64,
    pub class_id: i64,
    pub class_name: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRow {
    pub id: i64,
    pub name: String,
    pub class_id: i64,
    pub class_name: String,
    pub section_id: i64,
    pub section_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudentFilter {
    All,
    Class(i64),
    Section(i64),
}

const STUDENT_SELECT: &str = "SELECT s.id, s.name, c.id, c.class_name, se.id, se.section_name
     FROM students s
     JOIN classes c ON s.class_id = c.id
     JOIN sections se ON s.section_id = se.id";

fn student_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<StudentRow> {
    Ok(StudentRow {
        id: r.get(0)?,
        name: r.get(1)?,
        class_id: r.get(2)?,
        class_name: r.get(3)?,
        section_id: r.get(4)?,
        section_name: r.get(5)?,
    })
}

pub(crate) fn normalize_name(raw: &str, what: &str) -> EngineResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(EngineError::InvalidInput(format!(
            "{} name must not be empty",
            what
        )));
    }
    Ok(name.to_string())
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation
    )
}

impl Store {
    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        let conn = db::open_db(workspace)?;
        info!(workspace = %workspace.display(), "attendance store opened");
        Ok(Store { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Ok(Store {
            conn: db::open_in_memory()?,
        })
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    // ---- classes ----

    pub fn create_class(&self, name: &str) -> EngineResult<i64> {
        let name = normalize_name(name, "class")?;
        if self.class_id_by_name(&name)?.is_some() {
            warn!(name = %name, "class create rejected: duplicate name");
            return Err(EngineError::DuplicateName {
                entity: "class",
                name,
            });
        }
        match self
            .conn
            .execute("INSERT INTO classes(class_name) VALUES(?)", [&name])
        {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(EngineError::DuplicateName {
                    entity: "class",
                    name,
                })
            }
            Err(e) => return Err(e.into()),
        }
        let id = self.conn.last_insert_rowid();
        info!(class_id = id, name = %name, "class created");
        Ok(id)
    }

    pub fn list_classes(&self) -> EngineResult<Vec<ClassRow>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, class_name FROM classes ORDER BY class_name")?;
        let rows = stmt
            .query_map([], |r| {
                Ok(ClassRow {
                    id: r.get(0)?,
                    name: r.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_class(&self, class_id: i64) -> EngineResult<ClassRow> {
        self.conn
            .query_row(
                "SELECT id, class_name FROM classes WHERE id = ?",
                [class_id],
                |r| {
                    Ok(ClassRow {
                        id: r.get(0)?,
                        name: r.get(1)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| EngineError::not_found("class", class_id))
    }

    pub fn class_id_by_name(&self, name: &str) -> EngineResult<Option<i64>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id FROM classes WHERE class_name = ?",
                [name.trim()],
                |r| r.get(0),
            )
            .optional()?)
    }

    pub fn rename_class(&self, class_id: i64, name: &str) -> EngineResult<()> {
        let name = normalize_name(name, "class")?;
        self.get_class(class_id)?;
        if let Some(other) = self.class_id_by_name(&name)? {
            if other != class_id {
                warn!(class_id, name = %name, "class rename rejected: duplicate name");
                return Err(EngineError::DuplicateName {
                    entity: "class",
                    name,
                });
            }
        }
        self.conn.execute(
            "UPDATE classes SET class_name = ? WHERE id = ?",
            (&name, class_id),
        )?;
        info!(class_id, name = %name, "class renamed");
        Ok(())
    }

    /// Classes that would produce a non-empty monthly report.
    pub fn class_names_with_students(&self) -> EngineResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT c.class_name
             FROM classes c
             JOIN students s ON s.class_id = c.id
             ORDER BY c.class_name",
        )?;
        let rows = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ---- sections ----

    pub fn create_section(&self, class_id: i64, name: &str) -> EngineResult<i64> {
        let name = normalize_name(name, "section")?;
        self.get_class(class_id)?;
        self.conn.execute(
            "INSERT INTO sections(class_id, section_name) VALUES(?, ?)",
            (class_id, &name),
        )?;
        let id = self.conn.last_insert_rowid();
        info!(section_id = id, class_id, name = %name, "section created");
        Ok(id)
    }

    pub fn list_sections(&self, class_id: Option<i64>) -> EngineResult<Vec<SectionRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT se.id, c.id, c.class_name, se.section_name
             FROM sections se
             JOIN classes c ON se.class_id = c.id
             WHERE ?1 IS NULL OR se.class_id = ?1
             ORDER BY c.class_name, se.section_name",
        )?;
        let rows = stmt
            .query_map([class_id], |r| {
                Ok(SectionRow {
                    id: r.get(0)?,
                    class_id: r.get(1)?,
                    class_name: r.get(2)?,
                    name: r.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_section(&self, section_id: i64) -> EngineResult<SectionRow> {
        self.conn
            .query_row(
                "SELECT se.id, c.id, c.class_name, se.section_name
                 FROM sections se
                 JOIN classes c ON se.class_id = c.id
                 WHERE se.id = ?",
                [section_id],
                |r| {
                    Ok(SectionRow {
                        id: r.get(0)?,
                        class_id: r.get(1)?,
                        class_name: r.get(2)?,
                        name: r.get(3)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| EngineError::not_found("section", section_id))
    }

    pub fn rename_section(&self, section_id: i64, name: &str) -> EngineResult<()> {
        let name = normalize_name(name, "section")?;
        let changed = self.conn.execute(
            "UPDATE sections SET section_name = ? WHERE id = ?",
            (&name, section_id),
        )?;
        if changed == 0 {
            return Err(EngineError::not_found("section", section_id));
        }
        info!(section_id, name = %name, "section renamed");
        Ok(())
    }

    // ---- students ----

    pub fn create_student(&self, name: &str, class_id: i64, section_id: i64) -> EngineResult<i64> {
        let name = normalize_name(name, "student")?;
        self.get_class(class_id)?;
        let section = self.get_section(section_id)?;
        if section.class_id != class_id {
            warn!(section_id, class_id, "student create rejected: section outside class");
            return Err(EngineError::SectionClassMismatch {
                section_id,
                class_id,
            });
        }
        self.conn.execute(
            "INSERT INTO students(name, class_id, section_id) VALUES(?, ?, ?)",
            (&name, class_id, section_id),
        )?;
        let id = self.conn.last_insert_rowid();
        info!(student_id = id, class_id, section_id, "student created");
        Ok(id)
    }

    pub fn list_students(&self, filter: StudentFilter) -> EngineResult<Vec<StudentRow>> {
        let (sql, arg) = match filter {
            StudentFilter::All => (
                format!(
                    "{} ORDER BY c.class_name, se.section_name, s.name",
                    STUDENT_SELECT
                ),
                None,
            ),
            StudentFilter::Class(class_id) => (
                format!(
                    "{} WHERE s.class_id = ?1 ORDER BY se.section_name, s.name",
                    STUDENT_SELECT
                ),
                Some(class_id),
            ),
            StudentFilter::Section(section_id) => (
                format!("{} WHERE s.section_id = ?1 ORDER BY s.name", STUDENT_SELECT),
                Some(section_id),
            ),
        };
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = match arg {
            Some(id) => stmt.query_map([id], student_from_row)?,
            None => stmt.query_map([], student_from_row)?,
        }
        .collect::<Result<Vec<_>, _>>()?;
        debug!(?filter, count = rows.len(), "students listed");
        Ok(rows)
    }

    pub fn get_student(&self, student_id: i64) -> EngineResult<StudentRow> {
        let sql = format!("{} WHERE s.id = ?", STUDENT_SELECT);
        self.conn
            .query_row(&sql, [student_id], student_from_row)
            .optional()?
            .ok_or_else(|| EngineError::not_found("student", student_id))
    }

    pub fn rename_student(&self, student_id: i64, name: &str) -> EngineResult<()> {
        let name = normalize_name(name, "student")?;
        let changed = self.conn.execute(
            "UPDATE students SET name = ? WHERE id = ?",
            (&name, student_id),
        )?;
        if changed == 0 {
            return Err(EngineError::not_found("student", student_id));
        }
        info!(student_id, "student renamed");
        Ok(())
    }
}

// Row-level deletes. None of these cascade; callers order them.

pub(crate) fn delete_class_row(conn: &Connection, class_id: i64) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM classes WHERE id = ?", [class_id])
}

pub(crate) fn delete_section_row(conn: &Connection, section_id: i64) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM sections WHERE id = ?", [section_id])
}

pub(crate) fn delete_student_row(conn: &Connection, student_id: i64) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM students WHERE id = ?", [student_id])
}

pub(crate) fn delete_attendance_row(conn: &Connection, record_id: i64) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM attendance WHERE id = ?", [record_id])
}
