use rusqlite::Connection;

use crate::draft::{FacultyRef, PersistedSection};

pub fn load_faculties(conn: &Connection) -> anyhow::Result<Vec<FacultyRef>> {
    let mut stmt = conn.prepare("SELECT id, name FROM faculties ORDER BY name")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(FacultyRef {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn load_grade_sections(conn: &Connection, grade_id: i64) -> anyhow::Result<Vec<PersistedSection>> {
    let mut stmt = conn.prepare(
        "SELECT id, faculty_id, name FROM sections
         WHERE grade_id = ?
         ORDER BY sort_order, id",
    )?;
    let rows = stmt
        .query_map([grade_id], |row| {
            Ok(PersistedSection {
                id: row.get(0)?,
                faculty_id: row.get(1)?,
                name: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
