use chrono::Utc;
use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "campus.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS academic_sessions(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            starts_on TEXT NOT NULL,
            ends_on TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS faculties(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            academic_session_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            has_faculties INTEGER NOT NULL,
            section_type TEXT NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(academic_session_id) REFERENCES academic_sessions(id),
            UNIQUE(academic_session_id, name)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_session ON grades(academic_session_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sections(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            grade_id INTEGER NOT NULL,
            faculty_id INTEGER,
            name TEXT NOT NULL,
            sort_order INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(grade_id) REFERENCES grades(id),
            FOREIGN KEY(faculty_id) REFERENCES faculties(id),
            UNIQUE(grade_id, faculty_id, name)
        )",
        [],
    )?;
    // Existing workspaces may have a sections table without sort_order.
    ensure_sections_sort_order(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sections_grade ON sections(grade_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sections_faculty ON sections(faculty_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sections_grade_sort ON sections(grade_id, sort_order)",
        [],
    )?;

    Ok(conn)
}

pub fn now_stamp() -> String {
    Utc::now().to_rfc3339()
}

fn ensure_sections_sort_order(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "sections", "sort_order")? {
        return Ok(());
    }

    conn.execute(
        "ALTER TABLE sections ADD COLUMN sort_order INTEGER NOT NULL DEFAULT 0",
        [],
    )?;

    // Backfill per grade using existing insert order as a best-effort.
    let mut grade_stmt = conn.prepare("SELECT id FROM grades ORDER BY rowid")?;
    let grade_ids = grade_stmt
        .query_map([], |row| row.get::<_, i64>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut sect_stmt = conn.prepare("SELECT id FROM sections WHERE grade_id = ? ORDER BY rowid")?;

    for gid in grade_ids {
        let section_ids = sect_stmt
            .query_map([gid], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        for (i, sid) in section_ids.iter().enumerate() {
            conn.execute(
                "UPDATE sections SET sort_order = ? WHERE id = ?",
                (i as i64, sid),
            )?;
        }
    }

    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
