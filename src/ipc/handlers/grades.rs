use crate::db;
use crate::draft::{FacultyRef, SectionData, SectionEntry, SectionType, STANDARD_SECTION_NAMES};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers;
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;

fn parse_section_data(params: &serde_json::Value) -> Result<SectionData, String> {
    let Some(v) = params.get("sections") else {
        return Err("missing sections".to_string());
    };
    serde_json::from_value(v.clone()).map_err(|e| format!("invalid sections payload: {}", e))
}

/// Every entry with the scope it lives in, payload order preserved.
fn scoped_entries(data: &SectionData) -> Vec<(Option<i64>, &SectionEntry)> {
    if data.has_faculties {
        data.faculty_sections
            .iter()
            .flat_map(|g| g.sections.iter().map(move |e| (Some(g.faculty_id), e)))
            .collect()
    } else {
        data.sections.iter().map(|e| (None, e)).collect()
    }
}

/// Save-boundary validation of the normalized composer payload. The draft
/// keeps name problems advisory; here they become hard errors.
fn check_payload(data: &SectionData, faculties: &[FacultyRef]) -> Result<SectionType, String> {
    let Some(section_type) = SectionType::parse(&data.section_type) else {
        return Err("sectionType must be one of: standard, custom".to_string());
    };

    if data.has_faculties {
        if !data.sections.is_empty() {
            return Err("sections must be empty when hasFaculties is true".to_string());
        }
        if data.faculty_sections.is_empty() {
            return Err("select at least one faculty".to_string());
        }
        let mut seen: Vec<i64> = Vec::new();
        for g in &data.faculty_sections {
            if seen.contains(&g.faculty_id) {
                return Err(format!("duplicate faculty id {}", g.faculty_id));
            }
            seen.push(g.faculty_id);
            if !faculties.iter().any(|f| f.id == g.faculty_id) {
                return Err(format!("unknown faculty id {}", g.faculty_id));
            }
        }
    } else {
        if !data.faculty_sections.is_empty() {
            return Err("facultySections must be empty when hasFaculties is false".to_string());
        }
        if data.sections.is_empty() {
            return Err("add at least one section".to_string());
        }
    }

    let mut names_per_scope: Vec<(Option<i64>, Vec<String>)> = Vec::new();
    for (faculty_id, entry) in scoped_entries(data) {
        if entry.is_new != (entry.id == 0) {
            return Err(format!(
                "section id {} and isNew flag disagree",
                entry.id
            ));
        }
        let name = entry.name.trim().to_string();
        if name.is_empty() {
            return Err("section names must not be blank".to_string());
        }
        if section_type == SectionType::Standard
            && !STANDARD_SECTION_NAMES.contains(&name.as_str())
        {
            return Err(format!("\"{}\" is not a standard section name", name));
        }
        let idx = match names_per_scope.iter().position(|(fid, _)| *fid == faculty_id) {
            Some(i) => i,
            None => {
                names_per_scope.push((faculty_id, Vec::new()));
                names_per_scope.len() - 1
            }
        };
        let scope = &mut names_per_scope[idx].1;
        if scope.contains(&name) {
            return Err(format!("duplicate section name \"{}\"", name));
        }
        scope.push(name);
    }

    Ok(section_type)
}

fn handle_grades_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "grades": [] }));
    };
    let session_filter = req.params.get("academicSessionId").and_then(|v| v.as_i64());

    // Include counts so the roster dashboard has something to show.
    let sql_base = "SELECT
           g.id,
           g.name,
           g.academic_session_id,
           a.name AS session_name,
           g.has_faculties,
           g.section_type,
           (SELECT COUNT(*) FROM sections s WHERE s.grade_id = g.id) AS section_count,
           (SELECT COUNT(DISTINCT s.faculty_id) FROM sections s
              WHERE s.grade_id = g.id AND s.faculty_id IS NOT NULL) AS faculty_count
         FROM grades g
         JOIN academic_sessions a ON a.id = g.academic_session_id";

    let map_row = |row: &rusqlite::Row| -> rusqlite::Result<serde_json::Value> {
        let id: i64 = row.get(0)?;
        let name: String = row.get(1)?;
        let session_id: i64 = row.get(2)?;
        let session_name: String = row.get(3)?;
        let has_faculties: i64 = row.get(4)?;
        let section_type: String = row.get(5)?;
        let section_count: i64 = row.get(6)?;
        let faculty_count: i64 = row.get(7)?;
        Ok(json!({
            "id": id,
            "name": name,
            "academicSessionId": session_id,
            "academicSessionName": session_name,
            "hasFaculties": has_faculties != 0,
            "sectionType": section_type,
            "sectionCount": section_count,
            "facultyCount": faculty_count
        }))
    };

    let rows = if let Some(session_id) = session_filter {
        let sql = format!("{} WHERE g.academic_session_id = ? ORDER BY g.name", sql_base);
        conn.prepare(&sql)
            .and_then(|mut stmt| {
                stmt.query_map([session_id], map_row)
                    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            })
    } else {
        let sql = format!("{} ORDER BY a.starts_on DESC, g.name", sql_base);
        conn.prepare(&sql).and_then(|mut stmt| {
            stmt.query_map([], map_row)
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        })
    };

    match rows {
        Ok(grades) => ok(&req.id, json!({ "grades": grades })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn sections_payload(
    conn: &rusqlite::Connection,
    grade_id: i64,
    has_faculties: bool,
) -> anyhow::Result<serde_json::Value> {
    if !has_faculties {
        let mut stmt = conn.prepare(
            "SELECT id, name FROM sections
             WHERE grade_id = ? AND faculty_id IS NULL
             ORDER BY sort_order, id",
        )?;
        let rows = stmt
            .query_map([grade_id], |row| {
                let id: i64 = row.get(0)?;
                let name: String = row.get(1)?;
                Ok(json!({ "id": id, "name": name }))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(json!({ "sections": rows, "facultySections": [] }));
    }

    let mut stmt = conn.prepare(
        "SELECT s.faculty_id, f.name, s.id, s.name
         FROM sections s
         JOIN faculties f ON f.id = s.faculty_id
         WHERE s.grade_id = ?
         ORDER BY f.name, s.sort_order, s.id",
    )?;
    let rows = stmt
        .query_map([grade_id], |row| {
            let faculty_id: i64 = row.get(0)?;
            let faculty_name: String = row.get(1)?;
            let id: i64 = row.get(2)?;
            let name: String = row.get(3)?;
            Ok((faculty_id, faculty_name, id, name))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut groups: Vec<(i64, String, Vec<serde_json::Value>)> = Vec::new();
    for (faculty_id, faculty_name, id, name) in rows {
        let entry = json!({ "id": id, "name": name });
        match groups.iter_mut().find(|(fid, _, _)| *fid == faculty_id) {
            Some((_, _, entries)) => entries.push(entry),
            None => groups.push((faculty_id, faculty_name, vec![entry])),
        }
    }
    let groups: Vec<serde_json::Value> = groups
        .into_iter()
        .map(|(faculty_id, faculty_name, entries)| {
            json!({
                "facultyId": faculty_id,
                "facultyName": faculty_name,
                "sections": entries
            })
        })
        .collect();
    Ok(json!({ "sections": [], "facultySections": groups }))
}

fn handle_grades_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(grade_id) = req.params.get("gradeId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing gradeId", None);
    };

    let row: Option<(String, i64, i64, String)> = match conn
        .query_row(
            "SELECT name, academic_session_id, has_faculties, section_type
             FROM grades WHERE id = ?",
            [grade_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some((name, session_id, has_faculties, section_type)) = row else {
        return err(&req.id, "not_found", "grade not found", None);
    };
    let has_faculties = has_faculties != 0;

    let sections = match sections_payload(conn, grade_id, has_faculties) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "grade": {
                "id": grade_id,
                "name": name,
                "academicSessionId": session_id,
                "hasFaculties": has_faculties,
                "sectionType": section_type,
                "sections": sections["sections"],
                "facultySections": sections["facultySections"]
            }
        }),
    )
}

fn handle_grades_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let Some(session_id) = req.params.get("academicSessionId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing academicSessionId", None);
    };
    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing name", None),
    };
    if name.is_empty() {
        return err(&req.id, "bad_params", "name must not be empty", None);
    }
    let data = match parse_section_data(&req.params) {
        Ok(d) => d,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    let session_exists: Option<i64> = match conn
        .query_row(
            "SELECT 1 FROM academic_sessions WHERE id = ?",
            [session_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if session_exists.is_none() {
        return err(&req.id, "bad_params", "academic session not found", None);
    }

    let faculties = match helpers::load_faculties(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let section_type = match check_payload(&data, &faculties) {
        Ok(t) => t,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    // A fresh grade has no persisted identity to carry over.
    if scoped_entries(&data).iter().any(|(_, e)| e.id != 0) {
        return err(
            &req.id,
            "bad_params",
            "new grades cannot reference persisted section ids",
            None,
        );
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    if let Err(e) = tx.execute(
        "INSERT INTO grades(academic_session_id, name, has_faculties, section_type, updated_at)
         VALUES(?, ?, ?, ?, ?)",
        (
            session_id,
            &name,
            data.has_faculties as i64,
            section_type.key(),
            db::now_stamp(),
        ),
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "grades" })),
        );
    }
    let grade_id = tx.last_insert_rowid();

    let mut created: Vec<i64> = Vec::new();
    for (faculty_id, entries) in scope_lists(&data) {
        for (i, entry) in entries.iter().enumerate() {
            if let Err(e) = tx.execute(
                "INSERT INTO sections(grade_id, faculty_id, name, sort_order)
                 VALUES(?, ?, ?, ?)",
                (grade_id, faculty_id, entry.name.trim(), i as i64),
            ) {
                let _ = tx.rollback();
                return err(
                    &req.id,
                    "db_insert_failed",
                    e.to_string(),
                    Some(json!({ "table": "sections" })),
                );
            }
            created.push(tx.last_insert_rowid());
        }
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({ "gradeId": grade_id, "name": name, "createdSectionIds": created }),
    )
}

/// Payload scopes in persistence order: the flat list, or one list per
/// faculty group.
fn scope_lists(data: &SectionData) -> Vec<(Option<i64>, Vec<SectionEntry>)> {
    if data.has_faculties {
        data.faculty_sections
            .iter()
            .map(|g| (Some(g.faculty_id), g.sections.clone()))
            .collect()
    } else {
        vec![(None, data.sections.clone())]
    }
}

fn handle_grades_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(grade_id) = req.params.get("gradeId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing gradeId", None);
    };
    let data = match parse_section_data(&req.params) {
        Ok(d) => d,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    let row: Option<(String, i64, String)> = match conn
        .query_row(
            "SELECT name, has_faculties, section_type FROM grades WHERE id = ?",
            [grade_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some((current_name, current_has_faculties, current_section_type)) = row else {
        return err(&req.id, "not_found", "grade not found", None);
    };
    let current_has_faculties = current_has_faculties != 0;

    let name = match req.params.get("name") {
        Some(v) => match v.as_str() {
            Some(s) if !s.trim().is_empty() => s.trim().to_string(),
            _ => return err(&req.id, "bad_params", "name must be a non-empty string", None),
        },
        None => current_name,
    };

    let faculties = match helpers::load_faculties(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let section_type = match check_payload(&data, &faculties) {
        Ok(t) => t,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    let persisted = match helpers::load_grade_sections(conn, grade_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    // Once sections exist the mode configuration is locked for good.
    let locked = !persisted.is_empty();
    if locked
        && (data.has_faculties != current_has_faculties
            || section_type.key() != current_section_type)
    {
        return err(
            &req.id,
            "mode_locked",
            "grade configuration is locked by persisted sections",
            Some(json!({
                "hasFaculties": current_has_faculties,
                "sectionType": current_section_type
            })),
        );
    }

    // Persisted sections must reappear untouched: same scope, same name.
    let mut seen: Vec<i64> = Vec::new();
    for (faculty_id, entry) in scoped_entries(&data) {
        if entry.id == 0 {
            continue;
        }
        let Some(p) = persisted.iter().find(|p| p.id == entry.id) else {
            return err(
                &req.id,
                "bad_params",
                format!("unknown section id {}", entry.id),
                None,
            );
        };
        if seen.contains(&entry.id) {
            return err(
                &req.id,
                "bad_params",
                format!("section id {} appears twice", entry.id),
                None,
            );
        }
        if p.faculty_id != faculty_id {
            return err(
                &req.id,
                "bad_params",
                "persisted sections cannot move between faculties",
                Some(json!({ "sectionId": entry.id })),
            );
        }
        if p.name != entry.name.trim() {
            return err(
                &req.id,
                "bad_params",
                "persisted sections cannot be renamed",
                Some(json!({ "sectionId": entry.id, "name": p.name })),
            );
        }
        seen.push(entry.id);
    }
    if let Some(missing) = persisted.iter().find(|p| !seen.contains(&p.id)) {
        return err(
            &req.id,
            "bad_params",
            "persisted sections cannot be removed",
            Some(json!({ "sectionId": missing.id, "name": missing.name })),
        );
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    if let Err(e) = tx.execute(
        "UPDATE grades SET name = ?, has_faculties = ?, section_type = ?, updated_at = ?
         WHERE id = ?",
        (
            &name,
            data.has_faculties as i64,
            section_type.key(),
            db::now_stamp(),
            grade_id,
        ),
    ) {
        let _ = tx.rollback();
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    let mut created: Vec<i64> = Vec::new();
    for (faculty_id, entries) in scope_lists(&data) {
        for (i, entry) in entries.iter().enumerate() {
            if entry.id != 0 {
                if let Err(e) = tx.execute(
                    "UPDATE sections SET sort_order = ? WHERE id = ?",
                    (i as i64, entry.id),
                ) {
                    let _ = tx.rollback();
                    return err(&req.id, "db_update_failed", e.to_string(), None);
                }
                continue;
            }
            if let Err(e) = tx.execute(
                "INSERT INTO sections(grade_id, faculty_id, name, sort_order)
                 VALUES(?, ?, ?, ?)",
                (grade_id, faculty_id, entry.name.trim(), i as i64),
            ) {
                let _ = tx.rollback();
                return err(
                    &req.id,
                    "db_insert_failed",
                    e.to_string(),
                    Some(json!({ "table": "sections" })),
                );
            }
            created.push(tx.last_insert_rowid());
        }
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({ "ok": true, "createdSectionIds": created }),
    )
}

fn handle_grades_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(grade_id) = req.params.get("gradeId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing gradeId", None);
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM grades WHERE id = ?", [grade_id], |r| r.get(0))
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "grade not found", None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Explicitly delete in dependency order (no ON DELETE CASCADE).
    if let Err(e) = tx.execute("DELETE FROM sections WHERE grade_id = ?", [grade_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "sections" })),
        );
    }
    if let Err(e) = tx.execute("DELETE FROM grades WHERE id = ?", [grade_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "grades" })),
        );
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.list" => Some(handle_grades_list(state, req)),
        "grades.get" => Some(handle_grades_get(state, req)),
        "grades.create" => Some(handle_grades_create(state, req)),
        "grades.update" => Some(handle_grades_update(state, req)),
        "grades.delete" => Some(handle_grades_delete(state, req)),
        _ => None,
    }
}
