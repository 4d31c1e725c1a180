use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;

fn handle_faculties_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "faculties": [] }));
    };

    let mut stmt = match conn.prepare(
        "SELECT
           f.id,
           f.name,
           (SELECT COUNT(*) FROM sections s WHERE s.faculty_id = f.id) AS section_count
         FROM faculties f
         ORDER BY f.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: i64 = row.get(0)?;
            let name: String = row.get(1)?;
            let section_count: i64 = row.get(2)?;
            Ok(json!({
                "id": id,
                "name": name,
                "sectionCount": section_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(faculties) => ok(&req.id, json!({ "faculties": faculties })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_faculties_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing name", None),
    };
    if name.is_empty() {
        return err(&req.id, "bad_params", "name must not be empty", None);
    }

    if let Err(e) = conn.execute(
        "INSERT INTO faculties(name, updated_at) VALUES(?, ?)",
        (&name, db::now_stamp()),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "faculties" })),
        );
    }

    let faculty_id = conn.last_insert_rowid();
    ok(&req.id, json!({ "facultyId": faculty_id, "name": name }))
}

fn handle_faculties_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(faculty_id) = req.params.get("facultyId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing facultyId", None);
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM faculties WHERE id = ?", [faculty_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "faculty not found", None);
    }

    let section_count: i64 = match conn.query_row(
        "SELECT COUNT(*) FROM sections WHERE faculty_id = ?",
        [faculty_id],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if section_count > 0 {
        return err(
            &req.id,
            "bad_params",
            "faculty still has sections",
            Some(json!({ "sectionCount": section_count })),
        );
    }

    if let Err(e) = conn.execute("DELETE FROM faculties WHERE id = ?", [faculty_id]) {
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "faculties" })),
        );
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "faculties.list" => Some(handle_faculties_list(state, req)),
        "faculties.create" => Some(handle_faculties_create(state, req)),
        "faculties.delete" => Some(handle_faculties_delete(state, req)),
        _ => None,
    }
}
