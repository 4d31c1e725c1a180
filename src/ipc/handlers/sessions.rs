use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use rusqlite::OptionalExtension;
use serde_json::json;

fn parse_date(v: &serde_json::Value, key: &str) -> Result<String, String> {
    let s = v
        .as_str()
        .ok_or_else(|| format!("{} must be string", key))?
        .trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| format!("{} must be an ISO date (YYYY-MM-DD)", key))?;
    Ok(s.to_string())
}

fn check_date_order(starts_on: &str, ends_on: &str) -> Result<(), String> {
    // Both strings already validated; lexicographic order matches date order.
    if starts_on > ends_on {
        return Err("startsOn must not be after endsOn".to_string());
    }
    Ok(())
}

fn handle_sessions_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "sessions": [] }));
    };

    // Include the grade count so the UI can show a useful dashboard.
    let mut stmt = match conn.prepare(
        "SELECT
           s.id,
           s.name,
           s.starts_on,
           s.ends_on,
           (SELECT COUNT(*) FROM grades g WHERE g.academic_session_id = s.id) AS grade_count
         FROM academic_sessions s
         ORDER BY s.starts_on DESC, s.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: i64 = row.get(0)?;
            let name: String = row.get(1)?;
            let starts_on: String = row.get(2)?;
            let ends_on: String = row.get(3)?;
            let grade_count: i64 = row.get(4)?;
            Ok(json!({
                "id": id,
                "name": name,
                "startsOn": starts_on,
                "endsOn": ends_on,
                "gradeCount": grade_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(sessions) => ok(&req.id, json!({ "sessions": sessions })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_sessions_create(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let starts_on = match req.params.get("startsOn") {
        Some(v) => match parse_date(v, "startsOn") {
            Ok(d) => d,
            Err(msg) => return err(&req.id, "bad_params", msg, None),
        },
        None => return err(&req.id, "bad_params", "missing startsOn", None),
    };
    let ends_on = match req.params.get("endsOn") {
        Some(v) => match parse_date(v, "endsOn") {
            Ok(d) => d,
            Err(msg) => return err(&req.id, "bad_params", msg, None),
        },
        None => return err(&req.id, "bad_params", "missing endsOn", None),
    };
    if let Err(msg) = check_date_order(&starts_on, &ends_on) {
        return err(&req.id, "bad_params", msg, None);
    }

    if let Err(e) = conn.execute(
        "INSERT INTO academic_sessions(name, starts_on, ends_on, updated_at)
         VALUES(?, ?, ?, ?)",
        (&name, &starts_on, &ends_on, db::now_stamp()),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "academic_sessions" })),
        );
    }

    let session_id = conn.last_insert_rowid();
    ok(&req.id, json!({ "sessionId": session_id, "name": name }))
}

fn handle_sessions_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(session_id) = req.params.get("sessionId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing sessionId", None);
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let existing: Option<(String, String, String)> = match conn
        .query_row(
            "SELECT name, starts_on, ends_on FROM academic_sessions WHERE id = ?",
            [session_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some((mut name, mut starts_on, mut ends_on)) = existing else {
        return err(&req.id, "not_found", "academic session not found", None);
    };

    for (k, v) in patch {
        match k.as_str() {
            "name" => {
                let s = match v.as_str() {
                    Some(s) => s.trim().to_string(),
                    None => return err(&req.id, "bad_params", "name must be string", None),
                };
                if s.is_empty() {
                    return err(&req.id, "bad_params", "name must not be empty", None);
                }
                name = s;
            }
            "startsOn" => match parse_date(v, "startsOn") {
                Ok(d) => starts_on = d,
                Err(msg) => return err(&req.id, "bad_params", msg, None),
            },
            "endsOn" => match parse_date(v, "endsOn") {
                Ok(d) => ends_on = d,
                Err(msg) => return err(&req.id, "bad_params", msg, None),
            },
            _ => return err(&req.id, "bad_params", format!("unknown field: {}", k), None),
        }
    }
    if let Err(msg) = check_date_order(&starts_on, &ends_on) {
        return err(&req.id, "bad_params", msg, None);
    }

    if let Err(e) = conn.execute(
        "UPDATE academic_sessions SET name = ?, starts_on = ?, ends_on = ?, updated_at = ?
         WHERE id = ?",
        (&name, &starts_on, &ends_on, db::now_stamp(), session_id),
    ) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "ok": true }))
}

fn handle_sessions_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(session_id) = req.params.get("sessionId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing sessionId", None);
    };

    let exists: Option<i64> = match conn
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
    if exists.is_none() {
        return err(&req.id, "not_found", "academic session not found", None);
    }

    let grade_count: i64 = match conn.query_row(
        "SELECT COUNT(*) FROM grades WHERE academic_session_id = ?",
        [session_id],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if grade_count > 0 {
        return err(
            &req.id,
            "bad_params",
            "session still has grades",
            Some(json!({ "gradeCount": grade_count })),
        );
    }

    if let Err(e) = conn.execute("DELETE FROM academic_sessions WHERE id = ?", [session_id]) {
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "academic_sessions" })),
        );
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "sessions.list" => Some(handle_sessions_list(state, req)),
        "sessions.create" => Some(handle_sessions_create(state, req)),
        "sessions.update" => Some(handle_sessions_update(state, req)),
        "sessions.delete" => Some(handle_sessions_delete(state, req)),
        _ => None,
    }
}
