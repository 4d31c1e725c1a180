use crate::draft::{DraftSession, SectionType};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers;
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

/// The payload every mutation answers with: the normalized section data
/// plus current validity. This is the composer's only upward channel.
fn emission(session: &DraftSession, changed: bool) -> serde_json::Value {
    let (data, validation) = session.emit();
    json!({
        "changed": changed,
        "draft": data,
        "valid": validation.valid,
        "errors": validation.errors,
        "warnings": validation.warnings
    })
}

fn handle_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let faculties = match helpers::load_faculties(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let session = match req.params.get("gradeId").and_then(|v| v.as_i64()) {
        None => DraftSession::fresh(faculties),
        Some(grade_id) => {
            let row: Option<(i64, String)> = match conn
                .query_row(
                    "SELECT has_faculties, section_type FROM grades WHERE id = ?",
                    [grade_id],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .optional()
            {
                Ok(v) => v,
                Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
            };
            let Some((has_faculties, section_type_raw)) = row else {
                return err(&req.id, "not_found", "grade not found", None);
            };
            let Some(section_type) = SectionType::parse(&section_type_raw) else {
                return err(
                    &req.id,
                    "db_query_failed",
                    format!("grade has unknown section type: {}", section_type_raw),
                    None,
                );
            };
            let persisted = match helpers::load_grade_sections(conn, grade_id) {
                Ok(v) => v,
                Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
            };
            DraftSession::for_edit(
                grade_id,
                has_faculties != 0,
                section_type,
                &persisted,
                faculties,
            )
        }
    };

    let draft_id = Uuid::new_v4().to_string();
    let mut result = emission(&session, false);
    result["draftId"] = json!(draft_id.clone());
    result["locked"] = json!(session.locked);
    result["faculties"] = json!(session
        .faculties
        .iter()
        .map(|f| json!({ "id": f.id, "name": f.name }))
        .collect::<Vec<_>>());
    if let Some(grade_id) = session.grade_id {
        result["gradeId"] = json!(grade_id);
    }
    state.drafts.insert(draft_id, session);

    ok(&req.id, result)
}

fn handle_discard(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(draft_id) = req.params.get("draftId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing draftId", None);
    };
    if state.drafts.remove(draft_id).is_none() {
        return err(&req.id, "not_found", "draft not found", None);
    }
    ok(&req.id, json!({ "ok": true }))
}

fn session_mut<'a>(
    state: &'a mut AppState,
    req: &Request,
) -> Result<&'a mut DraftSession, serde_json::Value> {
    let Some(draft_id) = req.params.get("draftId").and_then(|v| v.as_str()) else {
        return Err(err(&req.id, "bad_params", "missing draftId", None));
    };
    match state.drafts.get_mut(draft_id) {
        Some(s) => Ok(s),
        None => Err(err(&req.id, "not_found", "draft not found", None)),
    }
}

fn handle_set_has_faculties(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(value) = req.params.get("value").and_then(|v| v.as_bool()) else {
        return err(&req.id, "bad_params", "value must be boolean", None);
    };
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let changed = session.set_has_faculties(value);
    ok(&req.id, emission(session, changed))
}

fn handle_set_section_type(state: &mut AppState, req: &Request) -> serde_json::Value {
    let value = match req.params.get("value").and_then(|v| v.as_str()) {
        Some(s) => match SectionType::parse(s) {
            Some(t) => t,
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "value must be one of: standard, custom",
                    None,
                )
            }
        },
        None => return err(&req.id, "bad_params", "missing value", None),
    };
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let changed = session.set_section_type(value);
    ok(&req.id, emission(session, changed))
}

fn handle_toggle_faculty(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(faculty_id) = req.params.get("facultyId").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing facultyId", None);
    };
    let Some(checked) = req.params.get("checked").and_then(|v| v.as_bool()) else {
        return err(&req.id, "bad_params", "checked must be boolean", None);
    };
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let changed = session.toggle_faculty(faculty_id, checked);
    ok(&req.id, emission(session, changed))
}

fn handle_toggle_section(state: &mut AppState, req: &Request) -> serde_json::Value {
    let faculty_id = req.params.get("facultyId").and_then(|v| v.as_i64());
    let Some(name) = req.params.get("name").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing name", None);
    };
    let Some(checked) = req.params.get("checked").and_then(|v| v.as_bool()) else {
        return err(&req.id, "bad_params", "checked must be boolean", None);
    };
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let changed = session.toggle_standard_section(faculty_id, name, checked);
    ok(&req.id, emission(session, changed))
}

fn handle_add_custom_section(state: &mut AppState, req: &Request) -> serde_json::Value {
    let faculty_id = req.params.get("facultyId").and_then(|v| v.as_i64());
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let changed = session.add_custom_section(faculty_id);
    ok(&req.id, emission(session, changed))
}

fn handle_rename_custom_section(state: &mut AppState, req: &Request) -> serde_json::Value {
    let faculty_id = req.params.get("facultyId").and_then(|v| v.as_i64());
    let Some(index) = req.params.get("index").and_then(|v| v.as_u64()) else {
        return err(&req.id, "bad_params", "missing index", None);
    };
    let Some(value) = req.params.get("value").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing value", None);
    };
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let changed = session.rename_custom_section(faculty_id, index as usize, value);
    ok(&req.id, emission(session, changed))
}

fn handle_remove_custom_section(state: &mut AppState, req: &Request) -> serde_json::Value {
    let faculty_id = req.params.get("facultyId").and_then(|v| v.as_i64());
    let Some(index) = req.params.get("index").and_then(|v| v.as_u64()) else {
        return err(&req.id, "bad_params", "missing index", None);
    };
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let changed = session.remove_custom_section(faculty_id, index as usize);
    ok(&req.id, emission(session, changed))
}

fn handle_view(state: &mut AppState, req: &Request) -> serde_json::Value {
    let session = match session_mut(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    ok(&req.id, json!({ "view": session.view() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "gradeDraft.open" => Some(handle_open(state, req)),
        "gradeDraft.discard" => Some(handle_discard(state, req)),
        "gradeDraft.setHasFaculties" => Some(handle_set_has_faculties(state, req)),
        "gradeDraft.setSectionType" => Some(handle_set_section_type(state, req)),
        "gradeDraft.toggleFaculty" => Some(handle_toggle_faculty(state, req)),
        "gradeDraft.toggleSection" => Some(handle_toggle_section(state, req)),
        "gradeDraft.addCustomSection" => Some(handle_add_custom_section(state, req)),
        "gradeDraft.renameCustomSection" => Some(handle_rename_custom_section(state, req)),
        "gradeDraft.removeCustomSection" => Some(handle_remove_custom_section(state, req)),
        "gradeDraft.view" => Some(handle_view(state, req)),
        _ => None,
    }
}
