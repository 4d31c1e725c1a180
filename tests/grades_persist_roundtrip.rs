mod test_support;

use serde_json::json;
use test_support::{error_code, request, request_ok, spawn_sidecar, temp_dir};

#[test]
fn flat_grade_create_update_delete_with_guards() {
    let workspace = temp_dir("campus-grades-roundtrip");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let session_id = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "sessions.create",
        json!({ "name": "2082", "startsOn": "2025-04-14", "endsOn": "2026-04-13" }),
    )
    .get("sessionId")
    .and_then(|v| v.as_i64())
    .expect("sessionId");

    let flat_sections = |entries: Vec<serde_json::Value>| {
        json!({
            "hasFaculties": false,
            "sectionType": "standard",
            "sections": entries,
            "facultySections": []
        })
    };

    // The parent form only submits valid drafts; the boundary still guards.
    let empty = request(
        &mut stdin,
        &mut reader,
        "3",
        "grades.create",
        json!({
            "academicSessionId": session_id,
            "name": "Grade 5",
            "sections": flat_sections(vec![])
        }),
    );
    assert_eq!(error_code(&empty), Some("bad_params"));

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "grades.create",
        json!({
            "academicSessionId": session_id,
            "name": "Grade 5",
            "sections": flat_sections(vec![
                json!({ "id": 0, "name": "A", "isNew": true }),
                json!({ "id": 0, "name": "B", "isNew": true }),
            ])
        }),
    );
    let grade_id = created
        .get("gradeId")
        .and_then(|v| v.as_i64())
        .expect("gradeId");
    let section_ids: Vec<i64> = created
        .get("createdSectionIds")
        .and_then(|v| v.as_array())
        .expect("section ids")
        .iter()
        .filter_map(|v| v.as_i64())
        .collect();
    assert_eq!(section_ids.len(), 2);

    let listed = request_ok(&mut stdin, &mut reader, "5", "grades.list", json!({}));
    let row = listed
        .get("grades")
        .and_then(|v| v.as_array())
        .and_then(|rows| rows.first())
        .cloned()
        .expect("grade row");
    assert_eq!(row.get("sectionCount").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(row.get("facultyCount").and_then(|v| v.as_i64()), Some(0));
    assert_eq!(
        row.get("academicSessionName").and_then(|v| v.as_str()),
        Some("2082")
    );

    // Update: persisted entries come back untouched, one new entry joins.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "grades.update",
        json!({
            "gradeId": grade_id,
            "sections": flat_sections(vec![
                json!({ "id": section_ids[0], "name": "A", "isNew": false }),
                json!({ "id": section_ids[1], "name": "B", "isNew": false }),
                json!({ "id": 0, "name": "C", "isNew": true }),
            ])
        }),
    );
    let fetched = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "grades.get",
        json!({ "gradeId": grade_id }),
    );
    let names: Vec<String> = fetched
        .pointer("/grade/sections")
        .and_then(|v| v.as_array())
        .expect("sections")
        .iter()
        .filter_map(|s| s.get("name").and_then(|v| v.as_str()).map(String::from))
        .collect();
    assert_eq!(names, vec!["A", "B", "C"]);

    // Dropping a persisted section is refused.
    let dropped = request(
        &mut stdin,
        &mut reader,
        "8",
        "grades.update",
        json!({
            "gradeId": grade_id,
            "sections": flat_sections(vec![
                json!({ "id": section_ids[0], "name": "A", "isNew": false }),
            ])
        }),
    );
    assert_eq!(error_code(&dropped), Some("bad_params"));

    // So is renaming one.
    let renamed = request(
        &mut stdin,
        &mut reader,
        "9",
        "grades.update",
        json!({
            "gradeId": grade_id,
            "sections": flat_sections(vec![
                json!({ "id": section_ids[0], "name": "Z", "isNew": false }),
                json!({ "id": section_ids[1], "name": "B", "isNew": false }),
            ])
        }),
    );
    assert_eq!(error_code(&renamed), Some("bad_params"));

    // And flipping the naming scheme once sections are persisted.
    let relocked = request(
        &mut stdin,
        &mut reader,
        "10",
        "grades.update",
        json!({
            "gradeId": grade_id,
            "sections": {
                "hasFaculties": false,
                "sectionType": "custom",
                "sections": [
                    { "id": section_ids[0], "name": "A", "isNew": false },
                    { "id": section_ids[1], "name": "B", "isNew": false },
                    { "id": 0, "name": "C", "isNew": true }
                ],
                "facultySections": []
            }
        }),
    );
    assert_eq!(error_code(&relocked), Some("mode_locked"));

    // Duplicate names are a hard error at the save boundary.
    let duplicated = request(
        &mut stdin,
        &mut reader,
        "11",
        "grades.create",
        json!({
            "academicSessionId": session_id,
            "name": "Grade 6",
            "sections": flat_sections(vec![
                json!({ "id": 0, "name": "A", "isNew": true }),
                json!({ "id": 0, "name": "A", "isNew": true }),
            ])
        }),
    );
    assert_eq!(error_code(&duplicated), Some("bad_params"));

    // Grade names are unique per academic session.
    let collided = request(
        &mut stdin,
        &mut reader,
        "12",
        "grades.create",
        json!({
            "academicSessionId": session_id,
            "name": "Grade 5",
            "sections": flat_sections(vec![
                json!({ "id": 0, "name": "A", "isNew": true }),
            ])
        }),
    );
    assert_eq!(error_code(&collided), Some("db_insert_failed"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "grades.delete",
        json!({ "gradeId": grade_id }),
    );
    let gone = request(
        &mut stdin,
        &mut reader,
        "14",
        "grades.get",
        json!({ "gradeId": grade_id }),
    );
    assert_eq!(error_code(&gone), Some("not_found"));
}

#[test]
fn standard_payload_rejects_names_outside_the_set() {
    let workspace = temp_dir("campus-grades-standard-names");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let session_id = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "sessions.create",
        json!({ "name": "2083", "startsOn": "2026-04-14", "endsOn": "2027-04-13" }),
    )
    .get("sessionId")
    .and_then(|v| v.as_i64())
    .expect("sessionId");

    let rejected = request(
        &mut stdin,
        &mut reader,
        "3",
        "grades.create",
        json!({
            "academicSessionId": session_id,
            "name": "Grade 7",
            "sections": {
                "hasFaculties": false,
                "sectionType": "standard",
                "sections": [{ "id": 0, "name": "Red", "isNew": true }],
                "facultySections": []
            }
        }),
    );
    assert_eq!(error_code(&rejected), Some("bad_params"));

    // The id / isNew invariant is checked too.
    let inconsistent = request(
        &mut stdin,
        &mut reader,
        "4",
        "grades.create",
        json!({
            "academicSessionId": session_id,
            "name": "Grade 7",
            "sections": {
                "hasFaculties": false,
                "sectionType": "standard",
                "sections": [{ "id": 12, "name": "A", "isNew": true }],
                "facultySections": []
            }
        }),
    );
    assert_eq!(error_code(&inconsistent), Some("bad_params"));
}
