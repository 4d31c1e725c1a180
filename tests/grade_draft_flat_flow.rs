mod test_support;

use serde_json::json;
use test_support::{error_code, request, request_ok, spawn_sidecar, temp_dir};

#[test]
fn flat_standard_sections_toggle_and_validate() {
    let workspace = temp_dir("campus-draft-flat");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let open = request_ok(&mut stdin, &mut reader, "2", "gradeDraft.open", json!({}));
    let draft_id = open
        .get("draftId")
        .and_then(|v| v.as_str())
        .expect("draftId")
        .to_string();
    assert_eq!(open.pointer("/valid").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(open.pointer("/locked").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        open.pointer("/draft/hasFaculties").and_then(|v| v.as_bool()),
        Some(false)
    );
    assert_eq!(
        open.pointer("/draft/sectionType").and_then(|v| v.as_str()),
        Some("standard")
    );

    let toggled = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "gradeDraft.toggleSection",
        json!({ "draftId": draft_id, "name": "A", "checked": true }),
    );
    assert_eq!(toggled.pointer("/changed").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(toggled.pointer("/valid").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(
        toggled.pointer("/draft/sections/0").cloned(),
        Some(json!({ "id": 0, "name": "A", "isNew": true }))
    );

    // Checking an already-checked name changes nothing.
    let again = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "gradeDraft.toggleSection",
        json!({ "draftId": draft_id, "name": "A", "checked": true }),
    );
    assert_eq!(again.pointer("/changed").and_then(|v| v.as_bool()), Some(false));

    // Unchecking the only section empties and invalidates the draft.
    let unchecked = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "gradeDraft.toggleSection",
        json!({ "draftId": draft_id, "name": "A", "checked": false }),
    );
    assert_eq!(unchecked.pointer("/changed").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(unchecked.pointer("/valid").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        unchecked
            .pointer("/draft/sections")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(0)
    );

    // Names outside the standard set are ignored.
    let bogus = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "gradeDraft.toggleSection",
        json!({ "draftId": draft_id, "name": "H", "checked": true }),
    );
    assert_eq!(bogus.pointer("/changed").and_then(|v| v.as_bool()), Some(false));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "gradeDraft.setSectionType",
        json!({ "draftId": draft_id, "value": "custom" }),
    );
    let added = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "gradeDraft.addCustomSection",
        json!({ "draftId": draft_id }),
    );
    assert_eq!(added.pointer("/valid").and_then(|v| v.as_bool()), Some(true));
    // A blank name is a warning here, not an error.
    assert_eq!(
        added
            .pointer("/warnings")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(1)
    );

    let renamed = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "gradeDraft.renameCustomSection",
        json!({ "draftId": draft_id, "index": 0, "value": "Morning" }),
    );
    assert_eq!(
        renamed.pointer("/draft/sections/0/name").and_then(|v| v.as_str()),
        Some("Morning")
    );
    assert_eq!(
        renamed
            .pointer("/warnings")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(0)
    );

    // Standard checkbox events do nothing under the custom scheme.
    let ignored = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "gradeDraft.toggleSection",
        json!({ "draftId": draft_id, "name": "A", "checked": true }),
    );
    assert_eq!(ignored.pointer("/changed").and_then(|v| v.as_bool()), Some(false));

    let removed = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "gradeDraft.removeCustomSection",
        json!({ "draftId": draft_id, "index": 0 }),
    );
    assert_eq!(removed.pointer("/valid").and_then(|v| v.as_bool()), Some(false));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "gradeDraft.discard",
        json!({ "draftId": draft_id }),
    );
    let gone = request(
        &mut stdin,
        &mut reader,
        "13",
        "gradeDraft.view",
        json!({ "draftId": draft_id }),
    );
    assert_eq!(error_code(&gone), Some("not_found"));
}

#[test]
fn flat_view_renders_seven_standard_cells() {
    let workspace = temp_dir("campus-draft-flat-view");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let open = request_ok(&mut stdin, &mut reader, "2", "gradeDraft.open", json!({}));
    let draft_id = open
        .get("draftId")
        .and_then(|v| v.as_str())
        .expect("draftId")
        .to_string();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "gradeDraft.toggleSection",
        json!({ "draftId": draft_id, "name": "B", "checked": true }),
    );
    let view = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "gradeDraft.view",
        json!({ "draftId": draft_id }),
    );

    let cells = view
        .pointer("/view/generalRow/standardCells")
        .and_then(|v| v.as_array())
        .expect("standard cells");
    assert_eq!(cells.len(), 7);
    assert_eq!(cells[0].get("name").and_then(|v| v.as_str()), Some("A"));
    assert_eq!(cells[1].get("checked").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(cells[1].get("disabled").and_then(|v| v.as_bool()), Some(false));
    // No faculty rows in flat mode: the implicit General faculty has no row.
    assert!(view.pointer("/view/facultyRows").is_none());
}
