use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_rubricd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn rubricd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn rubric(resp: &serde_json::Value) -> &serde_json::Value {
    resp.pointer("/result/rubric")
        .unwrap_or_else(|| panic!("no rubric in response: {resp}"))
}

#[test]
fn analytic_grid_stays_rectangular_through_edits() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let created = request(
        &mut stdin,
        &mut reader,
        "1",
        "rubrics.create",
        json!({ "type": "analytic" }),
    );
    let r = rubric(&created);
    let rubric_id = r["id"].as_str().expect("id").to_string();
    assert_eq!(r["type"].as_str(), Some("analytic"));
    assert_eq!(r["columns"].as_array().expect("columns").len(), 4);
    assert_eq!(r["criteria"].as_array().expect("criteria").len(), 1);

    let after_row = request(
        &mut stdin,
        &mut reader,
        "2",
        "rubrics.addCriterion",
        json!({ "rubricId": rubric_id }),
    );
    let after_col = request(
        &mut stdin,
        &mut reader,
        "3",
        "rubrics.addLevelColumn",
        json!({ "rubricId": rubric_id, "label": "Exceptional", "score": 5.0 }),
    );
    let r = rubric(&after_col);
    let columns = r["columns"].as_array().expect("columns");
    assert_eq!(columns.len(), 5);
    for criterion in r["criteria"].as_array().expect("criteria") {
        assert_eq!(criterion["cells"].as_array().expect("cells").len(), 5);
    }
    drop(after_row);

    let after_delete = request(
        &mut stdin,
        &mut reader,
        "4",
        "rubrics.deleteLevelColumn",
        json!({ "rubricId": rubric_id, "index": 0 }),
    );
    let r = rubric(&after_delete);
    assert_eq!(r["columns"].as_array().expect("columns").len(), 4);
    for criterion in r["criteria"].as_array().expect("criteria") {
        assert_eq!(criterion["cells"].as_array().expect("cells").len(), 4);
    }

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn switch_type_discards_collections_but_keeps_meta() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let created = request(
        &mut stdin,
        &mut reader,
        "1",
        "rubrics.create",
        json!({ "type": "analytic" }),
    );
    let rubric_id = rubric(&created)["id"].as_str().expect("id").to_string();

    let _ = request(
        &mut stdin,
        &mut reader,
        "2",
        "rubrics.updateMeta",
        json!({ "rubricId": rubric_id, "field": "title", "value": "Capstone" }),
    );
    let switched = request(
        &mut stdin,
        &mut reader,
        "3",
        "rubrics.switchType",
        json!({ "rubricId": rubric_id, "type": "developmental" }),
    );
    let r = rubric(&switched);
    assert_eq!(r["type"].as_str(), Some("developmental"));
    assert_eq!(r["title"].as_str(), Some("Capstone"));
    let items = r["items"].as_array().expect("items");
    assert!(!items.is_empty());
    assert!(r.get("criteria").is_none());
    assert!(r.get("columns").is_none());

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn tag_toggle_reverses_itself_over_ipc() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let created = request(
        &mut stdin,
        &mut reader,
        "1",
        "rubrics.create",
        json!({ "type": "analytic" }),
    );
    let r = rubric(&created);
    let rubric_id = r["id"].as_str().expect("id").to_string();
    let criterion_id = r["criteria"][0]["id"].as_str().expect("criterion id").to_string();

    let on = request(
        &mut stdin,
        &mut reader,
        "2",
        "rubrics.toggleTag",
        json!({ "rubricId": rubric_id, "targetId": criterion_id, "tagSet": "blooms", "tag": "Evaluate" }),
    );
    assert_eq!(
        rubric(&on)["criteria"][0]["bloomsLevels"],
        json!(["Evaluate"])
    );
    let off = request(
        &mut stdin,
        &mut reader,
        "3",
        "rubrics.toggleTag",
        json!({ "rubricId": rubric_id, "targetId": criterion_id, "tagSet": "blooms", "tag": "Evaluate" }),
    );
    assert_eq!(rubric(&off)["criteria"][0]["bloomsLevels"], json!([]));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn failed_edit_leaves_draft_unchanged() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let created = request(
        &mut stdin,
        &mut reader,
        "1",
        "rubrics.create",
        json!({ "type": "analytic" }),
    );
    let rubric_id = rubric(&created)["id"].as_str().expect("id").to_string();
    let criterion_id = rubric(&created)["criteria"][0]["id"]
        .as_str()
        .expect("criterion id")
        .to_string();

    // Only one criterion: the delete guard must refuse.
    let denied = request(
        &mut stdin,
        &mut reader,
        "2",
        "rubrics.deleteCriterion",
        json!({ "rubricId": rubric_id, "criterionId": criterion_id }),
    );
    assert_eq!(denied.get("ok").and_then(|v| v.as_bool()), Some(false));

    let exported = request(
        &mut stdin,
        &mut reader,
        "3",
        "rubrics.template.export",
        json!({ "rubricId": rubric_id }),
    );
    let template = exported
        .pointer("/result/template")
        .and_then(|v| v.as_str())
        .expect("template");
    let parsed: serde_json::Value = serde_json::from_str(template).expect("template json");
    assert_eq!(parsed["criteria"].as_array().expect("criteria").len(), 1);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn template_import_rejects_unrecognized_type() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let rejected = request(
        &mut stdin,
        &mut reader,
        "1",
        "rubrics.template.import",
        json!({ "template": "{\"title\":\"orphan\"}" }),
    );
    assert_eq!(rejected.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        rejected.pointer("/error/code").and_then(|v| v.as_str()),
        Some("bad_template")
    );

    // A full export round-trips through import into a fresh draft.
    let created = request(
        &mut stdin,
        &mut reader,
        "2",
        "rubrics.create",
        json!({ "type": "singlePoint" }),
    );
    let rubric_id = rubric(&created)["id"].as_str().expect("id").to_string();
    let exported = request(
        &mut stdin,
        &mut reader,
        "3",
        "rubrics.template.export",
        json!({ "rubricId": rubric_id }),
    );
    let template = exported
        .pointer("/result/template")
        .and_then(|v| v.as_str())
        .expect("template")
        .to_string();
    let imported = request(
        &mut stdin,
        &mut reader,
        "4",
        "rubrics.template.import",
        json!({ "template": template }),
    );
    assert_eq!(imported.get("ok").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(rubric(&imported)["type"].as_str(), Some("singlePoint"));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn template_import_rejects_ragged_analytic_grids() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    // Two columns but a single cell in the only row.
    let ragged = json!({
        "type": "analytic",
        "id": "r1",
        "title": "Ragged",
        "description": "",
        "scoringType": "points",
        "includeMetadata": false,
        "columns": [
            { "id": "col-a", "label": "A" },
            { "id": "col-b", "label": "B" }
        ],
        "criteria": [{
            "id": "crit-1",
            "name": "Only",
            "description": "",
            "weight": 1.0,
            "cells": [{ "score": 1.0, "description": "", "image": null }],
            "bloomsLevels": [],
            "coMapping": [],
            "poMapping": []
        }]
    });
    let rejected = request(
        &mut stdin,
        &mut reader,
        "1",
        "rubrics.template.import",
        json!({ "template": ragged.to_string() }),
    );
    assert_eq!(rejected.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        rejected.pointer("/error/code").and_then(|v| v.as_str()),
        Some("bad_template")
    );

    // The sidecar is still alive and serving requests.
    let health = request(&mut stdin, &mut reader, "2", "health", json!({}));
    assert_eq!(health.get("ok").and_then(|v| v.as_bool()), Some(true));

    drop(stdin);
    let _ = child.wait();
}
