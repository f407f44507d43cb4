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

#[test]
fn analytic_selection_scores_and_feedback_lock() {
    // 1 criterion x 4 levels scored 1,2,3,4 at weight 1:
    // theoretical max 4, selecting the score-3 level totals 3.
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let created = request(
        &mut stdin,
        &mut reader,
        "1",
        "rubrics.create",
        json!({ "type": "analytic" }),
    );
    let r = created.pointer("/result/rubric").expect("rubric");
    let rubric_id = r["id"].as_str().expect("id").to_string();
    let criterion_id = r["criteria"][0]["id"].as_str().expect("criterion").to_string();
    let column_ids: Vec<String> = r["columns"]
        .as_array()
        .expect("columns")
        .iter()
        .map(|c| c["id"].as_str().expect("column id").to_string())
        .collect();

    for (i, score) in [1.0, 2.0, 3.0, 4.0].iter().enumerate() {
        let _ = request(
            &mut stdin,
            &mut reader,
            &format!("cell-{i}"),
            "rubrics.updateCell",
            json!({
                "rubricId": rubric_id,
                "criterionId": criterion_id,
                "columnId": column_ids[i],
                "field": "score",
                "value": score,
            }),
        );
    }

    let total = request(
        &mut stdin,
        &mut reader,
        "2",
        "rubrics.totalPoints",
        json!({ "rubricId": rubric_id }),
    );
    assert_eq!(
        total.pointer("/result/totalPoints").and_then(|v| v.as_f64()),
        Some(4.0)
    );

    let started = request(
        &mut stdin,
        &mut reader,
        "3",
        "evaluations.start",
        json!({ "rubricId": rubric_id, "studentAttemptId": "attempt-1", "questionResponseId": "q-1" }),
    );
    let session_id = started
        .pointer("/result/sessionId")
        .and_then(|v| v.as_str())
        .expect("session")
        .to_string();
    assert_eq!(
        started.pointer("/result/totalScore").and_then(|v| v.as_f64()),
        Some(0.0)
    );

    // Third column carries score 3 after the edits above.
    let selected = request(
        &mut stdin,
        &mut reader,
        "4",
        "evaluations.selectLevel",
        json!({ "sessionId": session_id, "criterionId": criterion_id, "levelId": column_ids[2] }),
    );
    assert_eq!(
        selected.pointer("/result/totalScore").and_then(|v| v.as_f64()),
        Some(3.0)
    );
    assert_eq!(
        selected.pointer("/result/maxScore").and_then(|v| v.as_f64()),
        Some(4.0)
    );
    assert_eq!(
        selected.pointer("/result/feedbackText").and_then(|v| v.as_str()),
        Some("New Criterion: Satisfactory (3 pts)")
    );

    // Reselecting replaces, never accumulates.
    let reselected = request(
        &mut stdin,
        &mut reader,
        "5",
        "evaluations.selectLevel",
        json!({ "sessionId": session_id, "criterionId": criterion_id, "levelId": column_ids[3] }),
    );
    assert_eq!(
        reselected.pointer("/result/totalScore").and_then(|v| v.as_f64()),
        Some(4.0)
    );

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn developmental_checked_count_is_the_total() {
    // 3 items with 2 checked: 2 of 3 regardless of required flags.
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let created = request(
        &mut stdin,
        &mut reader,
        "1",
        "rubrics.create",
        json!({ "type": "developmental" }),
    );
    let rubric_id = created
        .pointer("/result/rubric/id")
        .and_then(|v| v.as_str())
        .expect("id")
        .to_string();
    let _ = request(
        &mut stdin,
        &mut reader,
        "2",
        "rubrics.addItem",
        json!({ "rubricId": rubric_id }),
    );
    let grown = request(
        &mut stdin,
        &mut reader,
        "3",
        "rubrics.addItem",
        json!({ "rubricId": rubric_id }),
    );
    let items: Vec<String> = grown
        .pointer("/result/rubric/items")
        .and_then(|v| v.as_array())
        .expect("items")
        .iter()
        .map(|i| i["id"].as_str().expect("item id").to_string())
        .collect();
    assert_eq!(items.len(), 3);

    // One optional item among the checked ones.
    let _ = request(
        &mut stdin,
        &mut reader,
        "4",
        "rubrics.updateItem",
        json!({ "rubricId": rubric_id, "itemId": items[1], "field": "required", "value": false }),
    );

    let started = request(
        &mut stdin,
        &mut reader,
        "5",
        "evaluations.start",
        json!({ "rubricId": rubric_id, "studentAttemptId": "attempt-2" }),
    );
    let session_id = started
        .pointer("/result/sessionId")
        .and_then(|v| v.as_str())
        .expect("session")
        .to_string();

    let _ = request(
        &mut stdin,
        &mut reader,
        "6",
        "evaluations.toggleItem",
        json!({ "sessionId": session_id, "itemId": items[0] }),
    );
    let second = request(
        &mut stdin,
        &mut reader,
        "7",
        "evaluations.toggleItem",
        json!({ "sessionId": session_id, "itemId": items[1] }),
    );
    assert_eq!(
        second.pointer("/result/totalScore").and_then(|v| v.as_f64()),
        Some(2.0)
    );
    assert_eq!(
        second.pointer("/result/maxScore").and_then(|v| v.as_f64()),
        Some(3.0)
    );
    assert_eq!(
        second.pointer("/result/feedbackText").and_then(|v| v.as_str()),
        Some("2 of 3 items complete")
    );

    // Toggling the same item again unchecks it.
    let third = request(
        &mut stdin,
        &mut reader,
        "8",
        "evaluations.toggleItem",
        json!({ "sessionId": session_id, "itemId": items[1] }),
    );
    assert_eq!(
        third.pointer("/result/totalScore").and_then(|v| v.as_f64()),
        Some(1.0)
    );

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn single_point_comments_drive_feedback_without_marks() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let created = request(
        &mut stdin,
        &mut reader,
        "1",
        "rubrics.create",
        json!({ "type": "singlePoint" }),
    );
    let rubric_id = created
        .pointer("/result/rubric/id")
        .and_then(|v| v.as_str())
        .expect("id")
        .to_string();
    let criterion_id = created
        .pointer("/result/rubric/criteria/0/id")
        .and_then(|v| v.as_str())
        .expect("criterion")
        .to_string();

    let started = request(
        &mut stdin,
        &mut reader,
        "2",
        "evaluations.start",
        json!({ "rubricId": rubric_id, "studentAttemptId": "attempt-3" }),
    );
    let session_id = started
        .pointer("/result/sessionId")
        .and_then(|v| v.as_str())
        .expect("session")
        .to_string();

    let commented = request(
        &mut stdin,
        &mut reader,
        "3",
        "evaluations.setComment",
        json!({
            "sessionId": session_id,
            "key": format!("{criterion_id}_improvement"),
            "text": "expand the analysis"
        }),
    );
    assert_eq!(
        commented.pointer("/result/totalScore").and_then(|v| v.as_f64()),
        Some(0.0)
    );
    assert_eq!(
        commented.pointer("/result/maxScore").and_then(|v| v.as_f64()),
        Some(0.0)
    );
    assert_eq!(
        commented.pointer("/result/feedbackText").and_then(|v| v.as_str()),
        Some("New Criterion (Improvement): expand the analysis")
    );

    drop(stdin);
    let _ = child.wait();
}
