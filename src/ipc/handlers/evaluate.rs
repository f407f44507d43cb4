use crate::ipc::error::{err, ok};
use crate::ipc::handlers::persist::{self, load_payload};
use crate::ipc::types::{AppState, EvalSession, Request};
use crate::model::{Rubric, RubricKind};
use crate::payload;
use crate::scoring::{self, Selections, OVERALL_KEY};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn score_response(id: &str, session_id: &str, session: &EvalSession) -> serde_json::Value {
    let result = scoring::score(&session.rubric, &session.selections);
    ok(
        id,
        json!({
            "sessionId": session_id,
            "totalScore": result.total_score,
            "maxScore": result.max_score,
            "feedbackText": result.feedback_text,
        }),
    )
}

fn require_session<'a>(
    state: &'a mut AppState,
    req: &Request,
) -> Result<(&'a mut EvalSession, String), serde_json::Value> {
    let Some(session_id) = req.params.get("sessionId").and_then(|v| v.as_str()) else {
        return Err(err(&req.id, "bad_params", "missing sessionId", None));
    };
    let session_id = session_id.to_string();
    match state.sessions.get_mut(&session_id) {
        Some(s) => Ok((s, session_id)),
        None => Err(err(&req.id, "not_found", "no open evaluation session", None)),
    }
}

/// Hydrates a session from an open draft or, failing that, the saved
/// rubric store. The session takes its own snapshot: later draft edits
/// do not leak into an evaluation in progress.
fn resolve_rubric(state: &AppState, rubric_id: &str) -> Option<Rubric> {
    if let Some(draft) = state.drafts.get(rubric_id) {
        return Some(draft.clone());
    }
    let conn = state.db.as_ref()?;
    match load_payload(conn, rubric_id) {
        Ok(Some(body)) => payload::from_payload(&body).ok(),
        _ => None,
    }
}

fn handle_start(state: &mut AppState, req: &Request) -> serde_json::Value {
    let rubric_id = match req.params.get("rubricId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing rubricId", None),
    };
    let student_attempt_id = match req.params.get("studentAttemptId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing studentAttemptId", None),
    };
    let question_response_id = req
        .params
        .get("questionResponseId")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let Some(rubric) = resolve_rubric(state, &rubric_id) else {
        return err(&req.id, "not_found", "rubric not found", None);
    };

    let session_id = Uuid::new_v4().to_string();
    let session = EvalSession {
        rubric,
        student_attempt_id,
        question_response_id,
        selections: Selections::new(),
    };

    // The hydrated snapshot is echoed back: a rubric fetched from the
    // store carries fresh ids, and the host needs them to address
    // selections.
    let rubric_json = match serde_json::to_value(&session.rubric) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "serialize_failed", e.to_string(), None),
    };
    let result = scoring::score(&session.rubric, &session.selections);
    state.sessions.insert(session_id.clone(), session);
    ok(
        &req.id,
        json!({
            "sessionId": session_id,
            "rubric": rubric_json,
            "totalScore": result.total_score,
            "maxScore": result.max_score,
            "feedbackText": result.feedback_text,
        }),
    )
}

fn handle_select_level(state: &mut AppState, req: &Request) -> serde_json::Value {
    let level_id = match req.params.get("levelId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing levelId", None),
    };
    let criterion_id = req
        .params
        .get("criterionId")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let (session, session_id) = match require_session(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match &session.rubric.kind {
        RubricKind::Analytic { columns, criteria } => {
            let Some(criterion_id) = criterion_id else {
                return err(&req.id, "bad_params", "missing criterionId", None);
            };
            if !criteria.iter().any(|c| c.id == criterion_id) {
                return err(&req.id, "not_found", "criterion not found", None);
            }
            if !columns.iter().any(|c| c.id == level_id) {
                return err(&req.id, "not_found", "level not found", None);
            }
            session.selections.select_level(&criterion_id, &level_id);
        }
        RubricKind::Holistic { levels } => {
            if !levels.iter().any(|l| l.id == level_id) {
                return err(&req.id, "not_found", "level not found", None);
            }
            session.selections.select_level(OVERALL_KEY, &level_id);
        }
        _ => {
            return err(
                &req.id,
                "wrong_kind",
                "level selection applies to analytic and holistic rubrics",
                None,
            )
        }
    }

    score_response(&req.id, &session_id, session)
}

fn handle_toggle_item(state: &mut AppState, req: &Request) -> serde_json::Value {
    let item_id = match req.params.get("itemId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing itemId", None),
    };
    let (session, session_id) = match require_session(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match &session.rubric.kind {
        RubricKind::Developmental { items } => {
            if !items.iter().any(|i| i.id == item_id) {
                return err(&req.id, "not_found", "item not found", None);
            }
            session.selections.toggle_item(&item_id);
        }
        _ => {
            return err(
                &req.id,
                "wrong_kind",
                "item toggles apply to developmental rubrics",
                None,
            )
        }
    }

    score_response(&req.id, &session_id, session)
}

fn handle_set_comment(state: &mut AppState, req: &Request) -> serde_json::Value {
    let key = match req.params.get("key").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing key", None),
    };
    let text = req
        .params
        .get("text")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let (session, session_id) = match require_session(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    session.selections.set_comment(&key, &text);
    score_response(&req.id, &session_id, session)
}

fn handle_score(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (session, session_id) = match require_session(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    score_response(&req.id, &session_id, session)
}

fn handle_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session_id) = req.params.get("sessionId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing sessionId", None);
    };
    let session_id = session_id.to_string();
    let Some(session) = state.sessions.get(&session_id) else {
        return err(&req.id, "not_found", "no open evaluation session", None);
    };
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let result = scoring::score(&session.rubric, &session.selections);
    let entries = scoring::rubric_entries(&session.rubric, &session.selections);

    let evaluation_id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // A draft-backed session references a rubric the store has never
    // seen; persist the session snapshot first so the evaluation's
    // rubric_id resolves.
    let stored = tx
        .query_row(
            "SELECT 1 FROM rubrics WHERE id = ?",
            [&session.rubric.id],
            |_| Ok(()),
        )
        .optional();
    match stored {
        Ok(Some(())) => {}
        Ok(None) => {
            if let Err(e) = persist::write_rubric(&tx, &session.rubric, &now) {
                let _ = tx.rollback();
                return persist::rubric_write_err(&req.id, e);
            }
        }
        Err(e) => {
            let _ = tx.rollback();
            return err(&req.id, "db_query_failed", e.to_string(), None);
        }
    }

    if let Err(e) = tx.execute(
        "INSERT INTO evaluations(id, rubric_id, student_attempt_id, question_response_id,
                                 marks_obtained, max_marks, feedback, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &evaluation_id,
            &session.rubric.id,
            &session.student_attempt_id,
            &session.question_response_id,
            result.total_score,
            result.max_score,
            &result.feedback_text,
            &now,
        ),
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "evaluations" })),
        );
    }

    for entry in &entries {
        if let Err(e) = tx.execute(
            "INSERT INTO evaluation_entries(id, evaluation_id, criterion_id, level_id, feedback)
             VALUES(?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                &evaluation_id,
                &entry.criterion_id,
                &entry.level_id,
                &entry.feedback,
            ),
        ) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "evaluation_entries" })),
            );
        }
    }

    if let Err(e) = tx.commit() {
        // In-memory selections stay intact for a manual retry.
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    state.sessions.remove(&session_id);
    ok(
        &req.id,
        json!({
            "evaluationId": evaluation_id,
            "marksObtained": result.total_score,
            "maxMarks": result.max_score,
            "feedback": result.feedback_text,
            "entryCount": entries.len(),
            "rubricEntries": entries,
        }),
    )
}

fn handle_discard(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session_id) = req.params.get("sessionId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing sessionId", None);
    };
    match state.sessions.remove(session_id) {
        Some(_) => ok(&req.id, json!({ "discarded": true })),
        None => err(&req.id, "not_found", "no open evaluation session", None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "evaluations.start" => Some(handle_start(state, req)),
        "evaluations.selectLevel" => Some(handle_select_level(state, req)),
        "evaluations.toggleItem" => Some(handle_toggle_item(state, req)),
        "evaluations.setComment" => Some(handle_set_comment(state, req)),
        "evaluations.score" => Some(handle_score(state, req)),
        "evaluations.save" => Some(handle_save(state, req)),
        "evaluations.discard" => Some(handle_discard(state, req)),
        _ => None,
    }
}
