use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::model::Rubric;
use crate::payload::{
    self, PayloadCell, PayloadCriterion, PayloadLevel, PayloadPortfolio, RubricPayload,
};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn tags_to_json(tags: &[String]) -> String {
    serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string())
}

fn tags_from_json(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

pub struct RubricWriteError {
    pub code: &'static str,
    pub table: &'static str,
    pub source: rusqlite::Error,
}

impl RubricWriteError {
    fn insert(table: &'static str) -> impl FnOnce(rusqlite::Error) -> RubricWriteError {
        move |source| RubricWriteError {
            code: "db_insert_failed",
            table,
            source,
        }
    }
}

pub fn rubric_write_err(req_id: &str, e: RubricWriteError) -> serde_json::Value {
    err(
        req_id,
        e.code,
        e.source.to_string(),
        Some(json!({ "table": e.table })),
    )
}

/// Writes a rubric snapshot into the store: header upsert, then a full
/// replace of the child rows (the payload is the source of truth). Runs
/// inside the caller's transaction.
pub fn write_rubric(
    conn: &Connection,
    rubric: &Rubric,
    now: &str,
) -> Result<(), RubricWriteError> {
    let body = payload::to_payload(rubric);
    let rubric_id = &rubric.id;

    conn.execute(
        "INSERT INTO rubrics(id, title, description, rubric_type, scoring_type, include_metadata, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           title = excluded.title,
           description = excluded.description,
           rubric_type = excluded.rubric_type,
           scoring_type = excluded.scoring_type,
           include_metadata = excluded.include_metadata,
           updated_at = excluded.updated_at",
        (
            rubric_id,
            &body.title,
            &body.description,
            &body.rubric_type,
            &body.scoring_type,
            body.include_metadata as i64,
            now,
            now,
        ),
    )
    .map_err(RubricWriteError::insert("rubrics"))?;

    for table in [
        "rubric_criteria",
        "rubric_levels",
        "rubric_cells",
        "rubric_portfolios",
    ] {
        conn.execute(&format!("DELETE FROM {table} WHERE rubric_id = ?"), [rubric_id])
            .map_err(|source| RubricWriteError {
                code: "db_delete_failed",
                table,
                source,
            })?;
    }

    for c in &body.criteria {
        conn.execute(
            "INSERT INTO rubric_criteria(id, rubric_id, criterion_order, name, description,
                                         weight_percentage, standard, feedback_fields,
                                         blooms_levels, co_mapping, po_mapping)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                rubric_id,
                c.criterion_order as i64,
                &c.name,
                &c.description,
                c.weight_percentage,
                &c.standard,
                tags_to_json(&c.feedback_fields),
                tags_to_json(&c.blooms_levels),
                tags_to_json(&c.co_mapping),
                tags_to_json(&c.po_mapping),
            ),
        )
        .map_err(RubricWriteError::insert("rubric_criteria"))?;
    }

    for l in &body.performance_levels {
        conn.execute(
            "INSERT INTO rubric_levels(id, rubric_id, level_order, label, score, description, image)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                rubric_id,
                l.level_order as i64,
                &l.label,
                l.score,
                &l.description,
                &l.image,
            ),
        )
        .map_err(RubricWriteError::insert("rubric_levels"))?;
    }

    for cell in &body.cells {
        conn.execute(
            "INSERT INTO rubric_cells(rubric_id, criterion_order, level_order, score, description, image)
             VALUES(?, ?, ?, ?, ?, ?)",
            (
                rubric_id,
                cell.criterion_order as i64,
                cell.level_order as i64,
                cell.score,
                &cell.description,
                &cell.image,
            ),
        )
        .map_err(RubricWriteError::insert("rubric_cells"))?;
    }

    for p in &body.portfolios {
        conn.execute(
            "INSERT INTO rubric_portfolios(id, rubric_id, portfolio_order, label, is_required,
                                           blooms_levels, co_mapping)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                rubric_id,
                p.portfolio_order as i64,
                &p.label,
                p.is_required as i64,
                tags_to_json(&p.blooms_levels),
                tags_to_json(&p.co_mapping),
            ),
        )
        .map_err(RubricWriteError::insert("rubric_portfolios"))?;
    }

    Ok(())
}

fn handle_rubrics_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let rubric_id = match req.params.get("rubricId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing rubricId", None),
    };
    let Some(rubric) = state.drafts.get(&rubric_id) else {
        return err(&req.id, "not_found", "no open draft for rubricId", None);
    };

    let now = chrono::Utc::now().to_rfc3339();
    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    if let Err(e) = write_rubric(&tx, rubric, &now) {
        let _ = tx.rollback();
        return rubric_write_err(&req.id, e);
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    // Ownership moves to the store once saved.
    state.drafts.remove(&rubric_id);
    ok(&req.id, json!({ "rubricId": rubric_id }))
}

pub fn load_payload(
    conn: &Connection,
    rubric_id: &str,
) -> Result<Option<RubricPayload>, rusqlite::Error> {
    let header: Option<(String, String, String, String, i64)> = conn
        .query_row(
            "SELECT title, description, rubric_type, scoring_type, include_metadata
             FROM rubrics WHERE id = ?",
            [rubric_id],
            |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get(3)?,
                    r.get(4)?,
                ))
            },
        )
        .optional()?;
    let Some((title, description, rubric_type, scoring_type, include_metadata)) = header else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT criterion_order, name, description, weight_percentage, standard,
                feedback_fields, blooms_levels, co_mapping, po_mapping
         FROM rubric_criteria WHERE rubric_id = ? ORDER BY criterion_order",
    )?;
    let criteria: Vec<PayloadCriterion> = stmt
        .query_map([rubric_id], |r| {
            Ok(PayloadCriterion {
                criterion_order: r.get::<_, i64>(0)? as usize,
                name: r.get(1)?,
                description: r.get(2)?,
                weight_percentage: r.get(3)?,
                standard: r.get(4)?,
                feedback_fields: tags_from_json(&r.get::<_, String>(5)?),
                blooms_levels: tags_from_json(&r.get::<_, String>(6)?),
                co_mapping: tags_from_json(&r.get::<_, String>(7)?),
                po_mapping: tags_from_json(&r.get::<_, String>(8)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT level_order, label, score, description, image
         FROM rubric_levels WHERE rubric_id = ? ORDER BY level_order",
    )?;
    let performance_levels: Vec<PayloadLevel> = stmt
        .query_map([rubric_id], |r| {
            Ok(PayloadLevel {
                level_order: r.get::<_, i64>(0)? as usize,
                label: r.get(1)?,
                score: r.get(2)?,
                description: r.get(3)?,
                image: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT criterion_order, level_order, score, description, image
         FROM rubric_cells WHERE rubric_id = ? ORDER BY criterion_order, level_order",
    )?;
    let cells: Vec<PayloadCell> = stmt
        .query_map([rubric_id], |r| {
            Ok(PayloadCell {
                criterion_order: r.get::<_, i64>(0)? as usize,
                level_order: r.get::<_, i64>(1)? as usize,
                score: r.get(2)?,
                description: r.get(3)?,
                image: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT portfolio_order, label, is_required, blooms_levels, co_mapping
         FROM rubric_portfolios WHERE rubric_id = ? ORDER BY portfolio_order",
    )?;
    let portfolios: Vec<PayloadPortfolio> = stmt
        .query_map([rubric_id], |r| {
            Ok(PayloadPortfolio {
                portfolio_order: r.get::<_, i64>(0)? as usize,
                label: r.get(1)?,
                is_required: r.get::<_, i64>(2)? != 0,
                blooms_levels: tags_from_json(&r.get::<_, String>(3)?),
                co_mapping: tags_from_json(&r.get::<_, String>(4)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(RubricPayload {
        rubric_type,
        scoring_type,
        title,
        description,
        include_metadata: include_metadata != 0,
        criteria,
        performance_levels,
        cells,
        portfolios,
    }))
}

fn handle_rubrics_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let rubric_id = match req.params.get("rubricId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing rubricId", None),
    };

    let body = match load_payload(conn, &rubric_id) {
        Ok(Some(p)) => p,
        Ok(None) => return err(&req.id, "not_found", "rubric not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rubric = match payload::from_payload(&body) {
        Ok(r) => r,
        Err(e) => return err(&req.id, &e.code, e.message, None),
    };

    ok(
        &req.id,
        json!({
            "payload": body,
            "rubric": rubric,
        }),
    )
}

fn handle_rubrics_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let mut stmt = match conn.prepare(
        "SELECT id, title, rubric_type, scoring_type, updated_at
         FROM rubrics ORDER BY updated_at DESC",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |r| {
            let id: String = r.get(0)?;
            let title: String = r.get(1)?;
            let rubric_type: String = r.get(2)?;
            let scoring_type: String = r.get(3)?;
            let updated_at: Option<String> = r.get(4)?;
            Ok(json!({
                "rubricId": id,
                "title": title,
                "rubricType": rubric_type,
                "scoringType": scoring_type,
                "updatedAt": updated_at
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(rubrics) => ok(&req.id, json!({ "rubrics": rubrics })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_rubrics_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let rubric_id = match req.params.get("rubricId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing rubricId", None),
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    for table in [
        "rubric_criteria",
        "rubric_levels",
        "rubric_cells",
        "rubric_portfolios",
    ] {
        if let Err(e) = tx.execute(
            &format!("DELETE FROM {table} WHERE rubric_id = ?"),
            [&rubric_id],
        ) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": table })),
            );
        }
    }
    let changed = match tx.execute("DELETE FROM rubrics WHERE id = ?", [&rubric_id]) {
        Ok(v) => v,
        Err(e) => {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": "rubrics" })),
            );
        }
    };
    if changed == 0 {
        let _ = tx.rollback();
        return err(&req.id, "not_found", "rubric not found", None);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "rubrics.save" => Some(handle_rubrics_save(state, req)),
        "rubrics.get" => Some(handle_rubrics_get(state, req)),
        "rubrics.list" => Some(handle_rubrics_list(state, req)),
        "rubrics.delete" => Some(handle_rubrics_delete(state, req)),
        _ => None,
    }
}
