use crate::builder;
use crate::builder::{BuilderError, TagField};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::model::{Rubric, RubricType};
use serde_json::json;

fn builder_err(id: &str, e: BuilderError) -> serde_json::Value {
    err(id, &e.code, e.message, None)
}

fn rubric_response(id: &str, rubric: &Rubric) -> serde_json::Value {
    match serde_json::to_value(rubric) {
        Ok(v) => ok(id, json!({ "rubric": v })),
        Err(e) => err(id, "serialize_failed", e.to_string(), None),
    }
}

fn param_str<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params.get(key).and_then(|v| v.as_str())
}

fn require_draft<'a>(
    state: &'a AppState,
    req: &Request,
) -> Result<(&'a Rubric, String), serde_json::Value> {
    let Some(rubric_id) = param_str(req, "rubricId") else {
        return Err(err(&req.id, "bad_params", "missing rubricId", None));
    };
    match state.drafts.get(rubric_id) {
        Some(rubric) => Ok((rubric, rubric_id.to_string())),
        None => Err(err(&req.id, "not_found", "no open draft for rubricId", None)),
    }
}

fn require_type(req: &Request) -> Result<RubricType, serde_json::Value> {
    let Some(raw) = param_str(req, "type") else {
        return Err(err(&req.id, "bad_params", "missing type", None));
    };
    RubricType::parse(raw).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            format!("unknown rubric type: {raw}"),
            None,
        )
    })
}

/// Applies a pure builder transform to a draft and stores the new
/// snapshot on success. The draft is untouched when the transform
/// fails.
fn apply(
    state: &mut AppState,
    req: &Request,
    f: impl FnOnce(&Rubric) -> Result<Rubric, BuilderError>,
) -> serde_json::Value {
    let (rubric, rubric_id) = match require_draft(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match f(rubric) {
        Ok(next) => {
            let resp = rubric_response(&req.id, &next);
            state.drafts.insert(rubric_id, next);
            resp
        }
        Err(e) => builder_err(&req.id, e),
    }
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let rubric_type = match require_type(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let rubric = Rubric::template(rubric_type);
    let resp = rubric_response(&req.id, &rubric);
    state.drafts.insert(rubric.id.clone(), rubric);
    resp
}

fn handle_switch_type(state: &mut AppState, req: &Request) -> serde_json::Value {
    let rubric_type = match require_type(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    apply(state, req, |r| Ok(r.switch_kind(rubric_type)))
}

fn handle_update_meta(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(field) = param_str(req, "field").map(str::to_string) else {
        return err(&req.id, "bad_params", "missing field", None);
    };
    let value = req.params.get("value").cloned().unwrap_or(json!(null));
    apply(state, req, |r| builder::update_meta(r, &field, &value))
}

fn handle_add_criterion(state: &mut AppState, req: &Request) -> serde_json::Value {
    apply(state, req, |r| match r.rubric_type() {
        RubricType::SinglePoint => builder::add_single_point_criterion(r),
        _ => builder::add_criterion_row(r),
    })
}

fn handle_add_level_column(state: &mut AppState, req: &Request) -> serde_json::Value {
    let label = param_str(req, "label").unwrap_or("New Level").to_string();
    let score = req.params.get("score").and_then(|v| v.as_f64()).unwrap_or(0.0);
    apply(state, req, |r| builder::add_level_column(r, &label, score))
}

fn handle_delete_level_column(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(index) = req.params.get("index").and_then(|v| v.as_u64()) else {
        return err(&req.id, "bad_params", "missing index", None);
    };
    apply(state, req, |r| {
        builder::delete_level_column(r, index as usize)
    })
}

fn handle_delete_criterion(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(criterion_id) = param_str(req, "criterionId").map(str::to_string) else {
        return err(&req.id, "bad_params", "missing criterionId", None);
    };
    apply(state, req, |r| match r.rubric_type() {
        RubricType::SinglePoint => builder::delete_single_point_criterion(r, &criterion_id),
        _ => builder::delete_criterion_row(r, &criterion_id),
    })
}

fn handle_update_cell(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(criterion_id) = param_str(req, "criterionId").map(str::to_string) else {
        return err(&req.id, "bad_params", "missing criterionId", None);
    };
    let Some(column_id) = param_str(req, "columnId").map(str::to_string) else {
        return err(&req.id, "bad_params", "missing columnId", None);
    };
    let Some(field) = param_str(req, "field").map(str::to_string) else {
        return err(&req.id, "bad_params", "missing field", None);
    };
    let value = req.params.get("value").cloned().unwrap_or(json!(null));
    apply(state, req, |r| {
        builder::update_cell(r, &criterion_id, &column_id, &field, &value)
    })
}

fn handle_update_column_label(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(column_id) = param_str(req, "columnId").map(str::to_string) else {
        return err(&req.id, "bad_params", "missing columnId", None);
    };
    let Some(label) = param_str(req, "label").map(str::to_string) else {
        return err(&req.id, "bad_params", "missing label", None);
    };
    apply(state, req, |r| {
        builder::update_column_label(r, &column_id, &label)
    })
}

fn handle_update_criterion(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(criterion_id) = param_str(req, "criterionId").map(str::to_string) else {
        return err(&req.id, "bad_params", "missing criterionId", None);
    };
    let Some(field) = param_str(req, "field").map(str::to_string) else {
        return err(&req.id, "bad_params", "missing field", None);
    };
    let value = req.params.get("value").cloned().unwrap_or(json!(null));
    apply(state, req, |r| match r.rubric_type() {
        RubricType::SinglePoint => {
            builder::update_single_point_criterion(r, &criterion_id, &field, &value)
        }
        _ => builder::update_analytic_criterion(r, &criterion_id, &field, &value),
    })
}

fn handle_toggle_tag(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(target_id) = param_str(req, "targetId").map(str::to_string) else {
        return err(&req.id, "bad_params", "missing targetId", None);
    };
    let Some(tag_set) = param_str(req, "tagSet") else {
        return err(&req.id, "bad_params", "missing tagSet", None);
    };
    let Some(field) = TagField::parse(tag_set) else {
        return err(
            &req.id,
            "bad_params",
            "tagSet must be one of: blooms, co, po",
            None,
        );
    };
    let Some(tag) = param_str(req, "tag").map(str::to_string) else {
        return err(&req.id, "bad_params", "missing tag", None);
    };
    apply(state, req, |r| {
        builder::toggle_criterion_tag(r, &target_id, field, &tag)
    })
}

fn handle_add_level(state: &mut AppState, req: &Request) -> serde_json::Value {
    apply(state, req, builder::add_level)
}

fn handle_update_level(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(level_id) = param_str(req, "levelId").map(str::to_string) else {
        return err(&req.id, "bad_params", "missing levelId", None);
    };
    let Some(field) = param_str(req, "field").map(str::to_string) else {
        return err(&req.id, "bad_params", "missing field", None);
    };
    let value = req.params.get("value").cloned().unwrap_or(json!(null));
    apply(state, req, |r| {
        builder::update_level(r, &level_id, &field, &value)
    })
}

fn handle_delete_level(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(level_id) = param_str(req, "levelId").map(str::to_string) else {
        return err(&req.id, "bad_params", "missing levelId", None);
    };
    apply(state, req, |r| builder::delete_level(r, &level_id))
}

fn handle_add_item(state: &mut AppState, req: &Request) -> serde_json::Value {
    apply(state, req, builder::add_item)
}

fn handle_update_item(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(item_id) = param_str(req, "itemId").map(str::to_string) else {
        return err(&req.id, "bad_params", "missing itemId", None);
    };
    let Some(field) = param_str(req, "field").map(str::to_string) else {
        return err(&req.id, "bad_params", "missing field", None);
    };
    let value = req.params.get("value").cloned().unwrap_or(json!(null));
    apply(state, req, |r| builder::update_item(r, &item_id, &field, &value))
}

fn handle_delete_item(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(item_id) = param_str(req, "itemId").map(str::to_string) else {
        return err(&req.id, "bad_params", "missing itemId", None);
    };
    apply(state, req, |r| builder::delete_item(r, &item_id))
}

fn handle_total_points(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (rubric, _) = match require_draft(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    ok(&req.id, json!({ "totalPoints": rubric.total_points() }))
}

fn handle_template_export(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (rubric, _) = match require_draft(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match builder::export_template(rubric) {
        Ok(template) => ok(&req.id, json!({ "template": template })),
        Err(e) => builder_err(&req.id, e),
    }
}

fn handle_template_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(template) = param_str(req, "template") else {
        return err(&req.id, "bad_params", "missing template", None);
    };
    match builder::import_template(template) {
        Ok(rubric) => {
            let resp = rubric_response(&req.id, &rubric);
            state.drafts.insert(rubric.id.clone(), rubric);
            resp
        }
        Err(e) => builder_err(&req.id, e),
    }
}

fn handle_discard(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(rubric_id) = param_str(req, "rubricId") else {
        return err(&req.id, "bad_params", "missing rubricId", None);
    };
    match state.drafts.remove(rubric_id) {
        Some(_) => ok(&req.id, json!({ "discarded": true })),
        None => err(&req.id, "not_found", "no open draft for rubricId", None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "rubrics.create" => Some(handle_create(state, req)),
        "rubrics.switchType" => Some(handle_switch_type(state, req)),
        "rubrics.updateMeta" => Some(handle_update_meta(state, req)),
        "rubrics.addCriterion" => Some(handle_add_criterion(state, req)),
        "rubrics.addLevelColumn" => Some(handle_add_level_column(state, req)),
        "rubrics.deleteLevelColumn" => Some(handle_delete_level_column(state, req)),
        "rubrics.deleteCriterion" => Some(handle_delete_criterion(state, req)),
        "rubrics.updateCell" => Some(handle_update_cell(state, req)),
        "rubrics.updateColumnLabel" => Some(handle_update_column_label(state, req)),
        "rubrics.updateCriterion" => Some(handle_update_criterion(state, req)),
        "rubrics.toggleTag" => Some(handle_toggle_tag(state, req)),
        "rubrics.addLevel" => Some(handle_add_level(state, req)),
        "rubrics.updateLevel" => Some(handle_update_level(state, req)),
        "rubrics.deleteLevel" => Some(handle_delete_level(state, req)),
        "rubrics.addItem" => Some(handle_add_item(state, req)),
        "rubrics.updateItem" => Some(handle_update_item(state, req)),
        "rubrics.deleteItem" => Some(handle_delete_item(state, req)),
        "rubrics.totalPoints" => Some(handle_total_points(state, req)),
        "rubrics.template.export" => Some(handle_template_export(state, req)),
        "rubrics.template.import" => Some(handle_template_import(state, req)),
        "rubrics.discard" => Some(handle_discard(state, req)),
        _ => None,
    }
}
