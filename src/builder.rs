use serde::Serialize;

use crate::model::{
    new_id, toggle_tag, AnalyticCriterion, Cell, Level, LevelColumn, PortfolioItem, Rubric,
    RubricKind, ScoringType, SinglePointCriterion,
};

#[derive(Debug, Clone, Serialize)]
pub struct BuilderError {
    pub code: String,
    pub message: String,
}

impl BuilderError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }

    fn wrong_kind(expected: &str) -> Self {
        Self::new(
            "wrong_kind",
            format!("operation requires a {expected} rubric"),
        )
    }
}

pub type BuilderResult = Result<Rubric, BuilderError>;

/// Which tag set a toggle targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagField {
    Blooms,
    Co,
    Po,
}

impl TagField {
    pub fn parse(s: &str) -> Option<TagField> {
        match s {
            "blooms" | "bloomsLevels" => Some(TagField::Blooms),
            "co" | "coMapping" => Some(TagField::Co),
            "po" | "poMapping" => Some(TagField::Po),
            _ => None,
        }
    }
}

fn analytic_mut(
    rubric: &mut Rubric,
) -> Result<(&mut Vec<LevelColumn>, &mut Vec<AnalyticCriterion>), BuilderError> {
    match &mut rubric.kind {
        RubricKind::Analytic { columns, criteria } => Ok((columns, criteria)),
        _ => Err(BuilderError::wrong_kind("analytic")),
    }
}

fn holistic_mut(rubric: &mut Rubric) -> Result<&mut Vec<Level>, BuilderError> {
    match &mut rubric.kind {
        RubricKind::Holistic { levels } => Ok(levels),
        _ => Err(BuilderError::wrong_kind("holistic")),
    }
}

fn single_point_mut(rubric: &mut Rubric) -> Result<&mut Vec<SinglePointCriterion>, BuilderError> {
    match &mut rubric.kind {
        RubricKind::SinglePoint { criteria } => Ok(criteria),
        _ => Err(BuilderError::wrong_kind("single point")),
    }
}

fn developmental_mut(rubric: &mut Rubric) -> Result<&mut Vec<PortfolioItem>, BuilderError> {
    match &mut rubric.kind {
        RubricKind::Developmental { items } => Ok(items),
        _ => Err(BuilderError::wrong_kind("developmental")),
    }
}

// ---- cross-kind meta edits ----

pub fn update_meta(rubric: &Rubric, field: &str, value: &serde_json::Value) -> BuilderResult {
    let mut out = rubric.clone();
    match field {
        "title" => {
            let Some(v) = value.as_str() else {
                return Err(BuilderError::new("bad_params", "title must be a string"));
            };
            out.title = v.to_string();
        }
        "description" => {
            let Some(v) = value.as_str() else {
                return Err(BuilderError::new(
                    "bad_params",
                    "description must be a string",
                ));
            };
            out.description = v.to_string();
        }
        "scoringType" => {
            out.scoring_type = match value.as_str() {
                Some("points") => ScoringType::Points,
                Some("percentage") => ScoringType::Percentage,
                _ => {
                    return Err(BuilderError::new(
                        "bad_params",
                        "scoringType must be 'points' or 'percentage'",
                    ))
                }
            };
        }
        "includeMetadata" => {
            let Some(v) = value.as_bool() else {
                return Err(BuilderError::new(
                    "bad_params",
                    "includeMetadata must be a boolean",
                ));
            };
            out.include_metadata = v;
        }
        other => {
            return Err(BuilderError::new(
                "bad_params",
                format!("unknown meta field: {other}"),
            ))
        }
    }
    Ok(out)
}

// ---- analytic ----

/// Appends a criterion row. The new row gets fresh ids and clones the
/// cell scores of the first existing row so the grid stays rectangular
/// with sensible defaults.
pub fn add_criterion_row(rubric: &Rubric) -> BuilderResult {
    let mut out = rubric.clone();
    let (columns, criteria) = analytic_mut(&mut out)?;
    let cells: Vec<Cell> = match criteria.first() {
        Some(first) => first
            .cells
            .iter()
            .map(|c| Cell {
                score: c.score,
                description: String::new(),
                image: None,
            })
            .collect(),
        None => columns.iter().map(|_| Cell::empty()).collect(),
    };
    criteria.push(AnalyticCriterion {
        id: new_id(),
        name: "New Criterion".to_string(),
        description: String::new(),
        weight: 1.0,
        cells,
        blooms_levels: Vec::new(),
        co_mapping: Vec::new(),
        po_mapping: Vec::new(),
    });
    Ok(out)
}

/// Appends a level column to every criterion row at once, keeping the
/// grid rectangular.
pub fn add_level_column(rubric: &Rubric, label: &str, score: f64) -> BuilderResult {
    let mut out = rubric.clone();
    let (columns, criteria) = analytic_mut(&mut out)?;
    columns.push(LevelColumn {
        id: new_id(),
        label: label.to_string(),
    });
    for criterion in criteria.iter_mut() {
        criterion.cells.push(Cell {
            score,
            description: String::new(),
            image: None,
        });
    }
    Ok(out)
}

pub fn delete_level_column(rubric: &Rubric, index: usize) -> BuilderResult {
    let mut out = rubric.clone();
    let (columns, criteria) = analytic_mut(&mut out)?;
    if index >= columns.len() {
        return Err(BuilderError::new(
            "bad_params",
            format!("no level column at index {index}"),
        ));
    }
    if columns.len() == 1 {
        return Err(BuilderError::new(
            "bad_params",
            "cannot delete the last level column",
        ));
    }
    columns.remove(index);
    for criterion in criteria.iter_mut() {
        criterion.cells.remove(index);
    }
    Ok(out)
}

pub fn delete_criterion_row(rubric: &Rubric, criterion_id: &str) -> BuilderResult {
    let mut out = rubric.clone();
    let (_, criteria) = analytic_mut(&mut out)?;
    let Some(pos) = criteria.iter().position(|c| c.id == criterion_id) else {
        return Err(BuilderError::new("not_found", "criterion not found"));
    };
    if criteria.len() == 1 {
        return Err(BuilderError::new(
            "bad_params",
            "cannot delete the last criterion",
        ));
    }
    criteria.remove(pos);
    Ok(out)
}

pub fn update_column_label(rubric: &Rubric, column_id: &str, label: &str) -> BuilderResult {
    let mut out = rubric.clone();
    let (columns, _) = analytic_mut(&mut out)?;
    let Some(col) = columns.iter_mut().find(|c| c.id == column_id) else {
        return Err(BuilderError::new("not_found", "level column not found"));
    };
    col.label = label.to_string();
    Ok(out)
}

pub fn update_cell(
    rubric: &Rubric,
    criterion_id: &str,
    column_id: &str,
    field: &str,
    value: &serde_json::Value,
) -> BuilderResult {
    let mut out = rubric.clone();
    let (columns, criteria) = analytic_mut(&mut out)?;
    let Some(col_index) = columns.iter().position(|c| c.id == column_id) else {
        return Err(BuilderError::new("not_found", "level column not found"));
    };
    let Some(criterion) = criteria.iter_mut().find(|c| c.id == criterion_id) else {
        return Err(BuilderError::new("not_found", "criterion not found"));
    };
    let cell = &mut criterion.cells[col_index];
    match field {
        "description" => {
            let Some(v) = value.as_str() else {
                return Err(BuilderError::new(
                    "bad_params",
                    "description must be a string",
                ));
            };
            cell.description = v.to_string();
        }
        "score" => {
            let Some(v) = value.as_f64() else {
                return Err(BuilderError::new("bad_params", "score must be a number"));
            };
            cell.score = v;
        }
        "image" => {
            cell.image = match value {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) => Some(s.clone()),
                _ => {
                    return Err(BuilderError::new(
                        "bad_params",
                        "image must be a string reference or null",
                    ))
                }
            };
        }
        other => {
            return Err(BuilderError::new(
                "bad_params",
                format!("unknown cell field: {other}"),
            ))
        }
    }
    Ok(out)
}

pub fn update_analytic_criterion(
    rubric: &Rubric,
    criterion_id: &str,
    field: &str,
    value: &serde_json::Value,
) -> BuilderResult {
    let mut out = rubric.clone();
    let (_, criteria) = analytic_mut(&mut out)?;
    let Some(criterion) = criteria.iter_mut().find(|c| c.id == criterion_id) else {
        return Err(BuilderError::new("not_found", "criterion not found"));
    };
    match field {
        "name" => {
            let Some(v) = value.as_str() else {
                return Err(BuilderError::new("bad_params", "name must be a string"));
            };
            criterion.name = v.to_string();
        }
        "description" => {
            let Some(v) = value.as_str() else {
                return Err(BuilderError::new(
                    "bad_params",
                    "description must be a string",
                ));
            };
            criterion.description = v.to_string();
        }
        "weight" => {
            let Some(v) = value.as_f64() else {
                return Err(BuilderError::new("bad_params", "weight must be a number"));
            };
            if v < 0.0 {
                return Err(BuilderError::new("bad_params", "weight must be >= 0"));
            }
            criterion.weight = v;
        }
        other => {
            return Err(BuilderError::new(
                "bad_params",
                format!("unknown criterion field: {other}"),
            ))
        }
    }
    Ok(out)
}

/// Toggles an outcome tag on an Analytic or SinglePoint criterion, or a
/// Developmental item. Adding is idempotent with removing: toggling the
/// same tag twice restores the original set.
pub fn toggle_criterion_tag(
    rubric: &Rubric,
    target_id: &str,
    field: TagField,
    tag: &str,
) -> BuilderResult {
    let mut out = rubric.clone();
    match &mut out.kind {
        RubricKind::Analytic { criteria, .. } => {
            let Some(criterion) = criteria.iter_mut().find(|c| c.id == target_id) else {
                return Err(BuilderError::new("not_found", "criterion not found"));
            };
            let tags = match field {
                TagField::Blooms => &mut criterion.blooms_levels,
                TagField::Co => &mut criterion.co_mapping,
                TagField::Po => &mut criterion.po_mapping,
            };
            toggle_tag(tags, tag);
        }
        RubricKind::SinglePoint { criteria } => {
            let Some(criterion) = criteria.iter_mut().find(|c| c.id == target_id) else {
                return Err(BuilderError::new("not_found", "criterion not found"));
            };
            let tags = match field {
                TagField::Blooms => &mut criterion.blooms_levels,
                TagField::Co => &mut criterion.co_mapping,
                TagField::Po => &mut criterion.po_mapping,
            };
            toggle_tag(tags, tag);
        }
        RubricKind::Developmental { items } => {
            let Some(item) = items.iter_mut().find(|i| i.id == target_id) else {
                return Err(BuilderError::new("not_found", "item not found"));
            };
            let tags = match field {
                TagField::Blooms => &mut item.blooms_levels,
                TagField::Co => &mut item.co_mapping,
                TagField::Po => {
                    return Err(BuilderError::new(
                        "bad_params",
                        "portfolio items carry no PO mapping",
                    ))
                }
            };
            toggle_tag(tags, tag);
        }
        RubricKind::Holistic { .. } => {
            return Err(BuilderError::new(
                "wrong_kind",
                "holistic rubrics carry no outcome tags",
            ))
        }
    }
    Ok(out)
}

// ---- holistic ----

pub fn add_level(rubric: &Rubric) -> BuilderResult {
    let mut out = rubric.clone();
    let levels = holistic_mut(&mut out)?;
    levels.push(Level {
        id: new_id(),
        label: "New Level".to_string(),
        score: 0.0,
        description: String::new(),
        image: None,
    });
    Ok(out)
}

pub fn update_level(
    rubric: &Rubric,
    level_id: &str,
    field: &str,
    value: &serde_json::Value,
) -> BuilderResult {
    let mut out = rubric.clone();
    let levels = holistic_mut(&mut out)?;
    let Some(level) = levels.iter_mut().find(|l| l.id == level_id) else {
        return Err(BuilderError::new("not_found", "level not found"));
    };
    match field {
        "label" => {
            let Some(v) = value.as_str() else {
                return Err(BuilderError::new("bad_params", "label must be a string"));
            };
            level.label = v.to_string();
        }
        "score" => {
            let Some(v) = value.as_f64() else {
                return Err(BuilderError::new("bad_params", "score must be a number"));
            };
            level.score = v;
        }
        "description" => {
            let Some(v) = value.as_str() else {
                return Err(BuilderError::new(
                    "bad_params",
                    "description must be a string",
                ));
            };
            level.description = v.to_string();
        }
        "image" => {
            level.image = match value {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) => Some(s.clone()),
                _ => {
                    return Err(BuilderError::new(
                        "bad_params",
                        "image must be a string reference or null",
                    ))
                }
            };
        }
        other => {
            return Err(BuilderError::new(
                "bad_params",
                format!("unknown level field: {other}"),
            ))
        }
    }
    Ok(out)
}

pub fn delete_level(rubric: &Rubric, level_id: &str) -> BuilderResult {
    let mut out = rubric.clone();
    let levels = holistic_mut(&mut out)?;
    let Some(pos) = levels.iter().position(|l| l.id == level_id) else {
        return Err(BuilderError::new("not_found", "level not found"));
    };
    if levels.len() == 1 {
        return Err(BuilderError::new(
            "bad_params",
            "cannot delete the last level",
        ));
    }
    levels.remove(pos);
    Ok(out)
}

// ---- single point ----

pub fn add_single_point_criterion(rubric: &Rubric) -> BuilderResult {
    let mut out = rubric.clone();
    let criteria = single_point_mut(&mut out)?;
    criteria.push(SinglePointCriterion {
        id: new_id(),
        name: "New Criterion".to_string(),
        standard: String::new(),
        feedback_fields: Vec::new(),
        blooms_levels: Vec::new(),
        co_mapping: Vec::new(),
        po_mapping: Vec::new(),
    });
    Ok(out)
}

pub fn update_single_point_criterion(
    rubric: &Rubric,
    criterion_id: &str,
    field: &str,
    value: &serde_json::Value,
) -> BuilderResult {
    let mut out = rubric.clone();
    let criteria = single_point_mut(&mut out)?;
    let Some(criterion) = criteria.iter_mut().find(|c| c.id == criterion_id) else {
        return Err(BuilderError::new("not_found", "criterion not found"));
    };
    match field {
        "name" => {
            let Some(v) = value.as_str() else {
                return Err(BuilderError::new("bad_params", "name must be a string"));
            };
            criterion.name = v.to_string();
        }
        "standard" => {
            let Some(v) = value.as_str() else {
                return Err(BuilderError::new("bad_params", "standard must be a string"));
            };
            criterion.standard = v.to_string();
        }
        "feedbackFields" => {
            let Some(arr) = value.as_array() else {
                return Err(BuilderError::new(
                    "bad_params",
                    "feedbackFields must be an array of strings",
                ));
            };
            let mut fields = Vec::with_capacity(arr.len());
            for v in arr {
                let Some(s) = v.as_str() else {
                    return Err(BuilderError::new(
                        "bad_params",
                        "feedbackFields must be an array of strings",
                    ));
                };
                fields.push(s.to_string());
            }
            criterion.feedback_fields = fields;
        }
        other => {
            return Err(BuilderError::new(
                "bad_params",
                format!("unknown criterion field: {other}"),
            ))
        }
    }
    Ok(out)
}

pub fn delete_single_point_criterion(rubric: &Rubric, criterion_id: &str) -> BuilderResult {
    let mut out = rubric.clone();
    let criteria = single_point_mut(&mut out)?;
    let Some(pos) = criteria.iter().position(|c| c.id == criterion_id) else {
        return Err(BuilderError::new("not_found", "criterion not found"));
    };
    if criteria.len() == 1 {
        return Err(BuilderError::new(
            "bad_params",
            "cannot delete the last criterion",
        ));
    }
    criteria.remove(pos);
    Ok(out)
}

// ---- developmental ----

pub fn add_item(rubric: &Rubric) -> BuilderResult {
    let mut out = rubric.clone();
    let items = developmental_mut(&mut out)?;
    items.push(PortfolioItem {
        id: new_id(),
        label: "New Item".to_string(),
        required: true,
        blooms_levels: Vec::new(),
        co_mapping: Vec::new(),
    });
    Ok(out)
}

pub fn update_item(
    rubric: &Rubric,
    item_id: &str,
    field: &str,
    value: &serde_json::Value,
) -> BuilderResult {
    let mut out = rubric.clone();
    let items = developmental_mut(&mut out)?;
    let Some(item) = items.iter_mut().find(|i| i.id == item_id) else {
        return Err(BuilderError::new("not_found", "item not found"));
    };
    match field {
        "label" => {
            let Some(v) = value.as_str() else {
                return Err(BuilderError::new("bad_params", "label must be a string"));
            };
            item.label = v.to_string();
        }
        "required" => {
            let Some(v) = value.as_bool() else {
                return Err(BuilderError::new("bad_params", "required must be a boolean"));
            };
            item.required = v;
        }
        other => {
            return Err(BuilderError::new(
                "bad_params",
                format!("unknown item field: {other}"),
            ))
        }
    }
    Ok(out)
}

pub fn delete_item(rubric: &Rubric, item_id: &str) -> BuilderResult {
    let mut out = rubric.clone();
    let items = developmental_mut(&mut out)?;
    let Some(pos) = items.iter().position(|i| i.id == item_id) else {
        return Err(BuilderError::new("not_found", "item not found"));
    };
    if items.len() == 1 {
        return Err(BuilderError::new(
            "bad_params",
            "cannot delete the last item",
        ));
    }
    items.remove(pos);
    Ok(out)
}

// ---- template import/export ----

/// Lossless export of the in-memory shape. Distinct from the flat
/// transport payload: this round-trips ids and builder-only fields.
pub fn export_template(rubric: &Rubric) -> Result<String, BuilderError> {
    serde_json::to_string_pretty(rubric)
        .map_err(|e| BuilderError::new("serialize_failed", e.to_string()))
}

fn require_unique_ids<'a>(
    ids: impl Iterator<Item = &'a str>,
    what: &str,
) -> Result<(), BuilderError> {
    let mut seen = std::collections::HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(BuilderError::new(
                "bad_template",
                format!("duplicate {what} id: {id}"),
            ));
        }
    }
    Ok(())
}

/// Structural checks on an imported rubric. Parsing alone accepts
/// shapes no builder operation can produce (ragged cell rows, empty
/// collections, repeated ids), and the rest of the crate indexes cells
/// by column position on the assumption that rows are rectangular.
fn validate_template(rubric: &Rubric) -> Result<(), BuilderError> {
    match &rubric.kind {
        RubricKind::Analytic { columns, criteria } => {
            if columns.is_empty() || criteria.is_empty() {
                return Err(BuilderError::new(
                    "bad_template",
                    "analytic template needs at least one level column and one criterion",
                ));
            }
            for criterion in criteria {
                if criterion.cells.len() != columns.len() {
                    return Err(BuilderError::new(
                        "bad_template",
                        format!(
                            "criterion '{}' has {} cells for {} level columns",
                            criterion.name,
                            criterion.cells.len(),
                            columns.len()
                        ),
                    ));
                }
            }
            require_unique_ids(columns.iter().map(|c| c.id.as_str()), "level column")?;
            require_unique_ids(criteria.iter().map(|c| c.id.as_str()), "criterion")?;
        }
        RubricKind::Holistic { levels } => {
            if levels.is_empty() {
                return Err(BuilderError::new(
                    "bad_template",
                    "holistic template needs at least one level",
                ));
            }
            require_unique_ids(levels.iter().map(|l| l.id.as_str()), "level")?;
        }
        RubricKind::SinglePoint { criteria } => {
            if criteria.is_empty() {
                return Err(BuilderError::new(
                    "bad_template",
                    "single point template needs at least one criterion",
                ));
            }
            require_unique_ids(criteria.iter().map(|c| c.id.as_str()), "criterion")?;
        }
        RubricKind::Developmental { items } => {
            if items.is_empty() {
                return Err(BuilderError::new(
                    "bad_template",
                    "developmental template needs at least one item",
                ));
            }
            require_unique_ids(items.iter().map(|i| i.id.as_str()), "item")?;
        }
    }
    Ok(())
}

/// Parses a previously exported rubric. Rejects JSON whose `type`
/// discriminant is missing or not one of the four known variants, and
/// any parsed shape the builder itself could not have produced; the
/// caller's current rubric is untouched on failure.
pub fn import_template(json: &str) -> BuilderResult {
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| BuilderError::new("bad_template", format!("invalid JSON: {e}")))?;
    let has_known_type = value
        .get("type")
        .and_then(|v| v.as_str())
        .map(|s| matches!(s, "analytic" | "holistic" | "singlePoint" | "developmental"))
        .unwrap_or(false);
    if !has_known_type {
        return Err(BuilderError::new(
            "bad_template",
            "template has no recognized rubric type",
        ));
    }
    let rubric: Rubric = serde_json::from_value(value)
        .map_err(|e| BuilderError::new("bad_template", format!("template does not parse: {e}")))?;
    validate_template(&rubric)?;
    Ok(rubric)
}
