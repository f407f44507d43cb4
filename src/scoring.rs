use std::collections::HashMap;

use serde::Serialize;

use crate::model::{best_cell_score, Rubric, RubricKind};

/// Fixed selection key for the whole-submission choice on Holistic
/// rubrics, which have no criteria to key by.
pub const OVERALL_KEY: &str = "overall";

#[derive(Debug, Clone, PartialEq)]
pub enum Choice {
    /// A chosen level-column id (Analytic) or level id (Holistic).
    Level(String),
    /// Checked state for a Developmental portfolio item.
    Checked(bool),
}

/// One evaluator's in-progress selections for a single
/// (assessment, student, question) pass. Transient: discarded after the
/// evaluation is submitted.
#[derive(Debug, Clone, Default)]
pub struct Selections {
    pub choices: HashMap<String, Choice>,
    /// Free-text feedback keyed `{criterion_id}_improvement` /
    /// `{criterion_id}_exceeds`.
    pub comments: HashMap<String, String>,
}

impl Selections {
    pub fn new() -> Selections {
        Selections::default()
    }

    pub fn select_level(&mut self, key: &str, level_id: &str) {
        self.choices
            .insert(key.to_string(), Choice::Level(level_id.to_string()));
    }

    pub fn toggle_item(&mut self, item_id: &str) -> bool {
        let checked = match self.choices.get(item_id) {
            Some(Choice::Checked(v)) => !*v,
            _ => true,
        };
        self.choices
            .insert(item_id.to_string(), Choice::Checked(checked));
        checked
    }

    pub fn set_comment(&mut self, key: &str, text: &str) {
        if text.is_empty() {
            self.comments.remove(key);
        } else {
            self.comments.insert(key.to_string(), text.to_string());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringResult {
    pub total_score: f64,
    pub max_score: f64,
    pub feedback_text: String,
}

/// A selection flattened for the persistence contract: one row per
/// Analytic/Holistic criterion with a chosen level.
#[derive(Debug, Clone, Serialize)]
pub struct RubricEntry {
    pub criterion_id: String,
    pub level_id: String,
    pub feedback: String,
}

fn fmt_points(x: f64) -> String {
    if x.fract() == 0.0 {
        format!("{}", x as i64)
    } else {
        format!("{x}")
    }
}

/// Recomputes the full result from scratch. Criteria/items without a
/// selection contribute 0, so partial-progress scoring is always valid.
pub fn score(rubric: &Rubric, selections: &Selections) -> ScoringResult {
    match &rubric.kind {
        RubricKind::Analytic { columns, criteria } => {
            let mut total = 0.0;
            let mut lines: Vec<String> = Vec::new();
            for criterion in criteria {
                let Some(Choice::Level(column_id)) = selections.choices.get(&criterion.id) else {
                    continue;
                };
                let Some(col_index) = columns.iter().position(|c| &c.id == column_id) else {
                    continue;
                };
                let cell_score = criterion.cells[col_index].score;
                total += cell_score;
                lines.push(format!(
                    "{}: {} ({} pts)",
                    criterion.name,
                    columns[col_index].label,
                    fmt_points(cell_score)
                ));
            }
            let max: f64 = criteria.iter().map(best_cell_score).sum();
            ScoringResult {
                total_score: total,
                max_score: max,
                feedback_text: lines.join("\n"),
            }
        }
        RubricKind::Holistic { levels } => {
            let max = levels.iter().map(|l| l.score).fold(0.0_f64, f64::max);
            let selected = match selections.choices.get(OVERALL_KEY) {
                Some(Choice::Level(level_id)) => levels.iter().find(|l| &l.id == level_id),
                _ => None,
            };
            let (total, feedback) = match selected {
                Some(level) => (
                    level.score,
                    format!("Overall: {} ({} pts)", level.label, fmt_points(level.score)),
                ),
                None => (0.0, String::new()),
            };
            ScoringResult {
                total_score: total,
                max_score: max,
                feedback_text: feedback,
            }
        }
        RubricKind::SinglePoint { criteria } => {
            // Qualitative only: no numeric score, feedback assembled from
            // the per-criterion free-text comments in declaration order.
            let mut lines: Vec<String> = Vec::new();
            for criterion in criteria {
                for (suffix, heading) in [("improvement", "Improvement"), ("exceeds", "Exceeds")] {
                    let key = format!("{}_{}", criterion.id, suffix);
                    if let Some(text) = selections.comments.get(&key) {
                        lines.push(format!("{} ({}): {}", criterion.name, heading, text));
                    }
                }
            }
            ScoringResult {
                total_score: 0.0,
                max_score: 0.0,
                feedback_text: lines.join("\n"),
            }
        }
        RubricKind::Developmental { items } => {
            let checked = items
                .iter()
                .filter(|item| {
                    matches!(selections.choices.get(&item.id), Some(Choice::Checked(true)))
                })
                .count();
            ScoringResult {
                total_score: checked as f64,
                max_score: items.len() as f64,
                feedback_text: format!("{} of {} items complete", checked, items.len()),
            }
        }
    }
}

/// Flattens selections for the evaluation save contract. Only
/// Analytic/Holistic rubrics produce entries; the other types persist
/// marks and feedback alone.
pub fn rubric_entries(rubric: &Rubric, selections: &Selections) -> Vec<RubricEntry> {
    match &rubric.kind {
        RubricKind::Analytic { columns, criteria } => criteria
            .iter()
            .filter_map(|criterion| {
                let Some(Choice::Level(column_id)) = selections.choices.get(&criterion.id) else {
                    return None;
                };
                let col_index = columns.iter().position(|c| &c.id == column_id)?;
                let cell_score = criterion.cells[col_index].score;
                Some(RubricEntry {
                    criterion_id: criterion.id.clone(),
                    level_id: column_id.clone(),
                    feedback: format!(
                        "{}: {} ({} pts)",
                        criterion.name,
                        columns[col_index].label,
                        fmt_points(cell_score)
                    ),
                })
            })
            .collect(),
        RubricKind::Holistic { levels } => match selections.choices.get(OVERALL_KEY) {
            Some(Choice::Level(level_id)) => levels
                .iter()
                .find(|l| &l.id == level_id)
                .map(|level| RubricEntry {
                    criterion_id: OVERALL_KEY.to_string(),
                    level_id: level.id.clone(),
                    feedback: format!(
                        "Overall: {} ({} pts)",
                        level.label,
                        fmt_points(level.score)
                    ),
                })
                .into_iter()
                .collect(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}
