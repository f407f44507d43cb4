use serde::{Deserialize, Serialize};

use crate::model::{
    new_id, AnalyticCriterion, Cell, Level, LevelColumn, PortfolioItem, Rubric, RubricKind,
    RubricType, ScoringType, SinglePointCriterion,
};

#[derive(Debug, Clone, Serialize)]
pub struct PayloadError {
    pub code: String,
    pub message: String,
}

impl PayloadError {
    fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Flat transport schema shared by all four rubric types. Arrays a type
/// does not use are present and empty, never omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RubricPayload {
    pub rubric_type: String,
    pub scoring_type: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub include_metadata: bool,
    pub criteria: Vec<PayloadCriterion>,
    pub performance_levels: Vec<PayloadLevel>,
    pub cells: Vec<PayloadCell>,
    pub portfolios: Vec<PayloadPortfolio>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadCriterion {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub criterion_order: usize,
    pub weight_percentage: f64,
    #[serde(default)]
    pub standard: Option<String>,
    #[serde(default)]
    pub feedback_fields: Vec<String>,
    #[serde(default)]
    pub blooms_levels: Vec<String>,
    #[serde(default)]
    pub co_mapping: Vec<String>,
    #[serde(default)]
    pub po_mapping: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadLevel {
    pub label: String,
    pub level_order: usize,
    /// Holistic levels score directly; Analytic columns carry scores in
    /// the cells array instead.
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: Option<String>,
}

/// Cells are addressed by order-index pairs; the transport schema does
/// not carry object ids for criteria or levels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadCell {
    pub criterion_order: usize,
    pub level_order: usize,
    pub score: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadPortfolio {
    pub label: String,
    pub portfolio_order: usize,
    pub is_required: bool,
    #[serde(default)]
    pub blooms_levels: Vec<String>,
    #[serde(default)]
    pub co_mapping: Vec<String>,
}

fn scoring_type_str(scoring_type: ScoringType) -> &'static str {
    match scoring_type {
        ScoringType::Points => "points",
        ScoringType::Percentage => "percentage",
    }
}

fn parse_scoring_type(s: &str) -> ScoringType {
    match s {
        "percentage" => ScoringType::Percentage,
        _ => ScoringType::Points,
    }
}

/// Tag arrays are sets in the model; stored data may carry duplicates,
/// so drop repeats on load keeping first-seen order.
fn dedupe_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        if !out.contains(tag) {
            out.push(tag.clone());
        }
    }
    out
}

/// Normalizes any rubric shape into the flat transport schema. Never
/// fails for a well-formed model; the inverse is structural-fields-only.
pub fn to_payload(rubric: &Rubric) -> RubricPayload {
    let mut payload = RubricPayload {
        rubric_type: rubric.rubric_type().as_str().to_string(),
        scoring_type: scoring_type_str(rubric.scoring_type).to_string(),
        title: rubric.title.clone(),
        description: rubric.description.clone(),
        include_metadata: rubric.include_metadata,
        criteria: Vec::new(),
        performance_levels: Vec::new(),
        cells: Vec::new(),
        portfolios: Vec::new(),
    };

    match &rubric.kind {
        RubricKind::Analytic { columns, criteria } => {
            payload.performance_levels = columns
                .iter()
                .enumerate()
                .map(|(i, col)| PayloadLevel {
                    label: col.label.clone(),
                    level_order: i,
                    score: None,
                    description: String::new(),
                    image: None,
                })
                .collect();
            for (ci, criterion) in criteria.iter().enumerate() {
                payload.criteria.push(PayloadCriterion {
                    name: criterion.name.clone(),
                    description: criterion.description.clone(),
                    criterion_order: ci,
                    weight_percentage: criterion.weight,
                    standard: None,
                    feedback_fields: Vec::new(),
                    blooms_levels: criterion.blooms_levels.clone(),
                    co_mapping: criterion.co_mapping.clone(),
                    po_mapping: criterion.po_mapping.clone(),
                });
                for (li, cell) in criterion.cells.iter().enumerate() {
                    payload.cells.push(PayloadCell {
                        criterion_order: ci,
                        level_order: li,
                        score: cell.score,
                        description: cell.description.clone(),
                        image: cell.image.clone(),
                    });
                }
            }
        }
        RubricKind::Holistic { levels } => {
            payload.performance_levels = levels
                .iter()
                .enumerate()
                .map(|(i, level)| PayloadLevel {
                    label: level.label.clone(),
                    level_order: i,
                    score: Some(level.score),
                    description: level.description.clone(),
                    image: level.image.clone(),
                })
                .collect();
        }
        RubricKind::SinglePoint { criteria } => {
            payload.criteria = criteria
                .iter()
                .enumerate()
                .map(|(i, criterion)| PayloadCriterion {
                    name: criterion.name.clone(),
                    description: String::new(),
                    criterion_order: i,
                    weight_percentage: 0.0,
                    standard: Some(criterion.standard.clone()),
                    feedback_fields: if criterion.feedback_fields.is_empty() {
                        vec!["Default Feedback".to_string()]
                    } else {
                        criterion.feedback_fields.clone()
                    },
                    blooms_levels: criterion.blooms_levels.clone(),
                    co_mapping: criterion.co_mapping.clone(),
                    po_mapping: criterion.po_mapping.clone(),
                })
                .collect();
        }
        RubricKind::Developmental { items } => {
            payload.portfolios = items
                .iter()
                .enumerate()
                .map(|(i, item)| PayloadPortfolio {
                    label: item.label.clone(),
                    portfolio_order: i,
                    is_required: item.required,
                    blooms_levels: item.blooms_levels.clone(),
                    co_mapping: item.co_mapping.clone(),
                })
                .collect();
        }
    }

    payload
}

/// Rebuilds an in-memory rubric from the transport schema with fresh
/// ids. Fails only on an unrecognized rubric_type; ragged or missing
/// cells default to empty zero-score cells.
pub fn from_payload(payload: &RubricPayload) -> Result<Rubric, PayloadError> {
    let Some(rubric_type) = RubricType::parse(&payload.rubric_type) else {
        return Err(PayloadError::new(
            "bad_payload",
            format!("unrecognized rubric_type: {}", payload.rubric_type),
        ));
    };

    let kind = match rubric_type {
        RubricType::Analytic => {
            let mut levels = payload.performance_levels.clone();
            levels.sort_by_key(|l| l.level_order);
            let columns: Vec<LevelColumn> = levels
                .iter()
                .map(|l| LevelColumn {
                    id: new_id(),
                    label: l.label.clone(),
                })
                .collect();

            let mut sorted_criteria = payload.criteria.clone();
            sorted_criteria.sort_by_key(|c| c.criterion_order);
            let criteria: Vec<AnalyticCriterion> = sorted_criteria
                .iter()
                .map(|pc| {
                    let cells: Vec<Cell> = (0..columns.len())
                        .map(|li| {
                            payload
                                .cells
                                .iter()
                                .find(|cell| {
                                    cell.criterion_order == pc.criterion_order
                                        && cell.level_order == li
                                })
                                .map(|cell| Cell {
                                    score: cell.score,
                                    description: cell.description.clone(),
                                    image: cell.image.clone(),
                                })
                                .unwrap_or_else(Cell::empty)
                        })
                        .collect();
                    AnalyticCriterion {
                        id: new_id(),
                        name: pc.name.clone(),
                        description: pc.description.clone(),
                        weight: pc.weight_percentage,
                        cells,
                        blooms_levels: dedupe_tags(&pc.blooms_levels),
                        co_mapping: dedupe_tags(&pc.co_mapping),
                        po_mapping: dedupe_tags(&pc.po_mapping),
                    }
                })
                .collect();
            RubricKind::Analytic { columns, criteria }
        }
        RubricType::Holistic => {
            let mut levels = payload.performance_levels.clone();
            levels.sort_by_key(|l| l.level_order);
            RubricKind::Holistic {
                levels: levels
                    .iter()
                    .map(|l| Level {
                        id: new_id(),
                        label: l.label.clone(),
                        score: l.score.unwrap_or(0.0),
                        description: l.description.clone(),
                        image: l.image.clone(),
                    })
                    .collect(),
            }
        }
        RubricType::SinglePoint => {
            let mut sorted_criteria = payload.criteria.clone();
            sorted_criteria.sort_by_key(|c| c.criterion_order);
            RubricKind::SinglePoint {
                criteria: sorted_criteria
                    .iter()
                    .map(|pc| SinglePointCriterion {
                        id: new_id(),
                        name: pc.name.clone(),
                        standard: pc.standard.clone().unwrap_or_default(),
                        feedback_fields: pc.feedback_fields.clone(),
                        blooms_levels: dedupe_tags(&pc.blooms_levels),
                        co_mapping: dedupe_tags(&pc.co_mapping),
                        po_mapping: dedupe_tags(&pc.po_mapping),
                    })
                    .collect(),
            }
        }
        RubricType::Developmental => {
            let mut portfolios = payload.portfolios.clone();
            portfolios.sort_by_key(|p| p.portfolio_order);
            RubricKind::Developmental {
                items: portfolios
                    .iter()
                    .map(|p| PortfolioItem {
                        id: new_id(),
                        label: p.label.clone(),
                        required: p.is_required,
                        blooms_levels: dedupe_tags(&p.blooms_levels),
                        co_mapping: dedupe_tags(&p.co_mapping),
                    })
                    .collect(),
            }
        }
    };

    Ok(Rubric {
        id: new_id(),
        title: payload.title.clone(),
        description: payload.description.clone(),
        scoring_type: parse_scoring_type(&payload.scoring_type),
        include_metadata: payload.include_metadata,
        kind,
    })
}
