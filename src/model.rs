use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScoringType {
    Points,
    Percentage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RubricType {
    Analytic,
    Holistic,
    SinglePoint,
    Developmental,
}

impl RubricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RubricType::Analytic => "analytic",
            RubricType::Holistic => "holistic",
            RubricType::SinglePoint => "single_point",
            RubricType::Developmental => "developmental",
        }
    }

    pub fn parse(s: &str) -> Option<RubricType> {
        match s {
            "analytic" => Some(RubricType::Analytic),
            "holistic" => Some(RubricType::Holistic),
            "single_point" | "singlePoint" => Some(RubricType::SinglePoint),
            "developmental" => Some(RubricType::Developmental),
            _ => None,
        }
    }
}

/// One column of an Analytic grid. The label/order sequence is shared by
/// every criterion row; per-cell scores and descriptions live in
/// `AnalyticCriterion.cells`, index-aligned to this list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelColumn {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    pub score: f64,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Cell {
    pub fn empty() -> Cell {
        Cell {
            score: 0.0,
            description: String::new(),
            image: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticCriterion {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub weight: f64,
    /// Index-aligned with the rubric's `columns`.
    pub cells: Vec<Cell>,
    #[serde(default)]
    pub blooms_levels: Vec<String>,
    #[serde(default)]
    pub co_mapping: Vec<String>,
    #[serde(default)]
    pub po_mapping: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Level {
    pub id: String,
    pub label: String,
    pub score: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SinglePointCriterion {
    pub id: String,
    pub name: String,
    /// The target description evaluated work is compared against.
    #[serde(default)]
    pub standard: String,
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
#[serde(rename_all = "camelCase")]
pub struct PortfolioItem {
    pub id: String,
    pub label: String,
    pub required: bool,
    #[serde(default)]
    pub blooms_levels: Vec<String>,
    #[serde(default)]
    pub co_mapping: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RubricKind {
    #[serde(rename_all = "camelCase")]
    Analytic {
        columns: Vec<LevelColumn>,
        criteria: Vec<AnalyticCriterion>,
    },
    #[serde(rename_all = "camelCase")]
    Holistic { levels: Vec<Level> },
    #[serde(rename_all = "camelCase")]
    SinglePoint { criteria: Vec<SinglePointCriterion> },
    #[serde(rename_all = "camelCase")]
    Developmental { items: Vec<PortfolioItem> },
}

impl RubricKind {
    pub fn rubric_type(&self) -> RubricType {
        match self {
            RubricKind::Analytic { .. } => RubricType::Analytic,
            RubricKind::Holistic { .. } => RubricType::Holistic,
            RubricKind::SinglePoint { .. } => RubricType::SinglePoint,
            RubricKind::Developmental { .. } => RubricType::Developmental,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rubric {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub scoring_type: ScoringType,
    pub include_metadata: bool,
    #[serde(flatten)]
    pub kind: RubricKind,
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

const DEFAULT_COLUMNS: [(&str, f64); 4] = [
    ("Excellent", 4.0),
    ("Good", 3.0),
    ("Satisfactory", 2.0),
    ("Needs Improvement", 1.0),
];

fn analytic_template_kind() -> RubricKind {
    let columns: Vec<LevelColumn> = DEFAULT_COLUMNS
        .iter()
        .map(|(label, _)| LevelColumn {
            id: new_id(),
            label: (*label).to_string(),
        })
        .collect();
    let cells: Vec<Cell> = DEFAULT_COLUMNS
        .iter()
        .map(|(_, score)| Cell {
            score: *score,
            description: String::new(),
            image: None,
        })
        .collect();
    RubricKind::Analytic {
        columns,
        criteria: vec![AnalyticCriterion {
            id: new_id(),
            name: "New Criterion".to_string(),
            description: String::new(),
            weight: 1.0,
            cells,
            blooms_levels: Vec::new(),
            co_mapping: Vec::new(),
            po_mapping: Vec::new(),
        }],
    }
}

fn holistic_template_kind() -> RubricKind {
    RubricKind::Holistic {
        levels: DEFAULT_COLUMNS
            .iter()
            .map(|(label, score)| Level {
                id: new_id(),
                label: (*label).to_string(),
                score: *score,
                description: String::new(),
                image: None,
            })
            .collect(),
    }
}

fn single_point_template_kind() -> RubricKind {
    RubricKind::SinglePoint {
        criteria: vec![SinglePointCriterion {
            id: new_id(),
            name: "New Criterion".to_string(),
            standard: String::new(),
            feedback_fields: Vec::new(),
            blooms_levels: Vec::new(),
            co_mapping: Vec::new(),
            po_mapping: Vec::new(),
        }],
    }
}

fn developmental_template_kind() -> RubricKind {
    RubricKind::Developmental {
        items: vec![PortfolioItem {
            id: new_id(),
            label: "New Item".to_string(),
            required: true,
            blooms_levels: Vec::new(),
            co_mapping: Vec::new(),
        }],
    }
}

pub fn template_kind(rubric_type: RubricType) -> RubricKind {
    match rubric_type {
        RubricType::Analytic => analytic_template_kind(),
        RubricType::Holistic => holistic_template_kind(),
        RubricType::SinglePoint => single_point_template_kind(),
        RubricType::Developmental => developmental_template_kind(),
    }
}

impl Rubric {
    /// Canonical initial state for a rubric of the given type. Same shape
    /// on every call, fresh ids on every call.
    pub fn template(rubric_type: RubricType) -> Rubric {
        Rubric {
            id: new_id(),
            title: "Untitled Rubric".to_string(),
            description: String::new(),
            scoring_type: ScoringType::Points,
            include_metadata: false,
            kind: template_kind(rubric_type),
        }
    }

    /// Destructive type switch: the old type-specific collections are
    /// discarded and the new template's are instantiated. Title,
    /// description, scoring type and metadata flag survive.
    pub fn switch_kind(&self, rubric_type: RubricType) -> Rubric {
        let mut out = self.clone();
        out.kind = template_kind(rubric_type);
        out
    }

    pub fn rubric_type(&self) -> RubricType {
        self.kind.rubric_type()
    }

    /// Theoretical maximum for Analytic rubrics: the best cell of each
    /// row, weighted. Other types have no theoretical-max concept and
    /// report 0. Note the asymmetry with evaluation totals, which do not
    /// apply weight; both behaviors are locked by tests.
    pub fn total_points(&self) -> f64 {
        match &self.kind {
            RubricKind::Analytic { criteria, .. } => criteria
                .iter()
                .map(|c| best_cell_score(c) * c.weight)
                .sum(),
            _ => 0.0,
        }
    }
}

pub fn best_cell_score(criterion: &AnalyticCriterion) -> f64 {
    criterion
        .cells
        .iter()
        .map(|cell| cell.score)
        .fold(0.0_f64, f64::max)
}

/// Toggle a tag in a set-valued list: add if absent, remove if present.
/// Self-inverse, so toggling twice restores the original contents.
pub fn toggle_tag(tags: &mut Vec<String>, tag: &str) {
    if let Some(pos) = tags.iter().position(|t| t == tag) {
        tags.remove(pos);
    } else {
        tags.push(tag.to_string());
    }
}
