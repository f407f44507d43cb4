use std::collections::HashMap;
use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::model::Rubric;
use crate::scoring::Selections;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// One in-progress grading pass. Sessions are independent of each
/// other; the rubric snapshot is fixed when the session starts.
pub struct EvalSession {
    pub rubric: Rubric,
    pub student_attempt_id: String,
    pub question_response_id: Option<String>,
    pub selections: Selections,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    /// Builder-owned rubric drafts, keyed by rubric id, alive until
    /// saved or discarded.
    pub drafts: HashMap<String, Rubric>,
    /// Open evaluation sessions keyed by session id.
    pub sessions: HashMap<String, EvalSession>,
}

impl AppState {
    pub fn new() -> AppState {
        AppState {
            workspace: None,
            db: None,
            drafts: HashMap::new(),
            sessions: HashMap::new(),
        }
    }
}
