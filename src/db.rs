use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("rubrics.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS rubrics(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            rubric_type TEXT NOT NULL,
            scoring_type TEXT NOT NULL,
            include_metadata INTEGER NOT NULL DEFAULT 0,
            created_at TEXT,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS rubric_criteria(
            id TEXT PRIMARY KEY,
            rubric_id TEXT NOT NULL,
            criterion_order INTEGER NOT NULL,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            weight_percentage REAL NOT NULL DEFAULT 0,
            standard TEXT,
            feedback_fields TEXT NOT NULL DEFAULT '[]',
            blooms_levels TEXT NOT NULL DEFAULT '[]',
            co_mapping TEXT NOT NULL DEFAULT '[]',
            po_mapping TEXT NOT NULL DEFAULT '[]',
            FOREIGN KEY(rubric_id) REFERENCES rubrics(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_rubric_criteria_rubric
         ON rubric_criteria(rubric_id, criterion_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS rubric_levels(
            id TEXT PRIMARY KEY,
            rubric_id TEXT NOT NULL,
            level_order INTEGER NOT NULL,
            label TEXT NOT NULL,
            score REAL,
            description TEXT NOT NULL DEFAULT '',
            image TEXT,
            FOREIGN KEY(rubric_id) REFERENCES rubrics(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_rubric_levels_rubric
         ON rubric_levels(rubric_id, level_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS rubric_cells(
            rubric_id TEXT NOT NULL,
            criterion_order INTEGER NOT NULL,
            level_order INTEGER NOT NULL,
            score REAL NOT NULL DEFAULT 0,
            description TEXT NOT NULL DEFAULT '',
            image TEXT,
            PRIMARY KEY(rubric_id, criterion_order, level_order),
            FOREIGN KEY(rubric_id) REFERENCES rubrics(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS rubric_portfolios(
            id TEXT PRIMARY KEY,
            rubric_id TEXT NOT NULL,
            portfolio_order INTEGER NOT NULL,
            label TEXT NOT NULL,
            is_required INTEGER NOT NULL DEFAULT 1,
            blooms_levels TEXT NOT NULL DEFAULT '[]',
            co_mapping TEXT NOT NULL DEFAULT '[]',
            FOREIGN KEY(rubric_id) REFERENCES rubrics(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_rubric_portfolios_rubric
         ON rubric_portfolios(rubric_id, portfolio_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS evaluations(
            id TEXT PRIMARY KEY,
            rubric_id TEXT NOT NULL,
            student_attempt_id TEXT NOT NULL,
            question_response_id TEXT,
            marks_obtained REAL NOT NULL,
            max_marks REAL NOT NULL,
            feedback TEXT NOT NULL DEFAULT '',
            created_at TEXT,
            FOREIGN KEY(rubric_id) REFERENCES rubrics(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_evaluations_attempt
         ON evaluations(student_attempt_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS evaluation_entries(
            id TEXT PRIMARY KEY,
            evaluation_id TEXT NOT NULL,
            criterion_id TEXT NOT NULL,
            level_id TEXT NOT NULL,
            feedback TEXT NOT NULL DEFAULT '',
            FOREIGN KEY(evaluation_id) REFERENCES evaluations(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_evaluation_entries_eval
         ON evaluation_entries(evaluation_id)",
        [],
    )?;

    Ok(conn)
}
