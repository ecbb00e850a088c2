use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Project;

/// A judging account.
///
/// A judge holds at most one in-progress assignment at a time (`current`).
/// Completed judgements accumulate in `seen_projects`, which never contains
/// the same project twice. `current_rankings` is the in-progress batch
/// ballot; submitting it appends a completed batch to `past_rankings`, the
/// 2-D ballot history consumed by rank aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Judge {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub active: bool,
    pub read_welcome: bool,
    /// Free-form admin notes about this judge.
    pub notes: String,
    /// The project this judge is currently looking at, if any.
    pub current: Option<Uuid>,
    /// Number of completed judgements; mirrors `seen_projects.len()`.
    pub seen: i64,
    pub seen_projects: Vec<JudgedProject>,
    pub current_rankings: Vec<Uuid>,
    pub past_rankings: Vec<Vec<Uuid>>,
    pub last_activity: DateTime<Utc>,
}

/// A completed judgement of one project by one judge.
///
/// Snapshots the project metadata at judging time so later edits to the
/// project do not rewrite judging history. Created once when the judge
/// finishes scoring; only the scores and notes may change afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgedProject {
    pub project_id: Uuid,
    /// Per-category integer scores, keyed by category name from
    /// [`Options::categories`](super::Options).
    pub categories: BTreeMap<String, i64>,
    pub notes: String,
    pub name: String,
    pub location: String,
    pub description: String,
}

impl JudgedProject {
    /// Build a judgement snapshot from a project and its submitted scores.
    pub fn from_project(project: &Project, categories: BTreeMap<String, i64>) -> Self {
        Self {
            project_id: project.id,
            categories,
            notes: String::new(),
            name: project.name.clone(),
            location: project.location.clone(),
            description: project.description.clone(),
        }
    }
}

/// Input for creating a new judge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJudgeInput {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub notes: String,
}

/// Aggregate statistics over the judge table, for the admin dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeStats {
    pub num: i64,
    pub avg_seen: f64,
    pub num_active: i64,
}
