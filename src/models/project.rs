use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A hackathon project shown to judges.
///
/// `seen` counts how many times the project has been assigned to a judge.
/// It is incremented when a judge picks the project and decremented again if
/// the judge releases it without scoring (skip or break), so at rest it
/// equals the number of completed or in-progress judgements.
///
/// Whether a project is *busy* (currently held by some active judge) is
/// derived from the judges' `current` fields and never stored here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    /// Table number or physical location of the team.
    pub location: String,
    pub description: String,
    pub url: Option<String>,
    pub try_link: Option<String>,
    pub video_link: Option<String>,
    pub seen: i64,
    /// Inactive projects are invisible to assignment.
    pub active: bool,
    /// Prioritized projects jump the load-balancing queue on the next pick.
    pub prioritized: bool,
    pub last_activity: DateTime<Utc>,
}

/// Input for creating a new project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProjectInput {
    pub name: String,
    pub location: String,
    pub description: String,
    pub url: Option<String>,
    pub try_link: Option<String>,
    pub video_link: Option<String>,
}

/// Aggregate statistics over the project table, for the admin dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectStats {
    pub num: i64,
    pub avg_seen: f64,
    pub num_active: i64,
}
