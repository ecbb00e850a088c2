use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Audit entry written when a judge releases a project without scoring it.
///
/// A skip records the judge's stated reason; a break uses the fixed reason
/// `"break"`. Flags are append-only and surfaced on the admin dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flag {
    pub id: Uuid,
    pub project_id: Uuid,
    pub judge_id: Uuid,
    /// Display name of the judge at the time of the flag.
    pub judge_name: String,
    /// Project name at the time of the flag.
    pub project_name: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}
