use serde::{Deserialize, Serialize};

/// Global event configuration.
///
/// Stored as a single row and created with these defaults the first time it
/// is read. Updates are unconditional last-writer-wins; there is no version
/// stamp, so two concurrent admin edits will silently keep the later one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Options {
    /// Target minimum number of times every active project should be seen.
    pub min_views: i64,
    /// Number of projects in one batch-ranking ballot.
    pub batch_ranking_size: i64,
    /// Once true, no new assignments are handed out.
    pub judging_ended: bool,
    /// Scoring rubric category names.
    pub categories: Vec<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            min_views: 3,
            batch_ranking_size: 8,
            judging_ended: false,
            categories: vec![
                "Creativity/Innovation".to_string(),
                "Technical Competence/Execution".to_string(),
                "Research/Design".to_string(),
                "Presentation".to_string(),
            ],
        }
    }
}
