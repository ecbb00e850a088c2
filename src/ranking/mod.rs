//! Rank aggregation over judges' batch-ranking ballots.
//!
//! Both algorithms are pure functions over the full ballot history of every
//! judge plus the project enumeration; they mutate nothing and can run at
//! any time on a snapshot of the store.

mod borda;
mod copeland;

pub use borda::borda_ranking;
pub use copeland::copeland_ranking;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::Database;

/// One judge's complete batch-ranking history. Each inner list is one
/// ballot, best project first.
#[derive(Debug, Clone)]
pub struct JudgeBallots {
    pub rankings: Vec<Vec<Uuid>>,
}

/// One entry of an aggregated ranking, ordered best first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedProject {
    pub project_id: Uuid,
    pub score: f64,
}

/// Which aggregation to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankMethod {
    Borda,
    Copeland,
}

/// Snapshot the store and aggregate every judge's ballot history.
pub fn scores_from_db(db: &Database, method: RankMethod) -> Result<Vec<RankedProject>> {
    let projects = db.get_all_projects()?;
    let judges = db.get_all_judges()?;

    let ballots: Vec<JudgeBallots> = judges
        .into_iter()
        .map(|judge| JudgeBallots {
            rankings: judge.past_rankings,
        })
        .collect();

    let project_ids: Vec<Uuid> = projects.into_iter().map(|p| p.id).collect();

    Ok(match method {
        RankMethod::Borda => borda_ranking(&ballots, &project_ids),
        RankMethod::Copeland => copeland_ranking(&ballots, &project_ids),
    })
}
