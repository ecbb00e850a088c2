use std::collections::HashMap;

use uuid::Uuid;

use super::{JudgeBallots, RankedProject};

/// Aggregate ballots with a Borda count.
/// See <https://en.wikipedia.org/wiki/Borda_count>
///
/// `n` is the largest ballot observed across all judges; the project in
/// position `i` of a ballot (0-based) earns `n - i` points. Projects never
/// ranked score 0. The result is ordered by descending score; ties keep the
/// original project enumeration order (the sort is stable).
pub fn borda_ranking(ballots: &[JudgeBallots], projects: &[Uuid]) -> Vec<RankedProject> {
    let mut scores: HashMap<Uuid, f64> = HashMap::new();

    // Largest batch size across every judge's ballots
    let n = ballots
        .iter()
        .flat_map(|judge| judge.rankings.iter())
        .map(Vec::len)
        .max()
        .unwrap_or(0);

    // n points to 1st place, n-1 to 2nd place, ... down each ballot
    for judge in ballots {
        for batch in &judge.rankings {
            for (i, project_id) in batch.iter().enumerate() {
                *scores.entry(*project_id).or_insert(0.0) += (n - i) as f64;
            }
        }
    }

    let mut ranked: Vec<RankedProject> = projects
        .iter()
        .map(|project_id| RankedProject {
            project_id: *project_id,
            score: scores.get(project_id).copied().unwrap_or(0.0),
        })
        .collect();

    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked
}
