use std::collections::HashMap;

use uuid::Uuid;

use super::{JudgeBallots, RankedProject};

/// Aggregate ballots with a Copeland-style pairwise tally.
/// See <https://en.wikipedia.org/wiki/Copeland%27s_method>
///
/// Every unordered pair of projects appearing in the same ballot is a duel
/// won by the higher-ranked of the two. A project's score is its wins minus
/// its losses across every duel in every ballot of every judge. The result
/// is ordered by descending score; equal scores are broken by ascending
/// project id so exported rankings are reproducible.
pub fn copeland_ranking(ballots: &[JudgeBallots], projects: &[Uuid]) -> Vec<RankedProject> {
    let mut scores: HashMap<Uuid, f64> = HashMap::new();

    for judge in ballots {
        for batch in &judge.rankings {
            // Earlier position in the ballot beats every later position
            for (i, winner) in batch.iter().enumerate() {
                for loser in &batch[i + 1..] {
                    *scores.entry(*winner).or_insert(0.0) += 1.0;
                    *scores.entry(*loser).or_insert(0.0) -= 1.0;
                }
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

    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.project_id.cmp(&b.project_id))
    });
    ranked
}
