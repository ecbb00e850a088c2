use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use uuid::Uuid;

use crate::db::Database;
use crate::models::{JudgedProject, Project};

/// In-memory matrix of pairwise "seen together" counts between projects.
///
/// Copeland aggregation is only meaningful for pairs of projects that some
/// judge has actually seen both of, so the scheduler consults this matrix to
/// steer assignments toward under-compared pairs. The matrix is rebuilt from
/// the persisted judgement logs at startup and updated once per completed
/// judgement.
///
/// Owned by the composition root and shared by reference; the mutex is an
/// internal detail and is only ever held for in-memory work.
pub struct Comparisons {
    counts: Mutex<HashMap<(Uuid, Uuid), u64>>,
}

/// Normalize an unordered pair to a stable key.
fn pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl Comparisons {
    pub fn new() -> Self {
        Self {
            counts: Mutex::new(HashMap::new()),
        }
    }

    /// Rebuild the matrix from every judge's judgement log.
    ///
    /// Called once at startup; a read failure here fails the boot sequence,
    /// since running without comparison data would silently skew assignment.
    pub fn load(db: &Database) -> Result<Self> {
        let comps = Self::new();
        let judges = db.get_all_judges()?;
        {
            let mut counts = comps.counts.lock().expect("comparisons lock poisoned");
            for judge in &judges {
                let seen = &judge.seen_projects;
                for i in 0..seen.len() {
                    for j in (i + 1)..seen.len() {
                        let key = pair(seen[i].project_id, seen[j].project_id);
                        *counts.entry(key).or_insert(0) += 1;
                    }
                }
            }
        }
        Ok(comps)
    }

    /// Record a completed judgement: the new project has now been seen
    /// together with everything already in this judge's log.
    ///
    /// Must be called exactly once per first-time scoring, never on edits.
    pub fn record_seen(&self, seen_projects: &[JudgedProject], new_project: Uuid) {
        let mut counts = self.counts.lock().expect("comparisons lock poisoned");
        for seen in seen_projects {
            if seen.project_id == new_project {
                continue;
            }
            let key = pair(seen.project_id, new_project);
            *counts.entry(key).or_insert(0) += 1;
        }
    }

    /// Times the two projects have appeared in the same judge's log.
    pub fn count(&self, a: Uuid, b: Uuid) -> u64 {
        let counts = self.counts.lock().expect("comparisons lock poisoned");
        counts.get(&pair(a, b)).copied().unwrap_or(0)
    }

    /// Indices of the candidates least compared against the judge's seen
    /// set, in original candidate order (stable under ties).
    pub fn least_compared(&self, candidates: &[Project], seen_projects: &[JudgedProject]) -> Vec<usize> {
        let counts = self.counts.lock().expect("comparisons lock poisoned");

        let mut best = u64::MAX;
        let mut indices = Vec::new();
        for (i, candidate) in candidates.iter().enumerate() {
            let total: u64 = seen_projects
                .iter()
                .map(|seen| {
                    counts
                        .get(&pair(candidate.id, seen.project_id))
                        .copied()
                        .unwrap_or(0)
                })
                .sum();
            if total < best {
                best = total;
                indices.clear();
                indices.push(i);
            } else if total == best {
                indices.push(i);
            }
        }
        indices
    }
}

impl Default for Comparisons {
    fn default() -> Self {
        Self::new()
    }
}
