use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use rusqlite::Transaction;
use uuid::Uuid;

use super::{Comparisons, EngineError};
use crate::db::{self, Database};
use crate::models::{Flag, Judge, JudgedProject, Project};

/// How many times a pick re-derives its selection after losing a race
/// before giving up with [`EngineError::Conflict`].
const MAX_PICK_ATTEMPTS: u32 = 3;

enum PickOutcome {
    Picked(Project),
    /// Another request assigned this judge a project first.
    AlreadyAssigned(Uuid),
    /// The commit guard failed; re-derive the selection and try again.
    Raced,
    NoneAvailable,
}

/// Pick the next project for a judge, or `Ok(None)` when nothing qualifies.
///
/// Eligible projects are the active ones not currently held by another
/// judge and not already judged by this judge. Among them, prioritized
/// projects short-circuit load balancing; otherwise the least-seen projects
/// win, with ties broken toward the candidate least compared against this
/// judge's history and finally by lowest project id.
///
/// Selection and commit happen in one transaction; a lost race or busy
/// store re-derives the whole selection up to [`MAX_PICK_ATTEMPTS`] times.
pub fn pick_next_project(
    db: &Database,
    comps: &Comparisons,
    judge_id: Uuid,
) -> Result<Option<Project>, EngineError> {
    let judge = db
        .get_judge(judge_id)?
        .ok_or_else(|| EngineError::validation("unknown judge"))?;
    if !judge.active {
        return Err(EngineError::validation("judge is not active"));
    }

    // A judge polling while already assigned gets their project back.
    if let Some(current) = judge.current {
        return Ok(Some(current_project(db, current)?));
    }

    if db.get_options()?.judging_ended {
        return Ok(None);
    }

    for attempt in 1..=MAX_PICK_ATTEMPTS {
        match db.transaction(|tx| attempt_pick(tx, comps, judge_id)) {
            Ok(PickOutcome::Picked(project)) => {
                tracing::debug!(judge = %judge_id, project = %project.id, "assigned project");
                return Ok(Some(project));
            }
            Ok(PickOutcome::AlreadyAssigned(current)) => {
                return Ok(Some(current_project(db, current)?));
            }
            Ok(PickOutcome::NoneAvailable) => return Ok(None),
            Ok(PickOutcome::Raced) => {
                tracing::debug!(judge = %judge_id, attempt, "pick raced, re-deriving selection");
            }
            // A busy store counts against the retry budget like a lost
            // race; exhausting it falls through to the conflict below.
            Err(EngineError::Store(err)) if db::is_busy_error(&err) => {
                tracing::warn!(judge = %judge_id, attempt, "pick transaction busy, retrying");
            }
            Err(err) => return Err(err),
        }
    }

    Err(EngineError::Conflict(MAX_PICK_ATTEMPTS))
}

fn current_project(db: &Database, current: Uuid) -> Result<Project, EngineError> {
    db.get_project(current)?.ok_or_else(|| {
        EngineError::Store(anyhow::anyhow!(
            "judge's current project is missing from the store"
        ))
    })
}

fn attempt_pick(
    tx: &Transaction<'_>,
    comps: &Comparisons,
    judge_id: Uuid,
) -> Result<PickOutcome, EngineError> {
    let judge = db::find_judge(tx, judge_id)?
        .ok_or_else(|| EngineError::validation("unknown judge"))?;
    if let Some(current) = judge.current {
        return Ok(PickOutcome::AlreadyAssigned(current));
    }

    let busy: HashSet<Uuid> = db::find_busy_project_ids(tx)?.into_iter().collect();
    let seen: HashSet<Uuid> = judge
        .seen_projects
        .iter()
        .map(|p| p.project_id)
        .collect();

    let eligible: Vec<Project> = db::find_active_projects(tx)?
        .into_iter()
        .filter(|p| !busy.contains(&p.id) && !seen.contains(&p.id))
        .collect();

    let Some(mut chosen) = select_candidate(comps, eligible, &judge.seen_projects) else {
        return Ok(PickOutcome::NoneAvailable);
    };

    if db::commit_pick(tx, &chosen, judge_id)? {
        chosen.seen += 1;
        chosen.prioritized = false;
        Ok(PickOutcome::Picked(chosen))
    } else {
        Ok(PickOutcome::Raced)
    }
}

/// Narrow the eligible set down to one project.
///
/// Priority override first, then minimum seen count, then least compared
/// against the judge's history, then lowest project id.
fn select_candidate(
    comps: &Comparisons,
    mut eligible: Vec<Project>,
    seen_projects: &[JudgedProject],
) -> Option<Project> {
    if eligible.is_empty() {
        return None;
    }

    if eligible.iter().any(|p| p.prioritized) {
        eligible.retain(|p| p.prioritized);
    }

    let min_seen = eligible.iter().map(|p| p.seen).min()?;
    eligible.retain(|p| p.seen == min_seen);

    let tied = comps.least_compared(&eligible, seen_projects);
    let index = tied.into_iter().min_by_key(|&i| eligible[i].id)?;
    Some(eligible.swap_remove(index))
}

/// Release a judge's current assignment without recording a score.
///
/// Decrements the project's seen count to compensate the pick-time
/// increment and writes an audit [`Flag`]. A break is a skip with the fixed
/// reason `"break"`. Callers serialize per judge; releasing twice without
/// an intervening pick would double-decrement.
pub fn skip_current_project(db: &Database, judge_id: Uuid, reason: &str) -> Result<(), EngineError> {
    db.transaction(|tx| {
        let judge = db::find_judge(tx, judge_id)?
            .ok_or_else(|| EngineError::validation("unknown judge"))?;
        let current = judge
            .current
            .ok_or_else(|| EngineError::validation("judge doesn't have a current project"))?;
        let project = db::find_project(tx, current)?
            .ok_or_else(|| EngineError::validation("current project no longer exists"))?;

        db::release_current(tx, judge_id)?;
        db::decrement_seen(tx, current)?;
        db::insert_flag(
            tx,
            &Flag {
                id: Uuid::new_v4(),
                project_id: current,
                judge_id,
                judge_name: judge.name,
                project_name: project.name,
                reason: reason.to_string(),
                created_at: Utc::now(),
            },
        )?;

        tracing::info!(judge = %judge_id, project = %current, reason, "released assignment");
        Ok(())
    })
}

/// Finish judging the current project: snapshot it into the judge's log,
/// free their slot and feed the comparison matrix.
///
/// The matrix update happens after the commit, exactly once per first-time
/// scoring; later edits go through [`update_score`] and never touch it.
pub fn score_current_project(
    db: &Database,
    comps: &Comparisons,
    judge_id: Uuid,
    categories: BTreeMap<String, i64>,
    notes: String,
) -> Result<JudgedProject, EngineError> {
    validate_categories(db, &categories)?;

    let (judged, prior_seen) = db.transaction(|tx| {
        let judge = db::find_judge(tx, judge_id)?
            .ok_or_else(|| EngineError::validation("unknown judge"))?;
        let current = judge
            .current
            .ok_or_else(|| EngineError::validation("judge doesn't have a current project"))?;
        if judge.seen_projects.iter().any(|p| p.project_id == current) {
            return Err(EngineError::validation("judge has already judged this project"));
        }
        let project = db::find_project(tx, current)?
            .ok_or_else(|| EngineError::validation("current project no longer exists"))?;

        let mut judged = JudgedProject::from_project(&project, categories);
        judged.notes = notes;
        db::append_seen_and_clear_current(tx, &judge, &judged)?;
        Ok((judged, judge.seen_projects))
    })?;

    comps.record_seen(&prior_seen, judged.project_id);
    Ok(judged)
}

/// Rescore an already-judged project. Does not touch the comparison matrix.
pub fn update_score(
    db: &Database,
    judge_id: Uuid,
    project_id: Uuid,
    categories: BTreeMap<String, i64>,
) -> Result<(), EngineError> {
    validate_categories(db, &categories)?;
    edit_judgement(db, judge_id, project_id, |judged| {
        judged.categories = categories;
    })
}

/// Update the notes on an already-judged project.
pub fn update_notes(
    db: &Database,
    judge_id: Uuid,
    project_id: Uuid,
    notes: String,
) -> Result<(), EngineError> {
    edit_judgement(db, judge_id, project_id, |judged| {
        judged.notes = notes;
    })
}

fn edit_judgement(
    db: &Database,
    judge_id: Uuid,
    project_id: Uuid,
    edit: impl FnOnce(&mut JudgedProject),
) -> Result<(), EngineError> {
    let judge = db
        .get_judge(judge_id)?
        .ok_or_else(|| EngineError::validation("unknown judge"))?;
    let mut seen_projects = judge.seen_projects;
    let judged = seen_projects
        .iter_mut()
        .find(|p| p.project_id == project_id)
        .ok_or_else(|| {
            EngineError::validation("judge hasn't seen project or project is invalid")
        })?;
    edit(judged);
    db.update_seen_projects(judge_id, &seen_projects)?;
    Ok(())
}

/// Validate and persist a completed batch ballot.
///
/// While judging is open, the ballot must contain exactly
/// `batch_ranking_size` projects; once judging has ended a shorter final
/// ballot is allowed, but never an empty one. Every ranked project must
/// appear in the judge's judgement log.
pub fn submit_batch_ranking(
    db: &Database,
    judge_id: Uuid,
    batch: &[Uuid],
) -> Result<(), EngineError> {
    let judge = db
        .get_judge(judge_id)?
        .ok_or_else(|| EngineError::validation("unknown judge"))?;

    if batch.is_empty() {
        return Err(EngineError::validation(
            "batch ranking should be at least 1 project large",
        ));
    }

    let options = db.get_options()?;
    if !options.judging_ended && batch.len() as i64 != options.batch_ranking_size {
        return Err(EngineError::Validation(format!(
            "batch should be exactly {} projects large",
            options.batch_ranking_size
        )));
    }

    let mut unique = HashSet::new();
    for id in batch {
        if !unique.insert(id) {
            return Err(EngineError::validation(
                "batch ranking contains duplicate projects",
            ));
        }
        if !judge.seen_projects.iter().any(|p| p.project_id == *id) {
            return Err(EngineError::Validation(format!(
                "judge hasn't seen ranked project {id}"
            )));
        }
    }

    db.push_past_ranking(judge_id, batch)?;
    Ok(())
}

/// Look up a judgement in a judge's log by project id.
pub fn find_judged_project(judge: &Judge, project_id: Uuid) -> Option<&JudgedProject> {
    judge
        .seen_projects
        .iter()
        .find(|p| p.project_id == project_id)
}

fn validate_categories(db: &Database, categories: &BTreeMap<String, i64>) -> Result<(), EngineError> {
    let options = db.get_options()?;
    let allowed: HashSet<&str> = options.categories.iter().map(String::as_str).collect();
    for key in categories.keys() {
        if !allowed.contains(key.as_str()) {
            return Err(EngineError::Validation(format!(
                "unknown scoring category: {key}"
            )));
        }
    }
    Ok(())
}
