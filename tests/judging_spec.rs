use std::collections::BTreeMap;

use podium::db::Database;
use podium::judging::{
    pick_next_project, score_current_project, skip_current_project, submit_batch_ranking,
    update_notes, update_score, Comparisons, EngineError,
};
use podium::models::*;
use speculate2::speculate;
use uuid::Uuid;

fn create_test_project(db: &Database, name: &str) -> Project {
    db.create_project(CreateProjectInput {
        name: name.to_string(),
        location: "Table 1".to_string(),
        description: "A test project".to_string(),
        url: None,
        try_link: None,
        video_link: None,
    })
    .expect("Failed to create project")
}

fn create_test_judge(db: &Database, name: &str) -> Judge {
    db.create_judge(CreateJudgeInput {
        name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase()),
        notes: String::new(),
    })
    .expect("Failed to create judge")
}

/// Pick and score in one go, so the judge's slot is free again.
fn judge_one(db: &Database, comps: &Comparisons, judge_id: Uuid) -> Option<Uuid> {
    let project = pick_next_project(db, comps, judge_id).expect("Pick failed")?;
    score_current_project(db, comps, judge_id, BTreeMap::new(), String::new())
        .expect("Score failed");
    Some(project.id)
}

speculate! {
    before {
        let db = Database::open_memory().expect("Failed to create in-memory database");
        db.migrate().expect("Failed to run migrations");
        let comps = Comparisons::new();
    }

    describe "pick_next_project" {
        it "assigns an eligible project and bumps its seen count" {
            let project = create_test_project(&db, "Only");
            let judge = create_test_judge(&db, "Alice");

            let picked = pick_next_project(&db, &comps, judge.id)
                .expect("Pick failed")
                .expect("Expected a project");
            assert_eq!(picked.id, project.id);
            assert_eq!(picked.seen, 1);

            let stored = db.get_project(project.id).expect("Query failed").unwrap();
            assert_eq!(stored.seen, 1);
            let stored_judge = db.get_judge(judge.id).expect("Query failed").unwrap();
            assert_eq!(stored_judge.current, Some(project.id));
        }

        it "returns the same project when the judge polls again" {
            let project = create_test_project(&db, "Only");
            let judge = create_test_judge(&db, "Alice");

            let first = pick_next_project(&db, &comps, judge.id).expect("Pick failed").unwrap();
            let second = pick_next_project(&db, &comps, judge.id).expect("Pick failed").unwrap();
            assert_eq!(first.id, project.id);
            assert_eq!(second.id, project.id);

            // Polling must not double-count the view.
            let stored = db.get_project(project.id).expect("Query failed").unwrap();
            assert_eq!(stored.seen, 1);
        }

        it "returns None when no projects exist" {
            let judge = create_test_judge(&db, "Alice");
            let picked = pick_next_project(&db, &comps, judge.id).expect("Pick failed");
            assert!(picked.is_none());
        }

        it "rejects an unknown judge" {
            let result = pick_next_project(&db, &comps, Uuid::new_v4());
            assert!(matches!(result, Err(EngineError::Validation(_))));
        }

        it "rejects a hidden judge" {
            let judge = create_test_judge(&db, "Alice");
            db.set_judge_active(judge.id, false).expect("Update failed");

            let result = pick_next_project(&db, &comps, judge.id);
            assert!(matches!(result, Err(EngineError::Validation(_))));
        }

        it "skips hidden projects" {
            let hidden = create_test_project(&db, "Hidden");
            db.set_project_active(hidden.id, false).expect("Update failed");
            let judge = create_test_judge(&db, "Alice");

            let picked = pick_next_project(&db, &comps, judge.id).expect("Pick failed");
            assert!(picked.is_none());
        }

        it "never assigns a project the judge already judged" {
            create_test_project(&db, "A");
            create_test_project(&db, "B");
            let judge = create_test_judge(&db, "Alice");

            let first = judge_one(&db, &comps, judge.id).expect("Expected a project");
            let second = judge_one(&db, &comps, judge.id).expect("Expected a project");
            assert_ne!(first, second);

            // Both judged, nothing left.
            assert!(judge_one(&db, &comps, judge.id).is_none());
        }

        it "never assigns a project another judge is holding" {
            let project = create_test_project(&db, "Only");
            let alice = create_test_judge(&db, "Alice");
            let bob = create_test_judge(&db, "Bob");

            let held = pick_next_project(&db, &comps, alice.id).expect("Pick failed").unwrap();
            assert_eq!(held.id, project.id);

            let picked = pick_next_project(&db, &comps, bob.id).expect("Pick failed");
            assert!(picked.is_none());
        }

        it "prefers the least-seen project" {
            let popular = create_test_project(&db, "Popular");
            let fresh = create_test_project(&db, "Fresh");
            let alice = create_test_judge(&db, "Alice");
            let bob = create_test_judge(&db, "Bob");

            // Alice judges the popular project first (lowest id tie-break
            // aside, force it by judging both).
            while let Some(_) = judge_one(&db, &comps, alice.id) {}
            let popular_seen = db.get_project(popular.id).expect("Query failed").unwrap().seen;
            let fresh_seen = db.get_project(fresh.id).expect("Query failed").unwrap().seen;
            assert_eq!(popular_seen, 1);
            assert_eq!(fresh_seen, 1);

            // Bump one project so the counts diverge.
            let charlie = create_test_judge(&db, "Charlie");
            let picked = pick_next_project(&db, &comps, charlie.id)
                .expect("Pick failed")
                .unwrap();
            score_current_project(&db, &comps, charlie.id, BTreeMap::new(), String::new())
                .expect("Score failed");
            let other = if picked.id == popular.id { fresh.id } else { popular.id };

            // Bob must get the project with fewer views.
            let bobs = pick_next_project(&db, &comps, bob.id).expect("Pick failed").unwrap();
            assert_eq!(bobs.id, other);
        }

        it "prioritized projects jump the queue" {
            let ordinary = create_test_project(&db, "Ordinary");
            let urgent = create_test_project(&db, "Urgent");

            // Give urgent the higher seen count so priority has to win
            // against load balancing.
            db.set_project_active(ordinary.id, false).expect("Update failed");
            let bob = create_test_judge(&db, "Bob");
            assert_eq!(judge_one(&db, &comps, bob.id), Some(urgent.id));
            db.set_project_active(ordinary.id, true).expect("Update failed");

            db.set_project_prioritized(urgent.id, true).expect("Update failed");

            let alice = create_test_judge(&db, "Alice");
            let picked = pick_next_project(&db, &comps, alice.id).expect("Pick failed").unwrap();
            assert_eq!(picked.id, urgent.id);
            assert!(!picked.prioritized);

            // The boost is consumed by the assignment.
            let stored = db.get_project(urgent.id).expect("Query failed").unwrap();
            assert!(!stored.prioritized);
        }

        it "breaks seen ties toward the least-compared candidate" {
            let a = create_test_project(&db, "A");
            let b = create_test_project(&db, "B");
            let c = create_test_project(&db, "C");

            // Bob sees A and B together, Charlie sees C alone. All three
            // projects end up with seen = 1, but only the A-B pair has any
            // comparison weight.
            let bob = create_test_judge(&db, "Bob");
            db.set_project_active(c.id, false).expect("Update failed");
            judge_one(&db, &comps, bob.id).unwrap();
            judge_one(&db, &comps, bob.id).unwrap();
            db.set_project_active(c.id, true).expect("Update failed");
            let charlie = create_test_judge(&db, "Charlie");
            assert_eq!(judge_one(&db, &comps, charlie.id), Some(c.id));

            // Alice has judged A; between B and C she must get C, the
            // project never compared against anything she has seen.
            let alice = create_test_judge(&db, "Alice");
            db.set_project_active(b.id, false).expect("Update failed");
            db.set_project_active(c.id, false).expect("Update failed");
            assert_eq!(judge_one(&db, &comps, alice.id), Some(a.id));
            db.set_project_active(b.id, true).expect("Update failed");
            db.set_project_active(c.id, true).expect("Update failed");

            let picked = pick_next_project(&db, &comps, alice.id)
                .expect("Pick failed")
                .unwrap();
            assert_eq!(picked.id, c.id);
        }

        it "returns None once judging has ended" {
            create_test_project(&db, "Late");
            let judge = create_test_judge(&db, "Alice");
            db.set_judging_ended(true).expect("Update failed");

            let picked = pick_next_project(&db, &comps, judge.id).expect("Pick failed");
            assert!(picked.is_none());
        }

        it "still returns the current project after judging has ended" {
            create_test_project(&db, "Late");
            let judge = create_test_judge(&db, "Alice");
            let held = pick_next_project(&db, &comps, judge.id).expect("Pick failed").unwrap();

            db.set_judging_ended(true).expect("Update failed");

            let again = pick_next_project(&db, &comps, judge.id).expect("Pick failed").unwrap();
            assert_eq!(again.id, held.id);
        }
    }

    describe "skip_current_project" {
        it "frees the slot, restores the seen count and records a flag" {
            let project = create_test_project(&db, "Only");
            let judge = create_test_judge(&db, "Alice");
            pick_next_project(&db, &comps, judge.id).expect("Pick failed").unwrap();

            skip_current_project(&db, judge.id, "busy table").expect("Skip failed");

            let stored_judge = db.get_judge(judge.id).expect("Query failed").unwrap();
            assert!(stored_judge.current.is_none());
            let stored = db.get_project(project.id).expect("Query failed").unwrap();
            assert_eq!(stored.seen, 0);

            let flags = db.get_all_flags().expect("Query failed");
            assert_eq!(flags.len(), 1);
            assert_eq!(flags[0].project_id, project.id);
            assert_eq!(flags[0].judge_id, judge.id);
            assert_eq!(flags[0].reason, "busy table");
        }

        it "makes the project assignable to another judge again" {
            let project = create_test_project(&db, "Only");
            let alice = create_test_judge(&db, "Alice");
            let bob = create_test_judge(&db, "Bob");

            pick_next_project(&db, &comps, alice.id).expect("Pick failed").unwrap();
            skip_current_project(&db, alice.id, "break").expect("Skip failed");

            let picked = pick_next_project(&db, &comps, bob.id).expect("Pick failed").unwrap();
            assert_eq!(picked.id, project.id);
        }

        it "fails when the judge has no current project" {
            let judge = create_test_judge(&db, "Alice");
            let result = skip_current_project(&db, judge.id, "break");
            assert!(matches!(result, Err(EngineError::Validation(_))));
        }
    }

    describe "score_current_project" {
        it "appends to the judgement log and clears the slot" {
            let project = create_test_project(&db, "Only");
            let judge = create_test_judge(&db, "Alice");
            pick_next_project(&db, &comps, judge.id).expect("Pick failed").unwrap();

            let mut categories = BTreeMap::new();
            categories.insert("Creativity/Innovation".to_string(), 7);
            let judged = score_current_project(
                &db,
                &comps,
                judge.id,
                categories.clone(),
                "solid demo".to_string(),
            )
            .expect("Score failed");
            assert_eq!(judged.project_id, project.id);

            let stored = db.get_judge(judge.id).expect("Query failed").unwrap();
            assert!(stored.current.is_none());
            assert_eq!(stored.seen, 1);
            assert_eq!(stored.seen_projects.len(), 1);
            assert_eq!(stored.seen_projects[0].project_id, project.id);
            assert_eq!(stored.seen_projects[0].categories, categories);
            assert_eq!(stored.seen_projects[0].notes, "solid demo");
        }

        it "feeds the comparison matrix once per judgement" {
            create_test_project(&db, "A");
            create_test_project(&db, "B");
            let judge = create_test_judge(&db, "Alice");

            let first = judge_one(&db, &comps, judge.id).unwrap();
            let second = judge_one(&db, &comps, judge.id).unwrap();

            assert_eq!(comps.count(first, second), 1);
        }

        it "rejects an unknown scoring category" {
            create_test_project(&db, "Only");
            let judge = create_test_judge(&db, "Alice");
            pick_next_project(&db, &comps, judge.id).expect("Pick failed").unwrap();

            let mut categories = BTreeMap::new();
            categories.insert("Vibes".to_string(), 10);
            let result =
                score_current_project(&db, &comps, judge.id, categories, String::new());
            assert!(matches!(result, Err(EngineError::Validation(_))));
        }

        it "fails when the judge has no current project" {
            let judge = create_test_judge(&db, "Alice");
            let result =
                score_current_project(&db, &comps, judge.id, BTreeMap::new(), String::new());
            assert!(matches!(result, Err(EngineError::Validation(_))));
        }
    }

    describe "update_score" {
        it "rewrites the categories of an existing judgement" {
            create_test_project(&db, "Only");
            let judge = create_test_judge(&db, "Alice");
            let project_id = judge_one(&db, &comps, judge.id).unwrap();

            let mut categories = BTreeMap::new();
            categories.insert("Presentation".to_string(), 9);
            update_score(&db, judge.id, project_id, categories.clone()).expect("Update failed");

            let stored = db.get_judge(judge.id).expect("Query failed").unwrap();
            assert_eq!(stored.seen_projects[0].categories, categories);
        }

        it "does not touch the comparison matrix" {
            create_test_project(&db, "A");
            create_test_project(&db, "B");
            let judge = create_test_judge(&db, "Alice");
            let first = judge_one(&db, &comps, judge.id).unwrap();
            let second = judge_one(&db, &comps, judge.id).unwrap();

            update_score(&db, judge.id, first, BTreeMap::new()).expect("Update failed");
            assert_eq!(comps.count(first, second), 1);
        }

        it "fails for a project the judge hasn't judged" {
            let judge = create_test_judge(&db, "Alice");
            let result = update_score(&db, judge.id, Uuid::new_v4(), BTreeMap::new());
            assert!(matches!(result, Err(EngineError::Validation(_))));
        }
    }

    describe "update_notes" {
        it "rewrites the notes of an existing judgement" {
            create_test_project(&db, "Only");
            let judge = create_test_judge(&db, "Alice");
            let project_id = judge_one(&db, &comps, judge.id).unwrap();

            update_notes(&db, judge.id, project_id, "revised".to_string())
                .expect("Update failed");

            let stored = db.get_judge(judge.id).expect("Query failed").unwrap();
            assert_eq!(stored.seen_projects[0].notes, "revised");
        }
    }

    describe "submit_batch_ranking" {
        before {
            db.update_batch_ranking_size(2).expect("Update failed");
        }

        it "stores a full batch as a past ranking" {
            create_test_project(&db, "A");
            create_test_project(&db, "B");
            let judge = create_test_judge(&db, "Alice");
            let first = judge_one(&db, &comps, judge.id).unwrap();
            let second = judge_one(&db, &comps, judge.id).unwrap();

            submit_batch_ranking(&db, judge.id, &[second, first]).expect("Submit failed");

            let stored = db.get_judge(judge.id).expect("Query failed").unwrap();
            assert_eq!(stored.past_rankings, vec![vec![second, first]]);
            assert!(stored.current_rankings.is_empty());
        }

        it "rejects an empty batch" {
            let judge = create_test_judge(&db, "Alice");
            let result = submit_batch_ranking(&db, judge.id, &[]);
            assert!(matches!(result, Err(EngineError::Validation(_))));
        }

        it "rejects a batch of the wrong size while judging is open" {
            create_test_project(&db, "A");
            let judge = create_test_judge(&db, "Alice");
            let only = judge_one(&db, &comps, judge.id).unwrap();

            let result = submit_batch_ranking(&db, judge.id, &[only]);
            assert!(matches!(result, Err(EngineError::Validation(_))));
        }

        it "accepts a short final batch once judging has ended" {
            create_test_project(&db, "A");
            let judge = create_test_judge(&db, "Alice");
            let only = judge_one(&db, &comps, judge.id).unwrap();

            db.set_judging_ended(true).expect("Update failed");
            submit_batch_ranking(&db, judge.id, &[only]).expect("Submit failed");

            let stored = db.get_judge(judge.id).expect("Query failed").unwrap();
            assert_eq!(stored.past_rankings, vec![vec![only]]);
        }

        it "rejects duplicate projects in a batch" {
            create_test_project(&db, "A");
            create_test_project(&db, "B");
            let judge = create_test_judge(&db, "Alice");
            let first = judge_one(&db, &comps, judge.id).unwrap();
            judge_one(&db, &comps, judge.id).unwrap();

            let result = submit_batch_ranking(&db, judge.id, &[first, first]);
            assert!(matches!(result, Err(EngineError::Validation(_))));
        }

        it "rejects projects the judge hasn't judged" {
            create_test_project(&db, "A");
            let judge = create_test_judge(&db, "Alice");
            let first = judge_one(&db, &comps, judge.id).unwrap();

            let result = submit_batch_ranking(&db, judge.id, &[first, Uuid::new_v4()]);
            assert!(matches!(result, Err(EngineError::Validation(_))));
        }
    }
}

/// A writer on a second connection keeps the store busy for every attempt,
/// so the pick must exhaust its retries and surface a conflict rather than
/// a storage failure.
#[test]
fn pick_reports_a_conflict_when_the_store_stays_busy() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("podium.db");
    let db = Database::open(path.clone()).expect("Failed to open database");
    db.migrate().expect("Failed to run migrations");
    let comps = Comparisons::new();
    create_test_project(&db, "Only");
    let judge = create_test_judge(&db, "Alice");
    // Materialize the options row so the pick's config read stays read-only.
    db.get_options().expect("Failed to read options");

    let blocker = rusqlite::Connection::open(&path).expect("Failed to open second connection");
    blocker
        .execute_batch("BEGIN IMMEDIATE")
        .expect("Failed to take the write lock");

    let result = pick_next_project(&db, &comps, judge.id);
    assert!(matches!(result, Err(EngineError::Conflict(_))));
}
