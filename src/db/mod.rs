mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use uuid::Uuid;

use crate::models::*;

/// Shared handle to the SQLite store.
///
/// All access goes through a single connection behind a mutex. Multi-record
/// operations (the pick commit, skip, scoring) run inside an IMMEDIATE
/// transaction via [`Database::transaction`], so a conflicting writer fails
/// fast with a busy error instead of deadlocking at commit time. Callers
/// that need atomicity across reads and writes pass a closure over the
/// transaction; the free functions at the bottom of this module are the
/// building blocks those closures compose.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("", "", "podium")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        let db_path = dirs.data_dir().join("podium.db");
        Self::open(db_path)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }

    /// Run `f` inside an IMMEDIATE transaction, committing on success and
    /// rolling back if the closure returns an error.
    pub fn transaction<T, E>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<rusqlite::Error>,
    {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    // ============================================================
    // Project operations
    // ============================================================

    pub fn create_project(&self, input: CreateProjectInput) -> Result<Project> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let id = Uuid::new_v4();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO projects (id, name, location, description, url, try_link, video_link, seen, active, prioritized, last_activity)
             VALUES (?, ?, ?, ?, ?, ?, ?, 0, 1, 0, ?)",
            (
                id.to_string(),
                &input.name,
                &input.location,
                &input.description,
                &input.url,
                &input.try_link,
                &input.video_link,
                now.to_rfc3339(),
            ),
        )?;

        Ok(Project {
            id,
            name: input.name,
            location: input.location,
            description: input.description,
            url: input.url,
            try_link: input.try_link,
            video_link: input.video_link,
            seen: 0,
            active: true,
            prioritized: false,
            last_activity: now,
        })
    }

    pub fn get_project(&self, id: Uuid) -> Result<Option<Project>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        Ok(find_project(&conn, id)?)
    }

    pub fn get_all_projects(&self) -> Result<Vec<Project>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects ORDER BY location, name"
        ))?;

        let projects = stmt
            .query_map([], project_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(projects)
    }

    pub fn set_project_active(&self, id: Uuid, active: bool) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "UPDATE projects SET active = ?, last_activity = ? WHERE id = ?",
            (active, Utc::now().to_rfc3339(), id.to_string()),
        )?;
        Ok(rows > 0)
    }

    pub fn set_project_prioritized(&self, id: Uuid, prioritized: bool) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "UPDATE projects SET prioritized = ? WHERE id = ?",
            (prioritized, id.to_string()),
        )?;
        Ok(rows > 0)
    }

    pub fn project_stats(&self) -> Result<ProjectStats> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let num: i64 = conn.query_row("SELECT COUNT(*) FROM projects", [], |row| row.get(0))?;
        let (avg_seen, num_active): (f64, i64) = conn.query_row(
            "SELECT COALESCE(AVG(seen), 0), COUNT(*) FROM projects WHERE active = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(ProjectStats {
            num,
            avg_seen,
            num_active,
        })
    }

    // ============================================================
    // Judge operations
    // ============================================================

    pub fn create_judge(&self, input: CreateJudgeInput) -> Result<Judge> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let id = Uuid::new_v4();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO judges (id, name, email, active, read_welcome, notes, current, seen, seen_projects, current_rankings, past_rankings, last_activity)
             VALUES (?, ?, ?, 1, 0, ?, NULL, 0, '[]', '[]', '[]', ?)",
            (
                id.to_string(),
                &input.name,
                &input.email,
                &input.notes,
                now.to_rfc3339(),
            ),
        )?;

        Ok(Judge {
            id,
            name: input.name,
            email: input.email,
            active: true,
            read_welcome: false,
            notes: input.notes,
            current: None,
            seen: 0,
            seen_projects: Vec::new(),
            current_rankings: Vec::new(),
            past_rankings: Vec::new(),
            last_activity: now,
        })
    }

    pub fn get_judge(&self, id: Uuid) -> Result<Option<Judge>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        Ok(find_judge(&conn, id)?)
    }

    pub fn get_all_judges(&self) -> Result<Vec<Judge>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(&format!("SELECT {JUDGE_COLUMNS} FROM judges ORDER BY name"))?;

        let judges = stmt
            .query_map([], judge_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(judges)
    }

    pub fn set_judge_active(&self, id: Uuid, active: bool) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "UPDATE judges SET active = ?, last_activity = ? WHERE id = ?",
            (active, Utc::now().to_rfc3339(), id.to_string()),
        )?;
        Ok(rows > 0)
    }

    pub fn set_judge_read_welcome(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "UPDATE judges SET read_welcome = 1, last_activity = ? WHERE id = ?",
            (Utc::now().to_rfc3339(), id.to_string()),
        )?;
        Ok(rows > 0)
    }

    pub fn update_judge_notes(&self, id: Uuid, notes: &str) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "UPDATE judges SET notes = ? WHERE id = ?",
            (notes, id.to_string()),
        )?;
        Ok(rows > 0)
    }

    pub fn judge_stats(&self) -> Result<JudgeStats> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let num: i64 = conn.query_row("SELECT COUNT(*) FROM judges", [], |row| row.get(0))?;
        let (avg_seen, num_active): (f64, i64) = conn.query_row(
            "SELECT COALESCE(AVG(seen), 0), COUNT(*) FROM judges WHERE active = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(JudgeStats {
            num,
            avg_seen,
            num_active,
        })
    }

    // ============================================================
    // Ranking state
    // ============================================================

    /// Replace a judge's in-progress batch ballot.
    pub fn set_current_rankings(&self, judge_id: Uuid, rankings: &[Uuid]) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "UPDATE judges SET current_rankings = ?, last_activity = ? WHERE id = ?",
            (
                serde_json::to_string(rankings)?,
                Utc::now().to_rfc3339(),
                judge_id.to_string(),
            ),
        )?;
        Ok(rows > 0)
    }

    /// Append a completed batch to the judge's ballot history and clear the
    /// in-progress ballot.
    pub fn push_past_ranking(&self, judge_id: Uuid, batch: &[Uuid]) -> Result<()> {
        self.transaction(|tx| -> Result<()> {
            let judge = find_judge(tx, judge_id)?
                .ok_or_else(|| anyhow::anyhow!("Judge not found"))?;
            let mut past = judge.past_rankings;
            past.push(batch.to_vec());
            tx.execute(
                "UPDATE judges SET past_rankings = ?, current_rankings = '[]', last_activity = ? WHERE id = ?",
                (
                    serde_json::to_string(&past)?,
                    Utc::now().to_rfc3339(),
                    judge_id.to_string(),
                ),
            )?;
            Ok(())
        })
    }

    /// Rewrite a judge's judgement log after a score or notes edit.
    pub fn update_seen_projects(&self, judge_id: Uuid, seen_projects: &[JudgedProject]) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        conn.execute(
            "UPDATE judges SET seen_projects = ?, last_activity = ? WHERE id = ?",
            (
                serde_json::to_string(seen_projects)?,
                Utc::now().to_rfc3339(),
                judge_id.to_string(),
            ),
        )?;
        Ok(())
    }

    // ============================================================
    // Flags
    // ============================================================

    pub fn get_all_flags(&self) -> Result<Vec<Flag>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, project_id, judge_id, judge_name, project_name, reason, created_at
             FROM flags ORDER BY created_at DESC",
        )?;

        let flags = stmt
            .query_map([], |row| {
                Ok(Flag {
                    id: parse_uuid(row.get::<_, String>(0)?),
                    project_id: parse_uuid(row.get::<_, String>(1)?),
                    judge_id: parse_uuid(row.get::<_, String>(2)?),
                    judge_name: row.get(3)?,
                    project_name: row.get(4)?,
                    reason: row.get(5)?,
                    created_at: parse_datetime(row.get::<_, String>(6)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(flags)
    }

    // ============================================================
    // Options
    // ============================================================

    /// Read the global options row, creating it with defaults if absent.
    pub fn get_options(&self) -> Result<Options> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT min_views, batch_ranking_size, judging_ended, categories FROM options WHERE id = 1",
        )?;

        let mut rows = stmt.query([])?;
        if let Some(row) = rows.next()? {
            Ok(Options {
                min_views: row.get(0)?,
                batch_ranking_size: row.get(1)?,
                judging_ended: row.get(2)?,
                categories: serde_json::from_str(&row.get::<_, String>(3)?).unwrap_or_default(),
            })
        } else {
            let options = Options::default();
            conn.execute(
                "INSERT INTO options (id, min_views, batch_ranking_size, judging_ended, categories)
                 VALUES (1, ?, ?, ?, ?)",
                (
                    options.min_views,
                    options.batch_ranking_size,
                    options.judging_ended,
                    serde_json::to_string(&options.categories)?,
                ),
            )?;
            Ok(options)
        }
    }

    pub fn update_min_views(&self, min_views: i64) -> Result<()> {
        self.get_options()?;
        let conn = self.conn.lock().expect("database lock poisoned");
        conn.execute(
            "UPDATE options SET min_views = ? WHERE id = 1",
            [min_views],
        )?;
        Ok(())
    }

    pub fn update_batch_ranking_size(&self, size: i64) -> Result<()> {
        self.get_options()?;
        let conn = self.conn.lock().expect("database lock poisoned");
        conn.execute(
            "UPDATE options SET batch_ranking_size = ? WHERE id = 1",
            [size],
        )?;
        Ok(())
    }

    pub fn set_judging_ended(&self, ended: bool) -> Result<()> {
        self.get_options()?;
        let conn = self.conn.lock().expect("database lock poisoned");
        conn.execute(
            "UPDATE options SET judging_ended = ? WHERE id = 1",
            [ended],
        )?;
        Ok(())
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

// ============================================================
// Transaction building blocks
//
// Free functions over a borrowed connection so the scheduler can compose
// them inside one `Database::transaction` call.
// ============================================================

const PROJECT_COLUMNS: &str =
    "id, name, location, description, url, try_link, video_link, seen, active, prioritized, last_activity";

const JUDGE_COLUMNS: &str =
    "id, name, email, active, read_welcome, notes, current, seen, seen_projects, current_rankings, past_rankings, last_activity";

pub fn find_project(conn: &Connection, id: Uuid) -> rusqlite::Result<Option<Project>> {
    let mut stmt =
        conn.prepare(&format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?"))?;
    let mut rows = stmt.query([id.to_string()])?;
    match rows.next()? {
        Some(row) => Ok(Some(project_from_row(row)?)),
        None => Ok(None),
    }
}

pub fn find_judge(conn: &Connection, id: Uuid) -> rusqlite::Result<Option<Judge>> {
    let mut stmt = conn.prepare(&format!("SELECT {JUDGE_COLUMNS} FROM judges WHERE id = ?"))?;
    let mut rows = stmt.query([id.to_string()])?;
    match rows.next()? {
        Some(row) => Ok(Some(judge_from_row(row)?)),
        None => Ok(None),
    }
}

/// All projects visible to assignment.
pub fn find_active_projects(conn: &Connection) -> rusqlite::Result<Vec<Project>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PROJECT_COLUMNS} FROM projects WHERE active = 1"
    ))?;
    let projects = stmt
        .query_map([], project_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(projects)
}

/// Ids of projects currently held as some active judge's assignment.
pub fn find_busy_project_ids(conn: &Connection) -> rusqlite::Result<Vec<Uuid>> {
    let mut stmt =
        conn.prepare("SELECT current FROM judges WHERE current IS NOT NULL AND active = 1")?;
    let ids = stmt
        .query_map([], |row| Ok(parse_uuid(row.get::<_, String>(0)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Atomically record a pick: claim the judge's `current` slot, bump the
/// project's seen count and clear its priority boost.
///
/// Returns false without writing the project if the judge's slot was no
/// longer empty, which means another request raced this one.
pub fn commit_pick(conn: &Connection, project: &Project, judge_id: Uuid) -> rusqlite::Result<bool> {
    let now = Utc::now().to_rfc3339();
    let claimed = conn.execute(
        "UPDATE judges SET current = ?, last_activity = ? WHERE id = ? AND current IS NULL",
        (project.id.to_string(), &now, judge_id.to_string()),
    )?;
    if claimed == 0 {
        return Ok(false);
    }
    conn.execute(
        "UPDATE projects SET seen = seen + 1, prioritized = 0, last_activity = ? WHERE id = ?",
        (&now, project.id.to_string()),
    )?;
    Ok(true)
}

/// Clear the judge's current assignment.
pub fn release_current(conn: &Connection, judge_id: Uuid) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE judges SET current = NULL, last_activity = ? WHERE id = ?",
        (Utc::now().to_rfc3339(), judge_id.to_string()),
    )?;
    Ok(())
}

/// Compensate the pick-time increment when a project is released unscored.
pub fn decrement_seen(conn: &Connection, project_id: Uuid) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE projects SET seen = seen - 1 WHERE id = ?",
        [project_id.to_string()],
    )?;
    Ok(())
}

pub fn insert_flag(conn: &Connection, flag: &Flag) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO flags (id, project_id, judge_id, judge_name, project_name, reason, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        (
            flag.id.to_string(),
            flag.project_id.to_string(),
            flag.judge_id.to_string(),
            &flag.judge_name,
            &flag.project_name,
            &flag.reason,
            flag.created_at.to_rfc3339(),
        ),
    )?;
    Ok(())
}

/// Mark a project judged: append the judgement to the judge's log, bump
/// their completed count and free their assignment slot.
pub fn append_seen_and_clear_current(
    conn: &Connection,
    judge: &Judge,
    judged: &JudgedProject,
) -> anyhow::Result<()> {
    let mut seen_projects = judge.seen_projects.clone();
    seen_projects.push(judged.clone());
    conn.execute(
        "UPDATE judges SET seen_projects = ?, seen = seen + 1, current = NULL, last_activity = ? WHERE id = ?",
        (
            serde_json::to_string(&seen_projects)?,
            Utc::now().to_rfc3339(),
            judge.id.to_string(),
        ),
    )?;
    Ok(())
}

/// True if the error is SQLite reporting a busy or locked database, the
/// signal to re-derive and retry a pick transaction.
pub fn is_busy_error(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<rusqlite::Error>(),
        Some(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::DatabaseBusy
                || e.code == rusqlite::ErrorCode::DatabaseLocked
    )
}

// ============================================================
// Row mapping
// ============================================================

fn project_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: parse_uuid(row.get::<_, String>(0)?),
        name: row.get(1)?,
        location: row.get(2)?,
        description: row.get(3)?,
        url: row.get(4)?,
        try_link: row.get(5)?,
        video_link: row.get(6)?,
        seen: row.get(7)?,
        active: row.get(8)?,
        prioritized: row.get(9)?,
        last_activity: parse_datetime(row.get::<_, String>(10)?),
    })
}

fn judge_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Judge> {
    Ok(Judge {
        id: parse_uuid(row.get::<_, String>(0)?),
        name: row.get(1)?,
        email: row.get(2)?,
        active: row.get(3)?,
        read_welcome: row.get(4)?,
        notes: row.get(5)?,
        current: row.get::<_, Option<String>>(6)?.map(parse_uuid),
        seen: row.get(7)?,
        seen_projects: serde_json::from_str(&row.get::<_, String>(8)?).unwrap_or_default(),
        current_rankings: serde_json::from_str(&row.get::<_, String>(9)?).unwrap_or_default(),
        past_rankings: serde_json::from_str(&row.get::<_, String>(10)?).unwrap_or_default(),
        last_activity: parse_datetime(row.get::<_, String>(11)?),
    })
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_datetime(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
