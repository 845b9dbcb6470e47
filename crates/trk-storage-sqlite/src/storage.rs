use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use tracing::info;
use trk_core::{Session, SessionId, SnapshotCreationRequest, SnapshotId, SnapshotRecord, TaskId, TaskRecord};
use trk_storage::{snapshot_from_request, CreateContext, SnapshotController, TaskStore};

const CHECKED_OUT_KEY: &str = "checked_out_snapshot_id";

pub struct SqliteController {
    project_root: PathBuf,
    conn: Mutex<Connection>,
}

impl SqliteController {
    /// Opens (or creates) the database and makes sure a `default_session`
    /// exists and one session is current.
    pub fn open(db_path: &Path, project_root: impl Into<PathBuf>, default_session: &str) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        let conn = Connection::open(db_path).with_context(|| format!("open sqlite db {}", db_path.display()))?;
        conn.execute_batch(include_str!("../migrations/0001_init.sql"))?;

        let ctl = Self { project_root: project_root.into(), conn: Mutex::new(conn) };
        {
            let conn = ctl.lock()?;
            let has_current: i64 =
                conn.query_row("SELECT COUNT(1) FROM sessions WHERE is_current = 1", [], |r| r.get(0))?;
            if has_current == 0 {
                match Self::session_named(&conn, default_session)? {
                    Some(existing) => Self::make_current(&conn, &existing.id)?,
                    None => Self::insert_session(&conn, &Session::new(default_session), true)?,
                }
            }
        }
        Ok(ctl)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("sqlite connection lock poisoned"))
    }

    fn insert_session(conn: &Connection, session: &Session, current: bool) -> Result<()> {
        conn.execute(
            "INSERT INTO sessions(id, name, created_at, is_current) VALUES (?1, ?2, ?3, ?4)",
            params![session.id.0, session.name, session.created_at.to_rfc3339(), current as i64],
        )?;
        Ok(())
    }

    fn make_current(conn: &Connection, id: &SessionId) -> Result<()> {
        let tx = conn.unchecked_transaction()?;
        tx.execute("UPDATE sessions SET is_current = 0", [])?;
        tx.execute("UPDATE sessions SET is_current = 1 WHERE id = ?1", params![id.0])?;
        tx.commit()?;
        Ok(())
    }

    fn session_named(conn: &Connection, name: &str) -> Result<Option<Session>> {
        Self::query_session(conn, "SELECT id, name, created_at FROM sessions WHERE name = ?1", name)
    }

    fn query_session(conn: &Connection, sql: &str, arg: &str) -> Result<Option<Session>> {
        let row: Option<(String, String, String)> = conn
            .query_row(sql, params![arg], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
            .optional()?;
        row.map(|(id, name, created_at)| {
            Ok::<_, anyhow::Error>(Session { id: SessionId::from_str(id), name, created_at: parse_time(&created_at)? })
        })
        .transpose()
    }

    fn state(conn: &Connection, key: &str) -> Result<Option<String>> {
        Ok(conn
            .query_row("SELECT value FROM project_state WHERE key = ?1", params![key], |r| r.get(0))
            .optional()?)
    }
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s).with_context(|| format!("parse timestamp {s}"))?.with_timezone(&Utc))
}

fn encode(mapping: Map<String, Value>) -> Result<String> {
    serde_json::to_string(&Value::Object(mapping)).context("encode record")
}

fn decode(json: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str(json).context("decode record")? {
        Value::Object(map) => Ok(map),
        _ => Err(anyhow!("stored record is not a JSON object")),
    }
}

impl SnapshotController for SqliteController {
    fn current_session(&self) -> Result<Session> {
        let conn = self.lock()?;
        let row: Option<(String, String, String)> = conn
            .query_row("SELECT id, name, created_at FROM sessions WHERE is_current = 1", [], |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?))
            })
            .optional()?;
        let (id, name, created_at) = row.ok_or_else(|| anyhow!("no current session"))?;
        Ok(Session { id: SessionId::from_str(id), name, created_at: parse_time(&created_at)? })
    }

    fn session_by_name(&self, name: &str) -> Result<Option<Session>> {
        let conn = self.lock()?;
        Self::session_named(&conn, name)
    }

    fn start_session(&self, name: &str) -> Result<Session> {
        let conn = self.lock()?;
        let session = match Self::session_named(&conn, name)? {
            Some(existing) => existing,
            None => {
                let session = Session::new(name);
                Self::insert_session(&conn, &session, false)?;
                session
            }
        };
        Self::make_current(&conn, &session.id)?;
        info!(session = %session.id, name, "session started");
        Ok(session)
    }

    fn sessions(&self) -> Result<Vec<Session>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id, name, created_at FROM sessions ORDER BY rowid")?;
        let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?, r.get::<_, String>(2)?)))?;
        let mut out = vec![];
        for row in rows {
            let (id, name, created_at) = row?;
            out.push(Session { id: SessionId::from_str(id), name, created_at: parse_time(&created_at)? });
        }
        Ok(out)
    }

    fn create(&self, request: &SnapshotCreationRequest) -> Result<SnapshotRecord> {
        let task = match request.task_id()? {
            Some(id) => Some(self.get_task(&id)?.ok_or_else(|| anyhow!("task {} not found", id))?),
            None => None,
        };
        let current = self.current_session()?;
        let ctx = CreateContext { project_root: &self.project_root, current_session: &current.id, task: task.as_ref() };
        let snap = snapshot_from_request(request, &ctx)?;

        let session_id = snap.data().session_id.as_ref().unwrap_or(&current.id);
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO snapshots(id, session_id, visible, created_at, record_json) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                snap.id().0,
                session_id.0,
                snap.data().visible as i64,
                snap.created_at().timestamp_micros(),
                encode(snap.to_mapping())?
            ],
        )?;
        info!(snapshot_id = %snap.id(), session = %session_id, "snapshot created");
        Ok(snap)
    }

    fn delete(&self, id: &SnapshotId) -> Result<bool> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM snapshots WHERE id = ?1", params![id.0])? > 0;
        if removed {
            conn.execute(
                "DELETE FROM project_state WHERE key = ?1 AND value = ?2",
                params![CHECKED_OUT_KEY, id.0],
            )?;
            info!(snapshot_id = %id, "snapshot deleted");
        }
        Ok(removed)
    }

    fn list(&self, session_id: &SessionId, include_hidden: bool) -> Result<Vec<SnapshotRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT record_json FROM snapshots
             WHERE session_id = ?1 AND (visible = 1 OR ?2)
             ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map(params![session_id.0, include_hidden], |r| r.get::<_, String>(0))?;
        let mut out = vec![];
        for row in rows {
            out.push(SnapshotRecord::from_mapping(&decode(&row?)?)?);
        }
        Ok(out)
    }

    fn checkout(&self, id: &SnapshotId) -> Result<bool> {
        let conn = self.lock()?;
        let exists: i64 = conn.query_row("SELECT COUNT(1) FROM snapshots WHERE id = ?1", params![id.0], |r| r.get(0))?;
        if exists == 0 {
            return Ok(false);
        }
        conn.execute(
            "INSERT INTO project_state(key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![CHECKED_OUT_KEY, id.0],
        )?;
        info!(snapshot_id = %id, "snapshot checked out");
        Ok(true)
    }

    fn checked_out(&self) -> Result<Option<SnapshotId>> {
        let conn = self.lock()?;
        Ok(Self::state(&conn, CHECKED_OUT_KEY)?.map(SnapshotId::from_str))
    }
}

impl TaskStore for SqliteController {
    fn insert_task(&self, task: &TaskRecord) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO tasks(id, session_id, created_at, record_json) VALUES (?1, ?2, ?3, ?4)",
            params![task.id().0, task.session_id().0, task.created_at().timestamp_micros(), encode(task.to_mapping())?],
        )?;
        Ok(())
    }

    fn get_task(&self, id: &TaskId) -> Result<Option<TaskRecord>> {
        let conn = self.lock()?;
        let json: Option<String> = conn
            .query_row("SELECT record_json FROM tasks WHERE id = ?1", params![id.0], |r| r.get(0))
            .optional()?;
        json.map(|j| Ok::<_, anyhow::Error>(TaskRecord::from_mapping(&decode(&j)?)?)).transpose()
    }

    fn update_task(&self, task: &TaskRecord) -> Result<bool> {
        let conn = self.lock()?;
        let n = conn.execute(
            "UPDATE tasks SET record_json = ?1 WHERE id = ?2",
            params![encode(task.to_mapping())?, task.id().0],
        )?;
        Ok(n > 0)
    }
}
