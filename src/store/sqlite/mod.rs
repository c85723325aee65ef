use std::{
    path::PathBuf,
    sync::{mpsc, Arc},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use log::{error, info};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use tokio::sync::oneshot;

mod migrations;

use migrations::run_migrations;

use super::{split_path, tree, DocumentStore, StoreError};

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

/// Thread that owns the connection. Dropping the job sender ends its loop.
struct Worker {
    jobs: Option<mpsc::Sender<Job>>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.jobs.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("SQLite worker panicked before closing the store");
            }
        }
    }
}

/// Local document tree kept in SQLite, one row per leaf. Used when the
/// controller runs without a reachable Firebase project.
#[derive(Clone)]
pub struct SqliteStore {
    worker: Arc<Worker>,
}

impl SqliteStore {
    /// Opens (creating if needed) and migrates the file before handing the
    /// connection to its worker thread.
    pub fn open(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }

        let mut conn = Connection::open(&db_path)
            .with_context(|| format!("cannot open SQLite store {}", db_path.display()))?;
        if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
            error!("SQLite store stays in rollback-journal mode: {err}");
        }
        run_migrations(&mut conn)
            .with_context(|| format!("cannot migrate {}", db_path.display()))?;

        let (jobs, queue) = mpsc::channel::<Job>();
        let thread = thread::Builder::new()
            .name("kinetrack-db".into())
            .spawn(move || {
                for job in queue {
                    job(&mut conn);
                }
            })
            .context("cannot spawn the SQLite worker")?;

        info!("SQLite document store opened at {}", db_path.display());
        Ok(Self {
            worker: Arc::new(Worker {
                jobs: Some(jobs),
                thread: Some(thread),
            }),
        })
    }

    async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let jobs = self
            .worker
            .jobs
            .as_ref()
            .ok_or_else(|| anyhow!("SQLite store is closed"))?;
        let (reply_tx, reply_rx) = oneshot::channel();

        jobs.send(Box::new(move |conn: &mut Connection| {
            // The caller may have timed out; the write still happened.
            let _ = reply_tx.send(task(conn));
        }))
        .map_err(|_| anyhow!("SQLite worker is gone"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("SQLite worker dropped the request"))?
    }
}

fn backend_error(err: anyhow::Error) -> StoreError {
    StoreError::Backend(format!("{err:#}"))
}

/// Proper ancestors of `path`, shortest first.
fn ancestors(segments: &[&str]) -> Vec<String> {
    (1..segments.len()).map(|n| segments[..n].join("/")).collect()
}

fn replace_subtree(conn: &mut Connection, path: &str, value: &Value) -> Result<()> {
    let segments: Vec<&str> = path.split('/').collect();
    let mut leaves = Vec::new();
    tree::flatten(path, value, &mut leaves);

    let now = Utc::now().to_rfc3339();
    let tx = conn.transaction()?;

    tx.execute(
        "DELETE FROM documents
         WHERE path = ?1 OR substr(path, 1, length(?1) + 1) = ?1 || '/'",
        params![path],
    )
    .context("failed to clear subtree")?;

    // A scalar stored at an ancestor would shadow the new children.
    if !leaves.is_empty() {
        for ancestor in ancestors(&segments) {
            tx.execute("DELETE FROM documents WHERE path = ?1", params![ancestor])
                .context("failed to clear ancestor leaf")?;
        }
    }

    {
        let mut insert = tx.prepare(
            "INSERT INTO documents (path, value, updated_at) VALUES (?1, ?2, ?3)",
        )?;
        for (leaf_path, leaf) in &leaves {
            insert
                .execute(params![leaf_path, serde_json::to_string(leaf)?, now])
                .with_context(|| format!("failed to insert leaf {leaf_path}"))?;
        }
    }

    tx.commit().context("failed to commit document write")?;
    Ok(())
}

fn read_subtree(conn: &mut Connection, path: &str) -> Result<Option<Value>> {
    let exact: Option<String> = conn
        .query_row(
            "SELECT value FROM documents WHERE path = ?1",
            params![path],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(raw) = exact {
        return Ok(Some(serde_json::from_str(&raw)?));
    }

    let mut stmt = conn.prepare(
        "SELECT path, value FROM documents
         WHERE substr(path, 1, length(?1) + 1) = ?1 || '/'",
    )?;
    let mut rows = stmt.query(params![path])?;

    let prefix_len = path.len() + 1;
    let mut root = Value::Object(Map::new());
    let mut found = false;
    while let Some(row) = rows.next()? {
        let leaf_path: String = row.get(0)?;
        let raw: String = row.get(1)?;
        let relative: Vec<&str> = leaf_path[prefix_len..].split('/').collect();
        tree::set_at(&mut root, &relative, serde_json::from_str(&raw)?);
        found = true;
    }

    Ok(found.then_some(root))
}

#[async_trait]
impl DocumentStore for SqliteStore {
    fn name(&self) -> &'static str {
        "SQLite"
    }

    async fn put(&self, path: &str, value: Value) -> Result<(), StoreError> {
        split_path(path)?;
        let path = path.to_string();
        self.execute(move |conn| replace_subtree(conn, &path, &value))
            .await
            .map_err(backend_error)
    }

    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        split_path(path)?;
        let path = path.to_string();
        self.execute(move |conn| read_subtree(conn, &path))
            .await
            .map_err(backend_error)
    }
}
