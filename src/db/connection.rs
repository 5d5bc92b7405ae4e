use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc, Arc, Mutex,
    },
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use log::{error, info, warn};
use rusqlite::Connection;
use tokio::sync::oneshot;

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct DatabaseInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
    checked_out: AtomicUsize,
}

impl DatabaseInner {
    /// Stops the worker thread. Returns false if it was already stopped.
    fn shutdown_worker(&self) -> bool {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let Some(handle) = guard.take() else {
            return false;
        };

        if let Err(err) = self.sender.send(DbCommand::Shutdown) {
            error!("Failed to send shutdown to DB thread: {err}");
        }
        if let Err(join_err) = handle.join() {
            error!("Failed to join DB thread: {join_err:?}");
        }
        true
    }
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        self.shutdown_worker();
    }
}

/// Handle to the SQLite store. All statements run on one dedicated worker
/// thread; clones share that thread.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("camrecord-db".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(anyhow::Error::new(err)
                            .context("failed to open SQLite database")));
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }

                if ready_tx.send(Ok(())).is_err() {
                    error!("DB initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => {
                            task(&mut conn);
                        }
                        DbCommand::Shutdown => break,
                    }
                }

                info!("Database thread shutting down");
            })
            .with_context(|| "failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;

        info!("Database opened at {}", db_path.as_path().display());

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
                checked_out: AtomicUsize::new(0),
            }),
        })
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("DB caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to DB thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread terminated unexpectedly"))?
    }

    /// Checks out a connection lease for a long-lived user such as the
    /// recorder. The lease must be handed back with `DbConnection::release`.
    pub fn connection(&self) -> DbConnection {
        let outstanding = self.inner.checked_out.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Database connection checked out ({outstanding} outstanding)");
        DbConnection { db: self.clone() }
    }

    pub fn checked_out(&self) -> usize {
        self.inner.checked_out.load(Ordering::SeqCst)
    }

    /// Releases the pool: stops the worker thread and waits for it. Further
    /// `execute` calls fail. Calling it twice is harmless.
    pub fn close(&self) {
        let outstanding = self.checked_out();
        if outstanding > 0 {
            warn!("Closing database with {outstanding} connection(s) still checked out");
        }
        if self.inner.shutdown_worker() {
            info!("Database connection pool closed");
        }
    }
}

/// A checked-out connection. Statements still run on the shared worker; the
/// lease tracks ownership so that release happens exactly once.
pub struct DbConnection {
    db: Database,
}

impl DbConnection {
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Flushes the connection's page cache and returns the lease. The lease
    /// is returned even when the flush fails.
    pub async fn release(self) -> Result<()> {
        let flushed = self
            .db
            .execute(|conn| {
                conn.cache_flush()
                    .context("failed to flush connection cache")
            })
            .await;
        let remaining = self.db.inner.checked_out.fetch_sub(1, Ordering::SeqCst) - 1;
        info!("Database connection released ({remaining} outstanding)");
        flushed
    }
}
