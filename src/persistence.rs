//! Storage backends for [`StoreState`].
//!
//! The session store only ever sees the [`PersistentStore`] trait: a whole
//! document is loaded once and overwritten on every save. Remote changes, when
//! a backend can observe them, are pushed through [`PersistentStore::subscribe`].

use crate::model::StoreState;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Key the state document is stored under in key-value backends
pub const STATE_KEY: &str = "cubik-sessions";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage io error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed state document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

pub type ChangeListener = Box<dyn Fn(&StoreState) + Send + Sync>;

/// Handle returned by [`PersistentStore::subscribe`]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Detach the listener. Dropping the handle without calling this keeps
    /// the listener attached.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

pub trait PersistentStore: Send + Sync {
    /// `Ok(None)` when nothing has been stored yet
    fn load(&self) -> Result<Option<StoreState>, StoreError>;

    /// Overwrite the stored document
    fn save(&self, state: &StoreState) -> Result<(), StoreError>;

    /// Observe writes made elsewhere. Backends without change notification
    /// return `None`.
    fn subscribe(&self, _listener: ChangeListener) -> Option<Subscription> {
        None
    }
}

/// Read-once source of state written by an older, local-only version
pub trait LegacyStore {
    fn read(&self) -> Option<StoreState>;
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

type Listeners = Arc<Mutex<BTreeMap<u64, ChangeListener>>>;

/// In-process backend with change notification. Every successful save is
/// broadcast to subscribers, which makes it usable as a shared document
/// between several stores.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<Option<StoreState>>,
    listeners: Listeners,
    next_listener: AtomicU64,
    fail_loads: AtomicBool,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: StoreState) -> Self {
        let store = Self::default();
        *lock(&store.state) = Some(state);
        store
    }

    pub fn snapshot(&self) -> Option<StoreState> {
        lock(&self.state).clone()
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    fn notify(&self, state: &StoreState) {
        for listener in lock(&self.listeners).values() {
            listener(state);
        }
    }
}

impl PersistentStore for MemoryStore {
    fn load(&self) -> Result<Option<StoreState>, StoreError> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("load rejected".into()));
        }
        Ok(self.snapshot())
    }

    fn save(&self, state: &StoreState) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("save rejected".into()));
        }
        *lock(&self.state) = Some(state.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.notify(state);
        Ok(())
    }

    fn subscribe(&self, listener: ChangeListener) -> Option<Subscription> {
        let id = self.next_listener.fetch_add(1, Ordering::SeqCst);
        lock(&self.listeners).insert(id, listener);
        let listeners = Arc::clone(&self.listeners);
        Some(Subscription::new(move || {
            lock(&listeners).remove(&id);
        }))
    }
}

impl LegacyStore for MemoryStore {
    fn read(&self) -> Option<StoreState> {
        self.snapshot()
    }
}

/// Whole-state JSON document on disk
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PersistentStore for JsonFileStore {
    fn load(&self) -> Result<Option<StoreState>, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(StoreState::from_json(&bytes)?))
    }

    fn save(&self, state: &StoreState) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl LegacyStore for JsonFileStore {
    fn read(&self) -> Option<StoreState> {
        match self.load() {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "ignoring unreadable legacy data");
                None
            }
        }
    }
}

/// State document kept in a SQLite key-value table
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl PersistentStore for SqliteStore {
    fn load(&self) -> Result<Option<StoreState>, StoreError> {
        let conn = lock(&self.conn);
        let value: Option<String> = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [STATE_KEY], |row| {
                row.get(0)
            })
            .optional()?;

        match value {
            Some(json) => Ok(Some(StoreState::from_json(json.as_bytes())?)),
            None => Ok(None),
        }
    }

    fn save(&self, state: &StoreState) -> Result<(), StoreError> {
        let json = serde_json::to_string(state)?;
        let conn = lock(&self.conn);
        conn.execute(
            r#"
            INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, CURRENT_TIMESTAMP)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
            "#,
            params![STATE_KEY, json],
        )?;
        Ok(())
    }
}
