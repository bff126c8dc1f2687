//! The session store: every mutation of [`StoreState`] goes through here.
//!
//! Commands apply to the in-memory state synchronously and then hand a
//! snapshot to a background writer. The writer is a single thread that
//! always writes the newest queued snapshot, so writes land in the order they
//! were issued and a burst of commands costs one write.

use crate::cube_mode::CubeMode;
use crate::model::{most_recent_session_id, Session, StoreState, TimeEntry, MIGRATION_VERSION};
use crate::persistence::{LegacyStore, PersistentStore, Subscription};
use crate::settings::{TimerSettings, TimerSettingsPatch};
use crate::timer::SolveRecorder;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

/// Wall clock in epoch milliseconds
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        Self(AtomicI64::new(now_ms))
    }

    pub fn set(&self, now_ms: i64) {
        self.0.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: i64) {
        self.0.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

enum Job {
    Save(Box<StoreState>),
    Flush(Sender<()>),
}

/// Background writer fed over a channel
struct Persister {
    tx: Option<Sender<Job>>,
    pending: Arc<AtomicUsize>,
    handle: Option<JoinHandle<()>>,
}

impl Persister {
    fn spawn(backend: Arc<dyn PersistentStore>) -> Self {
        let (tx, rx) = mpsc::channel::<Job>();
        let pending = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pending);

        let handle = std::thread::spawn(move || {
            while let Ok(first) = rx.recv() {
                let mut latest = None;
                let mut saves = 0;
                let mut acks = Vec::new();

                for job in std::iter::once(first).chain(rx.try_iter()) {
                    match job {
                        Job::Save(state) => {
                            latest = Some(state);
                            saves += 1;
                        }
                        Job::Flush(ack) => acks.push(ack),
                    }
                }

                if let Some(state) = latest {
                    if saves > 1 {
                        debug!(coalesced = saves, "writing newest of queued snapshots");
                    }
                    if let Err(e) = backend.save(&state) {
                        warn!(error = %e, "failed to persist sessions");
                    }
                }
                counter.fetch_sub(saves, Ordering::SeqCst);
                for ack in acks {
                    let _ = ack.send(());
                }
            }
        });

        Self {
            tx: Some(tx),
            pending,
            handle: Some(handle),
        }
    }

    fn submit(&self, state: StoreState) {
        let Some(tx) = &self.tx else { return };
        self.pending.fetch_add(1, Ordering::SeqCst);
        if tx.send(Job::Save(Box::new(state))).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            warn!("persistence worker is gone, dropping snapshot");
        }
    }

    fn flush(&self) {
        let Some(tx) = &self.tx else { return };
        let (ack_tx, ack_rx) = mpsc::channel();
        if tx.send(Job::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    fn is_idle(&self) -> bool {
        self.pending.load(Ordering::SeqCst) == 0
    }
}

impl Drop for Persister {
    fn drop(&mut self) {
        // closing the channel ends the worker once the queue is drained
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Owner of the session aggregate
pub struct SessionStore {
    state: StoreState,
    clock: Arc<dyn Clock>,
    persister: Persister,
    /// Newest state seen through the subscription, replaced on every change
    remote: Arc<Mutex<Option<StoreState>>>,
    subscription: Option<Subscription>,
    freshly_created: bool,
}

impl SessionStore {
    pub fn open(backend: Arc<dyn PersistentStore>) -> Self {
        Self::open_with_clock(backend, Arc::new(SystemClock))
    }

    /// Load the stored state, falling back to an empty one, and make sure a
    /// current session exists
    pub fn open_with_clock(backend: Arc<dyn PersistentStore>, clock: Arc<dyn Clock>) -> Self {
        let (state, freshly_created) = match backend.load() {
            Ok(Some(state)) => (state.normalized(), false),
            Ok(None) => (StoreState::default(), true),
            Err(e) => {
                warn!(error = %e, "could not load sessions, starting empty");
                (StoreState::default(), false)
            }
        };

        let remote = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&remote);
        let subscription = backend.subscribe(Box::new(move |s: &StoreState| {
            *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(s.clone());
        }));

        let mut store = Self {
            state,
            clock,
            persister: Persister::spawn(backend),
            remote,
            subscription,
            freshly_created,
        };

        if store.state.sessions.is_empty() {
            store.push_session(1);
            store.persist();
        }
        store
    }

    pub fn state(&self) -> &StoreState {
        &self.state
    }

    pub fn sessions(&self) -> &[Session] {
        &self.state.sessions
    }

    pub fn session(&self, id: i64) -> Option<&Session> {
        self.state.session(id)
    }

    pub fn current_session(&self) -> Option<&Session> {
        self.state.current()
    }

    pub fn current_session_id(&self) -> Option<i64> {
        self.state.current_session_id
    }

    pub fn sessions_for_mode(&self, mode: CubeMode) -> Vec<&Session> {
        self.state
            .sessions
            .iter()
            .filter(|s| s.cube_mode == mode)
            .collect()
    }

    pub fn preferred_cube_mode(&self) -> CubeMode {
        self.state.preferred_cube_mode
    }

    pub fn timer_settings(&self) -> TimerSettings {
        self.state.timer_settings
    }

    /// Start a new empty session in the selected category and make it
    /// current. The name uses `number`, or the session count plus one.
    pub fn create_session(&mut self, number: Option<u32>) -> i64 {
        let n = number.map_or(self.state.sessions.len() + 1, |n| n as usize);
        let id = self.push_session(n);
        self.persist();
        id
    }

    pub fn rename_session(&mut self, id: i64, name: impl Into<String>) -> bool {
        let Some(session) = self.state.session_mut(id) else {
            return false;
        };
        session.name = name.into();
        debug!(id, name = %session.name, "renamed session");
        self.persist();
        true
    }

    pub fn set_current_session(&mut self, id: i64) -> bool {
        if self.state.position(id).is_none() {
            return false;
        }
        self.state.current_session_id = Some(id);
        self.persist();
        true
    }

    pub fn delete_session(&mut self, id: i64) -> bool {
        if !self.remove_session(id) {
            return false;
        }
        self.persist();
        true
    }

    /// Remove one solve. Removing the last solve of a session removes the
    /// session.
    pub fn delete_time(&mut self, session_id: i64, index: usize) -> bool {
        let len = match self.state.session(session_id) {
            Some(s) => s.times.len(),
            None => return false,
        };
        if index >= len {
            return false;
        }

        if len == 1 {
            self.remove_session(session_id);
        } else if let Some(session) = self.state.session_mut(session_id) {
            session.times.remove(index);
        }
        self.persist();
        true
    }

    /// Move one solve to the end of another session's list
    pub fn move_time(&mut self, from: i64, index: usize, to: i64) -> bool {
        if from == to || self.state.position(to).is_none() {
            return false;
        }
        let Some(source) = self.state.session_mut(from) else {
            return false;
        };
        if index >= source.times.len() {
            return false;
        }

        let entry = source.times.remove(index);
        let emptied = source.times.is_empty();
        if let Some(dest) = self.state.session_mut(to) {
            dest.times.push(entry);
        }
        if emptied {
            self.remove_session(from);
        }
        self.persist();
        true
    }

    /// Record a solve and return the id of the session it landed in.
    ///
    /// A new session is started when the selected category has been idle for
    /// the configured number of hours (unless the current session is already
    /// an empty one of that category) or when the current session belongs to
    /// another category.
    pub fn add_time(&mut self, time_ms: u64, scramble: Option<String>) -> i64 {
        let now = self.clock.now_ms();
        let mode = self.state.preferred_cube_mode;
        let threshold = self.state.timer_settings.inactivity_threshold_ms();

        let current = self.state.current();
        let idle = self
            .state
            .last_solve_ms(mode)
            .is_some_and(|last| now - last >= threshold);
        let current_is_blank = current.is_some_and(|s| s.is_empty() && s.cube_mode == mode);
        let mismatched = current.map_or(true, |s| s.cube_mode != mode);
        let roll_over = idle && !current_is_blank;

        let target = match self.state.current_session_id {
            Some(id) if !roll_over && !mismatched => id,
            _ => {
                if roll_over {
                    info!(%mode, "inactive for {} hours, starting a new session", threshold / 3_600_000);
                } else {
                    info!(%mode, "category changed, starting a new session");
                }
                self.push_session(self.state.sessions.len() + 1)
            }
        };

        if let Some(session) = self.state.session_mut(target) {
            session.times.push(TimeEntry::new(time_ms, now, scramble));
        }
        debug!(session = target, time_ms, "recorded solve");
        self.persist();
        target
    }

    /// Start a fresh session ahead of the next solve once the selected
    /// category has gone idle, pruning empty sessions first
    pub fn roll_over_if_idle(&mut self) -> bool {
        let now = self.clock.now_ms();
        let mode = self.state.preferred_cube_mode;
        let Some(last) = self.state.last_solve_ms(mode) else {
            return false;
        };
        if now - last < self.state.timer_settings.inactivity_threshold_ms() {
            return false;
        }
        if self
            .state
            .current()
            .is_some_and(|s| s.is_empty() && s.cube_mode == mode)
        {
            return false;
        }

        let before = self.state.sessions.len();
        self.state.sessions.retain(|s| !s.is_empty());
        let pruned = before - self.state.sessions.len();
        let id = self.push_session(self.state.sessions.len() + 1);
        info!(id, pruned, "rolled over to a new session after inactivity");
        self.persist();
        true
    }

    pub fn update_timer_settings(&mut self, patch: &TimerSettingsPatch) {
        self.state.timer_settings = self.state.timer_settings.merged(patch);
        debug!(settings = ?self.state.timer_settings, "updated timer settings");
        self.persist();
    }

    /// Select the category for upcoming solves. The current session is left
    /// alone; the next solve starts a new session if it does not match.
    pub fn update_preferred_cube_mode(&mut self, mode: CubeMode) {
        self.state.preferred_cube_mode = mode;
        debug!(%mode, "selected cube mode");
        self.persist();
    }

    /// One-time import of state written by an older local-only version.
    ///
    /// Only runs when the backing store had nothing stored when this store
    /// was opened and migration has not been recorded yet. The imported state
    /// replaces the current one. Returns whether anything was imported.
    pub fn migrate_legacy_data(&mut self, legacy: &dyn LegacyStore) -> bool {
        if !self.freshly_created || self.state.migration_version >= MIGRATION_VERSION {
            return false;
        }
        let Some(imported) = legacy.read() else {
            debug!("no legacy data to migrate");
            return false;
        };

        let mut state = imported.normalized();
        state.migration_version = MIGRATION_VERSION;
        info!(sessions = state.sessions.len(), "migrated legacy sessions");
        self.state = state;
        if self.state.sessions.is_empty() {
            self.push_session(1);
        }
        self.freshly_created = false;
        self.persist();
        true
    }

    /// Adopt the newest state written elsewhere. Last write wins; nothing is
    /// applied while local writes are still in flight.
    pub fn poll_remote(&mut self) -> bool {
        let latest = self
            .remote
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(latest) = latest else {
            return false;
        };
        if !self.persister.is_idle() {
            debug!("ignoring remote change while local writes are pending");
            return false;
        }
        let latest = latest.normalized();
        if latest == self.state {
            return false;
        }
        info!(sessions = latest.sessions.len(), "applied remote change");
        self.state = latest;
        if self.state.sessions.is_empty() {
            self.push_session(1);
            self.persist();
        }
        true
    }

    /// Block until every snapshot issued so far has been written
    pub fn flush(&self) {
        self.persister.flush();
    }

    /// Stop listening for remote changes
    pub fn unsubscribe(&mut self) {
        if let Some(sub) = self.subscription.take() {
            sub.unsubscribe();
        }
    }

    fn persist(&self) {
        self.persister.submit(self.state.clone());
    }

    fn push_session(&mut self, number: usize) -> i64 {
        let now = self.clock.now_ms();
        let mut id = now;
        while self.state.position(id).is_some() {
            id += 1;
        }

        let mode = self.state.preferred_cube_mode;
        self.state
            .sessions
            .push(Session::new(id, format!("Session {number}"), now, mode));
        self.state.current_session_id = Some(id);
        info!(id, number, %mode, "created session");
        id
    }

    fn remove_session(&mut self, id: i64) -> bool {
        let Some(pos) = self.state.position(id) else {
            return false;
        };
        self.state.sessions.remove(pos);
        debug!(id, "deleted session");

        if self.state.current_session_id == Some(id) {
            self.state.current_session_id = most_recent_session_id(&self.state.sessions);
            if self.state.current_session_id.is_none() {
                self.push_session(1);
            }
        }
        true
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl SolveRecorder for SessionStore {
    fn record_solve(&mut self, elapsed_ms: u64, scramble: &str) {
        let scramble = (!scramble.is_empty()).then(|| scramble.to_string());
        self.add_time(elapsed_ms, scramble);
    }
}
