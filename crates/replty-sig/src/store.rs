//! Load-state tracking for the signature database.
//!
//! The store owns the database slot and its load state. The database is
//! installed exactly once through a `OnceLock`, so a reader sees either no
//! database or the complete one and never waits for a load in progress.
//!
//! ## Load States
//!
//! `NotStarted` -> `InProgress` -> `Ready` | `Failed(detail)`
//!
//! A failed load may be retried with [`SignatureStore::load_with`]; a
//! background [`SignatureStore::preload`] is only ever started from
//! `NotStarted`.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::db::SignatureDb;
use crate::error::SigError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LoadState {
    #[default]
    NotStarted,
    InProgress,
    Failed(String),
    Ready,
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadState::NotStarted => write!(f, "signatures not loaded"),
            LoadState::InProgress => write!(f, "signatures loading"),
            LoadState::Failed(detail) => write!(f, "signature load failed: {detail}"),
            LoadState::Ready => write!(f, "signatures ready"),
        }
    }
}

#[derive(Default)]
pub struct SignatureStore {
    db: OnceLock<Arc<SignatureDb>>,
    state: Mutex<LoadState>,
}

impl SignatureStore {
    pub fn new() -> Self {
        SignatureStore::default()
    }

    /// A store that is ready from the start.
    pub fn with_db(db: SignatureDb) -> Self {
        let store = SignatureStore::new();
        store.install(db);
        store
    }

    pub fn state(&self) -> LoadState {
        self.state.lock().clone()
    }

    /// The database if loading has finished. Never blocks on a load.
    pub fn get(&self) -> Option<&SignatureDb> {
        self.db.get().map(|db| &**db)
    }

    pub fn get_arc(&self) -> Option<Arc<SignatureDb>> {
        self.db.get().cloned()
    }

    fn set_state(&self, state: LoadState) {
        debug!(%state, "signature store state change");
        *self.state.lock() = state;
    }

    fn install(&self, db: SignatureDb) {
        if self.db.set(Arc::new(db)).is_err() {
            debug!("signature database already installed, keeping the first one");
        }
        self.set_state(LoadState::Ready);
    }

    /// Run `loader` on the calling thread and install its result. Returns
    /// immediately if a database is already installed or another load is
    /// still running; `loader` is not called in either case.
    pub fn load_with<F>(&self, loader: F) -> Result<(), SigError>
    where
        F: FnOnce() -> Result<SignatureDb, SigError>,
    {
        if self.get().is_some() {
            return Ok(());
        }
        {
            let mut state = self.state.lock();
            if *state == LoadState::InProgress {
                debug!("signature load already in progress, skipping");
                return Ok(());
            }
            *state = LoadState::InProgress;
        }
        debug!(state = %LoadState::InProgress, "signature store state change");
        self.finish(loader())
    }

    fn finish(&self, result: Result<SignatureDb, SigError>) -> Result<(), SigError> {
        match result {
            Ok(db) => {
                self.install(db);
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "signature load failed");
                self.set_state(LoadState::Failed(err.to_string()));
                Err(err)
            }
        }
    }

    /// Synchronously load signature files or directories.
    pub fn load_paths(&self, paths: &[PathBuf]) -> Result<(), SigError> {
        self.load_with(|| SignatureDb::load(paths))
    }

    /// Start loading `paths` on a background thread. Returns `false` if a
    /// load was already started (or finished) and nothing was spawned.
    pub fn preload(self: &Arc<Self>, paths: Vec<PathBuf>) -> bool {
        {
            let mut state = self.state.lock();
            if *state != LoadState::NotStarted {
                return false;
            }
            *state = LoadState::InProgress;
        }
        debug!(paths = paths.len(), "starting background signature load");
        let store = Arc::clone(self);
        let spawned = std::thread::Builder::new()
            .name("replty-sig-preload".into())
            .spawn(move || {
                let _ = store.finish(SignatureDb::load(&paths));
            });
        if let Err(err) = spawned {
            warn!(error = %err, "cannot spawn signature preload thread");
            self.set_state(LoadState::Failed(err.to_string()));
        }
        true
    }
}

impl fmt::Debug for SignatureStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureStore")
            .field("state", &self.state())
            .finish()
    }
}
