use std::cell::RefCell;
use std::path::Path;

use chrono::Utc;
use log::{debug, info, warn};

use crate::blob_store::{BlobStore, LmdbBlobStore, MemoryBlobStore};
use crate::config::BackendConfig;
use crate::error::StoreError;
use crate::local_db_model::{Database, Record, Table};
use crate::query::Query;
use crate::seed;

/// The emulated backend: one persisted blob plus the in-memory state that is
/// authoritative for the rest of the process.
///
/// Constructed once and shared by reference with every [`Query`]. Access is
/// single-threaded; each operation is a whole-collection read-modify-write
/// that completes before it returns.
pub struct LocalDb {
    store: Box<dyn BlobStore>,
    state: RefCell<Database>,
}

impl LocalDb {
    /// Opens the LMDB-backed store described by `config`.
    pub fn init(config: &BackendConfig) -> Result<Self, StoreError> {
        Self::init_at(&config.storage_path, config.storage_key.clone())
    }

    pub fn init_at(path: impl AsRef<Path>, key: impl Into<String>) -> Result<Self, StoreError> {
        let store = LmdbBlobStore::open(path, key)?;
        Ok(Self::open(store))
    }

    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::open(MemoryBlobStore::new())
    }

    /// Loads the blob held by `store`, or seeds and persists a fresh one.
    pub fn open(store: impl BlobStore + 'static) -> Self {
        let store: Box<dyn BlobStore> = Box::new(store);
        let loaded = Self::load(store.as_ref());
        let fresh = loaded.is_none();
        let db = Self {
            store,
            state: RefCell::new(loaded.unwrap_or_else(|| seed::fresh_database(Utc::now()))),
        };

        let mut state = db.state.borrow_mut();
        if seed::deduplicate(&mut state) || fresh {
            db.save(&state);
        }
        drop(state);

        info!("Local backend ready (fresh: {fresh})");
        db
    }

    /// Selects a collection to query or write.
    pub fn from<R: Record>(&self) -> Query<'_, R> {
        Query::new(self)
    }

    /// The local backend always emulates.
    pub const fn is_mock(&self) -> bool {
        true
    }

    /// Clears the persisted blob and starts over from a freshly seeded state.
    pub fn reset(&self) {
        if let Err(e) = self.store.clear() {
            warn!("Failed to clear persisted store: {e}");
        }
        let mut state = self.state.borrow_mut();
        *state = Self::load(self.store.as_ref()).unwrap_or_else(|| seed::fresh_database(Utc::now()));
        self.save(&state);
        info!("Local backend reset");
    }

    /// A copy of the whole in-memory state.
    pub fn snapshot(&self) -> Database {
        self.state.borrow().clone()
    }

    fn load(store: &dyn BlobStore) -> Option<Database> {
        let raw = match store.read() {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to read persisted store: {e}");
                return None;
            }
        };

        match Database::decode(&raw) {
            Ok(mut db) => {
                if db.migrate() {
                    info!("Backfilled fields on records from an older store");
                }
                Some(db)
            }
            Err(e) => {
                warn!("Persisted store is unreadable, reseeding: {e}");
                None
            }
        }
    }

    // Best effort: the in-memory state stays authoritative when this fails.
    fn save(&self, db: &Database) {
        let blob = match serde_json::to_string(db) {
            Ok(blob) => blob,
            Err(e) => {
                warn!("Failed to serialize store: {e}");
                return;
            }
        };
        if let Err(e) = self.store.write(&blob) {
            warn!("Failed to persist store: {e}");
        }
    }

    /// Every row of `R`'s table after seeding, catalog coverage and
    /// deduplication have run.
    pub(crate) fn read_table<R: Record>(&self) -> Vec<R> {
        let mut state = self.state.borrow_mut();
        if seed::prepare(&mut state, R::TABLE, Utc::now()) {
            self.save(&state);
        }
        debug!("Read {} rows from {}", state.len(R::TABLE), R::TABLE);
        R::rows(&state).clone()
    }

    /// Replaces `R`'s table wholesale and persists.
    pub(crate) fn write_table<R: Record>(&self, rows: Vec<R>) {
        let mut state = self.state.borrow_mut();
        *R::rows_mut(&mut state) = rows;
        if R::TABLE == Table::Tours {
            seed::deduplicate(&mut state);
        }
        self.save(&state);
    }

    pub(crate) fn contains_id(&self, table: Table, id: &str) -> bool {
        self.state.borrow().contains_id(table, id)
    }
}
