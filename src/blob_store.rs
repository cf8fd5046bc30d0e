//! Durable storage for the serialized [`Database`](crate::local_db_model::Database) blob.
//!
//! The emulator keeps all five collections in one opaque string under a single
//! key. A [`BlobStore`] only knows how to read, overwrite and clear that string;
//! parsing, migration and seeding happen in [`LocalDb`](crate::local_db_state::LocalDb).
//!
//! Two backends are provided:
//!
//! - [`LmdbBlobStore`]: an LMDB environment at `{path}.lmdb`, one named
//!   database, one key. Every write is a single committed transaction, so a
//!   reader never observes a half-written blob.
//! - [`MemoryBlobStore`]: a process-local cell. Clones share the same cell,
//!   which lets a caller keep a handle to inspect what was persisted.

use std::cell::RefCell;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use lmdb::{Database as LmdbDatabase, DatabaseFlags, Environment, Transaction, WriteFlags};
use log::info;

use crate::error::StoreError;

/// 10 MiB is far beyond any realistic catalog plus bookings.
const MAP_SIZE: usize = 10 * 1024 * 1024;
const DB_NAME: &str = "wanderlust";

/// A single-key blob backend.
pub trait BlobStore {
    /// Returns the stored blob, or `None` if nothing was ever written.
    fn read(&self) -> Result<Option<String>, StoreError>;

    /// Overwrites the blob.
    fn write(&self, blob: &str) -> Result<(), StoreError>;

    /// Removes the blob. Clearing an empty store is not an error.
    fn clear(&self) -> Result<(), StoreError>;
}

pub struct LmdbBlobStore {
    env: Environment,
    db: LmdbDatabase,
    key: String,
    dir: PathBuf,
}

impl LmdbBlobStore {
    /// Opens (creating if needed) the environment at `{path}.lmdb`.
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be created or LMDB refuses to open it.
    pub fn open(path: impl AsRef<Path>, key: impl Into<String>) -> Result<Self, StoreError> {
        let mut dir = OsString::from(path.as_ref().as_os_str());
        dir.push(".lmdb");
        let dir = PathBuf::from(dir);

        std::fs::create_dir_all(&dir)?;

        let env = Environment::new()
            .set_max_dbs(1)
            .set_map_size(MAP_SIZE)
            .open(&dir)?;
        let db = env.create_db(Some(DB_NAME), DatabaseFlags::empty())?;

        info!("Opened LMDB blob store at {}", dir.display());

        Ok(Self {
            env,
            db,
            key: key.into(),
            dir,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl BlobStore for LmdbBlobStore {
    fn read(&self) -> Result<Option<String>, StoreError> {
        let txn = self.env.begin_ro_txn()?;
        let blob = match txn.get(self.db, &self.key) {
            Ok(bytes) => Some(
                String::from_utf8(bytes.to_vec())
                    .map_err(|e| StoreError::Validation(format!("blob is not UTF-8: {e}")))?,
            ),
            Err(lmdb::Error::NotFound) => None,
            Err(e) => return Err(e.into()),
        };
        txn.abort();
        Ok(blob)
    }

    fn write(&self, blob: &str) -> Result<(), StoreError> {
        let mut txn = self.env.begin_rw_txn()?;
        txn.put(self.db, &self.key, &blob, WriteFlags::empty())?;
        txn.commit()?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut txn = self.env.begin_rw_txn()?;
        match txn.del(self.db, &self.key, None) {
            Ok(()) | Err(lmdb::Error::NotFound) => {}
            Err(e) => return Err(e.into()),
        }
        txn.commit()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    cell: Rc<RefCell<Option<String>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing blob, e.g. one written by an older release.
    pub fn with_blob(blob: impl Into<String>) -> Self {
        Self {
            cell: Rc::new(RefCell::new(Some(blob.into()))),
        }
    }

    /// The blob as last written.
    pub fn snapshot(&self) -> Option<String> {
        self.cell.borrow().clone()
    }
}

impl BlobStore for MemoryBlobStore {
    fn read(&self) -> Result<Option<String>, StoreError> {
        Ok(self.snapshot())
    }

    fn write(&self, blob: &str) -> Result<(), StoreError> {
        *self.cell.borrow_mut() = Some(blob.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.cell.borrow_mut() = None;
        Ok(())
    }
}
