//
// Copyright (c) The Nacre Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Named datastores.
//!
//! Each datastore is bound to a persisted representation (one file per
//! datastore under the data directory), an optional cached snapshot, and a
//! lock record. The cache policy is write-through: `put` and `copy` rewrite
//! the persisted form atomically and re-publish the snapshot, so concurrent
//! readers always observe a consistent tree.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::tree::ConfigTree;
use crate::xml;

/// Name of a datastore slot.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum DatastoreName {
    Candidate,
    Running,
    Startup,
    Failsafe,
    Tmp,
    Session(u32),
}

/// Advisory lock held by a session.
#[derive(Clone, Debug)]
pub struct LockRecord {
    pub session_id: u32,
    pub acquired_at: DateTime<Utc>,
}

// Datastore errors.
#[derive(Debug)]
pub enum Error {
    Io(DatastoreName, std::io::Error),
    Parse(DatastoreName, xml::ParseError),
    Write(DatastoreName, xml::WriteError),
    Exists(DatastoreName),
    NotFound(DatastoreName),
    LockDenied { name: DatastoreName, holder: u32 },
    NotLocked(DatastoreName),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Persistence backend for datastore contents.
pub trait Store: Send {
    fn exists(&self, name: &DatastoreName) -> bool;
    fn load(&self, name: &DatastoreName) -> Result<ConfigTree>;
    fn store(&self, name: &DatastoreName, tree: &ConfigTree) -> Result<()>;
    fn delete(&self, name: &DatastoreName) -> Result<()>;
}

/// The built-in `xml` storage backend: one XML file per datastore,
/// rewritten atomically (write-temp + rename).
#[derive(Debug)]
pub struct XmlFileStore {
    dir: PathBuf,
    pretty: bool,
}

#[derive(Default)]
struct Entry {
    cache: Option<Arc<ConfigTree>>,
    generation: u64,
    lock: Option<LockRecord>,
}

/// The registry of named datastores.
pub struct DatastoreRegistry {
    store: Box<dyn Store>,
    entries: BTreeMap<DatastoreName, Entry>,
}

// ===== impl DatastoreName =====

impl std::fmt::Display for DatastoreName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatastoreName::Candidate => write!(f, "candidate"),
            DatastoreName::Running => write!(f, "running"),
            DatastoreName::Startup => write!(f, "startup"),
            DatastoreName::Failsafe => write!(f, "failsafe"),
            DatastoreName::Tmp => write!(f, "tmp"),
            DatastoreName::Session(id) => write!(f, "session-{id}"),
        }
    }
}

impl std::str::FromStr for DatastoreName {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<DatastoreName, ()> {
        match s {
            "candidate" => Ok(DatastoreName::Candidate),
            "running" => Ok(DatastoreName::Running),
            "startup" => Ok(DatastoreName::Startup),
            "failsafe" => Ok(DatastoreName::Failsafe),
            "tmp" => Ok(DatastoreName::Tmp),
            _ => Err(()),
        }
    }
}

// ===== impl XmlFileStore =====

impl XmlFileStore {
    pub fn new(dir: PathBuf, pretty: bool) -> XmlFileStore {
        XmlFileStore { dir, pretty }
    }

    fn path(&self, name: &DatastoreName) -> PathBuf {
        self.dir.join(format!("{name}.xml"))
    }
}

impl Store for XmlFileStore {
    fn exists(&self, name: &DatastoreName) -> bool {
        self.path(name).exists()
    }

    fn load(&self, name: &DatastoreName) -> Result<ConfigTree> {
        let data = std::fs::read(self.path(name))
            .map_err(|error| Error::Io(name.clone(), error))?;
        xml::parse_datastore(&data)
            .map_err(|error| Error::Parse(name.clone(), error))
    }

    fn store(&self, name: &DatastoreName, tree: &ConfigTree) -> Result<()> {
        let data = xml::serialize_datastore(tree, self.pretty)
            .map_err(|error| Error::Write(name.clone(), error))?;
        nacre_utils::file::atomic_write(&self.path(name), &data)
            .map_err(|error| Error::Io(name.clone(), error))
    }

    fn delete(&self, name: &DatastoreName) -> Result<()> {
        match std::fs::remove_file(self.path(name)) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                Ok(())
            }
            Err(error) => Err(Error::Io(name.clone(), error)),
        }
    }
}

// ===== impl DatastoreRegistry =====

impl DatastoreRegistry {
    pub fn new(store: Box<dyn Store>) -> DatastoreRegistry {
        DatastoreRegistry {
            store,
            entries: BTreeMap::new(),
        }
    }

    pub fn exists(&self, name: &DatastoreName) -> bool {
        self.store.exists(name)
    }

    /// Creates an empty datastore. Fails if it already exists.
    pub fn create(&mut self, name: &DatastoreName) -> Result<()> {
        if self.exists(name) {
            return Err(Error::Exists(name.clone()));
        }
        self.publish(name, ConfigTree::new())
    }

    /// Creates an empty datastore unless one is already persisted.
    pub fn create_if_missing(&mut self, name: &DatastoreName) -> Result<()> {
        if self.exists(name) {
            return Ok(());
        }
        self.publish(name, ConfigTree::new())
    }

    /// Returns a shared read snapshot. Cheap when the cache is warm; the
    /// snapshot is immutable after publication.
    pub fn get(&mut self, name: &DatastoreName) -> Result<Arc<ConfigTree>> {
        if let Some(cache) = &self.entries.entry(name.clone()).or_default().cache
        {
            return Ok(cache.clone());
        }
        if !self.store.exists(name) {
            return Err(Error::NotFound(name.clone()));
        }
        let tree = Arc::new(self.store.load(name)?);
        let entry = self.entries.entry(name.clone()).or_default();
        entry.cache = Some(tree.clone());
        Ok(tree)
    }

    /// Installs `tree` as the new datastore content.
    pub fn put(&mut self, name: &DatastoreName, tree: ConfigTree) -> Result<()> {
        self.publish(name, tree)
    }

    /// Atomically replaces `dst` with a snapshot of `src`. On failure the
    /// destination (persisted form and cache) is unchanged.
    pub fn copy(
        &mut self,
        src: &DatastoreName,
        dst: &DatastoreName,
    ) -> Result<()> {
        debug!(%src, %dst, "copying datastore");
        let snapshot = self.get(src)?;
        self.store.store(dst, &snapshot)?;
        let entry = self.entries.entry(dst.clone()).or_default();
        entry.cache = Some(snapshot);
        entry.generation += 1;
        Ok(())
    }

    pub fn delete(&mut self, name: &DatastoreName) -> Result<()> {
        debug!(%name, "deleting datastore");
        self.store.delete(name)?;
        self.entries.remove(name);
        Ok(())
    }

    /// Acquires the advisory lock. At most one holder per datastore; the
    /// failure carries the current holder's session id.
    pub fn lock(&mut self, name: &DatastoreName, session_id: u32) -> Result<()> {
        let entry = self.entries.entry(name.clone()).or_default();
        match &entry.lock {
            Some(lock) => Err(Error::LockDenied {
                name: name.clone(),
                holder: lock.session_id,
            }),
            None => {
                debug!(%name, %session_id, "locking datastore");
                entry.lock = Some(LockRecord {
                    session_id,
                    acquired_at: Utc::now(),
                });
                Ok(())
            }
        }
    }

    pub fn unlock(
        &mut self,
        name: &DatastoreName,
        session_id: u32,
    ) -> Result<()> {
        let entry = self.entries.entry(name.clone()).or_default();
        match &entry.lock {
            Some(lock) if lock.session_id == session_id => {
                debug!(%name, %session_id, "unlocking datastore");
                entry.lock = None;
                Ok(())
            }
            Some(lock) => Err(Error::LockDenied {
                name: name.clone(),
                holder: lock.session_id,
            }),
            None => Err(Error::NotLocked(name.clone())),
        }
    }

    pub fn lock_holder(&self, name: &DatastoreName) -> Option<u32> {
        self.entries
            .get(name)
            .and_then(|entry| entry.lock.as_ref())
            .map(|lock| lock.session_id)
    }

    /// Releases every lock held by a closing session and returns the names
    /// of the datastores that were unlocked.
    pub fn release_session_locks(
        &mut self,
        session_id: u32,
    ) -> Vec<DatastoreName> {
        let mut released = Vec::new();
        for (name, entry) in self.entries.iter_mut() {
            if let Some(lock) = &entry.lock
                && lock.session_id == session_id
            {
                entry.lock = None;
                released.push(name.clone());
            }
        }
        for name in &released {
            debug!(%name, %session_id, "released lock of closed session");
        }
        released
    }

    pub fn generation(&self, name: &DatastoreName) -> u64 {
        self.entries
            .get(name)
            .map(|entry| entry.generation)
            .unwrap_or_default()
    }

    fn publish(&mut self, name: &DatastoreName, tree: ConfigTree) -> Result<()> {
        self.store.store(name, &tree)?;
        let entry = self.entries.entry(name.clone()).or_default();
        entry.cache = Some(Arc::new(tree));
        entry.generation += 1;
        Ok(())
    }
}

// ===== impl Error =====

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(name, error) => {
                write!(f, "I/O error on datastore '{name}': {error}")
            }
            Error::Parse(name, error) => {
                write!(f, "failed to parse datastore '{name}': {error}")
            }
            Error::Write(name, error) => {
                write!(f, "failed to write datastore '{name}': {error}")
            }
            Error::Exists(name) => {
                write!(f, "datastore '{name}' already exists")
            }
            Error::NotFound(name) => {
                write!(f, "datastore '{name}' does not exist")
            }
            Error::LockDenied { name, holder } => {
                write!(
                    f,
                    "datastore '{name}' is locked by session {holder}"
                )
            }
            Error::NotLocked(name) => {
                write!(f, "datastore '{name}' is not locked")
            }
        }
    }
}

impl std::error::Error for Error {}
