//! The ordered key-value store façade (C4): named sub-databases over one
//! LMDB environment, ACID transactions, forward cursors, duplicate values
//! per key, and transparent map growth.
//!
//! The environment is a process-wide singleton keyed by path:
//! two callers opening the same `path` get the same handle, so every store
//! built on top shares one map-size budget and one writer slot.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lmdb::{Cursor, Database, DatabaseFlags, Environment, RwTransaction, Transaction, WriteFlags};
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::error::{LedgerError, LedgerResult};

const DEFAULT_MAP_SIZE: usize = 64 * 1024 * 1024; // 64 MiB, doubled on MAP_FULL
const MAX_DBS: u32 = 16;

static ENVIRONMENTS: Lazy<Mutex<HashMap<PathBuf, Arc<KvEnv>>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// A process-wide-singleton LMDB environment plus the write-transaction
/// discipline map growth needs: at most one writer may be in flight when the
/// map is resized.
pub struct KvEnv {
    env: Environment,
    /// Serializes put/delete helpers so a MAP_FULL retry's resize never
    /// races a concurrent writer.
    write_lock: Mutex<()>,
}

impl KvEnv {
    /// Opens (or returns the existing handle for) the environment rooted at
    /// `path`. Creates the directory if missing.
    pub fn open(path: impl AsRef<Path>) -> LedgerResult<Arc<Self>> {
        let canonical = path.as_ref().to_path_buf();
        let mut registry = ENVIRONMENTS.lock();
        if let Some(existing) = registry.get(&canonical) {
            return Ok(existing.clone());
        }

        std::fs::create_dir_all(&canonical).map_err(|e| LedgerError::Db(e.to_string()))?;
        let env = Environment::new()
            .set_max_dbs(MAX_DBS)
            .set_map_size(DEFAULT_MAP_SIZE)
            .open(&canonical)
            .map_err(|e| LedgerError::Db(e.to_string()))?;

        let handle = Arc::new(KvEnv {
            env,
            write_lock: Mutex::new(()),
        });
        registry.insert(canonical, handle.clone());
        Ok(handle)
    }

    fn grow_map(&self) -> LedgerResult<()> {
        // `Info::map_size` is already the environment's map size in bytes
        // (`me_mapsize`), not a page count — double it directly.
        let current = self
            .env
            .info()
            .map_err(|e| LedgerError::Db(e.to_string()))?
            .map_size();
        let next = current.max(DEFAULT_MAP_SIZE) * 2;
        self.env
            .set_map_size(next)
            .map_err(|e| LedgerError::Db(e.to_string()))
    }
}

/// One named sub-database within a `KvEnv`.
#[derive(Clone)]
pub struct Store {
    env: Arc<KvEnv>,
    db: Database,
    dup_sort: bool,
}

impl Store {
    pub fn open(env: &Arc<KvEnv>, name: &str, dup_sort: bool) -> LedgerResult<Self> {
        let flags = if dup_sort {
            DatabaseFlags::DUP_SORT
        } else {
            DatabaseFlags::empty()
        };
        let db = env
            .env
            .create_db(Some(name), flags)
            .map_err(|e| LedgerError::Db(e.to_string()))?;
        Ok(Self {
            env: env.clone(),
            db,
            dup_sort,
        })
    }

    pub fn get(&self, key: &[u8]) -> LedgerResult<Option<Vec<u8>>> {
        let txn = self
            .env
            .env
            .begin_ro_txn()
            .map_err(|e| LedgerError::Db(e.to_string()))?;
        match txn.get(self.db, &key) {
            Ok(bytes) => Ok(Some(bytes.to_vec())),
            Err(lmdb::Error::NotFound) => Ok(None),
            Err(e) => Err(LedgerError::Db(e.to_string())),
        }
    }

    pub fn exists(&self, key: &[u8]) -> LedgerResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Puts `(key, value)`, transparently expanding the map and retrying on
    /// `MAP_FULL`.
    pub fn put(&self, key: &[u8], value: &[u8]) -> LedgerResult<()> {
        self.with_retry(|txn| txn.put(self.db, &key, &value, WriteFlags::empty()))
    }

    /// Like `put`, but allows duplicate values under the same key (dup-sort
    /// stores only; used by the stake ledger's edge store).
    pub fn put_dup(&self, key: &[u8], value: &[u8]) -> LedgerResult<()> {
        self.with_retry(|txn| txn.put(self.db, &key, &value, WriteFlags::empty()))
    }

    pub fn delete(&self, key: &[u8]) -> LedgerResult<()> {
        self.with_retry(|txn| txn.del(self.db, &key, None))
    }

    /// Deletes a single `(key, value)` dup-sort pair; requires an exact
    /// match on the serialized value.
    pub fn delete_dup(&self, key: &[u8], value: &[u8]) -> LedgerResult<()> {
        self.with_retry(|txn| txn.del(self.db, &key, Some(value)))
    }

    fn with_retry(&self, op: impl Fn(&mut RwTransaction<'_>) -> Result<(), lmdb::Error>) -> LedgerResult<()> {
        let _guard = self.env.write_lock.lock();
        loop {
            let mut txn = self
                .env
                .env
                .begin_rw_txn()
                .map_err(|e| LedgerError::Db(e.to_string()))?;
            match op(&mut txn) {
                Ok(()) => {
                    return txn.commit().map_err(|e| LedgerError::Db(e.to_string()));
                }
                Err(lmdb::Error::MapFull) => {
                    drop(txn);
                    tracing::warn!("LMDB map full, growing and retrying write");
                    self.env.grow_map()?;
                    continue;
                }
                Err(e) => return Err(LedgerError::Db(e.to_string())),
            }
        }
    }

    /// All keys in ascending order, deduplicated for dup-sort stores.
    pub fn list_keys(&self) -> LedgerResult<Vec<Vec<u8>>> {
        let txn = self
            .env
            .env
            .begin_ro_txn()
            .map_err(|e| LedgerError::Db(e.to_string()))?;
        let mut cursor = txn
            .open_ro_cursor(self.db)
            .map_err(|e| LedgerError::Db(e.to_string()))?;
        let mut keys = Vec::new();
        let mut last: Option<Vec<u8>> = None;
        for item in cursor.iter_start() {
            let (k, _v) = item.map_err(|e| LedgerError::Db(e.to_string()))?;
            if self.dup_sort && last.as_deref() == Some(k) {
                continue;
            }
            last = Some(k.to_vec());
            keys.push(k.to_vec());
        }
        Ok(keys)
    }

    /// All values stored at `key` (dup-sort stores only).
    pub fn get_all(&self, key: &[u8]) -> LedgerResult<Vec<Vec<u8>>> {
        let txn = self
            .env
            .env
            .begin_ro_txn()
            .map_err(|e| LedgerError::Db(e.to_string()))?;
        let mut cursor = txn
            .open_ro_cursor(self.db)
            .map_err(|e| LedgerError::Db(e.to_string()))?;
        let mut values = Vec::new();
        for item in cursor.iter_dup_of(key) {
            let (_k, v) = item.map_err(|e| LedgerError::Db(e.to_string()))?;
            values.push(v.to_vec());
        }
        Ok(values)
    }

    /// Every `(key, value)` pair, in ascending key order.
    pub fn iter_all(&self) -> LedgerResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let txn = self
            .env
            .env
            .begin_ro_txn()
            .map_err(|e| LedgerError::Db(e.to_string()))?;
        let mut cursor = txn
            .open_ro_cursor(self.db)
            .map_err(|e| LedgerError::Db(e.to_string()))?;
        let mut out = Vec::new();
        for item in cursor.iter_start() {
            let (k, v) = item.map_err(|e| LedgerError::Db(e.to_string()))?;
            out.push((k.to_vec(), v.to_vec()));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_env() -> Arc<KvEnv> {
        let dir = std::env::temp_dir().join(format!("carapace-kv-test-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        KvEnv::open(&dir).unwrap()
    }

    #[test]
    fn put_get_delete_round_trip() {
        let env = scratch_env();
        let store = Store::open(&env, "t1", false).unwrap();
        store.put(b"k", b"v").unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"v".to_vec()));
        store.delete(b"k").unwrap();
        assert_eq!(store.get(b"k").unwrap(), None);
    }

    #[test]
    fn reopening_same_path_returns_same_handle() {
        let dir = std::env::temp_dir().join("carapace-kv-test-singleton");
        let _ = std::fs::remove_dir_all(&dir);
        let a = KvEnv::open(&dir).unwrap();
        let b = KvEnv::open(&dir).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn dup_sort_store_holds_multiple_values_per_key() {
        let env = scratch_env();
        let store = Store::open(&env, "dups", true).unwrap();
        store.put_dup(b"k", b"a").unwrap();
        store.put_dup(b"k", b"b").unwrap();
        let mut all = store.get_all(b"k").unwrap();
        all.sort();
        assert_eq!(all, vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn list_keys_is_ascending() {
        let env = scratch_env();
        let store = Store::open(&env, "listed", false).unwrap();
        for i in 0..50u32 {
            store.put(&i.to_be_bytes(), b"x").unwrap();
        }
        let keys = store.list_keys().unwrap();
        assert_eq!(keys.len(), 50);
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn s6_writes_past_the_initial_map_size_grow_transparently() {
        let env = scratch_env();
        let store = Store::open(&env, "grown", false).unwrap();
        // One-MiB values; writing past DEFAULT_MAP_SIZE forces at least one
        // MAP_FULL retry through `KvEnv::grow_map` before this loop returns.
        let value = vec![0xabu8; 1024 * 1024];
        let n: u32 = 80;
        for i in 0..n {
            store.put(&i.to_be_bytes(), &value).unwrap();
        }
        assert!(env.env.info().unwrap().map_size() > DEFAULT_MAP_SIZE);

        let keys = store.list_keys().unwrap();
        assert_eq!(keys.len(), n as usize);
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
        for i in 0..n {
            assert_eq!(store.get(&i.to_be_bytes()).unwrap(), Some(value.clone()));
        }
    }
}
