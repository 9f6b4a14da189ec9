//! Database handle.
//!
//! `HashDb` wraps a `HashTable` in a mutex and a small state machine:
//!
//! ```text
//! Open --(fatal error or panic())--> Panicked --(close)--> Closed
//!   \------------------------(close)------------------------/
//! ```
//!
//! A panicked handle has dropped every cached page, including unwritten
//! ones, and answers everything but `close` with `PanicState`.

use std::path::Path;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{error, warn};

use crate::common::{FileHashError, HashOptions, OpenFlags, Result};
use crate::hash::{CursorKind, CursorPosition, HashTable, Record, TableStats};
use crate::storage::page::ConfigInfo;

enum HandleState {
    Open(HashTable),
    Panicked,
    Closed,
}

/// An open hash table file.
pub struct HashDb {
    state: Mutex<HandleState>,
}

impl HashDb {
    /// Opens `path`, creating the table if the file is empty.
    pub fn open<P: AsRef<Path>>(path: P, flags: OpenFlags, opts: &HashOptions) -> Result<Self> {
        let table = HashTable::open(path, &flags, opts)?;
        Ok(Self {
            state: Mutex::new(HandleState::Open(table)),
        })
    }

    /// Runs `f` against the open table. A fatal error panics the handle.
    fn with_table<T>(&self, f: impl FnOnce(&mut HashTable) -> Result<T>) -> Result<T> {
        let mut state = self.state.lock();
        let HandleState::Open(table) = &mut *state else {
            return Err(FileHashError::PanicState);
        };
        let result = f(table);
        if let Err(e) = &result {
            if e.is_fatal() {
                error!(error = %e, "unrecoverable error, handle is now unusable");
                table.discard();
                *state = HandleState::Panicked;
            }
        }
        result
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        self.with_table(|t| t.get(key))
    }

    /// Stores `value` under `key`, overwriting any previous value.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.with_table(|t| t.put(key, value))
    }

    /// Stores `value` under `key` unless the key exists.
    pub fn put_new(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.with_table(|t| t.put_new(key, value))
    }

    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.with_table(|t| t.delete(key))
    }

    /// Starts an enumeration of every record.
    pub fn cursor(&self, kind: CursorKind) -> Result<Cursor<'_>> {
        self.with_table(|_| Ok(()))?;
        Ok(Cursor {
            db: self,
            kind,
            pos: CursorPosition::new(),
            done: false,
        })
    }

    /// Flushes all changes and the header.
    pub fn sync(&self) -> Result<()> {
        self.with_table(|t| t.sync())
    }

    /// Drops every pin and unwritten page and makes the handle unusable.
    pub fn panic(&self) {
        let mut state = self.state.lock();
        if let HandleState::Open(table) = &*state {
            table.discard();
            error!("handle panicked on request");
            *state = HandleState::Panicked;
        }
    }

    pub fn is_panicked(&self) -> bool {
        matches!(*self.state.lock(), HandleState::Panicked)
    }

    /// Flushes and closes the file. A panicked handle closes without
    /// writing anything.
    pub fn close(mut self) -> Result<()> {
        match std::mem::replace(self.state.get_mut(), HandleState::Closed) {
            HandleState::Open(table) => table.close(),
            HandleState::Panicked | HandleState::Closed => Ok(()),
        }
    }

    pub fn set_num_configs(&self, n: u32) -> Result<()> {
        self.with_table(|t| t.set_num_configs(n))
    }

    pub fn set_all_configs<S: AsRef<str>>(&self, names: &[S]) -> Result<()> {
        self.with_table(|t| t.set_all_configs(names))
    }

    pub fn get_num_configs(&self) -> Result<u32> {
        self.with_table(|t| Ok(t.get_num_configs()))
    }

    pub fn get_config(&self, index: u32) -> Result<ConfigInfo> {
        self.with_table(|t| t.get_config(index))
    }

    pub fn set_config(&self, info: &ConfigInfo) -> Result<()> {
        self.with_table(|t| t.set_config(info))
    }

    pub fn get_all_configs(&self) -> Result<Vec<ConfigInfo>> {
        self.with_table(|t| t.get_all_configs())
    }

    pub fn set_user_info(&self, data: &[u8]) -> Result<()> {
        self.with_table(|t| t.set_user_info(data))
    }

    /// Copies the user info blob into `buf` and returns its full length.
    pub fn get_user_info(&self, buf: &mut [u8]) -> Result<usize> {
        self.with_table(|t| t.get_user_info(buf))
    }

    pub fn user_info(&self) -> Result<Vec<u8>> {
        self.with_table(|t| t.user_info())
    }

    pub fn max_user_info_len(&self) -> Result<usize> {
        self.with_table(|t| Ok(t.max_user_info_len()))
    }

    pub fn num_keys(&self) -> Result<u64> {
        self.with_table(|t| Ok(t.num_keys()))
    }

    pub fn num_buckets(&self) -> Result<u32> {
        self.with_table(|t| Ok(t.num_buckets()))
    }

    pub fn max_record_size(&self) -> Result<usize> {
        self.with_table(|t| Ok(t.max_record_size()))
    }

    pub fn stats(&self) -> Result<TableStats> {
        self.with_table(|t| t.stats())
    }
}

impl Drop for HashDb {
    fn drop(&mut self) {
        if let HandleState::Open(table) = std::mem::replace(self.state.get_mut(), HandleState::Closed)
        {
            if let Err(e) = table.close() {
                warn!(error = %e, "failed to close hash table on drop");
            }
        }
    }
}

/// Enumeration over a `HashDb`. Each step locks the handle and holds a
/// page pin only while it reads one record.
pub struct Cursor<'a> {
    db: &'a HashDb,
    kind: CursorKind,
    pos: CursorPosition,
    done: bool,
}

impl Cursor<'_> {
    /// Next record, or `None` at the end of the table.
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        if self.done {
            return Ok(None);
        }
        let (pos, kind) = (&mut self.pos, self.kind);
        let record = self.db.with_table(|t| t.cursor_next(pos, kind))?;
        self.done = record.is_none();
        Ok(record)
    }

    /// Restarts from the first record and returns it.
    pub fn first(&mut self) -> Result<Option<Record>> {
        self.pos.rewind();
        self.done = false;
        self.next_record()
    }

    pub fn kind(&self) -> CursorKind {
        self.kind
    }
}

impl Iterator for Cursor<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn open_db(temp: &NamedTempFile) -> HashDb {
        let opts = HashOptions::builder().bucket_size(512).build();
        HashDb::open(temp.path(), OpenFlags::default(), &opts).unwrap()
    }

    #[test]
    fn test_panic_state_blocks_operations() {
        let temp = NamedTempFile::new().unwrap();
        let db = open_db(&temp);
        db.put(b"a", b"1").unwrap();
        db.panic();
        assert!(db.is_panicked());
        assert!(matches!(db.get(b"a"), Err(FileHashError::PanicState)));
        assert!(matches!(db.put(b"b", b"2"), Err(FileHashError::PanicState)));
        assert!(db.cursor(CursorKind::Keys).is_err());
        db.close().unwrap();
    }

    #[test]
    fn test_drop_closes_handle() {
        let temp = NamedTempFile::new().unwrap();
        {
            let db = open_db(&temp);
            db.put(b"kept", b"yes").unwrap();
        }
        let db = open_db(&temp);
        assert_eq!(db.get(b"kept").unwrap(), Some(Bytes::from_static(b"yes")));
    }

    #[test]
    fn test_cursor_first_rewinds() {
        let temp = NamedTempFile::new().unwrap();
        let db = open_db(&temp);
        db.put(b"only", b"one").unwrap();

        let mut cursor = db.cursor(CursorKind::KeysAndValues).unwrap();
        let first = cursor.next_record().unwrap().unwrap();
        assert_eq!(first.key, Bytes::from_static(b"only"));
        assert!(cursor.next_record().unwrap().is_none());
        assert_eq!(cursor.first().unwrap(), Some(first));
    }
}
