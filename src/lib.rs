//! filehash - a single-file key/value store built on linear hashing
//!
//! Keys are hashed to buckets; each bucket is a primary page plus a chain
//! of overflow pages. The table grows one bucket at a time, so no insert
//! ever rehashes the whole file.
//!
//! # Architecture
//!
//! - **Intrusive lists** (`list`): singly linked list, tail queue and
//!   circular queue over index-addressed nodes
//!
//! - **Storage Layer** (`storage`): Handles disk I/O and page organization
//!   - `DiskManager`: Reads and writes pages of one file
//!   - `BucketPage`: Key/value records packed into a page
//!   - `HeaderPage`: The table header, kept in two alternating copies
//!
//! - **Buffer Pool** (`buffer`): Memory management for file pages
//!   - `BufferPoolManager`: Pins pages, evicts the least recently used one
//!   - `LruReplacer`: LRU order of unpinned frames
//!   - `PageTable`: Page ID to frame lookup over circular hash chains
//!   - `ReadPageGuard`/`WritePageGuard`: RAII guards that hold a pin
//!
//! - **Hashing** (`hash`): directory, bucket chains, cursors and the
//!   configuration/user info metadata
//!
//! - **Handle** (`db`): `HashDb`, the public entry point
//!
//! # Example
//!
//! ```rust,no_run
//! use filehash::{CursorKind, HashDb, HashOptions, OpenFlags};
//!
//! let db = HashDb::open("configs.db", OpenFlags::default(), &HashOptions::default()).unwrap();
//! db.put(b"run-42", b"/data/run-42.cfg").unwrap();
//! assert!(db.get(b"run-42").unwrap().is_some());
//!
//! for record in db.cursor(CursorKind::Keys).unwrap() {
//!     println!("{:?}", record.unwrap().key);
//! }
//! db.close().unwrap();
//! ```

pub mod buffer;
pub mod common;
pub mod db;
pub mod hash;
pub mod list;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{FileHashError, HashOptions, OpenFlags, PageId, Result};
pub use db::{Cursor, HashDb};
pub use hash::{CursorKind, Record, TableStats};
pub use storage::page::ConfigInfo;
