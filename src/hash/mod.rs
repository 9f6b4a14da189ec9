//! Linear hashing over buffer-pool pages.

mod bucket;
mod cursor;
mod directory;
mod hash_func;
mod metadata;
mod table;

pub use cursor::{CursorKind, CursorPosition, Record};
pub use directory::{Expansion, HashDirectory};
pub use hash_func::{fnv_hash, log2_ceil, phong_vo_hash, sdbm_hash, torek_hash, CHARKEY};
pub use table::{HashTable, Rearranged, TableStats};
