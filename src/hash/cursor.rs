use bytes::Bytes;

use crate::common::{BucketId, PageId, Result, SlotId};
use crate::storage::page::{BucketPageRef, PageProlog, PageType};

use super::bucket::checked_page;
use super::table::HashTable;

/// What a cursor step hands back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorKind {
    /// Keys only; values are not copied out of the page
    Keys,
    KeysAndValues,
}

/// One enumerated record. `value` is `None` for a `Keys` cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: Bytes,
    pub value: Option<Bytes>,
}

/// Position of an enumeration: a bucket, a page of its chain and a slot.
///
/// The position names a page but pins nothing between steps. Buckets are
/// walked in order up to the bucket count at the time of each step, so a
/// split or delete during an enumeration may make it skip or repeat
/// records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CursorPosition {
    bucket: u32,
    page: Option<PageId>,
    slot: u16,
}

impl CursorPosition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Back to the first record of bucket 0.
    pub fn rewind(&mut self) {
        *self = Self::default();
    }

    pub fn bucket(&self) -> BucketId {
        BucketId::new(self.bucket)
    }

    fn next_bucket(&mut self) {
        self.bucket += 1;
        self.page = None;
        self.slot = 0;
    }
}

impl HashTable {
    /// Returns the record at `pos` and advances it, or `None` once every
    /// bucket has been visited.
    pub fn cursor_next(&self, pos: &mut CursorPosition, kind: CursorKind) -> Result<Option<Record>> {
        loop {
            if pos.bucket >= self.dir.num_buckets() {
                return Ok(None);
            }
            let pid = match pos.page {
                Some(pid) => pid,
                None => {
                    let pid = self.dir.bucket_page(BucketId::new(pos.bucket));
                    pos.page = Some(pid);
                    pos.slot = 0;
                    pid
                }
            };

            let guard = self.pool.read_page(pid)?;
            // An overflow page freed since the last step ends the bucket.
            if BucketPageRef::new(guard.data()).page_type() == Some(PageType::Free) {
                pos.next_bucket();
                continue;
            }
            let page = checked_page(pid, guard.data())?;

            if pos.slot < page.num_entries() {
                let slot = SlotId::new(pos.slot);
                pos.slot += 1;
                if let Some((key, value)) = page.record(slot) {
                    return Ok(Some(Record {
                        key: Bytes::copy_from_slice(key),
                        value: match kind {
                            CursorKind::Keys => None,
                            CursorKind::KeysAndValues => Some(Bytes::copy_from_slice(value)),
                        },
                    }));
                }
                continue;
            }

            match page.next_page() {
                Some(next) => {
                    pos.page = Some(next);
                    pos.slot = 0;
                }
                None => pos.next_bucket(),
            }
        }
    }
}
