use crate::common::{BucketId, FileHashError, PageId, Result, NUM_SPLIT_LEVELS};
use crate::storage::page::HashHeader;

use super::hash_func::log2_ceil;

/// Linear-hash directory: maps hash values to buckets and buckets to pages.
///
/// Buckets `0..=max_bucket` exist. A hash is masked with `high_mask`; if
/// that names a bucket not yet created it is masked again with `low_mask`.
/// Splitting always creates bucket `max_bucket + 1` from the bucket it
/// replaces under the narrower mask, so the split pointer walks
/// `0, 1, .., low_mask` before the masks double.
///
/// Buckets are grouped in split levels: level 0 holds bucket 0 and level
/// `l > 0` holds buckets `2^(l-1) ..= 2^l - 1`. The pages of one level are
/// contiguous and start at `spares[l]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashDirectory {
    max_bucket: u32,
    high_mask: u32,
    low_mask: u32,
    ovfl_point: u32,
    spares: [u32; NUM_SPLIT_LEVELS],
}

/// Result of growing the directory by one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expansion {
    /// Bucket whose records are redistributed
    pub old_bucket: BucketId,
    /// Bucket created by the split
    pub new_bucket: BucketId,
    /// Split level the new bucket starts, with its page count, when the
    /// caller has to reserve pages for it
    pub new_level: Option<(u32, u32)>,
}

impl HashDirectory {
    /// Lays out `nbuckets` (rounded up to a power of two) buckets whose
    /// pages start at `first_page`.
    pub fn new(nbuckets: u32, first_page: u32) -> Self {
        let l2 = log2_ceil(nbuckets.max(1));
        let n = 1u32 << l2;

        let mut spares = [0u32; NUM_SPLIT_LEVELS];
        spares[0] = first_page;
        if l2 >= 1 {
            spares[1] = first_page + 1;
        }
        for i in 2..=l2 as usize {
            spares[i] = spares[i - 1] + (1 << (i - 2));
        }

        Self {
            max_bucket: n - 1,
            high_mask: n - 1,
            low_mask: (n >> 1).saturating_sub(1),
            ovfl_point: l2,
            spares,
        }
    }

    pub fn from_header(hdr: &HashHeader) -> Self {
        Self {
            max_bucket: hdr.max_bucket,
            high_mask: hdr.high_mask,
            low_mask: hdr.low_mask,
            ovfl_point: hdr.ovfl_point,
            spares: hdr.spares,
        }
    }

    pub fn store(&self, hdr: &mut HashHeader) {
        hdr.max_bucket = self.max_bucket;
        hdr.high_mask = self.high_mask;
        hdr.low_mask = self.low_mask;
        hdr.ovfl_point = self.ovfl_point;
        hdr.spares = self.spares;
    }

    /// Checks that a directory read from disk is self-consistent.
    pub fn validate(&self, npages: u32) -> Result<()> {
        let n = self.max_bucket as u64 + 1;
        let ok = self.high_mask >= self.max_bucket
            && (self.high_mask as u64 + 1).is_power_of_two()
            && (self.low_mask as u64) < n
            && (self.ovfl_point as usize) < NUM_SPLIT_LEVELS
            && self.ovfl_point == log2_ceil(self.max_bucket + 1);
        if !ok {
            return Err(FileHashError::corrupt(format!(
                "inconsistent directory: max_bucket {} masks {:#x}/{:#x} level {}",
                self.max_bucket, self.high_mask, self.low_mask, self.ovfl_point
            )));
        }
        let last = self.bucket_page(BucketId::new(self.max_bucket));
        if last.as_u32() >= npages {
            return Err(FileHashError::corrupt(format!(
                "bucket {} maps to {} beyond the {} allocated pages",
                self.max_bucket, last, npages
            )));
        }
        Ok(())
    }

    pub fn num_buckets(&self) -> u32 {
        self.max_bucket + 1
    }

    pub fn max_bucket(&self) -> BucketId {
        BucketId::new(self.max_bucket)
    }

    /// Bucket that the next expansion splits.
    pub fn split_pointer(&self) -> BucketId {
        BucketId::new((self.max_bucket + 1) & self.low_mask)
    }

    /// Highest split level with reserved pages
    pub fn level(&self) -> u32 {
        self.ovfl_point
    }

    pub fn bucket_for_hash(&self, hash: u32) -> BucketId {
        let b = hash & self.high_mask;
        if b > self.max_bucket {
            BucketId::new(hash & self.low_mask)
        } else {
            BucketId::new(b)
        }
    }

    /// Primary page of a bucket.
    pub fn bucket_page(&self, bucket: BucketId) -> PageId {
        let b = bucket.as_u32();
        if b == 0 {
            return PageId::new(self.spares[0]);
        }
        let level = log2_ceil(b + 1) as usize;
        PageId::new(self.spares[level] + b - (1 << (level - 1)))
    }

    /// Adds bucket `max_bucket + 1`. When it opens a new split level the
    /// caller must reserve the level's pages and record them with
    /// `set_level_start` before touching the new bucket.
    pub fn expand(&mut self) -> Result<Expansion> {
        let new_bucket = self.max_bucket.checked_add(1).ok_or_else(|| {
            FileHashError::Invariant("bucket numbers exhausted".to_string())
        })?;
        let level = log2_ceil(new_bucket + 1);
        if level as usize >= NUM_SPLIT_LEVELS {
            return Err(FileHashError::Invariant(format!(
                "split level {} exceeds the directory",
                level
            )));
        }

        let old_bucket = new_bucket & self.low_mask;
        self.max_bucket = new_bucket;
        if new_bucket > self.high_mask {
            self.low_mask = self.high_mask;
            self.high_mask = new_bucket | self.low_mask;
        }

        let new_level = if level > self.ovfl_point {
            self.ovfl_point = level;
            Some((level, 1u32 << (level - 1)))
        } else {
            None
        };

        Ok(Expansion {
            old_bucket: BucketId::new(old_bucket),
            new_bucket: BucketId::new(new_bucket),
            new_level,
        })
    }

    pub fn set_level_start(&mut self, level: u32, first_page: PageId) {
        self.spares[level as usize] = first_page.as_u32();
    }
}
