//! Constants and open-time configuration.

use super::error::{FileHashError, Result};
use super::types::PageId;

/// Default page (bucket) size in bytes
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Smallest page size accepted at creation
pub const MIN_PAGE_SIZE: usize = 512;

/// Largest page size accepted at creation
pub const MAX_PAGE_SIZE: usize = 262_144;

/// Invalid page ID constant, used as the end-of-chain marker on disk
pub const INVALID_PAGE_ID: PageId = PageId(u32::MAX);

/// Page 0 always holds the table header
pub const HEADER_PAGE_ID: PageId = PageId(0);

/// Default cache size in bytes (128 MiB)
pub const DEFAULT_CACHE_SIZE: usize = 128 * 1024 * 1024;

/// Minimum number of frames a database handle runs with
pub const MIN_POOL_FRAMES: usize = 6;

/// Default reserved user information length
pub const DEFAULT_USER_INFO_LEN: usize = 4000;

/// Default fill factor (average keys per bucket before a split)
pub const DEFAULT_FILL_FACTOR: u32 = 65_536;

/// Maximum bytes of a configuration file name, including padding
pub const MAX_CONFIG_NAME_LEN: usize = 128;

/// Number of split levels tracked in the header
pub const NUM_SPLIT_LEVELS: usize = 32;

/// Key hash function signature
pub type HashFn = fn(&[u8]) -> u32;

/// Open-time parameters of a hash table file.
///
/// Only `cache_size` and `rearrange_pages` apply when opening an existing
/// file; the remaining fields are fixed when the file is created.
#[derive(Debug, Clone)]
pub struct HashOptions {
    /// Page size in bytes (power of two)
    pub bucket_size: usize,
    /// Initial number of buckets
    pub nbuckets: u32,
    /// Bytes of page cache
    pub cache_size: usize,
    /// Compact overflow chains on close
    pub rearrange_pages: bool,
    /// Bytes reserved for the user info blob
    pub user_info_len: usize,
    /// Initial number of configuration slots
    pub num_configs: u32,
    /// Average keys per bucket that triggers a split
    pub fill_factor: u32,
    /// Key hash function
    pub hash_fn: HashFn,
}

impl Default for HashOptions {
    fn default() -> Self {
        Self {
            bucket_size: DEFAULT_PAGE_SIZE,
            nbuckets: 1,
            cache_size: DEFAULT_CACHE_SIZE,
            rearrange_pages: false,
            user_info_len: DEFAULT_USER_INFO_LEN,
            num_configs: 1,
            fill_factor: DEFAULT_FILL_FACTOR,
            hash_fn: crate::hash::fnv_hash,
        }
    }
}

impl HashOptions {
    /// Create a new options builder
    pub fn builder() -> HashOptionsBuilder {
        HashOptionsBuilder::default()
    }

    /// Number of frames the buffer pool gets for the given page size.
    pub fn pool_frames(&self, page_size: usize) -> usize {
        (self.cache_size / page_size.max(1)).max(MIN_POOL_FRAMES)
    }

    /// Checks the creation parameters.
    pub fn validate(&self) -> Result<()> {
        if !self.bucket_size.is_power_of_two()
            || self.bucket_size < MIN_PAGE_SIZE
            || self.bucket_size > MAX_PAGE_SIZE
        {
            return Err(FileHashError::Open(format!(
                "bucket size {} must be a power of two in [{}, {}]",
                self.bucket_size, MIN_PAGE_SIZE, MAX_PAGE_SIZE
            )));
        }
        if self.nbuckets == 0 || self.nbuckets > 1 << 30 {
            return Err(FileHashError::Open(format!(
                "initial bucket count {} out of range",
                self.nbuckets
            )));
        }
        if self.fill_factor == 0 {
            return Err(FileHashError::Open("fill factor must be positive".into()));
        }
        Ok(())
    }
}

/// Builder for HashOptions
#[derive(Default)]
pub struct HashOptionsBuilder {
    options: HashOptions,
}

impl HashOptionsBuilder {
    /// Set the page size in bytes
    pub fn bucket_size(mut self, size: usize) -> Self {
        self.options.bucket_size = size;
        self
    }

    /// Set the initial bucket count
    pub fn nbuckets(mut self, n: u32) -> Self {
        self.options.nbuckets = n;
        self
    }

    /// Set the cache size in bytes
    pub fn cache_size(mut self, bytes: usize) -> Self {
        self.options.cache_size = bytes;
        self
    }

    /// Compact overflow chains when the handle closes
    pub fn rearrange_pages(mut self, yes: bool) -> Self {
        self.options.rearrange_pages = yes;
        self
    }

    /// Set the reserved user info length
    pub fn user_info_len(mut self, len: usize) -> Self {
        self.options.user_info_len = len;
        self
    }

    /// Set the initial number of configuration slots
    pub fn num_configs(mut self, n: u32) -> Self {
        self.options.num_configs = n;
        self
    }

    /// Set the fill factor
    pub fn fill_factor(mut self, ffactor: u32) -> Self {
        self.options.fill_factor = ffactor;
        self
    }

    /// Set the key hash function
    pub fn hash_fn(mut self, f: HashFn) -> Self {
        self.options.hash_fn = f;
        self
    }

    /// Build the options
    pub fn build(self) -> HashOptions {
        self.options
    }
}

/// How the backing file is opened.
#[derive(Debug, Clone, Copy)]
pub struct OpenFlags {
    pub read_only: bool,
    pub create: bool,
    pub truncate: bool,
    /// Unix permission bits used when the file is created
    pub mode: u32,
}

impl Default for OpenFlags {
    fn default() -> Self {
        Self::read_write()
    }
}

impl OpenFlags {
    /// Read-write, creating the file if it is missing
    pub fn read_write() -> Self {
        Self {
            read_only: false,
            create: true,
            truncate: false,
            mode: 0o644,
        }
    }

    /// Read-only access to an existing file
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            create: false,
            truncate: false,
            mode: 0o644,
        }
    }

    /// Discard any existing contents
    pub fn truncate(mut self) -> Self {
        self.truncate = true;
        self
    }

    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_validate() {
        assert!(HashOptions::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_non_power_of_two_page() {
        let opts = HashOptions::builder().bucket_size(1000).build();
        assert!(matches!(opts.validate(), Err(FileHashError::Open(_))));

        let opts = HashOptions::builder().bucket_size(256).build();
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_pool_frames_has_floor() {
        let opts = HashOptions::builder().cache_size(1024).build();
        assert_eq!(opts.pool_frames(4096), MIN_POOL_FRAMES);

        let opts = HashOptions::builder().cache_size(4096 * 100).build();
        assert_eq!(opts.pool_frames(4096), 100);
    }
}
