use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::common::{FileHashError, OpenFlags, PageId, Result, MIN_PAGE_SIZE};

/// DiskManager reads and writes fixed-size pages of a single file.
///
/// Reads past the end of the file return zeroes, so a page that was
/// allocated but never written reads back as a fresh page. The page size is
/// only known once the header has been read, so it can be changed before
/// the manager is handed to a buffer pool.
pub struct DiskManager {
    /// The database file
    db_file: Mutex<File>,
    /// Path to the database file
    db_path: PathBuf,
    page_size: usize,
    read_only: bool,
    /// Number of whole pages currently in the file
    num_pages: AtomicU32,
    /// Number of disk reads performed (counts each I/O operation, not pages)
    num_reads: AtomicU64,
    /// Number of disk writes performed (counts each I/O operation, not pages)
    num_writes: AtomicU64,
}

impl DiskManager {
    /// Opens `db_path` according to `flags`.
    pub fn open<P: AsRef<Path>>(db_path: P, flags: &OpenFlags, page_size: usize) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();

        let mut opts = OpenOptions::new();
        opts.read(true);
        if !flags.read_only {
            opts.write(true)
                .create(flags.create)
                .truncate(flags.truncate);
        }
        #[cfg(unix)]
        opts.mode(flags.mode);

        let file = opts.open(&path)?;
        let file_size = file.metadata()?.len();
        let page_size = page_size.max(MIN_PAGE_SIZE);

        debug!(path = %path.display(), file_size, read_only = flags.read_only, "opened database file");

        Ok(Self {
            db_file: Mutex::new(file),
            db_path: path,
            page_size,
            read_only: flags.read_only,
            num_pages: AtomicU32::new((file_size / page_size as u64) as u32),
            num_reads: AtomicU64::new(0),
            num_writes: AtomicU64::new(0),
        })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Switches to the page size recorded in the file header.
    pub fn set_page_size(&mut self, page_size: usize) -> Result<()> {
        self.page_size = page_size;
        let len = self.file_len()?;
        self.num_pages
            .store((len / page_size as u64) as u32, Ordering::Relaxed);
        Ok(())
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Current file length in bytes.
    pub fn file_len(&self) -> Result<u64> {
        Ok(self.db_file.lock().metadata()?.len())
    }

    /// Reads raw bytes at `offset`, zero-filling whatever lies past EOF.
    pub fn read_at(&self, offset: u64, data: &mut [u8]) -> Result<()> {
        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(offset))?;
        let filled = read_full(&mut file, data)?;
        if filled < data.len() {
            data[filled..].fill(0);
        }
        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Reads a page from disk into the provided buffer.
    /// The buffer must be exactly one page long.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        debug_assert_eq!(data.len(), self.page_size);
        trace!(%page_id, "read page");
        self.read_at(page_id.file_offset(self.page_size), data)
    }

    /// Writes a page to disk from the provided buffer.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        debug_assert_eq!(data.len(), self.page_size);
        self.write_pages(page_id, 1, data)
    }

    /// Reads `num_pages` contiguous pages starting at `start_page_id` in a
    /// single I/O operation.
    pub fn read_pages(&self, start_page_id: PageId, num_pages: u32, data: &mut [u8]) -> Result<()> {
        debug_assert_eq!(data.len(), num_pages as usize * self.page_size);
        self.read_at(start_page_id.file_offset(self.page_size), data)
    }

    /// Writes `num_pages` contiguous pages starting at `start_page_id` in a
    /// single I/O operation.
    pub fn write_pages(&self, start_page_id: PageId, num_pages: u32, data: &[u8]) -> Result<()> {
        if self.read_only {
            return Err(FileHashError::ReadOnly);
        }
        debug_assert_eq!(data.len(), num_pages as usize * self.page_size);
        trace!(start = %start_page_id, num_pages, "write pages");

        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(start_page_id.file_offset(self.page_size)))?;
        file.write_all(data)?;
        file.flush()?;

        let end = start_page_id.as_u32() + num_pages;
        self.num_pages.fetch_max(end, Ordering::Relaxed);
        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Shrinks (or grows) the file to exactly `num_pages` pages.
    pub fn truncate(&self, num_pages: u32) -> Result<()> {
        if self.read_only {
            return Err(FileHashError::ReadOnly);
        }
        let file = self.db_file.lock();
        file.set_len(num_pages as u64 * self.page_size as u64)?;
        self.num_pages.store(num_pages, Ordering::Relaxed);
        debug!(num_pages, "truncated database file");
        Ok(())
    }

    /// Returns the number of whole pages in the file.
    pub fn get_num_pages(&self) -> u32 {
        self.num_pages.load(Ordering::Relaxed)
    }

    /// Returns the number of disk reads performed.
    pub fn get_num_reads(&self) -> u64 {
        self.num_reads.load(Ordering::Relaxed)
    }

    /// Returns the number of disk writes performed.
    pub fn get_num_writes(&self) -> u64 {
        self.num_writes.load(Ordering::Relaxed)
    }

    /// Returns the path to the database file.
    pub fn get_db_path(&self) -> &Path {
        &self.db_path
    }

    /// Forces written pages to stable storage.
    pub fn sync(&self) -> Result<()> {
        if self.read_only {
            return Ok(());
        }
        let file = self.db_file.lock();
        file.sync_all()?;
        Ok(())
    }
}

/// Reads until `buf` is full or EOF, returning the number of bytes read.
fn read_full(file: &mut File, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    const PAGE: usize = 512;

    fn open(temp_file: &NamedTempFile) -> DiskManager {
        DiskManager::open(temp_file.path(), &OpenFlags::default(), PAGE).unwrap()
    }

    #[test]
    fn test_disk_manager_new() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = open(&temp_file);
        assert_eq!(dm.get_num_pages(), 0);
        assert_eq!(dm.page_size(), PAGE);
    }

    #[test]
    fn test_read_beyond_eof_is_zeroed() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = open(&temp_file);

        let mut data = vec![0xAAu8; PAGE];
        dm.read_page(PageId::new(7), &mut data).unwrap();
        assert!(data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_disk_manager_read_write() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = open(&temp_file);

        let mut write_data = vec![0u8; PAGE];
        write_data[0] = 42;
        write_data[100] = 255;
        write_data[PAGE - 1] = 128;
        dm.write_page(PageId::new(2), &write_data).unwrap();
        assert_eq!(dm.get_num_pages(), 3);

        let mut read_data = vec![0u8; PAGE];
        dm.read_page(PageId::new(2), &mut read_data).unwrap();
        assert_eq!(read_data, write_data);
    }

    #[test]
    fn test_truncate() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = open(&temp_file);
        dm.write_pages(PageId::new(0), 4, &vec![1u8; PAGE * 4]).unwrap();
        assert_eq!(dm.get_num_pages(), 4);

        dm.truncate(2).unwrap();
        assert_eq!(dm.get_num_pages(), 2);
        assert_eq!(dm.file_len().unwrap(), (PAGE * 2) as u64);
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let temp_file = NamedTempFile::new().unwrap();
        {
            let dm = open(&temp_file);
            dm.write_page(PageId::new(0), &vec![9u8; PAGE]).unwrap();
        }
        let dm = DiskManager::open(temp_file.path(), &OpenFlags::read_only(), PAGE).unwrap();
        assert!(matches!(
            dm.write_page(PageId::new(0), &vec![0u8; PAGE]),
            Err(FileHashError::ReadOnly)
        ));
        let mut data = vec![0u8; PAGE];
        dm.read_page(PageId::new(0), &mut data).unwrap();
        assert_eq!(data[0], 9);
    }
}
