//! Integration tests for the disk manager

use filehash::common::{OpenFlags, PageId};
use filehash::storage::disk::DiskManager;
use filehash::FileHashError;
use tempfile::NamedTempFile;

const PAGE: usize = 1024;

#[test]
fn test_disk_manager_new_file_is_empty() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::open(temp_file.path(), &OpenFlags::default(), PAGE).unwrap();

    assert_eq!(dm.get_num_pages(), 0);
    assert_eq!(dm.get_num_reads(), 0);
    assert_eq!(dm.get_num_writes(), 0);
    assert_eq!(dm.page_size(), PAGE);
}

#[test]
fn test_disk_manager_read_write_page() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::open(temp_file.path(), &OpenFlags::default(), PAGE).unwrap();

    let mut write_data = vec![0u8; PAGE];
    for (i, byte) in write_data.iter_mut().enumerate() {
        *byte = (i % 251) as u8;
    }
    dm.write_page(PageId::new(3), &write_data).unwrap();
    assert_eq!(dm.get_num_pages(), 4);

    let mut read_data = vec![0u8; PAGE];
    dm.read_page(PageId::new(3), &mut read_data).unwrap();
    assert_eq!(read_data, write_data);

    // The hole before page 3 reads back as zeroes.
    dm.read_page(PageId::new(1), &mut read_data).unwrap();
    assert!(read_data.iter().all(|&b| b == 0));
}

#[test]
fn test_disk_manager_multi_page_io() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::open(temp_file.path(), &OpenFlags::default(), PAGE).unwrap();

    let mut data = vec![0u8; PAGE * 3];
    data[0] = 1;
    data[PAGE] = 2;
    data[2 * PAGE] = 3;
    dm.write_pages(PageId::new(0), 3, &data).unwrap();
    assert_eq!(dm.get_num_writes(), 1);

    let mut page = vec![0u8; PAGE];
    dm.read_page(PageId::new(2), &mut page).unwrap();
    assert_eq!(page[0], 3);

    let mut all = vec![0u8; PAGE * 3];
    dm.read_pages(PageId::new(0), 3, &mut all).unwrap();
    assert_eq!(all, data);
}

#[test]
fn test_disk_manager_persistence_and_truncate() {
    let temp_file = NamedTempFile::new().unwrap();
    {
        let dm = DiskManager::open(temp_file.path(), &OpenFlags::default(), PAGE).unwrap();
        for i in 0..5u32 {
            dm.write_page(PageId::new(i), &vec![i as u8 + 1; PAGE]).unwrap();
        }
        dm.sync().unwrap();
    }

    let dm = DiskManager::open(temp_file.path(), &OpenFlags::default(), PAGE).unwrap();
    assert_eq!(dm.get_num_pages(), 5);
    dm.truncate(2).unwrap();
    assert_eq!(dm.get_num_pages(), 2);
    assert_eq!(dm.file_len().unwrap(), 2 * PAGE as u64);

    let mut page = vec![0u8; PAGE];
    dm.read_page(PageId::new(1), &mut page).unwrap();
    assert!(page.iter().all(|&b| b == 2));
    dm.read_page(PageId::new(4), &mut page).unwrap();
    assert!(page.iter().all(|&b| b == 0));
}

#[test]
fn test_disk_manager_read_only() {
    let temp_file = NamedTempFile::new().unwrap();
    {
        let dm = DiskManager::open(temp_file.path(), &OpenFlags::default(), PAGE).unwrap();
        dm.write_page(PageId::new(0), &vec![7u8; PAGE]).unwrap();
    }

    let dm = DiskManager::open(temp_file.path(), &OpenFlags::read_only(), PAGE).unwrap();
    assert!(dm.is_read_only());
    let mut page = vec![0u8; PAGE];
    dm.read_page(PageId::new(0), &mut page).unwrap();
    assert_eq!(page[0], 7);
    assert!(matches!(
        dm.write_page(PageId::new(0), &page),
        Err(FileHashError::ReadOnly)
    ));
}

#[test]
fn test_disk_manager_switches_page_size() {
    let temp_file = NamedTempFile::new().unwrap();
    {
        let dm = DiskManager::open(temp_file.path(), &OpenFlags::default(), 512).unwrap();
        dm.write_pages(PageId::new(0), 4, &vec![1u8; 2048]).unwrap();
    }
    let mut dm = DiskManager::open(temp_file.path(), &OpenFlags::default(), 512).unwrap();
    assert_eq!(dm.get_num_pages(), 4);
    dm.set_page_size(1024).unwrap();
    assert_eq!(dm.page_size(), 1024);
    assert_eq!(dm.get_num_pages(), 2);
}
