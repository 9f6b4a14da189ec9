//! Integration tests for the configuration directory and user info

use filehash::{ConfigInfo, FileHashError, HashDb, HashOptions, OpenFlags};
use tempfile::NamedTempFile;

fn options() -> HashOptions {
    HashOptions::builder()
        .bucket_size(1024)
        .user_info_len(2000)
        .num_configs(3)
        .build()
}

fn open_db(temp: &NamedTempFile) -> HashDb {
    HashDb::open(temp.path(), OpenFlags::default(), &options()).unwrap()
}

#[test]
fn test_set_num_configs() {
    let temp = NamedTempFile::new().unwrap();
    let db = open_db(&temp);
    assert_eq!(db.get_num_configs().unwrap(), 3);

    db.set_num_configs(5).unwrap();
    assert_eq!(db.get_num_configs().unwrap(), 5);
    let all = db.get_all_configs().unwrap();
    for (i, cfg) in all.iter().enumerate() {
        assert_eq!(cfg.index, i as u32);
        assert_eq!(cfg.fname, "");
        assert!(!cfg.inserted);
        assert_eq!(cfg.mtime, 0);
    }
}

#[test]
fn test_set_all_configs() {
    let temp = NamedTempFile::new().unwrap();
    let db = open_db(&temp);
    db.set_all_configs(&["a", "b", "c"]).unwrap();
    assert_eq!(db.get_num_configs().unwrap(), 3);
    assert_eq!(db.get_config(1).unwrap().fname, "b");
}

#[test]
fn test_long_names_are_truncated() {
    let temp = NamedTempFile::new().unwrap();
    let db = open_db(&temp);
    let long = "x".repeat(300);
    db.set_all_configs(&[long.as_str()]).unwrap();
    let cfg = db.get_config(0).unwrap();
    assert_eq!(cfg.fname.len(), filehash::common::MAX_CONFIG_NAME_LEN);
    assert!(long.starts_with(&cfg.fname));
}

#[test]
fn test_set_config_and_reopen() {
    let temp = NamedTempFile::new().unwrap();
    {
        let db = open_db(&temp);
        let names: Vec<String> = (0..40).map(|i| format!("/archive/cfg{:03}.xml", i)).collect();
        db.set_all_configs(&names[..]).unwrap();

        let mut info = ConfigInfo::new(33, "/archive/replaced.xml");
        info.config = 7;
        info.inserted = true;
        info.config_type = 2;
        info.mtime = 1_650_000_000;
        db.set_config(&info).unwrap();

        assert!(matches!(
            db.set_config(&ConfigInfo::new(40, "nope")),
            Err(FileHashError::ConfigNotFound(40))
        ));
        db.close().unwrap();
    }

    let db = open_db(&temp);
    assert_eq!(db.get_num_configs().unwrap(), 40);
    let cfg = db.get_config(33).unwrap();
    assert_eq!(cfg.fname, "/archive/replaced.xml");
    assert_eq!(cfg.config, 7);
    assert!(cfg.inserted);
    assert_eq!(cfg.config_type, 2);
    assert_eq!(cfg.mtime, 1_650_000_000);
    assert_eq!(db.get_config(32).unwrap().fname, "/archive/cfg032.xml");
}

#[test]
fn test_user_info_round_trip_and_truncation() {
    let temp = NamedTempFile::new().unwrap();
    let db = open_db(&temp);
    assert_eq!(db.max_user_info_len().unwrap(), 2000);
    assert_eq!(db.user_info().unwrap(), Vec::<u8>::new());

    let blob: Vec<u8> = (0..1500u32).map(|i| (i * 7) as u8).collect();
    db.set_user_info(&blob).unwrap();

    let mut exact = vec![0u8; blob.len()];
    assert_eq!(db.get_user_info(&mut exact).unwrap(), blob.len());
    assert_eq!(exact, blob);

    // A short buffer gets a prefix and the true length; the bytes past it
    // are untouched.
    let mut buf = vec![0xeeu8; 120];
    let n = db.get_user_info(&mut buf[..100]).unwrap();
    assert_eq!(n, 1500);
    assert_eq!(&buf[..100], &blob[..100]);
    assert!(buf[100..].iter().all(|&b| b == 0xee));

    // A shorter blob replaces the old one entirely.
    db.set_user_info(b"short").unwrap();
    assert_eq!(db.user_info().unwrap(), b"short");
}

#[test]
fn test_user_info_too_large() {
    let temp = NamedTempFile::new().unwrap();
    let db = open_db(&temp);
    assert!(matches!(
        db.set_user_info(&vec![1u8; 2001]),
        Err(FileHashError::UserInfoTooLarge { len: 2001, max: 2000 })
    ));
}
