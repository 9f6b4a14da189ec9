use crate::common::{PageId, MAX_CONFIG_NAME_LEN};

use super::page_layout::{
    init_page, read_u32, read_u64, set_next_page, set_num_entries, write_u32, write_u64,
    PageProlog, PageType, PAGE_HEADER_SIZE,
};

/// Payload bytes of a page after its prologue.
pub fn payload_capacity(page_size: usize) -> usize {
    page_size - PAGE_HEADER_SIZE
}

/// Pages needed for a user info blob of at most `uinfo_len` bytes. The
/// stream stored across those pages is a u32 length followed by the blob.
pub fn user_info_pages(uinfo_len: usize, page_size: usize) -> u32 {
    let need = uinfo_len + 4;
    need.div_ceil(payload_capacity(page_size)) as u32
}

/// User info page: prologue followed by a slice of the blob stream.
pub struct UserInfoPage;

impl UserInfoPage {
    pub fn init(data: &mut [u8], page_id: PageId) {
        init_page(data, page_id, PageType::UserInfo);
    }

    pub fn payload(data: &[u8]) -> &[u8] {
        &data[PAGE_HEADER_SIZE..]
    }

    pub fn payload_mut(data: &mut [u8]) -> &mut [u8] {
        &mut data[PAGE_HEADER_SIZE..]
    }
}

/// Page on the free list; `next_page` links to the next free page.
pub struct FreePage;

impl FreePage {
    pub fn init(data: &mut [u8], page_id: PageId, next: Option<PageId>) {
        init_page(data, page_id, PageType::Free);
        set_next_page(data, next);
    }

    pub fn is_free(data: &[u8]) -> bool {
        data.is_initialized() && data.page_type() == Some(PageType::Free)
    }
}

/// Encoded size of one configuration slot
pub const CONFIG_SLOT_SIZE: usize = 4 + 4 + 1 + 1 + 8 + MAX_CONFIG_NAME_LEN;

/// One configuration directory entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigInfo {
    /// Position in the directory
    pub index: u32,
    /// Caller-assigned configuration identifier
    pub config: u32,
    pub inserted: bool,
    pub config_type: u8,
    /// Modification time, seconds since the epoch
    pub mtime: u64,
    /// File name, at most `MAX_CONFIG_NAME_LEN` bytes
    pub fname: String,
}

impl ConfigInfo {
    pub fn new(index: u32, fname: &str) -> Self {
        Self {
            index,
            fname: truncate_name(fname).to_string(),
            ..Default::default()
        }
    }

    fn encode_into(&self, buf: &mut [u8]) {
        write_u32(buf, 0, self.index);
        write_u32(buf, 4, self.config);
        buf[8] = self.inserted as u8;
        buf[9] = self.config_type;
        write_u64(buf, 10, self.mtime);

        let name = truncate_name(&self.fname).as_bytes();
        let field = &mut buf[18..18 + MAX_CONFIG_NAME_LEN];
        field.fill(0);
        field[..name.len()].copy_from_slice(name);
    }

    fn decode(buf: &[u8]) -> Self {
        let field = &buf[18..18 + MAX_CONFIG_NAME_LEN];
        let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
        Self {
            index: read_u32(buf, 0),
            config: read_u32(buf, 4),
            inserted: buf[8] != 0,
            config_type: buf[9],
            mtime: read_u64(buf, 10),
            fname: String::from_utf8_lossy(&field[..end]).into_owned(),
        }
    }
}

/// Longest prefix of `name` that fits the slot on a char boundary.
pub fn truncate_name(name: &str) -> &str {
    if name.len() <= MAX_CONFIG_NAME_LEN {
        return name;
    }
    let mut end = MAX_CONFIG_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

/// Configuration directory page: prologue followed by `num_entries` slots.
pub struct ConfigPage;

impl ConfigPage {
    pub fn slots_per_page(page_size: usize) -> usize {
        payload_capacity(page_size) / CONFIG_SLOT_SIZE
    }

    pub fn init(data: &mut [u8], page_id: PageId) {
        init_page(data, page_id, PageType::Config);
    }

    pub fn set_count(data: &mut [u8], n: usize) {
        set_num_entries(data, n as u16);
    }

    pub fn count(data: &[u8]) -> usize {
        data.num_entries() as usize
    }

    pub fn read_slot(data: &[u8], i: usize) -> ConfigInfo {
        let pos = PAGE_HEADER_SIZE + i * CONFIG_SLOT_SIZE;
        ConfigInfo::decode(&data[pos..pos + CONFIG_SLOT_SIZE])
    }

    pub fn write_slot(data: &mut [u8], i: usize, info: &ConfigInfo) {
        let pos = PAGE_HEADER_SIZE + i * CONFIG_SLOT_SIZE;
        info.encode_into(&mut data[pos..pos + CONFIG_SLOT_SIZE]);
    }
}

/// Pages needed for `n` configuration slots (always at least one).
pub fn config_pages(n: usize, page_size: usize) -> u32 {
    n.div_ceil(ConfigPage::slots_per_page(page_size)).max(1) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_info_page_count() {
        // 512-byte pages carry 488 payload bytes each.
        assert_eq!(user_info_pages(0, 512), 1);
        assert_eq!(user_info_pages(484, 512), 1);
        assert_eq!(user_info_pages(485, 512), 2);
        assert_eq!(user_info_pages(4000, 4096), 1);
    }

    #[test]
    fn test_config_slot_round_trip() {
        let mut page = vec![0u8; 512];
        ConfigPage::init(&mut page, PageId::new(2));
        assert_eq!(ConfigPage::slots_per_page(512), 3);

        let info = ConfigInfo {
            index: 1,
            config: 77,
            inserted: true,
            config_type: 2,
            mtime: 1_700_000_000,
            fname: "run/cfg_0001.lime".to_string(),
        };
        ConfigPage::write_slot(&mut page, 1, &info);
        ConfigPage::set_count(&mut page, 2);

        assert_eq!(ConfigPage::count(&page), 2);
        assert_eq!(ConfigPage::read_slot(&page, 1), info);
        assert_eq!(ConfigPage::read_slot(&page, 0), ConfigInfo::default());
    }

    #[test]
    fn test_long_names_truncate() {
        let long = "x".repeat(MAX_CONFIG_NAME_LEN + 20);
        let info = ConfigInfo::new(0, &long);
        assert_eq!(info.fname.len(), MAX_CONFIG_NAME_LEN);

        // Multi-byte char straddling the limit is dropped whole.
        let name = format!("{}é", "a".repeat(MAX_CONFIG_NAME_LEN - 1));
        assert_eq!(truncate_name(&name).len(), MAX_CONFIG_NAME_LEN - 1);
    }

    #[test]
    fn test_free_page() {
        let mut page = vec![0u8; 512];
        assert!(!FreePage::is_free(&page));
        FreePage::init(&mut page, PageId::new(8), Some(PageId::new(3)));
        assert!(FreePage::is_free(&page));
        assert_eq!(page.next_page(), Some(PageId::new(3)));
    }
}
