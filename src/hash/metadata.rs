//! Configuration directory and user info blob.
//!
//! Both live in pages reserved at creation, between the header page and the
//! first bucket. The configuration directory is a chain of config pages
//! whose slots are numbered densely from 0; it grows into freshly allocated
//! pages when more slots are requested. The user info blob is stored as a
//! length-prefixed stream across a fixed run of pages.

use bytes::{Buf, BufMut, BytesMut};

use crate::common::{FileHashError, PageId, Result};
use crate::storage::page::{
    config_pages, payload_capacity, set_next_page, ConfigInfo, ConfigPage, PageProlog, PageType,
    UserInfoPage,
};

use super::table::HashTable;

fn check_type(page_id: PageId, data: &[u8], expected: PageType) -> Result<()> {
    if !data.is_initialized() || data.page_type() != Some(expected) {
        return Err(FileHashError::corrupt(format!(
            "{} is not a {:?} page",
            page_id, expected
        )));
    }
    Ok(())
}

impl HashTable {
    /// Page IDs of the configuration directory, in slot order.
    fn config_chain(&self) -> Result<Vec<PageId>> {
        let limit = self.pool.alloc_state().npages;
        let mut pages = Vec::new();
        let mut next = Some(self.hdr.config_page);
        while let Some(pid) = next {
            if pages.len() as u32 >= limit {
                return Err(FileHashError::corrupt("config page chain does not terminate"));
            }
            let guard = self.pool.read_page(pid)?;
            check_type(pid, guard.data(), PageType::Config)?;
            pages.push(pid);
            next = guard.data().next_page();
        }
        Ok(pages)
    }

    /// Replaces the whole directory with `slots`.
    pub(super) fn write_configs(&mut self, slots: &[ConfigInfo]) -> Result<()> {
        let per_page = ConfigPage::slots_per_page(self.page_size());
        let needed = config_pages(slots.len(), self.page_size()) as usize;

        let mut pages = self.config_chain()?;
        while pages.len() < needed {
            pages.push(self.pool.allocate_page()?);
        }
        for pid in pages.split_off(needed) {
            self.pool.free_page(pid)?;
        }

        let mut chunks = slots.chunks(per_page);
        for (i, &pid) in pages.iter().enumerate() {
            let chunk = chunks.next().unwrap_or(&[]);
            let mut guard = self.pool.new_page(pid)?;
            let data = guard.data_mut();
            ConfigPage::init(data, pid);
            set_next_page(data, pages.get(i + 1).copied());
            for (j, info) in chunk.iter().enumerate() {
                ConfigPage::write_slot(data, j, info);
            }
            ConfigPage::set_count(data, chunk.len());
        }
        self.hdr.num_configs = slots.len() as u32;
        Ok(())
    }

    /// Resets the directory to `n` empty slots.
    pub fn set_num_configs(&mut self, n: u32) -> Result<()> {
        self.check_writable()?;
        let slots: Vec<_> = (0..n).map(|i| ConfigInfo::new(i, "")).collect();
        self.write_configs(&slots)
    }

    /// Resets the directory to one slot per name. Long names are truncated.
    pub fn set_all_configs<S: AsRef<str>>(&mut self, names: &[S]) -> Result<()> {
        self.check_writable()?;
        let slots: Vec<_> = names
            .iter()
            .enumerate()
            .map(|(i, name)| ConfigInfo::new(i as u32, name.as_ref()))
            .collect();
        self.write_configs(&slots)
    }

    pub fn get_num_configs(&self) -> u32 {
        self.hdr.num_configs
    }

    fn config_location(&self, index: u32) -> Result<(PageId, usize)> {
        if index >= self.hdr.num_configs {
            return Err(FileHashError::ConfigNotFound(index));
        }
        let per_page = ConfigPage::slots_per_page(self.page_size());
        let pages = self.config_chain()?;
        let page = *pages
            .get(index as usize / per_page)
            .ok_or_else(|| FileHashError::corrupt(format!("config slot {} has no page", index)))?;
        Ok((page, index as usize % per_page))
    }

    pub fn get_config(&self, index: u32) -> Result<ConfigInfo> {
        let (pid, slot) = self.config_location(index)?;
        let guard = self.pool.read_page(pid)?;
        Ok(ConfigPage::read_slot(guard.data(), slot))
    }

    /// Overwrites the slot at `info.index`.
    pub fn set_config(&mut self, info: &ConfigInfo) -> Result<()> {
        self.check_writable()?;
        let (pid, slot) = self.config_location(info.index)?;
        let mut guard = self.pool.write_page(pid)?;
        ConfigPage::write_slot(guard.data_mut(), slot, info);
        Ok(())
    }

    pub fn get_all_configs(&self) -> Result<Vec<ConfigInfo>> {
        let mut all = Vec::with_capacity(self.hdr.num_configs as usize);
        for pid in self.config_chain()? {
            let guard = self.pool.read_page(pid)?;
            let data = guard.data();
            all.extend((0..ConfigPage::count(data)).map(|i| ConfigPage::read_slot(data, i)));
        }
        if all.len() != self.hdr.num_configs as usize {
            return Err(FileHashError::corrupt(format!(
                "config directory holds {} slots, header says {}",
                all.len(),
                self.hdr.num_configs
            )));
        }
        Ok(all)
    }

    fn user_info_page(&self, i: u32) -> PageId {
        PageId::new(self.hdr.uinfo_page.as_u32() + i)
    }

    /// The stored user info blob.
    pub fn user_info(&self) -> Result<Vec<u8>> {
        let mut stream = Vec::new();
        for i in 0..self.hdr.uinfo_npages {
            let pid = self.user_info_page(i);
            let guard = self.pool.read_page(pid)?;
            check_type(pid, guard.data(), PageType::UserInfo)?;
            stream.extend_from_slice(UserInfoPage::payload(guard.data()));
        }
        if stream.len() < 4 {
            return Err(FileHashError::corrupt("user info pages are missing"));
        }

        let mut buf = &stream[..];
        let len = buf.get_u32_le() as usize;
        if len > self.hdr.uinfo_len as usize || len > buf.len() {
            return Err(FileHashError::corrupt(format!(
                "user info length {} exceeds the reserved {}",
                len, self.hdr.uinfo_len
            )));
        }
        Ok(buf[..len].to_vec())
    }

    /// Copies as much of the blob as fits in `buf` and returns its full
    /// length, which is larger than `buf.len()` when the copy was cut.
    pub fn get_user_info(&self, buf: &mut [u8]) -> Result<usize> {
        let info = self.user_info()?;
        let n = buf.len().min(info.len());
        buf[..n].copy_from_slice(&info[..n]);
        Ok(info.len())
    }

    /// Replaces the blob.
    pub fn set_user_info(&mut self, data: &[u8]) -> Result<()> {
        self.check_writable()?;
        let max = self.hdr.uinfo_len as usize;
        if data.len() > max {
            return Err(FileHashError::UserInfoTooLarge {
                len: data.len(),
                max,
            });
        }

        let cap = payload_capacity(self.page_size());
        let mut stream = BytesMut::with_capacity(cap * self.hdr.uinfo_npages as usize);
        stream.put_u32_le(data.len() as u32);
        stream.put_slice(data);
        stream.resize(cap * self.hdr.uinfo_npages as usize, 0);

        for (i, chunk) in stream.chunks(cap).enumerate() {
            let pid = self.user_info_page(i as u32);
            let mut guard = self.pool.write_page(pid)?;
            check_type(pid, guard.data(), PageType::UserInfo)?;
            UserInfoPage::payload_mut(guard.data_mut()).copy_from_slice(chunk);
        }
        Ok(())
    }

    pub fn max_user_info_len(&self) -> usize {
        self.hdr.uinfo_len as usize
    }
}
