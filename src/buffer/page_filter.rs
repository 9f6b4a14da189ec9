use crate::common::{PageId, Result};

/// Hook run on every page transfer between the file and the pool.
///
/// `page_in` sees a page right after it is read and may reject it;
/// `page_out` sees the outgoing copy right before it is written.
pub trait PageFilter: Send + Sync {
    fn page_in(&self, page_id: PageId, data: &mut [u8]) -> Result<()>;
    fn page_out(&self, page_id: PageId, data: &mut [u8]);
}

/// Passes pages through untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFilter;

impl PageFilter for NoFilter {
    fn page_in(&self, _page_id: PageId, _data: &mut [u8]) -> Result<()> {
        Ok(())
    }

    fn page_out(&self, _page_id: PageId, _data: &mut [u8]) {}
}
