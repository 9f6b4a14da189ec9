mod bucket_page;
mod header_page;
mod meta_page;
mod page_layout;

pub use bucket_page::*;
pub use header_page::*;
pub use meta_page::*;
pub use page_layout::{init_page, page_checksum, PageChecksum, PageProlog, PageType, PAGE_HEADER_SIZE, PAGE_MAGIC};
pub(crate) use page_layout::set_next_page;
