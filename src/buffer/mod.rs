mod buffer_pool_manager;
mod frame_header;
mod lru_replacer;
mod page_filter;
mod page_guard;
mod page_table;

pub use buffer_pool_manager::*;
pub use frame_header::*;
pub use lru_replacer::*;
pub use page_filter::*;
pub use page_guard::*;
pub use page_table::*;
