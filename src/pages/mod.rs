mod page;

pub use page::{PageId, PageState};
