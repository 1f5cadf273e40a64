//! Date-keyed page window: history replay, oracle lookahead and paged reads.

pub mod cache;
pub mod error;
pub mod merge;
pub mod page;
pub mod period;
pub mod source;
pub mod window;

pub use cache::{AdvanceOutcome, WindowCache, WindowDeps, WindowSettings};
pub use error::WindowError;
pub use merge::ContentMerger;
pub use page::{Attachment, ContentBlock, Page};
pub use period::{DateKey, DatePeriod};
pub use source::{HistorySource, RawMessage};
pub use window::Window;
