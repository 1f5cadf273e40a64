pub(crate) mod cadence;
pub mod daemon;
pub mod publish;

pub use daemon::{AutoPostDaemon, PublishReport};
pub use publish::PagePublisher;
