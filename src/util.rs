pub mod retry;
pub(crate) mod time;
