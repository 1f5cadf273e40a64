#![allow(clippy::module_name_repetitions)]

pub(crate) mod api;
pub mod app;
pub mod clients;
pub mod config;
pub mod nav;
pub mod observability;
pub mod scheduler;
pub mod sector;
pub mod util;
