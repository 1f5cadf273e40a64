pub mod discord;
pub mod image;
pub mod sheets;

pub use discord::{DiscordClient, DiscordConfig};
pub use image::HttpImageResolver;
pub use sheets::{SheetRotationOracle, SheetsConfig};
