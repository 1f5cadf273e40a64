//! Lost sector rotation: oracle contract, glyphs and page rendering.

pub mod format;
pub mod glyph;
pub mod rotation;

pub use format::{ImageResolver, PageFormatter};
pub use glyph::{GlyphLookup, StaticGlyphs};
pub use rotation::{OracleError, RotationOracle, RotationTable, Sector};
