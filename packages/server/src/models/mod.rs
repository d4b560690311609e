pub mod asset;
pub mod content;
