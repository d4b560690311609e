pub mod admin;
pub mod assets;
pub mod content;
pub mod files;
