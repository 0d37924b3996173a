pub mod config;
pub mod note;
pub mod settings;
pub mod theme;
