pub mod cache;
pub mod config_writer;
pub mod installer;
pub mod version_resolver;
