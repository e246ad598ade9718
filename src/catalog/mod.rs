pub mod cache;
pub mod client;
pub mod expansion;
pub mod types;
