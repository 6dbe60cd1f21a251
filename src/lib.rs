pub mod config;
pub mod error;
pub mod models;
pub mod sink;
pub mod source;
pub mod sync_engine;
