pub mod common;
pub mod config;
pub mod daemon;
pub mod invoke;
pub mod migrate;
pub mod sync;
pub mod vault;
