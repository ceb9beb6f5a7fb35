//! CLI command implementations

pub mod build;
pub mod clean;
pub mod config;
pub mod list;

pub use build::execute as build;
pub use clean::execute as clean;
pub use config::execute as config;
pub use list::execute as list;
