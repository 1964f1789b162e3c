//! CLI command implementations

pub mod bind;
pub mod build;
pub mod find;
pub mod json_output;
pub mod proxy;

mod loading;

pub use loading::UsageError;
