pub mod config;
pub mod error;
pub mod export;
pub mod local_metadata;
pub mod log_sanitize;
pub mod logging;
pub mod orchestrator;
mod process;
pub mod record;
pub mod restore;
pub mod s3;
pub mod selector;
pub mod session;
pub mod staging;
pub mod transfer;
pub mod xo;

pub use error::{Error, Result};
