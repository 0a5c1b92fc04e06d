pub mod adapters;
#[cfg(feature = "cli")]
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::cli::Cli;

pub use adapters::{StateStore, TokioProcessRunner};
pub use config::StackConfig;
pub use core::engine::StackEngine;
pub use utils::error::{Result, StackError};
