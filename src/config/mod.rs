#[cfg(feature = "cli")]
pub mod cli;
pub mod duration;
pub mod env_file;
pub mod interpolate;
pub mod stack_config;

pub use interpolate::Interpolator;
pub use stack_config::{ServiceConfig, StackConfig};
