pub mod engine;
pub mod plan;
pub mod probe;
pub mod supervisor;

pub use crate::domain::model::{HealthState, ServiceState, StackState};
pub use crate::domain::ports::{ProcessRunner, ServiceHandle};
pub use crate::utils::error::Result;
