// Adapters layer: concrete implementations for external systems (processes, volumes, state persistence).

pub mod process;
pub mod state;
pub mod volumes;

pub use process::TokioProcessRunner;
pub use state::StateStore;
pub use volumes::LocalVolumes;
