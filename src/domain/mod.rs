// Domain layer: core models and ports (interfaces). No external dependencies beyond std/serde/tokio types.

pub mod model;
pub mod ports;
