pub mod registry;

pub use registry::{resolve_model, ModelSpec, Registry};
