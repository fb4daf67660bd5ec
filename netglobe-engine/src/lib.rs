pub mod error;
pub mod runtime;

// Re-export the runtime functions so frontends can simply do:
pub use error::EngineError;
pub use runtime::{
    init_telemetry, open_collaborators, run_production_mode, run_with, Collaborators,
};
