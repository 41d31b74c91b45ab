pub mod backend;
pub mod programs;
pub mod runtime;
pub mod throttle;

pub use backend::{BackendError, BulbBackend, Color, LoggingBackend, ShutdownStats};
pub use programs::{LightingProgram, Program};
pub use runtime::{LightingRuntime, LightingRuntimeError};
pub use throttle::ThrottlingBackend;
