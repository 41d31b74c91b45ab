pub mod effects;
pub mod engine;
pub mod loops;
pub mod mixer;
pub mod routing;
pub mod samples;

pub use engine::{AudioEngine, AudioEngineError};
pub use loops::LoopManager;
pub use mixer::Mixer;
pub use routing::SharedRouting;
pub use samples::SampleBank;
