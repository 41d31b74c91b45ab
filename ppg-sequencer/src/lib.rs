pub mod sampler;
pub mod sequencer;

pub use sampler::Sampler;
pub use sequencer::Sequencer;
