//! Signal-quality detection and phase-locked beat prediction.

pub mod detector;
pub mod emission;
pub mod predictor;
pub mod processor;

pub use detector::{Detector, DetectorStep};
pub use emission::BeatEmitter;
pub use predictor::{PendingBeat, Predictor, PredictorStep};
pub use processor::Processor;
