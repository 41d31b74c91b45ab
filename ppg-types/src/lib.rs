//! Shared data model for the Corazonn engine.
//!
//! Pure types only: no threads, no sockets, no file I/O. Every other crate
//! in the workspace depends on `ppg-types` and nothing flows the other way.

pub mod channel;
pub mod config;
pub mod detector;
pub mod effect;
pub mod lighting;
pub mod loops;
pub mod predictor;
pub mod sample;
pub mod voice;

pub use channel::ChannelId;
pub use config::EngineConfig;
pub use detector::{DetectorPhase, Observation};
pub use effect::{EffectChain, EffectKind, EffectParams};
pub use lighting::{LightingProgramKind, Zone};
pub use loops::{LoopId, LoopKind};
pub use predictor::{AcquireEvent, BeatEvent, PredictorPhase, ReleaseEvent};
pub use sample::{Sample, SampleBundle};
pub use voice::RoutingTable;
