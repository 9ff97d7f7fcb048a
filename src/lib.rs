// Orbit Mixer: position-driven spatial audio for a stage of looping instruments
// Expose public modules for use in integration tests

pub mod app;
pub mod audio;
pub mod error;
pub mod geometry;
pub mod units;

// Re-export commonly used types for convenience
pub use app::{
    ConfigManager, DragDirection, MixerConfig, MixerSession, Scene, StageScene, VisualId,
};
pub use audio::{create_engine, AudioEngine, EngineHandle};
pub use error::{MixerError, Result};
pub use geometry::{Ray, Vec3};
pub use units::{scale_linear, scale_log};
