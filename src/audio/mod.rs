mod decode;
pub mod engine;
pub mod graph;
pub mod nodes;
pub mod param;
mod recorder;

pub use decode::{decode_track, decode_track_async, DecodedTrack};
pub use engine::{create_engine, AudioClock, AudioEngine, EngineHandle, GraphId};
pub use graph::{AudioGraph, GraphBuilder, GraphParams, GraphSettings, OutputTaps, PlaybackState};
pub use param::{AudioParam, ParamSmoother};
pub use recorder::{recording_sink, Recorder, RecordingTap};

#[cfg(test)]
pub(crate) use decode::tests::wav_bytes;
