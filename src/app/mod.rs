pub mod cluster;
pub mod config;
pub mod driver;
pub mod registry;
pub mod scene;
pub mod session;
pub mod tracks;
pub mod update;

pub use cluster::{ClusterKey, EnsembleId, InstrumentCluster};
pub use config::{ConfigManager, MixerConfig};
pub use driver::{DragDirection, DriverMode, PositionDriver};
pub use registry::{EnsembleLayout, Registry};
pub use scene::{Rgb, Scene, StageObject, StageScene, VisualId};
pub use session::{InstrumentSnapshot, MixerSession, SessionSnapshot};
pub use tracks::{DirTrackSource, ToneTrackSource, TrackSource};
pub use update::{compute_targets, update_parameters, ParameterTargets, ReferenceFrame};
