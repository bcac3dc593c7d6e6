//! Track lifecycle: entities, the reconciling registry, the synthetic
//! approach-path overlay and the static radar field.

pub mod entity;
pub mod radar;
pub mod registry;
pub mod special;

pub use entity::TrackEntity;
pub use radar::RadarField;
pub use registry::{IngestOutcome, TrackRegistry};
pub use special::SpecialOverlay;
