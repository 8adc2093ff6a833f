pub mod config;
pub mod duration;
pub mod error;
pub mod model;
pub mod zone;

pub use config::{Config, SourceConfig, SourceDescriptor, SourceKind};
pub use duration::parse_duration;
pub use error::*;
pub use model::*;
pub use zone::ScheduleZone;
