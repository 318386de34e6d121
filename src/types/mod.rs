pub mod context;
pub mod email;
pub mod entity;

pub use context::{FeaturedItem, PipelineContext, Section, TemporalContext, Weather};
pub use email::{Email, EmailType, Importance};
pub use entity::{Entity, EntityHeader, EntityKind, Location};
