//! Canonical domain types shared by adapters, cache and aggregator.

mod item;
mod source_id;
mod timestamp;

pub use item::{DateRange, ImpactAnnotation, ImpactLevel, NormalizedItem};
pub use source_id::SourceId;
pub use timestamp::UtcDateTime;
