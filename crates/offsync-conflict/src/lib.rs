//! offsync Conflict - Conflict detection and resolution
//!
//! Provides:
//! - Timestamp and payload based conflict detection
//! - Glob-based strategy selection per key
//! - Pluggable payload mergers per resource prefix
//! - Automatic resolution with fallback to manual handling

pub mod detector;
pub mod error;
pub mod merge;
pub mod policy;
pub mod resolver;

pub use detector::{ConflictDetector, DetectionResult};
pub use error::ConflictError;
pub use merge::{MergeRegistry, PayloadMerger, ShallowMerge};
pub use policy::StrategyPolicy;
pub use resolver::{ConflictResolver, ResolutionOutcome};
