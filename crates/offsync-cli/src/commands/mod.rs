pub mod config;
pub mod conflicts;
pub mod data;
pub mod logs;
pub mod status;
pub mod sync;
