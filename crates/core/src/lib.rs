//! Domain model for observing video-generation pipeline runs.
//!
//! Holds the execution identifiers, the progress event and status
//! document shapes the backend speaks, and the [`ExecutionTracker`]
//! that folds both into one consistent [`ExecutionView`]. Nothing in
//! this crate performs I/O.
//!
//! [`ExecutionTracker`]: tracker::ExecutionTracker
//! [`ExecutionView`]: tracker::ExecutionView

pub mod error;
pub mod progress;
pub mod status;
pub mod tracker;
pub mod types;
