//! Terminal observer for pipeline runs.
//!
//! Submits a run (or picks up an existing one), follows it through a
//! [`ProgressMonitor`](shorts_client::monitor::ProgressMonitor) and
//! prints each change as it is published.

pub mod cli;
pub mod render;
