//! Client side of the video pipeline backend.
//!
//! Provides the REST wrapper ([`api`]), the progress WebSocket client
//! ([`client`]), frame parsing ([`messages`]), the injected transport
//! capabilities ([`transport`]) and the Progress Channel that keeps an
//! [`ExecutionView`](shorts_core::tracker::ExecutionView) current while
//! a run is observed ([`channel`], [`monitor`]).

pub mod api;
pub mod channel;
pub mod client;
pub mod config;
pub mod messages;
pub mod monitor;
pub mod transport;
