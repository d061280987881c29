//! Live data sync for a race engineer dashboard.
//!
//! [`feed::client::SyncClient`] keeps one websocket to the telemetry gateway
//! alive, decodes what arrives into [`store::LiveState`] and lets consumers
//! read it or react to [`feed::Update`]s. The remaining modules derive views
//! (track map, threat board, telemetry trace) from that state.

#[macro_use] extern crate log;

pub mod config;
pub mod console;
pub mod feed;
pub mod store;
pub mod threat;
pub mod trace;
pub mod track;
