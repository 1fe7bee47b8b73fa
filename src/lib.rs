#![forbid(unsafe_code)]

//! Keeps local video folders in step with subscribed channels and playlists.

pub mod config;
pub mod error;
pub mod history;
pub mod logging;
pub mod platform;
pub mod policy;
pub mod preflight;
pub mod retention;
pub mod subscriptions;
pub mod sync;
pub mod template;
pub mod ytdlp;
