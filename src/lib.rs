//! Reelgrab - video extraction service
//!
//! Accepts a video page URL, runs yt-dlp with per-platform parameters under a
//! deadline, verifies the produced file and serves it back over HTTP. A
//! background pass reclaims downloads older than the retention window.

pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod extractor;
pub mod orchestrator;
pub mod platform;
pub mod server;
pub mod store;
