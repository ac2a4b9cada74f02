//! # Meter Lookup Telegram Bot
//!
//! A Telegram bot that looks up electricity meters in per-region
//! spreadsheet exports, restricted by a roster of authorized users,
//! with a secondary lookup of fiber-optic line contracts.

pub mod access;
pub mod bot;
pub mod cache;
pub mod config;
pub mod dialogue;
pub mod errors;
pub mod fiber;
pub mod keepalive;
pub mod localization;
pub mod lookup;
pub mod normalize;
pub mod request_log;
pub mod server;
pub mod session;
pub mod sheet;
