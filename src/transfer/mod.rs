//! File transfer over plain TCP
//!
//! One connection carries one file. The exchange, as seen on the wire:
//!
//! ```text
//! client                          server
//!   | -- filename ------------------> |
//!   | <------------- FILESIZE:<N> --- |   (or "ERROR: <message>", then close)
//!   | -- READY ---------------------> |
//!   | <------- N payload bytes ------ |   (chunks of at most buffer_size)
//!   | <---------------------- EOF --- |
//! ```
//!
//! - `core`: framing, errors and the served-file store
//! - `server`: accept loop and per-connection workers
//! - `client`: blocking downloader

pub mod client;
pub mod core;
pub mod server;

/// Port both sides use when none is configured.
pub const DEFAULT_PORT: u16 = 9999;
