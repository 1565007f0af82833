//! # e4link — E4 bridge session driver
//!
//! Connects to a running streaming bridge, attaches a wristband,
//! subscribes its streams, records for a fixed duration and writes the
//! readings to disk.
//!
//! Settings come from a TOML file ([`config::E4Config`]); command-line
//! flags override individual values.

pub mod config;
pub mod session;
