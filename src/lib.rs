//! Run-history dashboard for longitudinal CI metrics.
//!
//! Loads a history CSV from the first reachable candidate, picks the newest
//! run per scenario, triages each one and renders tiles plus tables as a
//! static page, a live server page, or a terminal summary.

pub mod aggregate;
pub mod classify;
pub mod config;
pub mod data;
pub mod error;
pub mod logging;
pub mod refresh;
pub mod render;
pub mod server;
pub mod source;
