//! URL handling module for Harvester
//!
//! Politeness state is keyed by host (plus explicit port), and robots.txt
//! lives at the root of that same origin.

mod host;

pub use host::{host_key, host_key_lossy, robots_url};
