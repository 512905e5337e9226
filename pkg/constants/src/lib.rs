//! Centralized constants for the quota admission control plane.
//!
//! All project-wide constant values live here.
//! Change a value in one place and it applies everywhere.

pub mod quota;
pub mod server;
pub mod state;
