//! Host-side plumbing for the pixlink viewer binary.

pub mod config;
pub mod sink;
