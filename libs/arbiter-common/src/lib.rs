//! Types, configuration and Redis key scheme shared by every Arbiter binary.

pub mod config;
pub mod redis;
pub mod types;
