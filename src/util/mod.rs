//! Small utilities shared across the server

pub mod rate_limit;
pub mod time;
