//! Utility modules

pub mod redact;
