//! Database access for pulse-ai
//!
//! Tables live in the shared schema created by `pulse_common::db`.

pub mod operations;
