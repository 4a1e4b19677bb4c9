//! # Pulse Common Library
//!
//! Shared code for Pulse services:
//! - Error taxonomy
//! - Scoring engine (difficulty, ROI, priority)
//! - Domain models (issues, initiatives)
//! - AI operation vocabulary and event types (PulseEvent, EventBus)
//! - Configuration governance (validator, versioned store)
//! - Authentication primitives and session storage
//! - Bootstrap configuration loading

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod models;
pub mod operations;
pub mod scoring;
pub mod settings;

pub use error::{Error, Result};
