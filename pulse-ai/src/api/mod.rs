//! HTTP API handlers for pulse-ai
//!
//! REST + SSE. Handlers under `/api` receive the caller as
//! `Extension<AuthenticatedUser>` from [`auth::require_auth`].

pub mod ai;
pub mod auth;
pub mod configuration;
pub mod health;
pub mod scoring;

pub use ai::ai_routes;
pub use configuration::configuration_routes;
pub use health::health_routes;
pub use scoring::scoring_routes;
