//! Authentication primitives shared by Pulse services
//!
//! # Architecture
//!
//! - Clients authenticate with an opaque bearer token issued at login
//! - Only the SHA-256 hash of a token is stored (`api_sessions.token_hash`)
//! - A resolved session becomes an `AuthenticatedUser`, which HTTP
//!   middleware hands to handlers explicitly
//!
//! This module contains only pure functions and types. Session storage lives
//! in `db::sessions`; HTTP wiring lives in each service.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Role hierarchy: `Viewer < Member < Admin`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Read-only access to dashboards and operation status
    Viewer,
    /// Can submit issues and queue AI operations
    Member,
    /// Can change system configuration and act on any user's operations
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Member => "member",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "viewer" => Ok(Role::Viewer),
            "member" => Ok(Role::Member),
            "admin" => Ok(Role::Admin),
            other => Err(crate::Error::InvalidInput(format!("unknown role: {}", other))),
        }
    }
}

/// Caller identity resolved once per request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub display_name: String,
    pub role: Role,
}

impl AuthenticatedUser {
    /// Whether this user's role is at least `required`
    pub fn has_role(&self, required: Role) -> bool {
        self.role >= required
    }

    /// `Err(Forbidden)` unless the role is at least `required`
    pub fn require(&self, required: Role) -> crate::Result<()> {
        if self.has_role(required) {
            Ok(())
        } else {
            Err(crate::Error::Forbidden(format!(
                "{} role required (caller is {})",
                required, self.role
            )))
        }
    }

    /// Owner of a resource, or an admin
    pub fn can_act_for(&self, owner_id: Uuid) -> bool {
        self.user_id == owner_id || self.has_role(Role::Admin)
    }
}

/// Generate a fresh 256-bit token, hex encoded
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// SHA-256 of a token, hex encoded (what the database stores)
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn parse_bearer(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
