//! Visitor identity resolution
//!
//! Maps an inbound request's identity marker (a cookie value set by the web
//! layer) to a stable per-visitor [`Identity`]. With cookie-based auth
//! disabled, every request shares one fixed identity.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Identity used when cookie-based auth is disabled
pub const SHARED_IDENTITY: &str = "default";

/// Stable opaque key for one visitor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Wrap an identity value
    #[inline]
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The shared identity used when cookie-based auth is off
    #[inline]
    #[must_use]
    pub fn shared() -> Self {
        Self(SHARED_IDENTITY.to_string())
    }

    /// View as string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Ownership tag applied to this identity's upstream resources
    #[inline]
    #[must_use]
    pub fn tag(&self) -> String {
        format!("user:{}", self.0)
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Instruction to the web layer to set a response marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerDirective {
    /// Marker value to set
    pub value: String,
    /// How long the marker should live
    pub max_age: Duration,
}

/// Result of resolving a request's identity
#[derive(Debug, Clone)]
pub struct ResolvedIdentity {
    /// The request's identity
    pub identity: Identity,
    /// Set when a fresh identity was minted and must be persisted client-side
    pub set_marker: Option<MarkerDirective>,
}

/// Resolves inbound markers to identities
///
/// Never fails: a malformed marker is treated as absent and a fresh identity
/// is minted in its place.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    cookie_auth_enabled: bool,
    marker_max_age: Duration,
}

impl IdentityResolver {
    /// Create a resolver
    #[inline]
    #[must_use]
    pub fn new(cookie_auth_enabled: bool, marker_max_age: Duration) -> Self {
        Self {
            cookie_auth_enabled,
            marker_max_age,
        }
    }

    /// Resolve a request's identity from its marker, if any
    #[must_use]
    pub fn resolve(&self, marker: Option<&str>) -> ResolvedIdentity {
        if !self.cookie_auth_enabled {
            return ResolvedIdentity {
                identity: Identity::shared(),
                set_marker: None,
            };
        }

        if let Some(raw) = marker {
            if let Ok(parsed) = Uuid::parse_str(raw.trim()) {
                return ResolvedIdentity {
                    identity: Identity::new(parsed.to_string()),
                    set_marker: None,
                };
            }
            tracing::debug!("malformed identity marker, minting a fresh identity");
        }

        let fresh = Uuid::new_v4().to_string();
        ResolvedIdentity {
            identity: Identity::new(fresh.clone()),
            set_marker: Some(MarkerDirective {
                value: fresh,
                max_age: self.marker_max_age,
            }),
        }
    }
}
