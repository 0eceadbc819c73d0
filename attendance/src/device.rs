//! Capability interfaces over the device hardware the marking flow touches.
//! The mobile shells provide the real implementations; tests provide stubs.

use async_trait::async_trait;
use thiserror::Error;

use crate::geo::Coordinate;

#[derive(Debug, Clone, Error)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("location provider unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// The platform's cached fix, if it has one. Cheap, possibly stale.
    async fn last_known(&self) -> Option<Coordinate>;

    /// A fresh fix. May take several seconds; the gate applies its own
    /// timeout on top.
    async fn current(&self) -> Result<Coordinate, LocationError>;
}

#[async_trait]
pub trait BiometricPrompt: Send + Sync {
    /// Shows the platform biometric prompt. `false` covers both a failed
    /// match and a user dismissal; neither is an error.
    async fn confirm(&self, message: &str) -> bool;
}
