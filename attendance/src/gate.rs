//! The attendance-eligibility gate.
//!
//! One gate instance owns one marking flow: capture a QR token, verify the
//! device is inside the geofence, optionally confirm identity, then issue
//! exactly one mark-attendance call. The two verification steps are
//! order-independent; both must hold before a submission is possible, and
//! the state is a tagged enum so a submission without both is
//! unrepresentable. A gate that reached [`GateState::Done`] is finished:
//! construct a new one for the next flow.

use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use client::api::AttendanceApi;
use client::error::ApiError;
use client::types::Attendance;

use crate::device::{BiometricPrompt, LocationProvider};
use crate::geo::{self, Coordinate, GeofenceTarget};

const DEFAULT_LOCATION_TIMEOUT: Duration = Duration::from_secs(5);
const BIOMETRIC_MESSAGE: &str = "Confirm your identity to mark attendance";

#[derive(Debug, Error)]
pub enum GateError {
    /// The QR payload was empty or unusable. Never reaches the backend.
    #[error("QR payload is empty or malformed")]
    InvalidScan,

    /// Permission denied, provider failure, or no fix inside the timeout.
    /// The user may retry manually; nothing is retried automatically.
    #[error("could not verify location: {0}")]
    LocationUnavailable(String),

    /// The user failed or dismissed the biometric prompt. A quiet abort,
    /// not something to alert on.
    #[error("identity confirmation was declined")]
    BiometricDeclined,

    /// The gate was driven out of order. A wiring bug in the caller, not a
    /// backend condition; log it, don't alert.
    #[error("{0}")]
    Precondition(&'static str),

    /// The mark-attendance call itself failed.
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Opaque capability decoded from the QR code, forwarded verbatim. The
/// backend owns freshness and single-use; locally only non-emptiness holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanToken(String);

impl ScanToken {
    pub fn parse(raw: &str) -> Result<Self, GateError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(GateError::InvalidScan);
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A device fix that passed the geofence check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerifiedPosition {
    pub coordinate: Coordinate,
    pub distance_meters: f64,
}

/// Outcome of one location measurement, whether or not it verified.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationCheck {
    pub coordinate: Coordinate,
    pub distance_meters: f64,
    pub verified: bool,
}

#[derive(Debug, Clone)]
pub enum GateState {
    Idle,
    QrCaptured {
        token: ScanToken,
    },
    LocationVerified {
        position: VerifiedPosition,
    },
    Ready {
        token: ScanToken,
        position: VerifiedPosition,
    },
    Submitting {
        token: ScanToken,
        position: VerifiedPosition,
    },
    Done {
        record: Attendance,
    },
    /// A submission failed. Token and position are retained so `submit()`
    /// may be retried without redoing the earlier steps.
    Failed {
        token: ScanToken,
        position: VerifiedPosition,
        message: String,
    },
}

pub struct AttendanceGate<A> {
    api: A,
    target: GeofenceTarget,
    location_timeout: Duration,
    state: GateState,
    last_distance_meters: Option<f64>,
}

impl<A: AttendanceApi> AttendanceGate<A> {
    pub fn new(api: A, target: GeofenceTarget) -> Self {
        Self {
            api,
            target,
            location_timeout: DEFAULT_LOCATION_TIMEOUT,
            state: GateState::Idle,
            last_distance_meters: None,
        }
    }

    /// Overrides the fresh-fix timeout (default 5 s).
    pub fn with_location_timeout(mut self, timeout: Duration) -> Self {
        self.location_timeout = timeout;
        self
    }

    /// Builds a gate against the configured geofence and location timeout.
    pub fn from_config(api: A) -> Self {
        let cfg = common::config::Config::get();
        Self::new(api, GeofenceTarget::from_config())
            .with_location_timeout(Duration::from_secs(cfg.location_timeout_seconds))
    }

    /// Feeds a raw QR payload into the gate.
    ///
    /// A scan that arrives while a submission is in flight is dropped, not
    /// queued. Re-scanning before submission replaces the held token.
    pub fn scan(&mut self, payload: &str) -> Result<(), GateError> {
        match &self.state {
            GateState::Submitting { .. } => {
                debug!("QR scanned while a submission is in flight; ignoring");
                return Ok(());
            }
            GateState::Done { .. } => {
                return Err(GateError::Precondition(
                    "attendance was already marked in this flow",
                ));
            }
            _ => {}
        }

        let token = ScanToken::parse(payload)?;
        self.state = match std::mem::replace(&mut self.state, GateState::Idle) {
            GateState::LocationVerified { position }
            | GateState::Ready { position, .. }
            | GateState::Failed { position, .. } => GateState::Ready { token, position },
            _ => GateState::QrCaptured { token },
        };
        debug!("QR token captured");
        Ok(())
    }

    /// Measures the device position against the geofence.
    ///
    /// Two tiers: the platform's cached fix is accepted when it already sits
    /// inside the geofence; otherwise a fresh fix is requested under the
    /// configured timeout. The measured distance is recorded either way so
    /// the UI can show "Xm away" even when verification fails.
    pub async fn check_location(
        &mut self,
        provider: &dyn LocationProvider,
    ) -> Result<LocationCheck, GateError> {
        match &self.state {
            GateState::Submitting { .. } => {
                return Err(GateError::Precondition("a submission is in flight"));
            }
            GateState::Done { .. } => {
                return Err(GateError::Precondition(
                    "attendance was already marked in this flow",
                ));
            }
            _ => {}
        }

        let coordinate = self.acquire(provider).await?;
        let distance = geo::distance_meters(coordinate, self.target.center);
        self.last_distance_meters = Some(distance);
        let verified = self.target.contains(distance);

        if verified {
            let position = VerifiedPosition {
                coordinate,
                distance_meters: distance,
            };
            self.state = match std::mem::replace(&mut self.state, GateState::Idle) {
                GateState::QrCaptured { token } | GateState::Ready { token, .. } => {
                    GateState::Ready { token, position }
                }
                GateState::Failed { token, message, .. } => GateState::Failed {
                    token,
                    position,
                    message,
                },
                _ => GateState::LocationVerified { position },
            };
            info!(distance_m = distance, "location verified inside the geofence");
        } else {
            warn!(
                distance_m = distance,
                radius_m = self.target.radius_meters,
                "device is outside the permitted radius"
            );
        }

        Ok(LocationCheck {
            coordinate,
            distance_meters: distance,
            verified,
        })
    }

    /// Issues the mark-attendance call.
    ///
    /// Valid only once both steps verified (or after a failed submission,
    /// as a retry). When a biometric prompt is supplied and declined, the
    /// gate aborts before any backend call. Success is terminal.
    pub async fn submit(
        &mut self,
        biometric: Option<&dyn BiometricPrompt>,
    ) -> Result<Attendance, GateError> {
        let (token, position) = match std::mem::replace(&mut self.state, GateState::Idle) {
            GateState::Ready { token, position }
            | GateState::Failed {
                token, position, ..
            } => (token, position),
            other => {
                let reason = match &other {
                    GateState::Submitting { .. } => "a submission is already in flight",
                    GateState::Done { .. } => "attendance was already marked in this flow",
                    _ => "QR scan and location verification must both succeed before submitting",
                };
                self.state = other;
                return Err(GateError::Precondition(reason));
            }
        };
        self.state = GateState::Submitting {
            token: token.clone(),
            position,
        };

        if let Some(prompt) = biometric {
            if !prompt.confirm(BIOMETRIC_MESSAGE).await {
                info!("biometric confirmation declined; no backend call issued");
                self.state = GateState::Ready { token, position };
                return Err(GateError::BiometricDeclined);
            }
        }

        let result = self
            .api
            .mark_attendance(
                token.as_str(),
                position.coordinate.latitude,
                position.coordinate.longitude,
            )
            .await;

        match result {
            Ok(record) => {
                info!(result = ?record.result, "attendance recorded");
                self.state = GateState::Done {
                    record: record.clone(),
                };
                Ok(record)
            }
            Err(e) => {
                warn!(error = %e, "mark-attendance call failed");
                self.state = GateState::Failed {
                    token,
                    position,
                    message: e.user_message(),
                };
                Err(GateError::Api(e))
            }
        }
    }

    /// Drops the held token, keeping the verified position. For when the
    /// backend reported the token itself invalid and a fresh scan is needed.
    pub fn clear_scan(&mut self) {
        self.state = match std::mem::replace(&mut self.state, GateState::Idle) {
            GateState::QrCaptured { .. } => GateState::Idle,
            GateState::Ready { position, .. } | GateState::Failed { position, .. } => {
                GateState::LocationVerified { position }
            }
            other => other,
        };
    }

    /// Returns the gate to its initial state (explicit cancel).
    pub fn reset(&mut self) {
        self.state = GateState::Idle;
        self.last_distance_meters = None;
    }

    pub fn state(&self) -> &GateState {
        &self.state
    }

    /// Distance measured by the most recent location check, verified or not.
    pub fn last_distance_meters(&self) -> Option<f64> {
        self.last_distance_meters
    }

    pub fn is_submitting(&self) -> bool {
        matches!(self.state, GateState::Submitting { .. })
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, GateState::Ready { .. })
    }

    async fn acquire(&self, provider: &dyn LocationProvider) -> Result<Coordinate, GateError> {
        if let Some(cached) = provider.last_known().await {
            let distance = geo::distance_meters(cached, self.target.center);
            if self.target.contains(distance) {
                debug!(distance_m = distance, "cached fix already inside the geofence");
                return Ok(cached);
            }
            debug!(
                distance_m = distance,
                "cached fix outside the geofence; requesting a fresh one"
            );
        }

        match timeout(self.location_timeout, provider.current()).await {
            Ok(Ok(coordinate)) => Ok(coordinate),
            Ok(Err(e)) => Err(GateError::LocationUnavailable(e.to_string())),
            Err(_) => Err(GateError::LocationUnavailable(format!(
                "no fix within {} seconds",
                self.location_timeout.as_secs()
            ))),
        }
    }

    #[cfg(test)]
    fn force_state(&mut self, state: GateState) {
        self.state = state;
    }
}
