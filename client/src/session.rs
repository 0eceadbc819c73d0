//! The single owner of authentication state for the process lifetime.
//!
//! `SessionStore` is a cheap-clone handle (the inner state is shared), built
//! around one rule: the in-memory session and the persisted copy move
//! together, and every read of the token goes through here. Remote
//! invalidation (a 401 anywhere) funnels into [`SessionStore::invalidate`],
//! which notifies subscribers so UI layers can redirect without the transport
//! layer knowing about navigation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, warn};
use validator::Validate;

use common::format_validation_errors;

use crate::api::ApiClient;
use crate::error::{ApiError, GENERIC_NETWORK_MESSAGE};
use crate::storage::SecureStore;
use crate::types::{LoginRequest, User};

/// Persisted-store key holding the raw bearer token.
pub const AUTH_TOKEN_KEY: &str = "auth_token";
/// Persisted-store key holding the JSON-serialized user record.
pub const USER_SESSION_KEY: &str = "user_session";

const INVALIDATED_CHANNEL_CAPACITY: usize = 8;

/// A signed-in user plus the bearer token proving it.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user: User,
}

#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

struct Inner {
    current: RwLock<Option<Session>>,
    store: Arc<dyn SecureStore>,
    invalidated: broadcast::Sender<()>,
    /// Bumped on every clear (sign-out or remote invalidation). A sign-in
    /// that started under an older epoch must not commit its result.
    epoch: AtomicU64,
}

impl SessionStore {
    pub fn new(store: Arc<dyn SecureStore>) -> Self {
        let (invalidated, _) = broadcast::channel(INVALIDATED_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                current: RwLock::new(None),
                store,
                invalidated,
                epoch: AtomicU64::new(0),
            }),
        }
    }

    /// Restores a persisted session at process start.
    ///
    /// Both keys must be present and the user record must parse; anything
    /// less is treated as "no session" and logged, never surfaced as an
    /// error.
    pub async fn bootstrap(&self) -> Option<Session> {
        let token = self.read_key(AUTH_TOKEN_KEY).await;
        let user_json = self.read_key(USER_SESSION_KEY).await;

        let (Some(token), Some(user_json)) = (token, user_json) else {
            debug!("no complete persisted session; starting signed out");
            return None;
        };

        let user: User = match serde_json::from_str(&user_json) {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "persisted user record did not parse; starting signed out");
                return None;
            }
        };

        let session = Session { token, user };
        *self.inner.current.write().await = Some(session.clone());
        debug!(user = %session.user.email, "session restored from secure store");
        Some(session)
    }

    /// Authenticates against the backend and installs the resulting session.
    ///
    /// On any failure the previous state (memory and persisted) is left
    /// untouched. A sign-out or remote invalidation that lands while the
    /// login call is in flight wins: the late result is discarded.
    pub async fn sign_in(
        &self,
        api: &ApiClient,
        email: &str,
        password: &str,
    ) -> Result<Session, ApiError> {
        let request = LoginRequest {
            email: email.trim().to_owned(),
            password: password.to_owned(),
        };
        if let Err(errors) = request.validate() {
            return Err(ApiError::Authentication {
                message: format_validation_errors(&errors),
            });
        }

        let epoch = self.epoch();
        let response = match api.login(&request).await {
            Ok(response) => response,
            Err(ApiError::Transport(e)) => {
                warn!(error = %e, "login request never reached the backend");
                return Err(ApiError::Authentication {
                    message: GENERIC_NETWORK_MESSAGE.to_owned(),
                });
            }
            Err(other) => return Err(other),
        };

        if self.epoch() != epoch {
            warn!("session was invalidated while signing in; discarding the late result");
            return Err(ApiError::Authentication {
                message: "Session expired during sign-in, please try again".to_owned(),
            });
        }

        // Persist first, then install in memory. Both keys or neither.
        let user_json = serde_json::to_string(&response.user).map_err(|e| {
            ApiError::Authentication {
                message: format!("Could not persist the session: {e}"),
            }
        })?;
        self.write_key(AUTH_TOKEN_KEY, &response.token).await?;
        if let Err(e) = self.write_key(USER_SESSION_KEY, &user_json).await {
            let _ = self.inner.store.remove(AUTH_TOKEN_KEY).await;
            return Err(e);
        }

        // An invalidation may have raced the persist; it must win.
        if self.epoch() != epoch {
            warn!("session was invalidated while persisting sign-in; rolling back");
            let _ = self.inner.store.remove(AUTH_TOKEN_KEY).await;
            let _ = self.inner.store.remove(USER_SESSION_KEY).await;
            return Err(ApiError::Authentication {
                message: "Session expired during sign-in, please try again".to_owned(),
            });
        }

        let session = Session {
            token: response.token,
            user: response.user,
        };
        *self.inner.current.write().await = Some(session.clone());
        debug!(user = %session.user.email, "signed in");
        Ok(session)
    }

    /// Clears both layers. Idempotent; store failures are logged, never
    /// returned.
    pub async fn sign_out(&self) {
        self.bump_epoch();
        self.clear().await;
        debug!("signed out");
    }

    /// Remote-invalidation path: same clearing as [`Self::sign_out`], plus a
    /// notification to every subscriber. Called by the API gateway on a 401;
    /// never calls the network itself.
    pub async fn invalidate(&self) {
        self.bump_epoch();
        self.clear().await;
        let _ = self.inner.invalidated.send(());
        debug!("session invalidated remotely");
    }

    /// Registers an observer for remote invalidation. UI layers use this to
    /// redirect to the login screen.
    pub fn subscribe_invalidated(&self) -> broadcast::Receiver<()> {
        self.inner.invalidated.subscribe()
    }

    pub async fn session(&self) -> Option<Session> {
        self.inner.current.read().await.clone()
    }

    /// The bearer token to attach to authenticated requests, if any.
    pub async fn token(&self) -> Option<String> {
        self.inner
            .current
            .read()
            .await
            .as_ref()
            .map(|s| s.token.clone())
    }

    async fn clear(&self) {
        *self.inner.current.write().await = None;
        for key in [AUTH_TOKEN_KEY, USER_SESSION_KEY] {
            if let Err(e) = self.inner.store.remove(key).await {
                warn!(key, error = %e, "could not clear persisted session key");
            }
        }
    }

    async fn read_key(&self, key: &str) -> Option<String> {
        match self.inner.store.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "secure store read failed; treating as absent");
                None
            }
        }
    }

    async fn write_key(&self, key: &str, value: &str) -> Result<(), ApiError> {
        self.inner.store.set(key, value).await.map_err(|e| {
            warn!(key, error = %e, "secure store write failed");
            ApiError::Authentication {
                message: "Could not persist the session".to_owned(),
            }
        })
    }

    fn epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::SeqCst)
    }

    fn bump_epoch(&self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
    }
}
