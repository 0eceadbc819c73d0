//! The single chokepoint for backend requests.
//!
//! Every call reads the current bearer token from the [`SessionStore`] and
//! attaches it when present. Every response passes through one translation
//! point: a 401 off the login path clears the session (and notifies its
//! subscribers) before the error reaches the caller; a 403 is surfaced
//! untouched, because a permission denial says nothing about the session.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ApiError, GENERIC_BACKEND_MESSAGE};
use crate::session::SessionStore;
use crate::types::{
    Attendance, AttendanceListResponse, LoginRequest, LoginResponse, MarkAttendanceRequest,
    MarkAttendanceResponse, ProfileResponse, Schedule, ScheduleResponse, User,
};

pub const LOGIN_PATH: &str = "/api/auth/login";
pub const MARK_ATTENDANCE_PATH: &str = "/api/mobile/attendance/mark";
pub const MY_ATTENDANCE_PATH: &str = "/api/mobile/attendance/mine";
pub const MY_SCHEDULE_PATH: &str = "/api/mobile/me/schedule";
pub const MY_PROFILE_PATH: &str = "/api/mobile/me";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const LOGIN_FALLBACK_MESSAGE: &str = "Invalid email or password";

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    session: SessionStore,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, session: SessionStore) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, session, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        session: SessionStore,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let http = Client::builder().timeout(timeout).build()?;
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self {
            http,
            base_url,
            session,
        })
    }

    /// POST /api/auth/login. Unauthenticated; any rejection becomes an
    /// [`ApiError::Authentication`] and never touches stored session state.
    pub async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, ApiError> {
        let response = self
            .http
            .post(self.url(LOGIN_PATH))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        debug!(status = status.as_u16(), "login rejected by the backend");
        let message = Self::error_message(response)
            .await
            .unwrap_or_else(|| LOGIN_FALLBACK_MESSAGE.to_owned());
        Err(ApiError::Authentication { message })
    }

    /// POST /api/mobile/attendance/mark.
    pub async fn mark_attendance(
        &self,
        qr_token: &str,
        lat: f64,
        lng: f64,
    ) -> Result<Attendance, ApiError> {
        let body = MarkAttendanceRequest {
            qr_token: qr_token.to_owned(),
            lat,
            lng,
        };
        let response: MarkAttendanceResponse =
            self.post_json(MARK_ATTENDANCE_PATH, &body).await?;
        Ok(response.attendance)
    }

    /// GET /api/mobile/attendance/mine, newest first.
    pub async fn my_attendance(&self) -> Result<Vec<Attendance>, ApiError> {
        let response: AttendanceListResponse = self.get_json(MY_ATTENDANCE_PATH).await?;
        Ok(response.items)
    }

    /// GET /api/mobile/me/schedule. `None` when no schedule applies today.
    pub async fn my_schedule(&self) -> Result<Option<Schedule>, ApiError> {
        let response: ScheduleResponse = self.get_json(MY_SCHEDULE_PATH).await?;
        Ok(response.schedule)
    }

    /// GET /api/mobile/me.
    pub async fn my_profile(&self) -> Result<User, ApiError> {
        let response: ProfileResponse = self.get_json(MY_PROFILE_PATH).await?;
        Ok(response.user)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let mut request = self.http.get(self.url(path));
        if let Some(token) = self.session.token().await {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        self.read_json(path, response).await
    }

    async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let mut request = self.http.post(self.url(path)).json(body);
        if let Some(token) = self.session.token().await {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        self.read_json(path, response).await
    }

    async fn read_json<T: DeserializeOwned>(
        &self,
        path: &str,
        response: Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let message = Self::error_message(response)
            .await
            .unwrap_or_else(|| GENERIC_BACKEND_MESSAGE.to_owned());

        if status == StatusCode::UNAUTHORIZED {
            warn!(path, "bearer token rejected; clearing the session");
            self.session.invalidate().await;
        }

        Err(ApiError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// Pulls the backend's `{"message": ...}` out of an error body, if any.
    async fn error_message(response: Response) -> Option<String> {
        let value: serde_json::Value = response.json().await.ok()?;
        value.get("message")?.as_str().map(str::to_owned)
    }
}

/// The one backend call the marking flow needs. A seam so the eligibility
/// gate can be exercised against a stub backend in tests.
#[async_trait]
pub trait AttendanceApi: Send + Sync {
    async fn mark_attendance(
        &self,
        qr_token: &str,
        lat: f64,
        lng: f64,
    ) -> Result<Attendance, ApiError>;
}

#[async_trait]
impl AttendanceApi for ApiClient {
    async fn mark_attendance(
        &self,
        qr_token: &str,
        lat: f64,
        lng: f64,
    ) -> Result<Attendance, ApiError> {
        ApiClient::mark_attendance(self, qr_token, lat, lng).await
    }
}

#[async_trait]
impl<T: AttendanceApi + ?Sized> AttendanceApi for Arc<T> {
    async fn mark_attendance(
        &self,
        qr_token: &str,
        lat: f64,
        lng: f64,
    ) -> Result<Attendance, ApiError> {
        (**self).mark_attendance(qr_token, lat, lng).await
    }
}
