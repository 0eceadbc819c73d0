pub mod api;
pub mod error;
pub mod session;
pub mod storage;
pub mod types;

pub use api::{ApiClient, AttendanceApi};
pub use error::ApiError;
pub use session::{Session, SessionStore};
