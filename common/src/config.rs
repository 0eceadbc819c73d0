use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::env;

/// Runtime configuration for the mobile client core, sourced from the
/// environment (optionally seeded from a `.env` file).
///
/// Every field has a working default so the client can run against a local
/// backend with no configuration at all.
#[derive(Debug, Deserialize)]
pub struct Config {
    pub project_name: String,
    pub log_level: String,
    pub log_file: String,
    /// Base URL of the attendance backend, no trailing slash required.
    pub api_url: String,
    /// Whole-request timeout applied to every backend call.
    pub http_timeout_seconds: u64,
    /// How long to wait for a fresh device fix before giving up.
    pub location_timeout_seconds: u64,
    /// Geofence center, WGS84 degrees.
    pub target_latitude: f64,
    pub target_longitude: f64,
    /// Permitted distance from the geofence center. Always > 0.
    pub geofence_radius_meters: f64,
}

static CONFIG: OnceCell<Config> = OnceCell::new();

fn env_parsed<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback)
}

impl Config {
    pub fn init(env_path: &str) -> &'static Self {
        dotenvy::from_filename(env_path).ok();

        CONFIG.get_or_init(|| {
            let project_name =
                env::var("PROJECT_NAME").unwrap_or_else(|_| "spotin-mobile".into());
            let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into());
            let log_file = env::var("LOG_FILE").unwrap_or_else(|_| "logs/spotin.log".into());
            let api_url = env::var("API_URL").unwrap_or_else(|_| "http://localhost:3000".into());
            let http_timeout_seconds = env_parsed("HTTP_TIMEOUT_SECONDS", 10);
            let location_timeout_seconds = env_parsed("LOCATION_TIMEOUT_SECONDS", 5);
            let target_latitude = env_parsed("TARGET_LATITUDE", 6.2442);
            let target_longitude = env_parsed("TARGET_LONGITUDE", -75.5812);

            // The geofence is meaningless with a non-positive radius; a bad
            // override falls back to the default rather than panicking.
            let geofence_radius_meters = env::var("GEOFENCE_RADIUS_METERS")
                .ok()
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|r| *r > 0.0)
                .unwrap_or(100.0);

            Config {
                project_name,
                log_level,
                log_file,
                api_url,
                http_timeout_seconds,
                location_timeout_seconds,
                target_latitude,
                target_longitude,
                geofence_radius_meters,
            }
        })
    }

    pub fn get() -> &'static Self {
        CONFIG.get().expect("Config not initialized")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_env_file() {
        let cfg = Config::init("does-not-exist.env");
        assert!(cfg.geofence_radius_meters > 0.0);
        assert_eq!(cfg.location_timeout_seconds, 5);
        assert!(!cfg.api_url.is_empty());
    }
}
