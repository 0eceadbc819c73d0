//! Developer probe against a live attendance backend.
//!
//! Signs in with `SPOTIN_EMAIL` / `SPOTIN_PASSWORD` (or reuses the session
//! persisted from a previous run) and exercises the read endpoints:
//!
//! ```text
//! spotin login | history | schedule | stats | signout
//! ```

use std::env;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info};
use tracing_appender::rolling;

use attendance::stats;
use client::error::ApiError;
use client::storage::FileStore;
use client::{ApiClient, SessionStore};
use common::config::Config;

const SESSION_FILE: &str = ".spotin-session.json";

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::init(".env");
    let _log_guard = init_logging(&config.log_file, &config.log_level);

    let command = env::args().nth(1).unwrap_or_else(|| "history".to_owned());

    let sessions = SessionStore::new(Arc::new(FileStore::new(SESSION_FILE)));
    let api = match ApiClient::with_timeout(
        config.api_url.clone(),
        sessions.clone(),
        Duration::from_secs(config.http_timeout_seconds),
    ) {
        Ok(api) => api,
        Err(e) => {
            error!("could not build the HTTP client: {e}");
            return ExitCode::FAILURE;
        }
    };

    if command == "signout" {
        sessions.sign_out().await;
        info!("signed out");
        return ExitCode::SUCCESS;
    }

    match sessions.bootstrap().await {
        Some(session) => info!("restored session for {}", session.user.email),
        None => {
            let (Ok(email), Ok(password)) =
                (env::var("SPOTIN_EMAIL"), env::var("SPOTIN_PASSWORD"))
            else {
                error!("no stored session; set SPOTIN_EMAIL and SPOTIN_PASSWORD to sign in");
                return ExitCode::FAILURE;
            };
            match sessions.sign_in(&api, &email, &password).await {
                Ok(session) => {
                    info!("signed in as {} ({})", session.user.name, session.user.email)
                }
                Err(e) => {
                    error!("sign-in failed: {}", e.user_message());
                    return ExitCode::FAILURE;
                }
            }
        }
    }

    let outcome = match command.as_str() {
        // bootstrap/sign-in above already proved the credentials
        "login" => Ok(()),
        "history" => show_history(&api).await,
        "schedule" => show_schedule(&api).await,
        "stats" => show_stats(&api).await,
        other => {
            error!("unknown command '{other}' (expected login | history | schedule | stats | signout)");
            return ExitCode::FAILURE;
        }
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e.user_message());
            ExitCode::FAILURE
        }
    }
}

fn init_logging(log_file: &str, log_level: &str) -> tracing_appender::non_blocking::WorkerGuard {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let path = Path::new(log_file);
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("logs"));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("spotin.log");
    std::fs::create_dir_all(dir).ok();

    let file_appender = rolling::daily(dir, file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true);

    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .with_target(false);

    let env_filter =
        EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    guard
}

async fn show_history(api: &ApiClient) -> Result<(), ApiError> {
    let items = api.my_attendance().await?;
    for record in &items {
        println!(
            "{}  {:>7.1} m  {:?}/{:?}",
            record.date_key, record.distance_meters, record.result, record.status
        );
    }
    info!("{} attendance records", items.len());
    Ok(())
}

async fn show_schedule(api: &ApiClient) -> Result<(), ApiError> {
    match api.my_schedule().await? {
        Some(schedule) => println!(
            "day {}  {} - {}  (late after {} min)",
            schedule.day_of_week, schedule.start_time, schedule.end_time,
            schedule.late_after_minutes
        ),
        None => println!("no schedule for today"),
    }
    Ok(())
}

async fn show_stats(api: &ApiClient) -> Result<(), ApiError> {
    let items = api.my_attendance().await?;

    let monthly = stats::monthly_stats(&items);
    println!(
        "{}",
        serde_json::to_string_pretty(&monthly).unwrap_or_default()
    );

    let week = stats::weekly_attendance(&items, Utc::now().date_naive());
    for day in week {
        println!("{}  {}", day.date, if day.attended { "present" } else { "-" });
    }

    for badge in stats::earned_achievements(&items) {
        println!("badge: {} ({})", badge.title, badge.detail);
    }
    Ok(())
}
