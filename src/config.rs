// src/config.rs

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use dotenvy::dotenv;

use crate::session::{
    integrity::IntegrityPolicy,
    policy::{RetryPolicy, SessionPolicy},
    scoring::ScoringPolicy,
};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub rust_log: String,
    pub bind_addr: SocketAddr,
    pub policy: SessionPolicy,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let bind_addr = env_or("BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)));

        Self {
            database_url,
            jwt_secret,
            rust_log,
            bind_addr,
            policy: policy_from_env(),
        }
    }
}

/// Reads the `EXAM_*` variables on top of the default policy.
pub fn policy_from_env() -> SessionPolicy {
    let defaults = SessionPolicy::default();

    let scale_to = env::var("EXAM_SCALE_TO")
        .ok()
        .and_then(|raw| parse_or_warn::<f64>("EXAM_SCALE_TO", &raw));

    SessionPolicy {
        duration: Duration::from_secs(env_or(
            "EXAM_DURATION_SECS",
            defaults.duration.as_secs(),
        )),
        tick_interval: defaults.tick_interval,
        scoring: ScoringPolicy {
            point_value: env_or("EXAM_POINT_VALUE", defaults.scoring.point_value),
            scale_to,
        },
        integrity: IntegrityPolicy {
            threshold: env_or("EXAM_CHEATING_THRESHOLD", defaults.integrity.threshold),
            cooldown: Duration::from_millis(env_or(
                "EXAM_CHEATING_COOLDOWN_MS",
                defaults.integrity.cooldown.as_millis() as u64,
            )),
            poll_interval: Duration::from_millis(env_or(
                "EXAM_VISIBILITY_POLL_MS",
                defaults.integrity.poll_interval.as_millis() as u64,
            )),
            events_available: env_or(
                "EXAM_VISIBILITY_EVENTS",
                defaults.integrity.events_available,
            ),
        },
        retry: RetryPolicy {
            max_attempts: env_or("EXAM_SAVE_MAX_ATTEMPTS", defaults.retry.max_attempts),
            initial_backoff: Duration::from_millis(env_or(
                "EXAM_SAVE_BACKOFF_MS",
                defaults.retry.initial_backoff.as_millis() as u64,
            )),
            max_backoff: defaults.retry.max_backoff,
        },
        completed_retention: Duration::from_secs(env_or(
            "EXAM_COMPLETED_RETENTION_SECS",
            defaults.completed_retention.as_secs(),
        )),
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|raw| parse_or_warn(key, &raw))
        .unwrap_or(default)
}

fn parse_or_warn<T: FromStr>(key: &str, raw: &str) -> Option<T> {
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring invalid {}={:?}, using default", key, raw);
            None
        }
    }
}
