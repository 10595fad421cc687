use std::env;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub yard_queue_size: usize,
    pub event_buffer_size: usize,
    pub driver_freshness_minutes: i64,
    pub max_gps_batch: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
            yard_queue_size: 1024,
            event_buffer_size: 1024,
            driver_freshness_minutes: 30,
            max_gps_batch: 500,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format: parse_log_format(env::var("LOG_FORMAT").ok().as_deref())?,
            yard_queue_size: parse_or_default("YARD_QUEUE_SIZE", defaults.yard_queue_size)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", defaults.event_buffer_size)?,
            driver_freshness_minutes: parse_or_default(
                "DRIVER_FRESHNESS_MINUTES",
                defaults.driver_freshness_minutes,
            )?,
            max_gps_batch: parse_or_default("MAX_GPS_BATCH", defaults.max_gps_batch)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.yard_queue_size == 0 || self.event_buffer_size == 0 {
            return Err(AppError::Internal(
                "YARD_QUEUE_SIZE and EVENT_BUFFER_SIZE must be > 0".to_string(),
            ));
        }
        if self.driver_freshness_minutes <= 0 {
            return Err(AppError::Internal(
                "DRIVER_FRESHNESS_MINUTES must be > 0".to_string(),
            ));
        }
        if self.max_gps_batch == 0 {
            return Err(AppError::Internal("MAX_GPS_BATCH must be > 0".to_string()));
        }
        Ok(())
    }
}

fn parse_log_format(raw: Option<&str>) -> Result<LogFormat, AppError> {
    match raw.map(|value| value.trim().to_ascii_lowercase()) {
        None => Ok(LogFormat::Compact),
        Some(value) if value.is_empty() || value == "compact" => Ok(LogFormat::Compact),
        Some(value) if value == "json" => Ok(LogFormat::Json),
        Some(other) => Err(AppError::Internal(format!(
            "invalid LOG_FORMAT: {other}, expected compact or json"
        ))),
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
