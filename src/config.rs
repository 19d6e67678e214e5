//! Engine configuration loaded from environment variables.
//!
//! Everything is validated here, at startup. A malformed encryption
//! key or slot window aborts the process before any job runs; nothing
//! is deferred to first use.

use crate::models::{Provider, ReminderSlot};
use crate::services::crypto::{EncryptionKey, KEY_SIZE};
use chrono::NaiveTime;
use chrono_tz::Tz;
use std::collections::HashMap;
use std::env;
use std::time::Duration;

/// Engine configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Field encryption key (32 bytes, hex-encoded in the environment).
    pub encryption_key: EncryptionKey,
    /// Fallback timezone when a user's stored timezone is missing or bad.
    pub default_timezone: Tz,

    /// Margin before token expiry during which refresh is attempted.
    pub refresh_ahead: chrono::Duration,
    /// A connection is due for sync when last_synced_at is older than this.
    pub sync_interval: chrono::Duration,

    /// Local-time send windows per reminder slot.
    pub slot_windows: SlotWindows,

    /// Outbound call cap per provider.
    pub provider_concurrency: HashMap<Provider, usize>,
    /// Window for each job's first-fire jitter.
    pub scheduler_jitter: Duration,
    /// Recurring cadence per job.
    pub token_tick: Duration,
    pub sync_tick: Duration,
    pub reminder_tick: Duration,
    /// Grace period for in-flight work during shutdown.
    pub shutdown_timeout: Duration,

    /// OAuth + API settings per provider.
    pub providers: HashMap<Provider, ProviderSettings>,
    /// SMS transport settings.
    pub sms: SmsSettings,
    /// Daily-log collaborator (read-only habit completion flags).
    pub daily_log: DailyLogSettings,
}

/// Per-provider OAuth and API endpoint settings.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
}

/// SMS transport settings.
#[derive(Debug, Clone)]
pub struct SmsSettings {
    pub api_url: String,
    pub api_token: String,
    pub from_number: String,
}

/// Daily-log collaborator settings.
#[derive(Debug, Clone)]
pub struct DailyLogSettings {
    pub api_url: String,
    pub api_token: String,
}

/// Local-time `[start, end)` windows for the three reminder slots.
#[derive(Debug, Clone)]
pub struct SlotWindows {
    pub morning: (NaiveTime, NaiveTime),
    pub afternoon: (NaiveTime, NaiveTime),
    pub evening: (NaiveTime, NaiveTime),
}

impl SlotWindows {
    /// The slot whose window contains `time`, if any.
    pub fn slot_at(&self, time: NaiveTime) -> Option<ReminderSlot> {
        let windows = [
            (ReminderSlot::Morning, self.morning),
            (ReminderSlot::Afternoon, self.afternoon),
            (ReminderSlot::Evening, self.evening),
        ];
        windows
            .into_iter()
            .find(|(_, (start, end))| time >= *start && time < *end)
            .map(|(slot, _)| slot)
    }
}

impl Config {
    /// Load configuration from environment variables, failing fast on
    /// any missing or malformed value.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let key_hex =
            env::var("WELLSYNC_ENCRYPTION_KEY").map_err(|_| ConfigError::Missing("WELLSYNC_ENCRYPTION_KEY"))?;
        let key_bytes = hex::decode(key_hex.trim()).map_err(|e| ConfigError::Invalid {
            key: "WELLSYNC_ENCRYPTION_KEY",
            reason: format!("not valid hex: {}", e),
        })?;
        let encryption_key =
            EncryptionKey::from_bytes(&key_bytes).map_err(|_| ConfigError::Invalid {
                key: "WELLSYNC_ENCRYPTION_KEY",
                reason: format!("expected {} bytes, got {}", KEY_SIZE, key_bytes.len()),
            })?;

        let default_timezone: Tz = env::var("DEFAULT_TIMEZONE")
            .unwrap_or_else(|_| "UTC".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid {
                key: "DEFAULT_TIMEZONE",
                reason: "not an IANA timezone name".to_string(),
            })?;

        let mut provider_concurrency = HashMap::new();
        let default_cap = env_usize("PROVIDER_CONCURRENCY", 4)?;
        for provider in Provider::ALL {
            // Per-provider override, e.g. FITBIT_CONCURRENCY=8.
            let key = format!("{}_CONCURRENCY", provider.as_str().to_uppercase());
            let cap = match env::var(&key) {
                Ok(v) => v.parse().map_err(|_| ConfigError::Invalid {
                    key: "PROVIDER_CONCURRENCY",
                    reason: format!("{} is not a positive integer", key),
                })?,
                Err(_) => default_cap,
            };
            provider_concurrency.insert(provider, cap);
        }

        let mut providers = HashMap::new();
        for provider in Provider::ALL {
            let upper = provider.as_str().to_uppercase();
            providers.insert(provider, ProviderSettings {
                base_url: env::var(format!("{}_API_BASE", upper))
                    .unwrap_or_else(|_| default_base_url(provider).to_string()),
                client_id: env::var(format!("{}_CLIENT_ID", upper))
                    .map_err(|_| ConfigError::Missing("provider client id"))?,
                client_secret: env::var(format!("{}_CLIENT_SECRET", upper))
                    .map(|v| v.trim().to_string())
                    .map_err(|_| ConfigError::Missing("provider client secret"))?,
            });
        }

        Ok(Self {
            encryption_key,
            default_timezone,
            refresh_ahead: chrono::Duration::seconds(env_i64("TOKEN_REFRESH_AHEAD_SECS", 600)?),
            sync_interval: chrono::Duration::seconds(env_i64("SYNC_INTERVAL_SECS", 900)?),
            slot_windows: SlotWindows {
                morning: parse_window("REMINDER_MORNING_WINDOW", "07:00-10:00")?,
                afternoon: parse_window("REMINDER_AFTERNOON_WINDOW", "12:00-15:00")?,
                evening: parse_window("REMINDER_EVENING_WINDOW", "18:00-21:00")?,
            },
            provider_concurrency,
            scheduler_jitter: Duration::from_secs(env_u64("SCHEDULER_JITTER_SECS", 30)?),
            token_tick: Duration::from_secs(env_u64("TOKEN_TICK_SECS", 60)?),
            sync_tick: Duration::from_secs(env_u64("SYNC_TICK_SECS", 300)?),
            reminder_tick: Duration::from_secs(env_u64("REMINDER_TICK_SECS", 60)?),
            shutdown_timeout: Duration::from_secs(env_u64("SHUTDOWN_TIMEOUT_SECS", 30)?),
            providers,
            sms: SmsSettings {
                api_url: env::var("SMS_API_URL").map_err(|_| ConfigError::Missing("SMS_API_URL"))?,
                api_token: env::var("SMS_API_TOKEN")
                    .map(|v| v.trim().to_string())
                    .map_err(|_| ConfigError::Missing("SMS_API_TOKEN"))?,
                from_number: env::var("SMS_FROM_NUMBER")
                    .map_err(|_| ConfigError::Missing("SMS_FROM_NUMBER"))?,
            },
            daily_log: DailyLogSettings {
                api_url: env::var("DAILY_LOG_API_URL")
                    .map_err(|_| ConfigError::Missing("DAILY_LOG_API_URL"))?,
                api_token: env::var("DAILY_LOG_API_TOKEN")
                    .map(|v| v.trim().to_string())
                    .map_err(|_| ConfigError::Missing("DAILY_LOG_API_TOKEN"))?,
            },
        })
    }

    /// Default config for tests only.
    pub fn test_default() -> Self {
        let key = EncryptionKey::from_bytes(&[0x42u8; KEY_SIZE]).expect("static key");
        let mut provider_concurrency = HashMap::new();
        let mut providers = HashMap::new();
        for provider in Provider::ALL {
            provider_concurrency.insert(provider, 4);
            providers.insert(provider, ProviderSettings {
                base_url: format!("http://localhost:0/{}", provider.as_str()),
                client_id: "test_client_id".to_string(),
                client_secret: "test_secret".to_string(),
            });
        }
        Self {
            encryption_key: key,
            default_timezone: chrono_tz::UTC,
            refresh_ahead: chrono::Duration::minutes(10),
            sync_interval: chrono::Duration::minutes(15),
            slot_windows: SlotWindows {
                morning: window(7, 10),
                afternoon: window(12, 15),
                evening: window(18, 21),
            },
            provider_concurrency,
            scheduler_jitter: Duration::from_millis(10),
            token_tick: Duration::from_secs(60),
            sync_tick: Duration::from_secs(300),
            reminder_tick: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(5),
            providers,
            sms: SmsSettings {
                api_url: "http://localhost:0/sms".to_string(),
                api_token: "test_token".to_string(),
                from_number: "+15550000000".to_string(),
            },
            daily_log: DailyLogSettings {
                api_url: "http://localhost:0/daily-log".to_string(),
                api_token: "test_token".to_string(),
            },
        }
    }
}

fn window(start_hour: u32, end_hour: u32) -> (NaiveTime, NaiveTime) {
    (
        NaiveTime::from_hms_opt(start_hour, 0, 0).expect("static time"),
        NaiveTime::from_hms_opt(end_hour, 0, 0).expect("static time"),
    )
}

fn default_base_url(provider: Provider) -> &'static str {
    match provider {
        Provider::Fitbit => "https://api.fitbit.com",
        Provider::Garmin => "https://apis.garmin.com",
        Provider::Oura => "https://api.ouraring.com",
    }
}

fn env_u64(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Ok(v) => v.parse().map_err(|_| ConfigError::Invalid {
            key,
            reason: "not a non-negative integer".to_string(),
        }),
        Err(_) => Ok(default),
    }
}

fn env_i64(key: &'static str, default: i64) -> Result<i64, ConfigError> {
    env_u64(key, default as u64).map(|v| v as i64)
}

fn env_usize(key: &'static str, default: usize) -> Result<usize, ConfigError> {
    env_u64(key, default as u64).map(|v| v as usize)
}

/// Parse a `HH:MM-HH:MM` local-time window.
fn parse_window(
    key: &'static str,
    default: &str,
) -> Result<(NaiveTime, NaiveTime), ConfigError> {
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    let invalid = |reason: &str| ConfigError::Invalid {
        key,
        reason: reason.to_string(),
    };

    let (start, end) = raw
        .split_once('-')
        .ok_or_else(|| invalid("expected HH:MM-HH:MM"))?;
    let start = NaiveTime::parse_from_str(start.trim(), "%H:%M")
        .map_err(|_| invalid("bad start time"))?;
    let end =
        NaiveTime::parse_from_str(end.trim(), "%H:%M").map_err(|_| invalid("bad end time"))?;
    if start >= end {
        return Err(invalid("window start must precede end"));
    }
    Ok((start, end))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
