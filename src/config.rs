use std::{env, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use url::Url;

use crate::alerts::AlertSettings;
use crate::db::DEFAULT_MAX_POOL_SIZE;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_pool_size: u32,
    pub server_host: String,
    pub server_port: u16,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub jwt_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
    pub refresh_cookie_secure: bool,
    pub refresh_cookie_domain: Option<String>,
    pub cors_allowed_origin: Option<String>,
    pub storage: StorageConfig,
    pub mail: MailConfig,
    pub public_base_url: Option<String>,
    pub schedule: ScheduleConfig,
    pub alerts: AlertSettings,
}

/// Bucket holding case documents. Endpoint and keys are optional; without
/// them the default AWS provider chain applies.
#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub bucket: String,
    pub region: String,
    pub endpoint_url: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

#[derive(Clone, Debug)]
pub struct MailConfig {
    pub api_url: Option<String>,
    pub api_token: Option<String>,
    pub from_address: String,
    pub timeout: Duration,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_token: None,
            from_address: "alertas@casedesk.local".to_string(),
            timeout: Duration::from_secs(15),
        }
    }
}

/// Intervals of the periodic scheduler.
#[derive(Clone, Debug)]
pub struct ScheduleConfig {
    pub dispatch_every: Duration,
    pub create_alerts_every: Duration,
    pub refresh_urgency_every: Duration,
    pub purge_every: Duration,
    pub worker_poll_interval: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            dispatch_every: Duration::from_secs(60 * 60),
            create_alerts_every: Duration::from_secs(24 * 60 * 60),
            refresh_urgency_every: Duration::from_secs(24 * 60 * 60),
            purge_every: Duration::from_secs(7 * 24 * 60 * 60),
            worker_poll_interval: Duration::from_secs(2),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_pool_size = env::var("DATABASE_MAX_POOL_SIZE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_POOL_SIZE);
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = env_or("SERVER_PORT", 3000u16)?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        let jwt_issuer = env::var("JWT_ISSUER").unwrap_or_else(|_| "casedesk".to_string());
        let jwt_audience =
            env::var("JWT_AUDIENCE").unwrap_or_else(|_| "casedesk-clients".to_string());
        let jwt_expiry_minutes = env_or("JWT_EXPIRY_MINUTES", 60i64)?;
        let refresh_token_expiry_days = env_or("REFRESH_TOKEN_EXPIRY_DAYS", 30i64)?;
        let refresh_cookie_secure = env_flag("REFRESH_COOKIE_SECURE", false);
        let refresh_cookie_domain = env::var("REFRESH_COOKIE_DOMAIN").ok();
        let cors_allowed_origin = env::var("CORS_ALLOWED_ORIGIN").ok();
        let storage = StorageConfig {
            bucket: env::var("S3_BUCKET").context("S3_BUCKET must be set")?,
            region: env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            endpoint_url: env::var("AWS_ENDPOINT_URL").ok(),
            access_key_id: env::var("AWS_ACCESS_KEY_ID").ok(),
            secret_access_key: env::var("AWS_SECRET_ACCESS_KEY").ok(),
        };

        let mail_defaults = MailConfig::default();
        let mail = MailConfig {
            api_url: env::var("MAIL_API_URL").ok(),
            api_token: env::var("MAIL_API_TOKEN").ok(),
            from_address: env::var("MAIL_FROM").unwrap_or(mail_defaults.from_address),
            timeout: Duration::from_secs(env_or(
                "MAIL_TIMEOUT_SECONDS",
                mail_defaults.timeout.as_secs(),
            )?),
        };
        let public_base_url = env::var("PUBLIC_BASE_URL")
            .ok()
            .map(|value| value.trim_end_matches('/').to_string());

        let schedule_defaults = ScheduleConfig::default();
        let schedule = ScheduleConfig {
            dispatch_every: env_secs("SCHEDULE_DISPATCH_SECONDS", schedule_defaults.dispatch_every)?,
            create_alerts_every: env_secs(
                "SCHEDULE_CREATE_ALERTS_SECONDS",
                schedule_defaults.create_alerts_every,
            )?,
            refresh_urgency_every: env_secs(
                "SCHEDULE_REFRESH_URGENCY_SECONDS",
                schedule_defaults.refresh_urgency_every,
            )?,
            purge_every: env_secs("SCHEDULE_PURGE_SECONDS", schedule_defaults.purge_every)?,
            worker_poll_interval: env_secs(
                "WORKER_POLL_SECONDS",
                schedule_defaults.worker_poll_interval,
            )?,
        };

        let alerts = AlertSettings::from_env()?;

        Ok(Self {
            database_url,
            database_max_pool_size,
            server_host,
            server_port,
            jwt_secret,
            jwt_issuer,
            jwt_audience,
            jwt_expiry_minutes,
            refresh_token_expiry_days,
            refresh_cookie_secure,
            refresh_cookie_domain,
            cors_allowed_origin,
            storage,
            mail,
            public_base_url,
            schedule,
            alerts,
        })
    }

    pub fn redacted_database_url(&self) -> String {
        redact_database_url(&self.database_url)
    }
}

pub(crate) fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{name} has an invalid value '{raw}'")),
        _ => Ok(default),
    }
}

pub(crate) fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| parse_flag(&v))
        .unwrap_or(default)
}

fn env_secs(name: &str, default: Duration) -> Result<Duration> {
    env_or(name, default.as_secs()).map(|secs| Duration::from_secs(secs.max(1)))
}

fn parse_flag(value: &str) -> bool {
    let value = value.trim();
    value == "1" || value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("yes")
}

fn redact_database_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("*****"));
            }
            parsed.to_string()
        }
        Err(_) => "***".to_string(),
    }
}
