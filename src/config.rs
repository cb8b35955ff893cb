//! Configuration types.
//!
//! Every section is read from the environment through a `from_env()`
//! constructor. Unset variables take the documented defaults; set but
//! malformed values are rejected with [`ConfigError::InvalidValue`].

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::inquiry::quota::{QuotaPolicy, QuotaWindow, UTC_OFFSET_HOURS_RANGE};
use crate::llm::{LlmBackend, LlmConfig};

/// Default Graph API endpoint for the Messenger Send API.
pub const DEFAULT_MESSENGER_API_URL: &str = "https://graph.facebook.com/v18.0";

/// Everything the binary needs to start.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub messenger: MessengerConfig,
    pub llm: Option<LlmConfig>,
    pub flow: FlowConfig,
    pub inquiry: InquiryConfig,
    pub admin: AdminConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server: ServerConfig::from_env()?,
            messenger: MessengerConfig::from_env()?,
            llm: llm_config_from_env()?,
            flow: FlowConfig::from_env()?,
            inquiry: InquiryConfig::from_env()?,
            admin: AdminConfig::from_env(),
        })
    }
}

/// HTTP server and storage locations.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub db_path: PathBuf,
    /// Optional JSON file with bank rate rows to load at startup.
    pub bank_rates_path: Option<PathBuf>,
    /// When set, logs are also written to a daily file in this directory.
    pub log_dir: Option<PathBuf>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            port: parse_var("REFI_PORT", 8080)?,
            db_path: env_opt("REFI_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/refi-assist.db")),
            bank_rates_path: env_opt("REFI_BANK_RATES_PATH").map(PathBuf::from),
            log_dir: env_opt("REFI_LOG_DIR").map(PathBuf::from),
        })
    }
}

/// Messenger platform credentials.
#[derive(Debug, Clone)]
pub struct MessengerConfig {
    /// Page token used by the Send API. Without it nothing can be delivered.
    pub page_access_token: Option<SecretString>,
    /// Token echoed back during the webhook subscription handshake.
    pub verify_token: Option<SecretString>,
    pub api_url: String,
    /// Upper bound on one Send API request.
    pub send_timeout: Duration,
}

impl MessengerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let timeout_secs: u64 = parse_var("MESSENGER_SEND_TIMEOUT_SECS", 10)?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MESSENGER_SEND_TIMEOUT_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(Self {
            page_access_token: env_opt("PAGE_ACCESS_TOKEN").map(SecretString::from),
            verify_token: env_opt("VERIFY_TOKEN").map(SecretString::from),
            api_url: env_opt("MESSENGER_API_URL")
                .unwrap_or_else(|| DEFAULT_MESSENGER_API_URL.to_string()),
            send_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// Build the LLM config from the environment.
///
/// Returns `None` when no API key is available for the chosen backend; the
/// inquiry dispatcher then answers AI-bound questions with the error message.
pub fn llm_config_from_env() -> Result<Option<LlmConfig>, ConfigError> {
    let backend = match env_opt("REFI_LLM_BACKEND").as_deref() {
        None | Some("openai") => LlmBackend::OpenAi,
        Some("anthropic") => LlmBackend::Anthropic,
        Some(other) => {
            return Err(ConfigError::InvalidValue {
                key: "REFI_LLM_BACKEND".to_string(),
                message: format!("expected 'openai' or 'anthropic', got '{other}'"),
            });
        }
    };

    let (key_var, default_model) = match backend {
        LlmBackend::OpenAi => ("OPENAI_API_KEY", "gpt-4o-mini"),
        LlmBackend::Anthropic => ("ANTHROPIC_API_KEY", "claude-3-5-haiku-latest"),
    };

    let Some(api_key) = env_opt(key_var) else {
        tracing::warn!(key = key_var, "No LLM API key set, AI answers disabled");
        return Ok(None);
    };

    Ok(Some(LlmConfig {
        backend,
        api_key: SecretString::from(api_key),
        model: env_opt("REFI_MODEL").unwrap_or_else(|| default_model.to_string()),
    }))
}

/// Rules for the data-collection flow.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// National mobile prefix every phone number must start with.
    pub phone_prefix: String,
    /// Accepted phone number lengths, in digits.
    pub phone_lengths: Vec<usize>,
    /// Whether the flow asks for the user's age.
    pub ask_age: bool,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            phone_prefix: "01".to_string(),
            phone_lengths: vec![10, 11],
            ask_age: true,
        }
    }
}

impl FlowConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let phone_prefix = env_opt("REFI_PHONE_PREFIX").unwrap_or(defaults.phone_prefix);
        if phone_prefix.is_empty() || !phone_prefix.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::InvalidValue {
                key: "REFI_PHONE_PREFIX".to_string(),
                message: "must be a non-empty string of digits".to_string(),
            });
        }
        Ok(Self {
            phone_prefix,
            phone_lengths: parse_list("REFI_PHONE_LENGTHS", defaults.phone_lengths)?,
            ask_age: parse_var("REFI_ASK_AGE", defaults.ask_age)?,
        })
    }
}

/// Inquiry-mode quota settings.
#[derive(Debug, Clone)]
pub struct InquiryConfig {
    pub quota: QuotaPolicy,
}

impl InquiryConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = QuotaPolicy::default();
        let window = match env_opt("REFI_QUOTA_WINDOW").as_deref() {
            None | Some("rolling") => QuotaWindow::Rolling(Duration::from_secs(24 * 60 * 60)),
            Some("calendar") => QuotaWindow::CalendarDay {
                utc_offset_hours: check_utc_offset(parse_var(
                    "REFI_QUOTA_UTC_OFFSET_HOURS",
                    8,
                )?)?,
            },
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "REFI_QUOTA_WINDOW".to_string(),
                    message: format!("expected 'rolling' or 'calendar', got '{other}'"),
                });
            }
        };
        let limit = parse_var("REFI_QUERY_LIMIT", defaults.limit)?;
        if limit == 0 {
            return Err(ConfigError::InvalidValue {
                key: "REFI_QUERY_LIMIT".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(Self {
            quota: QuotaPolicy {
                limit,
                window,
                milestones: parse_list("REFI_QUOTA_MILESTONES", defaults.milestones)?,
            },
        })
    }
}

fn check_utc_offset(hours: i32) -> Result<i32, ConfigError> {
    if UTC_OFFSET_HOURS_RANGE.contains(&hours) {
        Ok(hours)
    } else {
        Err(ConfigError::InvalidValue {
            key: "REFI_QUOTA_UTC_OFFSET_HOURS".to_string(),
            message: format!(
                "{hours} is outside {}..={}",
                UTC_OFFSET_HOURS_RANGE.start(),
                UTC_OFFSET_HOURS_RANGE.end()
            ),
        })
    }
}

/// Operator contact settings.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// Messenger id that receives new-lead alerts.
    pub messenger_id: Option<String>,
    /// Human fallback link shown to users.
    pub contact_link: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            messenger_id: None,
            contact_link: "https://wa.me/60126181683".to_string(),
        }
    }
}

impl AdminConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            messenger_id: env_opt("ADMIN_MESSENGER_ID"),
            contact_link: env_opt("ADMIN_CONTACT_LINK").unwrap_or(defaults.contact_link),
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Read a variable, treating empty values as unset.
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_opt(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_list<T>(key: &str, default: Vec<T>) -> Result<Vec<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_opt(key) {
        Some(raw) => parse_list_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("'{raw}': {e}"),
    })
}

fn parse_list_value<T>(key: &str, raw: &str) -> Result<Vec<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_value(key, s))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_defaults() {
        let flow = FlowConfig::default();
        assert_eq!(flow.phone_prefix, "01");
        assert_eq!(flow.phone_lengths, vec![10, 11]);
        assert!(flow.ask_age);
    }

    #[test]
    fn parse_list_value_accepts_spaces() {
        let lengths: Vec<usize> = parse_list_value("K", " 10, 11 ,").unwrap();
        assert_eq!(lengths, vec![10, 11]);
    }

    #[test]
    fn parse_value_reports_key() {
        let err = parse_value::<u16>("REFI_PORT", "eighty").unwrap_err();
        match err {
            ConfigError::InvalidValue { key, message } => {
                assert_eq!(key, "REFI_PORT");
                assert!(message.contains("eighty"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn parse_list_value_rejects_bad_item() {
        assert!(parse_list_value::<u32>("REFI_QUOTA_MILESTONES", "10,five").is_err());
    }

    #[test]
    fn utc_offset_must_be_a_real_zone() {
        assert_eq!(check_utc_offset(8).unwrap(), 8);
        assert_eq!(check_utc_offset(-12).unwrap(), -12);
        assert_eq!(check_utc_offset(14).unwrap(), 14);
        for bad in [15, -13, 30, 1_000_000] {
            match check_utc_offset(bad) {
                Err(ConfigError::InvalidValue { key, .. }) => {
                    assert_eq!(key, "REFI_QUOTA_UTC_OFFSET_HOURS");
                }
                other => panic!("offset {bad} accepted: {other:?}"),
            }
        }
    }

    #[test]
    fn admin_default_link() {
        assert!(AdminConfig::default().contact_link.starts_with("https://"));
    }
}
