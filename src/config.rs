//! Configuration types.
//!
//! Settings come from the environment, with integration ids and keys also
//! readable from a secrets JSON file. Environment values win.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::alerts::AlertWindow;
use crate::error::ConfigError;
use crate::google::{ServiceAccount, ServiceAccountKey, StaticToken, TokenSource};
use crate::llm::{LlmBackend, LlmConfig};

const DEFAULT_PORT: u16 = 7860;
const DEFAULT_DB_PATH: &str = "./data/worklog.db";
const DEFAULT_SECRETS_PATH: &str = "./secrets.json";
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";

static SPREADSHEET_URL_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/spreadsheets/d/([a-zA-Z0-9_-]+)").expect("valid regex")
});

/// Keys read from the secrets file. Names match the file as written by hand.
#[derive(Default, Deserialize)]
pub struct Secrets {
    #[serde(rename = "GEMINI_API_KEY", default, deserialize_with = "opt_secret")]
    pub gemini_api_key: Option<SecretString>,
    #[serde(rename = "ANTHROPIC_API_KEY", default, deserialize_with = "opt_secret")]
    pub anthropic_api_key: Option<SecretString>,
    #[serde(rename = "OPENAI_API_KEY", default, deserialize_with = "opt_secret")]
    pub openai_api_key: Option<SecretString>,
    #[serde(rename = "SPREADSHEET_URL", default)]
    pub spreadsheet_url: Option<String>,
    #[serde(rename = "SPREADSHEET_ID", default)]
    pub spreadsheet_id: Option<String>,
    #[serde(rename = "GOOGLE_DRIVE_FOLDER_ID", default)]
    pub drive_folder_id: Option<String>,
    #[serde(rename = "CALENDAR_ID", default)]
    pub calendar_id: Option<String>,
    #[serde(default)]
    pub gcp_service_account: Option<ServiceAccountKey>,
}

fn opt_secret<'de, D: Deserializer<'de>>(d: D) -> Result<Option<SecretString>, D::Error> {
    Ok(Option::<String>::deserialize(d)?
        .filter(|s| !s.trim().is_empty())
        .map(SecretString::from))
}

impl Secrets {
    /// Load a secrets file. A missing file is empty; a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No secrets file");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };
        serde_json::from_str(&raw)
            .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))
    }
}

/// How Google API calls are authorized.
#[derive(Clone)]
pub enum GoogleAuth {
    Token(SecretString),
    ServiceAccount(ServiceAccountKey),
}

impl std::fmt::Debug for GoogleAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GoogleAuth::Token(_) => f.write_str("Token([REDACTED])"),
            GoogleAuth::ServiceAccount(key) => write!(f, "ServiceAccount({})", key.client_email),
        }
    }
}

impl GoogleAuth {
    pub fn token_source(&self, client: reqwest::Client) -> Arc<dyn TokenSource> {
        match self {
            GoogleAuth::Token(token) => Arc::new(StaticToken::new(token.clone())),
            GoogleAuth::ServiceAccount(key) => Arc::new(ServiceAccount::new(key.clone(), client)),
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Local libSQL file used when no spreadsheet is configured.
    pub db_path: PathBuf,
    /// Sheet read cache lifetime. Zero disables caching.
    pub cache_ttl: Duration,
    pub http_timeout: Duration,
    pub log_dir: Option<PathBuf>,
    pub alert_window: AlertWindow,
    /// `None` disables AI mode and summaries.
    pub llm: Option<LlmConfig>,
    pub google_auth: Option<GoogleAuth>,
    pub spreadsheet_id: Option<String>,
    pub drive_folder_id: Option<String>,
    pub calendar_id: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            cache_ttl: Duration::from_secs(60),
            http_timeout: Duration::from_secs(30),
            log_dir: None,
            alert_window: AlertWindow::default(),
            llm: None,
            google_auth: None,
            spreadsheet_id: None,
            drive_folder_id: None,
            calendar_id: None,
        }
    }
}

/// Spreadsheet id from a full Google Sheets URL.
pub fn spreadsheet_id_from_url(url: &str) -> Option<String> {
    SPREADSHEET_URL_ID
        .captures(url)
        .map(|caps| caps[1].to_string())
}

fn parse_num<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Like `parse_num`, but a negative count of minutes or hours is an error.
fn parse_span(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: i64,
) -> Result<i64, ConfigError> {
    let value = parse_num(env, key, default)?;
    if value < 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("must not be negative, got {value}"),
        });
    }
    Ok(value)
}

impl AppConfig {
    /// Read the process environment and the secrets file it points at.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        let secrets_path = env("WORKLOG_SECRETS").unwrap_or_else(|| DEFAULT_SECRETS_PATH.into());
        let secrets = Secrets::load(Path::new(&secrets_path))?;
        Self::from_sources(env, secrets)
    }

    /// Build from an environment lookup and already-loaded secrets.
    pub fn from_sources(
        env: impl Fn(&str) -> Option<String>,
        secrets: Secrets,
    ) -> Result<Self, ConfigError> {
        let port = parse_num(&env, "WORKLOG_PORT", DEFAULT_PORT)?;
        let cache_ttl = Duration::from_secs(parse_num(&env, "WORKLOG_CACHE_TTL_SECS", 60u64)?);
        let http_timeout =
            Duration::from_secs(parse_num(&env, "WORKLOG_HTTP_TIMEOUT_SECS", 30u64)?);
        let alert_window = AlertWindow {
            grace: chrono::Duration::minutes(parse_span(&env, "WORKLOG_ALERT_GRACE_MIN", 60)?),
            lookahead: chrono::Duration::hours(parse_span(
                &env,
                "WORKLOG_ALERT_LOOKAHEAD_HOURS",
                24,
            )?),
        };

        let backend = match env("WORKLOG_LLM_BACKEND") {
            Some(raw) => raw.parse::<LlmBackend>()?,
            None => LlmBackend::Gemini,
        };
        let (key_var, secret_key, default_model) = match backend {
            LlmBackend::Gemini => ("GEMINI_API_KEY", secrets.gemini_api_key, DEFAULT_GEMINI_MODEL),
            LlmBackend::Anthropic => (
                "ANTHROPIC_API_KEY",
                secrets.anthropic_api_key,
                DEFAULT_ANTHROPIC_MODEL,
            ),
            LlmBackend::OpenAi => ("OPENAI_API_KEY", secrets.openai_api_key, DEFAULT_OPENAI_MODEL),
        };
        let llm = env(key_var)
            .map(SecretString::from)
            .or(secret_key)
            .map(|api_key| LlmConfig {
                backend,
                api_key,
                model: env("WORKLOG_MODEL").unwrap_or_else(|| default_model.to_string()),
            });

        let google_auth = match env("GOOGLE_ACCESS_TOKEN") {
            Some(token) => Some(GoogleAuth::Token(SecretString::from(token))),
            None => match env("GOOGLE_APPLICATION_CREDENTIALS") {
                Some(path) => {
                    let raw = std::fs::read_to_string(&path)?;
                    let key: ServiceAccountKey = serde_json::from_str(&raw)
                        .map_err(|e| ConfigError::ParseError(format!("{path}: {e}")))?;
                    Some(GoogleAuth::ServiceAccount(key))
                }
                None => secrets.gcp_service_account.map(GoogleAuth::ServiceAccount),
            },
        };

        let spreadsheet_id = match env("SPREADSHEET_ID").or(secrets.spreadsheet_id) {
            Some(id) => Some(id),
            None => match env("SPREADSHEET_URL").or(secrets.spreadsheet_url) {
                Some(url) => Some(spreadsheet_id_from_url(&url).ok_or_else(|| {
                    ConfigError::InvalidValue {
                        key: "SPREADSHEET_URL".into(),
                        message: format!("no spreadsheet id in {url}"),
                    }
                })?),
                None => None,
            },
        };

        Ok(Self {
            port,
            db_path: env("WORKLOG_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            cache_ttl,
            http_timeout,
            log_dir: env("WORKLOG_LOG_DIR").map(PathBuf::from),
            alert_window,
            llm,
            google_auth,
            spreadsheet_id,
            drive_folder_id: env("GOOGLE_DRIVE_FOLDER_ID").or(secrets.drive_folder_id),
            calendar_id: env("CALENDAR_ID").or(secrets.calendar_id),
        })
    }

    /// Google Sheets is used only with both a spreadsheet id and credentials.
    pub fn uses_google_sheets(&self) -> bool {
        self.spreadsheet_id.is_some() && self.google_auth.is_some()
    }
}
