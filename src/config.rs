//! # Configuration Module
//!
//! Environment-driven configuration: credentials, data source URLs, sheet
//! schema mapping, and timing knobs for caches, sessions and keep-alive.

use std::time::Duration;

use anyhow::{bail, Context, Result};

// Defaults for timing
pub const DEFAULT_SESSION_TTL_MINUTES: u64 = 10;
pub const DEFAULT_DATASET_REFRESH_MINUTES: u64 = 60;
pub const DEFAULT_ROSTER_REFRESH_MINUTES: u64 = 5;
pub const DEFAULT_KEEPALIVE_MINUTES: u64 = 10;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_REQUEST_LOG_PATH: &str = "logs.csv";

/// Column names used to read the roster sheet
#[derive(Debug, Clone)]
pub struct RosterSchema {
    pub id_column: String,
    pub scope_column: String,
    /// Explicit display-name column; heuristics apply when `None`
    pub name_column: Option<String>,
    /// Explicit fiber sub-scope column; heuristics apply when `None`
    pub fiber_column: Option<String>,
}

impl Default for RosterSchema {
    fn default() -> Self {
        Self {
            id_column: "ID".to_string(),
            scope_column: "Region".to_string(),
            name_column: None,
            fiber_column: None,
        }
    }
}

/// Column names used to read the fiber-line (ВОЛС) sheet
#[derive(Debug, Clone)]
pub struct FiberSchema {
    pub station_column: Option<String>,
    pub provider_column: Option<String>,
    pub region_column: String,
    pub station_prefix: String,
    /// Fields printed for each matching row
    pub fields: Vec<String>,
}

impl Default for FiberSchema {
    fn default() -> Self {
        Self {
            station_column: None,
            provider_column: None,
            region_column: "РЭС".to_string(),
            station_prefix: "ТП-".to_string(),
            fields: [
                "РЭС",
                "ТП",
                "Провайдер",
                "Номер договора",
                "Дата договора",
                "Адрес",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// A labelled reference image served from the help menu
#[derive(Debug, Clone, PartialEq)]
pub struct HelpImage {
    pub label: String,
    /// `http(s)://` URL or local file path
    pub source: String,
}

/// Full bot configuration
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub bot_token: String,
    /// Public base URL; `None` selects long polling instead of a webhook
    pub self_url: Option<String>,
    pub bind_addr: String,
    pub port: u16,
    pub roster_url: String,
    /// `(region, url)` in configured order
    pub region_sheets: Vec<(String, String)>,
    pub fiber_sheet_url: Option<String>,
    pub allowed_user_ids: Option<Vec<String>>,
    pub help_images: Vec<HelpImage>,
    pub inline_categories: bool,
    pub session_ttl: Duration,
    pub dataset_refresh: Duration,
    pub roster_refresh: Duration,
    /// `None` disables the self-ping
    pub keepalive: Option<Duration>,
    pub fetch_timeout: Duration,
    /// `None` disables the request log
    pub request_log_path: Option<String>,
    pub meter_column: String,
    pub roster_schema: RosterSchema,
    pub fiber_schema: FiberSchema,
}

impl BotConfig {
    /// Read configuration from the process environment (after loading `.env`)
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let get_any = |keys: &[&str]| keys.iter().find_map(|k| get(*k));

        let bot_token = get_any(&["TELEGRAM_BOT_TOKEN", "TOKEN"])
            .context("TELEGRAM_BOT_TOKEN must be set")?;
        let roster_url =
            get_any(&["ROSTER_URL", "ZONES_CSV_URL"]).context("ROSTER_URL must be set")?;

        let region_sheets = match get_any(&["REGION_SHEETS_MAP", "REES_SHEETS_MAP"]) {
            Some(raw) => parse_pairs(&raw, ',').context("Invalid REGION_SHEETS_MAP")?,
            None => Vec::new(),
        };

        let help_images = match get("HELP_IMAGES") {
            Some(raw) => parse_pairs(&raw, ';')
                .context("Invalid HELP_IMAGES")?
                .into_iter()
                .map(|(label, source)| HelpImage { label, source })
                .collect(),
            None => Vec::new(),
        };

        let allowed_user_ids = get("ALLOWED_USER_IDS").map(|raw| split_list(&raw));

        let number = |key: &str, default: u64| -> Result<u64> {
            match get(key) {
                Some(v) => v
                    .parse::<u64>()
                    .with_context(|| format!("{key} must be a whole number")),
                None => Ok(default),
            }
        };

        let minutes = |key: &str, default: u64| -> Result<Duration> {
            let n = number(key, default)?;
            n.checked_mul(60)
                .map(Duration::from_secs)
                .with_context(|| format!("{key} is too large"))
        };

        let session_ttl = minutes("SESSION_TTL_MINUTES", DEFAULT_SESSION_TTL_MINUTES)?;
        if session_ttl.is_zero() {
            bail!("SESSION_TTL_MINUTES must be at least 1");
        }
        let keepalive = minutes("KEEPALIVE_MINUTES", DEFAULT_KEEPALIVE_MINUTES)?;
        let fetch_timeout_secs = number("FETCH_TIMEOUT_SECS", DEFAULT_FETCH_TIMEOUT_SECS)?;

        let port = match get("PORT") {
            Some(v) => v.parse::<u16>().context("PORT must be a valid port number")?,
            None => DEFAULT_PORT,
        };

        let inline_categories = match get("INLINE_CATEGORIES") {
            Some(v) => parse_bool(&v).context("INLINE_CATEGORIES must be true or false")?,
            None => false,
        };

        // Present-but-empty disables the log, absent uses the default file
        let request_log_path = match lookup("REQUEST_LOG_PATH") {
            Some(v) if v.trim().is_empty() => None,
            Some(v) => Some(v.trim().to_string()),
            None => Some(DEFAULT_REQUEST_LOG_PATH.to_string()),
        };

        let roster_defaults = RosterSchema::default();
        let roster_schema = RosterSchema {
            id_column: get("ROSTER_ID_COLUMN").unwrap_or(roster_defaults.id_column),
            scope_column: get("ROSTER_SCOPE_COLUMN").unwrap_or(roster_defaults.scope_column),
            name_column: get("ROSTER_NAME_COLUMN"),
            fiber_column: get("ROSTER_FIBER_COLUMN"),
        };

        let fiber_defaults = FiberSchema::default();
        let fiber_schema = FiberSchema {
            station_column: get("FIBER_STATION_COLUMN"),
            provider_column: get("FIBER_PROVIDER_COLUMN"),
            region_column: get("FIBER_REGION_COLUMN").unwrap_or(fiber_defaults.region_column),
            station_prefix: get("FIBER_STATION_PREFIX").unwrap_or(fiber_defaults.station_prefix),
            fields: get("FIBER_FIELDS")
                .map(|raw| split_list(&raw))
                .unwrap_or(fiber_defaults.fields),
        };

        Ok(Self {
            bot_token,
            self_url: get("SELF_URL").map(|u| u.trim_end_matches('/').to_string()),
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            roster_url,
            region_sheets,
            fiber_sheet_url: get("FIBER_SHEET_URL"),
            allowed_user_ids,
            help_images,
            inline_categories,
            session_ttl,
            dataset_refresh: minutes("DATASET_REFRESH_MINUTES", DEFAULT_DATASET_REFRESH_MINUTES)?,
            roster_refresh: minutes("ROSTER_REFRESH_MINUTES", DEFAULT_ROSTER_REFRESH_MINUTES)?,
            keepalive: (!keepalive.is_zero()).then_some(keepalive),
            fetch_timeout: Duration::from_secs(fetch_timeout_secs),
            request_log_path,
            meter_column: get("METER_COLUMN").unwrap_or_else(|| "Номер счетчика".to_string()),
            roster_schema,
            fiber_schema,
        })
    }

    /// Webhook URL registered with Telegram, when running behind a public URL
    pub fn webhook_url(&self) -> Option<String> {
        self.self_url.as_ref().map(|base| format!("{base}/webhook"))
    }
}

/// Parse `key=value` pairs separated by `separator`, keeping their order.
/// Only the first `=` splits, so URLs with query strings survive.
fn parse_pairs(raw: &str, separator: char) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    for part in raw.split(separator).map(str::trim).filter(|p| !p.is_empty()) {
        let Some((key, value)) = part.split_once('=') else {
            bail!("expected key=value, got \"{part}\"");
        };
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            bail!("empty key or value in \"{part}\"");
        }
        pairs.push((key.to_string(), value.to_string()));
    }
    Ok(pairs)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("not a boolean: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<BotConfig> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        BotConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config =
            config_from(&[("TELEGRAM_BOT_TOKEN", "t"), ("ROSTER_URL", "http://r")]).unwrap();

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.session_ttl, Duration::from_secs(600));
        assert_eq!(config.dataset_refresh, Duration::from_secs(3600));
        assert_eq!(config.keepalive, Some(Duration::from_secs(600)));
        assert_eq!(config.request_log_path.as_deref(), Some("logs.csv"));
        assert_eq!(config.meter_column, "Номер счетчика");
        assert!(config.self_url.is_none());
        assert!(config.webhook_url().is_none());
        assert!(config.region_sheets.is_empty());
    }

    #[test]
    fn test_legacy_variable_names() {
        let config = config_from(&[
            ("TOKEN", "t"),
            ("ZONES_CSV_URL", "http://zones"),
            ("REES_SHEETS_MAP", "North=http://n,South=http://s"),
        ])
        .unwrap();

        assert_eq!(config.bot_token, "t");
        assert_eq!(config.roster_url, "http://zones");
        assert_eq!(config.region_sheets.len(), 2);
    }

    #[test]
    fn test_region_map_keeps_order_and_query_strings() {
        let config = config_from(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("ROSTER_URL", "http://r"),
            (
                "REGION_SHEETS_MAP",
                "Zeta=http://z/export?format=csv&gid=1, Alpha=http://a",
            ),
        ])
        .unwrap();

        assert_eq!(
            config.region_sheets,
            vec![
                ("Zeta".to_string(), "http://z/export?format=csv&gid=1".to_string()),
                ("Alpha".to_string(), "http://a".to_string()),
            ]
        );
    }

    #[test]
    fn test_missing_token_is_an_error() {
        let err = config_from(&[("ROSTER_URL", "http://r")]).unwrap_err();
        assert!(err.to_string().contains("TELEGRAM_BOT_TOKEN"));
    }

    #[test]
    fn test_malformed_pairs_are_rejected() {
        assert!(config_from(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("ROSTER_URL", "http://r"),
            ("REGION_SHEETS_MAP", "North"),
        ])
        .is_err());
    }

    #[test]
    fn test_optional_features() {
        let config = config_from(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("ROSTER_URL", "http://r"),
            ("SELF_URL", "https://bot.example.org/"),
            ("KEEPALIVE_MINUTES", "0"),
            ("REQUEST_LOG_PATH", ""),
            ("ALLOWED_USER_IDS", "1, 2,3"),
            ("HELP_IMAGES", "Пломба=images/seal.jpg;Шильдик=https://img/x.png"),
            ("INLINE_CATEGORIES", "yes"),
        ])
        .unwrap();

        assert_eq!(
            config.webhook_url().as_deref(),
            Some("https://bot.example.org/webhook")
        );
        assert!(config.keepalive.is_none());
        assert!(config.request_log_path.is_none());
        assert_eq!(
            config.allowed_user_ids,
            Some(vec!["1".to_string(), "2".to_string(), "3".to_string()])
        );
        assert_eq!(config.help_images.len(), 2);
        assert_eq!(config.help_images[1].source, "https://img/x.png");
        assert!(config.inline_categories);
    }

    #[test]
    fn test_zero_session_ttl_is_rejected() {
        let err = config_from(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("ROSTER_URL", "http://r"),
            ("SESSION_TTL_MINUTES", "0"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("SESSION_TTL_MINUTES"));
    }

    #[test]
    fn test_zero_refresh_disables_loops() {
        let config = config_from(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("ROSTER_URL", "http://r"),
            ("DATASET_REFRESH_MINUTES", "0"),
            ("ROSTER_REFRESH_MINUTES", "0"),
        ])
        .unwrap();
        assert!(config.dataset_refresh.is_zero());
        assert!(config.roster_refresh.is_zero());
    }

    #[test]
    fn test_oversized_minutes_are_rejected() {
        let huge = u64::MAX.to_string();
        let err = config_from(&[
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("ROSTER_URL", "http://r"),
            ("DATASET_REFRESH_MINUTES", huge.as_str()),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("DATASET_REFRESH_MINUTES"));
    }
}
