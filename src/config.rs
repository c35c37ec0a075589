//! Startup configuration.
//!
//! Everything is read once from the `[transit]` section of an INI file:
//!
//! ```ini
//! [transit]
//! trip_update_url = https://realtime.hsl.fi/realtime/trip-updates/v2/hsl
//! service_alerts_url = https://realtime.hsl.fi/realtime/service-alerts/v2/hsl
//! stops = [{"stop_id": "1541601", "route_ids": ["31M1", "31M2"], "direction_name": "Vuosaari"}]
//! language = "en"
//! max_rows = 2
//! ```
//!
//! A missing or malformed option is a [`ConfigError`]; the binary refuses to
//! start on any of them.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, ParseOption, Properties};
use serde::Deserialize;
use thiserror::Error;

/// INI section holding every option.
pub const SECTION: &str = "transit";

/// Header used by the Digitransit API gateway when only `api_key` is set.
pub const DEFAULT_API_KEY_HEADER: &str = "digitransit-subscription-key";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config file {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] ini::ParseError),
    #[error("no [{0}] section found in config")]
    MissingSection(&'static str),
    #[error("missing {0} from config, but it is required")]
    MissingOption(&'static str),
    #[error("invalid value for {option}: {value:?}")]
    InvalidValue { option: &'static str, value: String },
    #[error("invalid URL for {option}: {reason}")]
    InvalidUrl { option: &'static str, reason: String },
    #[error("stops must be a JSON list of {{stop_id, route_ids, direction_name}}: {0}")]
    InvalidStops(#[source] serde_json::Error),
    #[error("stops list is empty")]
    NoStops,
}

/// One watched (stop, routes) pair and the display label it feeds.
///
/// Several entries may share a `direction_name`; their arrivals are merged.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StopConfig {
    pub stop_id: String,
    #[serde(alias = "route_id")]
    pub route_ids: HashSet<String>,
    pub direction_name: String,
}

impl StopConfig {
    pub fn new<I, S>(stop_id: &str, route_ids: I, direction_name: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stop_id: stop_id.to_string(),
            route_ids: route_ids.into_iter().map(Into::into).collect(),
            direction_name: direction_name.to_string(),
        }
    }

    /// Returns `true` if a stop time update at `stop_id` on `route_id` belongs here.
    pub fn matches(&self, stop_id: &str, route_id: &str) -> bool {
        self.stop_id == stop_id && self.route_ids.contains(route_id)
    }
}

/// How requests to the feed endpoints are authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedAuth {
    /// No authentication required.
    None,
    /// Key sent as an HTTP header with the given name.
    Header { header_name: String, key: String },
    /// Key appended as a URL query parameter with the given name.
    UrlParam { param_name: String, key: String },
}

#[derive(Debug, Clone)]
pub struct BoardConfig {
    pub trip_update_url: String,
    pub service_alerts_url: String,
    pub stops: Vec<StopConfig>,
    pub language: String,
    pub max_rows: usize,
    pub trip_update_interval: Duration,
    pub service_alert_interval: Duration,
    pub alerts_active_only: bool,
    pub max_attempts: u32,
    pub frame_rate: u32,
    pub auth: FeedAuth,
}

impl BoardConfig {
    /// Reads and validates the config file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let ini = Ini::load_from_file_opt(path, parse_option()).map_err(|source| {
            ConfigError::Load {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Self::from_ini(&ini)
    }

    /// Parses config text directly.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str_opt(text, parse_option())?;
        Self::from_ini(&ini)
    }

    pub fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let section = ini
            .section(Some(SECTION))
            .ok_or(ConfigError::MissingSection(SECTION))?;

        let trip_update_url = url(section, "trip_update_url")?;
        let service_alerts_url = url(section, "service_alerts_url")?;

        let stops: Vec<StopConfig> =
            serde_json::from_str(required(section, "stops")?).map_err(ConfigError::InvalidStops)?;
        if stops.is_empty() {
            return Err(ConfigError::NoStops);
        }

        let language = unquote(required(section, "language")?).to_string();

        let raw_rows = required(section, "max_rows")?;
        let max_rows = match raw_rows.parse::<usize>() {
            Ok(rows) if rows > 0 => rows,
            _ => {
                return Err(ConfigError::InvalidValue {
                    option: "max_rows",
                    value: raw_rows.to_string(),
                });
            }
        };

        let trip_update_interval =
            Duration::from_secs(optional(section, "trip_update_interval_secs", 15u64)?);
        let service_alert_interval =
            Duration::from_secs(optional(section, "service_alert_interval_secs", 300u64)?);
        let alerts_active_only = optional(section, "alerts_active_only", true)?;
        let max_attempts = optional(section, "max_attempts", 10u32)?;
        let frame_rate = optional(section, "frame_rate", 60u32)?;

        if max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                option: "max_attempts",
                value: "0".to_string(),
            });
        }
        if frame_rate == 0 {
            return Err(ConfigError::InvalidValue {
                option: "frame_rate",
                value: "0".to_string(),
            });
        }

        let auth = match value(section, "api_key") {
            None => FeedAuth::None,
            Some(key) => auth_for_key(section, key.to_string()),
        };

        Ok(Self {
            trip_update_url,
            service_alerts_url,
            stops,
            language,
            max_rows,
            trip_update_interval,
            service_alert_interval,
            alerts_active_only,
            max_attempts,
            frame_rate,
            auth,
        })
    }

    /// Replaces the configured key, keeping the header/param choice from the file.
    pub fn with_api_key(mut self, key: String) -> Self {
        self.auth = match self.auth {
            FeedAuth::UrlParam { param_name, .. } => FeedAuth::UrlParam { param_name, key },
            FeedAuth::Header { header_name, .. } => FeedAuth::Header { header_name, key },
            FeedAuth::None => FeedAuth::Header {
                header_name: DEFAULT_API_KEY_HEADER.to_string(),
                key,
            },
        };
        self
    }

    /// All stop ids and route ids an alert may name to be shown.
    pub fn informed_ids(&self) -> HashSet<String> {
        let mut ids = HashSet::new();
        for stop in &self.stops {
            ids.insert(stop.stop_id.clone());
            ids.extend(stop.route_ids.iter().cloned());
        }
        ids
    }
}

/// Values like JSON stop lists contain quotes that must reach serde untouched.
fn parse_option() -> ParseOption {
    ParseOption {
        enabled_quote: false,
        enabled_escape: false,
        ..ParseOption::default()
    }
}

fn auth_for_key(section: &Properties, key: String) -> FeedAuth {
    if let Some(param_name) = value(section, "api_key_param") {
        return FeedAuth::UrlParam {
            param_name: param_name.to_string(),
            key,
        };
    }
    let header_name = value(section, "api_key_header").unwrap_or(DEFAULT_API_KEY_HEADER);
    FeedAuth::Header {
        header_name: header_name.to_string(),
        key,
    }
}

fn value<'a>(section: &'a Properties, option: &str) -> Option<&'a str> {
    section
        .get(option)
        .map(|v| unquote(v.trim()))
        .filter(|v| !v.is_empty())
}

fn required<'a>(section: &'a Properties, option: &'static str) -> Result<&'a str, ConfigError> {
    section
        .get(option)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingOption(option))
}

fn optional<T: FromStr>(
    section: &Properties,
    option: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match value(section, option) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            option,
            value: raw.to_string(),
        }),
    }
}

fn url(section: &Properties, option: &'static str) -> Result<String, ConfigError> {
    let raw = unquote(required(section, option)?);
    reqwest::Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        option,
        reason: e.to_string(),
    })?;
    Ok(raw.to_string())
}

fn unquote(raw: &str) -> &str {
    raw.trim_matches('"')
}
