use config::{Config, File, FileFormat, Map, Value, ValueKind};
use regex::Regex;
use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

#[derive(thiserror::Error, Debug)]
pub enum BelresConfigError {
    #[error("failed to load config")]
    InvalidConfigError(#[from] config::ConfigError),
    #[error("could not find config file")]
    ConfigFileNotFound,
    #[error("failed to read config file")]
    ReadError(#[from] std::io::Error),
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
    #[error("environment variable expansion error")]
    EnvExpansionError(#[from] ExpandError),
}

#[derive(thiserror::Error, Debug)]
pub enum ExpandError {
    #[error("Missing environment variable '{var_name}' for placeholder '{placeholder}'")]
    MissingVariable {
        var_name: String,
        placeholder: String,
    },
}

/// Loads environment variables from a .env file if it exists.
/// Call it before loading the configuration so that placeholders
/// in the config file can refer to variables defined there.
///
/// Looks in the current working directory first, then in the parent
/// directory. Without either file the process environment is used as is.
pub fn load_dotenv() {
    if Path::new(".env").exists() {
        match dotenvy::dotenv() {
            Ok(_) => info!("Loaded environment variables from .env file"),
            Err(e) => warn!("Found .env file but failed to load it: {}", e),
        }
        return;
    }

    if Path::new("../.env").exists() {
        match dotenvy::from_path("../.env") {
            Ok(_) => info!("Loaded environment variables from ../.env file"),
            Err(e) => warn!("Found ../.env file but failed to load it: {}", e),
        }
        return;
    }

    debug!("No .env file found, using system environment variables only");
}

/// Expands environment variable placeholders in a string.
/// Supports both ${VAR_NAME} and ${VAR_NAME:-default_value} syntax.
///
/// Examples:
/// - "${ARANGO_PASSWORD}" -> reads from ARANGO_PASSWORD env var
/// - "${ARANGO_HOST:-localhost}" -> reads from ARANGO_HOST, falls back to "localhost"
pub fn expand_env_vars(input: &str) -> Result<String, ExpandError> {
    // the pattern is a literal, it always compiles
    let re = Regex::new(r"\$\{([^}:]+)(?::-(.*?))?\}").unwrap();
    let mut result = input.to_string();
    let mut replacements: HashMap<String, String> = HashMap::new();

    for capture in re.captures_iter(input) {
        let full_match = &capture[0];
        let var_name = &capture[1];
        let default_value = capture.get(2).map(|m| m.as_str());

        if replacements.contains_key(full_match) {
            continue;
        }

        let env_value = match env::var(var_name) {
            Ok(value) => {
                debug!("Expanded environment variable: {} = [REDACTED]", var_name);
                value
            }
            Err(_) => match default_value {
                Some(default) => {
                    warn!(
                        "Environment variable {} not found, using default value",
                        var_name
                    );
                    default.to_string()
                }
                None => {
                    return Err(ExpandError::MissingVariable {
                        var_name: var_name.to_string(),
                        placeholder: full_match.to_string(),
                    });
                }
            },
        };

        result = result.replace(full_match, &env_value);
        replacements.insert(full_match.to_string(), env_value);
    }

    Ok(result)
}

/// Expand placeholders in every string of a parsed config tree.
fn expand_value(value: serde_json::Value) -> Result<serde_json::Value, ExpandError> {
    use serde_json::Value as Json;

    Ok(match value {
        Json::String(s) => Json::String(expand_env_vars(&s)?),
        Json::Array(items) => Json::Array(
            items
                .into_iter()
                .map(expand_value)
                .collect::<Result<_, _>>()?,
        ),
        Json::Object(map) => Json::Object(
            map.into_iter()
                .map(|(key, value)| Ok((key, expand_value(value)?)))
                .collect::<Result<_, ExpandError>>()?,
        ),
        other => other,
    })
}

/// Read a YAML config file and expand environment placeholders.
///
/// The YAML is parsed first and placeholders are expanded inside the
/// resulting string values, so a substituted value is always taken
/// verbatim (`0123`, `pass #word` or `null` stay strings).
#[instrument(err)]
pub fn load_config(filepath: &str) -> Result<Config, BelresConfigError> {
    let path = Path::new(filepath);

    if !path.exists() {
        return Err(BelresConfigError::ConfigFileNotFound);
    }

    let file_content = std::fs::read_to_string(path)?;

    let raw = Config::builder()
        .add_source(File::from_str(&file_content, FileFormat::Yaml))
        .build()?;
    let tree: serde_json::Value = raw.try_deserialize()?;
    let expanded = expand_value(tree)?;

    let conf = Config::builder()
        .add_source(File::from_str(&expanded.to_string(), FileFormat::Json))
        .build()?;

    Ok(conf)
}

fn optional_string(
    table: &Map<String, Value>,
    key: &str,
) -> Result<Option<String>, BelresConfigError> {
    match table.get(key) {
        None => Ok(None),
        Some(value) if matches!(value.kind, ValueKind::Nil) => Ok(None),
        Some(value) => Ok(Some(value.clone().into_string()?)),
    }
}

fn optional_int(table: &Map<String, Value>, key: &str) -> Result<Option<i64>, BelresConfigError> {
    match table.get(key) {
        None => Ok(None),
        Some(value) if matches!(value.kind, ValueKind::Nil) => Ok(None),
        Some(value) => Ok(Some(value.clone().into_int()?)),
    }
}

/// Connection settings for the ArangoDB server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArangoConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub timeout: Duration,
}

impl Default for ArangoConfig {
    fn default() -> Self {
        ArangoConfig {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 8529,
            username: "root".to_string(),
            password: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl ArangoConfig {
    pub fn from_config(config: &Config) -> Result<Self, BelresConfigError> {
        let defaults = ArangoConfig::default();
        let arango_conf = match config.get_table("arango") {
            Ok(table) => table,
            Err(config::ConfigError::NotFound(_)) => {
                warn!("no arango section in config, using defaults");
                return Ok(defaults);
            }
            Err(e) => return Err(e.into()),
        };

        let protocol = optional_string(&arango_conf, "protocol")?
            .unwrap_or(defaults.protocol)
            .to_lowercase();
        if protocol != "http" && protocol != "https" {
            return Err(BelresConfigError::InvalidValue {
                key: "arango.protocol".to_string(),
                value: protocol,
            });
        }

        let host = optional_string(&arango_conf, "host")?.unwrap_or(defaults.host);

        let port = match optional_int(&arango_conf, "port")? {
            Some(port) => {
                u16::try_from(port).map_err(|_| BelresConfigError::InvalidValue {
                    key: "arango.port".to_string(),
                    value: port.to_string(),
                })?
            }
            None => defaults.port,
        };

        let username = optional_string(&arango_conf, "username")?.unwrap_or(defaults.username);

        // an empty password (e.g. from "${ARANGO_PASSWORD:-}") means no password
        let password = optional_string(&arango_conf, "password")?.filter(|p| !p.is_empty());

        let timeout = match optional_int(&arango_conf, "timeout_secs")? {
            Some(secs) if secs > 0 => Duration::from_secs(secs as u64),
            Some(secs) => {
                return Err(BelresConfigError::InvalidValue {
                    key: "arango.timeout_secs".to_string(),
                    value: secs.to_string(),
                })
            }
            None => defaults.timeout,
        };

        Ok(ArangoConfig {
            protocol,
            host,
            port,
            username,
            password,
            timeout,
        })
    }

    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub arango: ArangoConfig,
}

impl AppConfig {
    pub fn from_config(config: &Config) -> Result<Self, BelresConfigError> {
        Ok(AppConfig {
            arango: ArangoConfig::from_config(config)?,
        })
    }

    pub fn from_path(config_path: &str) -> Result<Self, BelresConfigError> {
        let config = load_config(config_path)?;
        Self::from_config(&config)
    }
}
