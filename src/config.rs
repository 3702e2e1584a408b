use std::{
    collections::HashSet,
    env, fmt, fs, io,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use log::{LevelFilter, error, info};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, de};
#[cfg(unix)]
use syslog::Facility;

use crate::{
    constants::*,
    signing::{HttpSettings, Roster, SignerSettings, SiteGroup},
};

//------------ ConfigDefaults ------------------------------------------------

pub struct ConfigDefaults;

impl ConfigDefaults {
    fn log_level() -> LevelFilter {
        match env::var(SIGNPROXY_ENV_LOG_LEVEL) {
            Ok(level) => match LevelFilter::from_str(&level) {
                Ok(level) => level,
                Err(_) => {
                    eprintln!("Unrecognized value for log level in env var {}", SIGNPROXY_ENV_LOG_LEVEL);
                    ::std::process::exit(1);
                }
            },
            _ => LevelFilter::Info,
        }
    }
    fn log_type() -> LogType {
        LogType::Stderr
    }
    fn log_file() -> PathBuf {
        PathBuf::from("./signproxy.log")
    }
    fn syslog_facility() -> String {
        "daemon".to_string()
    }
    fn pool_capacity() -> usize {
        DEFAULT_POOL_CAPACITY
    }
    fn connect_timeout() -> u64 {
        DEFAULT_CONNECT_TIMEOUT_SECS
    }
    fn request_timeout() -> u64 {
        DEFAULT_REQUEST_TIMEOUT_SECS
    }
    fn health_check_timeout() -> u64 {
        DEFAULT_HEALTH_CHECK_TIMEOUT_SECS
    }
    fn key_label_prefix() -> String {
        DEFAULT_KEY_LABEL_PREFIX.to_string()
    }
    fn subject_dn() -> String {
        DEFAULT_SUBJECT_DN.to_string()
    }
    fn key_algorithm() -> String {
        DEFAULT_KEY_ALGORITHM.to_string()
    }
    fn digest_algorithm() -> String {
        DEFAULT_DIGEST_ALGORITHM.to_string()
    }
    fn check_crl() -> bool {
        true
    }
    fn base_path() -> String {
        DEFAULT_BASE_PATH.to_string()
    }
    fn password() -> SecretString {
        SecretString::new(String::new())
    }
}

//------------ Config --------------------------------------------------------

/// Global configuration for the signing proxy.
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "ConfigDefaults::log_level")]
    pub log_level: LevelFilter,

    #[serde(default = "ConfigDefaults::log_type")]
    pub log_type: LogType,

    #[serde(default = "ConfigDefaults::log_file")]
    pub log_file: PathBuf,

    #[serde(default = "ConfigDefaults::syslog_facility")]
    pub syslog_facility: String,

    #[serde(default = "ConfigDefaults::pool_capacity")]
    pub pool_capacity: usize,

    /// Seconds allowed for connecting to a signing server.
    #[serde(default = "ConfigDefaults::connect_timeout")]
    pub connect_timeout: u64,

    /// Seconds allowed for a complete request to a signing server.
    #[serde(default = "ConfigDefaults::request_timeout")]
    pub request_timeout: u64,

    /// Seconds allowed for probing a signing server. The environment
    /// variable SIGNPROXY_HEALTH_TIMEOUT takes precedence.
    #[serde(default = "ConfigDefaults::health_check_timeout")]
    pub health_check_timeout: u64,

    #[serde(default = "ConfigDefaults::key_label_prefix")]
    pub key_label_prefix: String,

    #[serde(default = "ConfigDefaults::subject_dn")]
    pub subject_dn: String,

    #[serde(default = "ConfigDefaults::key_algorithm")]
    pub key_algorithm: String,

    #[serde(default = "ConfigDefaults::digest_algorithm")]
    pub digest_algorithm: String,

    #[serde(default = "ConfigDefaults::check_crl")]
    pub check_crl: bool,

    #[serde(default = "ConfigDefaults::base_path")]
    pub base_path: String,

    /// The signing servers, by site, in the order they are tried.
    #[serde(default)]
    pub sites: Vec<SiteConfig>,
}

#[derive(Debug, Deserialize)]
pub struct SiteConfig {
    pub name: String,

    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
}

#[derive(Debug, Deserialize)]
pub struct EndpointConfig {
    pub address: String,

    /// Kept as written: a malformed port only disables this server.
    #[serde(deserialize_with = "de_port")]
    pub port: String,

    #[serde(default = "ConfigDefaults::password")]
    pub password: SecretString,
}

/// Accepts the port as a number or as a string.
fn de_port<'de, D>(d: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(i64),
        Text(String),
    }

    match Port::deserialize(d)? {
        Port::Number(n) => Ok(n.to_string()),
        Port::Text(s) => Ok(s),
    }
}

impl Config {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_secs(self.health_check_timeout)
    }

    /// Builds the list of signing servers in configured order.
    pub fn roster(&self) -> Roster {
        let sites = self
            .sites
            .iter()
            .map(|site| {
                site.endpoints.iter().fold(SiteGroup::new(site.name.clone()), |group, endpoint| {
                    group.with_endpoint(
                        endpoint.address.clone(),
                        endpoint.port.clone(),
                        SecretString::new(endpoint.password.expose_secret().clone()),
                    )
                })
            })
            .collect();
        Roster::new(sites)
    }

    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            base_path: self.base_path.clone(),
            connect_timeout: self.connect_timeout(),
            request_timeout: self.request_timeout(),
        }
    }

    pub fn signer_settings(&self) -> SignerSettings {
        SignerSettings {
            key_label_prefix: self.key_label_prefix.clone(),
            subject_dn: self.subject_dn.clone(),
            key_algorithm: self.key_algorithm.clone(),
            digest_algorithm: self.digest_algorithm.clone(),
            pool_capacity: self.pool_capacity,
            health_check_timeout: self.health_check_timeout(),
            check_crl: self.check_crl,
        }
    }
}

impl Config {
    /// Reads, verifies, and installs logging for the given config file.
    pub fn create(config_file: &str) -> Result<Self, ConfigError> {
        let config = match Self::read_config(config_file) {
            Err(e) => {
                if config_file == SIGNPROXY_DEFAULT_CONFIG_FILE {
                    Err(ConfigError::other(
                        "Cannot find config file. Please use --config to specify its location.",
                    ))
                } else {
                    Err(ConfigError::Other(format!(
                        "Error parsing config file: {}, error: {}",
                        config_file, e
                    )))
                }
            }
            Ok(config) => {
                config.init_logging()?;
                info!("{} {} uses configuration file: {}", SIGNPROXY_APP, SIGNPROXY_VERSION, config_file);
                Ok(config)
            }
        }?;
        config
            .verify()
            .map_err(|e| ConfigError::Other(format!("Error parsing config file: {}, error: {}", config_file, e)))?;
        Ok(config)
    }

    pub fn verify(&self) -> Result<(), ConfigError> {
        if self.pool_capacity == 0 {
            return Err(ConfigError::other("pool_capacity must be at least 1"));
        }

        if self.connect_timeout == 0 || self.request_timeout == 0 || self.health_check_timeout == 0 {
            return Err(ConfigError::other("timeouts must be at least 1 second"));
        }

        if self.sites.iter().all(|site| site.endpoints.is_empty()) {
            return Err(ConfigError::other("at least one signing server must be configured"));
        }

        let mut names = HashSet::new();
        for site in &self.sites {
            if !names.insert(site.name.as_str()) {
                return Err(ConfigError::Other(format!("duplicate site name '{}'", site.name)));
            }
        }

        Ok(())
    }

    pub fn read_config(file: &str) -> Result<Self, ConfigError> {
        let s = fs::read_to_string(file)?;
        let c: Config = toml::from_str(&s)?;
        Ok(c)
    }

    pub fn init_logging(&self) -> Result<(), ConfigError> {
        match self.log_type {
            LogType::File => self.file_logger(&self.log_file),
            LogType::Stderr => self.stderr_logger(),
            #[cfg(unix)]
            LogType::Syslog => {
                let facility = Facility::from_str(&self.syslog_facility)
                    .map_err(|_| ConfigError::other("Invalid syslog_facility"))?;
                self.syslog_logger(facility)
            }
            #[cfg(not(unix))]
            LogType::Syslog => Err(ConfigError::other("syslog is only supported on unix")),
        }
    }

    /// Creates a stderr logger.
    fn stderr_logger(&self) -> Result<(), ConfigError> {
        self.fern_logger()
            .chain(io::stderr())
            .apply()
            .map_err(|e| ConfigError::Other(format!("Failed to init stderr logging: {}", e)))
    }

    /// Creates a file logger using the file provided by `path`.
    fn file_logger(&self, path: &Path) -> Result<(), ConfigError> {
        let file = match fern::log_file(path) {
            Ok(file) => file,
            Err(err) => {
                let error_string = format!("Failed to open log file '{}': {}", path.display(), err);
                error!("{}", error_string.as_str());
                return Err(ConfigError::Other(error_string));
            }
        };
        self.fern_logger()
            .chain(file)
            .apply()
            .map_err(|e| ConfigError::Other(format!("Failed to init file logging: {}", e)))
    }

    #[cfg(unix)]
    fn syslog_logger(&self, facility: Facility) -> Result<(), ConfigError> {
        let process = env::current_exe()
            .ok()
            .and_then(|path| {
                path.file_name()
                    .and_then(std::ffi::OsStr::to_str)
                    .map(ToString::to_string)
            })
            .unwrap_or_else(|| String::from(SIGNPROXY_APP));
        let formatter = syslog::Formatter3164 {
            facility,
            hostname: None,
            process,
            pid: std::process::id(),
        };
        let logger = syslog::unix(formatter.clone())
            .or_else(|_| syslog::tcp(formatter.clone(), ("127.0.0.1", 601)))
            .or_else(|_| syslog::udp(formatter, ("127.0.0.1", 0), ("127.0.0.1", 514)));
        match logger {
            Ok(logger) => self
                .fern_logger()
                .chain(logger)
                .apply()
                .map_err(|e| ConfigError::Other(format!("Failed to init syslog: {}", e))),
            Err(err) => Err(ConfigError::Other(format!("Cannot connect to syslog: {}", err))),
        }
    }

    /// Creates and returns a fern logger with log level tweaks
    fn fern_logger(&self) -> fern::Dispatch {
        // suppress overly noisy logging
        let framework_level = self.log_level.min(LevelFilter::Warn);

        let show_target = self.log_level == LevelFilter::Trace || self.log_level == LevelFilter::Debug;
        fern::Dispatch::new()
            .format(move |out, message, record| {
                if show_target {
                    out.finish(format_args!(
                        "{} [{}] [{}] {}",
                        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                        record.level(),
                        record.target(),
                        message
                    ))
                } else {
                    out.finish(format_args!(
                        "{} [{}] {}",
                        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                        record.level(),
                        message
                    ))
                }
            })
            .level(self.log_level)
            .level_for("rustls", framework_level)
            .level_for("hyper", framework_level)
            .level_for("hyper_util", framework_level)
            .level_for("reqwest", framework_level)
            .level_for("h2", framework_level)
            .level_for("want", framework_level)
    }
}

//------------ ConfigError ---------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    IoError(io::Error),
    TomlError(toml::de::Error),
    Other(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => e.fmt(f),
            ConfigError::TomlError(e) => e.fmt(f),
            ConfigError::Other(s) => s.fmt(f),
        }
    }
}

impl std::error::Error for ConfigError {}

impl ConfigError {
    pub fn other(s: &str) -> ConfigError {
        ConfigError::Other(s.to_string())
    }
}

impl From<io::Error> for ConfigError {
    fn from(e: io::Error) -> Self {
        ConfigError::IoError(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::TomlError(e)
    }
}

//------------ LogType -------------------------------------------------------

/// The target to log to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LogType {
    Stderr,
    File,
    Syslog,
}

impl<'de> Deserialize<'de> for LogType {
    fn deserialize<D>(d: D) -> Result<LogType, D::Error>
    where
        D: Deserializer<'de>,
    {
        let string = String::deserialize(d)?;
        match string.as_str() {
            "stderr" => Ok(LogType::Stderr),
            "file" => Ok(LogType::File),
            "syslog" => Ok(LogType::Syslog),
            _ => Err(de::Error::custom(format!(
                "expected \"stderr\", \"file\" or \"syslog\", found : \"{}\"",
                string
            ))),
        }
    }
}

//------------ Tests ---------------------------------------------------------
