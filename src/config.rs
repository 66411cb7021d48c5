//! # Configuration Management
//!
//! The server's configuration, loaded once at startup and shared read-only
//! with every session.
//!
//! [`ConfigModel`] is the value clients receive in the CONFIG frame: the
//! server's listen endpoint and session limits plus the decoder settings that
//! every node in the fleet runs with. It never changes while the server is
//! running; a new configuration takes a restart, and connected clients pick
//! it up when they reconnect.
//!
//! ## Configuration Sources
//! - TOML files via [`ConfigModel::load`] / [`ConfigFile::from_file`]
//! - TOML strings via [`ConfigModel::from_toml`]
//! - JSON bytes off the wire via [`ConfigModel::from_bytes`]
//!
//! ## File Layout
//! ```toml
//! [server]
//! interface = "0.0.0.0"
//! port = 4333
//!
//! [rtl433]
//! frequency = "915M"
//! metadata = "level"
//!
//! [rtl433.decoders]
//! include = "*"
//! WS85 = "m=FSK_PCM,s=58,l=58,r=2048,preamble=aa2dd4"
//! ```

use crate::error::{ProtocolError, Result};
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tracing::{warn, Level};

/// Default bind address
pub const DEFAULT_INTERFACE: &str = "0.0.0.0";

/// Default listen port, also the client's default server port
pub const DEFAULT_PORT: u16 = 4333;

/// Default upper bound on a single frame's payload (1 MiB)
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Decoder selection meaning "every built-in decoder"
pub const INCLUDE_ALL: &str = "*";

/// Decoder parameters with a known rtl_433 flag.
const PARAM_FLAGS: &[(&str, &str)] = &[
    ("device", "-d"),
    ("frequency", "-f"),
    ("fsk", "-Y"),
    ("gain", "-g"),
    ("hop_interval", "-H"),
    ("metadata", "-M"),
    ("ppm_error", "-p"),
    ("sample_rate", "-s"),
];

/// Server and decoder configuration distributed to every client.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
pub struct ConfigModel {
    /// Server listen endpoint and session limits
    #[serde(default)]
    pub server: ServerConfig,

    /// Decoder settings passed through to every client
    #[serde(default)]
    pub decoder: DecoderConfig,
}

impl ConfigModel {
    /// Load and validate configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(ConfigFile::from_file(path)?.model)
    }

    /// Load and validate configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(ConfigFile::from_toml(content)?.model)
    }

    /// Serialize for the CONFIG frame
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize a CONFIG frame payload
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.decoder.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Everything the server reads from its configuration file.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    /// The distributed configuration
    pub model: ConfigModel,

    /// Server-process logging, not sent to clients
    pub logging: LoggingConfig,
}

impl ConfigFile {
    /// Read, parse and validate a TOML configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Parse and validate a TOML configuration
    pub fn from_toml(content: &str) -> Result<Self> {
        let raw = toml::from_str::<RawFile>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))?;

        let server = raw.server.ok_or_else(|| {
            ProtocolError::ConfigError("Server config missing a [server] section".to_string())
        })?;

        let model = ConfigModel {
            server,
            decoder: DecoderConfig {
                params: raw.rtl433.params,
                include: raw.rtl433.decoders.include,
                exclude: raw.rtl433.decoders.exclude,
                profiles: raw.rtl433.decoders.profiles,
            },
        };
        model.validate_strict()?;

        Ok(Self {
            model,
            logging: raw.logging,
        })
    }
}

/// On-disk shape of the configuration file.
#[derive(Debug, Deserialize)]
struct RawFile {
    server: Option<ServerConfig>,
    #[serde(default)]
    rtl433: RawRtl433,
    #[serde(default)]
    logging: LoggingConfig,
}

#[derive(Debug, Default, Deserialize)]
struct RawRtl433 {
    #[serde(default)]
    decoders: RawDecoders,
    #[serde(flatten)]
    params: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawDecoders {
    #[serde(default = "default_include")]
    include: String,
    #[serde(default)]
    exclude: Option<String>,
    #[serde(flatten)]
    profiles: BTreeMap<String, String>,
}

impl Default for RawDecoders {
    fn default() -> Self {
        Self {
            include: default_include(),
            exclude: None,
            profiles: BTreeMap::new(),
        }
    }
}

fn default_include() -> String {
    INCLUDE_ALL.to_string()
}

/// Server-specific configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g. "0.0.0.0")
    pub interface: String,

    /// Listen port
    pub port: u16,

    /// Silence tolerated on a session before it is closed
    #[serde(with = "duration_serde")]
    pub idle_timeout: Duration,

    /// Largest frame payload accepted from a client
    pub max_frame_size: usize,

    /// Wait on in-flight deliveries at shutdown before logging a warning
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            interface: String::from(DEFAULT_INTERFACE),
            port: DEFAULT_PORT,
            idle_timeout: timeout::IDLE_TIMEOUT,
            max_frame_size: MAX_FRAME_SIZE,
            shutdown_timeout: timeout::SHUTDOWN_TIMEOUT,
        }
    }
}

impl ServerConfig {
    /// The socket address to listen on
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.interface.parse().map_err(|_| {
            ProtocolError::ConfigError(format!("Invalid server interface: '{}'", self.interface))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Validate server configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.interface.is_empty() {
            errors.push("Server interface cannot be empty".to_string());
        } else if self.interface.parse::<IpAddr>().is_err() {
            errors.push(format!(
                "Invalid server interface: '{}' (expected an IP address such as '0.0.0.0')",
                self.interface
            ));
        }

        if self.port == 0 {
            errors.push("Server port must be greater than 0".to_string());
        }

        if self.idle_timeout.as_millis() < 100 {
            errors.push("Idle timeout too short (minimum: 100ms)".to_string());
        } else if self.idle_timeout.as_secs() > 300 {
            errors.push("Idle timeout too long (maximum: 300s)".to_string());
        }

        if self.max_frame_size < 1024 {
            errors.push("Max frame size too small (minimum: 1 KB)".to_string());
        } else if self.max_frame_size > 64 * 1024 * 1024 {
            errors.push(format!(
                "Max frame size too large: {} bytes (maximum: 64 MB)",
                self.max_frame_size
            ));
        }

        if self.shutdown_timeout.as_secs() > 60 {
            errors.push("Shutdown timeout too long (maximum: 60s)".to_string());
        }

        errors
    }
}

/// Decoder settings shared by every client node.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DecoderConfig {
    /// Opaque decoder options (frequency, metadata, fsk, ...)
    #[serde(default)]
    pub params: BTreeMap<String, Value>,

    /// Space-separated built-in decoders to enable, or "*" for all
    #[serde(default = "default_include")]
    pub include: String,

    /// Space-separated built-in decoders to disable
    #[serde(default)]
    pub exclude: Option<String>,

    /// Custom decoder profiles, name to raw decoder spec
    #[serde(default)]
    pub profiles: BTreeMap<String, String>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            params: BTreeMap::new(),
            include: default_include(),
            exclude: None,
            profiles: BTreeMap::new(),
        }
    }
}

impl DecoderConfig {
    /// Validate decoder configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.params.keys().any(|k| k.trim().is_empty()) {
            errors.push("Decoder parameter names cannot be empty".to_string());
        }

        for (name, spec) in &self.profiles {
            if name.trim().is_empty() {
                errors.push("Decoder profile names cannot be empty".to_string());
            }
            if spec.trim().is_empty() {
                errors.push(format!("Decoder profile '{name}' has an empty spec"));
            }
        }

        if self.include.trim().is_empty() {
            errors.push("Decoder include list cannot be empty (use \"*\" for all)".to_string());
        }

        errors
    }

    /// Build rtl_433 command-line arguments (binary and output format excluded).
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        for (name, value) in &self.params {
            let Some((_, flag)) = PARAM_FLAGS.iter().find(|(key, _)| key == name) else {
                warn!(param = %name, "Unknown decoder parameter, skipping");
                continue;
            };
            for arg in param_values(value) {
                args.push((*flag).to_string());
                args.push(arg);
            }
        }

        if self.include.trim() != INCLUDE_ALL {
            for part in self.include.split_whitespace() {
                args.push("-R".to_string());
                args.push(part.to_string());
            }
        }

        if let Some(exclude) = &self.exclude {
            for part in exclude.split_whitespace() {
                args.push("-R".to_string());
                args.push(format!("-{part}"));
            }
        }

        for (name, spec) in &self.profiles {
            args.push("-X".to_string());
            args.push(format!("n={name},{spec}"));
        }

        args
    }
}

/// Flatten a parameter value into one argument per flag occurrence.
fn param_values(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => s.split_whitespace().map(str::to_string).collect(),
        Value::Array(items) => items.iter().flat_map(param_values).collect(),
        Value::Number(n) => vec![n.to_string()],
        Value::Bool(b) => vec![b.to_string()],
        Value::Null => Vec::new(),
        Value::Object(_) => {
            warn!("Nested decoder parameter tables are not supported, skipping");
            Vec::new()
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
