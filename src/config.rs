use serde::Deserialize;
use std::path::PathBuf;

pub trait Validatable {
    fn validate(&self) -> Result<(), String>;
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    pub model: ModelConfig,
    pub registry: RegistryConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

impl Validatable for Config {
    fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.model.validate()?;
        self.registry.validate()?;
        self.proxy.validate()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Validatable for ServerConfig {
    fn validate(&self) -> Result<(), String> {
        if self.max_upload_bytes == 0 {
            return Err("server.max_upload_bytes must be greater than 0".into());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    pub model_id: String,
    #[serde(default = "default_threshold")]
    pub default_threshold: f64,
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    #[serde(default = "default_mean")]
    pub mean: [f32; 3],
    #[serde(default = "default_std")]
    pub std: [f32; 3],
}

fn default_threshold() -> f64 {
    0.75
}

fn default_input_size() -> u32 {
    224
}

fn default_mean() -> [f32; 3] {
    [0.485, 0.456, 0.406]
}

fn default_std() -> [f32; 3] {
    [0.229, 0.224, 0.225]
}

impl Validatable for ModelConfig {
    fn validate(&self) -> Result<(), String> {
        if self.model_id.trim().is_empty() {
            return Err("model.model_id must not be empty".into());
        }
        if !(0.0..=1.0).contains(&self.default_threshold) {
            return Err(format!(
                "model.default_threshold must be between 0 and 1, got {}",
                self.default_threshold
            ));
        }
        if self.input_size == 0 {
            return Err("model.input_size must be greater than 0".into());
        }
        if self.std.iter().any(|s| *s <= 0.0) {
            return Err(format!("model.std values must be positive: {:?}", self.std));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RegistryKind {
    Http,
    Local,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RegistryConfig {
    pub kind: RegistryKind,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
    pub cache_dir: PathBuf,
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

fn default_download_timeout_secs() -> u64 {
    300
}

impl RegistryConfig {
    pub fn get_artifact_path(&self, model_id: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.onnx", model_id))
    }
}

impl Validatable for RegistryConfig {
    fn validate(&self) -> Result<(), String> {
        if self.kind == RegistryKind::Http && self.base_url.is_none() {
            return Err("registry.base_url is required for the http registry".into());
        }
        if self.download_timeout_secs == 0 {
            return Err("registry.download_timeout_secs must be greater than 0".into());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProxyConfig {
    #[serde(default = "default_proxy_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_content_type")]
    pub default_content_type: String,
    #[serde(default = "default_proxy_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_proxy_timeout_secs() -> u64 {
    30
}

fn default_content_type() -> String {
    "image/jpeg".into()
}

fn default_proxy_max_body_bytes() -> usize {
    20 * 1024 * 1024
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_proxy_timeout_secs(),
            default_content_type: default_content_type(),
            max_body_bytes: default_proxy_max_body_bytes(),
        }
    }
}

impl Validatable for ProxyConfig {
    fn validate(&self) -> Result<(), String> {
        if self.timeout_secs == 0 {
            return Err("proxy.timeout_secs must be greater than 0".into());
        }
        if self.max_body_bytes == 0 {
            return Err("proxy.max_body_bytes must be greater than 0".into());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            other => Err(format!(
                "{} is not a supported minimum log level. Use either `debug`, `info` or `warn`.",
                other
            )),
        }
    }
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(format!("no current directory: {}", e)))?;
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;

    let config = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(
            config::File::from(
                configuration_directory.join(format!("{}.yaml", environment.as_str())),
            )
            .required(false),
        )
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let config: Config = config.try_deserialize::<Config>()?;
    config.validate().map_err(config::ConfigError::Message)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_config() -> ModelConfig {
        ModelConfig {
            model_id: "8321dde2ac2e4556b015913cb634be9c".into(),
            default_threshold: default_threshold(),
            input_size: default_input_size(),
            mean: default_mean(),
            std: default_std(),
        }
    }

    #[test]
    fn test_model_config_defaults_are_valid() {
        assert!(model_config().validate().is_ok());
    }

    #[test]
    fn test_model_config_rejects_threshold_out_of_range() {
        let mut cfg = model_config();
        cfg.default_threshold = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_model_config_rejects_empty_model_id() {
        let mut cfg = model_config();
        cfg.model_id = "  ".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_http_registry_requires_base_url() {
        let cfg = RegistryConfig {
            kind: RegistryKind::Http,
            base_url: None,
            api_token: None,
            cache_dir: PathBuf::from("models"),
            download_timeout_secs: 10,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_artifact_path() {
        let cfg = RegistryConfig {
            kind: RegistryKind::Local,
            base_url: None,
            api_token: None,
            cache_dir: PathBuf::from("models"),
            download_timeout_secs: 10,
        };
        assert_eq!(
            cfg.get_artifact_path("abc"),
            PathBuf::from("models").join("abc.onnx")
        );
    }

    #[test]
    fn test_base_configuration_deserializes() {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("configuration/base.yaml");
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .build()
            .unwrap()
            .try_deserialize::<Config>()
            .unwrap();

        assert!(settings.validate().is_ok());
        assert_eq!(settings.registry.kind, RegistryKind::Http);
        assert_eq!(settings.model.input_size, 224);
        assert_eq!(settings.proxy.default_content_type, "image/jpeg");
        assert_eq!(settings.proxy.max_body_bytes, 20 * 1024 * 1024);
    }

    #[test]
    fn test_proxy_config_rejects_zero_body_limit() {
        let cfg = ProxyConfig {
            max_body_bytes: 0,
            ..ProxyConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_log_level_parsing() {
        let level: LogLevel = "DEBUG".to_string().try_into().unwrap();
        assert_eq!(level.as_str(), "debug");
        assert!(LogLevel::try_from("trace".to_string()).is_err());
    }
}
