use axum::http::HeaderValue;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    #[serde(default)]
    pub cors: CorsConfig,
    pub inference: InferenceConfig,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

pub trait Validatable {
    fn validate(&self) -> Result<(), String>;
}

impl Validatable for Config {
    fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.cors.validate()?;
        self.inference.validate()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Validatable for ServerConfig {
    fn validate(&self) -> Result<(), String> {
        if self.max_body_bytes == 0 {
            return Err("server.max_body_bytes must be greater than zero".into());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl CorsConfig {
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|origin| origin == "*")
    }

    pub fn origin_headers(&self) -> Result<Vec<HeaderValue>, String> {
        self.allowed_origins
            .iter()
            .map(|origin| {
                HeaderValue::from_str(origin)
                    .map_err(|_| format!("{} is not a valid CORS origin", origin))
            })
            .collect()
    }
}

impl Validatable for CorsConfig {
    fn validate(&self) -> Result<(), String> {
        if self.allowed_origins.is_empty() {
            return Err("cors.allowed_origins must list at least one origin".into());
        }
        self.origin_headers().map(|_| ())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct InferenceConfig {
    pub url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_instances")]
    pub instances: usize,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_threshold() -> f32 {
    0.5
}

fn default_instances() -> usize {
    1
}

impl InferenceConfig {
    pub fn get_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Validatable for InferenceConfig {
    fn validate(&self) -> Result<(), String> {
        reqwest::Url::parse(&self.url)
            .map_err(|e| format!("inference.url {:?} is invalid: {}", self.url, e))?;
        if self.timeout_ms == 0 {
            return Err("inference.timeout_ms must be greater than zero".into());
        }
        if !(self.threshold > 0.0 && self.threshold < 1.0) {
            return Err(format!(
                "inference.threshold must be within (0, 1), got {}",
                self.threshold
            ));
        }
        if self.instances == 0 {
            return Err("inference.instances must be at least 1".into());
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

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            other => Err(format!(
                "{} is not a supported minimum log level. Use either `debug` or `info`.",
                other
            )),
        }
    }
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let base_path = std::env::current_dir().map_err(|e| {
        config::ConfigError::Message(format!("Failed to determine the current directory: {}", e))
    })?;
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;

    let settings = config::Config::builder()
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
            config::Environment::with_prefix("PE")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("cors.allowed_origins")
                .try_parsing(true),
        )
        .build()?;

    finalize(settings)
}

fn finalize(settings: config::Config) -> Result<Config, config::ConfigError> {
    let config = settings.try_deserialize::<Config>()?;

    if let Err(e) = config.validate() {
        tracing::error!("Configuration validation failed: {}", e);
        return Err(config::ConfigError::Message(e));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    const BASE: &str = r#"
log_level: info
server:
  host: 127.0.0.1
  port: 5000
inference:
  url: http://127.0.0.1:8501/v1/score
"#;

    fn load(layers: &[&str]) -> Result<Config, config::ConfigError> {
        let builder = layers.iter().fold(config::Config::builder(), |builder, layer| {
            builder.add_source(config::File::from_str(layer, FileFormat::Yaml))
        });
        finalize(builder.build()?)
    }

    #[test]
    fn fills_defaults() {
        let config = load(&[BASE]).unwrap();

        assert_eq!(config.server.get_address(), "127.0.0.1:5000");
        assert_eq!(config.server.max_body_bytes, 10 * 1024 * 1024);
        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.cors.allowed_origins, vec!["http://localhost:3000"]);
        assert_eq!(config.inference.get_timeout(), Duration::from_secs(30));
        assert_eq!(config.inference.threshold, 0.5);
        assert_eq!(config.inference.instances, 1);
    }

    #[test]
    fn environment_layer_overrides_base() {
        let overlay = r#"
log_level: DEBUG
cors:
  allowed_origins: ["*"]
inference:
  timeout_ms: 250
  instances: 1
"#;
        let config = load(&[BASE, overlay]).unwrap();

        assert_eq!(config.log_level, LogLevel::Debug);
        assert!(config.cors.allows_any_origin());
        assert_eq!(config.inference.timeout_ms, 250);
        assert_eq!(config.inference.instances, 1);
    }

    #[test]
    fn rejects_unknown_log_level() {
        let overlay = "log_level: trace\n";
        assert!(load(&[BASE, overlay]).is_err());
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let overlay = "inference:\n  threshold: 1.5\n";
        let err = load(&[BASE, overlay]).unwrap_err();
        assert!(err.to_string().contains("threshold"));
    }

    #[test]
    fn rejects_invalid_inference_url() {
        let overlay = "inference:\n  url: not a url\n";
        assert!(load(&[BASE, overlay]).is_err());
    }

    #[test]
    fn parses_environment_names() {
        assert!(matches!(
            Environment::try_from("Production".to_string()),
            Ok(Environment::Production)
        ));
        assert!(Environment::try_from("staging".to_string()).is_err());
    }
}
