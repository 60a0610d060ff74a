use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    pub model: ModelConfig,
    #[serde(default)]
    pub labels: LabelsConfig,
    #[serde(default)]
    pub decision: DecisionConfig,
    pub storage: StorageConfig,
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

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    pub onnx_file: String,
    pub model_dir: PathBuf,
    #[serde(default = "default_model_instances")]
    pub num_instances: usize,
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    #[serde(default, deserialize_with = "deserialize_color_order")]
    pub color_order: ColorOrder,
}

fn default_model_instances() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_input_size() -> u32 {
    224
}

fn deserialize_color_order<'de, D>(deserializer: D) -> Result<ColorOrder, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

impl ModelConfig {
    pub fn get_path(&self) -> PathBuf {
        self.model_dir.join(&self.onnx_file)
    }
}

impl Validatable for ModelConfig {
    fn validate(&self) -> Result<(), String> {
        if !self.get_path().exists() {
            return Err(format!("Model file not found: {:?}", self.get_path()));
        }
        if self.num_instances == 0 {
            return Err("model.num_instances must be at least 1".to_string());
        }
        if self.input_size == 0 {
            return Err("model.input_size must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Optional override of the built-in label table.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LabelsConfig {
    pub labels_file: Option<PathBuf>,
}

impl Validatable for LabelsConfig {
    fn validate(&self) -> Result<(), String> {
        match &self.labels_file {
            Some(path) if !path.exists() => Err(format!("Labels file not found: {:?}", path)),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DecisionConfig {
    /// Confidence percentage below which a prediction is reported as "no risk".
    #[serde(default = "default_low_confidence_threshold")]
    pub low_confidence_threshold: f32,
}

fn default_low_confidence_threshold() -> f32 {
    70.0
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            low_confidence_threshold: default_low_confidence_threshold(),
        }
    }
}

impl Validatable for DecisionConfig {
    fn validate(&self) -> Result<(), String> {
        if !(0.0..=100.0).contains(&self.low_confidence_threshold) {
            return Err(format!(
                "decision.low_confidence_threshold must be within [0, 100], got {}",
                self.low_confidence_threshold
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub upload_dir: PathBuf,
    #[serde(default = "default_public_prefix")]
    pub public_prefix: String,
    pub assets_dir: PathBuf,
    pub index_file: PathBuf,
    /// Largest accepted request body on the upload route, in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_public_prefix() -> String {
    "/static/uploads".to_string()
}

fn default_max_upload_bytes() -> usize {
    16 * 1024 * 1024
}

impl Validatable for StorageConfig {
    fn validate(&self) -> Result<(), String> {
        let prefix = self.public_prefix.trim_end_matches('/');
        if !prefix.starts_with('/') || prefix.is_empty() {
            return Err(format!(
                "storage.public_prefix must be an absolute sub-path such as /static/uploads, got {:?}",
                self.public_prefix
            ));
        }
        if self.max_upload_bytes == 0 {
            return Err("storage.max_upload_bytes must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorOrder {
    #[default]
    Bgr,
    Rgb,
}

impl TryFrom<String> for ColorOrder {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "bgr" => Ok(Self::Bgr),
            "rgb" => Ok(Self::Rgb),
            other => Err(format!(
                "{} is not a supported color order. Use either `bgr` or `rgb`.",
                other
            )),
        }
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

impl Config {
    pub fn validate(&self) -> Result<(), String> {
        self.model.validate()?;
        self.labels.validate()?;
        self.decision.validate()?;
        self.storage.validate()?;
        Ok(())
    }
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(format!("current directory: {}", e)))?;
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

    if let Err(e) = config.validate() {
        tracing::error!("Configuration validation failed: {}", e);
        return Err(config::ConfigError::Message(e));
    }

    Ok(config)
}
