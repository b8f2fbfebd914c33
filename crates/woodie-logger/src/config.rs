use crate::error::ConfigError;
use crate::fields::Fields;
use crate::formatter::{Formatter, JsonFormatter, TextFormatter, DEFAULT_PATTERN};
use crate::handler::{FileHandler, Handler, HandlerBinding, StreamHandler};
use crate::level::Level;
use crate::logger::{StructuredLogger, StructuredLoggerBuilder};
use crate::tracing_bridge::TracingHandler;
use anyhow::{anyhow, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DEFAULT_ENV_PREFIX: &str = "WOODIE_LOG";

/// 格式化器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FormatterConfig {
    Text {
        #[serde(default = "default_pattern")]
        pattern: String,
    },
    Json {
        #[serde(default)]
        pretty: bool,
    },
}

fn default_pattern() -> String {
    DEFAULT_PATTERN.to_string()
}

impl Default for FormatterConfig {
    fn default() -> Self {
        FormatterConfig::Text {
            pattern: default_pattern(),
        }
    }
}

impl FormatterConfig {
    pub fn build(&self) -> Result<Arc<dyn Formatter>, ConfigError> {
        let formatter: Arc<dyn Formatter> = match self {
            FormatterConfig::Text { pattern } => Arc::new(TextFormatter::new(pattern.as_str())?),
            FormatterConfig::Json { pretty } => Arc::new(JsonFormatter::new().pretty(*pretty)),
        };
        Ok(formatter)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerKind {
    Stderr,
    Stdout,
    File,
    Tracing,
}

/// 处理器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerConfig {
    pub kind: HandlerKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<Level>,

    /// 未设置时由日志器的默认格式化器补上
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatter: Option<FormatterConfig>,
}

impl HandlerConfig {
    pub fn build(&self) -> Result<HandlerBinding, ConfigError> {
        let level = self.level.unwrap_or(Level::NOTSET);
        let handler: Arc<dyn Handler> = match self.kind {
            HandlerKind::Stderr => Arc::new(StreamHandler::stderr().with_level(level)),
            HandlerKind::Stdout => Arc::new(StreamHandler::stdout().with_level(level)),
            HandlerKind::File => {
                let path = self
                    .path
                    .as_ref()
                    .ok_or_else(|| ConfigError::MissingPath("file".to_string()))?;
                Arc::new(FileHandler::open(path)?.with_level(level))
            }
            HandlerKind::Tracing => Arc::new(TracingHandler::new().with_level(level)),
        };

        Ok(match &self.formatter {
            Some(formatter) => HandlerBinding::with_formatter(handler, formatter.build()?),
            None => HandlerBinding::new(handler),
        })
    }
}

/// 日志器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub name: String,
    pub level: Level,
    pub fields: Fields,
    pub log_failure: bool,
    pub log_failure_level: Level,
    pub default_formatter: FormatterConfig,
    pub handlers: Vec<HandlerConfig>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            name: "app".to_string(),
            level: Level::INFO,
            fields: Fields::new(),
            log_failure: true,
            log_failure_level: Level::ERROR,
            default_formatter: FormatterConfig::default(),
            handlers: Vec::new(),
        }
    }
}

impl LoggerConfig {
    /// 转换为构建器，调用方可以继续追加处理器等设置
    pub fn builder(&self) -> Result<StructuredLoggerBuilder, ConfigError> {
        let bindings = self
            .handlers
            .iter()
            .map(HandlerConfig::build)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(StructuredLogger::builder(self.name.clone())
            .level(self.level)
            .fields(self.fields.clone())
            .log_failure(self.log_failure)
            .log_failure_level(self.log_failure_level)
            .default_formatter(self.default_formatter.build()?)
            .bindings(bindings))
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl StructuredLogger {
    pub fn from_config(config: &LoggerConfig) -> Result<Self, ConfigError> {
        config.builder()?.build()
    }
}

/// 字段表单独解析，`config` 会把键名转成小写
#[derive(Debug, Default, Deserialize)]
struct FieldsSection {
    #[serde(default)]
    fields: Fields,
}

/// 配置加载器：TOML 文件 + 环境变量覆盖
///
/// 环境变量形如 `WOODIE_LOG__LEVEL=debug`；持久字段用
/// `WOODIE_LOG__FIELDS__<key>=<value>` 覆盖，键名保持原样，值为字符串。
pub struct ConfigLoader {
    path: PathBuf,
    env_prefix: String,
}

impl ConfigLoader {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
        }
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// 加载配置；文件不存在时使用默认配置，环境变量仍然生效
    pub fn load(&self) -> Result<LoggerConfig> {
        let mut builder = Config::builder();

        if self.path.exists() {
            builder = builder.add_source(File::new(
                self.path.to_str().ok_or_else(|| anyhow!("Invalid config path"))?,
                FileFormat::Toml,
            ));
        }

        let config = builder
            .add_source(Environment::with_prefix(&self.env_prefix).separator("__"))
            .build()?;

        let mut logger_config: LoggerConfig = config.try_deserialize()?;
        logger_config.fields = self.load_fields()?;
        Ok(logger_config)
    }

    fn load_fields(&self) -> Result<Fields> {
        let mut fields = if self.path.exists() {
            let content = fs::read_to_string(&self.path)?;
            toml::from_str::<FieldsSection>(&content)?.fields
        } else {
            Fields::new()
        };

        let prefix = format!("{}__FIELDS__", self.env_prefix);
        for (key, value) in env::vars_os() {
            let (Some(key), Some(value)) = (key.to_str(), value.to_str()) else {
                continue;
            };
            if let Some(field) = key.strip_prefix(&prefix) {
                if !field.is_empty() {
                    fields.insert(field.to_string(), Value::String(value.to_string()));
                }
            }
        }
        Ok(fields)
    }

    pub fn load_logger(&self) -> Result<StructuredLogger> {
        let config = self.load()?;
        Ok(StructuredLogger::from_config(&config)?)
    }
}
